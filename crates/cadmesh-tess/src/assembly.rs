//! 装配体树
//!
//! 叶子（零件）持有形体、放置和样式；组持有有序子节点和可选放置。

use cadmesh_core::math::Placement;
use cadmesh_core::shape::Shape;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// RGB 颜色，序列化为 "#rrggbb"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const MAGENTA: Color = Color::new(255, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// 解析 "#rrggbb" 或 "rrggbb"
    pub fn from_hex(s: &str) -> Option<Self> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s).ok_or_else(|| format!("invalid color '{}'", s))
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// 零件（叶子）
#[derive(Debug, Clone)]
pub struct Part {
    pub name: String,
    pub shape: Shape,
    pub placement: Placement,
    /// None 时使用配置中的默认颜色
    pub color: Option<Color>,
    pub alpha: f32,
    pub show_faces: bool,
    pub show_edges: bool,
}

impl Part {
    pub fn new(name: impl Into<String>, shape: Shape) -> Self {
        Self {
            name: name.into(),
            shape,
            placement: Placement::identity(),
            color: None,
            alpha: 1.0,
            show_faces: true,
            show_edges: true,
        }
    }

    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = Some(color);
        self
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha.clamp(0.0, 1.0);
        self
    }

    pub fn with_visibility(mut self, faces: bool, edges: bool) -> Self {
        self.show_faces = faces;
        self.show_edges = edges;
        self
    }
}

/// 组
#[derive(Debug, Clone)]
pub struct Group {
    pub name: String,
    pub placement: Option<Placement>,
    pub children: Vec<Node>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            placement: None,
            children: Vec::new(),
        }
    }

    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = Some(placement);
        self
    }

    pub fn with_child(mut self, node: impl Into<Node>) -> Self {
        self.children.push(node.into());
        self
    }

    pub fn push(&mut self, node: impl Into<Node>) {
        self.children.push(node.into());
    }

    /// 子树中的叶子数
    pub fn count_leaves(&self) -> usize {
        self.children
            .iter()
            .map(|child| match child {
                Node::Part(_) => 1,
                Node::Group(g) => g.count_leaves(),
            })
            .sum()
    }
}

/// 树节点
#[derive(Debug, Clone)]
pub enum Node {
    Part(Part),
    Group(Group),
}

impl From<Part> for Node {
    fn from(part: Part) -> Self {
        Node::Part(part)
    }
}

impl From<Group> for Node {
    fn from(group: Group) -> Self {
        Node::Group(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadmesh_core::math::Point3;

    #[test]
    fn test_color_hex() {
        let c: Color = "#E8B024".parse().unwrap();
        assert_eq!(c, Color::new(232, 176, 36));
        assert_eq!(c.to_string(), "#e8b024");
        assert!(Color::from_hex("#12345").is_none());
        assert!(Color::from_hex("zzzzzz").is_none());

        let json = serde_json::to_string(&Color::MAGENTA).unwrap();
        assert_eq!(json, "\"#ff00ff\"");
    }

    #[test]
    fn test_count_leaves() {
        let cube = Shape::cuboid(Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        let inner = Group::new("inner")
            .with_child(Part::new("a", cube.clone()))
            .with_child(Part::new("b", cube.clone()));
        let root = Group::new("root")
            .with_child(inner)
            .with_child(Part::new("c", cube))
            .with_child(Group::new("empty"));
        assert_eq!(root.count_leaves(), 3);
    }
}
