//! 输出给显示层的数据
//!
//! 嵌套结构与装配体树一致；状态表是扁平的 `id -> [面状态, 边状态]`。

use crate::assembly::Color;
use crate::mesh::{EdgeSegmentSet, MeshBuffer};
use cadmesh_core::math::BoundingBox;
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use std::collections::HashSet;

/// 插入的总包围盒零件名
pub const BOUNDING_BOX_NAME: &str = "BoundingBox";

/// 显示状态，序列化为整数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisibilityState {
    Unselected = 0,
    Selected = 1,
    Mixed = 2,
    Empty = 3,
}

impl VisibilityState {
    pub fn from_visible(visible: bool) -> Self {
        if visible {
            VisibilityState::Selected
        } else {
            VisibilityState::Unselected
        }
    }
}

impl Serialize for VisibilityState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

/// 状态表（保持插入顺序）
pub type States = IndexMap<String, [VisibilityState; 2]>;

/// 零件类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PartType {
    Shapes,
    Edges,
    Vertices,
}

/// 零件数据
#[derive(Debug, Clone, Serialize)]
pub struct PartPayload {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PartType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mesh: Option<MeshBuffer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edges: Option<EdgeSegmentSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<f32>>,
    pub color: Color,
    pub alpha: f32,
    /// 使用的线性精度
    pub accuracy: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bb: Option<BoundingBox>,
}

/// 组数据
#[derive(Debug, Clone, Serialize)]
pub struct GroupPayload {
    pub id: String,
    pub name: String,
    pub parts: Vec<PayloadNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bb: Option<BoundingBox>,
}

/// 嵌套节点
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PayloadNode {
    Group(GroupPayload),
    Part(PartPayload),
}

impl PayloadNode {
    pub fn id(&self) -> &str {
        match self {
            PayloadNode::Group(g) => &g.id,
            PayloadNode::Part(p) => &p.id,
        }
    }

    pub fn bb(&self) -> Option<&BoundingBox> {
        match self {
            PayloadNode::Group(g) => g.bb.as_ref(),
            PayloadNode::Part(p) => p.bb.as_ref(),
        }
    }
}

impl GroupPayload {
    /// 深度优先遍历所有零件
    pub fn parts_recursive(&self) -> Vec<&PartPayload> {
        let mut out = Vec::new();
        for node in &self.parts {
            match node {
                PayloadNode::Part(p) => out.push(p),
                PayloadNode::Group(g) => out.extend(g.parts_recursive()),
            }
        }
        out
    }
}

/// 包围盒的 12 条棱
pub fn bbox_edges(bb: &BoundingBox) -> EdgeSegmentSet {
    let c = bb.corners().map(|p| [p.x as f32, p.y as f32, p.z as f32]);
    // corners 的索引位为 (x, y, z)，相差一位的两个角点构成一条棱
    let mut edges = EdgeSegmentSet::default();
    for i in 0..8usize {
        for bit in [1usize, 2, 4] {
            if i & bit == 0 {
                edges.free.push([c[i], c[i | bit]]);
            }
        }
    }
    edges
}

/// 同级重名时追加 `_<n>` 后缀
pub(crate) fn unique_name(used: &mut HashSet<String>, name: &str) -> String {
    let mut candidate = name.to_string();
    let mut n = 0;
    while used.contains(&candidate) {
        n += 1;
        candidate = format!("{}_{}", name, n);
    }
    used.insert(candidate.clone());
    candidate
}

/// 在根组最前面插入总包围盒线框零件，状态为 [empty, selected]
///
/// 与根组已有子节点重名时按同样的规则追加后缀。
pub fn insert_bounding_box(root: &mut GroupPayload, states: &mut States, bb: &BoundingBox) {
    let prefix = format!("{}/", root.id);
    let mut used: HashSet<String> = root
        .parts
        .iter()
        .filter_map(|node| node.id().strip_prefix(&prefix))
        .map(str::to_string)
        .collect();
    let name = unique_name(&mut used, BOUNDING_BOX_NAME);
    let id = format!("{}{}", prefix, name);
    let part = PartPayload {
        id: id.clone(),
        name,
        kind: PartType::Edges,
        mesh: None,
        edges: Some(bbox_edges(bb)),
        points: None,
        color: Color::MAGENTA,
        alpha: 1.0,
        accuracy: 0.0,
        bb: None,
    };
    root.parts.insert(0, PayloadNode::Part(part));
    states.shift_insert(
        0,
        id,
        [VisibilityState::Empty, VisibilityState::Selected],
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_edges() {
        let bb = BoundingBox::new(0.0, 1.0, 0.0, 2.0, 0.0, 3.0);
        let edges = bbox_edges(&bb);
        assert_eq!(edges.free.len(), 12);
        for [a, b] in &edges.free {
            let differing = (0..3).filter(|&k| a[k] != b[k]).count();
            assert_eq!(differing, 1);
        }
    }

    #[test]
    fn test_insert_bounding_box() {
        let mut root = GroupPayload {
            id: "/Group".to_string(),
            name: "Group".to_string(),
            parts: Vec::new(),
            bb: None,
        };
        let mut states = States::new();
        states.insert(
            "/Group/a".to_string(),
            [VisibilityState::Selected, VisibilityState::Selected],
        );

        insert_bounding_box(&mut root, &mut states, &BoundingBox::new(0.0, 1.0, 0.0, 1.0, 0.0, 1.0));

        assert_eq!(root.parts[0].id(), "/Group/BoundingBox");
        assert_eq!(states.get_index(0).map(|(k, _)| k.as_str()), Some("/Group/BoundingBox"));
        let json = serde_json::to_value(&states).unwrap();
        assert_eq!(json["/Group/BoundingBox"], serde_json::json!([3, 1]));
    }

    #[test]
    fn test_bounding_box_name_taken() {
        let part = |id: &str, name: &str| {
            PayloadNode::Part(PartPayload {
                id: id.to_string(),
                name: name.to_string(),
                kind: PartType::Shapes,
                mesh: None,
                edges: None,
                points: None,
                color: Color::MAGENTA,
                alpha: 1.0,
                accuracy: 0.01,
                bb: None,
            })
        };
        let mut root = GroupPayload {
            id: "/Group".to_string(),
            name: "Group".to_string(),
            parts: vec![part("/Group/BoundingBox", "BoundingBox")],
            bb: None,
        };
        let mut states = States::new();
        states.insert(
            "/Group/BoundingBox".to_string(),
            [VisibilityState::Selected, VisibilityState::Selected],
        );

        insert_bounding_box(&mut root, &mut states, &BoundingBox::new(0.0, 1.0, 0.0, 1.0, 0.0, 1.0));

        assert_eq!(root.parts.len(), 2);
        assert_eq!(root.parts[0].id(), "/Group/BoundingBox_1");
        assert_eq!(root.parts[1].id(), "/Group/BoundingBox");
        assert_eq!(states.len(), 2);
        assert_eq!(
            states["/Group/BoundingBox"],
            [VisibilityState::Selected, VisibilityState::Selected]
        );
        assert_eq!(
            states.get_index(0).map(|(k, v)| (k.as_str(), *v)),
            Some((
                "/Group/BoundingBox_1",
                [VisibilityState::Empty, VisibilityState::Selected]
            ))
        );

        let ids: HashSet<&str> = root.parts_recursive().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids.len(), 2);
    }
}
