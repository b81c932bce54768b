//! 不可变 B-rep 形体
//!
//! 形体由面（解析曲面 + 参数域边界）、边（解析曲线 + 相邻面索引）和孤立顶点组成。
//! `Shape` 是共享句柄：克隆句柄共享同一标识，结构相同但独立创建的形体标识不同。

use crate::geometry::{square_corners, Curve, Surface};
use crate::math::{BoundingBox, Placement, Point3, Vector3, EPSILON};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// 精确包围盒采样密度（每个参数方向）
const OPTIMAL_SAMPLES: usize = 48;

/// 形体构造/校验错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShapeError {
    #[error("Degenerate geometry: {0}")]
    Degenerate(String),

    #[error("Edge {edge} references missing face {face}")]
    DanglingFace { edge: usize, face: usize },

    #[error("Face {face} has invalid bounds: {reason}")]
    InvalidBounds { face: usize, reason: String },
}

/// 面在参数域中的边界
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FaceBounds {
    /// 平面多边形（参数坐标，外环 + 内孔），仅用于平面
    Polygon {
        outer: Vec<[f64; 2]>,
        holes: Vec<Vec<[f64; 2]>>,
    },
    /// 以平面原点为圆心的圆盘，仅用于平面
    Disk { radius: f64 },
    /// 参数矩形 [u0, u1] × [v0, v1]
    Rect { u: (f64, f64), v: (f64, f64) },
}

/// 面
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Face {
    pub surface: Surface,
    pub bounds: FaceBounds,
    /// 面方向与曲面自然方向相反
    #[serde(default)]
    pub reversed: bool,
}

impl Face {
    pub fn new(surface: Surface, bounds: FaceBounds) -> Self {
        Self {
            surface,
            bounds,
            reversed: false,
        }
    }

    /// 反向
    pub fn reversed(mut self) -> Self {
        self.reversed = !self.reversed;
        self
    }

    /// 廉价包围点（可能偏大，但一定包住整个面）
    fn hull_points(&self) -> Vec<Point3> {
        match (&self.surface, &self.bounds) {
            (Surface::Plane { .. }, FaceBounds::Polygon { outer, .. }) => outer
                .iter()
                .map(|[u, v]| self.surface.point_at(*u, *v))
                .collect(),
            (
                Surface::Plane {
                    origin,
                    x_axis,
                    y_axis,
                },
                FaceBounds::Disk { radius },
            ) => square_corners(origin, x_axis, y_axis, *radius),
            (
                Surface::Cylinder {
                    origin,
                    x_axis,
                    y_axis,
                    axis,
                    radius,
                },
                FaceBounds::Rect { v, .. },
            ) => {
                let mut points = square_corners(&(origin + axis * v.0), x_axis, y_axis, *radius);
                points.extend(square_corners(&(origin + axis * v.1), x_axis, y_axis, *radius));
                points
            }
            (Surface::Sphere { center, radius }, _) => {
                let r = Vector3::new(*radius, *radius, *radius);
                vec![center - r, center + r]
            }
            (_, FaceBounds::Rect { u, v }) => [(u.0, v.0), (u.1, v.0), (u.0, v.1), (u.1, v.1)]
                .iter()
                .map(|(a, b)| self.surface.point_at(*a, *b))
                .collect(),
            // 非平面上的多边形/圆盘在 validate 中被拒绝
            _ => Vec::new(),
        }
    }

    /// 致密采样点，用于精确包围盒
    fn sample_points(&self, density: usize) -> Vec<Point3> {
        match &self.bounds {
            FaceBounds::Polygon { outer, .. } => outer
                .iter()
                .map(|[u, v]| self.surface.point_at(*u, *v))
                .collect(),
            FaceBounds::Disk { radius } => {
                let n = density * 2;
                (0..n)
                    .map(|i| {
                        let t = 2.0 * PI * i as f64 / n as f64;
                        self.surface.point_at(radius * t.cos(), radius * t.sin())
                    })
                    .collect()
            }
            FaceBounds::Rect { u, v } => {
                let mut points = Vec::with_capacity((density + 1) * (density + 1));
                for i in 0..=density {
                    let pu = u.0 + (u.1 - u.0) * i as f64 / density as f64;
                    for j in 0..=density {
                        let pv = v.0 + (v.1 - v.0) * j as f64 / density as f64;
                        points.push(self.surface.point_at(pu, pv));
                    }
                }
                points
            }
        }
    }
}

/// 边
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub curve: Curve,
    /// 相邻面索引；同一索引出现两次表示该边是缝合边
    #[serde(default)]
    pub faces: Vec<usize>,
}

impl Edge {
    pub fn new(curve: Curve, faces: Vec<usize>) -> Self {
        Self { curve, faces }
    }

    pub fn free(curve: Curve) -> Self {
        Self {
            curve,
            faces: Vec::new(),
        }
    }
}

/// 形体数据（纯数据，可序列化）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShapeData {
    pub faces: Vec<Face>,
    pub edges: Vec<Edge>,
    /// 孤立顶点（点云）
    #[serde(default)]
    pub vertices: Vec<Point3>,
    /// 实体划分：每个实体包含的面索引
    #[serde(default)]
    pub solids: Vec<Vec<usize>>,
}

impl ShapeData {
    /// 检查拓扑引用和参数域边界
    pub fn validate(&self) -> Result<(), ShapeError> {
        for (i, edge) in self.edges.iter().enumerate() {
            if let Some(&face) = edge.faces.iter().find(|&&f| f >= self.faces.len()) {
                return Err(ShapeError::DanglingFace { edge: i, face });
            }
        }

        for solid in &self.solids {
            if let Some(&face) = solid.iter().find(|&&f| f >= self.faces.len()) {
                return Err(ShapeError::Degenerate(format!(
                    "solid references missing face {}",
                    face
                )));
            }
        }

        for (i, face) in self.faces.iter().enumerate() {
            let invalid = |reason: &str| ShapeError::InvalidBounds {
                face: i,
                reason: reason.to_string(),
            };
            match &face.bounds {
                FaceBounds::Polygon { outer, holes } => {
                    if !face.surface.is_planar() {
                        return Err(invalid("polygon bounds on a curved surface"));
                    }
                    if outer.len() < 3 || holes.iter().any(|h| h.len() < 3) {
                        return Err(invalid("polygon loop with fewer than 3 points"));
                    }
                }
                FaceBounds::Disk { radius } => {
                    if !face.surface.is_planar() {
                        return Err(invalid("disk bounds on a curved surface"));
                    }
                    if !(*radius > 0.0) {
                        return Err(invalid("non-positive disk radius"));
                    }
                }
                FaceBounds::Rect { u, v } => {
                    if !(u.1 > u.0 && v.1 > v.0) {
                        return Err(invalid("empty parameter rectangle"));
                    }
                }
            }
        }
        Ok(())
    }
}

/// 形体标识（共享分配的地址）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeId(usize);

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shape#{:x}", self.0)
    }
}

/// 形体类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShapeKind {
    /// 含面的形体（实体、壳、面）
    Faces,
    /// 仅含边（线框）
    Edges,
    /// 仅含顶点（点云）
    Vertices,
}

/// 不可变形体句柄
#[derive(Debug, Clone)]
pub struct Shape(Arc<ShapeData>);

impl From<ShapeData> for Shape {
    fn from(data: ShapeData) -> Self {
        Self(Arc::new(data))
    }
}

impl Shape {
    pub fn new(data: ShapeData) -> Self {
        data.into()
    }

    pub fn data(&self) -> &ShapeData {
        &self.0
    }

    /// 句柄标识，克隆的句柄相同
    pub fn id(&self) -> ShapeId {
        ShapeId(Arc::as_ptr(&self.0) as usize)
    }

    pub fn kind(&self) -> ShapeKind {
        if !self.0.faces.is_empty() {
            ShapeKind::Faces
        } else if !self.0.edges.is_empty() {
            ShapeKind::Edges
        } else {
            ShapeKind::Vertices
        }
    }

    /// 实体数量（未声明实体划分的含面形体按一个计）
    pub fn solid_count(&self) -> usize {
        match (self.0.solids.len(), self.0.faces.is_empty()) {
            (0, false) => 1,
            (n, _) => n,
        }
    }

    // ========== 包围盒 ==========

    /// 未放置形体的廉价包围盒
    ///
    /// 曲线和曲面取外接点，结果可能偏大。空形体返回 None。
    pub fn cheap_bounds(&self) -> Option<BoundingBox> {
        let data = &self.0;
        let points = data
            .faces
            .iter()
            .flat_map(|f| f.hull_points())
            .chain(data.edges.iter().flat_map(|e| e.curve.hull_points()))
            .chain(data.vertices.iter().copied());
        BoundingBox::from_points(points)
    }

    /// 放置后的包围盒
    ///
    /// `optimal` 为 true 时对放置后的几何致密采样得到紧包围盒，
    /// 否则对廉价包围盒做变换（旋转时偏大）。
    pub fn bounding_box(&self, placement: &Placement, optimal: bool) -> Option<BoundingBox> {
        if !optimal {
            return self.cheap_bounds().map(|bb| bb.transformed(placement));
        }

        let data = &self.0;
        let points = data
            .faces
            .iter()
            .flat_map(|f| f.sample_points(OPTIMAL_SAMPLES))
            .chain(
                data.edges
                    .iter()
                    .flat_map(|e| e.curve.discretize(e.curve.length() * 1e-4, Some(0.05))),
            )
            .chain(data.vertices.iter().copied())
            .map(|p| placement * p);
        BoundingBox::from_points(points)
    }

    // ========== 构造 ==========

    /// 轴对齐长方体
    ///
    /// 面顺序：底、顶、前(y-)、后(y+)、左(x-)、右(x+)。
    pub fn cuboid(min: Point3, max: Point3) -> Result<Self, ShapeError> {
        let d = max - min;
        if d.x <= EPSILON || d.y <= EPSILON || d.z <= EPSILON {
            return Err(ShapeError::Degenerate(format!(
                "cuboid with non-positive size {:?}",
                d
            )));
        }

        let ex = Vector3::new(d.x, 0.0, 0.0);
        let ey = Vector3::new(0.0, d.y, 0.0);
        let ez = Vector3::new(0.0, 0.0, d.z);

        let faces = vec![
            rect_face(min, ey, ex),
            rect_face(min + ez, ex, ey),
            rect_face(min, ex, ez),
            rect_face(min + ey, ez, ex),
            rect_face(min, ez, ey),
            rect_face(min + ex, ey, ez),
        ];

        // (轴, 侧) -> 面索引
        let face_of = |axis: usize, high: bool| match (axis, high) {
            (2, false) => 0,
            (2, true) => 1,
            (1, false) => 2,
            (1, true) => 3,
            (0, false) => 4,
            _ => 5,
        };

        let mut edges = Vec::with_capacity(12);
        for axis in 0..3 {
            let (b, c) = ((axis + 1) % 3, (axis + 2) % 3);
            for high_b in [false, true] {
                for high_c in [false, true] {
                    let mut start = min;
                    if high_b {
                        start[b] = max[b];
                    }
                    if high_c {
                        start[c] = max[c];
                    }
                    let mut end = start;
                    end[axis] = max[axis];
                    edges.push(Edge::new(
                        Curve::Line { start, end },
                        vec![face_of(b, high_b), face_of(c, high_c)],
                    ));
                }
            }
        }

        Ok(ShapeData {
            faces,
            edges,
            vertices: Vec::new(),
            solids: vec![(0..6).collect()],
        }
        .into())
    }

    /// 沿 +z 的圆柱体，底面圆心在 base
    pub fn cylinder(base: Point3, radius: f64, height: f64) -> Result<Self, ShapeError> {
        if radius <= EPSILON || height <= EPSILON {
            return Err(ShapeError::Degenerate(format!(
                "cylinder with radius {} and height {}",
                radius, height
            )));
        }

        let top = base + Vector3::new(0.0, 0.0, height);
        let faces = vec![
            Face::new(
                Surface::Cylinder {
                    origin: base,
                    x_axis: Vector3::x(),
                    y_axis: Vector3::y(),
                    axis: Vector3::z(),
                    radius,
                },
                FaceBounds::Rect {
                    u: (0.0, 2.0 * PI),
                    v: (0.0, height),
                },
            ),
            // 底面法向 -z
            Face::new(
                Surface::Plane {
                    origin: base,
                    x_axis: Vector3::x(),
                    y_axis: -Vector3::y(),
                },
                FaceBounds::Disk { radius },
            ),
            Face::new(
                Surface::Plane {
                    origin: top,
                    x_axis: Vector3::x(),
                    y_axis: Vector3::y(),
                },
                FaceBounds::Disk { radius },
            ),
        ];

        let seam_start = base + Vector3::new(radius, 0.0, 0.0);
        let edges = vec![
            Edge::new(
                Curve::full_circle(base, Vector3::x(), Vector3::y(), radius),
                vec![0, 1],
            ),
            Edge::new(
                Curve::full_circle(top, Vector3::x(), Vector3::y(), radius),
                vec![0, 2],
            ),
            Edge::new(
                Curve::Line {
                    start: seam_start,
                    end: seam_start + Vector3::new(0.0, 0.0, height),
                },
                vec![0, 0],
            ),
        ];

        Ok(ShapeData {
            faces,
            edges,
            vertices: Vec::new(),
            solids: vec![vec![0, 1, 2]],
        }
        .into())
    }

    /// 球体（单个面，带一条经线缝合边）
    pub fn sphere(center: Point3, radius: f64) -> Result<Self, ShapeError> {
        if radius <= EPSILON {
            return Err(ShapeError::Degenerate(format!(
                "sphere with radius {}",
                radius
            )));
        }

        let face = Face::new(
            Surface::Sphere { center, radius },
            FaceBounds::Rect {
                u: (0.0, 2.0 * PI),
                v: (-FRAC_PI_2, FRAC_PI_2),
            },
        );
        let seam = Edge::new(
            Curve::Circle {
                center,
                x_axis: Vector3::x(),
                y_axis: Vector3::z(),
                radius,
                start_angle: -FRAC_PI_2,
                end_angle: FRAC_PI_2,
            },
            vec![0, 0],
        );

        Ok(ShapeData {
            faces: vec![face],
            edges: vec![seam],
            vertices: Vec::new(),
            solids: vec![vec![0]],
        }
        .into())
    }

    /// 平面多边形面
    pub fn polygon(points: &[Point3]) -> Result<Self, ShapeError> {
        Self::polygon_with_holes(points, &[])
    }

    /// 带孔的平面多边形面
    ///
    /// 法向按 Newell 方法由外环计算，外环逆时针（从法向看）。
    pub fn polygon_with_holes(outer: &[Point3], holes: &[Vec<Point3>]) -> Result<Self, ShapeError> {
        if outer.len() < 3 {
            return Err(ShapeError::Degenerate(format!(
                "polygon with {} points",
                outer.len()
            )));
        }

        let normal = newell_normal(outer);
        if normal.norm() <= EPSILON {
            return Err(ShapeError::Degenerate(
                "polygon points are collinear".to_string(),
            ));
        }
        let normal = normal.normalize();

        let origin = outer[0];
        let x_axis = outer
            .iter()
            .map(|p| p - origin)
            .find(|v| v.norm() > EPSILON)
            .map(|v| v.normalize())
            .ok_or_else(|| ShapeError::Degenerate("polygon points coincide".to_string()))?;
        let y_axis = normal.cross(&x_axis);

        let to_uv = |p: &Point3| {
            let d = p - origin;
            [d.dot(&x_axis), d.dot(&y_axis)]
        };

        let mut edges = Vec::new();
        for ring in std::iter::once(outer).chain(holes.iter().map(|h| h.as_slice())) {
            for (i, start) in ring.iter().enumerate() {
                let end = ring[(i + 1) % ring.len()];
                edges.push(Edge::new(Curve::Line { start: *start, end }, vec![0]));
            }
        }

        let face = Face::new(
            Surface::Plane {
                origin,
                x_axis,
                y_axis,
            },
            FaceBounds::Polygon {
                outer: outer.iter().map(to_uv).collect(),
                holes: holes
                    .iter()
                    .map(|h| h.iter().map(to_uv).collect())
                    .collect(),
            },
        );

        let data = ShapeData {
            faces: vec![face],
            edges,
            vertices: Vec::new(),
            solids: Vec::new(),
        };
        data.validate()?;
        Ok(data.into())
    }

    /// 折线（仅含边）
    pub fn wire(points: &[Point3], closed: bool) -> Result<Self, ShapeError> {
        if points.len() < 2 {
            return Err(ShapeError::Degenerate(format!(
                "wire with {} points",
                points.len()
            )));
        }

        let mut edges: Vec<Edge> = points
            .windows(2)
            .map(|w| {
                Edge::free(Curve::Line {
                    start: w[0],
                    end: w[1],
                })
            })
            .collect();
        if closed && points.len() > 2 {
            edges.push(Edge::free(Curve::Line {
                start: points[points.len() - 1],
                end: points[0],
            }));
        }

        Ok(ShapeData {
            edges,
            ..Default::default()
        }
        .into())
    }

    /// 圆（仅含边）
    pub fn circle(center: Point3, radius: f64) -> Result<Self, ShapeError> {
        if radius <= EPSILON {
            return Err(ShapeError::Degenerate(format!(
                "circle with radius {}",
                radius
            )));
        }
        Ok(ShapeData {
            edges: vec![Edge::free(Curve::full_circle(
                center,
                Vector3::x(),
                Vector3::y(),
                radius,
            ))],
            ..Default::default()
        }
        .into())
    }

    /// 点云
    pub fn vertices(points: Vec<Point3>) -> Self {
        ShapeData {
            vertices: points,
            ..Default::default()
        }
        .into()
    }

    /// 组合多个形体（面索引重新编号，每个子形体的实体保留）
    pub fn compound(shapes: &[Shape]) -> Self {
        let mut data = ShapeData::default();
        for shape in shapes {
            let part = shape.data();
            let offset = data.faces.len();
            data.faces.extend(part.faces.iter().cloned());
            data.edges.extend(part.edges.iter().map(|e| Edge {
                curve: e.curve.clone(),
                faces: e.faces.iter().map(|f| f + offset).collect(),
            }));
            data.vertices.extend(part.vertices.iter().copied());
            if part.solids.is_empty() && !part.faces.is_empty() {
                data.solids.push((offset..offset + part.faces.len()).collect());
            } else {
                data.solids.extend(
                    part.solids
                        .iter()
                        .map(|s| s.iter().map(|f| f + offset).collect()),
                );
            }
        }
        data.into()
    }
}

/// 平面矩形面，u × v 为外法向
fn rect_face(origin: Point3, u: Vector3, v: Vector3) -> Face {
    Face::new(
        Surface::Plane {
            origin,
            x_axis: u.normalize(),
            y_axis: v.normalize(),
        },
        FaceBounds::Rect {
            u: (0.0, u.norm()),
            v: (0.0, v.norm()),
        },
    )
}

/// Newell 法向（未归一化，长度为多边形面积的两倍）
fn newell_normal(points: &[Point3]) -> Vector3 {
    let mut n = Vector3::zeros();
    for (i, p) in points.iter().enumerate() {
        let q = points[(i + 1) % points.len()];
        n.x += (p.y - q.y) * (p.z + q.z);
        n.y += (p.z - q.z) * (p.x + q.x);
        n.z += (p.x - q.x) * (p.y + q.y);
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_cube() -> Shape {
        Shape::cuboid(Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap()
    }

    #[test]
    fn test_identity_follows_handle() {
        let a = unit_cube();
        let b = a.clone();
        let c = unit_cube();
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn test_cuboid_topology() {
        let cube = unit_cube();
        let data = cube.data();
        assert_eq!(data.faces.len(), 6);
        assert_eq!(data.edges.len(), 12);
        assert!(data.validate().is_ok());
        for edge in &data.edges {
            assert_eq!(edge.faces.len(), 2);
            assert_ne!(edge.faces[0], edge.faces[1]);
        }
        // 每个面恰好与四条边相邻
        for face in 0..6 {
            let count = data
                .edges
                .iter()
                .filter(|e| e.faces.contains(&face))
                .count();
            assert_eq!(count, 4);
        }
    }

    #[test]
    fn test_cuboid_normals_point_outward() {
        let cube = unit_cube();
        let center = Point3::new(0.5, 0.5, 0.5);
        for face in &cube.data().faces {
            let p = face.surface.point_at(0.5, 0.5);
            let n = face.surface.normal_at(0.5, 0.5);
            assert!((p - center).dot(&n) > 0.0);
        }
    }

    #[test]
    fn test_cheap_bounds_contain_optimal() {
        let cylinder = Shape::cylinder(Point3::origin(), 1.0, 2.0).unwrap();
        let cheap = cylinder.cheap_bounds().unwrap();
        let optimal = cylinder
            .bounding_box(&Placement::identity(), true)
            .unwrap();

        assert_relative_eq!(cheap.zmax, 2.0);
        assert!(cheap.xmin <= optimal.xmin && cheap.xmax >= optimal.xmax);
        assert_relative_eq!(optimal.xmax, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_bounding_box_with_placement() {
        let cube = unit_cube();
        let bb = cube
            .bounding_box(&Placement::translation(2.0, 2.0, 2.0), false)
            .unwrap();
        assert_eq!(bb.to_array(), [2.0, 3.0, 2.0, 3.0, 2.0, 3.0]);
    }

    #[test]
    fn test_polygon_plane() {
        let square = Shape::polygon(&[
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(2.0, 0.0, 1.0),
            Point3::new(2.0, 2.0, 1.0),
            Point3::new(0.0, 2.0, 1.0),
        ])
        .unwrap();
        let face = &square.data().faces[0];
        assert_relative_eq!(face.surface.normal_at(0.0, 0.0).z, 1.0);
        assert_eq!(square.data().edges.len(), 4);
        assert_eq!(square.kind(), ShapeKind::Faces);

        assert!(Shape::polygon(&[
            Point3::origin(),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        ])
        .is_err());
    }

    #[test]
    fn test_kinds() {
        let wire = Shape::wire(&[Point3::origin(), Point3::new(1.0, 0.0, 0.0)], false).unwrap();
        assert_eq!(wire.kind(), ShapeKind::Edges);
        assert_eq!(wire.solid_count(), 0);

        let cloud = Shape::vertices(vec![Point3::origin()]);
        assert_eq!(cloud.kind(), ShapeKind::Vertices);
    }

    #[test]
    fn test_compound_offsets_faces() {
        let a = unit_cube();
        let b = Shape::cuboid(Point3::new(2.0, 0.0, 0.0), Point3::new(3.0, 1.0, 1.0)).unwrap();
        let compound = Shape::compound(&[a, b]);
        let data = compound.data();
        assert_eq!(data.faces.len(), 12);
        assert_eq!(compound.solid_count(), 2);
        assert!(data.edges[12..].iter().all(|e| e.faces.iter().all(|&f| f >= 6)));
        assert!(data.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_dangling_face() {
        let data = ShapeData {
            edges: vec![Edge::new(
                Curve::Line {
                    start: Point3::origin(),
                    end: Point3::new(1.0, 0.0, 0.0),
                },
                vec![3],
            )],
            ..Default::default()
        };
        assert_eq!(
            data.validate(),
            Err(ShapeError::DanglingFace { edge: 0, face: 3 })
        );
    }
}
