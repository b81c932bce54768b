//! 细分结果数据结构
//!
//! - `MeshBuffer`: 扁平顶点/法向/三角形索引缓冲
//! - `TriangleSoup`: 旧式无索引三角形汤
//! - `EdgeSegmentSet`: 按类别分桶的边线段
//! - `TessResult`: 一次细分的完整输出

use crate::error::{Result, TessError};
use cadmesh_core::math::BoundingBox;
use serde::{Deserialize, Serialize};

/// 三角形网格缓冲
///
/// 顶点和法向都是扁平的 `[x0, y0, z0, x1, ...]`，索引从 0 开始。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshBuffer {
    pub vertices: Vec<f32>,
    pub triangles: Vec<u32>,
    pub normals: Vec<f32>,
}

impl MeshBuffer {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// 检查缓冲一致性
    pub fn validate(&self) -> Result<()> {
        if self.vertices.len() % 3 != 0 {
            return Err(TessError::GeometryConsistency(format!(
                "vertex buffer length {} is not a multiple of 3",
                self.vertices.len()
            )));
        }
        if self.normals.len() != self.vertices.len() {
            return Err(TessError::GeometryConsistency(format!(
                "normal buffer length {} differs from vertex buffer length {}",
                self.normals.len(),
                self.vertices.len()
            )));
        }
        if self.triangles.len() % 3 != 0 {
            return Err(TessError::GeometryConsistency(format!(
                "triangle buffer length {} is not a multiple of 3",
                self.triangles.len()
            )));
        }
        let n = self.vertex_count();
        if let Some(&bad) = self.triangles.iter().find(|&&i| i as usize >= n) {
            return Err(TessError::GeometryConsistency(format!(
                "triangle index {} out of range for {} vertices",
                bad, n
            )));
        }
        Ok(())
    }

    /// 追加另一个网格（索引偏移）
    pub fn append(&mut self, other: &MeshBuffer) {
        let offset = self.vertex_count() as u32;
        self.vertices.extend_from_slice(&other.vertices);
        self.normals.extend_from_slice(&other.normals);
        self.triangles
            .extend(other.triangles.iter().map(|i| i + offset));
    }

    /// 顶点包围盒
    pub fn bounds(&self) -> Option<BoundingBox> {
        BoundingBox::from_flat(&self.vertices)
    }

    /// 展开为无索引三角形汤（每个三角形 9 个浮点数）
    pub fn to_soup(&self) -> Result<TriangleSoup> {
        self.validate()?;
        let mut vertices = Vec::with_capacity(self.triangles.len() * 3);
        let mut normals = Vec::with_capacity(self.triangles.len() * 3);
        for &i in &self.triangles {
            let i = i as usize * 3;
            vertices.extend_from_slice(&self.vertices[i..i + 3]);
            normals.extend_from_slice(&self.normals[i..i + 3]);
        }
        Ok(TriangleSoup {
            triangle_count: self.triangle_count(),
            vertices,
            normals,
        })
    }

    /// 由三角形汤构造（顶点不合并，索引顺序递增）
    pub fn from_soup(soup: &TriangleSoup) -> Result<Self> {
        soup.validate()?;
        let vertex_count = soup.vertices.len() / 3;
        let mesh = Self {
            vertices: soup.vertices.clone(),
            triangles: (0..vertex_count as u32).collect(),
            normals: soup.normals.clone(),
        };
        mesh.validate()?;
        Ok(mesh)
    }
}

/// 旧式无索引三角形汤
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriangleSoup {
    pub triangle_count: usize,
    pub vertices: Vec<f32>,
    pub normals: Vec<f32>,
}

impl TriangleSoup {
    /// 三角形数 × 9 必须等于顶点浮点数
    pub fn validate(&self) -> Result<()> {
        if self.triangle_count * 9 != self.vertices.len() {
            return Err(TessError::GeometryConsistency(format!(
                "{} triangles need {} vertex floats, got {}",
                self.triangle_count,
                self.triangle_count * 9,
                self.vertices.len()
            )));
        }
        if self.normals.len() != self.vertices.len() {
            return Err(TessError::GeometryConsistency(format!(
                "soup normals length {} differs from vertices length {}",
                self.normals.len(),
                self.vertices.len()
            )));
        }
        Ok(())
    }
}

/// 边线段类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// 不属于任何面，或属于单面形体的唯一面
    Free,
    /// 多面形体中只属于一个面
    Boundary,
    /// 属于两个不同的面
    Shared,
    /// 两次属于同一个面
    Seam,
    /// 曲面内部的等参线
    Isoline,
}

impl EdgeKind {
    pub const ALL: [EdgeKind; 5] = [
        EdgeKind::Free,
        EdgeKind::Boundary,
        EdgeKind::Shared,
        EdgeKind::Seam,
        EdgeKind::Isoline,
    ];
}

/// 线段（两个三维点）
pub type Segment = [[f32; 3]; 2];

/// 按类别分桶的边线段
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeSegmentSet {
    pub free: Vec<Segment>,
    pub boundary: Vec<Segment>,
    pub shared: Vec<Segment>,
    pub seam: Vec<Segment>,
    pub isoline: Vec<Segment>,
}

impl EdgeSegmentSet {
    pub fn bucket(&self, kind: EdgeKind) -> &[Segment] {
        match kind {
            EdgeKind::Free => &self.free,
            EdgeKind::Boundary => &self.boundary,
            EdgeKind::Shared => &self.shared,
            EdgeKind::Seam => &self.seam,
            EdgeKind::Isoline => &self.isoline,
        }
    }

    pub fn bucket_mut(&mut self, kind: EdgeKind) -> &mut Vec<Segment> {
        match kind {
            EdgeKind::Free => &mut self.free,
            EdgeKind::Boundary => &mut self.boundary,
            EdgeKind::Shared => &mut self.shared,
            EdgeKind::Seam => &mut self.seam,
            EdgeKind::Isoline => &mut self.isoline,
        }
    }

    /// 将一条折线按相邻点拆成线段放入指定类别
    pub fn push_polyline(&mut self, kind: EdgeKind, points: &[[f32; 3]]) {
        self.bucket_mut(kind)
            .extend(points.windows(2).map(|w| [w[0], w[1]]));
    }

    pub fn total(&self) -> usize {
        EdgeKind::ALL.iter().map(|k| self.bucket(*k).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// 所有线段端点的包围盒
    pub fn bounds(&self) -> Option<BoundingBox> {
        let flat: Vec<f32> = EdgeKind::ALL
            .iter()
            .flat_map(|k| self.bucket(*k).iter())
            .flat_map(|s| s.iter().flatten().copied())
            .collect();
        BoundingBox::from_flat(&flat)
    }
}

/// 一次细分的输出
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TessResult {
    pub mesh: Option<MeshBuffer>,
    pub edges: Option<EdgeSegmentSet>,
    /// 点云形体的放置后顶点（扁平）
    pub points: Option<Vec<f32>>,
    /// 放置后网格顶点的包围盒
    pub bounds: Option<BoundingBox>,
}

impl TessResult {
    pub fn validate(&self) -> Result<()> {
        if let Some(mesh) = &self.mesh {
            mesh.validate()?;
        }
        if let Some(points) = &self.points {
            if points.len() % 3 != 0 {
                return Err(TessError::GeometryConsistency(format!(
                    "point buffer length {} is not a multiple of 3",
                    points.len()
                )));
            }
        }
        Ok(())
    }
}
