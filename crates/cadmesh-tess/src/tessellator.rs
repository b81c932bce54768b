//! 形体细分
//!
//! 把一个形体在给定放置下转换为三角形网格和分类边线段：
//! - 平面多边形：耳切法（earcutr）
//! - 圆盘：凸多边形单元
//! - 参数矩形（平面、圆柱面、球面）：(u, v) 网格上的三角带
//!
//! 多实体形体的面在 rayon 线程池上并行网格化。本模块无状态，不接触缓存。

use crate::error::{Result, TessError};
use crate::filter::{flip_winding, generate_normals, triangulate, MeshCell};
use crate::mesh::{EdgeKind, EdgeSegmentSet, MeshBuffer, TessResult};
use cadmesh_core::geometry::{arc_segments, Surface};
use cadmesh_core::math::{Placement, Point3};
use cadmesh_core::shape::{Face, FaceBounds, Shape, ShapeData, ShapeKind};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// 整圆离散的最少分段数
const MIN_RING_SEGMENTS: usize = 3;

/// 细分参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TessParams {
    /// 绝对线性精度（弦高误差上限）
    pub quality: f64,
    /// 角度容差（弧度）
    pub angular_tolerance: f64,
    /// 边离散精度
    pub edge_accuracy: f64,
    /// 每个参数方向的等参线条数
    pub iso_lines: u32,
    pub compute_faces: bool,
    pub compute_edges: bool,
}

impl Default for TessParams {
    fn default() -> Self {
        Self {
            quality: 0.01,
            angular_tolerance: 0.2,
            edge_accuracy: 0.001,
            iso_lines: 0,
            compute_faces: true,
            compute_edges: true,
        }
    }
}

/// 细分一个形体
pub fn tessellate(shape: &Shape, placement: &Placement, params: &TessParams) -> Result<TessResult> {
    let data = shape.data();
    data.validate()?;

    let mesh = if params.compute_faces && !data.faces.is_empty() {
        Some(mesh_faces(data, shape.solid_count() > 1, placement, params)?)
    } else {
        None
    };

    let edges = if params.compute_edges {
        Some(edge_segments(data, placement, params))
    } else {
        None
    };

    let points = if shape.kind() == ShapeKind::Vertices {
        Some(
            data.vertices
                .iter()
                .flat_map(|p| to_f32(&(placement * p)))
                .collect(),
        )
    } else {
        None
    };

    let bounds = mesh.as_ref().and_then(|m| m.bounds());
    let result = TessResult {
        mesh,
        edges,
        points,
        bounds,
    };
    result.validate()?;

    tracing::debug!(
        "Tessellated {} faces -> {} triangles, {} edge segments",
        data.faces.len(),
        result.mesh.as_ref().map_or(0, |m| m.triangle_count()),
        result.edges.as_ref().map_or(0, |e| e.total())
    );

    Ok(result)
}

// ========== 面 ==========

fn mesh_faces(
    data: &ShapeData,
    parallel: bool,
    placement: &Placement,
    params: &TessParams,
) -> Result<MeshBuffer> {
    let parts: Vec<MeshBuffer> = if parallel {
        data.faces
            .par_iter()
            .map(|face| mesh_face(face, placement, params))
            .collect::<Result<_>>()?
    } else {
        data.faces
            .iter()
            .map(|face| mesh_face(face, placement, params))
            .collect::<Result<_>>()?
    };

    let mut mesh = MeshBuffer::default();
    for part in &parts {
        mesh.append(part);
    }
    Ok(mesh)
}

/// 网格化单个面并应用放置
fn mesh_face(face: &Face, placement: &Placement, params: &TessParams) -> Result<MeshBuffer> {
    let (points, cells) = match &face.bounds {
        FaceBounds::Polygon { outer, holes } => polygon_cells(&face.surface, outer, holes)?,
        FaceBounds::Disk { radius } => disk_cells(&face.surface, *radius, params),
        FaceBounds::Rect { u, v } => grid_cells(&face.surface, *u, *v, params),
    };

    let mut out = triangulate(&points, &cells)?;
    if face.reversed {
        flip_winding(&mut out.triangles);
    }
    let normals = generate_normals(&out.points, &out.triangles);

    let mesh = MeshBuffer {
        vertices: out
            .points
            .iter()
            .flat_map(|p| to_f32(&(placement * p)))
            .collect(),
        normals: normals
            .iter()
            .flat_map(|n| {
                let n = placement.rotation * n;
                [n.x as f32, n.y as f32, n.z as f32]
            })
            .collect(),
        triangles: out.triangles,
    };
    Ok(mesh)
}

/// 平面多边形（可带孔）：耳切剖分
fn polygon_cells(
    surface: &Surface,
    outer: &[[f64; 2]],
    holes: &[Vec<[f64; 2]>],
) -> Result<(Vec<Point3>, Vec<MeshCell>)> {
    let mut flat: Vec<f64> = Vec::new();
    let mut hole_indices: Vec<usize> = Vec::new();
    for [u, v] in outer {
        flat.push(*u);
        flat.push(*v);
    }
    for hole in holes {
        hole_indices.push(flat.len() / 2);
        for [u, v] in hole {
            flat.push(*u);
            flat.push(*v);
        }
    }

    let indices = earcutr::earcut(&flat, &hole_indices, 2).map_err(|e| {
        TessError::GeometryConsistency(format!("planar face cannot be triangulated: {:?}", e))
    })?;
    if indices.is_empty() {
        return Err(TessError::GeometryConsistency(
            "planar face cannot be triangulated: no triangles".to_string(),
        ));
    }

    let uv = |i: usize| (flat[2 * i], flat[2 * i + 1]);
    let cells = indices
        .chunks_exact(3)
        .map(|t| {
            let (a, b, c) = (uv(t[0]), uv(t[1]), uv(t[2]));
            // 参数域内逆时针即朝向曲面法向
            let area = (b.0 - a.0) * (c.1 - a.1) - (c.0 - a.0) * (b.1 - a.1);
            if area >= 0.0 {
                MeshCell::Triangle([t[0] as u32, t[1] as u32, t[2] as u32])
            } else {
                MeshCell::Triangle([t[0] as u32, t[2] as u32, t[1] as u32])
            }
        })
        .collect();

    let points = (0..flat.len() / 2)
        .map(|i| {
            let (u, v) = uv(i);
            surface.point_at(u, v)
        })
        .collect();

    Ok((points, cells))
}

/// 圆盘：边缘点组成一个凸多边形单元
fn disk_cells(surface: &Surface, radius: f64, params: &TessParams) -> (Vec<Point3>, Vec<MeshCell>) {
    let n = arc_segments(
        radius,
        2.0 * PI,
        params.quality,
        Some(params.angular_tolerance),
    )
    .max(MIN_RING_SEGMENTS);

    let points = (0..n)
        .map(|i| {
            let t = 2.0 * PI * i as f64 / n as f64;
            surface.point_at(radius * t.cos(), radius * t.sin())
        })
        .collect();
    (points, vec![MeshCell::Polygon((0..n as u32).collect())])
}

/// 某参数方向的分段数
fn direction_segments(radius: Option<f64>, span: f64, params: &TessParams) -> usize {
    match radius {
        Some(r) => {
            let n = arc_segments(r, span, params.quality, Some(params.angular_tolerance));
            if span >= 2.0 * PI - 1e-9 {
                n.max(MIN_RING_SEGMENTS)
            } else {
                n
            }
        }
        None => 1,
    }
}

/// 参数矩形：逐行三角带
fn grid_cells(
    surface: &Surface,
    u: (f64, f64),
    v: (f64, f64),
    params: &TessParams,
) -> (Vec<Point3>, Vec<MeshCell>) {
    let nu = direction_segments(surface.u_radius(), u.1 - u.0, params);
    let nv = direction_segments(surface.v_radius(), v.1 - v.0, params);

    let mut points = Vec::with_capacity((nu + 1) * (nv + 1));
    for j in 0..=nv {
        let pv = v.0 + (v.1 - v.0) * j as f64 / nv as f64;
        for i in 0..=nu {
            let pu = u.0 + (u.1 - u.0) * i as f64 / nu as f64;
            points.push(surface.point_at(pu, pv));
        }
    }

    let index = |i: usize, j: usize| (j * (nu + 1) + i) as u32;
    let cells = (0..nv)
        .map(|j| {
            MeshCell::Strip(
                (0..=nu)
                    .flat_map(|i| [index(i, j + 1), index(i, j)])
                    .collect(),
            )
        })
        .collect();
    (points, cells)
}

// ========== 边 ==========

/// 按相邻面对边分类
pub fn classify_edge(edge_faces: &[usize], face_count: usize) -> EdgeKind {
    match edge_faces {
        [] => EdgeKind::Free,
        [_] if face_count <= 1 => EdgeKind::Free,
        [_] => EdgeKind::Boundary,
        [a, b] if a == b => EdgeKind::Seam,
        _ => EdgeKind::Shared,
    }
}

fn edge_segments(data: &ShapeData, placement: &Placement, params: &TessParams) -> EdgeSegmentSet {
    let mut set = EdgeSegmentSet::default();

    for edge in &data.edges {
        let kind = classify_edge(&edge.faces, data.faces.len());
        let points: Vec<[f32; 3]> = edge
            .curve
            .discretize(params.edge_accuracy, Some(params.angular_tolerance))
            .iter()
            .map(|p| to_f32(&(placement * p)))
            .collect();
        set.push_polyline(kind, &points);
    }

    if params.iso_lines > 0 {
        for face in &data.faces {
            if let FaceBounds::Rect { u, v } = face.bounds {
                if !face.surface.is_planar() {
                    iso_lines(&mut set, &face.surface, u, v, placement, params);
                }
            }
        }
    }

    set
}

/// 曲面内部等参线：每个方向 iso_lines 条，等间距且不含边界
fn iso_lines(
    set: &mut EdgeSegmentSet,
    surface: &Surface,
    u: (f64, f64),
    v: (f64, f64),
    placement: &Placement,
    params: &TessParams,
) {
    let k = params.iso_lines as usize;
    let edge_params = TessParams {
        quality: params.edge_accuracy,
        ..*params
    };
    let nu = direction_segments(surface.u_radius(), u.1 - u.0, &edge_params);
    let nv = direction_segments(surface.v_radius(), v.1 - v.0, &edge_params);
    let place = |p: Point3| to_f32(&(placement * p));

    for i in 1..=k {
        let pu = u.0 + (u.1 - u.0) * i as f64 / (k + 1) as f64;
        let line: Vec<[f32; 3]> = (0..=nv)
            .map(|j| place(surface.point_at(pu, v.0 + (v.1 - v.0) * j as f64 / nv as f64)))
            .collect();
        set.push_polyline(EdgeKind::Isoline, &line);

        let pv = v.0 + (v.1 - v.0) * i as f64 / (k + 1) as f64;
        let line: Vec<[f32; 3]> = (0..=nu)
            .map(|j| place(surface.point_at(u.0 + (u.1 - u.0) * j as f64 / nu as f64, pv)))
            .collect();
        set.push_polyline(EdgeKind::Isoline, &line);
    }
}

fn to_f32(p: &Point3) -> [f32; 3] {
    [p.x as f32, p.y as f32, p.z as f32]
}
