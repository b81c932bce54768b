//! 网格后处理过滤器
//!
//! 网格生成器输出混合单元（顶点、折线、三角形、三角带、多边形），
//! 这里把它们转换为纯三角形列表并生成顶点法向。

use crate::error::{Result, TessError};
use cadmesh_core::math::{Point3, Vector3};

/// 相对面积低于此值的三角形视为退化
const DEGENERATE_TOLERANCE: f64 = 1e-12;

/// 网格生成器输出的单元
#[derive(Debug, Clone, PartialEq)]
pub enum MeshCell {
    Vertex(u32),
    Line(Vec<u32>),
    Triangle([u32; 3]),
    /// 三角带：第 i 个三角形为 (s[i], s[i+1], s[i+2])，奇数个交换前两点保持朝向
    Strip(Vec<u32>),
    /// 凸多边形，按扇形剖分
    Polygon(Vec<u32>),
}

/// 三角化结果
#[derive(Debug, Clone, Default)]
pub struct Triangulated {
    pub points: Vec<Point3>,
    pub triangles: Vec<u32>,
}

/// 三角化过滤器
///
/// 只保留被三角形引用的点，并按原顺序从 0 重新编号。
/// 顶点和折线单元不产生三角形；退化三角形（重复索引或零面积，
/// 例如球面极点行）被丢弃。
pub fn triangulate(points: &[Point3], cells: &[MeshCell]) -> Result<Triangulated> {
    let n = points.len() as u32;
    let check = |i: u32| {
        if i < n {
            Ok(i)
        } else {
            Err(TessError::GeometryConsistency(format!(
                "cell index {} out of range for {} points",
                i, n
            )))
        }
    };

    let mut raw: Vec<[u32; 3]> = Vec::new();
    let mut emit = |a: u32, b: u32, c: u32| -> Result<()> {
        let tri = [check(a)?, check(b)?, check(c)?];
        if tri[0] != tri[1]
            && tri[1] != tri[2]
            && tri[0] != tri[2]
            && !is_degenerate(&points[a as usize], &points[b as usize], &points[c as usize])
        {
            raw.push(tri);
        }
        Ok(())
    };

    for cell in cells {
        match cell {
            MeshCell::Vertex(i) => {
                check(*i)?;
            }
            MeshCell::Line(ids) => {
                for i in ids {
                    check(*i)?;
                }
            }
            MeshCell::Triangle([a, b, c]) => emit(*a, *b, *c)?,
            MeshCell::Strip(s) => {
                for i in 0..s.len().saturating_sub(2) {
                    if i % 2 == 0 {
                        emit(s[i], s[i + 1], s[i + 2])?;
                    } else {
                        emit(s[i + 1], s[i], s[i + 2])?;
                    }
                }
            }
            MeshCell::Polygon(p) => {
                for i in 1..p.len().saturating_sub(1) {
                    emit(p[0], p[i], p[i + 1])?;
                }
            }
        }
    }

    // 重新编号
    let mut remap = vec![u32::MAX; points.len()];
    for tri in &raw {
        for &i in tri {
            remap[i as usize] = 0;
        }
    }
    let mut kept = Vec::new();
    for (i, slot) in remap.iter_mut().enumerate() {
        if *slot == 0 {
            *slot = kept.len() as u32;
            kept.push(points[i]);
        }
    }

    let triangles = raw
        .iter()
        .flat_map(|tri| tri.iter().map(|&i| remap[i as usize]))
        .collect();

    Ok(Triangulated {
        points: kept,
        triangles,
    })
}

/// 三角形面积相对最长边是否可忽略
fn is_degenerate(a: &Point3, b: &Point3, c: &Point3) -> bool {
    let (ab, ac, bc) = (b - a, c - a, c - b);
    let longest = ab.norm_squared().max(ac.norm_squared()).max(bc.norm_squared());
    ab.cross(&ac).norm() <= DEGENERATE_TOLERANCE * longest
}

/// 法向生成过滤器
///
/// 每个顶点的法向为相邻三角形法向按面积加权的平均；
/// 退化三角形不参与，孤立顶点的法向为零向量。
pub fn generate_normals(points: &[Point3], triangles: &[u32]) -> Vec<Vector3> {
    let mut normals = vec![Vector3::zeros(); points.len()];
    for tri in triangles.chunks_exact(3) {
        let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
        // 叉积长度为面积的两倍，直接累加即面积加权
        let n = (points[b] - points[a]).cross(&(points[c] - points[a]));
        for i in [a, b, c] {
            normals[i] += n;
        }
    }
    for n in &mut normals {
        let len = n.norm();
        if len > 0.0 {
            *n /= len;
        }
    }
    normals
}

/// 翻转三角形朝向
pub fn flip_winding(triangles: &mut [u32]) {
    for tri in triangles.chunks_exact_mut(3) {
        tri.swap(1, 2);
    }
}
