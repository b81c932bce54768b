//! 数学基础类型
//!
//! - 三维点/向量（基于 nalgebra）
//! - 放置变换 `Placement`（刚体变换：平移 + 旋转）
//! - 三维包围盒 `BoundingBox`

use serde::{Deserialize, Serialize};
use std::fmt;

/// 三维点
pub type Point3 = nalgebra::Point3<f64>;

/// 三维向量
pub type Vector3 = nalgebra::Vector3<f64>;

/// 放置变换（平移 + 旋转），在细分前作用于形体
pub type Placement = nalgebra::Isometry3<f64>;

/// 通用几何容差
pub const EPSILON: f64 = 1e-10;

/// 包围盒"空"判定阈值（三个方向的尺寸都小于该值）
const EMPTY_SIZE: f64 = 0.01;

/// 按有效数字位数取整
///
/// 用于生成稳定的细分精度值（缓存键依赖于精度）
pub fn round_sig(x: f64, sig: i32) -> f64 {
    if x == 0.0 || !x.is_finite() {
        return x;
    }
    let digits = sig - x.abs().log10().floor() as i32 - 1;
    let factor = 10f64.powi(digits);
    (x * factor).round() / factor
}

/// 由平移和四元数 (x, y, z, w) 构造放置变换
pub fn placement_from_tq(t: [f64; 3], q: [f64; 4]) -> Placement {
    let rotation = nalgebra::UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(
        q[3], q[0], q[1], q[2],
    ));
    Placement::from_parts(nalgebra::Translation3::new(t[0], t[1], t[2]), rotation)
}

/// 将放置变换拆分为平移和四元数 (x, y, z, w)
pub fn placement_to_tq(placement: &Placement) -> ([f64; 3], [f64; 4]) {
    let t = placement.translation.vector;
    let q = placement.rotation.quaternion();
    ([t.x, t.y, t.z], [q.i, q.j, q.k, q.w])
}

/// 三维轴对齐包围盒
///
/// 合并（`update`）总是取两者中更宽松的边界，因此只会单调扩张。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
    pub zmin: f64,
    pub zmax: f64,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            xmin: 0.0,
            xmax: 0.0,
            ymin: 0.0,
            ymax: 0.0,
            zmin: 0.0,
            zmax: 0.0,
        }
    }
}

impl BoundingBox {
    pub fn new(xmin: f64, xmax: f64, ymin: f64, ymax: f64, zmin: f64, zmax: f64) -> Self {
        Self {
            xmin,
            xmax,
            ymin,
            ymax,
            zmin,
            zmax,
        }
    }

    /// 由最小角点和最大角点创建
    pub fn from_corners(min: Point3, max: Point3) -> Self {
        Self::new(min.x, max.x, min.y, max.y, min.z, max.z)
    }

    /// 由点集创建，点集为空时返回 None
    pub fn from_points(points: impl IntoIterator<Item = Point3>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bb = Self::from_corners(first, first);
        for p in iter {
            bb.include(&p);
        }
        Some(bb)
    }

    /// 由扁平 f32 坐标数组创建（x0, y0, z0, x1, ...）
    pub fn from_flat(coords: &[f32]) -> Option<Self> {
        Self::from_points(
            coords
                .chunks_exact(3)
                .map(|c| Point3::new(c[0] as f64, c[1] as f64, c[2] as f64)),
        )
    }

    /// 扩张以包含一个点
    pub fn include(&mut self, p: &Point3) {
        self.xmin = self.xmin.min(p.x);
        self.xmax = self.xmax.max(p.x);
        self.ymin = self.ymin.min(p.y);
        self.ymax = self.ymax.max(p.y);
        self.zmin = self.zmin.min(p.z);
        self.zmax = self.zmax.max(p.z);
    }

    /// 合并另一个包围盒（取更宽松的边界）
    pub fn update(&mut self, other: &BoundingBox) {
        self.xmin = self.xmin.min(other.xmin);
        self.xmax = self.xmax.max(other.xmax);
        self.ymin = self.ymin.min(other.ymin);
        self.ymax = self.ymax.max(other.ymax);
        self.zmin = self.zmin.min(other.zmin);
        self.zmax = self.zmax.max(other.zmax);
    }

    /// 返回两个包围盒的合并结果
    pub fn merged(&self, other: &BoundingBox) -> BoundingBox {
        let mut bb = *self;
        bb.update(other);
        bb
    }

    pub fn xsize(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn ysize(&self) -> f64 {
        self.ymax - self.ymin
    }

    pub fn zsize(&self) -> f64 {
        self.zmax - self.zmin
    }

    /// 三个方向的尺寸
    pub fn size(&self) -> [f64; 3] {
        [self.xsize(), self.ysize(), self.zsize()]
    }

    /// 中心点
    pub fn center(&self) -> Point3 {
        Point3::new(
            self.xmin + self.xsize() / 2.0,
            self.ymin + self.ysize() / 2.0,
            self.zmin + self.zsize() / 2.0,
        )
    }

    /// 所有坐标分量中的最大绝对值
    pub fn max(&self) -> f64 {
        self.to_array()
            .iter()
            .fold(0.0_f64, |acc, v| acc.max(v.abs()))
    }

    /// 三个方向尺寸都小于阈值时视为空
    pub fn is_empty(&self) -> bool {
        self.xsize().abs() < EMPTY_SIZE
            && self.ysize().abs() < EMPTY_SIZE
            && self.zsize().abs() < EMPTY_SIZE
    }

    /// 八个角点
    pub fn corners(&self) -> [Point3; 8] {
        let mut corners = [Point3::origin(); 8];
        let mut i = 0;
        for x in [self.xmin, self.xmax] {
            for y in [self.ymin, self.ymax] {
                for z in [self.zmin, self.zmax] {
                    corners[i] = Point3::new(x, y, z);
                    i += 1;
                }
            }
        }
        corners
    }

    /// 变换后的包围盒（对角点变换后重新取包围盒，旋转时会偏大）
    pub fn transformed(&self, placement: &Placement) -> BoundingBox {
        let corners = self.corners().map(|c| placement * c);
        // 八个角点非空，必然有结果
        Self::from_points(corners).unwrap_or(*self)
    }

    /// 中心到各角点的最大距离
    pub fn max_dist_from_center(&self) -> f64 {
        let center = self.center();
        self.corners()
            .iter()
            .map(|c| (c - center).norm())
            .fold(0.0, f64::max)
    }

    /// 原点到各角点的最大距离
    pub fn max_dist_from_origin(&self) -> f64 {
        self.corners()
            .iter()
            .map(|c| c.coords.norm())
            .fold(0.0, f64::max)
    }

    /// 六个标量 [xmin, xmax, ymin, ymax, zmin, zmax]
    pub fn to_array(&self) -> [f64; 6] {
        [
            self.xmin, self.xmax, self.ymin, self.ymax, self.zmin, self.zmax,
        ]
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{xmin:{:.2}, xmax:{:.2}, ymin:{:.2}, ymax:{:.2}, zmin:{:.2}, zmax:{:.2}}}",
            self.xmin, self.xmax, self.ymin, self.ymax, self.zmin, self.zmax
        )
    }
}
