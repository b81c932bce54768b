//! 解析几何定义
//!
//! 边的承载曲线：
//! - 直线段 (Line)
//! - 圆/圆弧 (Circle)
//!
//! 面的承载曲面：
//! - 平面 (Plane)
//! - 圆柱面 (Cylinder)
//! - 球面 (Sphere)
//!
//! 所有曲面都按参数 (u, v) 求值，约定 ∂P/∂u × ∂P/∂v 指向曲面外侧。

use crate::math::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// 单条曲线离散的最大分段数
pub const MAX_SEGMENTS: usize = 1024;

/// 计算圆弧满足弦高误差和角度容差所需的分段数
///
/// - `deflection`: 弦到圆弧的最大距离
/// - `angular_tolerance`: 相邻分段方向的最大夹角（弧度），None 表示不限制
pub fn arc_segments(
    radius: f64,
    sweep: f64,
    deflection: f64,
    angular_tolerance: Option<f64>,
) -> usize {
    let sweep = sweep.abs();
    if sweep <= 0.0 || radius <= 0.0 {
        return 1;
    }

    // 弦高 d = r(1 - cos(θ/2))  =>  θ = 2·acos(1 - d/r)
    let mut step = if deflection > 0.0 && deflection < radius {
        2.0 * (1.0 - deflection / radius).acos()
    } else {
        PI
    };

    if let Some(angle) = angular_tolerance {
        if angle > 0.0 {
            step = step.min(angle);
        }
    }

    let n = (sweep / step).ceil();
    if n.is_finite() {
        (n as usize).clamp(1, MAX_SEGMENTS)
    } else {
        MAX_SEGMENTS
    }
}

/// 边的承载曲线
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Curve {
    /// 直线段
    Line { start: Point3, end: Point3 },
    /// 圆弧：center + r·(cos t·x_axis + sin t·y_axis)，t ∈ [start_angle, end_angle]
    Circle {
        center: Point3,
        x_axis: Vector3,
        y_axis: Vector3,
        radius: f64,
        start_angle: f64,
        end_angle: f64,
    },
}

impl Curve {
    /// 整圆
    pub fn full_circle(center: Point3, x_axis: Vector3, y_axis: Vector3, radius: f64) -> Self {
        Curve::Circle {
            center,
            x_axis,
            y_axis,
            radius,
            start_angle: 0.0,
            end_angle: 2.0 * PI,
        }
    }

    /// 参数范围
    pub fn param_range(&self) -> (f64, f64) {
        match self {
            Curve::Line { .. } => (0.0, 1.0),
            Curve::Circle {
                start_angle,
                end_angle,
                ..
            } => (*start_angle, *end_angle),
        }
    }

    /// 按参数求点
    pub fn point_at(&self, t: f64) -> Point3 {
        match self {
            Curve::Line { start, end } => start + (end - start) * t,
            Curve::Circle {
                center,
                x_axis,
                y_axis,
                radius,
                ..
            } => center + (x_axis * t.cos() + y_axis * t.sin()) * *radius,
        }
    }

    /// 曲线长度
    pub fn length(&self) -> f64 {
        match self {
            Curve::Line { start, end } => (end - start).norm(),
            Curve::Circle {
                radius,
                start_angle,
                end_angle,
                ..
            } => (end_angle - start_angle).abs() * radius,
        }
    }

    /// 按弦高误差离散为折线
    ///
    /// 直线段总是只产生两个端点。
    pub fn discretize(&self, deflection: f64, angular_tolerance: Option<f64>) -> Vec<Point3> {
        let segments = match self {
            Curve::Line { .. } => 1,
            Curve::Circle {
                radius,
                start_angle,
                end_angle,
                ..
            } => arc_segments(*radius, end_angle - start_angle, deflection, angular_tolerance),
        };
        let (t0, t1) = self.param_range();
        (0..=segments)
            .map(|i| self.point_at(t0 + (t1 - t0) * i as f64 / segments as f64))
            .collect()
    }

    /// 廉价包围点（圆弧取外接正方形的四个角点）
    pub fn hull_points(&self) -> Vec<Point3> {
        match self {
            Curve::Line { start, end } => vec![*start, *end],
            Curve::Circle {
                center,
                x_axis,
                y_axis,
                radius,
                ..
            } => square_corners(center, x_axis, y_axis, *radius),
        }
    }
}

/// 面的承载曲面
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Surface {
    /// 平面：origin + u·x_axis + v·y_axis，法向 x_axis × y_axis
    Plane {
        origin: Point3,
        x_axis: Vector3,
        y_axis: Vector3,
    },
    /// 圆柱面：origin + r·(cos u·x_axis + sin u·y_axis) + v·axis
    Cylinder {
        origin: Point3,
        x_axis: Vector3,
        y_axis: Vector3,
        axis: Vector3,
        radius: f64,
    },
    /// 球面：center + r·(cos v·cos u·x + cos v·sin u·y + sin v·z)
    Sphere { center: Point3, radius: f64 },
}

impl Surface {
    /// 按参数求点
    pub fn point_at(&self, u: f64, v: f64) -> Point3 {
        match self {
            Surface::Plane {
                origin,
                x_axis,
                y_axis,
            } => origin + x_axis * u + y_axis * v,
            Surface::Cylinder {
                origin,
                x_axis,
                y_axis,
                axis,
                radius,
            } => origin + (x_axis * u.cos() + y_axis * u.sin()) * *radius + axis * v,
            Surface::Sphere { center, radius } => {
                center
                    + Vector3::new(v.cos() * u.cos(), v.cos() * u.sin(), v.sin()) * *radius
            }
        }
    }

    /// 解析法向（单位向量，朝外）
    pub fn normal_at(&self, u: f64, v: f64) -> Vector3 {
        match self {
            Surface::Plane { x_axis, y_axis, .. } => x_axis.cross(y_axis).normalize(),
            Surface::Cylinder { x_axis, y_axis, .. } => x_axis * u.cos() + y_axis * u.sin(),
            Surface::Sphere { .. } => Vector3::new(v.cos() * u.cos(), v.cos() * u.sin(), v.sin()),
        }
    }

    /// u 方向的曲率半径，None 表示该方向为直线
    pub fn u_radius(&self) -> Option<f64> {
        match self {
            Surface::Plane { .. } => None,
            Surface::Cylinder { radius, .. } | Surface::Sphere { radius, .. } => Some(*radius),
        }
    }

    /// v 方向的曲率半径，None 表示该方向为直线
    pub fn v_radius(&self) -> Option<f64> {
        match self {
            Surface::Plane { .. } | Surface::Cylinder { .. } => None,
            Surface::Sphere { radius, .. } => Some(*radius),
        }
    }

    pub fn is_planar(&self) -> bool {
        matches!(self, Surface::Plane { .. })
    }
}

/// 以 center 为中心、边长 2r 的正方形四角（位于 x_axis/y_axis 平面内）
pub(crate) fn square_corners(
    center: &Point3,
    x_axis: &Vector3,
    y_axis: &Vector3,
    radius: f64,
) -> Vec<Point3> {
    let mut points = Vec::with_capacity(4);
    for sx in [-1.0, 1.0] {
        for sy in [-1.0, 1.0] {
            points.push(center + (x_axis * sx + y_axis * sy) * radius);
        }
    }
    points
}
