//! 细分精度估算
//!
//! 线性精度由形体的廉价包围盒和偏差系数推导：
//! `quality = (xsize + ysize + zsize) / 300 * deviation`。
//! 各尺寸和结果都保留 3 位有效数字，保证相近形体得到稳定的缓存键。

use crate::config::RenderConfig;
use crate::tessellator::TessParams;
use cadmesh_core::math::{round_sig, BoundingBox};
use cadmesh_core::shape::{Shape, ShapeKind};

/// 保留的有效数字位数
const SIGNIFICANT_DIGITS: i32 = 3;

/// 由包围盒计算线性精度
///
/// 退化包围盒（尺寸为 0）按单位尺寸处理。
pub fn compute_quality(bb: &BoundingBox, deviation: f64) -> f64 {
    let sum = round_sig(bb.xsize(), SIGNIFICANT_DIGITS)
        + round_sig(bb.ysize(), SIGNIFICANT_DIGITS)
        + round_sig(bb.zsize(), SIGNIFICANT_DIGITS);
    let quality = round_sig(sum / 300.0 * deviation, SIGNIFICANT_DIGITS);
    if quality > 0.0 {
        quality
    } else {
        round_sig(deviation / 300.0, SIGNIFICANT_DIGITS)
    }
}

/// 推导边离散精度
///
/// 含面形体：`quality * 0.02 * deviation`；仅含边的形体：`0.01 * deviation`。
pub fn edge_accuracy(kind: ShapeKind, quality: f64, deviation: f64) -> f64 {
    match kind {
        ShapeKind::Faces => quality * 0.02 * deviation,
        ShapeKind::Edges | ShapeKind::Vertices => 0.01 * deviation,
    }
}

/// 为一个叶子形体估算完整的细分参数
///
/// 配置中显式给出的 quality / edge_accuracy 优先。
pub fn estimate(shape: &Shape, config: &RenderConfig) -> TessParams {
    let kind = shape.kind();
    let quality = config.quality.unwrap_or_else(|| {
        shape
            .cheap_bounds()
            .map(|bb| compute_quality(&bb, config.deviation))
            .unwrap_or_else(|| round_sig(config.deviation / 300.0, SIGNIFICANT_DIGITS))
    });
    let edge_accuracy = config
        .edge_accuracy
        .unwrap_or_else(|| edge_accuracy(kind, quality, config.deviation));

    TessParams {
        quality,
        angular_tolerance: config.angular_tolerance,
        edge_accuracy,
        iso_lines: config.iso_lines,
        compute_faces: kind == ShapeKind::Faces && config.render_faces,
        compute_edges: match kind {
            ShapeKind::Faces => config.render_edges,
            ShapeKind::Edges => true,
            ShapeKind::Vertices => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cadmesh_core::math::Point3;

    #[test]
    fn test_compute_quality() {
        let bb = BoundingBox::new(0.0, 10.0, 0.0, 20.0, 0.0, 30.0);
        assert_relative_eq!(compute_quality(&bb, 0.1), 0.02);

        // 3 位有效数字
        let bb = BoundingBox::new(0.0, 1.23456, 0.0, 1.0, 0.0, 1.0);
        assert_relative_eq!(compute_quality(&bb, 0.1), 0.00108);
    }

    #[test]
    fn test_degenerate_box() {
        let q = compute_quality(&BoundingBox::default(), 0.3);
        assert_relative_eq!(q, 0.001);
    }

    #[test]
    fn test_estimate_defaults() {
        let cube = Shape::cuboid(Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        let params = estimate(&cube, &RenderConfig::default());
        assert_relative_eq!(params.quality, 0.001);
        assert_relative_eq!(params.edge_accuracy, 0.001 * 0.02 * 0.1);
        assert!(params.compute_faces);
        assert!(params.compute_edges);
    }

    #[test]
    fn test_estimate_overrides_and_edge_only() {
        let config = RenderConfig {
            quality: Some(0.5),
            ..Default::default()
        };
        let cube = Shape::cuboid(Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        assert_eq!(estimate(&cube, &config).quality, 0.5);

        let wire = Shape::wire(&[Point3::origin(), Point3::new(5.0, 0.0, 0.0)], false).unwrap();
        let params = estimate(&wire, &RenderConfig::default());
        assert_relative_eq!(params.edge_accuracy, 0.001);
        assert!(!params.compute_faces);
        assert!(params.compute_edges);
    }
}
