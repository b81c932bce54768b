//! CADMesh 核心几何模型
//!
//! 提供细分管线所需的最小 B-rep 模型：解析曲线、解析曲面、带拓扑的不可变形体，
//! 以及放置变换和包围盒。
//!
//! # 示例
//!
//! ```rust
//! use cadmesh_core::prelude::*;
//!
//! let cube = Shape::cuboid(Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
//! let bb = cube.bounding_box(&Placement::translation(2.0, 0.0, 0.0), false).unwrap();
//! assert_eq!(bb.xmin, 2.0);
//! ```

pub mod geometry;
pub mod math;
pub mod shape;

pub mod prelude {
    //! 常用类型的便捷导入
    pub use crate::geometry::{arc_segments, Curve, Surface};
    pub use crate::math::{
        placement_from_tq, placement_to_tq, round_sig, BoundingBox, Placement, Point3, Vector3,
    };
    pub use crate::shape::{
        Edge, Face, FaceBounds, Shape, ShapeData, ShapeError, ShapeId, ShapeKind,
    };
}
