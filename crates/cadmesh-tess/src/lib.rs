//! CADMesh 细分管线
//!
//! 把装配体树中的 B-rep 形体转换为显示用的网格数据：
//! - 细分（面网格 + 分类边线段）与精度估算
//! - 单次渲染内的结果缓存
//! - 基于工作进程和共享内存的并行细分
//! - 分层收集与包围盒合并
//!
//! # 示例
//!
//! ```rust
//! use cadmesh_tess::prelude::*;
//! use cadmesh_core::prelude::*;
//!
//! let cube = Shape::cuboid(Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
//! let root = Group::new("Group").with_child(Part::new("cube", cube));
//!
//! let mut renderer = Renderer::new(RenderConfig::default()).unwrap();
//! let output = renderer.render(&root).unwrap();
//! assert_eq!(output.states.len(), 1);
//! ```

pub mod assembly;
pub mod backend;
pub mod cache;
pub mod collector;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod filter;
pub mod mesh;
pub mod payload;
pub mod pool;
pub mod progress;
pub mod protocol;
pub mod quality;
pub mod renderer;
pub mod shm;
pub mod tessellator;
pub mod timer;
pub mod worker;

pub use error::{Result, TessError};

pub mod prelude {
    //! 常用类型的便捷导入
    pub use crate::assembly::{Color, Group, Node, Part};
    pub use crate::backend::{
        LeafMesh, ParallelTessellator, SequentialTessellator, TessRequest, TessellationBackend,
    };
    pub use crate::cache::{CacheEntry, CacheKey, CacheStats, MeshCache};
    pub use crate::collector::{collect, RenderOutput};
    pub use crate::config::{PoolConfig, RenderConfig};
    pub use crate::coordinator::{Coordinator, JobPhase, PendingHandle};
    pub use crate::error::TessError;
    pub use crate::mesh::{EdgeKind, EdgeSegmentSet, MeshBuffer, TessResult, TriangleSoup};
    pub use crate::payload::{GroupPayload, PartPayload, PayloadNode, States, VisibilityState};
    pub use crate::pool::WorkerPool;
    pub use crate::progress::{NullProgress, Progress, ProgressReporter};
    pub use crate::quality::compute_quality;
    pub use crate::renderer::Renderer;
    pub use crate::tessellator::{tessellate, TessParams};
}
