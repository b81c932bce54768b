//! 细分后端
//!
//! 收集器通过 `TessellationBackend` 提交叶子：
//! - `SequentialTessellator`: 在当前线程立即细分
//! - `ParallelTessellator`: 分发到工作进程，返回待取回的句柄

use crate::cache::{CacheEntry, CacheKey, MeshCache};
use crate::coordinator::{Coordinator, JobPhase, PendingHandle};
use crate::error::{Result, TessError};
use crate::mesh::TessResult;
use crate::pool::WorkerPool;
use crate::tessellator::{tessellate, TessParams};
use cadmesh_core::math::Placement;
use cadmesh_core::shape::Shape;
use std::sync::Arc;

/// 一个叶子的细分请求
#[derive(Debug, Clone)]
pub struct TessRequest {
    pub shape: Shape,
    pub placement: Placement,
    pub params: TessParams,
}

impl TessRequest {
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(&self.shape, &self.placement, &self.params)
    }
}

/// 提交结果
#[derive(Debug, Clone)]
pub enum LeafMesh {
    Ready(Arc<TessResult>),
    Pending(PendingHandle),
}

/// 细分后端
pub trait TessellationBackend {
    /// 提交一个叶子
    fn submit(&mut self, request: &TessRequest, cache: &mut MeshCache) -> Result<LeafMesh>;

    /// 取回 `submit` 返回的待定结果
    fn resolve(&mut self, handle: &PendingHandle, cache: &mut MeshCache) -> Result<Arc<TessResult>>;

    fn is_parallel(&self) -> bool {
        false
    }
}

/// 顺序细分
#[derive(Debug, Default)]
pub struct SequentialTessellator;

impl TessellationBackend for SequentialTessellator {
    fn submit(&mut self, request: &TessRequest, cache: &mut MeshCache) -> Result<LeafMesh> {
        let result = cache.get_or_compute(request.cache_key(), || {
            tessellate(&request.shape, &request.placement, &request.params)
        })?;
        Ok(LeafMesh::Ready(result))
    }

    fn resolve(&mut self, handle: &PendingHandle, _cache: &mut MeshCache) -> Result<Arc<TessResult>> {
        Err(TessError::UnknownHandle(handle.name().to_string()))
    }
}

/// 多进程并行细分
///
/// 相同缓存键的叶子只分发一次，共享同一个句柄。
pub struct ParallelTessellator<'p> {
    coordinator: Coordinator<'p>,
}

impl<'p> ParallelTessellator<'p> {
    pub fn new(pool: &'p mut WorkerPool) -> Self {
        Self {
            coordinator: Coordinator::new(pool),
        }
    }

    pub fn phase(&self, handle: &PendingHandle) -> Option<JobPhase> {
        self.coordinator.phase(handle)
    }

    pub fn outstanding(&self) -> usize {
        self.coordinator.outstanding()
    }
}

impl TessellationBackend for ParallelTessellator<'_> {
    fn submit(&mut self, request: &TessRequest, cache: &mut MeshCache) -> Result<LeafMesh> {
        let key = request.cache_key();
        match cache.lookup(&key) {
            Some(CacheEntry::Ready(result)) => Ok(LeafMesh::Ready(result)),
            Some(CacheEntry::Pending(handle)) => Ok(LeafMesh::Pending(handle)),
            None => {
                let handle = self.coordinator.dispatch(
                    &request.shape,
                    &request.placement,
                    &request.params,
                    key,
                )?;
                cache.insert_pending(key, handle.clone());
                Ok(LeafMesh::Pending(handle))
            }
        }
    }

    fn resolve(&mut self, handle: &PendingHandle, cache: &mut MeshCache) -> Result<Arc<TessResult>> {
        self.coordinator.resolve(handle, cache)
    }

    fn is_parallel(&self) -> bool {
        true
    }
}
