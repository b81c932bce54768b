//! 单进程细分缓存
//!
//! 按（形体标识、放置、精度参数、输出标志）记忆细分结果。
//! 缓存是每次顶层渲染调用持有的局部对象，不是进程级单例：
//! 形体标识只在一次渲染期间保证唯一，跨渲染复用会把新形体误认成旧形体。

use crate::coordinator::PendingHandle;
use crate::error::Result;
use crate::mesh::TessResult;
use crate::tessellator::TessParams;
use cadmesh_core::math::{placement_to_tq, Placement};
use cadmesh_core::shape::{Shape, ShapeId};
use std::collections::HashMap;
use std::sync::Arc;

/// 缓存键，浮点数按位比较
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    shape: ShapeId,
    placement: [u64; 7],
    quality: u64,
    angular_tolerance: u64,
    edge_accuracy: u64,
    iso_lines: u32,
    faces: bool,
    edges: bool,
}

impl CacheKey {
    pub fn new(shape: &Shape, placement: &Placement, params: &TessParams) -> Self {
        let (t, q) = placement_to_tq(placement);
        let mut bits = [0u64; 7];
        for (slot, v) in bits.iter_mut().zip(t.iter().chain(q.iter())) {
            *slot = v.to_bits();
        }
        Self {
            shape: shape.id(),
            placement: bits,
            quality: params.quality.to_bits(),
            angular_tolerance: params.angular_tolerance.to_bits(),
            edge_accuracy: params.edge_accuracy.to_bits(),
            iso_lines: params.iso_lines,
            faces: params.compute_faces,
            edges: params.compute_edges,
        }
    }

    pub fn shape_id(&self) -> ShapeId {
        self.shape
    }
}

/// 缓存条目
#[derive(Debug, Clone)]
pub enum CacheEntry {
    /// 已完成的结果
    Ready(Arc<TessResult>),
    /// 并行任务进行中的占位
    Pending(PendingHandle),
}

/// 命中统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

/// 细分缓存
#[derive(Debug)]
pub struct MeshCache {
    entries: HashMap<CacheKey, CacheEntry>,
    enabled: bool,
    stats: CacheStats,
}

impl Default for MeshCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MeshCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            enabled: true,
            stats: CacheStats::default(),
        }
    }

    /// 命中时返回已有结果，否则调用 `f` 计算并存入
    ///
    /// 键上只有占位条目时同样重新计算（顺序路径不等待并行任务）。
    pub fn get_or_compute<F>(&mut self, key: CacheKey, f: F) -> Result<Arc<TessResult>>
    where
        F: FnOnce() -> Result<TessResult>,
    {
        if self.enabled {
            if let Some(CacheEntry::Ready(result)) = self.entries.get(&key) {
                self.stats.hits += 1;
                return Ok(result.clone());
            }
        }

        self.stats.misses += 1;
        let result = Arc::new(f()?);
        if self.enabled {
            self.entries.insert(key, CacheEntry::Ready(result.clone()));
        }
        Ok(result)
    }

    /// 查找条目并记录命中/未命中
    pub fn lookup(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        if !self.enabled {
            self.stats.misses += 1;
            return None;
        }
        match self.entries.get(key) {
            Some(entry) => {
                self.stats.hits += 1;
                Some(entry.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// 放入占位条目，缓存关闭时不存储并返回 false
    pub fn insert_pending(&mut self, key: CacheKey, handle: PendingHandle) -> bool {
        if self.enabled {
            self.entries.insert(key, CacheEntry::Pending(handle));
        }
        self.enabled
    }

    /// 用完成的结果原地替换占位条目
    pub fn complete(&mut self, key: CacheKey, result: Arc<TessResult>) {
        if self.enabled {
            self.entries.insert(key, CacheEntry::Ready(result));
        }
    }

    /// 清空所有条目和统计
    pub fn reset(&mut self) {
        self.entries.clear();
        self.stats = CacheStats::default();
    }

    /// 切换记忆开关，返回新的状态
    ///
    /// 关闭时丢弃已有条目。
    pub fn toggle(&mut self) -> bool {
        self.enabled = !self.enabled;
        if !self.enabled {
            self.entries.clear();
        }
        tracing::debug!(
            "Tessellation cache {}",
            if self.enabled { "enabled" } else { "disabled" }
        );
        self.enabled
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}
