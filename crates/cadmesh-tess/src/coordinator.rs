//! 并行细分协调器
//!
//! 每个请求的生命周期：Dispatched → Resolved（或 Failed）。
//!
//! - `dispatch`: 编码形体，写入新建的共享内存段，把段名、参数和放置提交给工作进程池
//! - `resolve`: 等待结果，原地替换缓存占位条目，释放段
//!
//! 段从创建到释放都归协调器所有；任务失败时同样释放。
//! 协调器被丢弃时，尚未取回结果的段被尽力释放，对应任务被放弃。

use crate::cache::{CacheKey, MeshCache};
use crate::error::{Result, TessError};
use crate::mesh::TessResult;
use crate::pool::WorkerPool;
use crate::protocol::WorkerOutcome;
use crate::shm::{unique_name, SharedSegment};
use crate::tessellator::TessParams;
use cadmesh_core::math::Placement;
use cadmesh_core::shape::Shape;
use cadmesh_file::encode_shape;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 进行中任务的句柄（以段名标识）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PendingHandle {
    name: String,
}

impl PendingHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for PendingHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// 任务阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Dispatched,
    Resolved,
    Failed,
}

enum JobState {
    Dispatched {
        job: u64,
        key: CacheKey,
        segment: SharedSegment,
    },
    Resolved {
        result: Arc<TessResult>,
    },
    Failed {
        error: String,
    },
}

/// 并行细分协调器
pub struct Coordinator<'p> {
    pool: &'p mut WorkerPool,
    jobs: HashMap<String, JobState>,
}

impl<'p> Coordinator<'p> {
    pub fn new(pool: &'p mut WorkerPool) -> Self {
        Self {
            pool,
            jobs: HashMap::new(),
        }
    }

    /// 分发一个细分任务
    pub fn dispatch(
        &mut self,
        shape: &Shape,
        placement: &Placement,
        params: &TessParams,
        key: CacheKey,
    ) -> Result<PendingHandle> {
        let bytes = encode_shape(shape.data())?;
        let name = unique_name();
        let segment = SharedSegment::create(self.pool.shm_dir(), &name, &bytes)?;

        // 提交失败时 segment 在此处被丢弃并释放
        let job = self.pool.submit(&name, params, placement)?;

        tracing::debug!(
            "Dispatched job {} for {} ({} bytes in {})",
            job,
            shape.id(),
            bytes.len(),
            name
        );

        self.jobs.insert(
            name.clone(),
            JobState::Dispatched { job, key, segment },
        );
        Ok(PendingHandle { name })
    }

    /// 取回任务结果
    ///
    /// 已完成的句柄直接返回保存的结果，不再访问进程池。
    pub fn resolve(
        &mut self,
        handle: &PendingHandle,
        cache: &mut MeshCache,
    ) -> Result<Arc<TessResult>> {
        let (job, key, segment) = match self.jobs.remove(&handle.name) {
            None => return Err(TessError::UnknownHandle(handle.name.clone())),
            Some(JobState::Resolved { result }) => {
                self.jobs
                    .insert(handle.name.clone(), JobState::Resolved { result: result.clone() });
                return Ok(result);
            }
            Some(JobState::Failed { error }) => {
                self.jobs
                    .insert(handle.name.clone(), JobState::Failed { error: error.clone() });
                return Err(TessError::WorkerFailure(error));
            }
            Some(JobState::Dispatched { job, key, segment }) => (job, key, segment),
        };

        let response = self.pool.wait(job);

        // 无论成功与否都释放段
        if let Err(e) = segment.release() {
            tracing::warn!("Failed to release segment {}: {}", handle.name, e);
        }

        let outcome = response.and_then(|r| {
            if r.segment != handle.name {
                return Err(TessError::WorkerFailure(format!(
                    "job {} answered for segment {} instead of {}",
                    job, r.segment, handle.name
                )));
            }
            match r.outcome {
                WorkerOutcome::Done(result) => {
                    result.validate()?;
                    Ok(Arc::new(result))
                }
                WorkerOutcome::Failed(error) => Err(TessError::WorkerFailure(error)),
            }
        });

        match outcome {
            Ok(result) => {
                cache.complete(key, result.clone());
                self.jobs.insert(
                    handle.name.clone(),
                    JobState::Resolved {
                        result: result.clone(),
                    },
                );
                tracing::debug!("Resolved job {} ({})", job, handle.name);
                Ok(result)
            }
            Err(e) => {
                self.jobs.insert(
                    handle.name.clone(),
                    JobState::Failed {
                        error: e.to_string(),
                    },
                );
                Err(e)
            }
        }
    }

    /// 查询任务阶段，未知句柄返回 None
    pub fn phase(&self, handle: &PendingHandle) -> Option<JobPhase> {
        self.jobs.get(&handle.name).map(|state| match state {
            JobState::Dispatched { .. } => JobPhase::Dispatched,
            JobState::Resolved { .. } => JobPhase::Resolved,
            JobState::Failed { .. } => JobPhase::Failed,
        })
    }

    /// 尚未取回结果的任务数
    pub fn outstanding(&self) -> usize {
        self.jobs
            .values()
            .filter(|s| matches!(s, JobState::Dispatched { .. }))
            .count()
    }
}

impl Drop for Coordinator<'_> {
    fn drop(&mut self) {
        let mut released = 0;
        for (_, state) in self.jobs.drain() {
            if let JobState::Dispatched { job, segment, .. } = state {
                self.pool.abandon(job);
                if let Err(e) = segment.release() {
                    tracing::warn!("Failed to release abandoned segment: {}", e);
                }
                released += 1;
            }
        }
        if released > 0 {
            tracing::warn!("Released {} segments of unresolved jobs", released);
        }
    }
}
