//! 渲染入口
//!
//! 每次 `render` 调用使用一个新的细分缓存；并行模式按调用决定，
//! 工作进程池首次需要时启动，之后在多次渲染之间复用。

use crate::assembly::Group;
use crate::backend::{ParallelTessellator, SequentialTessellator};
use crate::cache::MeshCache;
use crate::collector::{collect, RenderOutput};
use crate::config::{PoolConfig, RenderConfig};
use crate::error::{Result, TessError};
use crate::payload::insert_bounding_box;
use crate::pool::WorkerPool;
use crate::progress::{progress_len, Progress, ProgressReporter};
use crate::timer::Timer;

/// 是否支持多进程并行细分
pub fn parallel_supported() -> bool {
    cfg!(target_os = "linux")
}

/// 渲染器
pub struct Renderer {
    config: RenderConfig,
    pool_config: Option<PoolConfig>,
    pool: Option<WorkerPool>,
    /// 当前平台是否允许并行
    platform_parallel: bool,
}

impl Renderer {
    pub fn new(config: RenderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            pool_config: None,
            pool: None,
            platform_parallel: parallel_supported(),
        })
    }

    /// 指定工作进程池配置（默认按环境解析）
    pub fn with_pool_config(mut self, pool_config: PoolConfig) -> Self {
        self.pool_config = Some(pool_config);
        self
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// 已启动的工作进程池
    pub fn worker_pool(&self) -> Option<&WorkerPool> {
        self.pool.as_ref()
    }

    /// 本次渲染是否走并行路径
    pub fn use_parallel(&self, leaves: usize) -> bool {
        self.config.parallel && leaves >= 2 && self.platform_parallel
    }

    /// 每次渲染只决定一次，请求并行但平台不支持时记录警告
    fn decide_parallel(&self, leaves: usize) -> bool {
        let parallel = self.use_parallel(leaves);
        if !parallel && self.config.parallel && leaves >= 2 {
            tracing::warn!("Parallel tessellation is only supported on Linux, falling back to sequential");
        }
        parallel
    }

    /// 渲染装配体，进度记录到日志
    pub fn render(&mut self, root: &Group) -> Result<RenderOutput> {
        let leaves = root.count_leaves();
        let parallel = self.decide_parallel(leaves);
        let mut progress = Progress::new(progress_len(leaves, parallel));
        let output = self.run(root, leaves, parallel, &mut progress)?;
        progress.done();
        Ok(output)
    }

    /// 渲染装配体
    pub fn render_with_progress(
        &mut self,
        root: &Group,
        progress: &mut dyn ProgressReporter,
    ) -> Result<RenderOutput> {
        let leaves = root.count_leaves();
        let parallel = self.decide_parallel(leaves);
        self.run(root, leaves, parallel, progress)
    }

    fn run(
        &mut self,
        root: &Group,
        leaves: usize,
        parallel: bool,
        progress: &mut dyn ProgressReporter,
    ) -> Result<RenderOutput> {
        let _t = Timer::new(self.config.timeit, "render");

        let mut cache = MeshCache::new();
        if !self.config.cache {
            cache.toggle();
        }
        cache.reset();

        let result = if parallel {
            let pool = ensure_pool(&mut self.pool, self.pool_config.as_ref(), &self.config)?;
            let mut backend = ParallelTessellator::new(pool);
            collect(root, &self.config, &mut backend, &mut cache, progress)
        } else {
            collect(
                root,
                &self.config,
                &mut SequentialTessellator,
                &mut cache,
                progress,
            )
        };

        let mut output = match result {
            Ok(output) => output,
            Err(e) => {
                // 有工作进程退出时丢弃整个池，下次渲染重新启动；
                // 健康进程报告的细分失败不影响池
                let lost_worker = self
                    .pool
                    .as_ref()
                    .is_some_and(|pool| pool.alive_count() < pool.worker_count());
                if lost_worker {
                    self.shutdown();
                }
                return Err(e);
            }
        };

        if self.config.show_bbox {
            insert_bounding_box(&mut output.shapes, &mut output.states, &output.bb);
        }

        let stats = cache.stats();
        tracing::info!(
            "Rendered {} leaves ({}), cache {} hits / {} misses, bb {}",
            leaves,
            if parallel { "parallel" } else { "sequential" },
            stats.hits,
            stats.misses,
            output.bb
        );

        Ok(output)
    }

    /// 停止工作进程池
    pub fn shutdown(&mut self) {
        if let Some(mut pool) = self.pool.take() {
            pool.shutdown();
        }
    }
}

/// 首次需要时启动工作进程池
fn ensure_pool<'a>(
    slot: &'a mut Option<WorkerPool>,
    pool_config: Option<&PoolConfig>,
    config: &RenderConfig,
) -> Result<&'a mut WorkerPool> {
    if slot.is_none() {
        let pool_config = match pool_config {
            Some(c) => c.clone(),
            None => PoolConfig::from_env(config.worker_count())?,
        };
        *slot = Some(WorkerPool::start(&pool_config)?);
    }
    slot.as_mut()
        .ok_or_else(|| TessError::PoolUnavailable("worker pool not started".to_string()))
}
