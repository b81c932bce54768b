//! 进度报告

use std::time::Instant;

/// 进度接收者
pub trait ProgressReporter {
    /// 前进 n 步
    fn update(&mut self, n: usize);

    /// 全部完成
    fn done(&mut self) {}
}

/// 进度总步数：并行模式每个叶子两步（分发 + 取回），顺序模式一步
pub fn progress_len(leaves: usize, parallel: bool) -> usize {
    if parallel {
        leaves * 2
    } else {
        leaves
    }
}

/// 不报告进度
#[derive(Debug, Default)]
pub struct NullProgress;

impl ProgressReporter for NullProgress {
    fn update(&mut self, _n: usize) {}
}

/// 记录到日志的进度条
///
/// 每前进 10% 记录一次。
#[derive(Debug)]
pub struct Progress {
    total: usize,
    current: usize,
    last_decile: usize,
    started: Instant,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            current: 0,
            last_decile: 0,
            started: Instant::now(),
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.current.min(self.total) as f64 / self.total as f64) * 100.0
        }
    }

    fn bar(&self) -> String {
        const WIDTH: usize = 20;
        let filled = (self.percent() / 100.0 * WIDTH as f64).round() as usize;
        format!("[{}{}]", "#".repeat(filled), ".".repeat(WIDTH - filled.min(WIDTH)))
    }
}

impl ProgressReporter for Progress {
    fn update(&mut self, n: usize) {
        self.current += n;
        let decile = (self.percent() / 10.0) as usize;
        if decile > self.last_decile {
            self.last_decile = decile;
            tracing::debug!(
                "{} {:>3.0}% ({}/{}) {:.2}s",
                self.bar(),
                self.percent(),
                self.current,
                self.total,
                self.started.elapsed().as_secs_f64()
            );
        }
    }

    fn done(&mut self) {
        tracing::debug!(
            "{} done: {} steps in {:.2}s",
            self.bar(),
            self.current,
            self.started.elapsed().as_secs_f64()
        );
    }
}
