//! 阶段计时

use std::time::Instant;

/// 计时守卫，离开作用域时记录耗时（仅在启用时）
#[derive(Debug)]
pub struct Timer {
    name: String,
    started: Instant,
    enabled: bool,
}

impl Timer {
    pub fn new(enabled: bool, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            started: Instant::now(),
            enabled,
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        if self.enabled {
            tracing::info!("{}: {:.3}s", self.name, self.elapsed_secs());
        }
    }
}
