//! 渲染与工作进程池配置

use crate::assembly::Color;
use crate::error::{Result, TessError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 指定工作进程可执行文件的环境变量
pub const ENV_WORKER: &str = "CADMESH_WORKER";

/// 指定共享内存段目录的环境变量（同时传递给工作进程）
pub const ENV_SHM_DIR: &str = "CADMESH_SHM_DIR";

/// 工作进程可执行文件名
pub const WORKER_BIN: &str = "cadmesh-worker";

/// 默认工作进程数：可用 CPU 的 80%，至少 1 个
pub fn default_workers() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    ((cpus as f64 * 0.8) as usize).max(1)
}

/// 默认共享内存段目录
pub fn default_shm_dir() -> PathBuf {
    let dev_shm = Path::new("/dev/shm");
    if cfg!(target_os = "linux") && dev_shm.is_dir() {
        dev_shm.to_path_buf()
    } else {
        std::env::temp_dir()
    }
}

/// 渲染配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// 相对偏差系数，用于推导线性精度
    pub deviation: f64,
    /// 绝对线性精度，None 时由包围盒推导
    pub quality: Option<f64>,
    /// 角度容差（弧度）
    pub angular_tolerance: f64,
    /// 边离散精度，None 时推导
    pub edge_accuracy: Option<f64>,
    /// 生成面网格
    pub render_faces: bool,
    /// 生成边折线
    pub render_edges: bool,
    /// 每个参数方向的等参线条数
    pub iso_lines: u32,
    /// 使用精确包围盒
    pub optimal_bb: bool,
    /// 使用多进程并行细分
    pub parallel: bool,
    /// 工作进程数，None 时取默认值
    pub workers: Option<usize>,
    /// 在结果中插入总包围盒线框
    pub show_bbox: bool,
    /// 默认面颜色
    pub default_color: Color,
    /// 默认边颜色
    pub default_edge_color: Color,
    /// 启用细分缓存
    pub cache: bool,
    /// 记录各阶段耗时
    pub timeit: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            deviation: 0.1,
            quality: None,
            angular_tolerance: 0.2,
            edge_accuracy: None,
            render_faces: true,
            render_edges: true,
            iso_lines: 0,
            optimal_bb: false,
            parallel: false,
            workers: None,
            show_bbox: false,
            default_color: Color::new(232, 176, 36),
            default_edge_color: Color::new(0x70, 0x70, 0x70),
            cache: true,
            timeit: false,
        }
    }
}

impl RenderConfig {
    /// 从 JSON 字符串解析（缺省字段取默认值）并校验
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)
            .map_err(|e| TessError::InvalidConfig(format!("JSON parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// 从 JSON 文件加载
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(TessError::InvalidConfig(format!(
                    "{} must be a positive number, got {}",
                    name, v
                )))
            }
        };

        positive("deviation", self.deviation)?;
        positive("angular_tolerance", self.angular_tolerance)?;
        if let Some(q) = self.quality {
            positive("quality", q)?;
        }
        if let Some(e) = self.edge_accuracy {
            positive("edge_accuracy", e)?;
        }
        if self.workers == Some(0) {
            return Err(TessError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// 实际使用的工作进程数
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(default_workers)
    }
}

/// 工作进程池配置
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// 工作进程可执行文件
    pub program: PathBuf,
    /// 进程数
    pub workers: usize,
    /// 共享内存段目录
    pub shm_dir: PathBuf,
}

impl PoolConfig {
    pub fn new(program: impl Into<PathBuf>, workers: usize) -> Self {
        Self {
            program: program.into(),
            workers: workers.max(1),
            shm_dir: std::env::var_os(ENV_SHM_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(default_shm_dir),
        }
    }

    /// 按环境解析工作进程程序
    ///
    /// 顺序：环境变量 `CADMESH_WORKER`，当前可执行文件同目录的 `cadmesh-worker`
    /// （测试可执行文件位于 `deps/` 下时再向上一级查找）。
    pub fn from_env(workers: usize) -> Result<Self> {
        if let Some(program) = std::env::var_os(ENV_WORKER) {
            return Ok(Self::new(program, workers));
        }

        let exe = std::env::current_exe()?;
        let file_name = format!("{}{}", WORKER_BIN, std::env::consts::EXE_SUFFIX);
        let mut dir = exe.parent();
        while let Some(d) = dir {
            let candidate = d.join(&file_name);
            if candidate.is_file() {
                return Ok(Self::new(candidate, workers));
            }
            if d.file_name().map_or(true, |n| n != "deps") {
                break;
            }
            dir = d.parent();
        }

        Err(TessError::PoolUnavailable(format!(
            "{} not found next to {} (set {})",
            file_name,
            exe.display(),
            ENV_WORKER
        )))
    }

    pub fn with_shm_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shm_dir = dir.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RenderConfig::default();
        assert_eq!(config.deviation, 0.1);
        assert_eq!(config.angular_tolerance, 0.2);
        assert!(config.render_edges);
        assert!(!config.parallel);
        assert_eq!(config.default_color.to_string(), "#e8b024");
        assert!(config.validate().is_ok());
        assert!(config.worker_count() >= 1);
    }

    #[test]
    fn test_partial_json() {
        let config =
            RenderConfig::from_json_str(r##"{"deviation": 0.5, "parallel": true, "default_color": "#ff0000"}"##)
                .unwrap();
        assert_eq!(config.deviation, 0.5);
        assert!(config.parallel);
        assert_eq!(config.default_color, Color::new(255, 0, 0));
        assert_eq!(config.angular_tolerance, 0.2);
    }

    #[test]
    fn test_invalid_values() {
        assert!(RenderConfig::from_json_str(r#"{"deviation": -1.0}"#).is_err());
        assert!(RenderConfig::from_json_str(r#"{"workers": 0}"#).is_err());
        assert!(RenderConfig::from_json_str(r#"{"quality": 0.0}"#).is_err());
        assert!(RenderConfig::from_json_str("not json").is_err());
    }
}
