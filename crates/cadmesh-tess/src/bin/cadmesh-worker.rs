//! 细分工作进程
//!
//! stdin 读取任务帧，stdout 写回结果帧；日志写到 stderr，避免干扰协议通道。

use cadmesh_tess::config::{default_shm_dir, ENV_SHM_DIR};
use cadmesh_tess::worker::serve;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

fn main() -> ExitCode {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("cadmesh-worker: failed to install logger");
    }

    let shm_dir = std::env::var_os(ENV_SHM_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(default_shm_dir);

    let stdin = std::io::stdin().lock();
    let stdout = BufWriter::new(std::io::stdout().lock());

    match serve(stdin, stdout, &shm_dir) {
        Ok(handled) => {
            tracing::debug!("Worker {} exiting after {} jobs", std::process::id(), handled);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Worker {} failed: {}", std::process::id(), e);
            ExitCode::FAILURE
        }
    }
}
