//! 工作进程池
//!
//! 启动若干 `cadmesh-worker` 子进程，通过管道收发长度前缀消息帧：
//! - 任务写入未完成任务最少的工作进程的 stdin
//! - 每个工作进程一个读线程，把响应转发到池的结果通道（crossbeam）
//! - `wait` 阻塞直到指定任务的响应到达，期间到达的其他响应先缓存

use crate::config::{PoolConfig, ENV_SHM_DIR};
use crate::error::{Result, TessError};
use crate::protocol::{WorkerRequest, WorkerResponse};
use crate::tessellator::TessParams;
use cadmesh_core::math::Placement;
use cadmesh_file::{read_frame, write_frame};
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::collections::{HashMap, HashSet};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

/// 读线程发往池的事件
#[derive(Debug)]
enum PoolEvent {
    Response {
        worker: usize,
        response: WorkerResponse,
    },
    Exited {
        worker: usize,
        reason: String,
    },
}

/// 单个工作进程
struct WorkerProcess {
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    reader: Option<JoinHandle<()>>,
    /// 已发送但尚未收到响应的任务
    outstanding: HashSet<u64>,
    alive: bool,
}

/// 工作进程池
pub struct WorkerPool {
    workers: Vec<WorkerProcess>,
    events: Receiver<PoolEvent>,
    /// 已到达但尚未被等待的响应
    buffered: HashMap<u64, WorkerResponse>,
    /// 工作进程退出导致失败的任务
    failed: HashMap<u64, String>,
    /// 不再等待的任务，响应到达时丢弃
    abandoned: HashSet<u64>,
    next_job: u64,
    shm_dir: PathBuf,
}

impl WorkerPool {
    /// 启动工作进程
    pub fn start(config: &PoolConfig) -> Result<Self> {
        let (tx, rx) = unbounded();
        let mut workers = Vec::with_capacity(config.workers);

        for index in 0..config.workers.max(1) {
            let mut child = Command::new(&config.program)
                .env(ENV_SHM_DIR, &config.shm_dir)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::inherit())
                .spawn()
                .map_err(|e| {
                    TessError::PoolUnavailable(format!(
                        "cannot start {}: {}",
                        config.program.display(),
                        e
                    ))
                })?;

            let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
                (Some(stdin), Some(stdout)) => (stdin, stdout),
                _ => {
                    let _ = child.kill();
                    return Err(TessError::PoolUnavailable(
                        "worker pipes not available".to_string(),
                    ));
                }
            };

            let reader = spawn_reader(index, stdout, tx.clone())?;
            workers.push(WorkerProcess {
                child,
                stdin: Some(BufWriter::new(stdin)),
                reader: Some(reader),
                outstanding: HashSet::new(),
                alive: true,
            });
        }

        tracing::info!(
            "Started {} tessellation workers ({}), segments in {}",
            workers.len(),
            config.program.display(),
            config.shm_dir.display()
        );

        Ok(Self {
            workers,
            events: rx,
            buffered: HashMap::new(),
            failed: HashMap::new(),
            abandoned: HashSet::new(),
            next_job: 0,
            shm_dir: config.shm_dir.clone(),
        })
    }

    /// 共享内存段目录（与工作进程一致）
    pub fn shm_dir(&self) -> &Path {
        &self.shm_dir
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// 存活的工作进程数
    pub fn alive_count(&self) -> usize {
        self.workers.iter().filter(|w| w.alive).count()
    }

    /// 提交任务，返回任务号
    pub fn submit(&mut self, segment: &str, params: &TessParams, placement: &Placement) -> Result<u64> {
        let index = self
            .workers
            .iter()
            .enumerate()
            .filter(|(_, w)| w.alive)
            .min_by_key(|(_, w)| w.outstanding.len())
            .map(|(i, _)| i)
            .ok_or_else(|| TessError::WorkerFailure("no live workers".to_string()))?;

        let job = self.next_job;
        self.next_job += 1;

        let request = WorkerRequest {
            job,
            segment: segment.to_string(),
            params: *params,
            placement: *placement,
        };

        let worker = &mut self.workers[index];
        let sent = match worker.stdin.as_mut() {
            Some(stdin) => write_frame(stdin, &request),
            None => {
                return Err(TessError::WorkerFailure(format!(
                    "worker {} input closed",
                    index
                )))
            }
        };
        if let Err(e) = sent {
            worker.alive = false;
            worker.stdin = None;
            return Err(TessError::WorkerFailure(format!(
                "cannot send job {} to worker {}: {}",
                job, index, e
            )));
        }

        worker.outstanding.insert(job);
        tracing::debug!("Job {} ({}) -> worker {}", job, segment, index);
        Ok(job)
    }

    /// 阻塞等待任务的响应
    pub fn wait(&mut self, job: u64) -> Result<WorkerResponse> {
        loop {
            if let Some(response) = self.buffered.remove(&job) {
                return Ok(response);
            }
            if let Some(reason) = self.failed.remove(&job) {
                return Err(TessError::WorkerFailure(reason));
            }
            if !self.workers.iter().any(|w| w.outstanding.contains(&job)) {
                return Err(TessError::UnknownHandle(format!("job {}", job)));
            }

            let event = self.events.recv().map_err(|_| {
                TessError::WorkerFailure("all workers disconnected".to_string())
            })?;
            self.handle_event(event);
        }
    }

    /// 放弃任务，响应到达时丢弃
    pub fn abandon(&mut self, job: u64) {
        self.buffered.remove(&job);
        self.failed.remove(&job);
        if self.workers.iter().any(|w| w.outstanding.contains(&job)) {
            self.abandoned.insert(job);
        }
    }

    fn handle_event(&mut self, event: PoolEvent) {
        match event {
            PoolEvent::Response { worker, response } => {
                if let Some(w) = self.workers.get_mut(worker) {
                    w.outstanding.remove(&response.job);
                }
                if !self.abandoned.remove(&response.job) {
                    self.buffered.insert(response.job, response);
                }
            }
            PoolEvent::Exited { worker, reason } => {
                let Some(w) = self.workers.get_mut(worker) else {
                    return;
                };
                w.alive = false;
                w.stdin = None;
                let status = match w.child.try_wait() {
                    Ok(Some(status)) => status.to_string(),
                    _ => "still running".to_string(),
                };
                let outstanding: Vec<u64> = w.outstanding.drain().collect();
                tracing::warn!(
                    "Worker {} stopped ({}; {}) with {} jobs outstanding",
                    worker,
                    reason,
                    status,
                    outstanding.len()
                );
                for job in outstanding {
                    if !self.abandoned.remove(&job) {
                        self.failed.insert(
                            job,
                            format!("worker {} exited before finishing job {}: {}", worker, job, reason),
                        );
                    }
                }
            }
        }
    }

    /// 关闭输入并回收所有工作进程
    pub fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        for w in &mut self.workers {
            // 关闭 stdin 即通知工作进程退出
            w.stdin = None;
        }
        for (index, w) in self.workers.iter_mut().enumerate() {
            if let Err(e) = w.child.wait() {
                tracing::warn!("Failed to reap worker {}: {}", index, e);
            }
            if let Some(reader) = w.reader.take() {
                let _ = reader.join();
            }
        }
        tracing::info!("Stopped {} tessellation workers", self.workers.len());
        self.workers.clear();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_reader(index: usize, stdout: ChildStdout, tx: Sender<PoolEvent>) -> Result<JoinHandle<()>> {
    let handle = std::thread::Builder::new()
        .name(format!("cadmesh-pool-reader-{}", index))
        .spawn(move || {
            let mut reader = BufReader::new(stdout);
            loop {
                let event = match read_frame::<WorkerResponse>(&mut reader) {
                    Ok(Some(response)) => PoolEvent::Response {
                        worker: index,
                        response,
                    },
                    Ok(None) => PoolEvent::Exited {
                        worker: index,
                        reason: "output closed".to_string(),
                    },
                    Err(e) => PoolEvent::Exited {
                        worker: index,
                        reason: e.to_string(),
                    },
                };
                let stop = matches!(event, PoolEvent::Exited { .. });
                if tx.send(event).is_err() || stop {
                    break;
                }
            }
        })?;
    Ok(handle)
}
