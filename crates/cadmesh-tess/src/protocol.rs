//! 协调器与工作进程之间的消息
//!
//! 请求只携带段名、细分参数和放置，形体数据通过共享内存段传递。

use crate::mesh::TessResult;
use crate::tessellator::TessParams;
use cadmesh_core::math::Placement;
use serde::{Deserialize, Serialize};

/// 细分任务请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub job: u64,
    /// 存放编码形体的共享内存段名
    pub segment: String,
    pub params: TessParams,
    pub placement: Placement,
}

/// 任务结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerOutcome {
    Done(TessResult),
    Failed(String),
}

/// 细分任务响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub job: u64,
    pub segment: String,
    pub outcome: WorkerOutcome,
}
