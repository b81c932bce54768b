//! 工作进程主循环
//!
//! 从输入流逐帧读取请求：映射共享内存段、解码形体、细分，再把结果写回输出流。
//! 段的释放由协调器负责，工作进程只读映射。

use crate::error::Result;
use crate::mesh::TessResult;
use crate::protocol::{WorkerOutcome, WorkerRequest, WorkerResponse};
use crate::shm::SegmentReader;
use crate::tessellator::tessellate;
use cadmesh_core::shape::Shape;
use cadmesh_file::{decode_shape, read_frame, write_frame};
use std::io::{Read, Write};
use std::path::Path;

/// 处理请求直到输入流结束，返回处理的任务数
///
/// 单个任务失败只写回失败响应；只有流读写错误会终止循环。
pub fn serve(mut input: impl Read, mut output: impl Write, shm_dir: &Path) -> Result<usize> {
    let mut handled = 0;
    while let Some(request) = read_frame::<WorkerRequest>(&mut input)? {
        let outcome = match process(&request, shm_dir) {
            Ok(result) => WorkerOutcome::Done(result),
            Err(e) => {
                tracing::warn!("Job {} ({}) failed: {}", request.job, request.segment, e);
                WorkerOutcome::Failed(e.to_string())
            }
        };

        write_frame(
            &mut output,
            &WorkerResponse {
                job: request.job,
                segment: request.segment,
                outcome,
            },
        )?;
        handled += 1;
    }
    Ok(handled)
}

fn process(request: &WorkerRequest, shm_dir: &Path) -> Result<TessResult> {
    let segment = SegmentReader::attach(shm_dir, &request.segment)?;
    let data = decode_shape(&segment)?;
    drop(segment);

    tracing::debug!(
        "Job {}: {} faces, {} edges",
        request.job,
        data.faces.len(),
        data.edges.len()
    );
    tessellate(&Shape::new(data), &request.placement, &request.params)
}
