//! 长度前缀消息帧
//!
//! 帧格式：u32 小端长度 + MessagePack（带字段名）消息体。
//! 在帧边界处遇到 EOF 表示流正常结束。

use crate::error::FileError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{ErrorKind, Read, Write};

/// 单帧最大长度（256 MiB）
pub const MAX_FRAME_SIZE: usize = 256 * 1024 * 1024;

/// 写入一帧并刷新
pub fn write_frame<T: Serialize>(writer: &mut impl Write, message: &T) -> Result<(), FileError> {
    let body = rmp_serde::to_vec_named(message)?;
    if body.len() > MAX_FRAME_SIZE {
        return Err(FileError::Corruption(format!(
            "Frame of {} bytes exceeds limit of {} bytes",
            body.len(),
            MAX_FRAME_SIZE
        )));
    }

    writer.write_all(&(body.len() as u32).to_le_bytes())?;
    writer.write_all(&body)?;
    writer.flush()?;
    Ok(())
}

/// 读取一帧，流在帧边界结束时返回 None
pub fn read_frame<T: DeserializeOwned>(reader: &mut impl Read) -> Result<Option<T>, FileError> {
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        match reader.read(&mut len_buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(FileError::Corruption(
                    "Stream ended inside a frame header".to_string(),
                ))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(FileError::Corruption(format!(
            "Frame length {} exceeds limit of {} bytes",
            len, MAX_FRAME_SIZE
        )));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            FileError::Corruption(format!("Stream ended inside a {} byte frame", len))
        } else {
            e.into()
        }
    })?;

    Ok(Some(rmp_serde::from_slice(&body)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        job: u64,
        name: String,
    }

    #[test]
    fn test_frames_in_sequence() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &Ping { job: 1, name: "a".into() }).unwrap();
        write_frame(&mut buf, &Ping { job: 2, name: "b".into() }).unwrap();

        let mut reader = buf.as_slice();
        let first: Option<Ping> = read_frame(&mut reader).unwrap();
        let second: Option<Ping> = read_frame(&mut reader).unwrap();
        let end: Option<Ping> = read_frame(&mut reader).unwrap();

        assert_eq!(first.map(|p| p.job), Some(1));
        assert_eq!(second.map(|p| p.name), Some("b".to_string()));
        assert!(end.is_none());
    }

    #[test]
    fn test_truncated_frame() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &Ping { job: 7, name: "x".into() }).unwrap();
        buf.pop();

        let result: Result<Option<Ping>, _> = read_frame(&mut buf.as_slice());
        assert!(matches!(result, Err(FileError::Corruption(_))));
    }

    #[test]
    fn test_oversized_frame() {
        let buf = (u32::MAX).to_le_bytes();
        let result: Result<Option<Ping>, _> = read_frame(&mut buf.as_slice());
        assert!(matches!(result, Err(FileError::Corruption(_))));
    }
}
