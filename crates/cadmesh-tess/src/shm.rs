//! 共享内存段
//!
//! 段是共享内存目录（Linux 上为 `/dev/shm`）中的文件，通过 memmap2 映射。
//! 协调器创建并写入段，工作进程只读映射，协调器在取得结果后释放（解除映射并删除）。

use crate::error::{Result, TessError};
use memmap2::{Mmap, MmapMut};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// 段名前缀
const SEGMENT_PREFIX: &str = "cadmesh_";

/// 生成唯一段名
pub fn unique_name() -> String {
    format!("{}{}", SEGMENT_PREFIX, Uuid::new_v4().simple())
}

/// 协调器持有的可写段
#[derive(Debug)]
pub struct SharedSegment {
    name: String,
    path: PathBuf,
    mmap: Option<MmapMut>,
    len: usize,
}

impl SharedSegment {
    /// 创建段并写入数据
    ///
    /// 同名段已存在（上次运行残留）或创建失败时，尽力删除后重试一次，
    /// 仍失败则返回 `ResourceExhausted`；写入时空间不足同样返回 `ResourceExhausted`。
    pub fn create(dir: &Path, name: &str, bytes: &[u8]) -> Result<Self> {
        let path = dir.join(name);
        let exhausted = |source: std::io::Error| TessError::ResourceExhausted {
            name: name.to_string(),
            source,
        };

        let mut file = match create_file(&path) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(
                    "Creating segment {} failed ({}), removing stale segment and retrying",
                    name,
                    e
                );
                let _ = fs::remove_file(&path);
                create_file(&path).map_err(exhausted)?
            }
        };

        let mmap = match map_and_write(&mut file, bytes) {
            Ok(mmap) => mmap,
            Err(e) => {
                let _ = fs::remove_file(&path);
                return Err(exhausted(e));
            }
        };

        Ok(Self {
            name: name.to_string(),
            path,
            mmap: Some(mmap),
            len: bytes.len(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 解除映射并删除段
    pub fn release(mut self) -> Result<()> {
        self.unlink()?;
        Ok(())
    }

    fn unlink(&mut self) -> std::io::Result<()> {
        // 先解除映射再删除
        if self.mmap.take().is_none() {
            return Ok(());
        }
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for SharedSegment {
    fn drop(&mut self) {
        if let Err(e) = self.unlink() {
            tracing::warn!("Failed to release segment {}: {}", self.name, e);
        }
    }
}

fn create_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(path)
}

/// 写入段内容后再映射
///
/// 数据经文件写入，tmpfs 写满时得到 ENOSPC 错误，而不是映射缺页时的 SIGBUS。
fn map_and_write(file: &mut File, bytes: &[u8]) -> std::io::Result<MmapMut> {
    write_segment(file, bytes)?;
    // SAFETY: 段文件由本进程以 create_new 独占创建，工作进程只读映射。
    let mmap = unsafe { MmapMut::map_mut(&*file)? };
    if mmap.len() != bytes.len() {
        return Err(std::io::Error::new(
            ErrorKind::UnexpectedEof,
            format!("segment mapped {} of {} bytes", mmap.len(), bytes.len()),
        ));
    }
    Ok(mmap)
}

fn write_segment(out: &mut impl Write, bytes: &[u8]) -> std::io::Result<()> {
    out.write_all(bytes)?;
    out.flush()
}

/// 工作进程侧的只读映射
///
/// 不负责删除段。
#[derive(Debug)]
pub struct SegmentReader {
    name: String,
    mmap: Mmap,
}

impl SegmentReader {
    pub fn attach(dir: &Path, name: &str) -> Result<Self> {
        let file = File::open(dir.join(name))?;
        // SAFETY: 协调器在收到本进程的响应之前不会修改或删除段。
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            name: name.to_string(),
            mmap,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Deref for SegmentReader {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.mmap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_attach_release() {
        let dir = tempdir().unwrap();
        let name = unique_name();
        let segment = SharedSegment::create(dir.path(), &name, b"hello segment").unwrap();
        assert_eq!(segment.len(), 13);

        let reader = SegmentReader::attach(dir.path(), &name).unwrap();
        assert_eq!(&reader[..], b"hello segment");
        drop(reader);

        let path = segment.path().to_path_buf();
        segment.release().unwrap();
        assert!(!path.exists());
        assert!(SegmentReader::attach(dir.path(), &name).is_err());
    }

    #[test]
    fn test_stale_segment_replaced() {
        let dir = tempdir().unwrap();
        let name = unique_name();
        std::fs::write(dir.path().join(&name), b"stale").unwrap();

        let segment = SharedSegment::create(dir.path(), &name, b"fresh").unwrap();
        let reader = SegmentReader::attach(dir.path(), &name).unwrap();
        assert_eq!(&reader[..], b"fresh");
        drop(segment);
    }

    #[test]
    fn test_unusable_dir_is_resource_exhausted() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("no-such-dir");
        let result = SharedSegment::create(&missing, &unique_name(), b"x");
        assert!(matches!(result, Err(TessError::ResourceExhausted { .. })));
    }

    #[test]
    fn test_full_device_reports_error() {
        // /dev/full 的每次写入都返回 ENOSPC，模拟写满的 tmpfs
        let Ok(mut full) = OpenOptions::new().write(true).open("/dev/full") else {
            return;
        };
        let err = write_segment(&mut full, &[0u8; 4096]).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(28));
    }

    #[test]
    fn test_drop_unlinks() {
        let dir = tempdir().unwrap();
        let name = unique_name();
        let segment = SharedSegment::create(dir.path(), &name, b"data").unwrap();
        let path = segment.path().to_path_buf();
        drop(segment);
        assert!(!path.exists());
    }
}
