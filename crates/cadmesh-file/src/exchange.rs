//! CADMesh 形体交换格式（.cmsh）
//!
//! 16 字节文件头 + Zstd 压缩的 MessagePack 形体数据。
//! 同一编码既用于落盘，也用于通过共享内存把形体交给工作进程。

use crate::error::FileError;
use cadmesh_core::shape::{Shape, ShapeData};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// 魔数 "CMSH"
const MAGIC: &[u8; 4] = b"CMSH";

/// 当前格式版本
const FORMAT_VERSION: u32 = 1;

/// Zstd 压缩级别（跨进程传输更看重速度）
const COMPRESSION_LEVEL: i32 = 1;

/// 文件头长度
pub const HEADER_SIZE: usize = 16;

/// 文件头（16 字节）
#[derive(Debug)]
struct Header {
    /// 魔数 "CMSH"
    magic: [u8; 4],
    /// 格式版本
    version: u32,
    /// 标志位（预留）
    flags: u32,
    /// 压缩后数据长度
    payload_size: u32,
}

impl Header {
    fn new(payload_size: u32) -> Self {
        Self {
            magic: *MAGIC,
            version: FORMAT_VERSION,
            flags: 0,
            payload_size,
        }
    }

    fn write(&self, writer: &mut impl Write) -> Result<(), std::io::Error> {
        writer.write_all(&self.magic)?;
        writer.write_all(&self.version.to_le_bytes())?;
        writer.write_all(&self.flags.to_le_bytes())?;
        writer.write_all(&self.payload_size.to_le_bytes())?;
        Ok(())
    }

    fn read(reader: &mut impl Read) -> Result<Self, FileError> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;

        if &magic != MAGIC {
            return Err(FileError::InvalidFormat(
                "Invalid magic number, not a CMSH shape".to_string(),
            ));
        }

        let mut buf = [0u8; 4];

        reader.read_exact(&mut buf)?;
        let version = u32::from_le_bytes(buf);

        reader.read_exact(&mut buf)?;
        let flags = u32::from_le_bytes(buf);

        reader.read_exact(&mut buf)?;
        let payload_size = u32::from_le_bytes(buf);

        if version > FORMAT_VERSION {
            return Err(FileError::UnsupportedVersion(format!(
                "Shape version {} is newer than supported version {}",
                version, FORMAT_VERSION
            )));
        }

        Ok(Self {
            magic,
            version,
            flags,
            payload_size,
        })
    }
}

/// 将形体编码为交换格式字节
pub fn encode_shape(data: &ShapeData) -> Result<Vec<u8>, FileError> {
    let msgpack_data = rmp_serde::to_vec_named(data)?;
    let compressed = zstd::encode_all(msgpack_data.as_slice(), COMPRESSION_LEVEL)?;

    let payload_size = u32::try_from(compressed.len()).map_err(|_| {
        FileError::Corruption(format!("Shape payload too large: {} bytes", compressed.len()))
    })?;

    let mut bytes = Vec::with_capacity(HEADER_SIZE + compressed.len());
    Header::new(payload_size).write(&mut bytes)?;
    bytes.extend_from_slice(&compressed);
    Ok(bytes)
}

/// 从交换格式字节解码形体
///
/// 允许尾部有多余字节（共享内存段可能按页对齐）。
pub fn decode_shape(bytes: &[u8]) -> Result<ShapeData, FileError> {
    let mut reader = bytes;
    let header = Header::read(&mut reader)?;

    let size = header.payload_size as usize;
    if reader.len() < size {
        return Err(FileError::Corruption(format!(
            "Truncated shape data: expected {} bytes, got {}",
            size,
            reader.len()
        )));
    }

    let msgpack_data = zstd::decode_all(&reader[..size])?;
    let data: ShapeData = rmp_serde::from_slice(&msgpack_data)?;
    Ok(data)
}

/// 保存形体到文件
pub fn save_shape(shape: &Shape, path: &Path) -> Result<(), FileError> {
    let bytes = encode_shape(shape.data())?;

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&bytes)?;
    writer.flush()?;

    tracing::info!(
        "Saved shape ({} faces, {} edges) to {} ({} bytes)",
        shape.data().faces.len(),
        shape.data().edges.len(),
        path.display(),
        bytes.len()
    );

    Ok(())
}

/// 从文件加载形体
pub fn load_shape(path: &Path) -> Result<Shape, FileError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;

    let data = decode_shape(&bytes)?;

    tracing::info!(
        "Loaded shape ({} faces, {} edges) from {}",
        data.faces.len(),
        data.edges.len(),
        path.display()
    );

    Ok(Shape::new(data))
}
