//! CADMesh 数据交换
//!
//! - `.cmsh` 形体交换格式（MessagePack + Zstd），同时用于跨进程传递形体
//! - 工作进程协议的长度前缀消息帧

pub mod error;
pub mod exchange;
pub mod frame;

pub use error::FileError;
pub use exchange::{decode_shape, encode_shape, load_shape, save_shape};
pub use frame::{read_frame, write_frame, MAX_FRAME_SIZE};
