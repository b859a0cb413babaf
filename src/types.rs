//! 基础类型与配置

use crate::consts::{BLOCK_SIZE, DEFAULT_NR_BUFFERS, NR_HASH, NR_REQUEST};
use crate::error::{Error, ErrorKind, Result};

/// 设备号：高 8 位为主设备号，低 8 位为次设备号
///
/// 设备号 0 表示“无设备”，空闲缓冲块以此标记。
pub type Dev = u16;

/// 块号
pub type BlockNr = u32;

/// 取主设备号
#[inline]
pub const fn major(dev: Dev) -> usize {
    (dev >> 8) as usize
}

/// 取次设备号
#[inline]
pub const fn minor(dev: Dev) -> u8 {
    (dev & 0xff) as u8
}

/// 由主、次设备号组合设备号
#[inline]
pub const fn mkdev(major: u8, minor: u8) -> Dev {
    ((major as Dev) << 8) | minor as Dev
}

/// 缓存配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// 缓冲块数量
    pub nr_buffers: usize,
    /// 请求槽数量（读写共享，写请求只能使用前 2/3）
    pub nr_request: usize,
    /// 哈希桶数量
    pub nr_hash: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            nr_buffers: DEFAULT_NR_BUFFERS,
            nr_request: NR_REQUEST,
            nr_hash: NR_HASH,
        }
    }
}

impl CacheConfig {
    /// 按给定内存预算划分缓冲块
    ///
    /// 每个缓冲块占用一个数据块加一个描述符。
    pub fn from_memory(bytes: usize) -> Self {
        let per_buffer = BLOCK_SIZE + core::mem::size_of::<crate::cache::BufferHead>();
        Self {
            nr_buffers: bytes / per_buffer,
            ..Self::default()
        }
    }

    /// 指定缓冲块数量
    pub fn with_buffers(nr_buffers: usize) -> Self {
        Self {
            nr_buffers,
            ..Self::default()
        }
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.nr_buffers == 0 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Buffer pool must hold at least one buffer",
            ));
        }
        // 写请求只能使用前 2/3 的槽位，至少要有一个
        if self.nr_request * 2 / 3 == 0 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Request table too small to hold a write request",
            ));
        }
        if self.nr_hash == 0 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Hash table must have at least one bucket",
            ));
        }
        Ok(())
    }
}
