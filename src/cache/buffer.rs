//! 缓冲块描述符

use crate::types::{BlockNr, Dev};
use bitflags::bitflags;

/// 缓冲块在池中的下标
pub type BufferId = usize;

bitflags! {
    /// 缓冲块状态标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BufferFlags: u8 {
        /// 数据与设备一致
        const UPTODATE = 0x01;
        /// 数据已修改，尚未写回
        const DIRTY    = 0x02;
        /// I/O 进行中
        const LOCKED   = 0x04;
    }
}

/// 缓冲块句柄
///
/// 由 `getblk`/`bread` 等返回，`brelse` 归还。句柄携带代数，
/// 缓冲块每次被回收改派给新的 (设备, 块号) 时代数加一，
/// 过期句柄在使用时会被检测出来。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle {
    pub(crate) index: BufferId,
    pub(crate) generation: u32,
}

impl BufferHandle {
    /// 缓冲块在池中的下标
    pub fn index(&self) -> BufferId {
        self.index
    }
}

/// 缓冲块描述符
///
/// 数据页单独存放在 [`BlockCache`](super::BlockCache) 中，描述符只保存元数据和链接。
/// 每个描述符始终位于空闲环的某个位置；仅当 `dev != 0` 时挂在哈希链上。
///
/// # 字段说明
///
/// - `dev`/`blocknr`: 缓存的块身份
/// - `count`: 引用计数，> 0 表示已被借出，不能被驱逐
/// - `flags`: 状态标志；`LOCKED` 只表示 I/O 进行中，与引用计数无关
/// - `generation`: 身份代数
/// - `hash_prev`/`hash_next`: 哈希链
/// - `free_prev`/`free_next`: 空闲环
#[derive(Debug, Clone)]
pub struct BufferHead {
    pub(crate) dev: Dev,
    pub(crate) blocknr: BlockNr,
    pub(crate) count: u32,
    pub(crate) flags: BufferFlags,
    pub(crate) generation: u32,
    pub(crate) hash_prev: Option<BufferId>,
    pub(crate) hash_next: Option<BufferId>,
    pub(crate) free_prev: Option<BufferId>,
    pub(crate) free_next: Option<BufferId>,
}

impl BufferHead {
    /// 创建空闲描述符
    pub(crate) fn new() -> Self {
        Self {
            dev: 0,
            blocknr: 0,
            count: 0,
            flags: BufferFlags::empty(),
            generation: 0,
            hash_prev: None,
            hash_next: None,
            free_prev: None,
            free_next: None,
        }
    }

    /// 检查是否持有指定块
    #[inline]
    pub(crate) fn holds(&self, dev: Dev, blocknr: BlockNr) -> bool {
        self.dev == dev && self.blocknr == blocknr
    }

    #[inline]
    pub(crate) fn is_dirty(&self) -> bool {
        self.flags.contains(BufferFlags::DIRTY)
    }

    #[inline]
    pub(crate) fn is_uptodate(&self) -> bool {
        self.flags.contains(BufferFlags::UPTODATE)
    }

    #[inline]
    pub(crate) fn is_locked(&self) -> bool {
        self.flags.contains(BufferFlags::LOCKED)
    }

    /// 驱逐代价：脏块需要先同步写回，比仅仅上锁更差
    #[inline]
    pub(crate) fn badness(&self) -> u8 {
        ((self.is_dirty() as u8) << 1) + self.is_locked() as u8
    }
}
