//! blkcache: 块设备缓冲缓存与请求调度
//!
//! 这是一个 `no_std` 的块缓存引擎，面向小型内核的块设备层：
//! - **定长缓冲池**：按 (设备号, 块号) 散列，空闲环近似 LRU
//! - **引用计数借出**：句柄带代数校验，重复释放与过期句柄立即停机
//! - **电梯排序**：每个设备一条有序请求链，读优先于写
//! - **驱动接口**：驱动按主设备号注册，完成回调推进请求链
//!
//! # 示例
//!
//! ```rust,ignore
//! use alloc::sync::Arc;
//! use blkcache::{mkdev, BlockCache, CacheConfig, RamDisk, Result};
//!
//! fn demo() -> Result<()> {
//!     let cache = BlockCache::new(CacheConfig::with_buffers(64))?;
//!     cache.register_blkdev(1, Arc::new(RamDisk::new(1, 0, 1 << 20)))?;
//!
//!     let dev = mkdev(1, 0);
//!     let bh = cache.bread(dev, 10)?;
//!     cache.with_data_mut(bh, |data| data[0] = 0x42);
//!     cache.mark_dirty(bh);
//!     cache.brelse(bh);
//!
//!     cache.sync_dev(dev)
//! }
//! ```
//!
//! # 模块结构
//!
//! - [`error`] - 错误类型定义
//! - [`consts`] - 常量定义
//! - [`types`] - 设备号、块号与缓存配置
//! - [`sync`] - 等待队列与调度器接口
//! - [`cache`] - 缓冲块缓存
//! - [`block`] - 请求表、电梯排序与驱动接口

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

#[doc(hidden)]
pub use log;

// ===== 核心模块 =====

/// 错误处理
pub mod error;

/// 常量定义
pub mod consts;

/// 基础类型
pub mod types;

/// 睡眠与唤醒
pub mod sync;

/// 块缓存
pub mod cache;

/// 块设备请求层
pub mod block;

#[cfg(test)]
pub(crate) mod testutil;

// ===== 公共导出 =====

// 错误处理
pub use error::{Error, ErrorKind, Result};

// 基础类型
pub use types::{major, minor, mkdev, BlockNr, CacheConfig, Dev};

// 调度
pub use sync::{Scheduler, SpinScheduler, WaitQueue};
#[cfg(feature = "std")]
pub use sync::ThreadScheduler;

// Cache
pub use cache::{BlockCache, BufferHandle, CacheStats, MetadataHooks};

// 块设备
pub use block::{Block, BlockDriver, IoOp, RamDisk, RequestCmd, RequestInfo};
