//! 缓冲块缓存
//!
//! 固定数量的 1 KiB 缓冲块，按 (设备号, 块号) 散列，空闲环近似 LRU。
//!
//! # 主要组件
//!
//! - [`BufferHead`] - 缓冲块描述符：身份、引用计数与状态标志
//! - [`BufferHandle`] - 借出缓冲块时交给调用者的句柄，带代数校验
//! - [`BlockCache`] - 缓存上下文，提供 `getblk` / `brelse` / `bread` 等操作
//! - [`MetadataHooks`] - 同步与介质更换时通知上层文件系统
//! - [`CacheStats`] - 缓存统计信息
//!
//! # 回收策略
//!
//! 所有缓冲块始终留在空闲环上，借出与否只看引用计数。回收时从环头开始，
//! 在引用计数为 0 的缓冲块里挑 `2 * dirty + locked` 最小的，干净且未上锁的
//! 块优先；被改派的缓冲块移到环尾。
//!
//! # 内存分配要求
//!
//! 本模块依赖 `alloc` crate，需要用户提供全局分配器。

mod block_cache;
mod buffer;
mod pool;
mod sync;

pub use block_cache::{BlockCache, CacheStats};
pub use buffer::{BufferFlags, BufferHandle, BufferHead, BufferId};
pub use sync::MetadataHooks;
