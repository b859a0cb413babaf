//! 块缓存常量定义

//=============================================================================
// 块与扇区
//=============================================================================

/// 块大小（字节），缓存的固定传输单位
pub const BLOCK_SIZE: usize = 1024;

/// 物理扇区大小（字节）
pub const SECTOR_SIZE: usize = 512;

/// 每个块包含的扇区数
pub const SECTORS_PER_BLOCK: u32 = (BLOCK_SIZE / SECTOR_SIZE) as u32;

/// `bread_page` 一次读取的块数
pub const BLOCKS_PER_PAGE: usize = 4;

//=============================================================================
// 缓冲池
//=============================================================================

/// 默认哈希桶数量（取素数以分散 `dev ^ block`）
pub const NR_HASH: usize = 307;

/// 默认缓冲块数量
pub const DEFAULT_NR_BUFFERS: usize = 256;

//=============================================================================
// 请求队列
//=============================================================================

/// 默认请求槽数量
///
/// 32 足以让电梯排序生效，又不会在队列中锁住过多缓冲块。
pub const NR_REQUEST: usize = 32;

/// 块设备表大小（按主设备号索引）
pub const NR_BLK_DEV: usize = 7;
