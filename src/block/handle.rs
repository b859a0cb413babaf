//! 块句柄 - RAII 风格的块访问

use crate::cache::{BlockCache, BufferHandle};
use crate::error::Result;
use crate::types::{BlockNr, Dev};
use core::mem::ManuallyDrop;

/// 块句柄
///
/// 持有缓冲块的一次引用：获取时由 [`BlockCache::bread`] 或
/// [`BlockCache::getblk`] 借出，丢弃时自动 [`brelse`](BlockCache::brelse)。
/// 同一块可以同时存在多个句柄，每个句柄各占一次引用计数。
///
/// # 示例
///
/// ```rust,ignore
/// // 读取块
/// let block = Block::get(&cache, dev, 0)?;
/// block.with_data(|data| {
///     println!("First byte: {:02x}", data[0]);
/// });
///
/// // 修改块，离开作用域时释放引用，脏块由 sync 写回
/// let block = Block::get(&cache, dev, 1)?;
/// block.with_data_mut(|data| data[0] = 0x42);
///
/// // 新块（不从磁盘读取）
/// let block = Block::get_noread(&cache, dev, 10);
/// block.with_data_mut(|data| data.fill(0xFF));
/// ```
pub struct Block<'a> {
    cache: &'a BlockCache,
    handle: BufferHandle,
}

impl<'a> Block<'a> {
    /// 获取块（读取数据）
    ///
    /// 读失败时引用已经释放，返回错误。
    pub fn get(cache: &'a BlockCache, dev: Dev, blocknr: BlockNr) -> Result<Self> {
        let handle = cache.bread(dev, blocknr)?;
        Ok(Self { cache, handle })
    }

    /// 获取块（不读取数据）
    ///
    /// 调用者将覆盖整块内容，块直接视为有效。
    pub fn get_noread(cache: &'a BlockCache, dev: Dev, blocknr: BlockNr) -> Self {
        let handle = cache.getblk(dev, blocknr);
        cache.set_uptodate(handle);
        Self { cache, handle }
    }

    /// 底层缓冲块句柄
    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    /// 块号
    pub fn blocknr(&self) -> BlockNr {
        self.cache.blocknr(self.handle)
    }

    /// 是否是脏块
    pub fn is_dirty(&self) -> bool {
        self.cache.is_dirty(self.handle)
    }

    /// 只读访问块数据
    pub fn with_data<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        self.cache.with_data(self.handle, f)
    }

    /// 修改块数据，并标记为脏
    pub fn with_data_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let result = self.cache.with_data_mut(self.handle, f);
        self.cache.mark_dirty(self.handle);
        result
    }

    /// 交出引用，之后由调用者负责 `brelse`
    pub fn into_handle(self) -> BufferHandle {
        let this = ManuallyDrop::new(self);
        this.handle
    }
}

impl Drop for Block<'_> {
    fn drop(&mut self) {
        self.cache.brelse(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{cache_with_ramdisk, RD_DEV};

    #[test]
    fn test_drop_releases_reference() {
        let (cache, _rd) = cache_with_ramdisk(4);
        let handle = {
            let block = Block::get(&cache, RD_DEV, 3).unwrap();
            assert_eq!(block.blocknr(), 3);
            assert_eq!(cache.refcount(block.handle()), 1);

            let again = Block::get(&cache, RD_DEV, 3).unwrap();
            assert_eq!(again.handle(), block.handle());
            assert_eq!(cache.refcount(block.handle()), 2);
            block.handle()
        };
        let bh = cache.getblk(RD_DEV, 3);
        assert_eq!(bh, handle);
        assert_eq!(cache.refcount(bh), 1);
        cache.brelse(bh);
    }

    #[test]
    fn test_with_data_mut_marks_dirty() {
        let (cache, rd) = cache_with_ramdisk(4);
        {
            let block = Block::get_noread(&cache, RD_DEV, 5);
            assert!(!block.is_dirty());
            block.with_data_mut(|data| data.fill(0xAB));
            assert!(block.is_dirty());
        }
        // 新块不从设备读
        assert_eq!(rd.reads(), 0);

        cache.sync_dev(RD_DEV).unwrap();
        let block = Block::get(&cache, RD_DEV, 5).unwrap();
        assert!(!block.is_dirty());
        block.with_data(|data| assert!(data.iter().all(|&b| b == 0xAB)));
        assert_eq!(rd.writes(), 1);
    }

    #[test]
    fn test_into_handle_keeps_reference() {
        let (cache, _rd) = cache_with_ramdisk(4);
        let block = Block::get_noread(&cache, RD_DEV, 1);
        let bh = block.into_handle();
        assert_eq!(cache.refcount(bh), 1);
        cache.brelse(bh);
    }

    #[test]
    fn test_get_error_releases_buffer() {
        let (cache, _rd) = cache_with_ramdisk(4);
        assert!(Block::get(&cache, RD_DEV, 1 << 20).is_err());
        // 失败的块不占用引用，可以被回收
        for blocknr in 0..4 {
            drop(Block::get_noread(&cache, RD_DEV, blocknr));
        }
        assert_eq!(cache.stats().io_errors, 1);
    }
}
