//! 脏块写回与缓存失效

use super::block_cache::BlockCache;
use super::buffer::BufferFlags;
use crate::block::IoOp;
use crate::error::Result;
use crate::types::{major, minor, Dev};

/// 文件系统元数据钩子
///
/// 缓存层在写回脏块前通知文件系统先把内存中的 inode 写进缓冲块；
/// 可移动介质更换时通知文件系统丢弃该设备的超级块和 inode。
pub trait MetadataHooks: Send + Sync {
    /// 把内存中的 inode 写入缓冲块
    fn sync_inodes(&self) {}

    /// 丢弃属于 `dev` 的超级块与 inode
    fn invalidate_dev(&self, _dev: Dev) {}
}

impl BlockCache {
    fn sync_inodes(&self) {
        if let Some(hooks) = self.hooks() {
            hooks.sync_inodes();
        }
    }

    /// 对属于 `dev`（`None` 表示所有设备）的每个脏块发起写请求
    fn write_back_pass(&self, dev: Option<Dev>) -> usize {
        let owned = |bh_dev: Dev| match dev {
            Some(dev) => bh_dev == dev,
            None => bh_dev != 0,
        };
        let mut submitted = 0;
        for id in 0..self.nr_buffers() {
            if !owned(self.peek(id, |bh| bh.dev)) {
                continue;
            }
            self.wait_on_buffer(id);
            // 等待期间缓冲块可能已被改派
            if self.peek(id, |bh| owned(bh.dev) && bh.is_dirty()) {
                self.make_request(IoOp::Write, id);
                submitted += 1;
            }
        }
        submitted
    }

    /// 把指定设备的脏块写回设备
    ///
    /// 写请求是异步的：第一遍发起时某些块可能正在写或又被弄脏，
    /// 所以做两遍完整扫描。每遍之前先让文件系统同步 inode。
    pub fn sync_dev(&self, dev: Dev) -> Result<()> {
        let mut submitted = 0;
        for _ in 0..2 {
            self.sync_inodes();
            submitted += self.write_back_pass(Some(dev));
        }
        log::debug!("[BCACHE] sync_dev {:#06x}: {} writes submitted", dev, submitted);
        Ok(())
    }

    /// 把所有设备的脏块写回
    pub fn sync_all(&self) -> Result<()> {
        let mut submitted = 0;
        for _ in 0..2 {
            self.sync_inodes();
            submitted += self.write_back_pass(None);
        }
        log::debug!("[BCACHE] sync_all: {} writes submitted", submitted);
        Ok(())
    }

    /// 使指定设备的缓冲块全部失效
    ///
    /// 清除有效与脏标志，内容不再写回。用于可移动介质被更换的情况。
    pub fn invalidate(&self, dev: Dev) {
        for id in 0..self.nr_buffers() {
            if self.peek(id, |bh| bh.dev) != dev {
                continue;
            }
            self.wait_on_buffer(id);
            self.modify(id, |bh| {
                if bh.dev == dev {
                    bh.flags.remove(BufferFlags::UPTODATE | BufferFlags::DIRTY);
                }
            });
        }
        log::info!("[BCACHE] invalidated buffers of dev {:#06x}", dev);
    }

    /// 检查可移动介质是否被更换，是则丢弃该设备的全部缓存
    ///
    /// 开销较大，只应在挂载或打开设备时调用。返回介质是否被更换。
    pub fn check_disk_change(&self, dev: Dev) -> bool {
        let Some(driver) = self.driver(major(dev)) else {
            return false;
        };
        if !driver.media_changed(minor(dev)) {
            return false;
        }
        log::warn!("[BCACHE] media changed on dev {:#06x}", dev);
        if let Some(hooks) = self.hooks() {
            hooks.invalidate_dev(dev);
        }
        self.invalidate(dev);
        true
    }
}
