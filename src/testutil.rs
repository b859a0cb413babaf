//! 测试辅助：手动驱动与内存盘

use crate::block::{BlockDriver, RamDisk};
use crate::cache::BlockCache;
use crate::consts::{BLOCK_SIZE, NR_REQUEST};
use crate::sync::ThreadScheduler;
use crate::types::{mkdev, CacheConfig, Dev};
use alloc::boxed::Box;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicUsize, Ordering};

/// 手动驱动占用的主设备号
pub(crate) const MANUAL_MAJOR: usize = 1;

/// 内存盘设备号
pub(crate) const RD_DEV: Dev = mkdev(1, 1);

/// 内存盘容量：64 块
pub(crate) const RD_SIZE: usize = 64 * BLOCK_SIZE;

/// 只记录启动次数的驱动，请求由测试代码调用 `end_request` 完成
#[derive(Default)]
pub(crate) struct ManualDriver {
    kicks: AtomicUsize,
}

impl ManualDriver {
    pub(crate) fn kicks(&self) -> usize {
        self.kicks.load(Ordering::SeqCst)
    }
}

impl BlockDriver for ManualDriver {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn request(&self, _cache: &BlockCache) {
        self.kicks.fetch_add(1, Ordering::SeqCst);
    }
}

fn new_cache(nr_buffers: usize, nr_request: usize) -> BlockCache {
    let config = CacheConfig {
        nr_request,
        ..CacheConfig::with_buffers(nr_buffers)
    };
    BlockCache::with_scheduler(config, Box::new(ThreadScheduler)).unwrap()
}

/// 带手动驱动的缓存
pub(crate) fn manual_cache(nr_buffers: usize) -> BlockCache {
    manual_cache_with_requests(nr_buffers, NR_REQUEST).0
}

/// 带手动驱动的缓存，指定请求槽数量
pub(crate) fn manual_cache_with_requests(
    nr_buffers: usize,
    nr_request: usize,
) -> (BlockCache, Arc<ManualDriver>) {
    let cache = new_cache(nr_buffers, nr_request);
    let driver = Arc::new(ManualDriver::default());
    cache.register_blkdev(MANUAL_MAJOR, driver.clone()).unwrap();
    (cache, driver)
}

/// 挂载了内存盘 [`RD_DEV`] 的缓存
pub(crate) fn cache_with_ramdisk(nr_buffers: usize) -> (BlockCache, Arc<RamDisk>) {
    let cache = new_cache(nr_buffers, NR_REQUEST);
    let rd = Arc::new(RamDisk::new(1, 1, RD_SIZE));
    cache.register_blkdev(1, rd.clone()).unwrap();
    (cache, rd)
}
