//! 块设备驱动接口

use crate::cache::BlockCache;
use crate::consts::NR_BLK_DEV;
use crate::error::{Error, ErrorKind, Result};
use alloc::sync::Arc;

/// 块设备驱动
///
/// 驱动按主设备号注册。与缓存层的约定：
///
/// 1. 设备的请求链由空变为非空时，缓存层调用 [`request`](Self::request) 启动驱动。
/// 2. 驱动通过 [`BlockCache::current_request`] / [`BlockCache::with_current_request`]
///    取得当前请求并传输数据。
/// 3. 每个请求完成后驱动恰好调用一次 [`BlockCache::end_request`]；
///    返回 `true` 表示链上还有请求，驱动必须自己接着处理，缓存层不会再次启动它。
///
/// # 示例
///
/// ```rust,ignore
/// impl BlockDriver for MyDisk {
///     fn name(&self) -> &'static str {
///         "mydisk"
///     }
///
///     fn request(&self, cache: &BlockCache) {
///         while let Some(ok) = cache.with_current_request(MAJOR, |req, data| self.transfer(req, data)) {
///             if !cache.end_request(MAJOR, ok) {
///                 break;
///             }
///         }
///     }
/// }
/// ```
pub trait BlockDriver: Send + Sync {
    /// 设备名称（用于日志）
    fn name(&self) -> &'static str;

    /// 启动设备，处理当前请求
    fn request(&self, cache: &BlockCache);

    /// 可移动介质是否已被更换
    fn media_changed(&self, _minor: u8) -> bool {
        false
    }
}

impl BlockCache {
    /// 注册块设备驱动
    ///
    /// # 错误
    ///
    /// - `InvalidInput` - 主设备号为 0 或超出设备表
    /// - `AlreadyExists` - 该主设备号已有驱动
    pub fn register_blkdev(&self, major: usize, driver: Arc<dyn BlockDriver>) -> Result<()> {
        if major == 0 || major >= NR_BLK_DEV {
            return Err(Error::new(ErrorKind::InvalidInput, "Major number out of range"));
        }
        let mut queue = self.queue.lock();
        let entry = &mut queue.blk_dev[major];
        if entry.driver.is_some() {
            return Err(Error::new(ErrorKind::AlreadyExists, "Major number already registered"));
        }
        log::info!("[BLK] registered {} as major {}", driver.name(), major);
        entry.driver = Some(driver);
        Ok(())
    }

    /// 查找主设备号对应的驱动
    pub(crate) fn driver(&self, major: usize) -> Option<Arc<dyn BlockDriver>> {
        self.queue.lock().driver(major)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{manual_cache, ManualDriver};

    #[test]
    fn test_register_blkdev() {
        let cache = manual_cache(4);
        // manual_cache 已占用主设备号 1
        assert!(cache.driver(1).is_some());
        assert!(cache.driver(3).is_none());

        let err = cache.register_blkdev(1, Arc::new(ManualDriver::default())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        let err = cache.register_blkdev(NR_BLK_DEV, Arc::new(ManualDriver::default())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(cache.register_blkdev(0, Arc::new(ManualDriver::default())).is_err());

        cache.register_blkdev(3, Arc::new(ManualDriver::default())).unwrap();
        assert_eq!(cache.driver(3).unwrap().name(), "manual");
    }
}
