//! 内存盘驱动
//!
//! 用一段内存模拟块设备，请求在 [`BlockDriver::request`] 内同步完成。

use super::device::BlockDriver;
use super::request::{RequestCmd, RequestInfo};
use crate::cache::BlockCache;
use crate::consts::SECTOR_SIZE;
use crate::types::minor;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};
use spin::Mutex;

/// 内存盘
///
/// 只服务一个次设备号；次设备号不符或越界的请求以失败结束。
pub struct RamDisk {
    major: usize,
    minor: u8,
    storage: Mutex<Vec<u8>>,
    /// 正在处理请求链
    busy: Mutex<()>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl RamDisk {
    /// 创建内存盘，内容清零
    pub fn new(major: usize, minor: u8, size: usize) -> Self {
        Self {
            major,
            minor,
            storage: Mutex::new(alloc::vec![0u8; size]),
            busy: Mutex::new(()),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// 容量（字节）
    pub fn len(&self) -> usize {
        self.storage.lock().len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 已完成的设备读次数
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// 已完成的设备写次数
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// 直接读取内存盘内容（绕过缓存）
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> usize {
        let storage = self.storage.lock();
        let Some(src) = storage.get(offset..) else {
            return 0;
        };
        let len = src.len().min(buf.len());
        buf[..len].copy_from_slice(&src[..len]);
        len
    }

    fn transfer(&self, req: &RequestInfo, data: &mut [u8]) -> bool {
        let offset = req.sector * SECTOR_SIZE as u64;
        let len = req.nr_sectors as usize * SECTOR_SIZE;
        let mut storage = self.storage.lock();
        if minor(req.dev) != self.minor || offset + len as u64 > storage.len() as u64 {
            return false;
        }
        let range = offset as usize..offset as usize + len;
        match req.cmd {
            RequestCmd::Write => {
                storage[range].copy_from_slice(&data[..len]);
                self.writes.fetch_add(1, Ordering::Relaxed);
            }
            RequestCmd::Read => {
                data[..len].copy_from_slice(&storage[range]);
                self.reads.fetch_add(1, Ordering::Relaxed);
            }
        }
        true
    }
}

impl BlockDriver for RamDisk {
    fn name(&self) -> &'static str {
        "ramdisk"
    }

    fn request(&self, cache: &BlockCache) {
        loop {
            // 已有任务在处理请求链，新请求会被它取走
            let Some(busy) = self.busy.try_lock() else {
                return;
            };
            while let Some((ok, sector)) = cache.with_current_request(self.major, |req, data| {
                (self.transfer(req, data), req.sector)
            }) {
                if !ok {
                    log::warn!("[RAMDISK] request beyond device, sector {}", sector);
                }
                if !cache.end_request(self.major, ok) {
                    break;
                }
            }
            drop(busy);
            // 放开 busy 之后才入队的请求没有人启动，再检查一次
            if cache.current_request(self.major).is_none() {
                return;
            }
        }
    }
}
