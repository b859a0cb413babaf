//! 请求槽与请求表

use super::device::BlockDriver;
use crate::cache::BufferId;
use crate::consts::NR_BLK_DEV;
use crate::types::Dev;
use alloc::sync::Arc;
use alloc::vec::Vec;

/// 入队后的请求命令
///
/// 声明顺序即电梯排序中的优先级：读在写前。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RequestCmd {
    /// 从设备读入缓冲块
    Read,
    /// 把缓冲块写到设备
    Write,
}

/// 提交给 [`BlockCache::submit`](crate::BlockCache::submit) 的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    /// 读
    Read,
    /// 写
    Write,
    /// 预读：缓冲块已上锁或没有空闲请求槽时直接放弃
    ReadAhead,
    /// 预写：缓冲块已上锁或没有空闲请求槽时直接放弃
    WriteAhead,
}

impl IoOp {
    /// 对应的入队命令
    pub fn cmd(self) -> RequestCmd {
        match self {
            IoOp::Read | IoOp::ReadAhead => RequestCmd::Read,
            IoOp::Write | IoOp::WriteAhead => RequestCmd::Write,
        }
    }

    /// 是否是尽力而为的预读/预写
    pub fn is_ahead(self) -> bool {
        matches!(self, IoOp::ReadAhead | IoOp::WriteAhead)
    }
}

/// 请求槽
///
/// `dev` 为 `None` 表示空闲。请求总是属于某个缓冲块，数据直接在
/// 该缓冲块的数据页与设备之间传输。
#[derive(Debug, Clone)]
pub(crate) struct Request {
    pub(crate) dev: Option<Dev>,
    pub(crate) cmd: RequestCmd,
    pub(crate) sector: u64,
    pub(crate) nr_sectors: u32,
    pub(crate) buffer: BufferId,
    pub(crate) next: Option<usize>,
}

impl Request {
    const fn free() -> Self {
        Self {
            dev: None,
            cmd: RequestCmd::Read,
            sector: 0,
            nr_sectors: 0,
            buffer: 0,
            next: None,
        }
    }

    pub(crate) fn info(&self) -> RequestInfo {
        RequestInfo {
            dev: self.dev.unwrap_or(0),
            cmd: self.cmd,
            sector: self.sector,
            nr_sectors: self.nr_sectors,
        }
    }
}

/// 请求快照，供驱动和诊断使用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestInfo {
    /// 设备号
    pub dev: Dev,
    /// 命令
    pub cmd: RequestCmd,
    /// 起始扇区
    pub sector: u64,
    /// 扇区数
    pub nr_sectors: u32,
}

/// 设备表项：驱动与当前请求
#[derive(Default)]
pub(crate) struct BlkDev {
    pub(crate) driver: Option<Arc<dyn BlockDriver>>,
    pub(crate) current_request: Option<usize>,
}

/// 请求表
///
/// 请求槽与设备表在同一个临界区内修改。
pub(crate) struct RequestQueue {
    pub(crate) requests: Vec<Request>,
    pub(crate) blk_dev: Vec<BlkDev>,
}

impl RequestQueue {
    pub(crate) fn new(nr_request: usize) -> Self {
        Self {
            requests: (0..nr_request).map(|_| Request::free()).collect(),
            blk_dev: (0..NR_BLK_DEV).map(|_| BlkDev::default()).collect(),
        }
    }

    /// 查找空闲请求槽
    ///
    /// 读请求可以使用整张表（从尾部往前找）；写请求只从 2/3 处往前找，
    /// 最后三分之一留给读请求，写再多也不会饿死读。
    pub(crate) fn find_free(&self, cmd: RequestCmd) -> Option<usize> {
        let start = match cmd {
            RequestCmd::Read => self.requests.len(),
            RequestCmd::Write => self.requests.len() * 2 / 3,
        };
        (0..start).rev().find(|&i| self.requests[i].dev.is_none())
    }

    /// 驱动
    pub(crate) fn driver(&self, major: usize) -> Option<Arc<dyn BlockDriver>> {
        self.blk_dev.get(major).and_then(|d| d.driver.clone())
    }

    /// 当前请求
    pub(crate) fn current(&self, major: usize) -> Option<usize> {
        self.blk_dev.get(major).and_then(|d| d.current_request)
    }

    /// 释放当前请求并前移到下一个，返回是否还有请求
    pub(crate) fn retire_current(&mut self, major: usize, slot: usize) -> bool {
        let next = self.requests[slot].next.take();
        self.requests[slot].dev = None;
        self.blk_dev[major].current_request = next;
        next.is_some()
    }

    /// 按服务顺序列出设备上的请求（含当前请求）
    pub(crate) fn pending(&self, major: usize) -> Vec<RequestInfo> {
        let mut infos = Vec::new();
        let mut cursor = self.current(major);
        while let Some(slot) = cursor {
            infos.push(self.requests[slot].info());
            cursor = self.requests[slot].next;
        }
        infos
    }
}
