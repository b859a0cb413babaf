//! 缓冲池：哈希表与空闲环
//!
//! 所有缓冲块描述符存放在一个定长数组中，通过下标互相链接：
//!
//! ```text
//! hash_table[(dev ^ block) % nr_hash] -> id -> id -> None     (哈希链，双向)
//! free_list -> id <-> id <-> ... <-> id -> free_list          (空闲环，循环双向)
//! ```
//!
//! 空闲环包含池中全部缓冲块（包括已借出的），扫描时跳过引用计数非零者。
//! 本模块只做结构操作，不挂起；调用者需在同一临界区内完成一次摘链与重链。

use super::buffer::{BufferFlags, BufferHead, BufferId};
use crate::fatal;
use crate::types::{BlockNr, Dev};
use alloc::vec::Vec;

/// 缓冲池
pub(crate) struct BufferPool {
    heads: Vec<BufferHead>,
    hash_table: Vec<Option<BufferId>>,
    free_list: BufferId,
}

impl BufferPool {
    /// 创建缓冲池，所有缓冲块空闲且不属于任何设备
    pub(crate) fn new(nr_buffers: usize, nr_hash: usize) -> Self {
        let mut heads: Vec<BufferHead> = (0..nr_buffers).map(|_| BufferHead::new()).collect();
        for (id, bh) in heads.iter_mut().enumerate() {
            bh.free_prev = Some((id + nr_buffers - 1) % nr_buffers);
            bh.free_next = Some((id + 1) % nr_buffers);
        }
        Self {
            heads,
            hash_table: alloc::vec![None; nr_hash],
            free_list: 0,
        }
    }

    #[inline]
    fn hashfn(&self, dev: Dev, blocknr: BlockNr) -> usize {
        ((dev as u32) ^ blocknr) as usize % self.hash_table.len()
    }

    /// 缓冲块数量
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.heads.len()
    }

    #[inline]
    pub(crate) fn head(&self, id: BufferId) -> &BufferHead {
        &self.heads[id]
    }

    #[inline]
    pub(crate) fn head_mut(&mut self, id: BufferId) -> &mut BufferHead {
        &mut self.heads[id]
    }

    /// 在哈希链中查找指定块，无副作用
    pub(crate) fn find(&self, dev: Dev, blocknr: BlockNr) -> Option<BufferId> {
        let mut cursor = self.hash_table[self.hashfn(dev, blocknr)];
        while let Some(id) = cursor {
            let bh = &self.heads[id];
            if bh.holds(dev, blocknr) {
                return Some(id);
            }
            cursor = bh.hash_next;
        }
        None
    }

    /// 扫描空闲环挑选驱逐对象
    ///
    /// 只考虑引用计数为零的缓冲块，取驱逐代价最低者；
    /// 遇到既不脏也未上锁的缓冲块立即停止。全部借出时返回 `None`。
    pub(crate) fn pick_victim(&self) -> Option<BufferId> {
        let mut best: Option<BufferId> = None;
        let mut tmp = self.free_list;
        loop {
            let bh = &self.heads[tmp];
            if bh.count == 0 {
                let better = match best {
                    None => true,
                    Some(b) => bh.badness() < self.heads[b].badness(),
                };
                if better {
                    best = Some(tmp);
                    if bh.badness() == 0 {
                        break;
                    }
                }
            }
            tmp = self.free_next(tmp);
            if tmp == self.free_list {
                break;
            }
        }
        best
    }

    fn free_next(&self, id: BufferId) -> BufferId {
        match self.heads[id].free_next {
            Some(next) => next,
            None => fatal!("Free block list corrupted"),
        }
    }

    /// 把缓冲块改派给新的 (设备, 块号)
    ///
    /// 调用者保证缓冲块未借出、未上锁、不脏，且新键不在哈希表中。
    /// 改派后引用计数为 1，数据视为无效。
    pub(crate) fn rehash(&mut self, id: BufferId, dev: Dev, blocknr: BlockNr) {
        self.remove_from_queues(id);
        let bh = &mut self.heads[id];
        bh.count = 1;
        bh.flags = BufferFlags::empty();
        bh.generation = bh.generation.wrapping_add(1);
        bh.dev = dev;
        bh.blocknr = blocknr;
        self.insert_into_queues(id);
    }

    /// 从哈希链和空闲环中摘除
    fn remove_from_queues(&mut self, id: BufferId) {
        let (dev, blocknr, hash_prev, hash_next) = {
            let bh = &self.heads[id];
            (bh.dev, bh.blocknr, bh.hash_prev, bh.hash_next)
        };
        if let Some(next) = hash_next {
            self.heads[next].hash_prev = hash_prev;
        }
        if let Some(prev) = hash_prev {
            self.heads[prev].hash_next = hash_next;
        }
        if dev != 0 {
            let bucket = self.hashfn(dev, blocknr);
            if self.hash_table[bucket] == Some(id) {
                self.hash_table[bucket] = hash_next;
            }
        }

        let bh = &self.heads[id];
        let (Some(free_prev), Some(free_next)) = (bh.free_prev, bh.free_next) else {
            fatal!("Free block list corrupted");
        };
        self.heads[free_prev].free_next = Some(free_next);
        self.heads[free_next].free_prev = Some(free_prev);
        if self.free_list == id {
            self.free_list = free_next;
        }
    }

    /// 放到空闲环尾部，设备号非零时挂入新的哈希链
    fn insert_into_queues(&mut self, id: BufferId) {
        let head = self.free_list;
        let Some(tail) = self.heads[head].free_prev else {
            fatal!("Free block list corrupted");
        };
        self.heads[id].free_next = Some(head);
        self.heads[id].free_prev = Some(tail);
        self.heads[tail].free_next = Some(id);
        self.heads[head].free_prev = Some(id);

        self.heads[id].hash_prev = None;
        self.heads[id].hash_next = None;
        let (dev, blocknr) = (self.heads[id].dev, self.heads[id].blocknr);
        if dev == 0 {
            return;
        }
        if self.find(dev, blocknr).is_some() {
            fatal!("Hash collision inserting dev {:#06x} block {}", dev, blocknr);
        }
        let bucket = self.hashfn(dev, blocknr);
        let old = self.hash_table[bucket];
        self.heads[id].hash_next = old;
        if let Some(old) = old {
            self.heads[old].hash_prev = Some(id);
        }
        self.hash_table[bucket] = Some(id);
    }

    /// 按空闲环顺序列出所有缓冲块
    #[cfg(test)]
    pub(crate) fn ring_order(&self) -> Vec<BufferId> {
        let mut order = Vec::new();
        let mut tmp = self.free_list;
        loop {
            order.push(tmp);
            tmp = self.free_next(tmp);
            if tmp == self.free_list {
                break;
            }
        }
        order
    }
}
