//! 提交读写请求与完成回调

use super::request::{IoOp, RequestCmd, RequestInfo};
use crate::cache::{BlockCache, BufferFlags, BufferHandle, BufferId};
use crate::consts::SECTORS_PER_BLOCK;
use crate::fatal;
use crate::types::major;
use alloc::vec::Vec;

impl BlockCache {
    /// 对缓冲块发起读写请求
    ///
    /// - 预读/预写遇到已上锁的缓冲块立即返回，从不挂起
    /// - 写一个不脏的块、读一个已有效的块什么也不做
    /// - 否则给缓冲块上锁并排入设备的请求链；没有空闲请求槽时挂起等待
    ///
    /// 本函数不等待 I/O 完成。请求完成时缓冲块解锁，用
    /// [`bread`](Self::bread) 之类的接口等待结果。
    pub fn submit(&self, op: IoOp, handle: BufferHandle) {
        let id = self.buffer_id(handle);
        self.make_request(op, id);
    }

    pub(crate) fn make_request(&self, op: IoOp, id: BufferId) {
        let dev = self.peek(id, |bh| bh.dev);
        let major = major(dev);
        let Some(driver) = self.driver(major) else {
            fatal!("Trying to access nonexistent block-device {:#06x}", dev);
        };

        let cmd = op.cmd();
        let rw_ahead = op.is_ahead();
        if rw_ahead {
            // 检查与上锁在同一临界区内完成，预读从不等待
            if !self.try_lock_buffer(id) {
                log::trace!("[BLK] {:?} on locked buffer {} dropped", op, id);
                return;
            }
        } else {
            self.lock_buffer(id);
        }
        let (skip, blocknr) = self.peek(id, |bh| {
            let skip = match cmd {
                RequestCmd::Write => !bh.is_dirty(),
                RequestCmd::Read => bh.is_uptodate(),
            };
            (skip, bh.blocknr)
        });
        if skip {
            self.unlock_buffer(id);
            return;
        }

        let kick = loop {
            let mut queue = self.queue.lock();
            if let Some(slot) = queue.find_free(cmd) {
                // 写请求入队即视为已写回；之后再修改会重新标脏
                self.modify(id, |bh| bh.flags.remove(BufferFlags::DIRTY));
                let req = &mut queue.requests[slot];
                req.dev = Some(dev);
                req.cmd = cmd;
                req.sector = blocknr as u64 * SECTORS_PER_BLOCK as u64;
                req.nr_sectors = SECTORS_PER_BLOCK;
                req.buffer = id;
                break queue.add_request(major, slot);
            }
            if rw_ahead {
                drop(queue);
                log::warn!("[BLK] no free request slot, {:?} of block {} dropped", op, blocknr);
                self.unlock_buffer(id);
                return;
            }
            let ticket = self.wait_for_request.prepare();
            drop(queue);
            log::debug!("[BLK] request table full, waiting ({:?} block {})", cmd, blocknr);
            self.sleep_on(&self.wait_for_request, ticket);
        };

        {
            let mut stats = self.stats.lock();
            match cmd {
                RequestCmd::Read => stats.read_requests += 1,
                RequestCmd::Write => stats.write_requests += 1,
            }
        }
        log::trace!("[BLK] queued {:?} dev={:#06x} block={}", cmd, dev, blocknr);

        if kick {
            driver.request(self);
        }
    }

    /// 设备的当前请求
    pub fn current_request(&self, major: usize) -> Option<RequestInfo> {
        let queue = self.queue.lock();
        queue.current(major).map(|slot| queue.requests[slot].info())
    }

    /// 访问当前请求及其数据页
    ///
    /// 读请求由驱动把数据写入 `data`，写请求从 `data` 取数据。
    /// 设备空闲时返回 `None`。
    pub fn with_current_request<R>(
        &self,
        major: usize,
        f: impl FnOnce(&RequestInfo, &mut [u8]) -> R,
    ) -> Option<R> {
        let (info, id) = {
            let queue = self.queue.lock();
            let slot = queue.current(major)?;
            (queue.requests[slot].info(), queue.requests[slot].buffer)
        };
        let mut data = self.buffer_data(id);
        Some(f(&info, &mut data))
    }

    /// 完成当前请求
    ///
    /// 设置缓冲块的有效标志并解锁，唤醒等待空闲请求槽的任务，
    /// 然后把当前请求前移到链上的下一个。返回 `true` 表示还有请求，
    /// 驱动需要继续处理。
    pub fn end_request(&self, major: usize, uptodate: bool) -> bool {
        let (slot, id, info) = {
            let queue = self.queue.lock();
            let Some(slot) = queue.current(major) else {
                fatal!("end_request on idle device major {}", major);
            };
            let req = &queue.requests[slot];
            (slot, req.buffer, req.info())
        };

        let blocknr = self.modify(id, |bh| {
            bh.flags.set(BufferFlags::UPTODATE, uptodate);
            bh.blocknr
        });
        self.unlock_buffer(id);
        if !uptodate {
            log::error!(
                "[BLK] I/O error: {:?} dev {:#06x}, block {}",
                info.cmd,
                info.dev,
                blocknr
            );
            self.stats.lock().io_errors += 1;
        }

        let more = self.queue.lock().retire_current(major, slot);
        self.wait_for_request.wake_all();
        more
    }

    /// 按服务顺序列出设备上的请求
    pub fn queued_requests(&self, major: usize) -> Vec<RequestInfo> {
        self.queue.lock().pending(major)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{manual_cache, manual_cache_with_requests, MANUAL_MAJOR};
    use crate::types::mkdev;
    use alloc::sync::Arc;
    use core::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    const DEV: u16 = mkdev(MANUAL_MAJOR as u8, 0);

    fn dirty_block(cache: &BlockCache, blocknr: u32) -> BufferHandle {
        let bh = cache.getblk(DEV, blocknr);
        cache.set_uptodate(bh);
        cache.mark_dirty(bh);
        bh
    }

    #[test]
    fn test_first_request_kicks_driver() {
        let (cache, driver) = manual_cache_with_requests(8, 32);
        let bh = cache.getblk(DEV, 5);
        cache.submit(IoOp::Read, bh);

        assert_eq!(driver.kicks(), 1);
        let req = cache.current_request(MANUAL_MAJOR).unwrap();
        assert_eq!(req.dev, DEV);
        assert_eq!(req.cmd, RequestCmd::Read);
        assert_eq!(req.sector, 10);
        assert_eq!(req.nr_sectors, 2);

        // 设备忙时不再启动驱动
        let other = cache.getblk(DEV, 6);
        cache.submit(IoOp::Read, other);
        assert_eq!(driver.kicks(), 1);

        cache.with_current_request(MANUAL_MAJOR, |_, data| data.fill(0x77));
        assert!(cache.end_request(MANUAL_MAJOR, true));
        assert!(cache.is_uptodate(bh));
        cache.with_data(bh, |data| assert!(data.iter().all(|&b| b == 0x77)));

        assert!(!cache.end_request(MANUAL_MAJOR, true));
        assert!(cache.current_request(MANUAL_MAJOR).is_none());
        cache.brelse(bh);
        cache.brelse(other);
    }

    #[test]
    fn test_noop_submissions() {
        let (cache, driver) = manual_cache_with_requests(8, 32);
        let bh = cache.getblk(DEV, 1);

        // 不脏的块不写
        cache.submit(IoOp::Write, bh);
        // 已有效的块不读
        cache.set_uptodate(bh);
        cache.submit(IoOp::Read, bh);

        assert_eq!(driver.kicks(), 0);
        assert!(cache.queued_requests(MANUAL_MAJOR).is_empty());
        cache.brelse(bh);
    }

    #[test]
    fn test_elevator_services_read_before_writes() {
        let (cache, _driver) = manual_cache_with_requests(8, 32);

        // 设备正忙于块 0 的读请求
        let busy = cache.getblk(DEV, 0);
        cache.submit(IoOp::Read, busy);

        let writes: Vec<_> = [25, 5, 15].iter().map(|&b| dirty_block(&cache, b)).collect();
        for &bh in &writes {
            cache.submit(IoOp::Write, bh);
        }
        let read = cache.getblk(DEV, 10);
        cache.submit(IoOp::Read, read);

        let mut serviced = Vec::new();
        while let Some(req) = cache.current_request(MANUAL_MAJOR) {
            serviced.push((req.cmd, req.sector));
            cache.end_request(MANUAL_MAJOR, true);
        }
        assert_eq!(
            serviced,
            [
                (RequestCmd::Read, 0),
                (RequestCmd::Read, 20),
                (RequestCmd::Write, 10),
                (RequestCmd::Write, 30),
                (RequestCmd::Write, 50),
            ]
        );
    }

    #[test]
    fn test_write_clears_dirty_when_queued() {
        let (cache, _driver) = manual_cache_with_requests(4, 32);
        let bh = dirty_block(&cache, 3);
        cache.submit(IoOp::Write, bh);
        assert!(!cache.is_dirty(bh));

        cache.end_request(MANUAL_MAJOR, true);
        cache.brelse(bh);
    }

    #[test]
    fn test_read_ahead_on_locked_buffer_returns() {
        let (cache, driver) = manual_cache_with_requests(4, 32);
        let bh = cache.getblk(DEV, 7);
        cache.submit(IoOp::Read, bh);

        // 缓冲块已上锁（读请求在途），预读直接放弃
        cache.submit(IoOp::ReadAhead, bh);
        cache.submit(IoOp::WriteAhead, bh);
        assert_eq!(cache.queued_requests(MANUAL_MAJOR).len(), 1);
        assert_eq!(driver.kicks(), 1);

        cache.end_request(MANUAL_MAJOR, true);
        cache.brelse(bh);
    }

    #[test]
    fn test_try_lock_buffer_never_waits() {
        let cache = manual_cache(4);
        let bh = cache.getblk(DEV, 2);
        let id = cache.buffer_id(bh);

        assert!(cache.try_lock_buffer(id));
        assert!(!cache.try_lock_buffer(id));
        cache.unlock_buffer(id);
        assert!(cache.try_lock_buffer(id));
        cache.unlock_buffer(id);
        cache.brelse(bh);
    }

    #[test]
    fn test_read_ahead_racing_read_returns() {
        let (cache, _driver) = manual_cache_with_requests(8, 32);
        let cache = Arc::new(cache);

        for blocknr in 0..64 {
            let bh = cache.getblk(DEV, blocknr);
            let reader = {
                let cache = cache.clone();
                thread::spawn(move || cache.submit(IoOp::Read, bh))
            };
            // 无论谁先上锁，预读都不会挂起等待另一个请求完成
            cache.submit(IoOp::ReadAhead, bh);

            while !reader.is_finished() || cache.current_request(MANUAL_MAJOR).is_some() {
                if cache.current_request(MANUAL_MAJOR).is_some() {
                    cache.end_request(MANUAL_MAJOR, true);
                } else {
                    thread::yield_now();
                }
            }
            reader.join().unwrap();
            assert!(cache.is_uptodate(bh));
            cache.brelse(bh);
        }
    }

    #[test]
    fn test_writes_cannot_exhaust_read_slots() {
        // 32 个槽位中写请求最多占 21 个
        let (cache, _driver) = manual_cache_with_requests(32, 32);
        let writes: Vec<_> = (1..=21).map(|b| dirty_block(&cache, b)).collect();
        for &bh in &writes {
            cache.submit(IoOp::Write, bh);
        }
        assert_eq!(cache.queued_requests(MANUAL_MAJOR).len(), 21);

        // 写槽已满，多余的预写被丢弃而不是挂起
        let extra = dirty_block(&cache, 22);
        cache.submit(IoOp::WriteAhead, extra);
        assert_eq!(cache.queued_requests(MANUAL_MAJOR).len(), 21);
        assert!(cache.is_dirty(extra));

        // 读请求仍能拿到槽位
        let read = cache.getblk(DEV, 100);
        cache.submit(IoOp::Read, read);
        let queued = cache.queued_requests(MANUAL_MAJOR);
        assert_eq!(queued.len(), 22);
        assert_eq!(queued[1].cmd, RequestCmd::Read);
        assert_eq!(queued[1].sector, 200);
    }

    #[test]
    fn test_write_waits_for_free_slot() {
        let (cache, _driver) = manual_cache_with_requests(8, 3);
        let cache = Arc::new(cache);
        // 3 个槽位中写请求只能用 2 个
        let first = dirty_block(&cache, 1);
        let second = dirty_block(&cache, 2);
        cache.submit(IoOp::Write, first);
        cache.submit(IoOp::Write, second);

        let done = Arc::new(AtomicBool::new(false));
        let writer = {
            let cache = cache.clone();
            let done = done.clone();
            thread::spawn(move || {
                let third = dirty_block(&cache, 3);
                cache.submit(IoOp::Write, third);
                done.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!done.load(Ordering::SeqCst));

        cache.end_request(MANUAL_MAJOR, true);
        writer.join().unwrap();
        assert_eq!(cache.queued_requests(MANUAL_MAJOR).len(), 2);
    }

    #[test]
    fn test_failed_request_leaves_buffer_stale() {
        let (cache, _driver) = manual_cache_with_requests(4, 32);
        let bh = cache.getblk(DEV, 9);
        cache.submit(IoOp::Read, bh);
        cache.end_request(MANUAL_MAJOR, false);

        assert!(!cache.is_uptodate(bh));
        assert_eq!(cache.stats().io_errors, 1);
        cache.brelse(bh);
    }

    #[test]
    #[should_panic(expected = "nonexistent block-device")]
    fn test_unregistered_device_is_fatal() {
        let cache = manual_cache(4);
        let bh = cache.getblk(mkdev(4, 0), 1);
        cache.submit(IoOp::Read, bh);
    }

    #[test]
    #[should_panic(expected = "end_request on idle device")]
    fn test_end_request_on_idle_device_is_fatal() {
        let cache = manual_cache(4);
        cache.end_request(MANUAL_MAJOR, true);
    }
}
