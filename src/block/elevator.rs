//! 电梯排序
//!
//! 同一设备的请求链按 (命令, 设备号, 扇区) 排序：读总是排在写前面，
//! 读比写对时间更敏感；同类请求按扇区升序，减少寻道。相邻请求不合并。

use super::request::{Request, RequestQueue};

/// `a` 是否应排在 `b` 之前
#[inline]
pub(crate) fn in_order(a: &Request, b: &Request) -> bool {
    (a.cmd, a.dev, a.sector) < (b.cmd, b.dev, b.sector)
}

impl RequestQueue {
    /// 把填好的请求插入设备的请求链
    ///
    /// 设备空闲时请求直接成为当前请求，返回 `true` 表示调用者需要启动驱动。
    /// 否则插到当前请求之后第一个比它靠后的请求前面。当前请求已经交给驱动，
    /// 不会被插队；其后的链始终有序。
    pub(crate) fn add_request(&mut self, major: usize, slot: usize) -> bool {
        self.requests[slot].next = None;
        let Some(mut tmp) = self.blk_dev[major].current_request else {
            self.blk_dev[major].current_request = Some(slot);
            return true;
        };
        while let Some(next) = self.requests[tmp].next {
            if in_order(&self.requests[slot], &self.requests[next]) {
                break;
            }
            tmp = next;
        }
        self.requests[slot].next = self.requests[tmp].next;
        self.requests[tmp].next = Some(slot);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::super::request::RequestCmd;
    use super::*;
    use alloc::vec::Vec;

    fn queue_request(queue: &mut RequestQueue, cmd: RequestCmd, sector: u64) -> bool {
        let slot = queue.find_free(cmd).unwrap();
        let req = &mut queue.requests[slot];
        req.dev = Some(0x0301);
        req.cmd = cmd;
        req.sector = sector;
        req.nr_sectors = 2;
        queue.add_request(3, slot)
    }

    fn order(queue: &RequestQueue) -> Vec<(RequestCmd, u64)> {
        queue.pending(3).iter().map(|r| (r.cmd, r.sector)).collect()
    }

    #[test]
    fn test_first_request_starts_device() {
        let mut queue = RequestQueue::new(8);
        assert!(queue_request(&mut queue, RequestCmd::Write, 50));
        assert!(!queue_request(&mut queue, RequestCmd::Write, 10));
        assert_eq!(queue.pending(3).len(), 2);
    }

    #[test]
    fn test_reads_jump_ahead_of_writes() {
        use RequestCmd::*;
        let mut queue = RequestQueue::new(8);
        queue_request(&mut queue, Read, 0);
        for sector in [50, 10, 30] {
            queue_request(&mut queue, Write, sector);
        }
        queue_request(&mut queue, Read, 20);

        assert_eq!(
            order(&queue),
            [(Read, 0), (Read, 20), (Write, 10), (Write, 30), (Write, 50)]
        );
    }

    #[test]
    fn test_read_behind_busy_write_goes_first() {
        use RequestCmd::*;
        let mut queue = RequestQueue::new(8);
        for sector in [2, 4, 6] {
            queue_request(&mut queue, Write, sector);
        }
        queue_request(&mut queue, Read, 200);
        queue_request(&mut queue, Write, 3);

        assert_eq!(
            order(&queue),
            [(Write, 2), (Read, 200), (Write, 3), (Write, 4), (Write, 6)]
        );
    }

    #[test]
    fn test_in_order_compares_device_then_sector() {
        let mut a = Request {
            dev: Some(0x0301),
            cmd: RequestCmd::Write,
            sector: 100,
            nr_sectors: 2,
            buffer: 0,
            next: None,
        };
        let mut b = a.clone();
        b.dev = Some(0x0302);
        b.sector = 4;
        assert!(in_order(&a, &b));
        assert!(!in_order(&b, &a));

        a.cmd = RequestCmd::Read;
        b.dev = a.dev;
        assert!(in_order(&a, &b));
        // 相同位置互不在前
        b = a.clone();
        assert!(!in_order(&a, &b));
    }
}
