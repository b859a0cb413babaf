//! 等待队列
//!
//! 用序号实现的多等待者队列：等待者在持有临界区时取得票据，
//! 离开临界区后挂起，直到序号变化。唤醒方在改变状态之后递增序号，
//! 因此所有已取票的等待者都会被唤醒，不会丢失唤醒。

use core::sync::atomic::{AtomicU64, Ordering};

use super::Scheduler;

/// 等待队列
#[derive(Debug, Default)]
pub struct WaitQueue {
    seq: AtomicU64,
}

impl WaitQueue {
    /// 创建空等待队列
    pub const fn new() -> Self {
        Self {
            seq: AtomicU64::new(0),
        }
    }

    /// 取得票据
    ///
    /// 必须在观察到等待条件的同一临界区内调用。
    #[inline]
    pub fn prepare(&self) -> u64 {
        self.seq.load(Ordering::Acquire)
    }

    /// 挂起，直到票据之后发生过唤醒
    pub fn sleep(&self, ticket: u64, sched: &dyn Scheduler) {
        while self.seq.load(Ordering::Acquire) == ticket {
            sched.yield_now();
        }
    }

    /// 唤醒所有等待者
    #[inline]
    pub fn wake_all(&self) {
        self.seq.fetch_add(1, Ordering::Release);
    }
}
