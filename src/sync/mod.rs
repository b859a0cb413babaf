//! 睡眠与唤醒原语
//!
//! 缓存引擎运行在协作式调度之上：任务只在等待队列上挂起，
//! 由其他任务或设备完成回调显式唤醒。本模块提供：
//!
//! - [`Scheduler`] - 让出处理器的钩子（由内核调度器或宿主线程实现）
//! - [`WaitQueue`] - 多等待者的等待队列

mod sched;
mod wait;

pub use sched::{Scheduler, SpinScheduler};
#[cfg(any(test, feature = "std"))]
pub use sched::ThreadScheduler;
pub use wait::WaitQueue;
