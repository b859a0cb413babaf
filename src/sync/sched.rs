//! 调度器接口
//!
//! 对缓存引擎来说，“挂起”就是反复让出处理器直到等待队列被唤醒。

/// 调度器 trait
///
/// 引擎在每个挂起点调用 [`Scheduler::yield_now`]，由实现决定如何让出处理器。
///
/// # 设计说明
///
/// 这是一个接口预留，允许嵌入方选择调度实现：
/// - `SpinScheduler` - 忙等（无调度器的环境，默认）
/// - `ThreadScheduler` - 宿主线程（`std` 特性）
/// - 自定义实现（例如切换到内核的下一个就绪任务）
///
/// # 示例
///
/// ```rust,ignore
/// struct KernelSched;
///
/// impl Scheduler for KernelSched {
///     fn yield_now(&self) {
///         schedule();
///     }
/// }
///
/// let cache = BlockCache::with_scheduler(CacheConfig::default(), Box::new(KernelSched))?;
/// ```
pub trait Scheduler: Send + Sync {
    /// 让出处理器
    fn yield_now(&self);
}

/// 忙等实现
pub struct SpinScheduler;

impl Scheduler for SpinScheduler {
    #[inline]
    fn yield_now(&self) {
        core::hint::spin_loop();
    }
}

/// 宿主线程实现
#[cfg(any(test, feature = "std"))]
pub struct ThreadScheduler;

#[cfg(any(test, feature = "std"))]
impl Scheduler for ThreadScheduler {
    #[inline]
    fn yield_now(&self) {
        std::thread::yield_now();
    }
}
