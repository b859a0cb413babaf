//! 块缓存管理器
//!
//! [`BlockCache`] 是整个引擎的上下文：缓冲池、数据页、等待队列、
//! 请求表和设备表都归它所有，所有操作通过 `&BlockCache` 进行。
//!
//! # 挂起与重新校验
//!
//! 等待缓冲块解锁、等待空闲缓冲块、等待空闲请求槽以及同步写回都是挂起点。
//! 挂起期间其他任务或设备完成回调可能改变任意状态，因此挂起之前算出的
//! 结论在醒来后一律重新检查，检查不通过就从头再来。
//!
//! # 锁顺序
//!
//! 缓冲池的临界区 (`pool`) 与请求表的临界区 (`queue`) 都很短，从不跨越挂起点。
//! 需要同时持有时，先取 `queue` 再取 `pool`。

use super::buffer::{BufferFlags, BufferHandle, BufferId};
use super::pool::BufferPool;
use super::sync::MetadataHooks;
use crate::block::{IoOp, RequestQueue};
use crate::consts::{BLOCKS_PER_PAGE, BLOCK_SIZE};
use crate::error::{Error, ErrorKind, Result};
use crate::fatal;
use crate::sync::{Scheduler, WaitQueue};
use crate::types::{BlockNr, CacheConfig, Dev};
use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::{Mutex, RwLock};

/// 缓存统计信息
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// `getblk` 总次数
    pub total_accesses: u64,
    /// 缓存命中次数
    pub hits: u64,
    /// 缓存未命中次数
    pub misses: u64,
    /// 回收改派了原属某设备的缓冲块的次数
    pub evictions: u64,
    /// 入队的读请求数
    pub read_requests: u64,
    /// 入队的写请求数
    pub write_requests: u64,
    /// 设备报告的 I/O 失败次数
    pub io_errors: u64,
}

impl CacheStats {
    /// 计算命中率
    pub fn hit_rate(&self) -> f64 {
        if self.total_accesses == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_accesses as f64
        }
    }
}

/// 块缓存
///
/// # 示例
///
/// ```rust,ignore
/// let cache = BlockCache::new(CacheConfig::with_buffers(64))?;
/// cache.register_blkdev(1, Arc::new(RamDisk::new(1, 1, 1 << 20)))?;
///
/// let dev = mkdev(1, 1);
/// let bh = cache.bread(dev, 10)?;
/// cache.with_data_mut(bh, |data| data[0] = 0x42);
/// cache.mark_dirty(bh);
/// cache.brelse(bh);
///
/// cache.sync_dev(dev)?;
/// ```
pub struct BlockCache {
    pool: Mutex<BufferPool>,
    data: Vec<Mutex<Vec<u8>>>,
    /// 每个缓冲块的解锁等待队列
    lock_wait: Vec<WaitQueue>,
    /// 等待任意缓冲块被释放
    buffer_wait: WaitQueue,
    pub(crate) queue: Mutex<RequestQueue>,
    /// 等待空闲请求槽
    pub(crate) wait_for_request: WaitQueue,
    hooks: RwLock<Option<Arc<dyn MetadataHooks>>>,
    pub(crate) stats: Mutex<CacheStats>,
    sched: Box<dyn Scheduler>,
}

impl BlockCache {
    /// 创建块缓存，使用默认调度器
    ///
    /// 启用 `std` 特性时挂起会让出宿主线程，否则忙等。
    pub fn new(config: CacheConfig) -> Result<Self> {
        #[cfg(feature = "std")]
        let sched: Box<dyn Scheduler> = Box::new(crate::sync::ThreadScheduler);
        #[cfg(not(feature = "std"))]
        let sched: Box<dyn Scheduler> = Box::new(crate::sync::SpinScheduler);
        Self::with_scheduler(config, sched)
    }

    /// 创建块缓存，指定挂起时使用的调度器
    ///
    /// 一次性把内存划分为定长缓冲块，建立初始空闲环并清空哈希表。
    pub fn with_scheduler(config: CacheConfig, sched: Box<dyn Scheduler>) -> Result<Self> {
        config.validate()?;
        log::info!(
            "[BCACHE] init: {} buffers of {} bytes, {} hash buckets, {} request slots",
            config.nr_buffers,
            BLOCK_SIZE,
            config.nr_hash,
            config.nr_request
        );
        Ok(Self {
            pool: Mutex::new(BufferPool::new(config.nr_buffers, config.nr_hash)),
            data: (0..config.nr_buffers)
                .map(|_| Mutex::new(alloc::vec![0u8; BLOCK_SIZE]))
                .collect(),
            lock_wait: (0..config.nr_buffers).map(|_| WaitQueue::new()).collect(),
            buffer_wait: WaitQueue::new(),
            queue: Mutex::new(RequestQueue::new(config.nr_request)),
            wait_for_request: WaitQueue::new(),
            hooks: RwLock::new(None),
            stats: Mutex::new(CacheStats::default()),
            sched,
        })
    }

    /// 安装文件系统元数据钩子
    pub fn set_hooks(&self, hooks: Arc<dyn MetadataHooks>) {
        *self.hooks.write() = Some(hooks);
    }

    pub(crate) fn hooks(&self) -> Option<Arc<dyn MetadataHooks>> {
        self.hooks.read().clone()
    }

    /// 缓冲块数量
    pub fn nr_buffers(&self) -> usize {
        self.data.len()
    }

    /// 获取缓存统计信息
    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }

    /// 指定块当前是否在哈希表中
    pub fn is_cached(&self, dev: Dev, blocknr: BlockNr) -> bool {
        self.pool.lock().find(dev, blocknr).is_some()
    }

    //=========================================================================
    // 挂起原语
    //=========================================================================

    #[inline]
    pub(crate) fn sleep_on(&self, wq: &WaitQueue, ticket: u64) {
        wq.sleep(ticket, &*self.sched);
    }

    /// 等待缓冲块解锁
    pub(crate) fn wait_on_buffer(&self, id: BufferId) {
        loop {
            let pool = self.pool.lock();
            if !pool.head(id).is_locked() {
                return;
            }
            let ticket = self.lock_wait[id].prepare();
            drop(pool);
            self.sleep_on(&self.lock_wait[id], ticket);
        }
    }

    /// 给缓冲块上锁（标记 I/O 进行中），已上锁则等待
    pub(crate) fn lock_buffer(&self, id: BufferId) {
        loop {
            let mut pool = self.pool.lock();
            let bh = pool.head_mut(id);
            if !bh.is_locked() {
                bh.flags.insert(BufferFlags::LOCKED);
                return;
            }
            let ticket = self.lock_wait[id].prepare();
            drop(pool);
            self.sleep_on(&self.lock_wait[id], ticket);
        }
    }

    /// 尝试给缓冲块上锁，已上锁时立即返回 `false`
    pub(crate) fn try_lock_buffer(&self, id: BufferId) -> bool {
        let mut pool = self.pool.lock();
        let bh = pool.head_mut(id);
        if bh.is_locked() {
            return false;
        }
        bh.flags.insert(BufferFlags::LOCKED);
        true
    }

    /// 解锁缓冲块并唤醒等待者
    pub(crate) fn unlock_buffer(&self, id: BufferId) {
        {
            let mut pool = self.pool.lock();
            let bh = pool.head_mut(id);
            if !bh.is_locked() {
                log::warn!("[BCACHE] buffer {} not locked", id);
            }
            bh.flags.remove(BufferFlags::LOCKED);
        }
        self.lock_wait[id].wake_all();
    }

    //=========================================================================
    // 缓冲块访问
    //=========================================================================

    /// 校验句柄仍然有效（未过期且处于借出状态）
    fn checked(&self, pool: &BufferPool, handle: BufferHandle) -> BufferId {
        if handle.index >= pool.len() {
            fatal!("Buffer handle {} out of range", handle.index);
        }
        let bh = pool.head(handle.index);
        if bh.generation != handle.generation {
            fatal!(
                "Stale buffer handle {} (generation {} != {})",
                handle.index,
                handle.generation,
                bh.generation
            );
        }
        if bh.count == 0 {
            fatal!("Buffer handle {} used after release", handle.index);
        }
        handle.index
    }

    fn read_head<R>(&self, handle: BufferHandle, f: impl FnOnce(&super::BufferHead) -> R) -> R {
        let pool = self.pool.lock();
        let id = self.checked(&pool, handle);
        f(pool.head(id))
    }

    fn update_head(&self, handle: BufferHandle, f: impl FnOnce(&mut super::BufferHead)) {
        let mut pool = self.pool.lock();
        let id = self.checked(&pool, handle);
        f(pool.head_mut(id));
    }

    /// 只读访问缓冲块数据
    pub fn with_data<R>(&self, handle: BufferHandle, f: impl FnOnce(&[u8]) -> R) -> R {
        let id = self.buffer_id(handle);
        let data = self.data[id].lock();
        f(&data)
    }

    /// 可写访问缓冲块数据
    ///
    /// 不会自动标记为脏，修改后需调用 [`mark_dirty`](Self::mark_dirty)。
    pub fn with_data_mut<R>(&self, handle: BufferHandle, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let id = self.buffer_id(handle);
        let mut data = self.data[id].lock();
        f(&mut data)
    }

    /// 驱动访问数据页，不经过句柄校验
    pub(crate) fn buffer_data(&self, id: BufferId) -> spin::MutexGuard<'_, Vec<u8>> {
        self.data[id].lock()
    }

    /// 标记为脏（已修改，待写回）
    pub fn mark_dirty(&self, handle: BufferHandle) {
        self.update_head(handle, |bh| bh.flags.insert(BufferFlags::DIRTY));
    }

    /// 标记数据有效（调用者已自行填充整块）
    pub fn set_uptodate(&self, handle: BufferHandle) {
        self.update_head(handle, |bh| bh.flags.insert(BufferFlags::UPTODATE));
    }

    /// 检查是否是脏块
    pub fn is_dirty(&self, handle: BufferHandle) -> bool {
        self.read_head(handle, |bh| bh.is_dirty())
    }

    /// 检查数据是否有效
    pub fn is_uptodate(&self, handle: BufferHandle) -> bool {
        self.read_head(handle, |bh| bh.is_uptodate())
    }

    /// 缓冲块所属设备
    pub fn dev(&self, handle: BufferHandle) -> Dev {
        self.read_head(handle, |bh| bh.dev)
    }

    /// 缓冲块对应的块号
    pub fn blocknr(&self, handle: BufferHandle) -> BlockNr {
        self.read_head(handle, |bh| bh.blocknr)
    }

    /// 当前引用计数
    pub fn refcount(&self, handle: BufferHandle) -> u32 {
        self.read_head(handle, |bh| bh.count)
    }

    /// 由句柄取得缓冲块下标，同时校验句柄
    pub(crate) fn buffer_id(&self, handle: BufferHandle) -> BufferId {
        let pool = self.pool.lock();
        self.checked(&pool, handle)
    }

    /// 读取描述符的一个快照（供请求与同步路径使用）
    pub(crate) fn peek<R>(&self, id: BufferId, f: impl FnOnce(&super::BufferHead) -> R) -> R {
        f(self.pool.lock().head(id))
    }

    /// 在池锁内修改描述符
    pub(crate) fn modify<R>(&self, id: BufferId, f: impl FnOnce(&mut super::BufferHead) -> R) -> R {
        f(self.pool.lock().head_mut(id))
    }

    //=========================================================================
    // 获取与释放
    //=========================================================================

    /// 在哈希表中查找并借出缓冲块
    ///
    /// 先增加引用计数再等待解锁；醒来后缓冲块可能已被改派，
    /// 此时撤销计数重新查找。
    pub fn get_hash_table(&self, dev: Dev, blocknr: BlockNr) -> Option<BufferHandle> {
        loop {
            let id = {
                let mut pool = self.pool.lock();
                let id = pool.find(dev, blocknr)?;
                pool.head_mut(id).count += 1;
                id
            };
            self.wait_on_buffer(id);

            let mut pool = self.pool.lock();
            let bh = pool.head_mut(id);
            if bh.holds(dev, blocknr) {
                return Some(BufferHandle {
                    index: id,
                    generation: bh.generation,
                });
            }
            bh.count -= 1;
            drop(pool);
            log::trace!("[BCACHE] buffer {} repurposed while waiting, retry", id);
            self.buffer_wait.wake_all();
        }
    }

    /// 取得指定块的缓冲块，必要时回收一个
    ///
    /// 返回的缓冲块引用计数至少为 1，数据不一定有效（见 [`bread`](Self::bread)）。
    /// 缓冲块全部借出时挂起，直到有缓冲块被释放。
    ///
    /// 设备号 0 标记空闲缓冲块，用它取块直接停机。
    pub fn getblk(&self, dev: Dev, blocknr: BlockNr) -> BufferHandle {
        if dev == 0 {
            fatal!("getblk on device 0 (block {})", blocknr);
        }
        self.stats.lock().total_accesses += 1;

        'repeat: loop {
            if let Some(handle) = self.get_hash_table(dev, blocknr) {
                self.stats.lock().hits += 1;
                log::trace!("[BCACHE] getblk dev={:#06x} block={} HIT", dev, blocknr);
                return handle;
            }

            let victim = {
                let pool = self.pool.lock();
                match pool.pick_victim() {
                    Some(id) => id,
                    None => {
                        let ticket = self.buffer_wait.prepare();
                        drop(pool);
                        log::debug!("[BCACHE] all buffers busy, waiting for a release");
                        self.sleep_on(&self.buffer_wait, ticket);
                        continue 'repeat;
                    }
                }
            };

            self.wait_on_buffer(victim);
            if self.peek(victim, |bh| bh.count) != 0 {
                continue 'repeat;
            }
            loop {
                let (dirty, victim_dev) = self.peek(victim, |bh| (bh.is_dirty(), bh.dev));
                if !dirty {
                    break;
                }
                log::debug!("[BCACHE] victim {} is dirty, syncing dev {:#06x}", victim, victim_dev);
                // 同步写回总是成功返回，写失败体现在缓冲块状态上
                let _ = self.sync_dev(victim_dev);
                self.wait_on_buffer(victim);
                if self.peek(victim, |bh| bh.count) != 0 {
                    continue 'repeat;
                }
            }

            let mut pool = self.pool.lock();
            // 挂起期间别的任务可能已经把这个块放进了缓存
            if pool.find(dev, blocknr).is_some() {
                continue 'repeat;
            }
            let bh = pool.head(victim);
            if bh.count != 0 || bh.is_locked() || bh.is_dirty() {
                continue 'repeat;
            }
            let old_dev = bh.dev;
            let old_block = bh.blocknr;
            pool.rehash(victim, dev, blocknr);
            let generation = pool.head(victim).generation;
            drop(pool);

            let mut stats = self.stats.lock();
            stats.misses += 1;
            if old_dev != 0 {
                stats.evictions += 1;
                log::debug!(
                    "[BCACHE] buffer {}: dev={:#06x} block={} -> dev={:#06x} block={}",
                    victim,
                    old_dev,
                    old_block,
                    dev,
                    blocknr
                );
            }
            return BufferHandle {
                index: victim,
                generation,
            };
        }
    }

    /// 归还缓冲块
    ///
    /// 等待 I/O 完成后减少引用计数，并唤醒等待空闲缓冲块的任务。
    /// 重复释放视为内存结构损坏，直接停机。
    pub fn brelse(&self, handle: BufferHandle) {
        let id = {
            let pool = self.pool.lock();
            let stale = handle.index >= pool.len()
                || pool.head(handle.index).generation != handle.generation;
            if stale {
                fatal!("Trying to free stale buffer handle {}", handle.index);
            }
            handle.index
        };
        self.wait_on_buffer(id);
        {
            let mut pool = self.pool.lock();
            let bh = pool.head_mut(id);
            if bh.count == 0 {
                fatal!("Trying to free free buffer");
            }
            bh.count -= 1;
        }
        self.buffer_wait.wake_all();
    }

    /// 不等待解锁直接减少引用计数（预读的缓冲块仍在 I/O 中）
    fn put_nowait(&self, handle: BufferHandle) {
        {
            let mut pool = self.pool.lock();
            let id = self.checked(&pool, handle);
            pool.head_mut(id).count -= 1;
        }
        self.buffer_wait.wake_all();
    }

    //=========================================================================
    // 读取
    //=========================================================================

    /// 读取指定块
    ///
    /// 缓存中的数据有效时直接返回，否则发起同步读。
    /// 读失败时释放缓冲块并返回 `ErrorKind::Io`。
    pub fn bread(&self, dev: Dev, blocknr: BlockNr) -> Result<BufferHandle> {
        let handle = self.getblk(dev, blocknr);
        if self.is_uptodate(handle) {
            return Ok(handle);
        }
        self.submit(IoOp::Read, handle);
        self.wait_on_buffer(handle.index);
        if self.is_uptodate(handle) {
            return Ok(handle);
        }
        self.brelse(handle);
        Err(Error::new(ErrorKind::Io, "Block read failed"))
    }

    /// 读取 `first`，同时对 `ahead` 中的块发起预读
    ///
    /// 预读是尽力而为的：不等待、不返回错误，发起后立即归还缓冲块。
    /// 池中只有一个缓冲块时 `first` 占着它，预读被跳过。
    pub fn breada(&self, dev: Dev, first: BlockNr, ahead: &[BlockNr]) -> Result<BufferHandle> {
        let handle = self.getblk(dev, first);
        if !self.is_uptodate(handle) {
            self.submit(IoOp::Read, handle);
        }
        let ahead = if self.nr_buffers() > 1 { ahead } else { &[] };
        for &blocknr in ahead {
            let tmp = self.getblk(dev, blocknr);
            if !self.is_uptodate(tmp) {
                self.submit(IoOp::ReadAhead, tmp);
            }
            self.put_nowait(tmp);
        }
        self.wait_on_buffer(handle.index);
        if self.is_uptodate(handle) {
            return Ok(handle);
        }
        self.brelse(handle);
        Err(Error::new(ErrorKind::Io, "Block read failed"))
    }

    /// 把最多四个块读到一页内存中
    ///
    /// 先发起全部读请求再逐个等待，以便 I/O 重叠。块号为 0 表示空洞，
    /// 对应区域填零；读失败的区域同样填零，并在最后返回 `ErrorKind::Io`。
    ///
    /// 所有块同时借出，不同块号的数量超过池容量时返回 `ErrorKind::InvalidInput`。
    pub fn bread_page(
        &self,
        page: &mut [u8],
        dev: Dev,
        blocks: [BlockNr; BLOCKS_PER_PAGE],
    ) -> Result<()> {
        if page.len() < BLOCKS_PER_PAGE * BLOCK_SIZE {
            return Err(Error::new(ErrorKind::InvalidInput, "Page too small for four blocks"));
        }
        let distinct = blocks
            .iter()
            .enumerate()
            .filter(|&(i, &b)| b != 0 && !blocks[..i].contains(&b))
            .count();
        if distinct > self.nr_buffers() {
            return Err(Error::new(ErrorKind::InvalidInput, "Buffer pool too small for a page"));
        }

        let mut bh: [Option<BufferHandle>; BLOCKS_PER_PAGE] = [None; BLOCKS_PER_PAGE];
        for (slot, &blocknr) in bh.iter_mut().zip(blocks.iter()) {
            if blocknr == 0 {
                continue;
            }
            let handle = self.getblk(dev, blocknr);
            if !self.is_uptodate(handle) {
                self.submit(IoOp::Read, handle);
            }
            *slot = Some(handle);
        }

        let mut failed = false;
        for (chunk, slot) in page.chunks_exact_mut(BLOCK_SIZE).zip(bh.iter()) {
            let Some(handle) = *slot else {
                chunk.fill(0);
                continue;
            };
            self.wait_on_buffer(handle.index);
            if self.is_uptodate(handle) {
                self.with_data(handle, |data| chunk.copy_from_slice(data));
            } else {
                chunk.fill(0);
                failed = true;
            }
            self.brelse(handle);
        }

        if failed {
            return Err(Error::new(ErrorKind::Io, "Page read failed"));
        }
        Ok(())
    }
}

impl core::fmt::Debug for BlockCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BlockCache")
            .field("nr_buffers", &self.nr_buffers())
            .field("stats", &*self.stats.lock())
            .finish()
    }
}
