//! 读写自旋锁
//!
//! 多个读者可以同时进入临界区，写者独占。写者不会被优先调度。

use core::sync::atomic::{AtomicUsize, Ordering};

const WRITER: usize = 1;
const READER: usize = 2;

/// 原始读写自旋锁
///
/// 状态字的最低位表示写者，其余位为读者计数（每个读者加 [`READER`]）。
#[derive(Debug)]
pub struct RawRwSpinLock {
    state: AtomicUsize,
}

impl RawRwSpinLock {
    /// 创建一个未加锁的读写锁
    pub const fn new() -> Self {
        Self {
            state: AtomicUsize::new(0),
        }
    }
}

impl Default for RawRwSpinLock {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: 写者只在状态为 0 时通过 CAS 进入；读者只在没有写者时增加计数。
unsafe impl lock_api::RawRwLock for RawRwSpinLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = RawRwSpinLock::new();

    type GuardMarker = lock_api::GuardSend;

    fn lock_shared(&self) {
        while !self.try_lock_shared() {
            crate::relax();
        }
    }

    fn try_lock_shared(&self) -> bool {
        let state = self.state.load(Ordering::Relaxed);
        if state & WRITER != 0 {
            return false;
        }
        self.state
            .compare_exchange_weak(state, state + READER, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock_shared(&self) {
        self.state.fetch_sub(READER, Ordering::Release);
    }

    fn lock_exclusive(&self) {
        while !self.try_lock_exclusive() {
            crate::relax();
        }
    }

    fn try_lock_exclusive(&self) -> bool {
        self.state
            .compare_exchange(0, WRITER, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock_exclusive(&self) {
        self.state.fetch_and(!WRITER, Ordering::Release);
    }

    fn is_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) != 0
    }

    fn is_locked_exclusive(&self) -> bool {
        self.state.load(Ordering::Relaxed) & WRITER != 0
    }
}

/// 读写锁
pub type RwLock<T> = lock_api::RwLock<RawRwSpinLock, T>;

/// 读锁保护器
pub type RwLockReadGuard<'a, T> = lock_api::RwLockReadGuard<'a, RawRwSpinLock, T>;

/// 写锁保护器
pub type RwLockWriteGuard<'a, T> = lock_api::RwLockWriteGuard<'a, RawRwSpinLock, T>;
