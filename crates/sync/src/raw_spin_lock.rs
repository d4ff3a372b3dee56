//! 自旋锁实现
//!
//! 基于原子操作实现 [`lock_api::RawMutex`]，供 [`crate::SpinLock`] 使用。

use core::sync::atomic::{AtomicBool, Ordering};

/// 原始自旋锁，提供互斥访问临界区的能力。
///
/// 不可重入 (即不能在持有锁时再次调用 `lock()`)。
#[derive(Debug)]
pub struct RawSpinLock {
    lock: AtomicBool,
}

impl RawSpinLock {
    /// 创建一个新的 RawSpinLock 实例。
    pub const fn new() -> Self {
        RawSpinLock {
            lock: AtomicBool::new(false),
        }
    }
}

impl Default for RawSpinLock {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: 只有成功把标志从 false 置为 true 的一方才能进入临界区，
// 释放使用 Release 语义与获取时的 Acquire 配对。
unsafe impl lock_api::RawMutex for RawSpinLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = RawSpinLock::new();

    type GuardMarker = lock_api::GuardSend;

    fn lock(&self) {
        while self
            .lock
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            // 先只读等待，减少缓存行争用
            while self.lock.load(Ordering::Relaxed) {
                crate::relax();
            }
        }
    }

    fn try_lock(&self) -> bool {
        self.lock
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock(&self) {
        self.lock.store(false, Ordering::Release);
    }

    fn is_locked(&self) -> bool {
        self.lock.load(Ordering::Relaxed)
    }
}
