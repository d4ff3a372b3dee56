//! 在途操作计数器
//!
//! 记录正在进行的操作数量，调用方可以阻塞直到计数归零。
//! 设备模型用它跟踪所有在途的 probe。

use core::sync::atomic::{AtomicUsize, Ordering};

/// 可等待归零的计数器
#[derive(Debug, Default)]
pub struct WaitCounter {
    count: AtomicUsize,
}

impl WaitCounter {
    /// 创建计数为 0 的计数器
    pub const fn new() -> Self {
        Self {
            count: AtomicUsize::new(0),
        }
    }

    /// 计数加一
    pub fn inc(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    /// 计数减一，返回减后的值
    pub fn dec(&self) -> usize {
        let prev = self.count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "WaitCounter underflow");
        prev - 1
    }

    /// 当前计数
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// 计数加一并返回一个在离开作用域时减一的保护器
    pub fn enter(&self) -> WaitCounterGuard<'_> {
        self.inc();
        WaitCounterGuard { counter: self }
    }

    /// 阻塞直到计数归零
    pub fn wait_zero(&self) {
        while self.count() != 0 {
            crate::relax();
        }
    }
}

/// [`WaitCounter::enter`] 返回的保护器
pub struct WaitCounterGuard<'a> {
    counter: &'a WaitCounter,
}

impl Drop for WaitCounterGuard<'_> {
    fn drop(&mut self) {
        self.counter.dec();
    }
}
