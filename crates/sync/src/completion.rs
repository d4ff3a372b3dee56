//! 一次性完成量
//!
//! 一方调用 [`Completion::wait`] 阻塞，另一方调用 [`Completion::complete`] 唤醒。
//! 完成状态会一直保持，直到 [`Completion::reinit`]，因此先完成后等待不会丢失唤醒。

use core::sync::atomic::{AtomicBool, Ordering};

/// 一次性完成信号
#[derive(Debug, Default)]
pub struct Completion {
    done: AtomicBool,
}

impl Completion {
    /// 创建一个未完成的完成量
    pub const fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
        }
    }

    /// 标记完成并唤醒所有等待者
    pub fn complete(&self) {
        self.done.store(true, Ordering::Release);
    }

    /// 是否已经完成
    pub fn is_completed(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// 阻塞直到完成
    pub fn wait(&self) {
        while !self.is_completed() {
            crate::relax();
        }
    }

    /// 最多让步 `spins` 次，返回是否已完成
    pub fn wait_bounded(&self, spins: usize) -> bool {
        for _ in 0..spins {
            if self.is_completed() {
                return true;
            }
            crate::relax();
        }
        self.is_completed()
    }

    /// 重置为未完成状态
    pub fn reinit(&self) {
        self.done.store(false, Ordering::Release);
    }
}
