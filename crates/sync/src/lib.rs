//! 同步原语
//!
//! 向设备模型与 kernfs 提供基本的锁和等待原语，
//! 包括自旋锁、读写锁、一次性完成量（[`Completion`]）和在途计数器（[`WaitCounter`]）。
//!
//! # 调度解耦
//!
//! 所有阻塞等待都会在循环中调用 [`relax`]。默认实现只是 `spin_loop` 提示；
//! 宿主环境可以通过 [`register_sched_ops`] 注册一个让出 CPU 的实现。

#![no_std]

#[cfg(test)]
extern crate std;

mod completion;
mod raw_spin_lock;
mod rwlock;
mod spin_lock;
mod wait_counter;

pub use completion::Completion;
pub use raw_spin_lock::RawSpinLock;
pub use rwlock::{RawRwSpinLock, RwLock, RwLockReadGuard, RwLockWriteGuard};
pub use spin_lock::{SpinLock, SpinLockGuard};
pub use wait_counter::{WaitCounter, WaitCounterGuard};

use core::sync::atomic::{AtomicUsize, Ordering};

/// 调度相关操作的 trait
///
/// 由宿主（内核或测试环境）实现并注册，决定阻塞等待时如何让出 CPU。
pub trait SchedOps: Send + Sync {
    /// 在忙等循环中调用一次
    fn relax(&self);
}

/// 全局调度操作实例（存储 fat pointer 的两个部分）
static SCHED_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static SCHED_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册调度操作实现
///
/// # Safety
/// 必须在单线程环境下调用；重复注册时所有调用必须传入同一个实例
pub unsafe fn register_sched_ops(ops: &'static dyn SchedOps) {
    let ptr = ops as *const dyn SchedOps;
    // SAFETY: fat pointer 的布局是 (data, vtable)
    let (data, vtable) =
        unsafe { core::mem::transmute::<*const dyn SchedOps, (usize, usize)>(ptr) };
    SCHED_OPS_VTABLE.store(vtable, Ordering::Release);
    SCHED_OPS_DATA.store(data, Ordering::Release);
}

/// 获取已注册的调度操作实现
#[inline]
fn sched_ops() -> Option<&'static dyn SchedOps> {
    let data = SCHED_OPS_DATA.load(Ordering::Acquire);
    if data == 0 {
        return None;
    }
    let vtable = SCHED_OPS_VTABLE.load(Ordering::Acquire);
    // SAFETY: data 和 vtable 是通过 register_sched_ops 设置的有效指针
    Some(unsafe { &*core::mem::transmute::<(usize, usize), *const dyn SchedOps>((data, vtable)) })
}

/// 忙等循环中的一次让步
///
/// 未注册 [`SchedOps`] 时退化为 CPU 自旋提示。
#[inline]
pub fn relax() {
    match sched_ops() {
        Some(ops) => ops.relax(),
        None => core::hint::spin_loop(),
    }
}

#[cfg(test)]
mod tests;
