//! 异步 probe 执行器的 Mock 实现
//!
//! 注意：这里不直接依赖 `device` crate（避免循环依赖）。
//! `device` crate 在 `cfg(test)` 下为该类型实现其 `ProbeExecutor` trait。

use std::boxed::Box;
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::vec::Vec;

/// 每个任务启动一个 std 线程的执行器
pub struct MockThreadExecutor {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl MockThreadExecutor {
    pub const fn new() -> Self {
        Self {
            handles: Mutex::new(Vec::new()),
        }
    }

    /// 在新线程中执行 `work`
    pub fn spawn(&self, work: Box<dyn FnOnce() + Send + 'static>) {
        let handle = std::thread::spawn(work);
        if let Ok(mut handles) = self.handles.lock() {
            handles.push(handle);
        }
    }

    /// 已启动的任务数量
    pub fn spawned(&self) -> usize {
        self.handles.lock().map(|h| h.len()).unwrap_or(0)
    }

    /// 等待所有已启动的线程结束
    pub fn join_all(&self) {
        let handles: Vec<_> = match self.handles.lock() {
            Ok(mut h) => h.drain(..).collect(),
            Err(_) => return,
        };
        for h in handles {
            let _ = h.join();
        }
    }
}

impl Default for MockThreadExecutor {
    fn default() -> Self {
        Self::new()
    }
}
