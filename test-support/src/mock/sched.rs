//! 调度相关操作的 Mock 实现

use std::sync::Once;

use sync::SchedOps;

/// 用 `std::thread::yield_now` 让出 CPU 的调度操作
pub struct MockSchedOps;

impl MockSchedOps {
    pub const fn new() -> Self {
        Self
    }
}

impl SchedOps for MockSchedOps {
    fn relax(&self) {
        std::thread::yield_now();
    }
}

/// 全局 Mock 实例
pub static MOCK_SCHED_OPS: MockSchedOps = MockSchedOps::new();

static INSTALL: Once = Once::new();

/// 注册 [`MOCK_SCHED_OPS`]，只会生效一次
pub fn install_sched_ops() {
    INSTALL.call_once(|| {
        // SAFETY: Once 保证只注册一次
        unsafe { sync::register_sched_ops(&MOCK_SCHED_OPS) };
    });
}
