//! 测试支持 crate
//!
//! 提供宿主机测试所需的 Mock 实现和测试工具：
//!
//! - [`mock::logger`] - 捕获 `log` 记录的日志器
//! - [`mock::sched`] - 使用线程让步的 [`sync::SchedOps`]
//! - [`mock::executor`] - 用 std 线程执行异步 probe 的执行器

pub mod mock;

/// 初始化测试环境：安装日志器和调度操作
///
/// 可以被多个测试重复调用。
pub fn init() {
    mock::logger::init_logger();
    mock::sched::install_sched_ops();
}

/// 测试运行器
pub fn test_runner(tests: &[&dyn Fn()]) {
    for test in tests {
        test();
    }
}
