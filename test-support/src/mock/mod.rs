//! Mock 实现模块
//!
//! 提供各种宿主环境组件的 Mock 实现，用于测试

pub mod executor;
pub mod logger;
pub mod sched;
