//! 驱动模型核心的配置

/// 延后 probe 在一次触发中最多重试的轮数
pub const DEFERRED_RETRY_ROUNDS: usize = 8;

/// 没有父设备的类设备所在的目录
pub const VIRTUAL_DIR: &str = "virtual";

/// sysfs 顶层目录名
pub const DEVICES_DIR: &str = "devices";
/// 总线顶层目录名
pub const BUS_DIR: &str = "bus";
/// 类顶层目录名
pub const CLASS_DIR: &str = "class";

/// [`DriverCore`](crate::DriverCore) 的配置
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// 新注册的总线是否默认开启自动 probe
    pub default_autoprobe: bool,
    /// 延后 probe 一次触发最多重试几轮
    pub deferred_retry_rounds: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            default_autoprobe: true,
            deferred_retry_rounds: DEFERRED_RETRY_ROUNDS,
        }
    }
}
