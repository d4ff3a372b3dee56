//! 驱动模型核心
//!
//! 此 crate 跟踪系统中注册的所有总线、设备类、设备和驱动，负责把设备与驱动配对，
//! 并把整个对象图投影到 sysfs 中。包括：
//!
//! - [`DriverCore`] - 对象图的所有者，提供注册、注销和查找
//! - [`BusType`] / [`Bus`] - 总线回调与注册后的总线
//! - [`ClassType`] / [`Class`] / [`ClassInterface`] - 设备类
//! - [`DeviceDriver`] / [`Driver`] - 驱动回调与注册后的驱动
//! - [`Device`] / [`DeviceBuilder`] - 设备，两阶段注册
//! - 绑定引擎 - [`DriverCore::device_attach`]、[`DriverCore::driver_attach`]、
//!   [`DriverCore::device_release_driver`] 等
//! - 受管资源账本 - [`Device::devres_add`] 等，解绑时逆序撤销
//! - [`KList`] - 带生命周期钩子的成员表
//!
//! # 执行器解耦
//!
//! 偏好异步 probe 的驱动需要一个 [`ProbeExecutor`]，通过
//! [`DriverCore::set_probe_executor`] 安装。未安装时所有 probe 都同步执行。

#![no_std]
#![allow(clippy::module_inception)]

extern crate alloc;

#[cfg(test)]
extern crate std;

mod bus;
mod class;
pub mod config;
mod dd;
mod device;
mod devres;
mod driver;
mod error;
mod klist;
mod notifier;
mod registry;
mod uevent;

// Re-export registry
pub use registry::{DriverCore, ProbeExecutor};
pub use config::CoreConfig;

// Re-export registry objects
pub use bus::{Bus, BusType};
pub use class::{Class, ClassInterface, ClassType, InterfaceId};
pub use device::{BindState, Device, DeviceBuilder, Placement, ReleaseFn};
pub use driver::{DeviceDriver, Driver, ProbeType};

// Re-export binding engine
pub use dd::AttachOutcome;

// Re-export devres
pub use devres::{DevresGroupId, DevresRelease};

// Re-export 其余
pub use error::DriverError;
pub use klist::{KList, KListHook, KListIter};
pub use notifier::{BusEvent, BusNotifier, NotifierId};
pub use uevent::{UeventAction, UeventHandler};

#[cfg(test)]
mod tests;
