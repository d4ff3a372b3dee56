//! 驱动
//!
//! [`DeviceDriver`] 是驱动作者实现的回调集合，[`Driver`] 是注册到总线之后
//! 核心持有的驱动对象，记录已绑定的设备和它在 sysfs 中的目录。

use alloc::string::String;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use kernfs::KernfsNode;
use sync::RwLock;
use sysfs::{AttributeGroup, Entity};

use crate::bus::Bus;
use crate::device::Device;
use crate::error::DriverError;
use crate::klist::KList;

/// probe 的执行方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeType {
    /// 在调用方的上下文中同步 probe
    #[default]
    Sync,
    /// 安装了执行器时交给执行器异步 probe
    PreferAsync,
}

/// 驱动回调
///
/// 除 [`name`](DeviceDriver::name) 外都有默认实现。
pub trait DeviceDriver: Send + Sync {
    /// 驱动名，在总线内唯一
    fn name(&self) -> &str;

    /// 尝试接管设备
    ///
    /// 返回 [`DriverError::NoDevice`] 或 [`DriverError::NoAddress`] 表示拒绝，
    /// 返回 [`DriverError::ProbeDefer`] 表示依赖尚未就绪。
    fn probe(&self, _dev: &Arc<Device>) -> Result<(), DriverError> {
        Ok(())
    }

    /// 释放设备
    fn remove(&self, _dev: &Arc<Device>) {}

    /// 关机时停止设备
    fn shutdown(&self, _dev: &Arc<Device>) {}

    /// probe 的执行方式
    fn probe_type(&self) -> ProbeType {
        ProbeType::Sync
    }

    /// 为真时不创建 `bind` 和 `unbind` 属性
    fn suppress_bind_attrs(&self) -> bool {
        false
    }

    /// 放在驱动目录中的属性组
    fn groups(&self) -> Vec<AttributeGroup> {
        Vec::new()
    }

    /// 绑定成功后放在设备目录中的属性组
    fn dev_groups(&self) -> Vec<AttributeGroup> {
        Vec::new()
    }
}

/// 已注册的驱动
pub struct Driver {
    id: u64,
    name: String,
    bus: Arc<Bus>,
    ops: Arc<dyn DeviceDriver>,
    /// 已绑定的设备
    pub(crate) devices: KList<Arc<Device>>,
    pub(crate) groups: Vec<AttributeGroup>,
    pub(crate) dev_groups: Vec<AttributeGroup>,
    pub(crate) node: RwLock<Option<Arc<KernfsNode>>>,
    registered: AtomicBool,
}

impl Driver {
    pub(crate) fn new(id: u64, bus: Arc<Bus>, ops: Arc<dyn DeviceDriver>) -> Self {
        Self {
            id,
            name: String::from(ops.name()),
            groups: ops.groups(),
            dev_groups: ops.dev_groups(),
            bus,
            ops,
            devices: KList::new(),
            node: RwLock::new(None),
            registered: AtomicBool::new(false),
        }
    }

    /// 注册标识
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 驱动名
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 所在总线
    pub fn bus(&self) -> &Arc<Bus> {
        &self.bus
    }

    /// 驱动回调
    pub fn ops(&self) -> &Arc<dyn DeviceDriver> {
        &self.ops
    }

    /// 已绑定的设备，按绑定顺序
    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.devices.snapshot()
    }

    /// 是否已注册
    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    pub(crate) fn set_registered(&self, on: bool) {
        self.registered.store(on, Ordering::Release);
    }

    /// 驱动在 sysfs 中的目录
    pub fn kernfs_node(&self) -> Option<Arc<KernfsNode>> {
        self.node.read().clone()
    }

    /// 由属性回调收到的实体取回驱动
    pub fn from_entity(entity: &Entity) -> Option<Arc<Driver>> {
        entity.downcast_ref::<Weak<Driver>>()?.upgrade()
    }
}

impl core::fmt::Debug for Driver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Driver")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("bus", &self.bus.name())
            .finish()
    }
}
