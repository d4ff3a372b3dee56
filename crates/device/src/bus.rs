//! 总线
//!
//! [`BusType`] 是总线实现者提供的回调，[`Bus`] 是注册后的总线对象。
//! 总线维护两张表：挂在它上面的设备和注册到它上面的驱动。
//!
//! 注册后总线在 sysfs 中的布局：
//!
//! ```text
//! /bus/<name>/devices/           指向各设备目录的链接
//! /bus/<name>/drivers/<drv>/     驱动目录
//! /bus/<name>/drivers_probe      写入设备名触发一次 attach
//! /bus/<name>/drivers_autoprobe  读写自动 probe 开关
//! /bus/<name>/uevent             写入动作名合成事件
//! ```

use alloc::string::String;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use kernfs::KernfsNode;
use sync::RwLock;
use sysfs::{AttributeGroup, Entity};

use crate::device::{Device, DeviceFlags};
use crate::driver::Driver;
use crate::error::DriverError;
use crate::klist::KList;
use crate::notifier::{BusEvent, BusNotifier, NotifierChain, NotifierId};

/// 总线回调
pub trait BusType: Send + Sync {
    /// 总线名，全局唯一
    fn name(&self) -> &str;

    /// 判断驱动能否处理设备
    ///
    /// 返回 [`DriverError::ProbeDefer`] 表示暂时无法判断，设备会进入延后队列；
    /// 其他错误按不匹配处理。
    fn match_device(&self, _dev: &Arc<Device>, _drv: &Arc<Driver>) -> Result<bool, DriverError> {
        Ok(true)
    }

    /// probe，默认交给驱动
    fn probe(&self, dev: &Arc<Device>, drv: &Arc<Driver>) -> Result<(), DriverError> {
        drv.ops().probe(dev)
    }

    /// remove，默认交给驱动
    fn remove(&self, dev: &Arc<Device>, drv: &Arc<Driver>) {
        drv.ops().remove(dev);
    }

    /// shutdown，默认交给驱动
    fn shutdown(&self, dev: &Arc<Device>, drv: &Arc<Driver>) {
        drv.ops().shutdown(dev);
    }

    /// 绑定和解绑时是否同时持有父设备的锁
    fn need_parent_lock(&self) -> bool {
        false
    }

    /// 为设备追加事件环境变量
    fn uevent(&self, _dev: &Device, _env: &mut Vec<String>) -> Result<(), DriverError> {
        Ok(())
    }

    /// 总线目录中的属性组
    fn bus_groups(&self) -> Vec<AttributeGroup> {
        Vec::new()
    }

    /// 总线上每个设备目录中的属性组
    fn dev_groups(&self) -> Vec<AttributeGroup> {
        Vec::new()
    }

    /// 总线上每个驱动目录中的属性组
    fn drv_groups(&self) -> Vec<AttributeGroup> {
        Vec::new()
    }
}

pub(crate) struct BusDirs {
    pub(crate) dir: Arc<KernfsNode>,
    pub(crate) devices: Arc<KernfsNode>,
    pub(crate) drivers: Arc<KernfsNode>,
}

fn bus_dev_get(dev: &Arc<Device>) {
    dev.set_flag(DeviceFlags::ON_BUS);
}

fn bus_dev_put(dev: &Arc<Device>) {
    dev.clear_flag(DeviceFlags::ON_BUS);
}

/// 已注册的总线
pub struct Bus {
    id: u64,
    name: String,
    ops: Arc<dyn BusType>,
    pub(crate) devices: KList<Arc<Device>>,
    pub(crate) drivers: KList<Arc<Driver>>,
    autoprobe: AtomicBool,
    notifier: NotifierChain,
    pub(crate) dirs: RwLock<Option<BusDirs>>,
    pub(crate) bus_groups: Vec<AttributeGroup>,
    pub(crate) dev_groups: Vec<AttributeGroup>,
    pub(crate) drv_groups: Vec<AttributeGroup>,
    registered: AtomicBool,
}

impl Bus {
    pub(crate) fn new(id: u64, ops: Arc<dyn BusType>, autoprobe: bool) -> Self {
        Self {
            id,
            name: String::from(ops.name()),
            bus_groups: ops.bus_groups(),
            dev_groups: ops.dev_groups(),
            drv_groups: ops.drv_groups(),
            ops,
            devices: KList::with_hooks(Some(bus_dev_get), Some(bus_dev_put)),
            drivers: KList::new(),
            autoprobe: AtomicBool::new(autoprobe),
            notifier: NotifierChain::new(),
            dirs: RwLock::new(None),
            registered: AtomicBool::new(false),
        }
    }

    /// 注册标识
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 总线名
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 总线回调
    pub fn ops(&self) -> &Arc<dyn BusType> {
        &self.ops
    }

    /// 自动 probe 是否开启
    pub fn autoprobe(&self) -> bool {
        self.autoprobe.load(Ordering::Acquire)
    }

    /// 打开或关闭自动 probe
    pub fn set_autoprobe(&self, on: bool) {
        self.autoprobe.store(on, Ordering::Release);
    }

    /// 总线上的设备，按加入顺序
    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.devices.snapshot()
    }

    /// 总线上的驱动，按注册顺序
    pub fn drivers(&self) -> Vec<Arc<Driver>> {
        self.drivers.snapshot()
    }

    /// 按名字查找设备
    pub fn find_device(&self, name: &str) -> Option<Arc<Device>> {
        self.devices.find(|d| d.name() == name)
    }

    /// 按名字查找驱动
    pub fn find_driver(&self, name: &str) -> Option<Arc<Driver>> {
        self.drivers.find(|d| d.name() == name)
    }

    /// 订阅总线事件
    pub fn register_notifier(&self, nb: Arc<dyn BusNotifier>) -> NotifierId {
        self.notifier.register(nb)
    }

    /// 取消订阅，订阅不存在时返回 `false`
    pub fn unregister_notifier(&self, id: NotifierId) -> bool {
        self.notifier.unregister(id)
    }

    pub(crate) fn notify(&self, event: BusEvent, dev: &Arc<Device>) {
        self.notifier.call(event, dev);
    }

    /// 是否已注册
    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    pub(crate) fn set_registered(&self, on: bool) {
        self.registered.store(on, Ordering::Release);
    }

    /// 总线在 sysfs 中的目录
    pub fn kernfs_node(&self) -> Option<Arc<KernfsNode>> {
        self.dirs.read().as_ref().map(|d| d.dir.clone())
    }

    /// 由属性回调收到的实体取回总线
    pub fn from_entity(entity: &Entity) -> Option<Arc<Bus>> {
        entity.downcast_ref::<Weak<Bus>>()?.upgrade()
    }
}

impl core::fmt::Debug for Bus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Bus")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}
