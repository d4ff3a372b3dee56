//! 设备
//!
//! 设备分两步进入系统：先用 [`DeviceBuilder`] 构造，再由
//! [`DriverCore::device_add`](crate::DriverCore::device_add) 发布到 sysfs 和所属的总线或类。
//! 构造后、发布前的设备只是一个普通对象，持有者随时可以丢弃它。
//!
//! 设备目录的 `priv` 是设备的弱引用，属性回调用 [`Device::from_entity`] 取回设备。

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::any::Any;
use core::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering};

use bitflags::bitflags;
use kernfs::KernfsNode;
use sync::{RwLock, SpinLock, SpinLockGuard};
use sysfs::{AttributeGroup, Entity};

use crate::bus::Bus;
use crate::class::Class;
use crate::devres::Devres;
use crate::driver::Driver;
use crate::error::DriverError;
use crate::klist::KList;

bitflags! {
    /// 设备的内部状态位
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct DeviceFlags: u32 {
        /// 已发布
        const REGISTERED = 1 << 0;
        /// 已注销，不会再次发布
        const DEAD = 1 << 1;
        /// 在总线的设备表中
        const ON_BUS = 1 << 2;
        /// 在类的设备表中
        const ON_CLASS = 1 << 3;
        /// 在延后 probe 队列中
        const DEFERRED = 1 << 4;
    }
}

/// 绑定状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BindState {
    /// 未绑定
    Unbound = 0,
    /// 正在与驱动匹配
    Matching = 1,
    /// 正在 probe
    Probing = 2,
    /// 已绑定
    Bound = 3,
    /// 最近一次 probe 被拒绝或失败
    Rejected = 4,
    /// 正在解绑
    Detaching = 5,
}

impl BindState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => BindState::Matching,
            2 => BindState::Probing,
            3 => BindState::Bound,
            4 => BindState::Rejected,
            5 => BindState::Detaching,
            _ => BindState::Unbound,
        }
    }
}

/// 设备的放置方式，决定父目录和需要建立的链接
#[derive(Clone)]
pub enum Placement {
    /// 挂在总线上
    Bus(Arc<Bus>),
    /// 属于某个类
    Class(Arc<Class>),
    /// 既不属于总线也不属于类
    Plain,
}

/// 设备释放钩子
pub type ReleaseFn = Box<dyn Fn(&Device) + Send + Sync>;

/// 设备
pub struct Device {
    name: String,
    id: AtomicU64,
    parent: Option<Arc<Device>>,
    placement: Placement,
    pub(crate) driver: RwLock<Option<Arc<Driver>>>,
    driver_data: RwLock<Option<Arc<dyn Any + Send + Sync>>>,
    pub(crate) devres: Devres,
    pub(crate) children: KList<Arc<Device>>,
    lock: SpinLock<()>,
    state: AtomicU8,
    flags: AtomicU32,
    pub(crate) groups: Vec<AttributeGroup>,
    release: Option<ReleaseFn>,
    pub(crate) node: RwLock<Option<Arc<KernfsNode>>>,
    /// 类设备所在的胶水目录
    pub(crate) glue: RwLock<Option<Arc<KernfsNode>>>,
}

/// 设备构造器
pub struct DeviceBuilder {
    name: String,
    parent: Option<Arc<Device>>,
    bus: Option<Arc<Bus>>,
    class: Option<Arc<Class>>,
    groups: Vec<AttributeGroup>,
    release: Option<ReleaseFn>,
}

impl DeviceBuilder {
    /// 父设备
    pub fn parent(mut self, parent: &Arc<Device>) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    /// 所在总线
    pub fn bus(mut self, bus: &Arc<Bus>) -> Self {
        self.bus = Some(bus.clone());
        self
    }

    /// 所属类
    pub fn class(mut self, class: &Arc<Class>) -> Self {
        self.class = Some(class.clone());
        self
    }

    /// 设备自己的属性组
    pub fn groups(mut self, groups: Vec<AttributeGroup>) -> Self {
        self.groups = groups;
        self
    }

    /// 最后一个引用消失时调用的钩子
    pub fn release(mut self, f: impl Fn(&Device) + Send + Sync + 'static) -> Self {
        self.release = Some(Box::new(f));
        self
    }

    /// 构造设备
    ///
    /// 名字为空或含 `/`、同时指定了总线和类时返回 [`DriverError::InvalidArgument`]。
    pub fn build(self) -> Result<Arc<Device>, DriverError> {
        if self.name.is_empty() || self.name.contains('/') {
            return Err(DriverError::InvalidArgument);
        }
        let placement = match (self.bus, self.class) {
            (Some(_), Some(_)) => return Err(DriverError::InvalidArgument),
            (Some(bus), None) => Placement::Bus(bus),
            (None, Some(class)) => Placement::Class(class),
            (None, None) => Placement::Plain,
        };
        Ok(Arc::new(Device {
            name: self.name,
            id: AtomicU64::new(0),
            parent: self.parent,
            placement,
            driver: RwLock::new(None),
            driver_data: RwLock::new(None),
            devres: Devres::new(),
            children: KList::new(),
            lock: SpinLock::new(()),
            state: AtomicU8::new(BindState::Unbound as u8),
            flags: AtomicU32::new(0),
            groups: self.groups,
            release: self.release,
            node: RwLock::new(None),
            glue: RwLock::new(None),
        }))
    }
}

/// 绑定路径上持有的锁：需要时先锁父设备，再锁设备本身
pub(crate) struct BindGuard<'a> {
    _dev: SpinLockGuard<'a, ()>,
    _parent: Option<SpinLockGuard<'a, ()>>,
}

impl Device {
    /// 开始构造一个设备
    pub fn builder(name: &str) -> DeviceBuilder {
        DeviceBuilder {
            name: String::from(name),
            parent: None,
            bus: None,
            class: None,
            groups: Vec::new(),
            release: None,
        }
    }

    /// 设备名
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 发布时分配的标识，未发布时为 0
    pub fn id(&self) -> u64 {
        self.id.load(Ordering::Acquire)
    }

    pub(crate) fn set_id(&self, id: u64) {
        self.id.store(id, Ordering::Release);
    }

    /// 父设备
    pub fn parent(&self) -> Option<&Arc<Device>> {
        self.parent.as_ref()
    }

    /// 放置方式
    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    /// 所在总线
    pub fn bus(&self) -> Option<&Arc<Bus>> {
        match &self.placement {
            Placement::Bus(bus) => Some(bus),
            _ => None,
        }
    }

    /// 所属类
    pub fn class(&self) -> Option<&Arc<Class>> {
        match &self.placement {
            Placement::Class(class) => Some(class),
            _ => None,
        }
    }

    /// 当前绑定的驱动
    pub fn driver(&self) -> Option<Arc<Driver>> {
        self.driver.read().clone()
    }

    /// 是否已绑定驱动
    pub fn is_bound(&self) -> bool {
        self.driver.read().is_some()
    }

    /// 驱动私有数据
    pub fn driver_data<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.driver_data.read().clone()?.downcast::<T>().ok()
    }

    /// 设置驱动私有数据，解绑时自动清除
    pub fn set_driver_data<T: Any + Send + Sync>(&self, data: Arc<T>) {
        *self.driver_data.write() = Some(data);
    }

    pub(crate) fn clear_driver_data(&self) {
        *self.driver_data.write() = None;
    }

    /// 绑定状态
    pub fn bind_state(&self) -> BindState {
        BindState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_bind_state(&self, state: BindState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn has_flag(&self, flag: DeviceFlags) -> bool {
        DeviceFlags::from_bits_truncate(self.flags.load(Ordering::Acquire)).contains(flag)
    }

    pub(crate) fn set_flag(&self, flag: DeviceFlags) {
        self.flags.fetch_or(flag.bits(), Ordering::AcqRel);
    }

    pub(crate) fn clear_flag(&self, flag: DeviceFlags) {
        self.flags.fetch_and(!flag.bits(), Ordering::AcqRel);
    }

    /// 原子地设置标志位，返回之前是否已经设置
    pub(crate) fn test_and_set_flag(&self, flag: DeviceFlags) -> bool {
        self.flags.fetch_or(flag.bits(), Ordering::AcqRel) & flag.bits() != 0
    }

    /// 原子地清除标志位，返回之前是否设置
    pub(crate) fn test_and_clear_flag(&self, flag: DeviceFlags) -> bool {
        self.flags.fetch_and(!flag.bits(), Ordering::AcqRel) & flag.bits() != 0
    }

    /// 是否已发布
    pub fn is_registered(&self) -> bool {
        self.has_flag(DeviceFlags::REGISTERED)
    }

    /// 是否已注销
    pub fn is_dead(&self) -> bool {
        self.has_flag(DeviceFlags::DEAD)
    }

    /// 是否在总线的设备表中
    pub fn is_on_bus(&self) -> bool {
        self.has_flag(DeviceFlags::ON_BUS)
    }

    /// 是否在类的设备表中
    pub fn is_on_class(&self) -> bool {
        self.has_flag(DeviceFlags::ON_CLASS)
    }

    /// 是否在延后 probe 队列中
    pub fn is_deferred(&self) -> bool {
        self.has_flag(DeviceFlags::DEFERRED)
    }

    /// 获取设备锁
    ///
    /// 绑定、解绑和 probe 回调都在设备锁下执行，回调内不能再次获取。
    pub fn lock(&self) -> SpinLockGuard<'_, ()> {
        self.lock.lock()
    }

    pub(crate) fn lock_for_bind(&self) -> BindGuard<'_> {
        let need_parent = self
            .bus()
            .map(|b| b.ops().need_parent_lock())
            .unwrap_or(false);
        let parent = match (&self.parent, need_parent) {
            (Some(p), true) => Some(p.lock()),
            _ => None,
        };
        BindGuard {
            _dev: self.lock.lock(),
            _parent: parent,
        }
    }

    /// 已发布的子设备，按发布顺序
    pub fn children(&self) -> Vec<Arc<Device>> {
        self.children.snapshot()
    }

    /// 设备在 sysfs 中的目录
    pub fn kernfs_node(&self) -> Option<Arc<KernfsNode>> {
        self.node.read().clone()
    }

    /// 设备目录在 sysfs 中的路径，未发布时为 `None`
    pub fn path(&self) -> Option<String> {
        self.node.read().as_ref().map(|n| n.path())
    }

    /// 由属性回调收到的实体取回设备
    pub fn from_entity(entity: &Entity) -> Option<Arc<Device>> {
        entity.downcast_ref::<Weak<Device>>()?.upgrade()
    }
}

impl core::fmt::Debug for Device {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("id", &self.id())
            .field("state", &self.bind_state())
            .finish()
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        log::debug!("device: '{}': release", self.name);
        if let Some(release) = &self.release {
            release(self);
        } else if let Placement::Class(class) = &self.placement {
            class.ops().dev_release(self);
        }
    }
}
