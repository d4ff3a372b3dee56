//! 驱动模型核心
//!
//! [`DriverCore`] 是整个对象图的所有者：它持有 sysfs 树、已注册的总线和类、
//! 所有已发布的设备，以及绑定引擎需要的全局状态（在途 probe 计数、延后队列、
//! 异步执行器）。总线、类和驱动的属性回调只持有它的弱引用。
//!
//! sysfs 顶层布局：
//!
//! ```text
//! /devices/          设备目录树，没有父设备的类设备放在 /devices/virtual/<class>/
//! /bus/<name>/       总线目录
//! /class/<name>/     类目录
//! ```

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use hashbrown::HashMap;
use kernfs::{KernfsError, KernfsNode, KernfsPriv};
use sync::{RwLock, SpinLock, WaitCounter};
use sysfs::{Attribute, Entity, SysFS};

use crate::bus::{Bus, BusDirs, BusType};
use crate::class::{Class, ClassType};
use crate::config::{BUS_DIR, CLASS_DIR, CoreConfig, DEVICES_DIR, VIRTUAL_DIR};
use crate::device::{Device, DeviceFlags, Placement};
use crate::driver::{DeviceDriver, Driver};
use crate::error::DriverError;
use crate::klist::KList;
use crate::notifier::BusEvent;
use crate::uevent::{UeventAction, UeventHandler, device_env};

/// 异步 probe 的执行器
pub trait ProbeExecutor: Send + Sync {
    /// 在另一个执行上下文中运行 `work`
    fn spawn(&self, work: Box<dyn FnOnce() + Send + 'static>);
}

/// 按标识存放、按名字索引的登记表
struct Registry<T> {
    by_id: BTreeMap<u64, Arc<T>>,
    by_name: HashMap<String, u64>,
}

impl<T> Registry<T> {
    fn new() -> Self {
        Self {
            by_id: BTreeMap::new(),
            by_name: HashMap::new(),
        }
    }

    fn get(&self, name: &str) -> Option<Arc<T>> {
        let id = self.by_name.get(name)?;
        self.by_id.get(id).cloned()
    }

    fn insert(&mut self, name: &str, id: u64, item: Arc<T>) -> bool {
        if self.by_name.contains_key(name) {
            return false;
        }
        self.by_name.insert(String::from(name), id);
        self.by_id.insert(id, item);
        true
    }

    fn remove(&mut self, name: &str) -> Option<Arc<T>> {
        let id = self.by_name.remove(name)?;
        self.by_id.remove(&id)
    }

    fn values(&self) -> Vec<Arc<T>> {
        self.by_id.values().cloned().collect()
    }
}

/// 驱动模型核心
pub struct DriverCore {
    this: Weak<DriverCore>,
    config: CoreConfig,
    sysfs: SysFS,
    devices_dir: Arc<KernfsNode>,
    virtual_dir: Arc<KernfsNode>,
    bus_dir: Arc<KernfsNode>,
    class_dir: Arc<KernfsNode>,
    buses: RwLock<Registry<Bus>>,
    classes: RwLock<Registry<Class>>,
    devices: KList<Arc<Device>>,
    next_id: AtomicU64,
    pub(crate) probe_count: WaitCounter,
    pub(crate) deferred: SpinLock<Vec<Arc<Device>>>,
    pub(crate) deferred_pending: AtomicBool,
    pub(crate) deferred_active: AtomicBool,
    executor: RwLock<Option<Arc<dyn ProbeExecutor>>>,
    uevent_handlers: RwLock<Vec<Arc<dyn UeventHandler>>>,
}

/// 把写入属性的内容解析为去掉首尾空白的字符串
fn parse_input(buf: &[u8]) -> Result<&str, KernfsError> {
    let s = core::str::from_utf8(buf)
        .map_err(|_| KernfsError::InvalidArgument)?
        .trim();
    if s.is_empty() {
        return Err(KernfsError::InvalidArgument);
    }
    Ok(s)
}

fn upgrade(core: &Weak<DriverCore>) -> Result<Arc<DriverCore>, KernfsError> {
    core.upgrade().ok_or(KernfsError::NoDevice)
}

/// 只在目标正是 `target` 时移除链接
fn remove_link_to(dir: &Arc<KernfsNode>, name: &str, target: &Arc<KernfsNode>) {
    if let Ok(link) = dir.find_child(name) {
        if link.link_target().is_some_and(|t| Arc::ptr_eq(t, target)) {
            link.remove();
        }
    }
}

impl DriverCore {
    /// 创建核心和 sysfs 顶层目录
    pub fn new(config: CoreConfig) -> Result<Arc<Self>, DriverError> {
        let sysfs = SysFS::new();
        let root = sysfs.root_dir().clone();
        let devices_dir = sysfs::create_dir(&root, DEVICES_DIR, None)?;
        let virtual_dir = sysfs::create_dir(&devices_dir, VIRTUAL_DIR, None)?;
        let bus_dir = sysfs::create_dir(&root, BUS_DIR, None)?;
        let class_dir = sysfs::create_dir(&root, CLASS_DIR, None)?;
        Ok(Arc::new_cyclic(|this| Self {
            this: this.clone(),
            config,
            sysfs,
            devices_dir,
            virtual_dir,
            bus_dir,
            class_dir,
            buses: RwLock::new(Registry::new()),
            classes: RwLock::new(Registry::new()),
            devices: KList::new(),
            next_id: AtomicU64::new(1),
            probe_count: WaitCounter::new(),
            deferred: SpinLock::new(Vec::new()),
            deferred_pending: AtomicBool::new(false),
            deferred_active: AtomicBool::new(false),
            executor: RwLock::new(None),
            uevent_handlers: RwLock::new(Vec::new()),
        }))
    }

    /// 配置
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// sysfs 树
    pub fn sysfs(&self) -> &SysFS {
        &self.sysfs
    }

    pub(crate) fn this(&self) -> Option<Arc<DriverCore>> {
        self.this.upgrade()
    }

    fn alloc_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// 安装或卸下异步 probe 执行器
    pub fn set_probe_executor(&self, executor: Option<Arc<dyn ProbeExecutor>>) {
        *self.executor.write() = executor;
    }

    pub(crate) fn executor(&self) -> Option<Arc<dyn ProbeExecutor>> {
        self.executor.read().clone()
    }

    /// 注册事件接收者
    pub fn register_uevent_handler(&self, handler: Arc<dyn UeventHandler>) {
        self.uevent_handlers.write().push(handler);
    }

    pub(crate) fn emit_uevent_raw(&self, action: UeventAction, devpath: &str, env: &[String]) {
        let handlers: Vec<_> = self.uevent_handlers.read().clone();
        for h in handlers {
            h.uevent(action, devpath, env);
        }
    }

    /// 为设备派发事件，未发布的设备不派发
    pub(crate) fn emit_uevent(&self, action: UeventAction, dev: &Device) {
        let Some(devpath) = dev.path() else {
            return;
        };
        let mut env = Vec::new();
        env.push(format!("ACTION={}", action.as_str()));
        env.push(format!("DEVPATH={}", devpath));
        match dev.placement() {
            Placement::Bus(bus) => env.push(format!("SUBSYSTEM={}", bus.name())),
            Placement::Class(class) => env.push(format!("SUBSYSTEM={}", class.name())),
            Placement::Plain => {}
        }
        env.extend(device_env(dev));
        self.emit_uevent_raw(action, &devpath, &env);
    }

    fn uevent_store(&self, devpath: &str, buf: &[u8]) -> Result<usize, KernfsError> {
        let action = UeventAction::parse(parse_input(buf)?).ok_or(KernfsError::InvalidArgument)?;
        self.emit_uevent_raw(action, devpath, &[]);
        Ok(buf.len())
    }

    // ---------------------------------------------------------------- 总线

    /// 注册总线
    pub fn bus_register(&self, ops: Arc<dyn BusType>) -> Result<Arc<Bus>, DriverError> {
        let bus = Arc::new(Bus::new(self.alloc_id(), ops, self.config.default_autoprobe));
        if !self
            .buses
            .write()
            .insert(bus.name(), bus.id(), bus.clone())
        {
            log::warn!("bus: '{}': already registered", bus.name());
            return Err(DriverError::AlreadyExists);
        }

        match self.bus_publish(&bus) {
            Ok(dirs) => {
                *bus.dirs.write() = Some(dirs);
                bus.set_registered(true);
                log::debug!("bus: '{}': registered", bus.name());
                Ok(bus)
            }
            Err(e) => {
                self.buses.write().remove(bus.name());
                Err(e)
            }
        }
    }

    fn bus_publish(&self, bus: &Arc<Bus>) -> Result<BusDirs, DriverError> {
        let priv_data: KernfsPriv = Arc::new(Arc::downgrade(bus));
        let dir = sysfs::create_dir(&self.bus_dir, bus.name(), Some(priv_data.clone()))?;
        let setup = || -> Result<BusDirs, KernfsError> {
            let devices = sysfs::create_dir(&dir, "devices", Some(priv_data.clone()))?;
            let drivers = sysfs::create_dir(&dir, "drivers", Some(priv_data.clone()))?;
            for attr in self.bus_attrs() {
                sysfs::create_file(&dir, &attr)?;
            }
            sysfs::create_groups(&dir, &bus.bus_groups)?;
            Ok(BusDirs {
                dir: dir.clone(),
                devices,
                drivers,
            })
        };
        setup().map_err(|e| {
            dir.remove();
            DriverError::from(e)
        })
    }

    fn bus_attrs(&self) -> [Attribute; 3] {
        let core = self.this.clone();
        let drivers_probe = Attribute::wo("drivers_probe", move |entity: &Entity, buf: &[u8]| {
            let core = upgrade(&core)?;
            let bus = Bus::from_entity(entity).ok_or(KernfsError::NoDevice)?;
            let dev = bus
                .find_device(parse_input(buf)?)
                .ok_or(KernfsError::NoDevice)?;
            match core.device_attach(&dev) {
                crate::dd::AttachOutcome::NotRegistered => Err(KernfsError::NoDevice),
                _ => Ok(buf.len()),
            }
        });

        let autoprobe = Attribute::rw(
            "drivers_autoprobe",
            |entity: &Entity, out: &mut String| {
                let bus = Bus::from_entity(entity).ok_or(KernfsError::NoDevice)?;
                out.push_str(if bus.autoprobe() { "1\n" } else { "0\n" });
                Ok(())
            },
            |entity: &Entity, buf: &[u8]| {
                let bus = Bus::from_entity(entity).ok_or(KernfsError::NoDevice)?;
                bus.set_autoprobe(buf.first() != Some(&b'0'));
                Ok(buf.len())
            },
        );

        let core = self.this.clone();
        let uevent = Attribute::wo("uevent", move |entity: &Entity, buf: &[u8]| {
            let core = upgrade(&core)?;
            let bus = Bus::from_entity(entity).ok_or(KernfsError::NoDevice)?;
            let path = bus.kernfs_node().map(|n| n.path()).unwrap_or_default();
            core.uevent_store(&path, buf)
        });

        [drivers_probe, autoprobe, uevent]
    }

    /// 注销总线
    ///
    /// 总线上还有设备或驱动时返回 [`DriverError::Busy`]。
    pub fn bus_unregister(&self, bus: &Arc<Bus>) -> Result<(), DriverError> {
        if !bus.is_registered() {
            return Err(DriverError::NotRegistered);
        }
        if !bus.devices.is_empty() || !bus.drivers.is_empty() {
            log::warn!("bus: '{}': still has devices or drivers", bus.name());
            return Err(DriverError::Busy);
        }
        bus.set_registered(false);
        self.buses.write().remove(bus.name());
        if let Some(dirs) = bus.dirs.write().take() {
            dirs.dir.remove();
        }
        log::debug!("bus: '{}': unregistered", bus.name());
        Ok(())
    }

    /// 按名字查找总线
    pub fn find_bus(&self, name: &str) -> Option<Arc<Bus>> {
        self.buses.read().get(name)
    }

    /// 所有已注册的总线，按注册顺序
    pub fn buses(&self) -> Vec<Arc<Bus>> {
        self.buses.read().values()
    }

    // ---------------------------------------------------------------- 类

    /// 注册类
    pub fn class_register(&self, ops: Arc<dyn ClassType>) -> Result<Arc<Class>, DriverError> {
        let class = Arc::new(Class::new(self.alloc_id(), ops));
        if !self
            .classes
            .write()
            .insert(class.name(), class.id(), class.clone())
        {
            log::warn!("class: '{}': already registered", class.name());
            return Err(DriverError::AlreadyExists);
        }

        let priv_data: KernfsPriv = Arc::new(Arc::downgrade(&class));
        let publish = || -> Result<Arc<KernfsNode>, DriverError> {
            let dir = sysfs::create_dir(&self.class_dir, class.name(), Some(priv_data))?;
            if let Err(e) = sysfs::create_groups(&dir, &class.class_groups) {
                dir.remove();
                return Err(e.into());
            }
            Ok(dir)
        };
        match publish() {
            Ok(dir) => {
                *class.node.write() = Some(dir);
                class.set_registered(true);
                log::debug!("class: '{}': registered", class.name());
                Ok(class)
            }
            Err(e) => {
                self.classes.write().remove(class.name());
                Err(e)
            }
        }
    }

    /// 注销类
    ///
    /// 类中还有设备时返回 [`DriverError::Busy`]。
    pub fn class_unregister(&self, class: &Arc<Class>) -> Result<(), DriverError> {
        if !class.is_registered() {
            return Err(DriverError::NotRegistered);
        }
        if !class.devices().is_empty() {
            log::warn!("class: '{}': still has devices", class.name());
            return Err(DriverError::Busy);
        }
        class.set_registered(false);
        self.classes.write().remove(class.name());
        if let Some(dir) = class.node.write().take() {
            dir.remove();
        }
        log::debug!("class: '{}': unregistered", class.name());
        Ok(())
    }

    /// 按名字查找类
    pub fn find_class(&self, name: &str) -> Option<Arc<Class>> {
        self.classes.read().get(name)
    }

    // ---------------------------------------------------------------- 驱动

    /// 把驱动注册到总线
    ///
    /// 总线开启了自动 probe 时，注册后立即尝试绑定总线上的设备。
    pub fn driver_register(
        &self,
        bus: &Arc<Bus>,
        ops: Arc<dyn DeviceDriver>,
    ) -> Result<Arc<Driver>, DriverError> {
        if !bus.is_registered() {
            log::error!(
                "Driver '{}' was unable to register with bus '{}' because the bus was not initialized",
                ops.name(),
                bus.name()
            );
            return Err(DriverError::NotRegistered);
        }
        if bus.find_driver(ops.name()).is_some() {
            log::error!("Error: Driver '{}' is already registered, aborting...", ops.name());
            return Err(DriverError::AlreadyExists);
        }

        let drv = Arc::new(Driver::new(self.alloc_id(), bus.clone(), ops));
        let drivers_dir = bus
            .dirs
            .read()
            .as_ref()
            .map(|d| d.drivers.clone())
            .ok_or(DriverError::NotRegistered)?;
        let priv_data: KernfsPriv = Arc::new(Arc::downgrade(&drv));
        let dir = sysfs::create_dir(&drivers_dir, drv.name(), Some(priv_data))?;

        let setup = || -> Result<(), KernfsError> {
            for attr in self.driver_attrs(drv.ops().suppress_bind_attrs()) {
                sysfs::create_file(&dir, &attr)?;
            }
            sysfs::create_groups(&dir, &bus.drv_groups)?;
            sysfs::create_groups(&dir, &drv.groups)?;
            Ok(())
        };
        if let Err(e) = setup() {
            dir.remove();
            return Err(e.into());
        }
        if !bus.drivers.add_tail(drv.id(), drv.clone()) {
            dir.remove();
            return Err(DriverError::AlreadyExists);
        }
        *drv.node.write() = Some(dir);
        drv.set_registered(true);
        log::debug!("bus: '{}': add driver {}", bus.name(), drv.name());

        if bus.autoprobe() {
            self.driver_attach(&drv);
        }
        Ok(drv)
    }

    fn driver_attrs(&self, suppress_bind: bool) -> Vec<Attribute> {
        let mut attrs = Vec::new();

        let core = self.this.clone();
        attrs.push(Attribute::wo("uevent", move |entity: &Entity, buf: &[u8]| {
            let core = upgrade(&core)?;
            let drv = Driver::from_entity(entity).ok_or(KernfsError::NoDevice)?;
            let path = drv.kernfs_node().map(|n| n.path()).unwrap_or_default();
            core.uevent_store(&path, buf)
        }));

        if suppress_bind {
            return attrs;
        }

        let core = self.this.clone();
        attrs.push(Attribute::wo("bind", move |entity: &Entity, buf: &[u8]| {
            let core = upgrade(&core)?;
            let drv = Driver::from_entity(entity).ok_or(KernfsError::NoDevice)?;
            let dev = drv
                .bus()
                .find_device(parse_input(buf)?)
                .ok_or(KernfsError::NoDevice)?;
            core.bind_store(&drv, &dev)?;
            Ok(buf.len())
        }));

        let core = self.this.clone();
        attrs.push(Attribute::wo("unbind", move |entity: &Entity, buf: &[u8]| {
            let core = upgrade(&core)?;
            let drv = Driver::from_entity(entity).ok_or(KernfsError::NoDevice)?;
            let dev = drv
                .bus()
                .find_device(parse_input(buf)?)
                .ok_or(KernfsError::NoDevice)?;
            match dev.driver() {
                Some(bound) if Arc::ptr_eq(&bound, &drv) => {
                    core.device_release_driver(&dev);
                    Ok(buf.len())
                }
                _ => Err(KernfsError::NoDevice),
            }
        }));

        attrs
    }

    /// 注销驱动：先解绑它的所有设备，再移除目录
    pub fn driver_unregister(&self, drv: &Arc<Driver>) {
        if !drv.is_registered() {
            log::warn!("driver: '{}': unregistering unregistered driver", drv.name());
            return;
        }
        drv.set_registered(false);
        self.driver_detach(drv);
        drv.bus().drivers.remove(drv.id());
        if let Some(dir) = drv.node.write().take() {
            dir.remove();
        }
        log::debug!("bus: '{}': remove driver {}", drv.bus().name(), drv.name());
    }

    // ---------------------------------------------------------------- 设备

    /// 发布设备
    ///
    /// 创建设备目录、属性和链接，把设备加入父设备、总线或类，派发 `add` 事件，
    /// 总线开启了自动 probe 时尝试绑定驱动。任何一步失败都会撤销之前的步骤。
    pub fn device_add(&self, dev: &Arc<Device>) -> Result<(), DriverError> {
        if dev.is_dead() {
            return Err(DriverError::InvalidArgument);
        }
        if dev.test_and_set_flag(DeviceFlags::REGISTERED) {
            return Err(DriverError::AlreadyExists);
        }
        if let Err(e) = self.device_publish(dev) {
            dev.clear_flag(DeviceFlags::REGISTERED);
            log::debug!("device: '{}': device_add failed: {:?}", dev.name(), e);
            return Err(e);
        }

        if let Some(parent) = dev.parent() {
            parent.children.add_tail(dev.id(), dev.clone());
        }
        self.devices.add_tail(dev.id(), dev.clone());
        log::debug!("device: '{}': device_add", dev.name());

        match dev.placement() {
            Placement::Bus(bus) => {
                bus.devices.add_tail(dev.id(), dev.clone());
                bus.notify(BusEvent::AddDevice, dev);
            }
            Placement::Class(class) => class.add_device(dev),
            Placement::Plain => {}
        }
        self.emit_uevent(UeventAction::Add, dev);

        if dev.bus().is_some_and(|b| b.autoprobe()) {
            self.device_initial_probe(dev);
        }
        Ok(())
    }

    fn device_publish(&self, dev: &Arc<Device>) -> Result<(), DriverError> {
        let parent_dir = match dev.parent() {
            Some(p) if p.is_registered() => p.kernfs_node().ok_or(DriverError::NotRegistered)?,
            Some(_) => return Err(DriverError::NotRegistered),
            None => self.devices_dir.clone(),
        };
        match dev.placement() {
            Placement::Bus(bus) if !bus.is_registered() => return Err(DriverError::NotRegistered),
            Placement::Class(class) if !class.is_registered() => {
                return Err(DriverError::NotRegistered);
            }
            _ => {}
        }

        dev.set_id(self.alloc_id());
        let priv_data: KernfsPriv = Arc::new(Arc::downgrade(dev));
        let dir = match dev.placement() {
            Placement::Class(class) => {
                let base = if dev.parent().is_some() {
                    parent_dir
                } else {
                    self.virtual_dir.clone()
                };
                let (dir, glue) = class.with_glue_dir(&base, |glue| {
                    Ok(sysfs::create_dir(glue, dev.name(), Some(priv_data))?)
                })?;
                *dev.glue.write() = Some(glue);
                dir
            }
            _ => sysfs::create_dir(&parent_dir, dev.name(), Some(priv_data))?,
        };
        *dev.node.write() = Some(dir.clone());

        if let Err(e) = self.device_add_attrs(dev, &dir) {
            self.device_unpublish(dev);
            return Err(e);
        }
        Ok(())
    }

    fn device_add_attrs(&self, dev: &Arc<Device>, dir: &Arc<KernfsNode>) -> Result<(), DriverError> {
        let core = self.this.clone();
        let uevent = Attribute::rw(
            "uevent",
            |entity: &Entity, out: &mut String| {
                let dev = Device::from_entity(entity).ok_or(KernfsError::NoDevice)?;
                for line in device_env(&dev) {
                    out.push_str(&line);
                    out.push('\n');
                }
                Ok(())
            },
            move |entity: &Entity, buf: &[u8]| {
                let core = upgrade(&core)?;
                let dev = Device::from_entity(entity).ok_or(KernfsError::NoDevice)?;
                let action =
                    UeventAction::parse(parse_input(buf)?).ok_or(KernfsError::InvalidArgument)?;
                core.emit_uevent(action, &dev);
                Ok(buf.len())
            },
        );
        sysfs::create_file(dir, &uevent)?;

        match dev.placement() {
            Placement::Bus(bus) => {
                sysfs::create_groups(dir, &bus.dev_groups)?;
                sysfs::create_groups(dir, &dev.groups)?;
                let (bus_dir, devices_dir) = bus
                    .dirs
                    .read()
                    .as_ref()
                    .map(|d| (d.dir.clone(), d.devices.clone()))
                    .ok_or(DriverError::NotRegistered)?;
                sysfs::create_link(dir, &bus_dir, "subsystem")?;
                sysfs::create_link(&devices_dir, dir, dev.name())?;
            }
            Placement::Class(class) => {
                sysfs::create_groups(dir, &class.dev_groups)?;
                sysfs::create_groups(dir, &dev.groups)?;
                let class_dir = class.kernfs_node().ok_or(DriverError::NotRegistered)?;
                sysfs::create_link(dir, &class_dir, "subsystem")?;
                if let Some(parent_dir) = dev.parent().and_then(|p| p.kernfs_node()) {
                    sysfs::create_link(dir, &parent_dir, "device")?;
                }
                sysfs::create_link(&class_dir, dir, dev.name())?;
            }
            Placement::Plain => {
                sysfs::create_groups(dir, &dev.groups)?;
            }
        }
        Ok(())
    }

    /// 移除设备在 sysfs 中的一切：目录外的链接、目录本身和空的胶水目录
    fn device_unpublish(&self, dev: &Device) {
        let Some(dir) = dev.node.write().take() else {
            return;
        };
        match dev.placement() {
            Placement::Bus(bus) => {
                let devices_dir = bus.dirs.read().as_ref().map(|d| d.devices.clone());
                if let Some(devices_dir) = devices_dir {
                    remove_link_to(&devices_dir, dev.name(), &dir);
                }
            }
            Placement::Class(class) => {
                if let Some(class_dir) = class.kernfs_node() {
                    remove_link_to(&class_dir, dev.name(), &dir);
                }
            }
            Placement::Plain => {}
        }
        dir.remove();
        if let (Placement::Class(class), Some(glue)) = (dev.placement(), dev.glue.write().take()) {
            class.put_glue_dir(&glue);
        }
    }

    /// 注销设备
    ///
    /// 先注销已发布的子设备（逆序），再解绑驱动、移除 sysfs 条目、撤销剩余的受管资源，
    /// 最后把设备从各张表中摘下。对同一设备的并发或重复调用只有第一次生效。
    pub fn device_del(&self, dev: &Arc<Device>) {
        if !dev.test_and_clear_flag(DeviceFlags::REGISTERED) {
            return;
        }
        dev.set_flag(DeviceFlags::DEAD);

        for child in dev.children.snapshot().into_iter().rev() {
            self.device_del(&child);
        }

        match dev.placement() {
            Placement::Bus(bus) => bus.notify(BusEvent::DelDevice, dev),
            Placement::Class(class) => class.remove_device(dev),
            Placement::Plain => {}
        }
        self.device_release_driver(dev);
        self.deferred_remove(dev);
        if let Some(bus) = dev.bus() {
            bus.devices.remove(dev.id());
        }

        self.emit_uevent(UeventAction::Remove, dev);
        self.device_unpublish(dev);
        dev.devres.seal();
        dev.devres_release_all();

        if let Some(parent) = dev.parent() {
            parent.children.remove(dev.id());
        }
        self.devices.remove(dev.id());
        if let Some(bus) = dev.bus() {
            bus.notify(BusEvent::RemovedDevice, dev);
        }
        log::debug!("device: '{}': device_del", dev.name());
    }

    /// 按名字查找已发布的设备
    pub fn find_device(&self, name: &str) -> Option<Arc<Device>> {
        self.devices.find(|d| d.name() == name)
    }

    /// 所有已发布的设备，按发布顺序
    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.devices.snapshot()
    }

    pub(crate) fn device_list(&self) -> &KList<Arc<Device>> {
        &self.devices
    }
}
