//! 设备类
//!
//! 类按功能而不是按连接方式对设备分组。类设备的目录放在父设备目录下以类名命名的
//! 胶水目录中，没有父设备时放在 `/devices/virtual/<class>/` 下；`/class/<name>/`
//! 中只放指向这些目录的链接。
//!
//! 类接口在类的每个设备加入和离开时收到回调。接口表和设备表的变动都在类锁下进行，
//! 接口注册时会对已有设备补发 `add_dev`。

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use kernfs::{FileMode, KernfsNode};
use sync::{RwLock, SpinLock};
use sysfs::{AttributeGroup, Entity};

use crate::device::{Device, DeviceFlags};
use crate::error::DriverError;
use crate::klist::KList;

/// 类回调
pub trait ClassType: Send + Sync {
    /// 类名，全局唯一
    fn name(&self) -> &str;

    /// 类目录中的属性组
    fn class_groups(&self) -> Vec<AttributeGroup> {
        Vec::new()
    }

    /// 类的每个设备目录中的属性组
    fn dev_groups(&self) -> Vec<AttributeGroup> {
        Vec::new()
    }

    /// 为设备追加事件环境变量
    fn dev_uevent(&self, _dev: &Device, _env: &mut Vec<String>) -> Result<(), DriverError> {
        Ok(())
    }

    /// 设备没有自己的释放钩子时，在最后一个引用消失时调用
    fn dev_release(&self, _dev: &Device) {}
}

/// 类接口
pub trait ClassInterface: Send + Sync {
    /// 类中加入了设备
    fn add_dev(&self, _dev: &Arc<Device>) -> Result<(), DriverError> {
        Ok(())
    }

    /// 设备即将离开类
    fn remove_dev(&self, _dev: &Arc<Device>) {}
}

/// 类接口的注册标识
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceId(u64);

fn class_dev_get(dev: &Arc<Device>) {
    dev.set_flag(DeviceFlags::ON_CLASS);
}

fn class_dev_put(dev: &Arc<Device>) {
    dev.clear_flag(DeviceFlags::ON_CLASS);
}

/// 已注册的类
pub struct Class {
    id: u64,
    name: String,
    ops: Arc<dyn ClassType>,
    devices: KList<Arc<Device>>,
    /// 类锁，保护接口表
    interfaces: SpinLock<Vec<(InterfaceId, Arc<dyn ClassInterface>)>>,
    next_iface: AtomicU64,
    pub(crate) node: RwLock<Option<Arc<KernfsNode>>>,
    /// 父目录 id -> 胶水目录
    glue_dirs: SpinLock<BTreeMap<u64, Arc<KernfsNode>>>,
    pub(crate) class_groups: Vec<AttributeGroup>,
    pub(crate) dev_groups: Vec<AttributeGroup>,
    registered: AtomicBool,
}

impl Class {
    pub(crate) fn new(id: u64, ops: Arc<dyn ClassType>) -> Self {
        Self {
            id,
            name: String::from(ops.name()),
            class_groups: ops.class_groups(),
            dev_groups: ops.dev_groups(),
            ops,
            devices: KList::with_hooks(Some(class_dev_get), Some(class_dev_put)),
            interfaces: SpinLock::new(Vec::new()),
            next_iface: AtomicU64::new(1),
            node: RwLock::new(None),
            glue_dirs: SpinLock::new(BTreeMap::new()),
            registered: AtomicBool::new(false),
        }
    }

    /// 注册标识
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 类名
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 类回调
    pub fn ops(&self) -> &Arc<dyn ClassType> {
        &self.ops
    }

    /// 类中的设备，按加入顺序
    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.devices.snapshot()
    }

    /// 按名字查找设备
    pub fn find_device(&self, name: &str) -> Option<Arc<Device>> {
        self.devices.find(|d| d.name() == name)
    }

    /// 是否已注册
    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    pub(crate) fn set_registered(&self, on: bool) {
        self.registered.store(on, Ordering::Release);
    }

    /// 类在 sysfs 中的目录
    pub fn kernfs_node(&self) -> Option<Arc<KernfsNode>> {
        self.node.read().clone()
    }

    /// 由属性回调收到的实体取回类
    pub fn from_entity(entity: &Entity) -> Option<Arc<Class>> {
        entity.downcast_ref::<Weak<Class>>()?.upgrade()
    }

    /// 注册接口，并对类中已有的设备补发 `add_dev`
    pub fn interface_register(&self, iface: Arc<dyn ClassInterface>) -> InterfaceId {
        let id = InterfaceId(self.next_iface.fetch_add(1, Ordering::Relaxed));
        let mut ifaces = self.interfaces.lock();
        ifaces.push((id, iface.clone()));
        for dev in self.devices.iter() {
            if let Err(e) = iface.add_dev(&dev) {
                log::warn!("class {}: interface add_dev({}) failed: {:?}", self.name, dev.name(), e);
            }
        }
        id
    }

    /// 注销接口，并对类中的设备逐个调用 `remove_dev`
    pub fn interface_unregister(&self, id: InterfaceId) -> Result<(), DriverError> {
        let mut ifaces = self.interfaces.lock();
        let pos = ifaces
            .iter()
            .position(|(iid, _)| *iid == id)
            .ok_or(DriverError::NotFound)?;
        let (_, iface) = ifaces.remove(pos);
        for dev in self.devices.iter() {
            iface.remove_dev(&dev);
        }
        Ok(())
    }

    /// 把设备加入类并通知所有接口
    pub(crate) fn add_device(&self, dev: &Arc<Device>) {
        let ifaces = self.interfaces.lock();
        self.devices.add_tail(dev.id(), dev.clone());
        for (_, iface) in ifaces.iter() {
            if let Err(e) = iface.add_dev(dev) {
                log::warn!("class {}: interface add_dev({}) failed: {:?}", self.name, dev.name(), e);
            }
        }
    }

    /// 通知所有接口并把设备移出类
    pub(crate) fn remove_device(&self, dev: &Arc<Device>) {
        let ifaces = self.interfaces.lock();
        for (_, iface) in ifaces.iter() {
            iface.remove_dev(dev);
        }
        self.devices.remove(dev.id());
    }

    /// 在 `parent` 下的胶水目录中执行 `f`，胶水目录不存在时先创建
    ///
    /// 整个过程持有胶水表锁，与 [`Class::put_glue_dir`] 互斥。
    pub(crate) fn with_glue_dir<T>(
        &self,
        parent: &Arc<KernfsNode>,
        f: impl FnOnce(&Arc<KernfsNode>) -> Result<T, DriverError>,
    ) -> Result<(T, Arc<KernfsNode>), DriverError> {
        let mut glue = self.glue_dirs.lock();
        let dir = match glue.get(&parent.id()) {
            Some(dir) if !dir.is_removed() => dir.clone(),
            _ => {
                let dir = parent.create_dir(&self.name, FileMode::perm(sysfs::DIR_MODE), None)?;
                glue.insert(parent.id(), dir.clone());
                dir
            }
        };
        match f(&dir) {
            Ok(v) => Ok((v, dir)),
            Err(e) => {
                if dir.list().map(|l| l.is_empty()).unwrap_or(false) {
                    glue.remove(&parent.id());
                    dir.remove();
                }
                Err(e)
            }
        }
    }

    /// 胶水目录为空时移除它
    pub(crate) fn put_glue_dir(&self, dir: &Arc<KernfsNode>) {
        let mut glue = self.glue_dirs.lock();
        if !dir.list().map(|l| l.is_empty()).unwrap_or(true) {
            return;
        }
        glue.retain(|_, d| d.id() != dir.id());
        dir.remove();
    }
}

impl core::fmt::Debug for Class {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Class")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}
