use std::string::String;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::vec;
use std::vec::Vec;

use alloc::sync::Arc;
use sysfs::{Attribute, AttributeGroup, KernfsError};

use super::{new_core, register_bus};
use crate::{Class, ClassInterface, ClassType, Device, DriverError};

/// 带一个 `dev_groups` 属性的类，记录释放的设备
struct TestClass {
    name: &'static str,
    released: Mutex<Vec<String>>,
}

impl TestClass {
    fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            released: Mutex::new(Vec::new()),
        })
    }
}

impl ClassType for TestClass {
    fn name(&self) -> &str {
        self.name
    }

    fn dev_groups(&self) -> Vec<AttributeGroup> {
        vec![AttributeGroup::new(vec![Attribute::ro(
            "dev_name",
            |entity, out: &mut String| {
                let dev = Device::from_entity(entity).ok_or(KernfsError::NoDevice)?;
                out.push_str(dev.name());
                out.push('\n');
                Ok(())
            },
        )])]
    }

    fn dev_uevent(&self, dev: &Device, env: &mut Vec<String>) -> Result<(), DriverError> {
        env.push(std::format!("DEVNAME={}", dev.name()));
        Ok(())
    }

    fn dev_release(&self, dev: &Device) {
        self.released
            .lock()
            .unwrap()
            .push(String::from(dev.name()));
    }
}

#[derive(Default)]
struct Watcher {
    seen: Mutex<Vec<String>>,
}

impl ClassInterface for Watcher {
    fn add_dev(&self, dev: &Arc<Device>) -> Result<(), DriverError> {
        self.seen
            .lock()
            .unwrap()
            .push(std::format!("+{}", dev.name()));
        Ok(())
    }

    fn remove_dev(&self, dev: &Arc<Device>) {
        self.seen
            .lock()
            .unwrap()
            .push(std::format!("-{}", dev.name()));
    }
}

fn register_class(core: &crate::DriverCore, ops: Arc<TestClass>) -> Arc<Class> {
    core.class_register(ops).unwrap()
}

#[test]
fn test_parentless_class_device_is_virtual() {
    let core = new_core();
    let class = register_class(&core, TestClass::new("tty"));

    let dev = Device::builder("ttyS0").class(&class).build().unwrap();
    core.device_add(&dev).unwrap();

    assert_eq!(dev.path().as_deref(), Some("/devices/virtual/tty/ttyS0"));
    assert!(dev.is_on_class());
    assert_eq!(
        core.sysfs().read_link("/class/tty/ttyS0").unwrap(),
        "../../devices/virtual/tty/ttyS0"
    );
    assert_eq!(
        core.sysfs().read_link("/devices/virtual/tty/ttyS0/subsystem").unwrap(),
        "../../../../class/tty"
    );
    assert_eq!(
        core.sysfs()
            .read_to_string("/class/tty/ttyS0/dev_name")
            .unwrap(),
        "ttyS0\n"
    );
    assert!(core.sysfs().lookup("/devices/virtual/tty/ttyS0/device").is_err());

    let uevent = core
        .sysfs()
        .read_to_string("/devices/virtual/tty/ttyS0/uevent")
        .unwrap();
    assert!(uevent.lines().any(|l| l == "DEVNAME=ttyS0"));

    core.device_del(&dev);
    assert!(!dev.is_on_class());
    assert!(core.sysfs().lookup("/class/tty/ttyS0").is_err());
    // 空的胶水目录随最后一个设备移除
    assert!(core.sysfs().lookup("/devices/virtual/tty").is_err());
    assert!(class.devices().is_empty());
}

#[test]
fn test_class_device_under_parent_glue_dir() {
    let core = new_core();
    let bus = register_bus(&core, "platform");
    let class = register_class(&core, TestClass::new("net"));

    let nic = Device::builder("nic0").bus(&bus).build().unwrap();
    core.device_add(&nic).unwrap();

    let eth0 = Device::builder("eth0")
        .parent(&nic)
        .class(&class)
        .build()
        .unwrap();
    let eth1 = Device::builder("eth1")
        .parent(&nic)
        .class(&class)
        .build()
        .unwrap();
    core.device_add(&eth0).unwrap();
    core.device_add(&eth1).unwrap();

    assert_eq!(eth0.path().as_deref(), Some("/devices/nic0/net/eth0"));
    assert_eq!(eth1.path().as_deref(), Some("/devices/nic0/net/eth1"));
    let linked = core.sysfs().lookup("/devices/nic0/net/eth0/device").unwrap();
    assert!(Arc::ptr_eq(&linked, &nic.kernfs_node().unwrap()));
    let mut names = core.sysfs().list("/class/net").unwrap();
    names.sort();
    assert_eq!(names, vec![String::from("eth0"), String::from("eth1")]);

    // 胶水目录在最后一个类设备离开后才移除
    core.device_del(&eth0);
    assert!(core.sysfs().lookup("/devices/nic0/net").is_ok());
    core.device_del(&eth1);
    assert!(core.sysfs().lookup("/devices/nic0/net").is_err());
    assert!(core.sysfs().lookup("/devices/nic0").is_ok());
}

#[test]
fn test_interfaces_see_every_device() {
    let core = new_core();
    let class = register_class(&core, TestClass::new("input"));

    let kbd = Device::builder("kbd").class(&class).build().unwrap();
    core.device_add(&kbd).unwrap();

    let watcher = Arc::new(Watcher::default());
    let id = class.interface_register(watcher.clone());
    // 注册时对已有设备补发
    assert_eq!(*watcher.seen.lock().unwrap(), vec![String::from("+kbd")]);

    let mouse = Device::builder("mouse").class(&class).build().unwrap();
    core.device_add(&mouse).unwrap();
    core.device_del(&kbd);
    assert_eq!(
        *watcher.seen.lock().unwrap(),
        vec![
            String::from("+kbd"),
            String::from("+mouse"),
            String::from("-kbd")
        ]
    );

    class.interface_unregister(id).unwrap();
    assert_eq!(
        watcher.seen.lock().unwrap().last().map(String::as_str),
        Some("-mouse")
    );
    assert_eq!(class.interface_unregister(id), Err(DriverError::NotFound));

    core.device_del(&mouse);
    assert_eq!(watcher.seen.lock().unwrap().len(), 4);
}

#[test]
fn test_release_hooks() {
    let core = new_core();
    let ops = TestClass::new("misc");
    let class = register_class(&core, ops.clone());

    let dev = Device::builder("misc0").class(&class).build().unwrap();
    core.device_add(&dev).unwrap();
    core.device_del(&dev);
    drop(dev);
    assert_eq!(*ops.released.lock().unwrap(), vec![String::from("misc0")]);

    // 设备自己的释放钩子优先于类的
    let own = Arc::new(AtomicBool::new(false));
    let flag = own.clone();
    let dev = Device::builder("misc1")
        .class(&class)
        .release(move |_| flag.store(true, Ordering::SeqCst))
        .build()
        .unwrap();
    core.device_add(&dev).unwrap();
    core.device_del(&dev);
    drop(dev);
    assert!(own.load(Ordering::SeqCst));
    assert_eq!(ops.released.lock().unwrap().len(), 1);
}

#[test]
fn test_class_registration() {
    let core = new_core();
    let class = register_class(&core, TestClass::new("block"));
    assert!(core.find_class("block").is_some());
    assert_eq!(
        core.class_register(TestClass::new("block")).err(),
        Some(DriverError::AlreadyExists)
    );

    let bus = register_bus(&core, "scsi");
    assert_eq!(
        Device::builder("sda").bus(&bus).class(&class).build().err(),
        Some(DriverError::InvalidArgument)
    );

    let dev = Device::builder("sda").class(&class).build().unwrap();
    core.device_add(&dev).unwrap();
    assert_eq!(core.class_unregister(&class), Err(DriverError::Busy));
    core.device_del(&dev);
    core.class_unregister(&class).unwrap();
    assert!(core.find_class("block").is_none());
    assert!(core.sysfs().lookup("/class/block").is_err());

    let late = Device::builder("sdb").class(&class).build().unwrap();
    assert_eq!(core.device_add(&late), Err(DriverError::NotRegistered));
}
