// Unit tests for the driver-model core.
//
// 每个测试创建自己的 DriverCore，相互之间不共享 sysfs 树。

use std::boxed::Box;
use std::string::String;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::vec::Vec;

use alloc::sync::Arc;

use test_support::mock::executor::MockThreadExecutor;

use crate::{
    Bus, BusEvent, BusNotifier, BusType, CoreConfig, Device, DeviceDriver, DriverCore,
    DriverError, ProbeExecutor, ProbeType, UeventAction, UeventHandler,
};

mod class;
mod klist;

impl ProbeExecutor for MockThreadExecutor {
    fn spawn(&self, work: Box<dyn FnOnce() + Send + 'static>) {
        MockThreadExecutor::spawn(self, work);
    }
}

pub(super) fn new_core() -> Arc<DriverCore> {
    test_support::init();
    DriverCore::new(CoreConfig::default()).unwrap()
}

/// 接受所有设备的总线
pub(super) struct TestBus {
    pub(super) name: &'static str,
    pub(super) parent_lock: bool,
}

impl TestBus {
    pub(super) fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            parent_lock: false,
        })
    }
}

impl BusType for TestBus {
    fn name(&self) -> &str {
        self.name
    }

    fn need_parent_lock(&self) -> bool {
        self.parent_lock
    }

    fn uevent(&self, dev: &Device, env: &mut Vec<String>) -> Result<(), DriverError> {
        env.push(std::format!("MODALIAS={}:{}", self.name, dev.name()));
        Ok(())
    }
}

pub(super) fn register_bus(core: &DriverCore, name: &'static str) -> Arc<Bus> {
    core.bus_register(TestBus::new(name)).unwrap()
}

/// 只接受名字以 `prefix` 开头的设备的驱动
pub(super) struct PrefixDriver {
    pub(super) name: &'static str,
    pub(super) prefix: &'static str,
    pub(super) probe_type: ProbeType,
    /// 为真时 probe 返回 ProbeDefer
    pub(super) defer: AtomicBool,
    /// 不为空时 probe 返回该错误
    pub(super) fail: Mutex<Option<DriverError>>,
    pub(super) probes: AtomicUsize,
    pub(super) removes: AtomicUsize,
    pub(super) shutdowns: AtomicUsize,
}

impl PrefixDriver {
    pub(super) fn new(name: &'static str, prefix: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            prefix,
            probe_type: ProbeType::Sync,
            defer: AtomicBool::new(false),
            fail: Mutex::new(None),
            probes: AtomicUsize::new(0),
            removes: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
        })
    }

    pub(super) fn new_async(name: &'static str, prefix: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            prefix,
            probe_type: ProbeType::PreferAsync,
            defer: AtomicBool::new(false),
            fail: Mutex::new(None),
            probes: AtomicUsize::new(0),
            removes: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
        })
    }

    pub(super) fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub(super) fn removes(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }
}

impl DeviceDriver for PrefixDriver {
    fn name(&self) -> &str {
        self.name
    }

    fn probe(&self, dev: &Arc<Device>) -> Result<(), DriverError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if !dev.name().starts_with(self.prefix) {
            return Err(DriverError::NoDevice);
        }
        if self.defer.load(Ordering::SeqCst) {
            return Err(DriverError::ProbeDefer);
        }
        if let Some(e) = *self.fail.lock().unwrap() {
            return Err(e);
        }
        Ok(())
    }

    fn remove(&self, _dev: &Arc<Device>) {
        self.removes.fetch_add(1, Ordering::SeqCst);
    }

    fn shutdown(&self, _dev: &Arc<Device>) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }

    fn probe_type(&self) -> ProbeType {
        self.probe_type
    }
}

/// 记录收到的总线事件和热插拔事件
#[derive(Default)]
pub(super) struct EventLog {
    pub(super) bus: Mutex<Vec<(BusEvent, String)>>,
    pub(super) uevents: Mutex<Vec<(UeventAction, String, Vec<String>)>>,
}

impl EventLog {
    pub(super) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 与 `dev` 相关的总线事件，按发生顺序
    pub(super) fn bus_events(&self, dev: &str) -> Vec<BusEvent> {
        self.bus
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, name)| name == dev)
            .map(|(e, _)| *e)
            .collect()
    }

    pub(super) fn uevent_actions(&self, devpath: &str) -> Vec<UeventAction> {
        self.uevents
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, path, _)| path == devpath)
            .map(|(a, _, _)| *a)
            .collect()
    }
}

impl BusNotifier for EventLog {
    fn notify(&self, event: BusEvent, dev: &Arc<Device>) {
        self.bus
            .lock()
            .unwrap()
            .push((event, String::from(dev.name())));
    }
}

impl UeventHandler for EventLog {
    fn uevent(&self, action: UeventAction, devpath: &str, env: &[String]) {
        self.uevents
            .lock()
            .unwrap()
            .push((action, String::from(devpath), env.to_vec()));
    }
}
