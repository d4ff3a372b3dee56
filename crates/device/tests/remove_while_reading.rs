//! 设备注销与属性读取并发的集成测试

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use device::{BusType, CoreConfig, Device, DriverCore};
use kernfs::OpenFlags;
use sysfs::{Attribute, AttributeGroup, KernfsError};

static ENTERED: AtomicBool = AtomicBool::new(false);
static OPEN_GATE: AtomicBool = AtomicBool::new(false);

struct PlainBus;

impl BusType for PlainBus {
    fn name(&self) -> &str {
        "plain"
    }
}

fn wait_until(flag: &AtomicBool) {
    while !flag.load(Ordering::SeqCst) {
        thread::yield_now();
    }
}

/// show 进入后阻塞，直到测试放行
fn gated_group() -> AttributeGroup {
    AttributeGroup::new(vec![Attribute::ro("status", |_, out: &mut String| {
        ENTERED.store(true, Ordering::SeqCst);
        wait_until(&OPEN_GATE);
        out.push_str("online\n");
        Ok(())
    })])
}

#[test]
fn test_device_del_waits_for_inflight_show() {
    test_support::init();
    let core = DriverCore::new(CoreConfig::default()).unwrap();
    let bus = core.bus_register(Arc::new(PlainBus)).unwrap();
    let dev = Device::builder("sensor0")
        .bus(&bus)
        .groups(vec![gated_group()])
        .build()
        .unwrap();
    core.device_add(&dev).unwrap();

    let of = core
        .sysfs()
        .mount()
        .open("/devices/sensor0/status", OpenFlags::READ)
        .unwrap();
    let reader = thread::spawn(move || {
        let mut buf = [0u8; 32];
        let n = of.read_at(0, &mut buf).unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    });
    wait_until(&ENTERED);

    let removed = Arc::new(AtomicBool::new(false));
    let remover = {
        let core = core.clone();
        let dev = dev.clone();
        let removed = removed.clone();
        thread::spawn(move || {
            core.device_del(&dev);
            removed.store(true, Ordering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert!(!removed.load(Ordering::SeqCst));

    OPEN_GATE.store(true, Ordering::SeqCst);
    assert_eq!(reader.join().unwrap(), "online\n");
    remover.join().unwrap();
    assert!(removed.load(Ordering::SeqCst));
    assert!(!dev.is_registered());

    assert_eq!(
        core.sysfs()
            .mount()
            .open("/devices/sensor0/status", OpenFlags::READ)
            .err(),
        Some(KernfsError::NotFound)
    );
    assert!(bus.devices().is_empty());
}
