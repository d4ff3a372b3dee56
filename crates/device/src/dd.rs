//! 绑定引擎
//!
//! 负责设备与驱动的匹配、probe、绑定和解绑。单个 (设备, 驱动) 对的状态变化为
//! `Unbound → Matching → Probing → {Bound | Rejected}`，解绑时为
//! `Bound → Detaching → Unbound`。
//!
//! probe 和 remove 回调都在设备锁下执行（总线要求时先锁父设备）。
//! probe 中途失败时，已经做过的推测性步骤（绑定引用、sysfs 链接、受管资源）全部撤销。
//! 返回 [`DriverError::ProbeDefer`] 的设备进入延后队列，在之后每次成功绑定、
//! 或显式调用 [`DriverCore::deferred_probe_trigger`] 时按入队顺序重试，
//! 重试总是在所有设备锁之外进行。

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::Ordering;

use crate::registry::DriverCore;
use crate::device::{BindState, Device, DeviceFlags};
use crate::driver::{Driver, ProbeType};
use crate::error::DriverError;
use crate::notifier::BusEvent;
use crate::uevent::UeventAction;

/// [`DriverCore::device_attach`] 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    /// 设备已绑定驱动
    Bound,
    /// 没有驱动接受该设备
    NotBound,
    /// 设备尚未发布或已注销
    NotRegistered,
}

impl DriverCore {
    /// 判断驱动是否匹配设备
    ///
    /// 只会返回 [`DriverError::ProbeDefer`] 一种错误，总线回调的其他错误按不匹配处理。
    pub fn driver_match_device(
        &self,
        drv: &Arc<Driver>,
        dev: &Arc<Device>,
    ) -> Result<bool, DriverError> {
        match dev.bus() {
            Some(bus) if Arc::ptr_eq(bus, drv.bus()) => {}
            _ => return Ok(false),
        }
        match drv.bus().ops().match_device(dev, drv) {
            Ok(matched) => Ok(matched),
            Err(DriverError::ProbeDefer) => Err(DriverError::ProbeDefer),
            Err(e) => {
                log::debug!(
                    "bus: '{}': failed to match device {}: {:?}",
                    drv.bus().name(),
                    dev.name(),
                    e
                );
                Ok(false)
            }
        }
    }

    fn driver_sysfs_add(&self, dev: &Arc<Device>, drv: &Arc<Driver>) -> Result<(), DriverError> {
        let dev_dir = dev.kernfs_node().ok_or(DriverError::NotRegistered)?;
        let drv_dir = drv.kernfs_node().ok_or(DriverError::NotRegistered)?;
        sysfs::create_link(&drv_dir, &dev_dir, dev.name())?;
        if let Err(e) = sysfs::create_link(&dev_dir, &drv_dir, "driver") {
            sysfs::remove_link(&drv_dir, dev.name());
            return Err(e.into());
        }
        Ok(())
    }

    fn driver_sysfs_remove(&self, dev: &Device, drv: &Driver) {
        if let Some(drv_dir) = drv.kernfs_node() {
            sysfs::remove_link(&drv_dir, dev.name());
        }
        if let Some(dev_dir) = dev.kernfs_node() {
            sysfs::remove_link(&dev_dir, "driver");
        }
    }

    fn probe_steps(&self, dev: &Arc<Device>, drv: &Arc<Driver>) -> Result<(), DriverError> {
        self.driver_sysfs_add(dev, drv)?;
        drv.bus().ops().probe(dev, drv)?;
        if let Some(dir) = dev.kernfs_node() {
            if let Err(e) = sysfs::create_groups(&dir, &drv.dev_groups) {
                log::error!(
                    "{}: driver {} dev_groups creation failed: {:?}",
                    dev.name(),
                    drv.name(),
                    e
                );
                drv.bus().ops().remove(dev, drv);
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// 调用方持有设备锁
    fn really_probe(&self, dev: &Arc<Device>, drv: &Arc<Driver>) -> Result<(), DriverError> {
        if dev.is_bound() {
            return Err(DriverError::Busy);
        }
        log::debug!(
            "bus: '{}': really_probe: probing driver {} with device {}",
            drv.bus().name(),
            drv.name(),
            dev.name()
        );
        dev.set_bind_state(BindState::Probing);
        *dev.driver.write() = Some(drv.clone());
        drv.bus().notify(BusEvent::BindDriver, dev);

        let Err(e) = self.probe_steps(dev, drv) else {
            self.driver_bound(dev, drv);
            return Ok(());
        };

        self.driver_sysfs_remove(dev, drv);
        dev.devres_release_all();
        *dev.driver.write() = None;
        dev.clear_driver_data();
        drv.bus().notify(BusEvent::DriverNotBound, dev);
        dev.set_bind_state(BindState::Rejected);

        match e {
            DriverError::ProbeDefer => {
                log::debug!("{}: driver {} requests probe deferral", dev.name(), drv.name());
                self.deferred_add(dev);
            }
            e if e.is_declined() => {
                log::debug!("{}: probe with driver {} rejects match {:?}", dev.name(), drv.name(), e);
            }
            e => {
                log::warn!("{}: probe with driver {} failed with error {}", dev.name(), drv.name(), e.to_errno());
            }
        }
        Err(e)
    }

    fn driver_bound(&self, dev: &Arc<Device>, drv: &Arc<Driver>) {
        if !drv.devices.add_tail(dev.id(), dev.clone()) {
            log::warn!("{}: already bound to driver {}", dev.name(), drv.name());
        }
        dev.set_bind_state(BindState::Bound);
        self.deferred_remove(dev);
        log::debug!(
            "driver: '{}': driver_bound: bound to device '{}'",
            drv.name(),
            dev.name()
        );
        drv.bus().notify(BusEvent::BoundDriver, dev);
        self.emit_uevent(UeventAction::Bind, dev);
        self.deferred_pending.store(true, Ordering::Release);
    }

    /// 尝试把驱动绑定到设备
    ///
    /// 调用方持有设备锁（总线要求时还持有父设备锁）。整个 probe 期间计入在途 probe 计数。
    pub fn driver_probe_device(
        &self,
        drv: &Arc<Driver>,
        dev: &Arc<Device>,
    ) -> Result<(), DriverError> {
        if !dev.is_registered() || !drv.is_registered() {
            return Err(DriverError::NotRegistered);
        }
        let _probing = self.probe_count.enter();
        self.really_probe(dev, drv)
    }

    /// 调用方持有设备锁
    fn device_attach_locked(&self, dev: &Arc<Device>, allow_async: bool) -> AttachOutcome {
        if !dev.is_registered() {
            return AttachOutcome::NotRegistered;
        }
        if dev.is_bound() {
            return AttachOutcome::Bound;
        }
        let Some(bus) = dev.bus() else {
            return AttachOutcome::NotBound;
        };

        let mut have_async = false;
        for drv in bus.drivers.iter() {
            if !drv.is_registered() {
                continue;
            }
            dev.set_bind_state(BindState::Matching);
            match self.driver_match_device(&drv, dev) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(_) => {
                    self.deferred_add(dev);
                    continue;
                }
            }
            if allow_async && drv.ops().probe_type() == ProbeType::PreferAsync && self.executor().is_some() {
                have_async = true;
                continue;
            }
            if self.driver_probe_device(&drv, dev).is_ok() {
                return AttachOutcome::Bound;
            }
        }

        if dev.bind_state() == BindState::Matching {
            dev.set_bind_state(BindState::Unbound);
        }
        if have_async {
            self.schedule_async_attach(dev);
        }
        AttachOutcome::NotBound
    }

    fn schedule_async_attach(&self, dev: &Arc<Device>) {
        let (Some(core), Some(exec)) = (self.this(), self.executor()) else {
            return;
        };
        log::debug!("{}: scheduling asynchronous probe", dev.name());
        self.probe_count.inc();
        let dev = dev.clone();
        exec.spawn(Box::new(move || {
            {
                let _guard = dev.lock_for_bind();
                core.device_attach_locked(&dev, false);
            }
            // 本次绑定触发的重试也算作在途 probe
            core.flush_deferred();
            core.probe_count.dec();
        }));
    }

    /// 为设备寻找驱动
    ///
    /// 按注册顺序遍历总线上的驱动，直到有一个接受该设备。
    pub fn device_attach(&self, dev: &Arc<Device>) -> AttachOutcome {
        let outcome = {
            let _guard = dev.lock_for_bind();
            self.device_attach_locked(dev, false)
        };
        self.flush_deferred();
        outcome
    }

    /// 设备发布后的首次 probe，偏好异步的驱动会交给执行器
    pub(crate) fn device_initial_probe(&self, dev: &Arc<Device>) {
        {
            let _guard = dev.lock_for_bind();
            self.device_attach_locked(dev, true);
        }
        self.flush_deferred();
    }

    /// 为驱动寻找设备
    ///
    /// 对总线上每个匹配且尚未绑定的设备尝试 probe，单个设备的失败不影响其余设备。
    pub fn driver_attach(&self, drv: &Arc<Driver>) {
        for dev in drv.bus().devices.iter() {
            match self.driver_match_device(drv, &dev) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(_) => {
                    self.deferred_add(&dev);
                    continue;
                }
            }

            if drv.ops().probe_type() == ProbeType::PreferAsync {
                if let (Some(core), Some(exec)) = (self.this(), self.executor()) {
                    log::debug!("driver {}: async attach to {}", drv.name(), dev.name());
                    self.probe_count.inc();
                    let drv = drv.clone();
                    exec.spawn(Box::new(move || {
                        {
                            let _guard = dev.lock_for_bind();
                            if !dev.is_bound() {
                                let _ = core.driver_probe_device(&drv, &dev);
                            }
                        }
                        core.flush_deferred();
                        core.probe_count.dec();
                    }));
                    continue;
                }
            }

            let _guard = dev.lock_for_bind();
            if !dev.is_bound() {
                dev.set_bind_state(BindState::Matching);
                let _ = self.driver_probe_device(drv, &dev);
            }
        }
        self.flush_deferred();
    }

    /// 调用方持有设备锁；`expected` 不为空时只解绑该驱动
    fn release_driver_locked(&self, dev: &Arc<Device>, expected: Option<&Arc<Driver>>) {
        let Some(drv) = dev.driver() else {
            return;
        };
        if expected.is_some_and(|e| !Arc::ptr_eq(e, &drv)) {
            return;
        }

        dev.set_bind_state(BindState::Detaching);
        drv.bus().notify(BusEvent::UnbindDriver, dev);
        self.driver_sysfs_remove(dev, &drv);
        drv.bus().ops().remove(dev, &drv);
        if let Some(dir) = dev.kernfs_node() {
            sysfs::remove_groups(&dir, &drv.dev_groups);
        }
        dev.devres_release_all();
        *dev.driver.write() = None;
        dev.clear_driver_data();
        drv.devices.remove(dev.id());
        dev.set_bind_state(BindState::Unbound);
        drv.bus().notify(BusEvent::UnboundDriver, dev);
        self.emit_uevent(UeventAction::Unbind, dev);
        log::debug!("driver: '{}': unbound from device '{}'", drv.name(), dev.name());
    }

    /// 解绑设备的驱动，设备未绑定时什么也不做
    pub fn device_release_driver(&self, dev: &Arc<Device>) {
        let _guard = dev.lock_for_bind();
        self.release_driver_locked(dev, None);
    }

    /// 解绑驱动的所有设备，从最后绑定的开始
    pub fn driver_detach(&self, drv: &Arc<Driver>) {
        while let Some(dev) = drv.devices.last() {
            {
                let _guard = dev.lock_for_bind();
                self.release_driver_locked(&dev, Some(drv));
            }
            if drv.devices.remove(dev.id()).is_some() {
                log::warn!("driver: '{}': stale binding to '{}' dropped", drv.name(), dev.name());
            }
        }
    }

    /// 把驱动登记为设备的驱动而不执行 probe
    ///
    /// 用于驱动已经自行接管了设备的情形：发布链接、加入驱动的设备表并派发绑定事件。
    pub fn device_bind_driver(&self, dev: &Arc<Device>, drv: &Arc<Driver>) -> Result<(), DriverError> {
        let res = {
            let _guard = dev.lock_for_bind();
            self.bind_locked(dev, drv)
        };
        self.flush_deferred();
        res
    }

    fn bind_locked(&self, dev: &Arc<Device>, drv: &Arc<Driver>) -> Result<(), DriverError> {
        if !dev.is_registered() || !drv.is_registered() {
            return Err(DriverError::NotRegistered);
        }
        if dev.is_bound() {
            return Err(DriverError::Busy);
        }
        if !dev.bus().is_some_and(|b| Arc::ptr_eq(b, drv.bus())) {
            return Err(DriverError::InvalidArgument);
        }
        *dev.driver.write() = Some(drv.clone());
        drv.bus().notify(BusEvent::BindDriver, dev);
        if let Err(e) = self.driver_sysfs_add(dev, drv) {
            *dev.driver.write() = None;
            drv.bus().notify(BusEvent::DriverNotBound, dev);
            return Err(e);
        }
        self.driver_bound(dev, drv);
        Ok(())
    }

    /// `bind` 属性的写入：把指定设备绑定到驱动
    pub(crate) fn bind_store(&self, drv: &Arc<Driver>, dev: &Arc<Device>) -> Result<(), DriverError> {
        if !self.driver_match_device(drv, dev).unwrap_or(false) {
            return Err(DriverError::NoDevice);
        }
        let res = {
            let _guard = dev.lock_for_bind();
            if dev.is_bound() {
                Err(DriverError::Busy)
            } else {
                self.driver_probe_device(drv, dev)
            }
        };
        self.flush_deferred();
        res
    }

    /// 等待所有在途的 probe（包括异步 probe）结束
    pub fn wait_for_device_probe(&self) {
        self.flush_deferred();
        self.probe_count.wait_zero();
    }

    /// 在途 probe 的数量
    pub fn probes_in_flight(&self) -> usize {
        self.probe_count.count()
    }

    // ---------------------------------------------------------------- 延后 probe

    pub(crate) fn deferred_add(&self, dev: &Arc<Device>) {
        let mut list = self.deferred.lock();
        if !dev.test_and_set_flag(DeviceFlags::DEFERRED) {
            log::debug!("{}: added to deferred list", dev.name());
            list.push(dev.clone());
        }
    }

    pub(crate) fn deferred_remove(&self, dev: &Arc<Device>) {
        let mut list = self.deferred.lock();
        if dev.test_and_clear_flag(DeviceFlags::DEFERRED) {
            log::debug!("{}: removed from deferred list", dev.name());
            list.retain(|d| !Arc::ptr_eq(d, dev));
        }
    }

    /// 延后队列中的设备，按入队顺序
    pub fn deferred_devices(&self) -> Vec<Arc<Device>> {
        self.deferred.lock().clone()
    }

    /// 重试延后队列中的设备
    ///
    /// 某一轮重试中有新的绑定成功时会再来一轮，轮数受
    /// [`CoreConfig::deferred_retry_rounds`](crate::CoreConfig::deferred_retry_rounds) 限制。
    /// 已经有调用方在重试时，本次调用只登记请求后立即返回。
    /// 整个重试过程计入在途 probe，[`Self::wait_for_device_probe`] 会等它结束。
    pub fn deferred_probe_trigger(&self) {
        let _retrying = self.probe_count.enter();
        self.deferred_pending.store(true, Ordering::Release);
        let max = self.config().deferred_retry_rounds;
        let mut rounds = 0;
        loop {
            if self.deferred_active.swap(true, Ordering::AcqRel) {
                return;
            }
            while rounds < max && self.deferred_pending.swap(false, Ordering::AcqRel) {
                rounds += 1;
                let pending: Vec<Arc<Device>> = {
                    let mut list = self.deferred.lock();
                    for dev in list.iter() {
                        dev.clear_flag(DeviceFlags::DEFERRED);
                    }
                    core::mem::take(&mut *list)
                };
                for dev in pending {
                    log::debug!("{}: retrying from deferred list", dev.name());
                    let _guard = dev.lock_for_bind();
                    self.device_attach_locked(&dev, false);
                }
            }
            self.deferred_active.store(false, Ordering::Release);

            if !self.deferred_pending.load(Ordering::Acquire) {
                break;
            }
            if rounds >= max {
                log::debug!("deferred probe: giving up after {} rounds", rounds);
                self.deferred_pending.store(false, Ordering::Release);
                break;
            }
        }
    }

    /// 自上次重试以来有新的绑定时重试延后队列
    pub(crate) fn flush_deferred(&self) {
        if self.deferred_pending.load(Ordering::Acquire) {
            self.deferred_probe_trigger();
        }
    }

    // ---------------------------------------------------------------- 关机

    /// 按发布的逆序对所有已绑定的设备调用 shutdown
    pub fn device_shutdown(&self) {
        self.wait_for_device_probe();
        for dev in self.device_list().snapshot().into_iter().rev() {
            let _guard = dev.lock_for_bind();
            if let Some(drv) = dev.driver() {
                log::debug!("{}: shutdown", dev.name());
                drv.bus().ops().shutdown(&dev, &drv);
            }
        }
    }
}
