// Unit tests for sysfs.

use alloc::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use kernfs::KernfsPriv;

use crate::{Entity, KernfsError, KernfsNode, SysFS};


/// 测试用实体：一个计数器
pub(super) fn counter(value: usize) -> KernfsPriv {
    Arc::new(AtomicUsize::new(value))
}

pub(super) fn counter_of(entity: &Entity) -> Result<&AtomicUsize, KernfsError> {
    entity.downcast_ref::<AtomicUsize>().ok_or(KernfsError::IoError)
}

pub(super) fn load(entity: &Entity) -> Result<usize, KernfsError> {
    Ok(counter_of(entity)?.load(Ordering::SeqCst))
}

pub(super) fn setup(name: &str, value: usize) -> (SysFS, Arc<KernfsNode>) {
    test_support::init();
    let sysfs = SysFS::new();
    let dir = crate::create_dir(sysfs.root_dir(), name, Some(counter(value))).unwrap();
    (sysfs, dir)
}
