//! 总线事件通知
//!
//! 订阅者按注册顺序收到通知。通知时先在读锁下复制订阅者列表，
//! 回调在锁外执行，回调内部可以再注册或注销订阅者。

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use sync::RwLock;

use crate::device::Device;

/// 总线上发生的事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusEvent {
    /// 设备已加入总线
    AddDevice,
    /// 设备即将离开总线
    DelDevice,
    /// 设备已离开总线
    RemovedDevice,
    /// 即将把驱动绑定到设备
    BindDriver,
    /// 驱动已绑定到设备
    BoundDriver,
    /// 即将解绑驱动
    UnbindDriver,
    /// 驱动已解绑
    UnboundDriver,
    /// 绑定失败
    DriverNotBound,
}

/// 总线事件订阅者
pub trait BusNotifier: Send + Sync {
    /// 处理一个事件
    fn notify(&self, event: BusEvent, dev: &Arc<Device>);
}

/// 订阅者的注册标识
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifierId(u64);

/// 订阅者链
pub(crate) struct NotifierChain {
    list: RwLock<Vec<(NotifierId, Arc<dyn BusNotifier>)>>,
    next_id: AtomicU64,
}

impl NotifierChain {
    pub(crate) fn new() -> Self {
        Self {
            list: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn register(&self, nb: Arc<dyn BusNotifier>) -> NotifierId {
        let id = NotifierId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.list.write().push((id, nb));
        id
    }

    pub(crate) fn unregister(&self, id: NotifierId) -> bool {
        let mut list = self.list.write();
        let before = list.len();
        list.retain(|(nid, _)| *nid != id);
        list.len() != before
    }

    pub(crate) fn call(&self, event: BusEvent, dev: &Arc<Device>) {
        let list: Vec<Arc<dyn BusNotifier>> =
            self.list.read().iter().map(|(_, nb)| nb.clone()).collect();
        for nb in list {
            nb.notify(event, dev);
        }
    }
}
