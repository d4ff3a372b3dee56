//! 受管资源账本
//!
//! 每个设备带一本账，记录 probe 期间获得的资源和对应的撤销函数。
//! 驱动解绑或 probe 失败时，账本按登记的逆序逐个撤销，每个撤销函数恰好执行一次，
//! 并且都在账本锁之外执行。
//!
//! 资源以“撤销函数 + 载荷类型”识别，查找、移除等操作还可以附带一个匹配谓词。
//! 账本中还可以插入分组标记，把一段连续登记的资源作为一组整体撤销。

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::any::{Any, TypeId};
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use sync::SpinLock;

use crate::device::Device;
use crate::error::DriverError;

/// 撤销函数
pub type DevresRelease<T> = fn(&Device, &mut T);

type Payload = Box<dyn Any + Send + Sync>;
type Invoke = fn(&Device, &(dyn Any + Send + Sync), &mut (dyn Any + Send + Sync));

/// 用具体类型调用撤销函数
fn invoke_release<T: Any + Send + Sync>(
    dev: &Device,
    release: &(dyn Any + Send + Sync),
    data: &mut (dyn Any + Send + Sync),
) {
    if let (Some(f), Some(v)) = (
        release.downcast_ref::<DevresRelease<T>>(),
        data.downcast_mut::<T>(),
    ) {
        f(dev, v);
    }
}

struct Resource {
    release_addr: usize,
    type_id: TypeId,
    type_name: &'static str,
    release: Payload,
    data: Payload,
    invoke: Invoke,
}

impl Resource {
    fn new<T: Any + Send + Sync>(release: DevresRelease<T>, data: T) -> Self {
        Self {
            release_addr: release as usize,
            type_id: TypeId::of::<T>(),
            type_name: core::any::type_name::<T>(),
            release: Box::new(release),
            data: Box::new(data),
            invoke: invoke_release::<T>,
        }
    }

    fn is<T: Any>(&self, release: DevresRelease<T>) -> bool {
        self.type_id == TypeId::of::<T>() && self.release_addr == release as usize
    }

    fn matches<T: Any>(&self, release: DevresRelease<T>, pred: &impl Fn(&T) -> bool) -> bool {
        self.is(release) && self.data.downcast_ref::<T>().is_some_and(pred)
    }

    fn run(mut self, dev: &Device) {
        log::trace!("devres: {} REL {}", dev.name(), self.type_name);
        (self.invoke)(dev, &*self.release, &mut *self.data);
    }

    fn into_data<T: Any>(self) -> Option<T> {
        self.data.downcast::<T>().ok().map(|b| *b)
    }
}

/// 资源组的标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DevresGroupId(u64);

enum Entry {
    Res(Resource),
    Open { id: DevresGroupId, name: String },
    Close(DevresGroupId),
}

/// 设备的资源账本
pub(crate) struct Devres {
    entries: SpinLock<Vec<Entry>>,
    next_group: AtomicU64,
    sealed: AtomicBool,
}

impl Devres {
    pub(crate) fn new() -> Self {
        Self {
            entries: SpinLock::new(Vec::new()),
            next_group: AtomicU64::new(1),
            sealed: AtomicBool::new(false),
        }
    }

    /// 设备注销后不再接受新的登记
    pub(crate) fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    fn check_open(&self) -> Result<(), DriverError> {
        if self.sealed.load(Ordering::Acquire) {
            return Err(DriverError::NoDevice);
        }
        Ok(())
    }
}

struct GroupPos {
    id: DevresGroupId,
    open: usize,
    close: Option<usize>,
}

/// 在 `entries` 中查找资源组的开始和结束标记
///
/// `id` 为 `None` 时取最近一个尚未关闭的组。
fn find_group(entries: &[Entry], id: Option<DevresGroupId>) -> Option<GroupPos> {
    let open = entries.iter().rposition(|e| match (e, id) {
        (Entry::Open { id: gid, .. }, Some(want)) => *gid == want,
        (Entry::Open { id: gid, .. }, None) => !entries
            .iter()
            .any(|c| matches!(c, Entry::Close(cid) if cid == gid)),
        _ => false,
    })?;
    let gid = match &entries[open] {
        Entry::Open { id, .. } => *id,
        _ => return None,
    };
    let close = entries
        .iter()
        .position(|e| matches!(e, Entry::Close(cid) if *cid == gid));
    Some(GroupPos {
        id: gid,
        open,
        close,
    })
}

struct DevmAction<T> {
    action: DevresRelease<T>,
    data: T,
}

fn devm_action_release<T: Any + Send + Sync>(dev: &Device, a: &mut DevmAction<T>) {
    (a.action)(dev, &mut a.data);
}

impl Device {
    /// 登记一项资源
    ///
    /// 设备已经注销时返回 [`DriverError::NoDevice`]。
    pub fn devres_add<T: Any + Send + Sync>(
        &self,
        release: DevresRelease<T>,
        data: T,
    ) -> Result<(), DriverError> {
        self.devres.check_open()?;
        log::trace!(
            "devres: {} ADD {}",
            self.name(),
            core::any::type_name::<T>()
        );
        self.devres
            .entries
            .lock()
            .push(Entry::Res(Resource::new(release, data)));
        Ok(())
    }

    /// 登记一项资源并交还载荷的副本
    ///
    /// 载荷通常是 `Arc` 之类的句柄，调用方拿到的副本与账本中的那份指向同一对象。
    pub fn devres_alloc<T: Any + Send + Sync + Clone>(
        &self,
        release: DevresRelease<T>,
        data: T,
    ) -> Result<T, DriverError> {
        let out = data.clone();
        self.devres_add(release, data)?;
        Ok(out)
    }

    /// 从最新的登记开始查找匹配的资源，返回载荷的副本
    pub fn devres_find<T: Any + Send + Sync + Clone>(
        &self,
        release: DevresRelease<T>,
        pred: impl Fn(&T) -> bool,
    ) -> Option<T> {
        let entries = self.devres.entries.lock();
        entries.iter().rev().find_map(|e| match e {
            Entry::Res(r) if r.matches(release, &pred) => r.data.downcast_ref::<T>().cloned(),
            _ => None,
        })
    }

    /// 查找匹配的资源，不存在时登记 `new`
    ///
    /// 查找和登记在同一次加锁内完成，返回最终在账本中的那份载荷的副本。
    pub fn devres_get<T: Any + Send + Sync + Clone>(
        &self,
        release: DevresRelease<T>,
        new: T,
        pred: impl Fn(&T) -> bool,
    ) -> Result<T, DriverError> {
        self.devres.check_open()?;
        let mut entries = self.devres.entries.lock();
        let existing = entries.iter().rev().find_map(|e| match e {
            Entry::Res(r) if r.matches(release, &pred) => r.data.downcast_ref::<T>().cloned(),
            _ => None,
        });
        if let Some(v) = existing {
            return Ok(v);
        }
        let out = new.clone();
        entries.push(Entry::Res(Resource::new(release, new)));
        Ok(out)
    }

    fn devres_take_where(&self, f: impl Fn(&Resource) -> bool) -> Option<Resource> {
        let mut entries = self.devres.entries.lock();
        let idx = entries
            .iter()
            .rposition(|e| matches!(e, Entry::Res(r) if f(r)))?;
        match entries.remove(idx) {
            Entry::Res(r) => Some(r),
            _ => None,
        }
    }

    fn devres_take<T: Any + Send + Sync>(
        &self,
        release: DevresRelease<T>,
        pred: &impl Fn(&T) -> bool,
    ) -> Option<Resource> {
        self.devres_take_where(|r| r.matches(release, pred))
    }

    /// 动作按载荷类型识别，不比较包装函数的地址
    fn devm_take<T: Any + Send + Sync + PartialEq>(
        &self,
        action: DevresRelease<T>,
        data: &T,
    ) -> Option<Resource> {
        self.devres_take_where(|r| {
            r.type_id == TypeId::of::<DevmAction<T>>()
                && r.data
                    .downcast_ref::<DevmAction<T>>()
                    .is_some_and(|a| a.action as usize == action as usize && a.data == *data)
        })
    }

    /// 从账本中摘下匹配的资源并交还载荷，不执行撤销函数
    pub fn devres_remove<T: Any + Send + Sync>(
        &self,
        release: DevresRelease<T>,
        pred: impl Fn(&T) -> bool,
    ) -> Option<T> {
        self.devres_take(release, &pred)?.into_data()
    }

    /// 摘下并丢弃匹配的资源，不执行撤销函数
    pub fn devres_destroy<T: Any + Send + Sync>(
        &self,
        release: DevresRelease<T>,
        pred: impl Fn(&T) -> bool,
    ) -> Result<(), DriverError> {
        match self.devres_take(release, &pred) {
            Some(_) => Ok(()),
            None => {
                log::warn!("devres: {} destroy: no such resource", self.name());
                Err(DriverError::NotFound)
            }
        }
    }

    /// 摘下匹配的资源并执行撤销函数
    pub fn devres_release<T: Any + Send + Sync>(
        &self,
        release: DevresRelease<T>,
        pred: impl Fn(&T) -> bool,
    ) -> Result<(), DriverError> {
        match self.devres_take(release, &pred) {
            Some(r) => {
                r.run(self);
                Ok(())
            }
            None => {
                log::warn!("devres: {} release: no such resource", self.name());
                Err(DriverError::NotFound)
            }
        }
    }

    /// 按登记的逆序撤销账本中的全部资源，返回撤销的数量
    pub fn devres_release_all(&self) -> usize {
        let entries = core::mem::take(&mut *self.devres.entries.lock());
        release_entries(self, entries)
    }

    /// 账本中的资源数量
    pub fn devres_count(&self) -> usize {
        self.devres
            .entries
            .lock()
            .iter()
            .filter(|e| matches!(e, Entry::Res(_)))
            .count()
    }

    /// 打开一个资源组，之后登记的资源都属于该组
    pub fn devres_open_group(&self, name: &str) -> Result<DevresGroupId, DriverError> {
        self.devres.check_open()?;
        let id = DevresGroupId(self.devres.next_group.fetch_add(1, Ordering::Relaxed));
        self.devres.entries.lock().push(Entry::Open {
            id,
            name: String::from(name),
        });
        Ok(id)
    }

    /// 关闭资源组，`None` 表示最近一个尚未关闭的组
    pub fn devres_close_group(&self, id: Option<DevresGroupId>) {
        let mut entries = self.devres.entries.lock();
        let found = find_group(&entries, id);
        match found {
            Some(GroupPos { id, close: None, .. }) => entries.push(Entry::Close(id)),
            Some(_) => {}
            None => log::warn!("devres: {} close: no such group", self.name()),
        }
    }

    /// 移除资源组的标记，组内资源保留并归入外层
    pub fn devres_remove_group(&self, id: Option<DevresGroupId>) {
        let mut entries = self.devres.entries.lock();
        let found = find_group(&entries, id);
        match found {
            Some(pos) => {
                if let Some(close) = pos.close {
                    entries.remove(close);
                }
                entries.remove(pos.open);
            }
            None => log::warn!("devres: {} remove: no such group", self.name()),
        }
    }

    /// 撤销资源组内的全部资源并移除该组，返回撤销的数量
    ///
    /// 组未关闭时撤销开始标记之后登记的所有资源。
    pub fn devres_release_group(&self, id: Option<DevresGroupId>) -> Result<usize, DriverError> {
        let taken = {
            let mut entries = self.devres.entries.lock();
            find_group(&entries, id).map(|pos| {
                let end = pos.close.map_or(entries.len(), |c| c + 1);
                entries.drain(pos.open..end).collect::<Vec<Entry>>()
            })
        };
        let Some(taken) = taken else {
            log::warn!("devres: {} release: no such group", self.name());
            return Err(DriverError::NotFound);
        };
        if let Some(Entry::Open { name, .. }) = taken.first() {
            log::trace!("devres: {} release group '{}'", self.name(), name);
        }
        Ok(release_entries(self, taken))
    }

    /// 登记一个在解绑时执行的动作
    pub fn devm_add_action<T: Any + Send + Sync>(
        &self,
        action: DevresRelease<T>,
        data: T,
    ) -> Result<(), DriverError> {
        self.devres_add(
            devm_action_release::<T> as DevresRelease<DevmAction<T>>,
            DevmAction { action, data },
        )
    }

    /// 登记一个动作，登记失败时立即执行它
    pub fn devm_add_action_or_reset<T: Any + Send + Sync>(
        &self,
        action: DevresRelease<T>,
        mut data: T,
    ) -> Result<(), DriverError> {
        if let Err(e) = self.devres.check_open() {
            action(self, &mut data);
            return Err(e);
        }
        self.devm_add_action(action, data)
    }

    /// 取消一个已登记的动作，不执行它
    pub fn devm_remove_action<T: Any + Send + Sync + PartialEq>(
        &self,
        action: DevresRelease<T>,
        data: &T,
    ) -> Result<(), DriverError> {
        match self.devm_take(action, data) {
            Some(_) => Ok(()),
            None => {
                log::warn!("devres: {} remove action: not found", self.name());
                Err(DriverError::NotFound)
            }
        }
    }

    /// 取消一个已登记的动作并立即执行它
    pub fn devm_release_action<T: Any + Send + Sync + PartialEq>(
        &self,
        action: DevresRelease<T>,
        data: &T,
    ) -> Result<(), DriverError> {
        match self.devm_take(action, data) {
            Some(r) => {
                r.run(self);
                Ok(())
            }
            None => {
                log::warn!("devres: {} release action: not found", self.name());
                Err(DriverError::NotFound)
            }
        }
    }
}

/// 逆序执行 `entries` 中资源的撤销函数，组标记直接丢弃
fn release_entries(dev: &Device, entries: Vec<Entry>) -> usize {
    let mut count = 0;
    for entry in entries.into_iter().rev() {
        if let Entry::Res(r) = entry {
            r.run(dev);
            count += 1;
        }
    }
    count
}
