//! 属性文件与打开句柄
//!
//! 属性节点的行为由 [`KernfsOps`] 提供。每次打开得到一个 [`KernfsOpenFile`]，
//! 它挂在节点的打开列表上：节点被移除时，句柄会收到恰好一次 `release`，
//! 之后的读写一律返回 [`KernfsError::NotFound`]。

use alloc::string::String;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use sync::{Completion, SpinLock};

use crate::config::PAGE_SIZE;
use crate::error::KernfsError;
use crate::mmap::{KernfsMapping, VmArea};
use crate::mode::{FileMode, NodeKind, OpenFlags, PollEvents};
use crate::node::{KernfsNode, KernfsPriv, NodePayload};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// 载荷支持的操作
    pub struct OpsFlags: u32 {
        /// 以整页文本渲染读取
        const SEQ_SHOW = 0b0001;
        /// 按偏移直接读取
        const READ     = 0b0010;
        /// 写入
        const WRITE    = 0b0100;
        /// 内存映射
        const MMAP     = 0b1000;
    }
}

/// 属性文件的载荷操作
///
/// 除 [`KernfsOps::capabilities`] 外都有默认实现，默认行为是拒绝（`IoError`，
/// 映射为 `NoDevice`）。所有回调都在持有节点活动引用时调用，`release` 除外。
pub trait KernfsOps: Send + Sync {
    /// 支持的操作集合，打开时据此做权限检查
    fn capabilities(&self) -> OpsFlags;

    /// 打开回调
    fn open(&self, _of: &KernfsOpenFile) -> Result<(), KernfsError> {
        Ok(())
    }

    /// 释放回调，每个句柄恰好调用一次
    fn release(&self, _of: &KernfsOpenFile) {}

    /// 把属性内容渲染到 `buf`
    fn seq_show(&self, _of: &KernfsOpenFile, _buf: &mut String) -> Result<(), KernfsError> {
        Err(KernfsError::IoError)
    }

    /// 从 `offset` 处读到 `buf`，返回读取的字节数
    fn read(
        &self,
        _of: &KernfsOpenFile,
        _offset: usize,
        _buf: &mut [u8],
    ) -> Result<usize, KernfsError> {
        Err(KernfsError::IoError)
    }

    /// 在 `offset` 处写入 `data`，返回消耗的字节数
    fn write(&self, _of: &KernfsOpenFile, _offset: usize, _data: &[u8]) -> Result<usize, KernfsError> {
        Err(KernfsError::IoError)
    }

    /// 建立映射，通常通过 [`VmArea::set_ops`] 安装缺页处理
    fn mmap(&self, _of: &KernfsOpenFile, _vma: &mut VmArea) -> Result<(), KernfsError> {
        Err(KernfsError::NoDevice)
    }
}

impl KernfsNode {
    /// 创建文本属性文件
    pub fn create_file(
        self: &Arc<Self>,
        name: &str,
        mode: FileMode,
        ops: Arc<dyn KernfsOps>,
        priv_data: Option<KernfsPriv>,
    ) -> Result<Arc<KernfsNode>, KernfsError> {
        self.add_node(name, mode, NodePayload::new_attr(ops, false, 0), priv_data)
    }

    /// 创建二进制属性文件，`size` 为 0 表示不限大小
    pub fn create_bin_file(
        self: &Arc<Self>,
        name: &str,
        mode: FileMode,
        size: usize,
        ops: Arc<dyn KernfsOps>,
        priv_data: Option<KernfsPriv>,
    ) -> Result<Arc<KernfsNode>, KernfsError> {
        self.add_node(name, mode, NodePayload::new_attr(ops, true, size), priv_data)
    }

    /// 通知属性内容已变化
    ///
    /// 推进事件计数并唤醒所有打开句柄，之后这些句柄的 poll 会报告 `POLLPRI`。
    pub fn notify(&self) {
        let Some(attr) = self.attr_data() else {
            return;
        };
        attr.event.fetch_add(1, Ordering::AcqRel);
        // 升级得到的可能是最后一个强引用，不能在持锁时析构
        let open: Vec<Arc<KernfsOpenFile>> =
            attr.open.lock().iter().filter_map(Weak::upgrade).collect();
        for of in &open {
            of.wakeup.complete();
        }
    }

    /// 当前事件计数，非属性节点为 0
    pub fn event(&self) -> u64 {
        self.attr_data()
            .map(|a| a.event.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// 打开句柄数量
    pub fn open_count(&self) -> usize {
        self.attr_data()
            .map(|a| a.open.lock().iter().filter(|w| w.strong_count() > 0).count())
            .unwrap_or(0)
    }

    /// 节点移除后释放全部打开句柄
    pub(crate) fn release_open_files(&self) {
        let Some(attr) = self.attr_data() else {
            return;
        };
        let open = core::mem::take(&mut *attr.open.lock());
        for of in open.iter().filter_map(Weak::upgrade) {
            of.release_once();
        }
    }
}

struct OpenState {
    pos: usize,
    /// 文本属性最近一次渲染的内容
    page: Option<Vec<u8>>,
    /// 最近一次读取时看到的事件计数
    event: u64,
}

/// 打开的属性文件
pub struct KernfsOpenFile {
    node: Arc<KernfsNode>,
    flags: OpenFlags,
    state: SpinLock<OpenState>,
    released: AtomicBool,
    wakeup: Completion,
    mmapped: AtomicBool,
}

impl KernfsOpenFile {
    /// 打开属性文件
    ///
    /// 按节点权限位和载荷能力检查打开方式，失败返回 `PermissionDenied`。
    pub fn open(node: &Arc<KernfsNode>, flags: OpenFlags) -> Result<Arc<Self>, KernfsError> {
        let attr = match &node.payload {
            NodePayload::Attr(a) => a,
            NodePayload::Dir(_) => return Err(KernfsError::IsDirectory),
            NodePayload::Link(_) => return Err(KernfsError::InvalidArgument),
        };
        let _active = node.get_active().ok_or(KernfsError::NotFound)?;

        let caps = attr.ops.capabilities();
        let mode = node.mode();
        if flags.contains(OpenFlags::READ) {
            let readable = match node.kind() {
                NodeKind::BinAttr => caps.intersects(OpsFlags::READ | OpsFlags::MMAP),
                _ => caps.intersects(OpsFlags::SEQ_SHOW | OpsFlags::READ),
            };
            if !mode.any_read() || !readable {
                return Err(KernfsError::PermissionDenied);
            }
        }
        if flags.contains(OpenFlags::WRITE) && (!mode.any_write() || !caps.contains(OpsFlags::WRITE))
        {
            return Err(KernfsError::PermissionDenied);
        }

        let of = Arc::new(KernfsOpenFile {
            node: node.clone(),
            flags,
            state: SpinLock::new(OpenState {
                pos: 0,
                page: None,
                event: attr.event.load(Ordering::Acquire),
            }),
            released: AtomicBool::new(false),
            wakeup: Completion::new(),
            mmapped: AtomicBool::new(false),
        });
        if let Err(e) = attr.ops.open(&of) {
            // 载荷拒绝打开，句柄析构时不再回调 release
            of.released.store(true, Ordering::Release);
            return Err(e);
        }
        // 持有活动引用时挂入，移除方一定在排空之后才会遍历打开列表
        attr.open.lock().push(Arc::downgrade(&of));
        Ok(of)
    }

    /// 所属节点
    pub fn node(&self) -> &Arc<KernfsNode> {
        &self.node
    }

    /// 打开标志
    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    /// 所属节点的载荷
    pub fn priv_data(&self) -> Option<&KernfsPriv> {
        self.node.priv_data()
    }

    /// 是否已经释放
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// 是否建立过映射
    pub fn is_mmapped(&self) -> bool {
        self.mmapped.load(Ordering::Acquire)
    }

    fn attr(&self) -> Result<&crate::node::AttrData, KernfsError> {
        self.node.attr_data().ok_or(KernfsError::InvalidArgument)
    }

    /// 从当前位置读取并推进位置
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, KernfsError> {
        let pos = self.state.lock().pos;
        let n = self.read_at(pos, buf)?;
        self.state.lock().pos = pos + n;
        Ok(n)
    }

    /// 从 `offset` 处读取
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize, KernfsError> {
        if !self.flags.contains(OpenFlags::READ) {
            return Err(KernfsError::PermissionDenied);
        }
        let attr = self.attr()?;
        let caps = attr.ops.capabilities();

        if attr.binary || !caps.contains(OpsFlags::SEQ_SHOW) {
            let mut len = buf.len().min(PAGE_SIZE);
            if attr.binary && attr.size > 0 {
                if offset >= attr.size {
                    return Ok(0);
                }
                len = len.min(attr.size - offset);
            }
            if len == 0 {
                return Ok(0);
            }
            let _active = self.node.get_active().ok_or(KernfsError::NotFound)?;
            self.state.lock().event = attr.event.load(Ordering::Acquire);
            return attr.ops.read(self, offset, &mut buf[..len]);
        }

        let _active = self.node.get_active().ok_or(KernfsError::NotFound)?;
        let cached = offset != 0 && self.state.lock().page.is_some();
        if !cached {
            self.render()?;
        }
        let state = self.state.lock();
        let page = state.page.as_deref().unwrap_or(&[]);
        if offset >= page.len() {
            return Ok(0);
        }
        let n = buf.len().min(page.len() - offset);
        buf[..n].copy_from_slice(&page[offset..offset + n]);
        Ok(n)
    }

    /// 重新渲染文本属性
    ///
    /// 调用方必须持有节点的活动引用。
    fn render(&self) -> Result<(), KernfsError> {
        let attr = self.attr()?;
        // 先记录事件，渲染期间的通知会让下一次 poll 报告变化
        let event = attr.event.load(Ordering::Acquire);
        let mut out = String::new();
        attr.ops.seq_show(self, &mut out)?;
        let mut bytes = out.into_bytes();
        if bytes.len() >= PAGE_SIZE {
            log::warn!(
                "kernfs: {} returned {} bytes, truncated to {}",
                self.node.path(),
                bytes.len(),
                PAGE_SIZE - 1
            );
            bytes.truncate(PAGE_SIZE - 1);
        }
        let mut state = self.state.lock();
        state.page = Some(bytes);
        state.event = event;
        Ok(())
    }

    /// 在当前位置写入并推进位置
    pub fn write(&self, data: &[u8]) -> Result<usize, KernfsError> {
        let pos = self.state.lock().pos;
        let n = self.write_at(pos, data)?;
        self.state.lock().pos = pos + n;
        Ok(n)
    }

    /// 在 `offset` 处写入
    ///
    /// 每次最多复制一页数据交给载荷；二进制属性在越过声明大小时返回 `FileTooBig`。
    pub fn write_at(&self, offset: usize, data: &[u8]) -> Result<usize, KernfsError> {
        if !self.flags.contains(OpenFlags::WRITE) {
            return Err(KernfsError::PermissionDenied);
        }
        let attr = self.attr()?;
        let mut len = data.len().min(PAGE_SIZE);
        if attr.binary && attr.size > 0 {
            if offset >= attr.size {
                return Err(KernfsError::FileTooBig);
            }
            len = len.min(attr.size - offset);
        }
        if len == 0 {
            return Ok(0);
        }
        let buf: Vec<u8> = data[..len].to_vec();
        let _active = self.node.get_active().ok_or(KernfsError::NotFound)?;
        attr.ops.write(self, offset, &buf)
    }

    /// 设置读写位置，返回新位置
    pub fn seek(&self, pos: usize) -> usize {
        self.state.lock().pos = pos;
        pos
    }

    /// 当前读写位置
    pub fn position(&self) -> usize {
        self.state.lock().pos
    }

    /// 查询事件
    ///
    /// 属性总是可读；自上次读取后内容被通知变化，或节点已经移除时，
    /// 额外报告 `POLLERR | POLLPRI`。
    pub fn poll(&self) -> PollEvents {
        let changed = PollEvents::DEFAULT | PollEvents::POLLERR | PollEvents::POLLPRI;
        let Ok(attr) = self.attr() else {
            return changed;
        };
        let Some(_active) = self.node.get_active() else {
            return changed;
        };
        if attr.event.load(Ordering::Acquire) != self.state.lock().event {
            changed
        } else {
            PollEvents::DEFAULT
        }
    }

    /// 阻塞直到属性变化、节点移除或句柄被释放
    pub fn wait_for_change(&self) -> PollEvents {
        loop {
            let events = self.poll();
            if events.contains(PollEvents::POLLPRI) {
                return events;
            }
            if self.is_released() {
                return events | PollEvents::POLLERR;
            }
            self.wakeup.wait();
            self.wakeup.reinit();
        }
    }

    /// 映射二进制属性
    ///
    /// 映射上的每次缺页和访问都要先取得节点的活动引用，节点移除后一律返回 `Fault`。
    pub fn mmap(
        self: &Arc<Self>,
        len: usize,
        pgoff: usize,
    ) -> Result<KernfsMapping, KernfsError> {
        let attr = self.attr()?;
        if !attr.binary || !attr.ops.capabilities().contains(OpsFlags::MMAP) {
            return Err(KernfsError::NoDevice);
        }
        let _active = self.node.get_active().ok_or(KernfsError::NotFound)?;
        let mut vma = VmArea::new(pgoff, len, self.flags.contains(OpenFlags::WRITE));
        attr.ops.mmap(self, &mut vma)?;
        self.mmapped.store(true, Ordering::Release);
        Ok(KernfsMapping::new(self.clone(), vma))
    }

    /// 关闭句柄
    ///
    /// 与节点移除时的释放合计只会调用一次载荷的 `release`。
    pub fn release(&self) {
        if let Some(attr) = self.node.attr_data() {
            let me = self as *const KernfsOpenFile;
            attr.open
                .lock()
                .retain(|w| w.strong_count() > 0 && !core::ptr::eq(w.as_ptr(), me));
        }
        self.release_once();
    }

    fn release_once(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(attr) = self.node.attr_data() {
            attr.ops.release(self);
        }
        self.wakeup.complete();
    }
}

impl Drop for KernfsOpenFile {
    fn drop(&mut self) {
        self.release();
    }
}
