//! kernfs 节点
//!
//! 每个节点对应投影层次中的一个目录、属性文件或符号链接。
//! 节点本身由 `Arc` 计数：查找结果、打开的文件和登记表实体都可以持有它，
//! 最后一个持有者释放时节点才被回收。
//!
//! # 活动引用
//!
//! 任何要触碰节点载荷的操作都必须先通过 [`KernfsNode::get_active`] 取得活动引用。
//! 活动引用计数在停用时加上 [`KERNFS_DEACTIVATED_BIAS`] 变为负数，
//! 此后新的 `get_active` 一律失败；移除方随后等待节点的一次性完成量，
//! 直到停用前取得的引用全部释放。

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::any::Any;
use core::fmt;
use core::sync::atomic::{AtomicI32, AtomicU32, AtomicU64, Ordering};

use sync::{Completion, RwLock, SpinLock};

use crate::config::KERNFS_DEACTIVATED_BIAS;
use crate::error::KernfsError;
use crate::file::{KernfsOpenFile, KernfsOps};
use crate::mode::{FileMode, NodeKind};
use crate::root::KernfsRoot;

/// 节点载荷的类型擦除形式（通常是登记表实体的弱引用）
pub type KernfsPriv = Arc<dyn Any + Send + Sync>;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct NodeFlags: u32 {
        /// 已激活，活动引用计数不含偏置
        const ACTIVATED = 0b01;
        /// 已开始移除
        const REMOVED   = 0b10;
    }
}

/// 节点时间戳（根的代数时钟）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeTimes {
    /// 状态改变时间
    pub ctime: u64,
    /// 内容（子项）修改时间
    pub mtime: u64,
}

/// 目录的子项集合
///
/// `by_id` 决定列目录顺序，`by_name` 用于按名查找；两者在结构锁下同步更新。
#[derive(Default)]
pub(crate) struct Children {
    pub(crate) by_id: BTreeMap<u64, Arc<KernfsNode>>,
    pub(crate) by_name: BTreeMap<String, u64>,
}

impl Children {
    pub(crate) fn get(&self, name: &str) -> Option<&Arc<KernfsNode>> {
        self.by_name.get(name).and_then(|id| self.by_id.get(id))
    }

    pub(crate) fn insert(&mut self, name: String, node: Arc<KernfsNode>) {
        self.by_name.insert(name, node.id());
        self.by_id.insert(node.id(), node);
    }

    pub(crate) fn remove(&mut self, name: &str, id: u64) -> Option<Arc<KernfsNode>> {
        if self.by_name.get(name) == Some(&id) {
            self.by_name.remove(name);
        }
        self.by_id.remove(&id)
    }
}

pub(crate) struct DirData {
    pub(crate) children: RwLock<Children>,
}

pub(crate) struct AttrData {
    pub(crate) ops: Arc<dyn KernfsOps>,
    /// 是否是二进制属性
    pub(crate) binary: bool,
    /// 二进制属性的大小，0 表示不限
    pub(crate) size: usize,
    /// 打开的文件句柄
    pub(crate) open: SpinLock<Vec<Weak<KernfsOpenFile>>>,
    /// 变更事件计数
    pub(crate) event: AtomicU64,
}

pub(crate) struct LinkData {
    pub(crate) target: Arc<KernfsNode>,
}

pub(crate) enum NodePayload {
    Dir(DirData),
    Attr(AttrData),
    Link(LinkData),
}

impl NodePayload {
    pub(crate) fn new_dir() -> Self {
        NodePayload::Dir(DirData {
            children: RwLock::new(Children::default()),
        })
    }

    pub(crate) fn new_attr(ops: Arc<dyn KernfsOps>, binary: bool, size: usize) -> Self {
        NodePayload::Attr(AttrData {
            ops,
            binary,
            size,
            open: SpinLock::new(Vec::new()),
            event: AtomicU64::new(1),
        })
    }

    pub(crate) fn new_link(target: Arc<KernfsNode>) -> Self {
        NodePayload::Link(LinkData { target })
    }
}

/// kernfs 节点
pub struct KernfsNode {
    id: u64,
    kind: NodeKind,
    mode: FileMode,
    name: RwLock<String>,
    parent: RwLock<Option<Arc<KernfsNode>>>,
    root: Weak<KernfsRoot>,
    active: AtomicI32,
    flags: AtomicU32,
    /// 停用后活动引用全部释放时完成
    drained: Completion,
    times: SpinLock<NodeTimes>,
    priv_data: Option<KernfsPriv>,
    pub(crate) payload: NodePayload,
}

/// 活动引用保护器，离开作用域时释放
pub struct ActiveRef<'a> {
    node: &'a KernfsNode,
}

impl ActiveRef<'_> {
    /// 持有活动引用的节点
    pub fn node(&self) -> &KernfsNode {
        self.node
    }
}

impl Drop for ActiveRef<'_> {
    fn drop(&mut self) {
        self.node.put_active();
    }
}

impl KernfsNode {
    pub(crate) fn new_raw(
        root: Weak<KernfsRoot>,
        id: u64,
        name: &str,
        mode: FileMode,
        payload: NodePayload,
        parent: Option<Arc<KernfsNode>>,
        priv_data: Option<KernfsPriv>,
    ) -> Self {
        let kind = match &payload {
            NodePayload::Dir(_) => NodeKind::Dir,
            NodePayload::Attr(a) if a.binary => NodeKind::BinAttr,
            NodePayload::Attr(_) => NodeKind::Attr,
            NodePayload::Link(_) => NodeKind::Link,
        };
        let stamp = root.upgrade().map(|r| r.generation()).unwrap_or(0);
        Self {
            id,
            kind,
            mode: mode.permissions() | kind.type_bits(),
            name: RwLock::new(name.to_string()),
            parent: RwLock::new(parent),
            root,
            active: AtomicI32::new(KERNFS_DEACTIVATED_BIAS),
            flags: AtomicU32::new(0),
            drained: Completion::new(),
            times: SpinLock::new(NodeTimes {
                ctime: stamp,
                mtime: stamp,
            }),
            priv_data,
            payload,
        }
    }

    /// 节点标识，单调分配，永不复用
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 节点类型
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// 权限和类型位
    pub fn mode(&self) -> FileMode {
        self.mode
    }

    /// 节点名
    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    pub(crate) fn set_name(&self, name: String) {
        *self.name.write() = name;
    }

    /// 父节点
    pub fn parent(&self) -> Option<Arc<KernfsNode>> {
        self.parent.read().clone()
    }

    pub(crate) fn set_parent(&self, parent: Arc<KernfsNode>) {
        *self.parent.write() = Some(parent);
    }

    /// 所属的根
    pub fn root(&self) -> Option<Arc<KernfsRoot>> {
        self.root.upgrade()
    }

    pub(crate) fn root_weak(&self) -> &Weak<KernfsRoot> {
        &self.root
    }

    /// 节点载荷（所属登记表实体）
    pub fn priv_data(&self) -> Option<&KernfsPriv> {
        self.priv_data.as_ref()
    }

    /// 时间戳
    pub fn times(&self) -> NodeTimes {
        *self.times.lock()
    }

    pub(crate) fn touch(&self, stamp: u64) {
        let mut t = self.times.lock();
        t.mtime = stamp;
        t.ctime = stamp;
    }

    /// 是否是目录
    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Dir
    }

    pub(crate) fn dir_data(&self) -> Result<&DirData, KernfsError> {
        match &self.payload {
            NodePayload::Dir(d) => Ok(d),
            _ => Err(KernfsError::NotDirectory),
        }
    }

    pub(crate) fn attr_data(&self) -> Option<&AttrData> {
        match &self.payload {
            NodePayload::Attr(a) => Some(a),
            _ => None,
        }
    }

    /// 符号链接的目标节点
    pub fn link_target(&self) -> Option<&Arc<KernfsNode>> {
        match &self.payload {
            NodePayload::Link(l) => Some(&l.target),
            _ => None,
        }
    }

    /// 属性文件的大小
    ///
    /// 文本属性报告一页，二进制属性报告声明的大小。
    pub fn size(&self) -> usize {
        match &self.payload {
            NodePayload::Attr(a) if self.kind == NodeKind::BinAttr => a.size,
            NodePayload::Attr(_) => crate::config::PAGE_SIZE,
            _ => 0,
        }
    }

    fn flags(&self) -> NodeFlags {
        NodeFlags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    /// 是否已开始移除
    pub fn is_removed(&self) -> bool {
        self.flags().contains(NodeFlags::REMOVED)
    }

    /// 是否可见：已激活且未移除
    pub fn is_active(&self) -> bool {
        let flags = self.flags();
        flags.contains(NodeFlags::ACTIVATED) && !flags.contains(NodeFlags::REMOVED)
    }

    /// 当前活动引用计数（停用后为负）
    pub fn active_count(&self) -> i32 {
        self.active.load(Ordering::Acquire)
    }

    /// 取得活动引用
    ///
    /// 计数为非负时原子地加一；节点已停用则返回 `None`。
    pub fn get_active(&self) -> Option<ActiveRef<'_>> {
        let mut v = self.active.load(Ordering::Relaxed);
        loop {
            if v < 0 {
                return None;
            }
            match self.active.compare_exchange_weak(
                v,
                v + 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(ActiveRef { node: self }),
                Err(cur) => v = cur,
            }
        }
    }

    fn put_active(&self) {
        let v = self.active.fetch_sub(1, Ordering::Release) - 1;
        if v == KERNFS_DEACTIVATED_BIAS {
            self.drained.complete();
        }
    }

    /// 只激活本节点，不处理子树
    pub(crate) fn activate_self(&self) {
        let prev = NodeFlags::from_bits_truncate(
            self.flags
                .fetch_or(NodeFlags::ACTIVATED.bits(), Ordering::AcqRel),
        );
        if prev.contains(NodeFlags::REMOVED) {
            // 移除已经开始，撤销
            self.flags
                .fetch_and(!NodeFlags::ACTIVATED.bits(), Ordering::AcqRel);
            return;
        }
        if !prev.contains(NodeFlags::ACTIVATED) {
            self.active
                .fetch_sub(KERNFS_DEACTIVATED_BIAS, Ordering::AcqRel);
        }
    }

    /// 激活以本节点为根的整棵子树
    ///
    /// 只在根带有 [`crate::RootFlags::CREATE_DEACTIVATED`] 时需要显式调用。
    pub fn activate(self: &Arc<Self>) {
        let Some(root) = self.root() else {
            return;
        };
        let _guard = root.lock_tree();
        for node in self.subtree_preorder() {
            node.activate_self();
        }
    }

    /// 标记为已移除并施加停用偏置，调用方必须持有结构锁
    pub(crate) fn mark_removed(&self) -> bool {
        let prev = NodeFlags::from_bits_truncate(
            self.flags.fetch_or(NodeFlags::REMOVED.bits(), Ordering::AcqRel),
        );
        if prev.contains(NodeFlags::REMOVED) {
            return false;
        }
        if prev.contains(NodeFlags::ACTIVATED) {
            self.flags
                .fetch_and(!NodeFlags::ACTIVATED.bits(), Ordering::AcqRel);
            self.active
                .fetch_add(KERNFS_DEACTIVATED_BIAS, Ordering::AcqRel);
        }
        true
    }

    /// 等待停用前取得的活动引用全部释放
    pub(crate) fn drain(&self) {
        if self.active.load(Ordering::Acquire) != KERNFS_DEACTIVATED_BIAS {
            log::trace!("kernfs: draining {} ({} in flight)", self.path(), {
                self.active.load(Ordering::Relaxed) - KERNFS_DEACTIVATED_BIAS
            });
            self.drained.wait();
        }
    }

    /// 前序遍历子树（含自身）
    pub(crate) fn subtree_preorder(self: &Arc<Self>) -> Vec<Arc<KernfsNode>> {
        let mut out = Vec::new();
        let mut stack = alloc::vec![self.clone()];
        while let Some(node) = stack.pop() {
            if let Ok(dir) = node.dir_data() {
                let children = dir.children.read();
                // 逆序压栈，保证按标识顺序访问
                for child in children.by_id.values().rev() {
                    stack.push(child.clone());
                }
            }
            out.push(node);
        }
        out
    }

    /// 子节点快照（包括未激活的）
    pub(crate) fn children_snapshot(&self) -> Vec<Arc<KernfsNode>> {
        match self.dir_data() {
            Ok(dir) => dir.children.read().by_id.values().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// 深度：根为 0
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut cur = self.parent();
        while let Some(p) = cur {
            depth += 1;
            cur = p.parent();
        }
        depth
    }

    /// 从根开始的绝对路径，根本身为 `/`
    pub fn path(&self) -> String {
        let mut names = Vec::new();
        if self.parent.read().is_some() {
            names.push(self.name());
        }
        let mut cur = self.parent();
        while let Some(p) = cur {
            if p.parent.read().is_some() {
                names.push(p.name());
            }
            cur = p.parent();
        }
        if names.is_empty() {
            return String::from("/");
        }
        let mut path = String::new();
        for name in names.iter().rev() {
            path.push('/');
            path.push_str(name);
        }
        path
    }

    /// `self` 是否是 `other` 本身或其祖先
    pub fn is_ancestor_of(&self, other: &KernfsNode) -> bool {
        if self.id == other.id && self.root.ptr_eq(&other.root) {
            return true;
        }
        let mut cur = other.parent();
        while let Some(p) = cur {
            if p.id == self.id {
                return true;
            }
            cur = p.parent();
        }
        false
    }

    /// 根被销毁时拆开整棵树，不等待活动引用
    pub(crate) fn teardown(&self) {
        let mut pending: Vec<Arc<KernfsNode>> = Vec::new();
        if let Ok(dir) = self.dir_data() {
            let mut children = dir.children.write();
            children.by_name.clear();
            pending.extend(core::mem::take(&mut children.by_id).into_values());
        }
        while let Some(node) = pending.pop() {
            node.mark_removed();
            if let Ok(dir) = node.dir_data() {
                let mut children = dir.children.write();
                children.by_name.clear();
                pending.extend(core::mem::take(&mut children.by_id).into_values());
            }
        }
        self.mark_removed();
    }
}

impl fmt::Debug for KernfsNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernfsNode")
            .field("id", &self.id)
            .field("name", &*self.name.read())
            .field("kind", &self.kind)
            .field("active", &self.active.load(Ordering::Relaxed))
            .finish()
    }
}
