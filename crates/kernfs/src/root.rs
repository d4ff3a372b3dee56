//! kernfs 层次结构的根
//!
//! [`KernfsRoot`] 持有根目录节点、结构锁、标识分配器和代数时钟。
//! 同一棵树上的所有结构性修改（插入、移除、重命名）都在结构锁下串行进行，
//! 该锁绝不会跨越载荷回调持有。

use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::any::Any;
use core::sync::atomic::{AtomicU64, Ordering};

use sync::{SpinLock, SpinLockGuard};

use crate::config::ROOT_ID;
use crate::mode::FileMode;
use crate::node::{KernfsNode, NodePayload};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// 根的创建标志
    pub struct RootFlags: u32 {
        /// 新节点在显式调用 [`KernfsNode::activate`] 之前对查找和列目录不可见
        const CREATE_DEACTIVATED = 0b01;
    }
}

/// kernfs 层次结构的根
pub struct KernfsRoot {
    flags: RootFlags,
    /// 结构锁
    tree_lock: SpinLock<()>,
    /// 下一个节点标识
    next_id: AtomicU64,
    /// 代数时钟，每次结构修改推进一次，用作节点时间戳
    generation: AtomicU64,
    root: Arc<KernfsNode>,
}

impl KernfsRoot {
    /// 创建新的层次结构
    ///
    /// `priv_data` 成为根目录的载荷。根目录总是处于激活状态。
    pub fn new(flags: RootFlags, priv_data: Option<Arc<dyn Any + Send + Sync>>) -> Arc<Self> {
        let root = Arc::new_cyclic(|weak: &Weak<KernfsRoot>| {
            let mode = FileMode::S_IFDIR | FileMode::perm(0o755);
            let node = KernfsNode::new_raw(
                weak.clone(),
                ROOT_ID,
                "",
                mode,
                NodePayload::new_dir(),
                None,
                priv_data,
            );
            KernfsRoot {
                flags,
                tree_lock: SpinLock::new(()),
                next_id: AtomicU64::new(ROOT_ID + 1),
                generation: AtomicU64::new(0),
                root: Arc::new(node),
            }
        });
        root.root.activate_self();
        log::debug!("kernfs: new root (flags={:?})", flags);
        root
    }

    /// 根目录节点
    pub fn root(&self) -> &Arc<KernfsNode> {
        &self.root
    }

    /// 创建标志
    pub fn flags(&self) -> RootFlags {
        self.flags
    }

    /// 当前代数
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// 移除根目录下的全部内容
    ///
    /// 与单个节点的移除一样，会等待所有在途的活动引用释放。
    pub fn destroy(&self) {
        let children: Vec<Arc<KernfsNode>> = self.root.children_snapshot();
        for child in children {
            child.remove();
        }
    }

    pub(crate) fn lock_tree(&self) -> SpinLockGuard<'_, ()> {
        self.tree_lock.lock()
    }

    /// 分配下一个节点标识，调用方必须持有结构锁
    pub(crate) fn alloc_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::AcqRel)
    }

    /// 推进代数时钟并返回新值
    pub(crate) fn tick(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }
}

impl Drop for KernfsRoot {
    fn drop(&mut self) {
        // 父子之间互相持有强引用，这里把整棵树拆开
        self.root.teardown();
    }
}
