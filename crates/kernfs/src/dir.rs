//! 目录操作
//!
//! 新节点在结构锁下分配标识并按标识顺序插入父目录，列目录顺序即标识顺序，
//! 因此从某个标识重新开始的列举既不会重复也不会跳过仍然存在的项。

use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::config::NAME_MAX;
use crate::error::KernfsError;
use crate::mode::{FileMode, NodeKind};
use crate::node::{KernfsNode, KernfsPriv, NodePayload};

/// 轻量级目录项（readdir 返回）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// 文件名
    pub name: String,
    /// 节点标识
    pub id: u64,
    /// 节点类型
    pub kind: NodeKind,
}

/// 检查节点名是否合法
pub(crate) fn validate_name(name: &str) -> Result<(), KernfsError> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(KernfsError::InvalidArgument);
    }
    if name.len() > NAME_MAX {
        return Err(KernfsError::NameTooLong);
    }
    Ok(())
}

impl KernfsNode {
    /// 在本目录下新建节点并链接到兄弟集合中
    pub(crate) fn add_node(
        self: &Arc<Self>,
        name: &str,
        mode: FileMode,
        payload: NodePayload,
        priv_data: Option<KernfsPriv>,
    ) -> Result<Arc<KernfsNode>, KernfsError> {
        self.add_node_with(name, mode, payload, priv_data, true)
    }

    /// 同 [`KernfsNode::add_node`]，`warn` 为假时重名不记录错误日志
    pub(crate) fn add_node_with(
        self: &Arc<Self>,
        name: &str,
        mode: FileMode,
        payload: NodePayload,
        priv_data: Option<KernfsPriv>,
        warn: bool,
    ) -> Result<Arc<KernfsNode>, KernfsError> {
        validate_name(name)?;
        let root = self.root().ok_or(KernfsError::NotFound)?;
        let dir = self.dir_data()?;

        let _guard = root.lock_tree();
        if self.is_removed() {
            return Err(KernfsError::NotFound);
        }
        let mut children = dir.children.write();
        if children.get(name).is_some() {
            drop(children);
            if !warn {
                return Err(KernfsError::AlreadyExists);
            }
            log::error!(
                "kernfs: cannot create duplicate filename '{}/{}'",
                self.path().trim_end_matches('/'),
                name
            );
            return Err(KernfsError::AlreadyExists);
        }

        let id = root.alloc_id();
        let node = Arc::new(KernfsNode::new_raw(
            self.root_weak().clone(),
            id,
            name,
            mode,
            payload,
            Some(self.clone()),
            priv_data,
        ));
        children.insert(name.to_string(), node.clone());
        drop(children);
        self.touch(root.tick());

        if !root
            .flags()
            .contains(crate::root::RootFlags::CREATE_DEACTIVATED)
        {
            node.activate_self();
        }
        Ok(node)
    }

    /// 创建子目录
    pub fn create_dir(
        self: &Arc<Self>,
        name: &str,
        mode: FileMode,
        priv_data: Option<KernfsPriv>,
    ) -> Result<Arc<KernfsNode>, KernfsError> {
        self.add_node(name, mode, NodePayload::new_dir(), priv_data)
    }

    /// 按名查找可见的子节点
    pub fn find_child(&self, name: &str) -> Result<Arc<KernfsNode>, KernfsError> {
        let dir = self.dir_data()?;
        let children = dir.children.read();
        match children.get(name) {
            Some(node) if node.is_active() => Ok(node.clone()),
            _ => Err(KernfsError::NotFound),
        }
    }

    /// 按名查找子节点，不论是否可见
    pub(crate) fn find_child_any(&self, name: &str) -> Option<Arc<KernfsNode>> {
        let dir = self.dir_data().ok()?;
        dir.children.read().get(name).cloned()
    }

    /// 按相对路径逐级查找，不跟随符号链接
    pub fn find_by_path(self: &Arc<Self>, path: &str) -> Result<Arc<KernfsNode>, KernfsError> {
        let mut cur = self.clone();
        for comp in path.split('/').filter(|c| !c.is_empty() && *c != ".") {
            let next = if comp == ".." {
                cur.parent().unwrap_or_else(|| cur.clone())
            } else {
                cur.find_child(comp)?
            };
            cur = next;
        }
        Ok(cur)
    }

    /// 从标识 `pos` 开始列出最多 `max` 个可见子项
    pub fn readdir(&self, pos: u64, max: usize) -> Result<Vec<DirEntry>, KernfsError> {
        let dir = self.dir_data()?;
        let children = dir.children.read();
        Ok(children
            .by_id
            .range(pos..)
            .map(|(_, node)| node)
            .filter(|node| node.is_active())
            .take(max)
            .map(|node| DirEntry {
                name: node.name(),
                id: node.id(),
                kind: node.kind(),
            })
            .collect())
    }

    /// 列出全部可见子项
    pub fn list(&self) -> Result<Vec<DirEntry>, KernfsError> {
        self.readdir(0, usize::MAX)
    }

    /// 创建可以跨越并发修改逐项推进的目录游标
    pub fn dir_cursor(self: &Arc<Self>, pos: u64) -> Result<DirCursor, KernfsError> {
        self.dir_data()?;
        Ok(DirCursor {
            dir: self.clone(),
            pos,
        })
    }

    /// 移除本节点及其整棵子树
    ///
    /// 先在结构锁下把子树标记为已移除并施加停用偏置，
    /// 然后在锁外等待每个节点的在途活动引用释放，最后在锁下解除链接。
    /// 同一个节点的并发移除只有第一个调用者生效。
    ///
    /// 在持有本子树中任一节点的活动引用时调用会死锁。
    pub fn remove(self: &Arc<Self>) {
        let Some(root) = self.root() else {
            return;
        };
        if self.parent().is_none() {
            log::warn!("kernfs: refusing to remove the root directory");
            return;
        }

        let nodes = {
            let _guard = root.lock_tree();
            if self.is_removed() {
                return;
            }
            let mut nodes = self.subtree_preorder();
            // 子节点排在祖先之前
            nodes.reverse();
            for node in &nodes {
                node.mark_removed();
            }
            nodes
        };

        for node in &nodes {
            node.drain();
        }

        {
            let _guard = root.lock_tree();
            let stamp = root.tick();
            for node in &nodes {
                if let Some(parent) = node.parent() {
                    if let Ok(dir) = parent.dir_data() {
                        dir.children.write().remove(&node.name(), node.id());
                    }
                    parent.touch(stamp);
                }
            }
        }

        for node in &nodes {
            node.release_open_files();
        }
        log::trace!("kernfs: removed {} ({} nodes)", self.path(), nodes.len());
    }

    /// 按名移除子节点
    pub fn remove_by_name(self: &Arc<Self>, name: &str) -> Result<(), KernfsError> {
        let node = self.find_child_any(name).ok_or(KernfsError::NotFound)?;
        if node.is_removed() {
            return Err(KernfsError::NotFound);
        }
        node.remove();
        Ok(())
    }

    /// 重命名或移动节点，标识保持不变
    pub fn rename(
        self: &Arc<Self>,
        new_parent: &Arc<KernfsNode>,
        new_name: &str,
    ) -> Result<(), KernfsError> {
        validate_name(new_name)?;
        let root = self.root().ok_or(KernfsError::NotFound)?;
        let new_dir = new_parent.dir_data()?;
        let old_parent = self.parent().ok_or(KernfsError::InvalidArgument)?;

        let _guard = root.lock_tree();
        if self.is_removed() || new_parent.is_removed() {
            return Err(KernfsError::NotFound);
        }
        if !new_parent.root_weak().ptr_eq(self.root_weak()) || self.is_ancestor_of(new_parent) {
            return Err(KernfsError::InvalidArgument);
        }
        let old_name = self.name();
        if Arc::ptr_eq(&old_parent, new_parent) && old_name == new_name {
            return Ok(());
        }
        if new_dir.children.read().get(new_name).is_some() {
            log::error!(
                "kernfs: cannot rename to duplicate filename '{}/{}'",
                new_parent.path().trim_end_matches('/'),
                new_name
            );
            return Err(KernfsError::AlreadyExists);
        }

        let old_dir = old_parent.dir_data()?;
        old_dir.children.write().remove(&old_name, self.id());
        self.set_name(new_name.to_string());
        self.set_parent(new_parent.clone());
        new_dir
            .children
            .write()
            .insert(new_name.to_string(), self.clone());

        let stamp = root.tick();
        old_parent.touch(stamp);
        new_parent.touch(stamp);
        self.touch(stamp);
        Ok(())
    }
}

/// 目录游标
///
/// 每次 [`DirCursor::next`] 都重新加读锁，找到标识不小于当前位置的第一个可见子项，
/// 之后把位置推进到该标识之后。
pub struct DirCursor {
    dir: Arc<KernfsNode>,
    pos: u64,
}

impl DirCursor {
    /// 下一次列举将从这个标识开始
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// 把游标移动到指定标识
    pub fn seek(&mut self, pos: u64) {
        self.pos = pos;
    }
}

impl Iterator for DirCursor {
    type Item = DirEntry;

    fn next(&mut self) -> Option<DirEntry> {
        let dir = self.dir.dir_data().ok()?;
        let children = dir.children.read();
        let node = children
            .by_id
            .range(self.pos..)
            .map(|(_, node)| node)
            .find(|node| node.is_active())?;
        self.pos = node.id() + 1;
        Some(DirEntry {
            name: node.name(),
            id: node.id(),
            kind: node.kind(),
        })
    }
}
