//! 符号链接

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::error::KernfsError;
use crate::mode::FileMode;
use crate::node::{KernfsNode, NodePayload};

impl KernfsNode {
    /// 在本目录下创建指向 `target` 的符号链接
    ///
    /// 目标必须位于同一棵树中。链接持有目标节点的引用，但不持有活动引用。
    pub fn create_link(
        self: &Arc<Self>,
        name: &str,
        target: &Arc<KernfsNode>,
    ) -> Result<Arc<KernfsNode>, KernfsError> {
        self.link_with(name, target, true)
    }

    /// 创建符号链接，重名时静默返回 `AlreadyExists`
    pub fn create_link_nowarn(
        self: &Arc<Self>,
        name: &str,
        target: &Arc<KernfsNode>,
    ) -> Result<Arc<KernfsNode>, KernfsError> {
        self.link_with(name, target, false)
    }

    fn link_with(
        self: &Arc<Self>,
        name: &str,
        target: &Arc<KernfsNode>,
        warn: bool,
    ) -> Result<Arc<KernfsNode>, KernfsError> {
        if !self.root_weak().ptr_eq(target.root_weak()) {
            return Err(KernfsError::InvalidArgument);
        }
        let mode = FileMode::S_IFLNK | FileMode::perm(0o777);
        self.add_node_with(name, mode, NodePayload::new_link(target.clone()), None, warn)
    }

    /// 读取链接内容：从链接所在目录到目标的相对路径
    ///
    /// 先向上找到两者最近的公共祖先，每上升一级输出一个 `..`，
    /// 再从公共祖先向下拼接目标的各级名字。
    pub fn readlink(&self) -> Result<String, KernfsError> {
        let target = self.link_target().ok_or(KernfsError::InvalidArgument)?;
        let parent = self.parent().ok_or(KernfsError::NotFound)?;

        let mut base = parent.clone();
        let mut ups = 0usize;
        while !base.is_ancestor_of(target) {
            base = base.parent().ok_or(KernfsError::NotFound)?;
            ups += 1;
        }

        let mut names = Vec::new();
        let mut cur = target.clone();
        while cur.id() != base.id() {
            names.push(cur.name());
            cur = cur.parent().ok_or(KernfsError::NotFound)?;
        }

        let mut path = String::new();
        for _ in 0..ups {
            path.push_str("../");
        }
        for name in names.iter().rev() {
            path.push_str(name);
            path.push('/');
        }
        if path.is_empty() {
            return Ok(String::from("."));
        }
        path.pop();
        Ok(path)
    }
}
