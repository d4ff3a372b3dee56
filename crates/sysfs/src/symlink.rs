//! 实体之间的符号链接

use alloc::sync::Arc;

use kernfs::{KernfsError, KernfsNode, NodeKind};

/// 在 `dir` 下创建名为 `name`、指向 `target` 的链接
pub fn create_link(
    dir: &Arc<KernfsNode>,
    target: &Arc<KernfsNode>,
    name: &str,
) -> Result<Arc<KernfsNode>, KernfsError> {
    dir.create_link(name, target)
}

/// 同 [`create_link`]，重名时不记录错误
pub fn create_link_nowarn(
    dir: &Arc<KernfsNode>,
    target: &Arc<KernfsNode>,
    name: &str,
) -> Result<Arc<KernfsNode>, KernfsError> {
    dir.create_link_nowarn(name, target)
}

/// 移除链接，链接不存在时什么也不做
pub fn remove_link(dir: &Arc<KernfsNode>, name: &str) {
    if let Ok(node) = dir.find_child(name) {
        if node.kind() == NodeKind::Link {
            node.remove();
        }
    }
}

/// 重命名指向 `target` 的链接
///
/// 原名对应的节点不是指向 `target` 的链接时返回 `InvalidArgument`。
pub fn rename_link(
    dir: &Arc<KernfsNode>,
    target: &Arc<KernfsNode>,
    old_name: &str,
    new_name: &str,
) -> Result<(), KernfsError> {
    let link = dir.find_child(old_name)?;
    match link.link_target() {
        Some(t) if Arc::ptr_eq(t, target) => link.rename(dir, new_name),
        _ => Err(KernfsError::InvalidArgument),
    }
}
