//! 实体目录

use alloc::sync::Arc;

use kernfs::{FileMode, KernfsError, KernfsNode, KernfsPriv};

/// 实体目录的默认权限
pub const DIR_MODE: u32 = 0o755;

/// 在 `parent` 下为实体创建目录
///
/// `priv_data` 是实体本身（通常是弱引用），该目录下属性的回调都会收到它。
pub fn create_dir(
    parent: &Arc<KernfsNode>,
    name: &str,
    priv_data: Option<KernfsPriv>,
) -> Result<Arc<KernfsNode>, KernfsError> {
    parent.create_dir(name, FileMode::perm(DIR_MODE), priv_data)
}

/// 移除实体目录及其全部内容
///
/// 返回时所有在途的 show/store 回调都已结束。
pub fn remove_dir(dir: &Arc<KernfsNode>) {
    log::trace!("sysfs: removing {}", dir.path());
    dir.remove();
}

/// 重命名或移动实体目录
pub fn rename_dir(
    dir: &Arc<KernfsNode>,
    new_parent: &Arc<KernfsNode>,
    new_name: &str,
) -> Result<(), KernfsError> {
    dir.rename(new_parent, new_name)
}
