//! 属性文件

use alloc::sync::Arc;

use kernfs::{KernfsError, KernfsNode};

use crate::attr::{AttrOps, Attribute, BinAttrOps, BinAttribute};

/// 在实体目录 `dir` 下创建文本属性
pub fn create_file(dir: &Arc<KernfsNode>, attr: &Attribute) -> Result<Arc<KernfsNode>, KernfsError> {
    create_file_mode(dir, attr, attr.mode)
}

/// 以指定权限创建文本属性
pub(crate) fn create_file_mode(
    dir: &Arc<KernfsNode>,
    attr: &Attribute,
    mode: kernfs::FileMode,
) -> Result<Arc<KernfsNode>, KernfsError> {
    dir.create_file(
        &attr.name,
        mode,
        AttrOps::new(attr.clone()),
        dir.priv_data().cloned(),
    )
}

/// 在实体目录 `dir` 下创建二进制属性
pub fn create_bin_file(
    dir: &Arc<KernfsNode>,
    attr: &BinAttribute,
) -> Result<Arc<KernfsNode>, KernfsError> {
    create_bin_file_mode(dir, attr, attr.mode)
}

pub(crate) fn create_bin_file_mode(
    dir: &Arc<KernfsNode>,
    attr: &BinAttribute,
    mode: kernfs::FileMode,
) -> Result<Arc<KernfsNode>, KernfsError> {
    dir.create_bin_file(
        &attr.name,
        mode,
        attr.size,
        BinAttrOps::new(attr.clone()),
        dir.priv_data().cloned(),
    )
}

/// 移除属性文件，文件不存在时什么也不做
pub fn remove_file(dir: &Arc<KernfsNode>, name: &str) {
    let _ = dir.remove_by_name(name);
}

/// 通知属性内容变化
///
/// `group` 给出时在同名的子目录中查找属性。属性不存在时静默忽略。
pub fn notify(dir: &Arc<KernfsNode>, group: Option<&str>, attr: &str) {
    let parent = match group {
        Some(g) => match dir.find_child(g) {
            Ok(d) => d,
            Err(_) => return,
        },
        None => dir.clone(),
    };
    if let Ok(node) = parent.find_child(attr) {
        node.notify();
    }
}
