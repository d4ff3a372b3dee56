//! 属性组
//!
//! 一个属性组是一批一起创建、一起移除的属性，可以带名字（放在同名子目录中）
//! 或不带名字（直接放在实体目录中）。创建是原子的：中途失败时只回滚本次调用
//! 创建的节点，之前已经存在的同名节点不受影响。
//!
//! 每个属性的增删都是一次独立的结构修改，并发的读者会看到组内属性逐个出现或消失。

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use kernfs::{FileMode, KernfsError, KernfsNode};

use crate::attr::{Attribute, BinAttribute, Entity};
use crate::file::{create_bin_file_mode, create_file_mode};

/// 可见性回调：返回 `None` 隐藏属性，否则返回要使用的权限
pub type IsVisibleFn = Arc<dyn Fn(&Entity, &Attribute, usize) -> Option<FileMode> + Send + Sync>;
/// 二进制属性的可见性回调
pub type IsBinVisibleFn =
    Arc<dyn Fn(&Entity, &BinAttribute, usize) -> Option<FileMode> + Send + Sync>;

/// 属性组
#[derive(Clone, Default)]
pub struct AttributeGroup {
    /// 子目录名，`None` 表示属性直接放在实体目录中
    pub name: Option<String>,
    /// 文本属性
    pub attrs: Vec<Attribute>,
    /// 二进制属性
    pub bin_attrs: Vec<BinAttribute>,
    /// 文本属性的可见性
    pub is_visible: Option<IsVisibleFn>,
    /// 二进制属性的可见性
    pub is_bin_visible: Option<IsBinVisibleFn>,
}

impl AttributeGroup {
    /// 由一组文本属性构成的无名组
    pub fn new(attrs: Vec<Attribute>) -> Self {
        Self {
            attrs,
            ..Default::default()
        }
    }

    /// 由一组文本属性构成的具名组
    pub fn named(name: &str, attrs: Vec<Attribute>) -> Self {
        Self {
            name: Some(String::from(name)),
            attrs,
            ..Default::default()
        }
    }

    /// 追加二进制属性
    pub fn with_bin_attrs(mut self, bin_attrs: Vec<BinAttribute>) -> Self {
        self.bin_attrs = bin_attrs;
        self
    }

    /// 设置文本属性的可见性回调
    pub fn with_visibility(
        mut self,
        f: impl Fn(&Entity, &Attribute, usize) -> Option<FileMode> + Send + Sync + 'static,
    ) -> Self {
        self.is_visible = Some(Arc::new(f));
        self
    }

    /// 设置二进制属性的可见性回调
    pub fn with_bin_visibility(
        mut self,
        f: impl Fn(&Entity, &BinAttribute, usize) -> Option<FileMode> + Send + Sync + 'static,
    ) -> Self {
        self.is_bin_visible = Some(Arc::new(f));
        self
    }

    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }
}

fn entity(dir: &KernfsNode) -> &Entity {
    match dir.priv_data() {
        Some(p) => &**p,
        None => &(),
    }
}

/// 在 `grp_dir` 中创建组内的属性，返回本次新建的节点
fn create_files(
    owner_dir: &Arc<KernfsNode>,
    grp_dir: &Arc<KernfsNode>,
    grp: &AttributeGroup,
    update: bool,
) -> Result<Vec<Arc<KernfsNode>>, KernfsError> {
    let owner = entity(owner_dir);
    let mut created = Vec::new();
    let mut result = Ok(());

    for (i, attr) in grp.attrs.iter().enumerate() {
        if update {
            // 更新时先移除旧的，可见性可能已经变化
            let _ = grp_dir.remove_by_name(&attr.name);
        }
        let mode = match &grp.is_visible {
            Some(f) => match f(owner, attr, i) {
                Some(mode) => mode,
                None => continue,
            },
            None => attr.mode,
        };
        match create_file_mode(grp_dir, attr, mode) {
            Ok(node) => created.push(node),
            Err(e) => {
                result = Err(e);
                break;
            }
        }
    }

    if result.is_ok() {
        for (i, attr) in grp.bin_attrs.iter().enumerate() {
            if update {
                let _ = grp_dir.remove_by_name(&attr.name);
            }
            let mode = match &grp.is_bin_visible {
                Some(f) => match f(owner, attr, i) {
                    Some(mode) => mode,
                    None => continue,
                },
                None => attr.mode,
            };
            match create_bin_file_mode(grp_dir, attr, mode) {
                Ok(node) => created.push(node),
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
    }

    match result {
        Ok(()) => Ok(created),
        Err(e) => {
            for node in created.iter().rev() {
                node.remove();
            }
            Err(e)
        }
    }
}

fn internal_create_group(
    dir: &Arc<KernfsNode>,
    grp: &AttributeGroup,
    update: bool,
) -> Result<(), KernfsError> {
    if grp.name.is_none() && grp.attrs.is_empty() && grp.bin_attrs.is_empty() {
        log::warn!("sysfs: attribute group without name or attributes");
        return Err(KernfsError::InvalidArgument);
    }

    let (grp_dir, new_dir) = match &grp.name {
        Some(name) if update => match dir.find_child(name) {
            Ok(d) => (d, false),
            Err(_) => {
                log::warn!(
                    "sysfs: cannot update unknown attribute group '{}' in {}",
                    name,
                    dir.path()
                );
                return Err(KernfsError::InvalidArgument);
            }
        },
        Some(name) => (
            dir.create_dir(
                name,
                FileMode::perm(crate::dir::DIR_MODE),
                dir.priv_data().cloned(),
            )?,
            true,
        ),
        None => (dir.clone(), false),
    };

    match create_files(dir, &grp_dir, grp, update) {
        Ok(_) => Ok(()),
        Err(e) => {
            if new_dir {
                grp_dir.remove();
            }
            Err(e)
        }
    }
}

/// 创建属性组
pub fn create_group(dir: &Arc<KernfsNode>, grp: &AttributeGroup) -> Result<(), KernfsError> {
    internal_create_group(dir, grp, false)
}

/// 更新属性组：按可见性回调的当前结果逐个移除并重新添加属性
///
/// 具名组必须已经存在。
pub fn update_group(dir: &Arc<KernfsNode>, grp: &AttributeGroup) -> Result<(), KernfsError> {
    internal_create_group(dir, grp, true)
}

/// 移除属性组
pub fn remove_group(dir: &Arc<KernfsNode>, grp: &AttributeGroup) {
    let grp_dir = match &grp.name {
        Some(name) => match dir.find_child(name) {
            Ok(d) => d,
            Err(_) => {
                log::warn!(
                    "sysfs: group '{}' not found for {}",
                    name,
                    dir.path()
                );
                return;
            }
        },
        None => dir.clone(),
    };

    for attr in &grp.attrs {
        let _ = grp_dir.remove_by_name(&attr.name);
    }
    for attr in &grp.bin_attrs {
        let _ = grp_dir.remove_by_name(&attr.name);
    }
    if grp.name.is_some() {
        grp_dir.remove();
    }
}

fn internal_create_groups(
    dir: &Arc<KernfsNode>,
    groups: &[AttributeGroup],
    update: bool,
) -> Result<(), KernfsError> {
    for (i, grp) in groups.iter().enumerate() {
        if let Err(e) = internal_create_group(dir, grp, update) {
            log::debug!(
                "sysfs: creating group {} in {} failed: {:?}",
                grp.label(),
                dir.path(),
                e
            );
            for done in groups[..i].iter().rev() {
                remove_group(dir, done);
            }
            return Err(e);
        }
    }
    Ok(())
}

/// 依次创建多个属性组，失败时移除已经创建的组
pub fn create_groups(dir: &Arc<KernfsNode>, groups: &[AttributeGroup]) -> Result<(), KernfsError> {
    internal_create_groups(dir, groups, false)
}

/// 依次更新多个属性组
pub fn update_groups(dir: &Arc<KernfsNode>, groups: &[AttributeGroup]) -> Result<(), KernfsError> {
    internal_create_groups(dir, groups, true)
}

/// 移除多个属性组
pub fn remove_groups(dir: &Arc<KernfsNode>, groups: &[AttributeGroup]) {
    for grp in groups.iter().rev() {
        remove_group(dir, grp);
    }
}

fn find_group_dir(dir: &Arc<KernfsNode>, grp: &AttributeGroup) -> Result<Arc<KernfsNode>, KernfsError> {
    let name = grp.name.as_deref().ok_or(KernfsError::InvalidArgument)?;
    dir.find_child(name)
}

/// 把组内属性合并到一个已经存在的具名组目录中
///
/// 不应用可见性回调，失败时移除本次合并进去的属性。
pub fn merge_group(dir: &Arc<KernfsNode>, grp: &AttributeGroup) -> Result<(), KernfsError> {
    let grp_dir = find_group_dir(dir, grp)?;
    let mut created = Vec::new();
    for attr in &grp.attrs {
        match create_file_mode(&grp_dir, attr, attr.mode) {
            Ok(node) => created.push(node),
            Err(e) => {
                for node in created.iter().rev() {
                    node.remove();
                }
                return Err(e);
            }
        }
    }
    Ok(())
}

/// 撤销 [`merge_group`]
pub fn unmerge_group(dir: &Arc<KernfsNode>, grp: &AttributeGroup) {
    if let Ok(grp_dir) = find_group_dir(dir, grp) {
        for attr in &grp.attrs {
            let _ = grp_dir.remove_by_name(&attr.name);
        }
    }
}

/// 在具名组目录中创建指向 `target` 的链接
pub fn add_link_to_group(
    dir: &Arc<KernfsNode>,
    group: &str,
    target: &Arc<KernfsNode>,
    link_name: &str,
) -> Result<Arc<KernfsNode>, KernfsError> {
    let grp_dir = dir.find_child(group)?;
    grp_dir.create_link(link_name, target)
}

/// 移除具名组目录中的链接
pub fn remove_link_from_group(dir: &Arc<KernfsNode>, group: &str, link_name: &str) {
    if let Ok(grp_dir) = dir.find_child(group) {
        crate::symlink::remove_link(&grp_dir, link_name);
    }
}
