//! # sysfs：设备模型的属性投影层
//!
//! 在 [`kernfs`] 之上提供登记表实体使用的接口：
//!
//! - 实体目录：[`create_dir`]、[`remove_dir`]、[`rename_dir`]
//! - 属性文件：[`Attribute`]、[`BinAttribute`]、[`create_file`]、[`notify`] 等
//! - 符号链接：[`create_link`]、[`rename_link`] 等
//! - 属性组：[`AttributeGroup`] 及其创建、更新、合并和移除
//! - [`SysFS`]：持有 kernfs 根并提供挂载胶水
//!
//! 属性回调收到的实体就是属性所在目录创建时传入的 `priv`。

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

mod attr;
mod dir;
mod file;
mod group;
mod symlink;
mod sysfs;

pub use attr::{
    Attribute, BinAttribute, BinMmapFn, BinReadFn, BinWriteFn, Entity, ShowFn, StoreFn,
};
pub use dir::{DIR_MODE, create_dir, remove_dir, rename_dir};
pub use file::{create_bin_file, create_file, notify, remove_file};
pub use group::{
    AttributeGroup, IsBinVisibleFn, IsVisibleFn, add_link_to_group, create_group, create_groups,
    merge_group, remove_group, remove_groups, remove_link_from_group, unmerge_group, update_group,
    update_groups,
};
pub use symlink::{create_link, create_link_nowarn, remove_link, rename_link};
pub use sysfs::SysFS;

pub use kernfs::{FileMode, KernfsError, KernfsNode, KernfsPriv};

#[cfg(test)]
mod tests;
