//! 挂载胶水
//!
//! [`KernfsMount`] 把一棵 kernfs 树当作文件系统暴露给上层：
//! 按路径查找（解析中间的符号链接）、取属性、打开、列目录、读链接。

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::config::SYMLINK_MAX_DEPTH;
use crate::dir::DirEntry;
use crate::error::KernfsError;
use crate::file::KernfsOpenFile;
use crate::mode::{FileMode, NodeKind, OpenFlags};
use crate::node::KernfsNode;
use crate::root::KernfsRoot;

/// 节点属性（stat 结果）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStat {
    /// 节点标识（inode 号）
    pub ino: u64,
    /// 节点类型
    pub kind: NodeKind,
    /// 权限和类型位
    pub mode: FileMode,
    /// 大小
    pub size: usize,
    /// 链接数：目录为 2 加子目录数，其他为 1
    pub nlink: usize,
    /// 状态改变时间（代数）
    pub ctime: u64,
    /// 修改时间（代数）
    pub mtime: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathComponent {
    Root,
    Current,
    Parent,
    Normal(String),
}

fn parse_path(path: &str) -> Vec<PathComponent> {
    let mut components = Vec::new();
    if path.starts_with('/') {
        components.push(PathComponent::Root);
    }
    for part in path.split('/') {
        match part {
            "" => {}
            "." => components.push(PathComponent::Current),
            ".." => components.push(PathComponent::Parent),
            name => components.push(PathComponent::Normal(String::from(name))),
        }
    }
    components
}

/// kernfs 挂载实例
pub struct KernfsMount {
    root: Arc<KernfsRoot>,
}

impl KernfsMount {
    /// 挂载一棵树
    pub fn new(root: Arc<KernfsRoot>) -> Self {
        Self { root }
    }

    /// 被挂载的树
    pub fn root(&self) -> &Arc<KernfsRoot> {
        &self.root
    }

    fn resolve_component(
        &self,
        base: Arc<KernfsNode>,
        component: &PathComponent,
    ) -> Result<Arc<KernfsNode>, KernfsError> {
        match component {
            PathComponent::Root => Ok(self.root.root().clone()),
            PathComponent::Current => Ok(base),
            // 根目录的父目录是自己
            PathComponent::Parent => Ok(base.parent().unwrap_or(base)),
            PathComponent::Normal(name) => base.find_child(name),
        }
    }

    /// 解析路径
    ///
    /// 中间的符号链接总是跟随，最后一个只在 `follow_last` 时跟随；
    /// 累计跟随超过 [`SYMLINK_MAX_DEPTH`] 次返回 `TooManySymlinks`。
    /// 相对路径从根目录开始解析。
    pub fn resolve(&self, path: &str, follow_last: bool) -> Result<Arc<KernfsNode>, KernfsError> {
        let mut components = parse_path(path);
        let mut current = self.root.root().clone();
        let mut i = 0usize;
        let mut symlink_depth = 0usize;

        while i < components.len() {
            let is_last = i + 1 == components.len();
            if !current.is_dir() && components[i] != PathComponent::Root {
                return Err(KernfsError::NotDirectory);
            }
            current = self.resolve_component(current, &components[i])?;

            if current.kind() == NodeKind::Link && (follow_last || !is_last) {
                if symlink_depth >= SYMLINK_MAX_DEPTH {
                    return Err(KernfsError::TooManySymlinks);
                }
                symlink_depth += 1;

                let target = current.readlink()?;
                current = current
                    .parent()
                    .unwrap_or_else(|| self.root.root().clone());

                let mut target_components = parse_path(&target);
                let mut remaining = components.split_off(i + 1);
                target_components.append(&mut remaining);
                components = target_components;
                i = 0;
                continue;
            }

            i += 1;
        }

        Ok(current)
    }

    /// 查找并跟随全部符号链接
    pub fn lookup(&self, path: &str) -> Result<Arc<KernfsNode>, KernfsError> {
        self.resolve(path, true)
    }

    /// 节点属性
    pub fn stat_node(node: &KernfsNode) -> NodeStat {
        let times = node.times();
        let nlink = match node.kind() {
            NodeKind::Dir => {
                2 + node
                    .children_snapshot()
                    .iter()
                    .filter(|c| c.is_dir() && c.is_active())
                    .count()
            }
            _ => 1,
        };
        NodeStat {
            ino: node.id(),
            kind: node.kind(),
            mode: node.mode(),
            size: node.size(),
            nlink,
            ctime: times.ctime,
            mtime: times.mtime,
        }
    }

    /// 跟随符号链接取属性
    pub fn stat(&self, path: &str) -> Result<NodeStat, KernfsError> {
        Ok(Self::stat_node(&*self.resolve(path, true)?))
    }

    /// 不跟随最后一个符号链接取属性
    pub fn lstat(&self, path: &str) -> Result<NodeStat, KernfsError> {
        Ok(Self::stat_node(&*self.resolve(path, false)?))
    }

    /// 打开属性文件
    pub fn open(&self, path: &str, flags: OpenFlags) -> Result<Arc<KernfsOpenFile>, KernfsError> {
        let node = self.resolve(path, true)?;
        KernfsOpenFile::open(&node, flags)
    }

    /// 列目录
    pub fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, KernfsError> {
        self.resolve(path, true)?.list()
    }

    /// 读取符号链接
    pub fn read_link(&self, path: &str) -> Result<String, KernfsError> {
        self.resolve(path, false)?.readlink()
    }
}
