//! SysFS 挂载外观

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use kernfs::{
    DirEntry, KernfsError, KernfsMount, KernfsNode, KernfsRoot, NodeStat, OpenFlags, RootFlags,
};

/// 一棵 sysfs 树及其挂载
pub struct SysFS {
    mount: KernfsMount,
}

impl SysFS {
    /// 创建空的 sysfs 树
    pub fn new() -> Self {
        Self::with_flags(RootFlags::empty())
    }

    /// 以指定的根标志创建
    pub fn with_flags(flags: RootFlags) -> Self {
        Self {
            mount: KernfsMount::new(KernfsRoot::new(flags, None)),
        }
    }

    /// 根
    pub fn kernfs_root(&self) -> &Arc<KernfsRoot> {
        self.mount.root()
    }

    /// 根目录
    pub fn root_dir(&self) -> &Arc<KernfsNode> {
        self.mount.root().root()
    }

    /// 挂载胶水
    pub fn mount(&self) -> &KernfsMount {
        &self.mount
    }

    /// 按路径查找（跟随符号链接）
    pub fn lookup(&self, path: &str) -> Result<Arc<KernfsNode>, KernfsError> {
        self.mount.lookup(path)
    }

    /// 取属性
    pub fn stat(&self, path: &str) -> Result<NodeStat, KernfsError> {
        self.mount.stat(path)
    }

    /// 列目录，只返回名字
    pub fn list(&self, path: &str) -> Result<Vec<String>, KernfsError> {
        Ok(self
            .mount
            .read_dir(path)?
            .into_iter()
            .map(|e: DirEntry| e.name)
            .collect())
    }

    /// 读取链接
    pub fn read_link(&self, path: &str) -> Result<String, KernfsError> {
        self.mount.read_link(path)
    }

    /// 读取整个文本属性
    pub fn read_to_string(&self, path: &str) -> Result<String, KernfsError> {
        let of = self.mount.open(path, OpenFlags::READ)?;
        let mut out = Vec::new();
        let mut buf = [0u8; 512];
        loop {
            let n = of.read(&mut buf)?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        String::from_utf8(out).map_err(|_| KernfsError::IoError)
    }

    /// 向属性写入一次，返回消耗的字节数
    pub fn write(&self, path: &str, data: &[u8]) -> Result<usize, KernfsError> {
        let of = self.mount.open(path, OpenFlags::WRITE)?;
        of.write(data)
    }
}

impl Default for SysFS {
    fn default() -> Self {
        Self::new()
    }
}
