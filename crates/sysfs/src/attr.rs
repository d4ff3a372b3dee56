//! 属性描述与 kernfs 载荷适配
//!
//! [`Attribute`] 和 [`BinAttribute`] 是登记表实体声明属性的方式。
//! 回调的第一个参数是属性所属的实体，即属性所在目录的 `priv`（没有时为 `&()`），
//! 调用方按自己存进去的类型向下转型。

use alloc::string::String;
use alloc::sync::Arc;
use core::any::Any;
use core::fmt;

use kernfs::{FileMode, KernfsError, KernfsOpenFile, KernfsOps, OpsFlags, VmArea};

/// 属性所属的实体
pub type Entity = dyn Any + Send + Sync;

/// 文本属性的 show 回调
pub type ShowFn = Arc<dyn Fn(&Entity, &mut String) -> Result<(), KernfsError> + Send + Sync>;
/// 文本属性的 store 回调，返回消耗的字节数
pub type StoreFn = Arc<dyn Fn(&Entity, &[u8]) -> Result<usize, KernfsError> + Send + Sync>;
/// 二进制属性的读回调
pub type BinReadFn =
    Arc<dyn Fn(&Entity, usize, &mut [u8]) -> Result<usize, KernfsError> + Send + Sync>;
/// 二进制属性的写回调
pub type BinWriteFn = Arc<dyn Fn(&Entity, usize, &[u8]) -> Result<usize, KernfsError> + Send + Sync>;
/// 二进制属性的映射回调
pub type BinMmapFn = Arc<dyn Fn(&Entity, &mut VmArea) -> Result<(), KernfsError> + Send + Sync>;

/// 文本属性
#[derive(Clone)]
pub struct Attribute {
    /// 文件名
    pub name: String,
    /// 权限位
    pub mode: FileMode,
    /// 读回调
    pub show: Option<ShowFn>,
    /// 写回调
    pub store: Option<StoreFn>,
}

impl Attribute {
    /// 创建没有回调的属性
    pub fn new(name: &str, mode: FileMode) -> Self {
        Self {
            name: String::from(name),
            mode,
            show: None,
            store: None,
        }
    }

    /// 设置读回调
    pub fn with_show(
        mut self,
        show: impl Fn(&Entity, &mut String) -> Result<(), KernfsError> + Send + Sync + 'static,
    ) -> Self {
        self.show = Some(Arc::new(show));
        self
    }

    /// 设置写回调
    pub fn with_store(
        mut self,
        store: impl Fn(&Entity, &[u8]) -> Result<usize, KernfsError> + Send + Sync + 'static,
    ) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// 只读属性（0444）
    pub fn ro(
        name: &str,
        show: impl Fn(&Entity, &mut String) -> Result<(), KernfsError> + Send + Sync + 'static,
    ) -> Self {
        Self::new(name, FileMode::perm(0o444)).with_show(show)
    }

    /// 只写属性（0200）
    pub fn wo(
        name: &str,
        store: impl Fn(&Entity, &[u8]) -> Result<usize, KernfsError> + Send + Sync + 'static,
    ) -> Self {
        Self::new(name, FileMode::perm(0o200)).with_store(store)
    }

    /// 读写属性（0644）
    pub fn rw(
        name: &str,
        show: impl Fn(&Entity, &mut String) -> Result<(), KernfsError> + Send + Sync + 'static,
        store: impl Fn(&Entity, &[u8]) -> Result<usize, KernfsError> + Send + Sync + 'static,
    ) -> Self {
        Self::new(name, FileMode::perm(0o644))
            .with_show(show)
            .with_store(store)
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .finish()
    }
}

/// 二进制属性
#[derive(Clone)]
pub struct BinAttribute {
    /// 文件名
    pub name: String,
    /// 权限位
    pub mode: FileMode,
    /// 大小，0 表示不限
    pub size: usize,
    /// 读回调
    pub read: Option<BinReadFn>,
    /// 写回调
    pub write: Option<BinWriteFn>,
    /// 映射回调
    pub mmap: Option<BinMmapFn>,
}

impl BinAttribute {
    /// 创建没有回调的二进制属性
    pub fn new(name: &str, mode: FileMode, size: usize) -> Self {
        Self {
            name: String::from(name),
            mode,
            size,
            read: None,
            write: None,
            mmap: None,
        }
    }

    /// 设置读回调
    pub fn with_read(
        mut self,
        read: impl Fn(&Entity, usize, &mut [u8]) -> Result<usize, KernfsError> + Send + Sync + 'static,
    ) -> Self {
        self.read = Some(Arc::new(read));
        self
    }

    /// 设置写回调
    pub fn with_write(
        mut self,
        write: impl Fn(&Entity, usize, &[u8]) -> Result<usize, KernfsError> + Send + Sync + 'static,
    ) -> Self {
        self.write = Some(Arc::new(write));
        self
    }

    /// 设置映射回调
    pub fn with_mmap(
        mut self,
        mmap: impl Fn(&Entity, &mut VmArea) -> Result<(), KernfsError> + Send + Sync + 'static,
    ) -> Self {
        self.mmap = Some(Arc::new(mmap));
        self
    }
}

impl fmt::Debug for BinAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinAttribute")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("size", &self.size)
            .finish()
    }
}

/// 打开句柄所属的实体
fn owner(of: &KernfsOpenFile) -> &Entity {
    match of.priv_data() {
        Some(p) => &**p,
        None => &(),
    }
}

/// 把 [`Attribute`] 适配为 kernfs 载荷
pub(crate) struct AttrOps {
    attr: Attribute,
}

impl AttrOps {
    pub(crate) fn new(attr: Attribute) -> Arc<Self> {
        Arc::new(Self { attr })
    }
}

impl KernfsOps for AttrOps {
    fn capabilities(&self) -> OpsFlags {
        let mut caps = OpsFlags::empty();
        if self.attr.show.is_some() {
            caps |= OpsFlags::SEQ_SHOW;
        }
        if self.attr.store.is_some() {
            caps |= OpsFlags::WRITE;
        }
        caps
    }

    fn seq_show(&self, of: &KernfsOpenFile, buf: &mut String) -> Result<(), KernfsError> {
        let show = self.attr.show.as_ref().ok_or(KernfsError::IoError)?;
        show(owner(of), buf)
    }

    fn write(&self, of: &KernfsOpenFile, _offset: usize, data: &[u8]) -> Result<usize, KernfsError> {
        let store = self.attr.store.as_ref().ok_or(KernfsError::IoError)?;
        store(owner(of), data)
    }
}

/// 把 [`BinAttribute`] 适配为 kernfs 载荷
pub(crate) struct BinAttrOps {
    attr: BinAttribute,
}

impl BinAttrOps {
    pub(crate) fn new(attr: BinAttribute) -> Arc<Self> {
        Arc::new(Self { attr })
    }
}

impl KernfsOps for BinAttrOps {
    fn capabilities(&self) -> OpsFlags {
        let mut caps = OpsFlags::empty();
        if self.attr.read.is_some() {
            caps |= OpsFlags::READ;
        }
        if self.attr.write.is_some() {
            caps |= OpsFlags::WRITE;
        }
        if self.attr.mmap.is_some() {
            caps |= OpsFlags::MMAP;
        }
        caps
    }

    fn read(&self, of: &KernfsOpenFile, offset: usize, buf: &mut [u8]) -> Result<usize, KernfsError> {
        let read = self.attr.read.as_ref().ok_or(KernfsError::IoError)?;
        read(owner(of), offset, buf)
    }

    fn write(&self, of: &KernfsOpenFile, offset: usize, data: &[u8]) -> Result<usize, KernfsError> {
        let write = self.attr.write.as_ref().ok_or(KernfsError::IoError)?;
        write(owner(of), offset, data)
    }

    fn mmap(&self, of: &KernfsOpenFile, vma: &mut VmArea) -> Result<(), KernfsError> {
        let mmap = self.attr.mmap.as_ref().ok_or(KernfsError::NoDevice)?;
        mmap(owner(of), vma)
    }
}
