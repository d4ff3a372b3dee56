//! 二进制属性的内存映射
//!
//! 载荷在 [`crate::KernfsOps::mmap`] 中通过 [`VmArea::set_ops`] 安装自己的 [`VmOps`]。
//! kernfs 把它包在 [`KernfsMapping`] 里，每次缺页或访问都先取得节点的活动引用，
//! 节点移除后映射上的一切操作都返回 [`KernfsError::Fault`]。

use alloc::sync::Arc;

use crate::error::KernfsError;
use crate::file::KernfsOpenFile;

/// 映射上的缺页与访问操作
pub trait VmOps: Send + Sync {
    /// 处理第 `pgoff` 页的缺页，返回提供该页的页帧号
    fn fault(&self, vma: &VmArea, pgoff: usize) -> Result<usize, KernfsError>;

    /// 直接访问映射内容（调试器等路径），返回访问的字节数
    fn access(
        &self,
        _vma: &VmArea,
        _offset: usize,
        _buf: &mut [u8],
        _write: bool,
    ) -> Result<usize, KernfsError> {
        Err(KernfsError::Fault)
    }
}

/// 一段映射区域的描述
pub struct VmArea {
    /// 起始页偏移
    pub pgoff: usize,
    /// 长度（字节）
    pub len: usize,
    /// 是否可写
    pub writable: bool,
    ops: Option<Arc<dyn VmOps>>,
}

impl VmArea {
    pub(crate) fn new(pgoff: usize, len: usize, writable: bool) -> Self {
        Self {
            pgoff,
            len,
            writable,
            ops: None,
        }
    }

    /// 安装缺页处理
    pub fn set_ops(&mut self, ops: Arc<dyn VmOps>) {
        self.ops = Some(ops);
    }

    /// 已安装的缺页处理
    pub fn ops(&self) -> Option<&Arc<dyn VmOps>> {
        self.ops.as_ref()
    }
}

/// 由 kernfs 守护的映射
pub struct KernfsMapping {
    file: Arc<KernfsOpenFile>,
    vma: VmArea,
}

impl KernfsMapping {
    pub(crate) fn new(file: Arc<KernfsOpenFile>, vma: VmArea) -> Self {
        Self { file, vma }
    }

    /// 映射区域
    pub fn vma(&self) -> &VmArea {
        &self.vma
    }

    /// 映射所属的打开句柄
    pub fn file(&self) -> &Arc<KernfsOpenFile> {
        &self.file
    }

    /// 缺页
    pub fn fault(&self, pgoff: usize) -> Result<usize, KernfsError> {
        let _active = self.file.node().get_active().ok_or(KernfsError::Fault)?;
        let ops = self.vma.ops().ok_or(KernfsError::Fault)?;
        ops.fault(&self.vma, pgoff)
    }

    /// 访问
    pub fn access(&self, offset: usize, buf: &mut [u8], write: bool) -> Result<usize, KernfsError> {
        if write && !self.vma.writable {
            return Err(KernfsError::PermissionDenied);
        }
        let _active = self.file.node().get_active().ok_or(KernfsError::Fault)?;
        let ops = self.vma.ops().ok_or(KernfsError::Fault)?;
        ops.access(&self.vma, offset, buf, write)
    }
}
