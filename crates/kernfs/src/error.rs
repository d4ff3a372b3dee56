//! kernfs 错误类型
//!
//! 定义了与 POSIX 兼容的错误码，可通过 [`KernfsError::to_errno()`] 转换为系统调用错误码。

/// kernfs 错误类型
///
/// 各错误码对应标准 POSIX errno 值。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernfsError {
    // 节点相关
    /// 节点不存在或已被停用 (-ENOENT)
    NotFound,
    /// 同名节点已存在 (-EEXIST)
    AlreadyExists,
    /// 不是目录 (-ENOTDIR)
    NotDirectory,
    /// 是目录 (-EISDIR)
    IsDirectory,

    // 资源相关
    /// 资源忙 (-EBUSY)
    Busy,
    /// 内存不足 (-ENOMEM)
    NoMemory,

    // 权限相关
    /// 权限被拒绝 (-EACCES)
    PermissionDenied,

    // 参数相关
    /// 无效参数 (-EINVAL)
    InvalidArgument,
    /// 文件名过长 (-ENAMETOOLONG)
    NameTooLong,
    /// 写入超出文件大小 (-EFBIG)
    FileTooBig,

    // 载荷相关
    /// 载荷拒绝处理请求 (-EIO)
    IoError,
    /// 设备不存在或不支持该映射 (-ENODEV)
    NoDevice,
    /// 访问已失效的映射 (-EFAULT)
    Fault,

    // 其他
    /// 符号链接层级过多 (-ELOOP)
    TooManySymlinks,
    /// 操作不支持 (-ENOTSUP)
    NotSupported,
}

impl KernfsError {
    /// 转换为系统调用错误码（负数）
    pub fn to_errno(&self) -> isize {
        match self {
            KernfsError::NotFound => -2,
            KernfsError::IoError => -5,
            KernfsError::NoMemory => -12,
            KernfsError::PermissionDenied => -13,
            KernfsError::Fault => -14,
            KernfsError::Busy => -16,
            KernfsError::AlreadyExists => -17,
            KernfsError::NoDevice => -19,
            KernfsError::NotDirectory => -20,
            KernfsError::IsDirectory => -21,
            KernfsError::InvalidArgument => -22,
            KernfsError::FileTooBig => -27,
            KernfsError::NameTooLong => -36,
            KernfsError::TooManySymlinks => -40,
            KernfsError::NotSupported => -95,
        }
    }
}

/// 把读写结果折算成系统调用返回值：成功为字节数，失败为负的错误码
pub fn to_syscall_result(res: Result<usize, KernfsError>) -> isize {
    match res {
        Ok(n) => n as isize,
        Err(e) => e.to_errno(),
    }
}
