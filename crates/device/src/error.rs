//! 驱动模型错误类型
//!
//! 驱动的 probe 结果也用这个类型表达：[`DriverError::NoDevice`] 和
//! [`DriverError::NoAddress`] 表示驱动拒绝该设备，[`DriverError::ProbeDefer`]
//! 表示依赖尚未就绪、稍后重试，其余错误都视为真正的失败。

use kernfs::KernfsError;

/// 驱动模型错误类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// 对象不存在 (-ENOENT)
    NotFound,
    /// 同名对象已注册 (-EEXIST)
    AlreadyExists,
    /// 对象仍在使用中 (-EBUSY)
    Busy,
    /// 内存不足 (-ENOMEM)
    NoMemory,
    /// 驱动不支持该设备 (-ENODEV)
    NoDevice,
    /// 设备地址不可用，同样表示拒绝 (-ENXIO)
    NoAddress,
    /// 依赖尚未就绪，延后重试 (-EPROBE_DEFER)
    ProbeDefer,
    /// 无效参数 (-EINVAL)
    InvalidArgument,
    /// 对象尚未注册或已被注销 (-ENODEV)
    NotRegistered,
    /// 回调内部失败 (-EIO)
    IoError,
    /// 属性投影层返回的错误
    Fs(KernfsError),
}

impl DriverError {
    /// 该错误是否表示驱动“拒绝”设备，而不是失败
    pub fn is_declined(&self) -> bool {
        matches!(self, DriverError::NoDevice | DriverError::NoAddress)
    }

    /// 转换为错误码（负数）
    pub fn to_errno(&self) -> isize {
        match self {
            DriverError::NotFound => -2,
            DriverError::NoAddress => -6,
            DriverError::IoError => -5,
            DriverError::NoMemory => -12,
            DriverError::Busy => -16,
            DriverError::AlreadyExists => -17,
            DriverError::NoDevice | DriverError::NotRegistered => -19,
            DriverError::InvalidArgument => -22,
            DriverError::ProbeDefer => -517,
            DriverError::Fs(e) => e.to_errno(),
        }
    }
}

impl From<KernfsError> for DriverError {
    fn from(e: KernfsError) -> Self {
        match e {
            KernfsError::NotFound => DriverError::NotFound,
            KernfsError::AlreadyExists => DriverError::AlreadyExists,
            KernfsError::Busy => DriverError::Busy,
            KernfsError::NoMemory => DriverError::NoMemory,
            KernfsError::InvalidArgument => DriverError::InvalidArgument,
            other => DriverError::Fs(other),
        }
    }
}

impl From<DriverError> for KernfsError {
    fn from(e: DriverError) -> Self {
        match e {
            DriverError::NotFound => KernfsError::NotFound,
            DriverError::AlreadyExists => KernfsError::AlreadyExists,
            DriverError::Busy | DriverError::ProbeDefer => KernfsError::Busy,
            DriverError::NoMemory => KernfsError::NoMemory,
            DriverError::NoDevice | DriverError::NoAddress | DriverError::NotRegistered => {
                KernfsError::NoDevice
            }
            DriverError::InvalidArgument => KernfsError::InvalidArgument,
            DriverError::IoError => KernfsError::IoError,
            DriverError::Fs(e) => e,
        }
    }
}
