//! 节点类型与权限位

/// 节点类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// 目录
    Dir,
    /// 文本属性
    Attr,
    /// 二进制属性
    BinAttr,
    /// 符号链接
    Link,
}

impl NodeKind {
    /// 该类型对应的文件类型位
    pub fn type_bits(&self) -> FileMode {
        match self {
            NodeKind::Dir => FileMode::S_IFDIR,
            NodeKind::Attr | NodeKind::BinAttr => FileMode::S_IFREG,
            NodeKind::Link => FileMode::S_IFLNK,
        }
    }

    /// 是否是属性文件（文本或二进制）
    pub fn is_file(&self) -> bool {
        matches!(self, NodeKind::Attr | NodeKind::BinAttr)
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// 文件权限和类型（与 POSIX 兼容）
    pub struct FileMode: u32 {
        /// 文件类型掩码
        const S_IFMT   = 0o170000;
        /// 普通文件
        const S_IFREG  = 0o100000;
        /// 目录
        const S_IFDIR  = 0o040000;
        /// 符号链接
        const S_IFLNK  = 0o120000;

        /// 用户读
        const S_IRUSR  = 0o400;
        /// 用户写
        const S_IWUSR  = 0o200;
        /// 用户执行
        const S_IXUSR  = 0o100;
        /// 组读
        const S_IRGRP  = 0o040;
        /// 组写
        const S_IWGRP  = 0o020;
        /// 组执行
        const S_IXGRP  = 0o010;
        /// 其他读
        const S_IROTH  = 0o004;
        /// 其他写
        const S_IWOTH  = 0o002;
        /// 其他执行
        const S_IXOTH  = 0o001;

        /// 任意读位
        const S_IRUGO = Self::S_IRUSR.bits() | Self::S_IRGRP.bits() | Self::S_IROTH.bits();
        /// 任意写位
        const S_IWUGO = Self::S_IWUSR.bits() | Self::S_IWGRP.bits() | Self::S_IWOTH.bits();
        /// 任意执行位
        const S_IXUGO = Self::S_IXUSR.bits() | Self::S_IXGRP.bits() | Self::S_IXOTH.bits();
    }
}

impl FileMode {
    /// 从八进制权限位构造（丢弃类型位）
    pub fn perm(bits: u32) -> Self {
        FileMode::from_bits_truncate(bits) & !FileMode::S_IFMT
    }

    /// 只保留权限位
    pub fn permissions(&self) -> FileMode {
        *self & !FileMode::S_IFMT
    }

    /// 是否有任意读权限
    pub fn any_read(&self) -> bool {
        self.intersects(FileMode::S_IRUGO)
    }

    /// 是否有任意写权限
    pub fn any_write(&self) -> bool {
        self.intersects(FileMode::S_IWUGO)
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// 打开标志
    pub struct OpenFlags: u32 {
        /// 以读方式打开
        const READ  = 0b01;
        /// 以写方式打开
        const WRITE = 0b10;
        /// 读写
        const RDWR  = Self::READ.bits() | Self::WRITE.bits();
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// poll 事件
    pub struct PollEvents: u32 {
        /// 可读
        const POLLIN     = 0x001;
        /// 有紧急数据（属性内容已变化）
        const POLLPRI    = 0x002;
        /// 错误（属性内容已变化或节点已移除）
        const POLLERR    = 0x008;
        /// 普通数据可读
        const POLLRDNORM = 0x040;
    }
}

impl PollEvents {
    /// kernfs 文件默认始终可读
    pub const DEFAULT: PollEvents = PollEvents::POLLIN.union(PollEvents::POLLRDNORM);
}
