//! kernfs：设备模型投影层使用的内存节点树
//!
//! 每个节点是目录、属性文件（文本或二进制）或符号链接。
//! 节点的可见性和载荷访问由活动引用协议控制：
//!
//! - 读写、映射和 show/store 回调都在持有活动引用时进行；
//! - 移除时先停用（新的活动引用一律失败），再等待在途引用全部释放，最后才解除链接；
//! - 节点本身由 `Arc` 计数，打开的文件可以比节点的可见期活得更久。
//!
//! 同一棵树上的结构性修改在 [`KernfsRoot`] 的结构锁下串行进行，
//! 子项按单调分配的标识排序，因此列目录可以从任意标识重新开始。

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod config;
mod dir;
mod error;
mod file;
mod mmap;
mod mode;
mod mount;
mod node;
mod root;
mod symlink;

pub use dir::{DirCursor, DirEntry};
pub use error::{KernfsError, to_syscall_result};
pub use file::{KernfsOpenFile, KernfsOps, OpsFlags};
pub use mmap::{KernfsMapping, VmArea, VmOps};
pub use mode::{FileMode, NodeKind, OpenFlags, PollEvents};
pub use mount::{KernfsMount, NodeStat};
pub use node::{ActiveRef, KernfsNode, KernfsPriv, NodeTimes};
pub use root::{KernfsRoot, RootFlags};

#[cfg(test)]
mod tests;
