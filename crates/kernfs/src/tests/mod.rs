// Unit tests for kernfs.
//
// 这些测试在宿主机上用标准 `cargo test` 运行。

use std::string::String;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use alloc::sync::Arc;

use crate::{FileMode, KernfsError, KernfsOpenFile, KernfsOps, KernfsRoot, OpsFlags, RootFlags};

mod dir;
mod file;

/// 保存一个字符串值的文本属性
pub(super) struct ValueOps {
    pub(super) value: Mutex<String>,
    pub(super) caps: OpsFlags,
    pub(super) releases: AtomicUsize,
}

impl ValueOps {
    pub(super) fn new(value: &str) -> Arc<Self> {
        Arc::new(Self {
            value: Mutex::new(String::from(value)),
            caps: OpsFlags::SEQ_SHOW | OpsFlags::WRITE,
            releases: AtomicUsize::new(0),
        })
    }

    pub(super) fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl KernfsOps for ValueOps {
    fn capabilities(&self) -> OpsFlags {
        self.caps
    }

    fn release(&self, _of: &KernfsOpenFile) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }

    fn seq_show(&self, _of: &KernfsOpenFile, buf: &mut String) -> Result<(), KernfsError> {
        buf.push_str(&self.value.lock().unwrap());
        Ok(())
    }

    fn write(&self, _of: &KernfsOpenFile, _offset: usize, data: &[u8]) -> Result<usize, KernfsError> {
        *self.value.lock().unwrap() = String::from_utf8_lossy(data).into_owned();
        Ok(data.len())
    }
}

pub(super) fn new_root() -> Arc<KernfsRoot> {
    test_support::init();
    KernfsRoot::new(RootFlags::empty(), None)
}

pub(super) fn dir_mode() -> FileMode {
    FileMode::perm(0o755)
}
