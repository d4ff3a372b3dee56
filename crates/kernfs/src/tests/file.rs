use std::string::String;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::vec;

use super::{ValueOps, dir_mode, new_root};
use crate::config::PAGE_SIZE;
use crate::{
    FileMode, KernfsError, KernfsOpenFile, KernfsOps, OpenFlags, OpsFlags, PollEvents, VmArea,
    VmOps,
};

fn read_all(of: &KernfsOpenFile) -> String {
    let mut buf = vec![0u8; 2 * PAGE_SIZE];
    let n = of.read_at(0, &mut buf).unwrap();
    String::from_utf8_lossy(&buf[..n]).into_owned()
}

#[test]
fn test_text_attribute_read_write() {
    let root = new_root();
    let ops = ValueOps::new("1\n");
    let node = root
        .root()
        .create_file("autoprobe", FileMode::perm(0o644), ops.clone(), None)
        .unwrap();
    assert_eq!(node.size(), PAGE_SIZE);

    let of = KernfsOpenFile::open(&node, OpenFlags::RDWR).unwrap();
    assert_eq!(read_all(&of), "1\n");
    assert_eq!(of.write(b"0\n").unwrap(), 2);
    assert_eq!(read_all(&of), "0\n");
}

#[test]
fn test_sequential_read_uses_cached_page() {
    let root = new_root();
    let ops = ValueOps::new("abcdef");
    let node = root
        .root()
        .create_file("seq", FileMode::perm(0o444), ops.clone(), None)
        .unwrap();
    let of = KernfsOpenFile::open(&node, OpenFlags::READ).unwrap();

    let mut buf = [0u8; 3];
    assert_eq!(of.read(&mut buf).unwrap(), 3);
    assert_eq!(&buf, b"abc");
    // 偏移非零时继续使用缓存的内容
    *ops.value.lock().unwrap() = String::from("XXXXXX");
    assert_eq!(of.read(&mut buf).unwrap(), 3);
    assert_eq!(&buf, b"def");
    assert_eq!(of.read(&mut buf).unwrap(), 0);

    of.seek(0);
    assert_eq!(of.read(&mut buf).unwrap(), 3);
    assert_eq!(&buf, b"XXX");
}

#[test]
fn test_show_output_truncated_to_page() {
    let root = new_root();
    let big: String = core::iter::repeat('x').take(PAGE_SIZE + 100).collect();
    let node = root
        .root()
        .create_file("big", FileMode::perm(0o444), ValueOps::new(&big), None)
        .unwrap();
    let of = KernfsOpenFile::open(&node, OpenFlags::READ).unwrap();
    assert_eq!(read_all(&of).len(), PAGE_SIZE - 1);
}

#[test]
fn test_open_permission_checks() {
    let root = new_root();
    let dir = root.root().create_dir("perm", dir_mode(), None).unwrap();
    let ro = dir
        .create_file("ro", FileMode::perm(0o444), ValueOps::new("x"), None)
        .unwrap();
    assert_eq!(
        KernfsOpenFile::open(&ro, OpenFlags::WRITE).err(),
        Some(KernfsError::PermissionDenied)
    );

    let show_only = Arc::new(ValueOps {
        value: std::sync::Mutex::new(String::new()),
        caps: OpsFlags::SEQ_SHOW,
        releases: AtomicUsize::new(0),
    });
    let rw_mode_no_store = dir
        .create_file("nostore", FileMode::perm(0o644), show_only, None)
        .unwrap();
    assert_eq!(
        KernfsOpenFile::open(&rw_mode_no_store, OpenFlags::WRITE).err(),
        Some(KernfsError::PermissionDenied)
    );
    assert_eq!(
        KernfsOpenFile::open(&dir, OpenFlags::READ).err(),
        Some(KernfsError::IsDirectory)
    );

    let of = KernfsOpenFile::open(&ro, OpenFlags::READ).unwrap();
    assert_eq!(of.write(b"1").unwrap_err(), KernfsError::PermissionDenied);
}

struct BlobOps {
    data: std::sync::Mutex<[u8; 16]>,
}

impl KernfsOps for BlobOps {
    fn capabilities(&self) -> OpsFlags {
        OpsFlags::READ | OpsFlags::WRITE | OpsFlags::MMAP
    }

    fn read(&self, _of: &KernfsOpenFile, offset: usize, buf: &mut [u8]) -> Result<usize, KernfsError> {
        let data = self.data.lock().unwrap();
        let n = buf.len().min(data.len() - offset);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        Ok(n)
    }

    fn write(&self, _of: &KernfsOpenFile, offset: usize, src: &[u8]) -> Result<usize, KernfsError> {
        let mut data = self.data.lock().unwrap();
        data[offset..offset + src.len()].copy_from_slice(src);
        Ok(src.len())
    }

    fn mmap(&self, _of: &KernfsOpenFile, vma: &mut VmArea) -> Result<(), KernfsError> {
        vma.set_ops(Arc::new(PageOps));
        Ok(())
    }
}

struct PageOps;

impl VmOps for PageOps {
    fn fault(&self, _vma: &VmArea, pgoff: usize) -> Result<usize, KernfsError> {
        Ok(0x1000 + pgoff)
    }
}

#[test]
fn test_binary_attribute_bounds() {
    let root = new_root();
    let ops = Arc::new(BlobOps {
        data: std::sync::Mutex::new([7u8; 16]),
    });
    let node = root
        .root()
        .create_bin_file("config", FileMode::perm(0o644), 16, ops, None)
        .unwrap();
    assert_eq!(node.size(), 16);

    let of = KernfsOpenFile::open(&node, OpenFlags::RDWR).unwrap();
    let mut buf = [0u8; 64];
    assert_eq!(of.read_at(10, &mut buf).unwrap(), 6);
    assert_eq!(of.read_at(16, &mut buf).unwrap(), 0);

    // 写入被截断到属性大小
    assert_eq!(of.write_at(12, &[1u8; 8]).unwrap(), 4);
    assert_eq!(of.write_at(16, &[1u8; 1]).unwrap_err(), KernfsError::FileTooBig);
    assert_eq!(of.read_at(12, &mut buf).unwrap(), 4);
    assert_eq!(&buf[..4], &[1, 1, 1, 1]);
}

#[test]
fn test_mmap_gated_by_active_ref() {
    let root = new_root();
    let ops = Arc::new(BlobOps {
        data: std::sync::Mutex::new([0u8; 16]),
    });
    let node = root
        .root()
        .create_bin_file("resource0", FileMode::perm(0o600), 16, ops, None)
        .unwrap();
    let of = KernfsOpenFile::open(&node, OpenFlags::READ).unwrap();
    let mapping = of.mmap(4096, 0).unwrap();
    assert!(of.is_mmapped());
    assert_eq!(mapping.fault(2).unwrap(), 0x1002);

    node.remove();
    assert_eq!(mapping.fault(2).unwrap_err(), KernfsError::Fault);

    let text = root
        .root()
        .create_file("text", FileMode::perm(0o444), ValueOps::new("x"), None)
        .unwrap();
    let tof = KernfsOpenFile::open(&text, OpenFlags::READ).unwrap();
    assert_eq!(tof.mmap(4096, 0).err().map(|e| e.to_errno()), Some(-19));
}

#[test]
fn test_poll_and_notify() {
    let root = new_root();
    let node = root
        .root()
        .create_file("state", FileMode::perm(0o444), ValueOps::new("on"), None)
        .unwrap();
    let of = KernfsOpenFile::open(&node, OpenFlags::READ).unwrap();
    read_all(&of);
    assert_eq!(of.poll(), PollEvents::DEFAULT);

    node.notify();
    assert!(of.poll().contains(PollEvents::POLLPRI | PollEvents::POLLERR));

    read_all(&of);
    assert_eq!(of.poll(), PollEvents::DEFAULT);
}

#[test]
fn test_wait_for_change_across_threads() {
    let root = new_root();
    let node = root
        .root()
        .create_file("waitable", FileMode::perm(0o444), ValueOps::new("0"), None)
        .unwrap();
    let of = KernfsOpenFile::open(&node, OpenFlags::READ).unwrap();
    read_all(&of);

    let n2 = node.clone();
    let h = thread::spawn(move || {
        thread::sleep(std::time::Duration::from_millis(10));
        n2.notify();
    });
    let events = of.wait_for_change();
    assert!(events.contains(PollEvents::POLLPRI));
    h.join().unwrap();
}

#[test]
fn test_remove_releases_open_files_once() {
    let root = new_root();
    let ops = ValueOps::new("abcdefgh");
    let node = root
        .root()
        .create_file("gone", FileMode::perm(0o644), ops.clone(), None)
        .unwrap();
    let of1 = KernfsOpenFile::open(&node, OpenFlags::READ).unwrap();
    let of2 = KernfsOpenFile::open(&node, OpenFlags::RDWR).unwrap();
    assert_eq!(node.open_count(), 2);
    // 先读半页，留下缓存内容
    assert_eq!(of1.read_at(0, &mut [0u8; 4]).unwrap(), 4);

    // 正常关闭只释放一次
    of2.release();
    drop(of2);
    assert_eq!(ops.releases(), 1);

    node.remove();
    assert_eq!(ops.releases(), 2);
    assert!(of1.is_released());
    assert_eq!(of1.read_at(0, &mut [0u8; 8]).unwrap_err(), KernfsError::NotFound);
    // 缓存的页面也不能再读到
    assert_eq!(of1.read_at(4, &mut [0u8; 8]).unwrap_err(), KernfsError::NotFound);
    assert_eq!(of1.read(&mut [0u8; 8]).unwrap_err(), KernfsError::NotFound);
    assert!(of1.poll().contains(PollEvents::POLLERR));

    drop(of1);
    assert_eq!(ops.releases(), 2);
    assert_eq!(
        KernfsOpenFile::open(&node, OpenFlags::READ).err(),
        Some(KernfsError::NotFound)
    );
}

#[test]
fn test_write_on_removed_node() {
    let root = new_root();
    let calls = Arc::new(AtomicUsize::new(0));

    struct CountingOps(Arc<AtomicUsize>);
    impl KernfsOps for CountingOps {
        fn capabilities(&self) -> OpsFlags {
            OpsFlags::WRITE
        }
        fn write(&self, _of: &KernfsOpenFile, _off: usize, data: &[u8]) -> Result<usize, KernfsError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(data.len())
        }
    }

    let node = root
        .root()
        .create_file("unbind", FileMode::perm(0o200), Arc::new(CountingOps(calls.clone())), None)
        .unwrap();
    let of = KernfsOpenFile::open(&node, OpenFlags::WRITE).unwrap();
    assert_eq!(of.write(b"dev0").unwrap(), 4);
    node.remove();
    assert_eq!(of.write_at(0, b"dev0").unwrap_err(), KernfsError::NotFound);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_failed_open_is_not_released() {
    let root = new_root();
    let releases = Arc::new(AtomicUsize::new(0));

    struct RefusingOps(Arc<AtomicUsize>);
    impl KernfsOps for RefusingOps {
        fn capabilities(&self) -> OpsFlags {
            OpsFlags::SEQ_SHOW
        }
        fn open(&self, _of: &KernfsOpenFile) -> Result<(), KernfsError> {
            Err(KernfsError::Busy)
        }
        fn release(&self, _of: &KernfsOpenFile) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let node = root
        .root()
        .create_file(
            "locked",
            FileMode::perm(0o444),
            Arc::new(RefusingOps(releases.clone())),
            None,
        )
        .unwrap();
    assert_eq!(
        KernfsOpenFile::open(&node, OpenFlags::READ).err(),
        Some(KernfsError::Busy)
    );
    assert_eq!(node.open_count(), 0);
    assert_eq!(releases.load(Ordering::SeqCst), 0);

    node.remove();
    assert_eq!(releases.load(Ordering::SeqCst), 0);
}
