//! 活动引用与并发移除的集成测试

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use kernfs::{
    FileMode, KernfsError, KernfsOpenFile, KernfsOps, KernfsRoot, OpenFlags, OpsFlags, RootFlags,
};

/// show 回调进入后一直阻塞，直到测试放行
struct GateOps {
    entered: AtomicBool,
    open_gate: AtomicBool,
    shows: AtomicUsize,
}

impl GateOps {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            entered: AtomicBool::new(false),
            open_gate: AtomicBool::new(false),
            shows: AtomicUsize::new(0),
        })
    }
}

impl KernfsOps for GateOps {
    fn capabilities(&self) -> OpsFlags {
        OpsFlags::SEQ_SHOW
    }

    fn seq_show(&self, _of: &KernfsOpenFile, buf: &mut String) -> Result<(), KernfsError> {
        self.entered.store(true, Ordering::SeqCst);
        while !self.open_gate.load(Ordering::SeqCst) {
            thread::yield_now();
        }
        self.shows.fetch_add(1, Ordering::SeqCst);
        buf.push_str("online\n");
        Ok(())
    }
}

fn wait_until(flag: &AtomicBool) {
    while !flag.load(Ordering::SeqCst) {
        thread::yield_now();
    }
}

#[test]
fn test_remove_waits_for_inflight_read() {
    test_support::init();
    let root = KernfsRoot::new(RootFlags::empty(), None);
    let dev = root
        .root()
        .create_dir("dev0", FileMode::perm(0o755), None)
        .unwrap();
    let ops = GateOps::new();
    let attr = dev
        .create_file("online", FileMode::perm(0o444), ops.clone(), None)
        .unwrap();
    let of = KernfsOpenFile::open(&attr, OpenFlags::READ).unwrap();

    let reader = thread::spawn(move || {
        let mut buf = [0u8; 32];
        let n = of.read_at(0, &mut buf).unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    });
    wait_until(&ops.entered);
    assert_eq!(attr.active_count(), 1);

    let removed = Arc::new(AtomicBool::new(false));
    let remover = {
        let dev = dev.clone();
        let removed = removed.clone();
        thread::spawn(move || {
            dev.remove();
            removed.store(true, Ordering::SeqCst);
        })
    };

    // 移除已经开始：新的活动引用失败，但移除方仍在等待在途的读取
    while !attr.is_removed() {
        thread::yield_now();
    }
    assert!(attr.get_active().is_none());
    assert_eq!(
        root.root().find_child("dev0").unwrap_err(),
        KernfsError::NotFound
    );
    thread::sleep(Duration::from_millis(20));
    assert!(!removed.load(Ordering::SeqCst));

    ops.open_gate.store(true, Ordering::SeqCst);
    assert_eq!(reader.join().unwrap(), "online\n");
    remover.join().unwrap();
    assert!(removed.load(Ordering::SeqCst));
    assert_eq!(ops.shows.load(Ordering::SeqCst), 1);

    assert_eq!(
        KernfsOpenFile::open(&attr, OpenFlags::READ).err(),
        Some(KernfsError::NotFound)
    );
}

#[test]
fn test_remove_waits_for_held_active_ref() {
    test_support::init();
    let root = KernfsRoot::new(RootFlags::empty(), None);
    let node = root
        .root()
        .create_dir("held", FileMode::perm(0o755), None)
        .unwrap();

    let acquired = Arc::new(AtomicBool::new(false));
    let release = Arc::new(AtomicBool::new(false));
    let holder = {
        let node = node.clone();
        let acquired = acquired.clone();
        let release = release.clone();
        thread::spawn(move || {
            let guard = node.get_active().unwrap();
            acquired.store(true, Ordering::SeqCst);
            wait_until(&release);
            drop(guard);
        })
    };
    wait_until(&acquired);

    let done = Arc::new(AtomicBool::new(false));
    let remover = {
        let node = node.clone();
        let done = done.clone();
        thread::spawn(move || {
            node.remove();
            done.store(true, Ordering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(20));
    assert!(!done.load(Ordering::SeqCst));
    assert!(node.active_count() < 0);

    release.store(true, Ordering::SeqCst);
    holder.join().unwrap();
    remover.join().unwrap();
    assert!(done.load(Ordering::SeqCst));
    assert!(root.root().list().unwrap().is_empty());
}

#[test]
fn test_concurrent_create_and_list() {
    test_support::init();
    let root = KernfsRoot::new(RootFlags::empty(), None);
    let dir = root
        .root()
        .create_dir("many", FileMode::perm(0o755), None)
        .unwrap();

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let dir = dir.clone();
            thread::spawn(move || {
                for i in 0..25 {
                    let name = format!("n{}_{}", t, i);
                    let node = dir.create_dir(&name, FileMode::perm(0o755), None).unwrap();
                    if i % 2 == 0 {
                        node.remove();
                    }
                }
            })
        })
        .collect();
    for w in writers {
        w.join().unwrap();
    }

    let entries = dir.list().unwrap();
    assert_eq!(entries.len(), 4 * 12);
    assert!(entries.windows(2).all(|w| w[0].id < w[1].id));
}
