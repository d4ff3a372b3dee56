use std::sync::Arc;
use std::thread;
use std::vec::Vec;

use crate::{RwLock, SpinLock};

#[test]
fn test_spin_lock_basic() {
    let lock = SpinLock::new(5);
    {
        let mut guard = lock.lock();
        *guard += 1;
    }
    assert_eq!(*lock.lock(), 6);
}

#[test]
fn test_spin_lock_try_lock_contended() {
    let lock = SpinLock::new(());
    let guard = lock.lock();
    assert!(lock.try_lock().is_none());
    assert!(lock.is_locked());
    drop(guard);
    assert!(lock.try_lock().is_some());
}

#[test]
fn test_spin_lock_threads() {
    let lock = Arc::new(SpinLock::new(0usize));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let lock = lock.clone();
            thread::spawn(move || {
                for _ in 0..1000 {
                    *lock.lock() += 1;
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(*lock.lock(), 4000);
}

#[test]
fn test_rwlock_readers_share() {
    let lock = RwLock::new(1);
    let r1 = lock.read();
    let r2 = lock.read();
    assert_eq!(*r1 + *r2, 2);
    assert!(lock.try_write().is_none());
    drop(r1);
    drop(r2);
    *lock.write() = 7;
    assert_eq!(*lock.read(), 7);
}

#[test]
fn test_rwlock_writer_excludes_readers() {
    let lock = RwLock::new(0);
    let w = lock.write();
    assert!(lock.try_read().is_none());
    drop(w);
    assert!(lock.try_read().is_some());
}
