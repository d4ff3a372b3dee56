use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crate::WaitCounter;

#[test]
fn test_guard_decrements() {
    let counter = WaitCounter::new();
    {
        let _g = counter.enter();
        assert_eq!(counter.count(), 1);
    }
    assert_eq!(counter.count(), 0);
    counter.wait_zero();
}

#[test]
fn test_wait_zero_blocks_until_done() {
    let counter = Arc::new(WaitCounter::new());
    let finished = Arc::new(AtomicBool::new(false));
    counter.inc();
    let (c2, f2) = (counter.clone(), finished.clone());
    let h = thread::spawn(move || {
        thread::sleep(std::time::Duration::from_millis(10));
        f2.store(true, Ordering::SeqCst);
        c2.dec();
    });
    counter.wait_zero();
    assert!(finished.load(Ordering::SeqCst));
    h.join().unwrap();
}
