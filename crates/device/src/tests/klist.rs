use std::sync::atomic::{AtomicUsize, Ordering};
use std::vec;
use std::vec::Vec;

use crate::KList;

static GETS: AtomicUsize = AtomicUsize::new(0);
static PUTS: AtomicUsize = AtomicUsize::new(0);

fn count_get(_: &u32) {
    GETS.fetch_add(1, Ordering::SeqCst);
}

fn count_put(_: &u32) {
    PUTS.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn test_klist_order_and_duplicates() {
    let list: KList<&str> = KList::new();
    assert!(list.add_tail(3, "c"));
    assert!(list.add_tail(1, "a"));
    assert!(list.add_tail(2, "b"));
    assert!(!list.add_tail(1, "again"));

    assert_eq!(list.snapshot(), vec!["c", "a", "b"]);
    assert_eq!(list.last(), Some("b"));
    assert_eq!(list.len(), 3);
    assert!(list.contains(2));

    assert_eq!(list.remove(1), Some("a"));
    assert_eq!(list.remove(1), None);
    assert_eq!(list.snapshot(), vec!["c", "b"]);
    assert_eq!(list.find(|s| s.starts_with('b')), Some("b"));
}

#[test]
fn test_klist_hooks_are_balanced() {
    let list: KList<u32> = KList::with_hooks(Some(count_get), Some(count_put));
    list.add_tail(10, 10);
    list.add_tail(11, 11);
    // 重复的键不调用钩子
    assert!(!list.add_tail(10, 99));
    assert_eq!(GETS.load(Ordering::SeqCst), 2);
    assert_eq!(PUTS.load(Ordering::SeqCst), 0);

    list.remove(10);
    list.remove(11);
    assert_eq!(PUTS.load(Ordering::SeqCst), 2);
    assert!(list.is_empty());
}

#[test]
fn test_klist_iter_survives_removal() {
    let list: KList<u32> = KList::new();
    for i in 0..5 {
        list.add_tail(u64::from(i), i);
    }

    let mut seen = Vec::new();
    for item in list.iter() {
        seen.push(item);
        if item == 1 {
            // 迭代中移除尚未访问的成员，并追加新成员
            list.remove(2);
            list.add_tail(7, 7);
        }
    }
    assert_eq!(seen, vec![0, 1, 3, 4, 7]);
}
