use std::string::String;
use std::vec::Vec;

use alloc::sync::Arc;
use log::Level;

use super::{dir_mode, new_root};
use crate::{KernfsError, KernfsRoot, NodeKind, RootFlags};

#[test]
fn test_create_and_find() {
    let root = new_root();
    let devices = root.root().create_dir("devices", dir_mode(), None).unwrap();
    assert_eq!(devices.kind(), NodeKind::Dir);
    assert!(devices.is_active());
    assert_eq!(devices.path(), "/devices");

    let found = root.root().find_child("devices").unwrap();
    assert!(Arc::ptr_eq(&found, &devices));
    assert_eq!(
        root.root().find_child("missing").unwrap_err(),
        KernfsError::NotFound
    );
}

#[test]
fn test_ids_monotonic_and_listing_order() {
    let root = new_root();
    let a = root.root().create_dir("zeta", dir_mode(), None).unwrap();
    let b = root.root().create_dir("alpha", dir_mode(), None).unwrap();
    let c = root.root().create_dir("mid", dir_mode(), None).unwrap();
    assert!(a.id() < b.id() && b.id() < c.id());

    let names: Vec<String> = root.root().list().unwrap().into_iter().map(|e| e.name).collect();
    assert_eq!(names, ["zeta", "alpha", "mid"]);
}

#[test]
fn test_duplicate_name_logged() {
    let root = new_root();
    let parent = root
        .root()
        .create_dir("dup_parent_kernfs", dir_mode(), None)
        .unwrap();
    parent.create_dir("x", dir_mode(), None).unwrap();
    assert_eq!(
        parent.create_dir("x", dir_mode(), None).unwrap_err(),
        KernfsError::AlreadyExists
    );
    assert!(test_support::mock::logger::contains(
        Level::Error,
        "/dup_parent_kernfs/x"
    ));
}

#[test]
fn test_invalid_names() {
    let root = new_root();
    let r = root.root();
    assert_eq!(r.create_dir("", dir_mode(), None).unwrap_err(), KernfsError::InvalidArgument);
    assert_eq!(r.create_dir(".", dir_mode(), None).unwrap_err(), KernfsError::InvalidArgument);
    assert_eq!(r.create_dir("..", dir_mode(), None).unwrap_err(), KernfsError::InvalidArgument);
    assert_eq!(r.create_dir("a/b", dir_mode(), None).unwrap_err(), KernfsError::InvalidArgument);
    let long: String = core::iter::repeat('n').take(256).collect();
    assert_eq!(r.create_dir(&long, dir_mode(), None).unwrap_err(), KernfsError::NameTooLong);
    let max: String = core::iter::repeat('n').take(255).collect();
    assert!(r.create_dir(&max, dir_mode(), None).is_ok());
}

#[test]
fn test_create_in_file_fails() {
    let root = new_root();
    let f = root
        .root()
        .create_file("attr", crate::FileMode::perm(0o444), super::ValueOps::new("x"), None)
        .unwrap();
    assert_eq!(
        f.create_dir("sub", dir_mode(), None).unwrap_err(),
        KernfsError::NotDirectory
    );
}

#[test]
fn test_remove_subtree() {
    let root = new_root();
    let bus = root.root().create_dir("bus", dir_mode(), None).unwrap();
    let usb = bus.create_dir("usb", dir_mode(), None).unwrap();
    let drivers = usb.create_dir("drivers", dir_mode(), None).unwrap();

    usb.remove();
    assert!(usb.is_removed());
    assert!(drivers.is_removed());
    assert!(usb.get_active().is_none());
    assert!(drivers.get_active().is_none());
    assert_eq!(bus.find_child("usb").unwrap_err(), KernfsError::NotFound);
    assert!(bus.list().unwrap().is_empty());

    // 向正在移除的目录添加节点失败
    assert_eq!(
        drivers.create_dir("hub", dir_mode(), None).unwrap_err(),
        KernfsError::NotFound
    );
    // 重复移除是空操作
    usb.remove();
}

#[test]
fn test_recreate_gets_new_identity() {
    let root = new_root();
    let first = root.root().create_dir("dev", dir_mode(), None).unwrap();
    let old_id = first.id();
    root.root().remove_by_name("dev").unwrap();
    assert_eq!(root.root().remove_by_name("dev").unwrap_err(), KernfsError::NotFound);

    let second = root.root().create_dir("dev", dir_mode(), None).unwrap();
    assert!(second.id() > old_id);
    assert!(first.is_removed());
    assert!(second.is_active());
}

#[test]
fn test_readdir_restart_after_removal() {
    let root = new_root();
    let dir = root.root().create_dir("list", dir_mode(), None).unwrap();
    let a = dir.create_dir("a", dir_mode(), None).unwrap();
    let b = dir.create_dir("b", dir_mode(), None).unwrap();
    dir.create_dir("c", dir_mode(), None).unwrap();

    let first = dir.readdir(0, 1).unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].name, "a");
    assert_eq!(first[0].id, a.id());

    b.remove();
    let rest = dir.readdir(first[0].id + 1, 10).unwrap();
    let names: Vec<&str> = rest.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["c"]);
}

#[test]
fn test_cursor_survives_concurrent_edits() {
    let root = new_root();
    let dir = root.root().create_dir("cursor", dir_mode(), None).unwrap();
    dir.create_dir("a", dir_mode(), None).unwrap();
    let b = dir.create_dir("b", dir_mode(), None).unwrap();

    let mut cursor = dir.dir_cursor(0).unwrap();
    assert_eq!(cursor.next().unwrap().name, "a");
    b.remove();
    dir.create_dir("d", dir_mode(), None).unwrap();
    let rest: Vec<String> = cursor.map(|e| e.name).collect();
    assert_eq!(rest, ["d"]);
}

#[test]
fn test_rename_keeps_identity() {
    let root = new_root();
    let a = root.root().create_dir("ra", dir_mode(), None).unwrap();
    let b = root.root().create_dir("rb", dir_mode(), None).unwrap();
    let node = a.create_dir("old", dir_mode(), None).unwrap();
    let id = node.id();

    node.rename(&b, "new").unwrap();
    assert_eq!(node.id(), id);
    assert_eq!(node.path(), "/rb/new");
    assert_eq!(a.find_child("old").unwrap_err(), KernfsError::NotFound);
    assert!(Arc::ptr_eq(&b.find_child("new").unwrap(), &node));

    // 不能移到自己的子树下
    assert_eq!(b.rename(&node, "loop").unwrap_err(), KernfsError::InvalidArgument);
    // 根目录不能重命名
    assert_eq!(
        root.root().rename(&a, "root").unwrap_err(),
        KernfsError::InvalidArgument
    );
    // 目标名字冲突
    a.create_dir("taken", dir_mode(), None).unwrap();
    assert_eq!(node.rename(&a, "taken").unwrap_err(), KernfsError::AlreadyExists);
}

#[test]
fn test_create_deactivated_root() {
    test_support::init();
    let root = KernfsRoot::new(RootFlags::CREATE_DEACTIVATED, None);
    let dir = root.root().create_dir("hidden", dir_mode(), None).unwrap();
    let child = dir.create_dir("inner", dir_mode(), None).unwrap();
    assert!(!dir.is_active());
    assert!(dir.get_active().is_none());
    assert_eq!(root.root().find_child("hidden").unwrap_err(), KernfsError::NotFound);
    assert!(root.root().list().unwrap().is_empty());

    dir.activate();
    assert!(dir.is_active());
    assert!(child.is_active());
    assert_eq!(root.root().list().unwrap().len(), 1);
}

#[test]
fn test_timestamps_advance() {
    let root = new_root();
    let dir = root.root().create_dir("times", dir_mode(), None).unwrap();
    let before = dir.times();
    dir.create_dir("x", dir_mode(), None).unwrap();
    let after = dir.times();
    assert!(after.mtime > before.mtime);
    dir.remove_by_name("x").unwrap();
    assert!(dir.times().mtime > after.mtime);
}

#[test]
fn test_find_by_path() {
    let root = new_root();
    let a = root.root().create_dir("pa", dir_mode(), None).unwrap();
    let b = a.create_dir("pb", dir_mode(), None).unwrap();
    assert!(Arc::ptr_eq(&root.root().find_by_path("pa/pb").unwrap(), &b));
    assert!(Arc::ptr_eq(&b.find_by_path("../pb/.").unwrap(), &b));
    assert_eq!(
        root.root().find_by_path("pa/missing").unwrap_err(),
        KernfsError::NotFound
    );
}

#[test]
fn test_destroy_root() {
    let root = new_root();
    let a = root.root().create_dir("d1", dir_mode(), None).unwrap();
    let b = a.create_dir("d2", dir_mode(), None).unwrap();
    root.destroy();
    assert!(a.is_removed());
    assert!(b.is_removed());
    assert!(root.root().list().unwrap().is_empty());
}
