//! 带生命周期钩子的成员表
//!
//! 总线的设备表、驱动表以及驱动已绑定的设备表都用 [`KList`] 表示。
//! 成员按加入顺序排列，以标识（设备或驱动的 id）为键去重。
//! 成员加入时调用 `get` 钩子，离开时调用 `put` 钩子，钩子都在表锁之外执行。
//!
//! 迭代器不持有表锁，每一步重新定位到上一次返回的成员之后，
//! 因此迭代期间成员被移除是安全的：被移除的成员不会再出现，新加入的成员会出现在末尾。

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use hashbrown::HashMap;
use sync::SpinLock;

/// 成员加入或离开时调用的钩子
pub type KListHook<T> = fn(&T);

struct Inner<T> {
    next_seq: u64,
    /// 加入序号 -> (键, 成员)
    entries: BTreeMap<u64, (u64, T)>,
    /// 键 -> 加入序号
    index: HashMap<u64, u64>,
}

/// 成员表
pub struct KList<T: Clone> {
    inner: SpinLock<Inner<T>>,
    get: Option<KListHook<T>>,
    put: Option<KListHook<T>>,
}

impl<T: Clone> KList<T> {
    /// 创建没有钩子的空表
    pub fn new() -> Self {
        Self::with_hooks(None, None)
    }

    /// 创建带钩子的空表
    pub fn with_hooks(get: Option<KListHook<T>>, put: Option<KListHook<T>>) -> Self {
        Self {
            inner: SpinLock::new(Inner {
                next_seq: 0,
                entries: BTreeMap::new(),
                index: HashMap::new(),
            }),
            get,
            put,
        }
    }

    /// 把成员加到表尾，键已存在时返回 `false` 且不调用钩子
    pub fn add_tail(&self, key: u64, item: T) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.index.contains_key(&key) {
                return false;
            }
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.entries.insert(seq, (key, item.clone()));
            inner.index.insert(key, seq);
        }
        if let Some(get) = self.get {
            get(&item);
        }
        true
    }

    /// 按键移除成员
    pub fn remove(&self, key: u64) -> Option<T> {
        let item = {
            let mut inner = self.inner.lock();
            let seq = inner.index.remove(&key)?;
            inner.entries.remove(&seq).map(|(_, item)| item)
        };
        if let (Some(put), Some(item)) = (self.put, item.as_ref()) {
            put(item);
        }
        item
    }

    /// 键是否在表中
    pub fn contains(&self, key: u64) -> bool {
        self.inner.lock().index.contains_key(&key)
    }

    /// 成员数量
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 按加入顺序复制出所有成员
    pub fn snapshot(&self) -> Vec<T> {
        self.inner
            .lock()
            .entries
            .values()
            .map(|(_, item)| item.clone())
            .collect()
    }

    /// 最后加入的成员
    pub fn last(&self) -> Option<T> {
        self.inner
            .lock()
            .entries
            .values()
            .next_back()
            .map(|(_, item)| item.clone())
    }

    /// 按加入顺序找到第一个满足条件的成员
    pub fn find(&self, mut pred: impl FnMut(&T) -> bool) -> Option<T> {
        self.iter().find(|item| pred(item))
    }

    /// 不持锁的迭代器
    pub fn iter(&self) -> KListIter<'_, T> {
        KListIter {
            list: self,
            next_seq: 0,
        }
    }
}

impl<T: Clone> Default for KList<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// [`KList::iter`] 返回的迭代器
pub struct KListIter<'a, T: Clone> {
    list: &'a KList<T>,
    next_seq: u64,
}

impl<T: Clone> Iterator for KListIter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let inner = self.list.inner.lock();
        let (seq, (_, item)) = inner.entries.range(self.next_seq..).next()?;
        self.next_seq = seq + 1;
        Some(item.clone())
    }
}
