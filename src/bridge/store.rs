//! 原生对象存储
//!
//! 代替“脚本直接持有原生指针”的方案：所有暴露给脚本的原生对象都放在
//! 一个带代数（generation）的槽位数组里，句柄只保存 `(槽位, 代数)`。
//! 对象被释放后槽位代数递增，旧句柄再解析时得到明确的失效错误，
//! 而不是悬垂引用。

use std::any::Any;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use super::tag::{Tag, Tagged};
use crate::core::error::{BridgeError, BridgeResult};

/// 存储中的对象条目
pub type Entry = Rc<RefCell<dyn Any>>;

/// 带代数的槽位键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key {
    index: u32,
    generation: u32,
}

impl Key {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// 带类型信息的键，宿主用它保存根对象的子对象
pub struct TypedKey<T> {
    key: Key,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedKey<T> {
    pub fn key(&self) -> Key {
        self.key
    }
}

impl<T> Clone for TypedKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for TypedKey<T> {}

impl<T> fmt::Debug for TypedKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypedKey({})", self.key)
    }
}

struct Slot {
    generation: u32,
    tag: Tag,
    entry: Option<Entry>,
}

#[derive(Default)]
struct Slots {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl Slots {
    fn insert(&mut self, tag: Tag, entry: Entry) -> Key {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.tag = tag;
            slot.entry = Some(entry);
            self.live += 1;
            return Key {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            tag,
            entry: Some(entry),
        });
        self.live += 1;
        Key {
            index,
            generation: 0,
        }
    }

    fn take(&mut self, key: Key) -> Option<Entry> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        slot.tag = Tag::Unknown;
        self.free.push(key.index);
        self.live -= 1;
        Some(entry)
    }

    fn get(&self, key: Key) -> Option<(Tag, Entry)> {
        let slot = self.slots.get(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.entry.as_ref().map(|entry| (slot.tag, Rc::clone(entry)))
    }
}

/// 原生对象存储（单线程）
#[derive(Default)]
pub struct Store {
    slots: RefCell<Slots>,
    pending: RefCell<Vec<Key>>,
    /// `pending` 正被借用时的备用队列
    spill: Cell<Vec<Key>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// 放入一个原生对象
    pub fn insert<T: Tagged>(&self, value: T) -> TypedKey<T> {
        self.flush_pending();
        let entry: Entry = Rc::new(RefCell::new(value));
        let key = self.slots.borrow_mut().insert(T::TAG, entry);
        tracing::trace!(target: "lou::bridge", tag = %T::TAG, %key, "native object stored");
        TypedKey {
            key,
            _marker: PhantomData,
        }
    }

    /// 释放槽位；键已失效时返回 `false`
    ///
    /// 条目在借用结束后才析构，原生对象的 `Drop` 可以安全地再次访问存储。
    pub fn remove(&self, key: Key) -> bool {
        self.flush_pending();
        let entry = match self.slots.try_borrow_mut() {
            Ok(mut slots) => slots.take(key),
            Err(_) => {
                self.requeue([key]);
                return true;
            }
        };
        match entry {
            Some(entry) => {
                drop(entry);
                true
            }
            None => false,
        }
    }

    /// 垃圾回收期间的释放请求；存储正被借用时延后处理
    pub(crate) fn release(&self, key: Key) {
        self.requeue([key]);
        self.flush_pending();
    }

    /// 放回待释放队列，队列本身正被借用时放进备用队列
    fn requeue(&self, keys: impl IntoIterator<Item = Key>) {
        match self.pending.try_borrow_mut() {
            Ok(mut pending) => pending.extend(keys),
            Err(_) => {
                let mut spill = self.spill.take();
                spill.extend(keys);
                tracing::trace!(target: "lou::bridge", queued = spill.len(), "release queued while store busy");
                self.spill.set(spill);
            }
        }
    }

    fn flush_pending(&self) {
        loop {
            let spill = self.spill.take();
            if !spill.is_empty() {
                match self.pending.try_borrow_mut() {
                    Ok(mut pending) => pending.extend(spill),
                    Err(_) => {
                        self.spill.set(spill);
                        return;
                    }
                }
            }
            let keys = match self.pending.try_borrow_mut() {
                Ok(mut pending) if !pending.is_empty() => std::mem::take(&mut *pending),
                _ => return,
            };
            let Ok(mut slots) = self.slots.try_borrow_mut() else {
                self.requeue(keys);
                return;
            };
            let released: Vec<Entry> = keys.into_iter().filter_map(|k| slots.take(k)).collect();
            drop(slots);
            drop(released);
        }
    }

    /// 按键取条目，代数不匹配时返回 `None`
    pub fn get(&self, key: Key) -> Option<(Tag, Entry)> {
        self.flush_pending();
        self.slots.try_borrow().ok()?.get(key)
    }

    pub fn contains(&self, key: Key) -> bool {
        self.get(key).is_some()
    }

    /// 当前存活对象数量
    pub fn len(&self) -> usize {
        self.flush_pending();
        self.slots.borrow().live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 以类型 `T` 取对象
    pub fn native<T: Tagged>(&self, key: Key) -> BridgeResult<Native<T>> {
        let (tag, entry) = self.get(key).ok_or(BridgeError::StaleReference {
            type_name: T::TAG.name(),
        })?;
        if tag != T::TAG {
            return Err(BridgeError::TypeMismatch {
                expected: T::TAG.name(),
                actual: tag.name().to_string(),
            });
        }
        Ok(Native::new(entry))
    }

    pub fn typed<T: Tagged>(&self, key: TypedKey<T>) -> BridgeResult<Native<T>> {
        self.native(key.key)
    }
}

/// 解析后得到的原生对象访问器
pub struct Native<T> {
    entry: Entry,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Tagged> Native<T> {
    fn new(entry: Entry) -> Self {
        Self {
            entry,
            _marker: PhantomData,
        }
    }

    pub fn borrow(&self) -> BridgeResult<Ref<'_, T>> {
        let any = self.entry.try_borrow().map_err(|_| BridgeError::Busy {
            type_name: T::TAG.name(),
        })?;
        Ref::filter_map(any, |any| any.downcast_ref::<T>()).map_err(|_| {
            BridgeError::TypeMismatch {
                expected: T::TAG.name(),
                actual: "foreign object".to_string(),
            }
        })
    }

    pub fn borrow_mut(&self) -> BridgeResult<RefMut<'_, T>> {
        let any = self.entry.try_borrow_mut().map_err(|_| BridgeError::Busy {
            type_name: T::TAG.name(),
        })?;
        RefMut::filter_map(any, |any| any.downcast_mut::<T>()).map_err(|_| {
            BridgeError::TypeMismatch {
                expected: T::TAG.name(),
                actual: "foreign object".to_string(),
            }
        })
    }

    /// 两个访问器是否指向同一个对象
    pub fn ptr_eq(&self, other: &Native<T>) -> bool {
        Rc::ptr_eq(&self.entry, &other.entry)
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }
}

impl<T> Clone for Native<T> {
    fn clone(&self) -> Self {
        Self {
            entry: Rc::clone(&self.entry),
            _marker: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    struct Probe(u32);

    impl Tagged for Probe {
        const TAG: Tag = Tag::Rect;
    }

    struct Other;

    impl Tagged for Other {
        const TAG: Tag = Tag::Vec2;
    }

    #[test]
    fn test_insert_and_resolve() {
        let store = Store::new();
        let key = store.insert(Probe(7));
        let native = store.typed(key).unwrap();
        assert_eq!(native.borrow().unwrap().0, 7);
        native.borrow_mut().unwrap().0 = 9;
        assert_eq!(store.typed(key).unwrap().borrow().unwrap().0, 9);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_removed_key_is_stale() {
        let store = Store::new();
        let key = store.insert(Probe(1));
        assert!(store.remove(key.key()));
        assert!(!store.remove(key.key()));
        let err = store.typed(key).err().unwrap();
        assert!(matches!(err, BridgeError::StaleReference { type_name: "Rect" }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_reused_slot_does_not_revive_old_key() {
        let store = Store::new();
        let old = store.insert(Probe(1));
        store.remove(old.key());
        let new = store.insert(Probe(2));
        assert_eq!(old.key().index(), new.key().index());
        assert_ne!(old.key(), new.key());
        assert!(store.typed(old).is_err());
        assert_eq!(store.typed(new).unwrap().borrow().unwrap().0, 2);
    }

    #[test]
    fn test_wrong_type_names_both() {
        let store = Store::new();
        let key = store.insert(Other);
        let err = store.native::<Probe>(key.key()).err().unwrap();
        assert_eq!(err.to_string(), "expected Rect, got Vec2");
    }

    #[test]
    fn test_busy_borrow_is_an_error() {
        let store = Store::new();
        let key = store.insert(Probe(1));
        let native = store.typed(key).unwrap();
        let _guard = native.borrow_mut().unwrap();
        assert!(matches!(
            native.borrow(),
            Err(BridgeError::Busy { type_name: "Rect" })
        ));
    }

    #[test]
    fn test_deferred_release() {
        let store = Store::new();
        let key = store.insert(Probe(1));
        store.release(key.key());
        assert!(!store.contains(key.key()));
    }

    #[test]
    fn test_release_while_queue_busy_is_not_lost() {
        let store = Store::new();
        let first = store.insert(Probe(1));
        let second = store.insert(Probe(2));
        {
            let _queue = store.pending.borrow_mut();
            store.release(first.key());
            store.release(second.key());
        }
        assert_eq!(store.len(), 0);
        assert!(!store.contains(first.key()));
        assert!(!store.contains(second.key()));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Create(u32),
        Destroy(usize),
        Resolve(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            any::<u32>().prop_map(Op::Create),
            (0usize..64).prop_map(Op::Destroy),
            (0usize..64).prop_map(Op::Resolve),
        ]
    }

    proptest! {
        // 在引用未释放时反复创建、销毁拥有者：失效键永远解析失败，
        // 存活键永远解析到自己的值
        #[test]
        fn test_references_never_dangle(ops in prop::collection::vec(op(), 1..200)) {
            let store = Store::new();
            let mut live: Vec<(TypedKey<Probe>, u32)> = Vec::new();
            let mut dead: Vec<TypedKey<Probe>> = Vec::new();
            for op in ops {
                match op {
                    Op::Create(value) => live.push((store.insert(Probe(value)), value)),
                    Op::Destroy(i) if !live.is_empty() => {
                        let (key, _) = live.remove(i % live.len());
                        prop_assert!(store.remove(key.key()));
                        dead.push(key);
                    }
                    Op::Resolve(i) if !live.is_empty() => {
                        let (key, value) = live[i % live.len()];
                        prop_assert_eq!(store.typed(key).unwrap().borrow().unwrap().0, value);
                    }
                    _ => {}
                }
                for key in &dead {
                    prop_assert!(store.typed(*key).is_err());
                }
            }
            prop_assert_eq!(store.len(), live.len());
        }
    }
}
