//! 句柄系统
//!
//! 脚本持有的每个原生对象都是一个 [`HandleCell`] 类实例（外面再包一层 Proxy），
//! 其中只保存原始标签和存储键：
//! - 拥有型句柄：实例被回收时释放存储中的对象
//! - 引用型句柄：对象由宿主拥有，回收时什么都不做
//!
//! 解析时检查标签是否为期望类型的两个合法取值之一，再按代数取出对象。

use std::rc::Weak;

use rquickjs::class::{Trace, Tracer};
use rquickjs::{Class, Value};

use super::store::{Key, Native, Store};
use super::tag::{HandleKind, RawTag, Tag, Tagged};
use crate::core::error::{BridgeError, BridgeResult};

/// 代理对象上用于取回内部句柄的键
pub const HANDLE_KEY: &str = "__handle";

/// 脚本可见的句柄值：原始标签 + 存储键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    raw: RawTag,
    key: Key,
}

impl Handle {
    pub fn owning(tag: Tag, key: Key) -> Self {
        Self {
            raw: tag.owning(),
            key,
        }
    }

    pub fn reference(tag: Tag, key: Key) -> Self {
        Self {
            raw: tag.reference(),
            key,
        }
    }

    pub fn raw(&self) -> RawTag {
        self.raw
    }

    pub fn key(&self) -> Key {
        self.key
    }

    pub fn tag(&self) -> Tag {
        self.raw.tag().unwrap_or(Tag::Unknown)
    }

    pub fn kind(&self) -> HandleKind {
        self.raw
            .decode()
            .map(|(_, kind)| kind)
            .unwrap_or(HandleKind::Reference)
    }
}

/// 解释器中的句柄实例
#[rquickjs::class]
pub struct HandleCell {
    handle: Handle,
    store: Weak<Store>,
}

impl<'js> Trace<'js> for HandleCell {
    fn trace<'a>(&self, _tracer: Tracer<'a, 'js>) {}
}

impl HandleCell {
    pub(crate) fn new(handle: Handle, store: Weak<Store>) -> Self {
        Self { handle, store }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }
}

impl Drop for HandleCell {
    fn drop(&mut self) {
        if self.handle.kind() != HandleKind::Owning {
            return;
        }
        if let Some(store) = self.store.upgrade() {
            store.release(self.handle.key);
        }
    }
}

/// 直接从类实例取句柄（不经过代理）
pub(crate) fn cell_handle(value: &Value<'_>) -> Option<Handle> {
    let cell = value.get::<Class<'_, HandleCell>>().ok()?;
    let handle = cell.try_borrow().ok()?.handle;
    Some(handle)
}

/// 从脚本传入的值中取出句柄，代理和裸实例都接受
pub fn handle_of(value: &Value<'_>) -> Option<Handle> {
    let object = value.as_object()?;
    if let Some(handle) = cell_handle(value) {
        return Some(handle);
    }
    let target: Value = object.get(HANDLE_KEY).ok()?;
    cell_handle(&target)
}

/// 错误信息里使用的实际类型名
pub fn describe_value(value: &Value<'_>) -> String {
    if let Some(handle) = handle_of(value) {
        return handle.tag().name().to_string();
    }
    let name = if value.is_undefined() {
        "undefined"
    } else if value.is_null() {
        "null"
    } else if value.is_bool() {
        "boolean"
    } else if value.as_number().is_some() {
        "number"
    } else if value.is_string() {
        "string"
    } else if value.is_symbol() {
        "symbol"
    } else if value.is_function() {
        "function"
    } else if value.is_array() {
        "array"
    } else {
        "object"
    };
    name.to_string()
}

impl Store {
    /// 把句柄解析为 `T`
    ///
    /// 只接受 `T` 的拥有型标签或引用型标签，其余一律是类型错误。
    pub fn resolve<T: Tagged>(&self, handle: Handle) -> BridgeResult<Native<T>> {
        if !handle.raw.accepts(T::TAG) {
            return Err(BridgeError::TypeMismatch {
                expected: T::TAG.name(),
                actual: handle.tag().name().to_string(),
            });
        }
        self.native::<T>(handle.key)
    }

    /// 同样的匹配逻辑，不匹配时返回 `None`
    pub fn resolve_optional<T: Tagged>(&self, handle: Handle) -> Option<Native<T>> {
        self.resolve(handle).ok()
    }

    /// 解析脚本值
    pub fn resolve_value<T: Tagged>(&self, value: &Value<'_>) -> BridgeResult<Native<T>> {
        match handle_of(value) {
            Some(handle) => self.resolve(handle),
            None => Err(BridgeError::TypeMismatch {
                expected: T::TAG.name(),
                actual: describe_value(value),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    struct Boxed(i32);

    impl Tagged for Boxed {
        const TAG: Tag = Tag::Rect;
    }

    struct Elsewhere;

    impl Tagged for Elsewhere {
        const TAG: Tag = Tag::Window;
    }

    #[test]
    fn test_both_kinds_resolve_to_same_object() {
        let store = Store::new();
        let key = store.insert(Boxed(3));
        let owning = Handle::owning(Tag::Rect, key.key());
        let reference = Handle::reference(Tag::Rect, key.key());
        let a = store.resolve::<Boxed>(owning).unwrap();
        let b = store.resolve::<Boxed>(reference).unwrap();
        assert!(a.ptr_eq(&b));
        assert_eq!(owning.kind(), HandleKind::Owning);
        assert_eq!(reference.kind(), HandleKind::Reference);
    }

    #[test]
    fn test_mismatch_names_expected_and_actual() {
        let store = Store::new();
        let key = store.insert(Elsewhere);
        let handle = Handle::reference(Tag::Window, key.key());
        let err = store.resolve::<Boxed>(handle).err().unwrap();
        assert_eq!(err.to_string(), "expected Rect, got Window");
        assert!(store.resolve_optional::<Boxed>(handle).is_none());
        assert!(store.resolve_optional::<Elsewhere>(handle).is_some());
    }

    #[test]
    fn test_dropping_owning_cell_releases_slot() {
        let store = Rc::new(Store::new());
        let key = store.insert(Boxed(1));
        let reference = HandleCell::new(Handle::reference(Tag::Rect, key.key()), Rc::downgrade(&store));
        drop(reference);
        assert!(store.contains(key.key()));

        let owning = HandleCell::new(Handle::owning(Tag::Rect, key.key()), Rc::downgrade(&store));
        drop(owning);
        assert!(!store.contains(key.key()));
    }
}
