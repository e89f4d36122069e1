//! 回调注册表
//!
//! 每个事件源拥有一个 [`CallbackList`]，按参数类型特化。脚本通过订阅方法加入闭包，
//! 宿主每次事件调用一次 [`CallbackList::call`]：
//!
//! - 按加入顺序调用
//! - 单个闭包抛错只记录到控制台，不影响其余闭包
//! - `unbind` 只把条目标记为失效，物理删除发生在两次调用之间

pub mod subscription;

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use rquickjs::function::IntoArgs;
use rquickjs::{Ctx, Function, Persistent, Value};

use crate::core::error::describe_caught;

pub use subscription::Subscription;

/// 订阅标识，在同一列表内唯一
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 回调抛出的错误的去处
pub trait ErrorSink {
    fn report(&self, source: &str, message: &str);
}

/// 一次调用的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub invoked: usize,
    pub failed: usize,
}

struct Binding {
    id: SubscriptionId,
    callback: Persistent<Function<'static>>,
    active: bool,
}

struct ListState {
    name: &'static str,
    entries: Vec<Binding>,
    next_id: u64,
    draining: usize,
}

impl ListState {
    fn unbind(&mut self, id: SubscriptionId) -> bool {
        match self.entries.iter_mut().find(|binding| binding.id == id) {
            Some(binding) if binding.active => {
                binding.active = false;
                true
            }
            _ => false,
        }
    }

    fn is_active(&self, id: SubscriptionId) -> bool {
        self.entries
            .iter()
            .any(|binding| binding.id == id && binding.active)
    }
}

/// 有序的脚本闭包集合
///
/// `A` 是事件携带的参数元组，例如 `(f64,)`、`(String, f64, f64)`。
pub struct CallbackList<A> {
    state: Rc<RefCell<ListState>>,
    _args: PhantomData<fn(A)>,
}

impl<A> Clone for CallbackList<A> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
            _args: PhantomData,
        }
    }
}

impl<A> fmt::Debug for CallbackList<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("CallbackList")
            .field("name", &state.name)
            .field("entries", &state.entries.len())
            .finish()
    }
}

impl<A> CallbackList<A> {
    pub fn new(name: &'static str) -> Self {
        Self {
            state: Rc::new(RefCell::new(ListState {
                name,
                entries: Vec::new(),
                next_id: 1,
                draining: 0,
            })),
            _args: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.state.borrow().name
    }

    /// 追加一个闭包，返回可用于解绑的句柄
    pub fn add<'js>(&self, ctx: &Ctx<'js>, callback: Function<'js>) -> Unbinder {
        let mut state = self.state.borrow_mut();
        let id = SubscriptionId(state.next_id);
        state.next_id += 1;
        state.entries.push(Binding {
            id,
            callback: Persistent::save(ctx, callback),
            active: true,
        });
        tracing::debug!(target: "lou::callbacks", list = state.name, %id, "subscribed");
        Unbinder {
            list: Rc::downgrade(&self.state),
            id,
        }
    }

    /// 标记为失效；重复调用无副作用
    pub fn unbind(&self, id: SubscriptionId) -> bool {
        self.state.borrow_mut().unbind(id)
    }

    pub fn is_active(&self, id: SubscriptionId) -> bool {
        self.state.borrow().is_active(id)
    }

    /// 条目总数（包括尚未清理的失效条目）
    pub fn len(&self) -> usize {
        self.state.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn active_len(&self) -> usize {
        self.state
            .borrow()
            .entries
            .iter()
            .filter(|binding| binding.active)
            .count()
    }

    /// 删除失效条目；调用进行中时不做任何事
    pub fn compact(&self) -> usize {
        let removed: Vec<Binding> = {
            let mut state = self.state.borrow_mut();
            if state.draining > 0 {
                return 0;
            }
            let (active, inert) = std::mem::take(&mut state.entries)
                .into_iter()
                .partition(|binding| binding.active);
            state.entries = active;
            inert
        };
        removed.len()
    }

    /// 释放所有闭包，运行时销毁前调用
    pub fn clear(&self) {
        let entries = std::mem::take(&mut self.state.borrow_mut().entries);
        drop(entries);
    }
}

impl<A> CallbackList<A>
where
    A: for<'js> IntoArgs<'js> + Clone,
{
    /// 按加入顺序调用所有有效闭包
    ///
    /// 调用开始时对条目做快照：期间新加入的闭包下次才会被调用，
    /// 期间被解绑的闭包立即跳过。
    pub fn call<'js>(&self, ctx: &Ctx<'js>, sink: &dyn ErrorSink, args: A) -> DrainReport {
        self.compact();
        let (name, snapshot) = {
            let mut state = self.state.borrow_mut();
            state.draining += 1;
            let snapshot: Vec<(SubscriptionId, Persistent<Function<'static>>)> = state
                .entries
                .iter()
                .filter(|binding| binding.active)
                .map(|binding| (binding.id, binding.callback.clone()))
                .collect();
            (state.name, snapshot)
        };

        let mut report = DrainReport::default();
        for (id, callback) in snapshot {
            if !self.is_active(id) {
                continue;
            }
            report.invoked += 1;
            let result = callback
                .restore(ctx)
                .and_then(|function| function.call::<A, Value>(args.clone()).map(|_| ()));
            if let Err(err) = result {
                report.failed += 1;
                let message = describe_caught(ctx, err);
                tracing::error!(target: "lou::callbacks", list = name, %id, "{message}");
                sink.report(name, &message);
            }
        }

        self.state.borrow_mut().draining -= 1;
        report
    }
}

/// 指向某个列表中某个订阅的弱链接
#[derive(Clone)]
pub struct Unbinder {
    list: Weak<RefCell<ListState>>,
    id: SubscriptionId,
}

impl Unbinder {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// 列表已不存在时什么也不做
    pub fn unbind(&self) -> bool {
        match self.list.upgrade() {
            Some(state) => state.borrow_mut().unbind(self.id),
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.list
            .upgrade()
            .map_or(false, |state| state.borrow().is_active(self.id))
    }

    pub fn list_name(&self) -> Option<&'static str> {
        self.list.upgrade().map(|state| state.borrow().name)
    }
}

impl fmt::Debug for Unbinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unbinder").field("id", &self.id).finish()
    }
}
