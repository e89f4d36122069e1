//! 脚本可见的订阅句柄

use rquickjs::Value;

use super::{CallbackList, Unbinder};
use crate::bridge::{Atom, Call, DispatchTable, Tag, Tagged};
use crate::core::error::OrThrow;

/// 订阅方法返回给脚本的对象，支持 `unbind()` / `destroy()`
#[derive(Debug)]
pub struct Subscription {
    unbinder: Unbinder,
}

impl Tagged for Subscription {
    const TAG: Tag = Tag::Subscription;
}

impl Subscription {
    pub fn new(unbinder: Unbinder) -> Self {
        Self { unbinder }
    }

    pub fn unbinder(&self) -> &Unbinder {
        &self.unbinder
    }
}

/// 把第 `index` 个参数订阅到 `list`，返回订阅句柄
pub fn subscribe<'js, A>(call: &Call<'js>, list: &CallbackList<A>, index: usize) -> rquickjs::Result<Value<'js>> {
    let callback = call.args.function(index)?;
    let unbinder = list.add(&call.ctx, callback);
    call.owning(Subscription::new(unbinder))
}

pub fn table() -> DispatchTable {
    DispatchTable::new(Tag::Subscription)
        .index(index)
        .namecall(namecall)
        .tostring(tostring)
}

fn index<'js>(call: &Call<'js>, atom: Atom) -> rquickjs::Result<Option<Value<'js>>> {
    match atom {
        Atom::Active => {
            let active = call.this::<Subscription>()?.borrow().or_throw(&call.ctx)?.unbinder.is_active();
            call.value(active).map(Some)
        }
        _ => Ok(None),
    }
}

fn namecall<'js>(call: &Call<'js>, atom: Atom) -> rquickjs::Result<Value<'js>> {
    match atom {
        Atom::Unbind | Atom::Destroy => {
            let unbinder = call.this::<Subscription>()?.borrow().or_throw(&call.ctx)?.unbinder.clone();
            unbinder.unbind();
            Ok(call.undefined())
        }
        _ => Err(call.invalid_method(atom)),
    }
}

fn tostring(call: &Call<'_>) -> rquickjs::Result<String> {
    let native = call.this::<Subscription>()?;
    let subscription = native.borrow().or_throw(&call.ctx)?;
    let unbinder = &subscription.unbinder;
    Ok(format!(
        "Subscription({} {}, {})",
        unbinder.list_name().unwrap_or("<gone>"),
        unbinder.id(),
        if unbinder.is_active() { "active" } else { "inert" }
    ))
}
