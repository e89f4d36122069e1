//! 根宿主状态，以全局名 `lou` 暴露

use rquickjs::Value;

use super::roots;
use crate::bridge::{Atom, Call, DispatchTable, Tag, Tagged};
use crate::callbacks::subscription::subscribe;
use crate::callbacks::CallbackList;
use crate::core::error::OrThrow;

#[derive(Debug)]
pub struct State {
    pub on_update: CallbackList<(f64,)>,
    pub on_render: CallbackList<()>,
    running: bool,
}

impl Tagged for State {
    const TAG: Tag = Tag::State;
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    pub fn new() -> Self {
        Self {
            on_update: CallbackList::new("on_update"),
            on_render: CallbackList::new("on_render"),
            running: true,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn quit(&mut self) {
        if self.running {
            tracing::info!(target: "lou::host", "quit requested");
        }
        self.running = false;
    }

    /// 释放所有回调持有的解释器值
    pub fn clear(&self) {
        self.on_update.clear();
        self.on_render.clear();
    }
}

pub fn table() -> DispatchTable {
    DispatchTable::new(Tag::State)
        .index(index)
        .newindex(newindex)
        .namecall(namecall)
        .tostring(tostring)
}

fn index<'js>(call: &Call<'js>, atom: Atom) -> rquickjs::Result<Option<Value<'js>>> {
    let roots = roots(&call.ctx, &call.bridge)?;
    let value = match atom {
        Atom::Console => call.reference(roots.console)?,
        Atom::Keyboard => call.reference(roots.keyboard)?,
        Atom::Mouse => call.reference(roots.mouse)?,
        Atom::Window => call.reference(roots.window)?,
        Atom::Renderer => call.reference(roots.renderer)?,
        Atom::Texture => call.reference(roots.texture)?,
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn newindex<'js>(call: &Call<'js>, atom: Atom, _value: Value<'js>) -> rquickjs::Result<()> {
    match atom {
        Atom::Console | Atom::Keyboard | Atom::Mouse | Atom::Window | Atom::Renderer | Atom::Texture => {
            Err(call.readonly(atom))
        }
        _ => Err(call.invalid_field(atom)),
    }
}

fn namecall<'js>(call: &Call<'js>, atom: Atom) -> rquickjs::Result<Value<'js>> {
    match atom {
        Atom::OnUpdate => {
            let list = call.this::<State>()?.borrow().or_throw(&call.ctx)?.on_update.clone();
            subscribe(call, &list, 0)
        }
        Atom::OnRender => {
            let list = call.this::<State>()?.borrow().or_throw(&call.ctx)?.on_render.clone();
            subscribe(call, &list, 0)
        }
        Atom::Quit => {
            call.this::<State>()?.borrow_mut().or_throw(&call.ctx)?.quit();
            Ok(call.undefined())
        }
        _ => Err(call.invalid_method(atom)),
    }
}

fn tostring(call: &Call<'_>) -> rquickjs::Result<String> {
    let running = call.this::<State>()?.borrow().or_throw(&call.ctx)?.is_running();
    Ok(format!("State({})", if running { "running" } else { "quitting" }))
}
