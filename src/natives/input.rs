//! 键盘与鼠标
//!
//! 两者都是宿主拥有的根对象。宿主把每个输入事件翻译成恰好一次回调列表调用，
//! 同时维护按下的键集合和指针位置，供脚本查询。

use std::collections::HashSet;

use glam::Vec2;
use rquickjs::Value;

use crate::bridge::{Atom, Call, DispatchTable, Tag, Tagged};
use crate::callbacks::subscription::subscribe;
use crate::callbacks::CallbackList;
use crate::core::error::OrThrow;

// ============================================================================
// Keyboard
// ============================================================================

#[derive(Debug)]
pub struct Keyboard {
    held: HashSet<String>,
    pub pressed: CallbackList<(String,)>,
    pub released: CallbackList<(String,)>,
}

impl Tagged for Keyboard {
    const TAG: Tag = Tag::Keyboard;
}

impl Default for Keyboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Keyboard {
    pub fn new() -> Self {
        Self {
            held: HashSet::new(),
            pressed: CallbackList::new("keyboard.pressed"),
            released: CallbackList::new("keyboard.released"),
        }
    }

    pub fn key_down(&mut self, key: &str) {
        self.held.insert(key.to_string());
    }

    pub fn key_up(&mut self, key: &str) {
        self.held.remove(key);
    }

    pub fn is_down(&self, key: &str) -> bool {
        self.held.contains(key)
    }

    pub fn clear(&self) {
        self.pressed.clear();
        self.released.clear();
    }
}

pub fn keyboard_table() -> DispatchTable {
    DispatchTable::new(Tag::Keyboard).namecall(keyboard_namecall)
}

fn keyboard_namecall<'js>(call: &Call<'js>, atom: Atom) -> rquickjs::Result<Value<'js>> {
    let native = call.this::<Keyboard>()?;
    match atom {
        Atom::Pressed => {
            let list = native.borrow().or_throw(&call.ctx)?.pressed.clone();
            subscribe(call, &list, 0)
        }
        Atom::Released => {
            let list = native.borrow().or_throw(&call.ctx)?.released.clone();
            subscribe(call, &list, 0)
        }
        Atom::IsPressed | Atom::IsDown => {
            let key = call.args.string(0)?;
            let down = native.borrow().or_throw(&call.ctx)?.is_down(&key);
            call.value(down)
        }
        _ => Err(call.invalid_method(atom)),
    }
}

// ============================================================================
// Mouse
// ============================================================================

#[derive(Debug)]
pub struct Mouse {
    position: Vec2,
    pub pressed: CallbackList<(String, f64, f64)>,
    pub released: CallbackList<(String, f64, f64)>,
    pub moved: CallbackList<(f64, f64)>,
}

impl Tagged for Mouse {
    const TAG: Tag = Tag::Mouse;
}

impl Default for Mouse {
    fn default() -> Self {
        Self::new()
    }
}

impl Mouse {
    pub fn new() -> Self {
        Self {
            position: Vec2::ZERO,
            pressed: CallbackList::new("mouse.pressed"),
            released: CallbackList::new("mouse.released"),
            moved: CallbackList::new("mouse.moved"),
        }
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn set_position(&mut self, x: f32, y: f32) {
        self.position = Vec2::new(x, y);
    }

    pub fn clear(&self) {
        self.pressed.clear();
        self.released.clear();
        self.moved.clear();
    }
}

pub fn mouse_table() -> DispatchTable {
    DispatchTable::new(Tag::Mouse)
        .index(mouse_index)
        .newindex(mouse_newindex)
        .namecall(mouse_namecall)
}

fn mouse_index<'js>(call: &Call<'js>, atom: Atom) -> rquickjs::Result<Option<Value<'js>>> {
    let position = call.this::<Mouse>()?.borrow().or_throw(&call.ctx)?.position();
    match atom {
        Atom::X => call.value(position.x as f64).map(Some),
        Atom::Y => call.value(position.y as f64).map(Some),
        _ => Ok(None),
    }
}

fn mouse_newindex<'js>(call: &Call<'js>, atom: Atom, _value: Value<'js>) -> rquickjs::Result<()> {
    match atom {
        Atom::X | Atom::Y => Err(call.readonly(atom)),
        _ => Err(call.invalid_field(atom)),
    }
}

fn mouse_namecall<'js>(call: &Call<'js>, atom: Atom) -> rquickjs::Result<Value<'js>> {
    let native = call.this::<Mouse>()?;
    match atom {
        Atom::Pressed => {
            let list = native.borrow().or_throw(&call.ctx)?.pressed.clone();
            subscribe(call, &list, 0)
        }
        Atom::Released => {
            let list = native.borrow().or_throw(&call.ctx)?.released.clone();
            subscribe(call, &list, 0)
        }
        Atom::Moved => {
            let list = native.borrow().or_throw(&call.ctx)?.moved.clone();
            subscribe(call, &list, 0)
        }
        Atom::Position => {
            let position = native.borrow().or_throw(&call.ctx)?.position();
            call.value(vec![position.x as f64, position.y as f64])
        }
        _ => Err(call.invalid_method(atom)),
    }
}
