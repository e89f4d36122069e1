//! 窗口，委托给 [`WindowBackend`] 协作方
//!
//! 协作方的失败原样带着消息变成脚本错误。

use rquickjs::Value;

use crate::bridge::{Atom, Call, DispatchTable, Tag, Tagged};
use crate::core::error::OrThrow;
use crate::platform::WindowBackend;

pub struct Window {
    backend: Box<dyn WindowBackend>,
}

impl Tagged for Window {
    const TAG: Tag = Tag::Window;
}

impl Window {
    pub fn new(backend: Box<dyn WindowBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &dyn WindowBackend {
        self.backend.as_ref()
    }

    pub fn backend_mut(&mut self) -> &mut dyn WindowBackend {
        self.backend.as_mut()
    }
}

pub fn table() -> DispatchTable {
    DispatchTable::new(Tag::Window).namecall(namecall).tostring(tostring)
}

fn namecall<'js>(call: &Call<'js>, atom: Atom) -> rquickjs::Result<Value<'js>> {
    let native = call.this::<Window>()?;
    let mut window = native.borrow_mut().or_throw(&call.ctx)?;
    let backend = window.backend_mut();
    match atom {
        Atom::Position => {
            let (x, y) = call.check(backend.position())?;
            call.value(vec![x, y])
        }
        Atom::Size => {
            let (w, h) = call.check(backend.size())?;
            call.value(vec![w, h])
        }
        Atom::SizeInPixels => {
            let (w, h) = call.check(backend.size_in_pixels())?;
            call.value(vec![w, h])
        }
        Atom::AspectRatio => {
            let (w, h) = call.check(backend.size())?;
            let ratio = if h == 0 { 0.0 } else { w as f64 / h as f64 };
            call.value(ratio)
        }
        Atom::Resize => {
            let width = call.args.integer_in(0, 1, u32::MAX as i64)? as u32;
            let height = call.args.integer_in(1, 1, u32::MAX as i64)? as u32;
            call.check(backend.set_size(width, height))?;
            Ok(call.undefined())
        }
        Atom::Reposition => {
            let x = call.args.integer_in(0, i32::MIN as i64, i32::MAX as i64)? as i32;
            let y = call.args.integer_in(1, i32::MIN as i64, i32::MAX as i64)? as i32;
            call.check(backend.set_position(x, y))?;
            Ok(call.undefined())
        }
        Atom::Title => call.value(backend.title()),
        Atom::SetTitle => {
            let title = call.args.string(0)?;
            call.check(backend.set_title(&title))?;
            Ok(call.undefined())
        }
        Atom::Opacity => {
            let opacity = call.check(backend.opacity())?;
            call.value(opacity as f64)
        }
        Atom::SetOpacity => {
            let opacity = call.args.number(0)? as f32;
            call.check(backend.set_opacity(opacity))?;
            Ok(call.undefined())
        }
        Atom::Maximize => {
            call.check(backend.maximize())?;
            Ok(call.undefined())
        }
        Atom::Minimize => {
            call.check(backend.minimize())?;
            Ok(call.undefined())
        }
        Atom::Restore => {
            call.check(backend.restore())?;
            Ok(call.undefined())
        }
        Atom::EnableFullscreen => {
            let enabled = call.args.opt_boolean(0, true)?;
            call.check(backend.set_fullscreen(enabled))?;
            Ok(call.undefined())
        }
        Atom::Resizable => call.value(backend.resizable()),
        Atom::SetResizable => {
            let resizable = call.args.boolean(0)?;
            call.check(backend.set_resizable(resizable))?;
            Ok(call.undefined())
        }
        _ => Err(call.invalid_method(atom)),
    }
}

fn tostring(call: &Call<'_>) -> rquickjs::Result<String> {
    let native = call.this::<Window>()?;
    let window = native.borrow().or_throw(&call.ctx)?;
    let backend = window.backend();
    let (w, h) = backend.size().unwrap_or_default();
    Ok(format!("Window(\"{}\", {w}x{h})", backend.title()))
}
