//! 渲染器，委托给 [`Canvas`] 协作方

use glam::Vec2;
use rquickjs::Value;

use super::geometry::{Color, Rect};
use super::texture::Texture;
use crate::bridge::{Atom, Call, DispatchTable, Tag, Tagged};
use crate::core::error::OrThrow;
use crate::platform::{BackendResult, BlendMode, Canvas};

pub struct Renderer {
    canvas: Box<dyn Canvas>,
}

impl Tagged for Renderer {
    const TAG: Tag = Tag::Renderer;
}

impl Renderer {
    pub fn new(canvas: Box<dyn Canvas>) -> Self {
        Self { canvas }
    }

    pub fn canvas(&self) -> &dyn Canvas {
        self.canvas.as_ref()
    }

    pub fn canvas_mut(&mut self) -> &mut dyn Canvas {
        self.canvas.as_mut()
    }

    /// 绘制纹理；`dst` 缺省为原点处的原始尺寸，`angle` 以度为单位
    pub fn draw_texture(&mut self, texture: &Texture, dst: Option<Rect>, src: Option<Rect>, angle: f64) -> BackendResult<()> {
        let info = texture.info();
        let dst = dst.unwrap_or(Rect::new(0.0, 0.0, info.width as f32, info.height as f32));
        self.canvas.draw_texture(info, src, dst, angle, texture.color())
    }
}

pub fn table() -> DispatchTable {
    DispatchTable::new(Tag::Renderer).namecall(namecall).tostring(tostring)
}

/// 从第 `index` 个参数开始取一个点：`Vec2` 占一个位置，否则两个数字
fn point(call: &Call<'_>, index: usize) -> rquickjs::Result<(Vec2, usize)> {
    if let Some(native) = call.opt_native::<Vec2>(index) {
        let at = *native.borrow().or_throw(&call.ctx)?;
        return Ok((at, index + 1));
    }
    let x = call.args.number(index)? as f32;
    let y = call.args.number(index + 1)? as f32;
    Ok((Vec2::new(x, y), index + 2))
}

fn opt_rect(call: &Call<'_>, index: usize) -> rquickjs::Result<Option<Rect>> {
    let value = call.args.get(index);
    if value.is_undefined() || value.is_null() {
        return Ok(None);
    }
    let rect = *call.native::<Rect>(index)?.borrow().or_throw(&call.ctx)?;
    Ok(Some(rect))
}

fn namecall<'js>(call: &Call<'js>, atom: Atom) -> rquickjs::Result<Value<'js>> {
    let native = call.this::<Renderer>()?;
    match atom {
        Atom::Clear => {
            call.check(native.borrow_mut().or_throw(&call.ctx)?.canvas_mut().clear())?;
        }
        Atom::SetDrawColor => {
            let color = *call.native::<Color>(0)?.borrow().or_throw(&call.ctx)?;
            native.borrow_mut().or_throw(&call.ctx)?.canvas_mut().set_draw_color(color);
        }
        Atom::GetDrawColor => {
            let color = native.borrow().or_throw(&call.ctx)?.canvas().draw_color();
            return call.owning(color);
        }
        Atom::SetBlendMode => {
            let name = call.args.string(0)?;
            let mode = BlendMode::from_name(&name)
                .ok_or_else(|| call.args.error(0, format!("unknown blend mode '{name}'")))?;
            call.check(native.borrow_mut().or_throw(&call.ctx)?.canvas_mut().set_blend_mode(mode))?;
        }
        Atom::GetBlendMode => {
            let mode = native.borrow().or_throw(&call.ctx)?.canvas().blend_mode();
            return call.value(mode.name());
        }
        Atom::DrawRect | Atom::FillRect => {
            let rect = *call.native::<Rect>(0)?.borrow().or_throw(&call.ctx)?;
            let filled = atom == Atom::FillRect;
            call.check(native.borrow_mut().or_throw(&call.ctx)?.canvas_mut().draw_rect(rect, filled))?;
        }
        Atom::DrawPoint => {
            let (at, _) = point(call, 0)?;
            call.check(native.borrow_mut().or_throw(&call.ctx)?.canvas_mut().draw_point(at))?;
        }
        Atom::DrawLine => {
            let (from, next) = point(call, 0)?;
            let (to, _) = point(call, next)?;
            call.check(native.borrow_mut().or_throw(&call.ctx)?.canvas_mut().draw_line(from, to))?;
        }
        Atom::RenderTexture => {
            let texture = call.native::<Texture>(0)?;
            let dst = opt_rect(call, 1)?;
            let src = opt_rect(call, 2)?;
            let texture = texture.borrow().or_throw(&call.ctx)?;
            call.check(native.borrow_mut().or_throw(&call.ctx)?.draw_texture(&texture, dst, src, 0.0))?;
        }
        _ => return Err(call.invalid_method(atom)),
    }
    Ok(call.undefined())
}

fn tostring(call: &Call<'_>) -> rquickjs::Result<String> {
    let native = call.this::<Renderer>()?;
    let renderer = native.borrow().or_throw(&call.ctx)?;
    let canvas = renderer.canvas();
    Ok(format!("Renderer({}, {})", canvas.draw_color(), canvas.blend_mode()))
}
