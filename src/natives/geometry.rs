//! 几何值类型：`Rect`、`Vec2`、`Color`
//!
//! 三者都是拥有型句柄，由同名全局构造器创建。缺省的数字参数为 0，
//! `Color` 的 alpha 缺省为 255。

use std::fmt;
use std::rc::Rc;

use glam::Vec2;
use rquickjs::Value;

use super::{assigned_integer, assigned_number};
use crate::bridge::handle::describe_value;
use crate::bridge::{Args, ArithOp, Atom, Bridge, Call, DispatchTable, Tag, Tagged};
use crate::core::error::OrThrow;

// ============================================================================
// Rect
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }
}

impl Tagged for Rect {
    const TAG: Tag = Tag::Rect;
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rect: {{{}, {}, {}, {}}}", self.x, self.y, self.w, self.h)
    }
}

pub fn construct_rect<'js>(bridge: &Rc<Bridge>, args: &Args<'js>) -> rquickjs::Result<Value<'js>> {
    let rect = Rect::new(
        args.opt_number(0, 0.0)? as f32,
        args.opt_number(1, 0.0)? as f32,
        args.opt_number(2, 0.0)? as f32,
        args.opt_number(3, 0.0)? as f32,
    );
    bridge.create_owning(args.ctx(), rect)
}

pub fn rect_table() -> DispatchTable {
    DispatchTable::new(Tag::Rect)
        .index(rect_index)
        .newindex(rect_newindex)
        .namecall(rect_namecall)
        .tostring(rect_tostring)
}

fn rect_index<'js>(call: &Call<'js>, atom: Atom) -> rquickjs::Result<Option<Value<'js>>> {
    let native = call.this::<Rect>()?;
    let rect = *native.borrow().or_throw(&call.ctx)?;
    let value = match atom {
        Atom::X => rect.x,
        Atom::Y => rect.y,
        Atom::W => rect.w,
        Atom::H => rect.h,
        _ => return Ok(None),
    };
    call.value(value as f64).map(Some)
}

fn rect_newindex<'js>(call: &Call<'js>, atom: Atom, value: Value<'js>) -> rquickjs::Result<()> {
    let native = call.this::<Rect>()?;
    let mut rect = native.borrow_mut().or_throw(&call.ctx)?;
    let slot = match atom {
        Atom::X => &mut rect.x,
        Atom::Y => &mut rect.y,
        Atom::W => &mut rect.w,
        Atom::H => &mut rect.h,
        _ => return Err(call.invalid_field(atom)),
    };
    *slot = assigned_number(call, &value)? as f32;
    Ok(())
}

fn rect_namecall<'js>(call: &Call<'js>, atom: Atom) -> rquickjs::Result<Value<'js>> {
    match atom {
        Atom::AsTuple => {
            let rect = *call.this::<Rect>()?.borrow().or_throw(&call.ctx)?;
            call.value(vec![rect.x as f64, rect.y as f64, rect.w as f64, rect.h as f64])
        }
        _ => Err(call.invalid_method(atom)),
    }
}

fn rect_tostring(call: &Call<'_>) -> rquickjs::Result<String> {
    let rect = *call.this::<Rect>()?.borrow().or_throw(&call.ctx)?;
    Ok(rect.to_string())
}

// ============================================================================
// Vec2
// ============================================================================

impl Tagged for Vec2 {
    const TAG: Tag = Tag::Vec2;
}

pub fn construct_vec2<'js>(bridge: &Rc<Bridge>, args: &Args<'js>) -> rquickjs::Result<Value<'js>> {
    let vec = Vec2::new(args.opt_number(0, 0.0)? as f32, args.opt_number(1, 0.0)? as f32);
    bridge.create_owning(args.ctx(), vec)
}

pub fn vec2_table() -> DispatchTable {
    DispatchTable::new(Tag::Vec2)
        .index(vec2_index)
        .newindex(vec2_newindex)
        .namecall(vec2_namecall)
        .tostring(vec2_tostring)
        .arith(vec2_arith)
}

fn this_vec2(call: &Call<'_>) -> rquickjs::Result<Vec2> {
    let native = call.this::<Vec2>()?;
    let vec = *native.borrow().or_throw(&call.ctx)?;
    Ok(vec)
}

/// 算术右操作数：另一个 `Vec2` 或数字
fn operand(call: &Call<'_>) -> rquickjs::Result<Vec2> {
    if let Some(other) = call.opt_native::<Vec2>(0) {
        let vec = *other.borrow().or_throw(&call.ctx)?;
        return Ok(vec);
    }
    let value = call.args.get(0);
    match value.as_number() {
        Some(number) => Ok(Vec2::splat(number as f32)),
        None => Err(call
            .args
            .error(0, format!("Vec2 or number expected, got {}", describe_value(&value)))),
    }
}

fn vec2_index<'js>(call: &Call<'js>, atom: Atom) -> rquickjs::Result<Option<Value<'js>>> {
    let vec = this_vec2(call)?;
    match atom {
        Atom::X => call.value(vec.x as f64).map(Some),
        Atom::Y => call.value(vec.y as f64).map(Some),
        _ => Ok(None),
    }
}

fn vec2_newindex<'js>(call: &Call<'js>, atom: Atom, value: Value<'js>) -> rquickjs::Result<()> {
    let native = call.this::<Vec2>()?;
    let mut vec = native.borrow_mut().or_throw(&call.ctx)?;
    match atom {
        Atom::X => vec.x = assigned_number(call, &value)? as f32,
        Atom::Y => vec.y = assigned_number(call, &value)? as f32,
        _ => return Err(call.invalid_field(atom)),
    }
    Ok(())
}

fn vec2_namecall<'js>(call: &Call<'js>, atom: Atom) -> rquickjs::Result<Value<'js>> {
    let vec = this_vec2(call)?;
    match atom {
        Atom::Dot => {
            let other = *call.native::<Vec2>(0)?.borrow().or_throw(&call.ctx)?;
            call.value(vec.dot(other) as f64)
        }
        Atom::Length => call.value(vec.length() as f64),
        Atom::SquaredLength => call.value(vec.length_squared() as f64),
        Atom::Normalized => call.owning(vec.normalize_or_zero()),
        Atom::AsTuple => call.value(vec![vec.x as f64, vec.y as f64]),
        _ => Err(call.invalid_method(atom)),
    }
}

fn vec2_arith<'js>(call: &Call<'js>, op: ArithOp) -> rquickjs::Result<Value<'js>> {
    let vec = this_vec2(call)?;
    let result = match op {
        ArithOp::Add => vec + operand(call)?,
        ArithOp::Sub => vec - operand(call)?,
        ArithOp::Mul => vec * operand(call)?,
        ArithOp::Div => vec / operand(call)?,
        ArithOp::Neg => -vec,
    };
    call.owning(result)
}

fn vec2_tostring(call: &Call<'_>) -> rquickjs::Result<String> {
    let vec = this_vec2(call)?;
    Ok(format!("Vec2({}, {})", vec.x, vec.y))
}

// ============================================================================
// Color
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::new(0, 0, 0, 255);
    pub const WHITE: Color = Color::new(255, 255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

impl Tagged for Color {
    const TAG: Tag = Tag::Color;
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Color({}, {}, {}, {})", self.r, self.g, self.b, self.a)
    }
}

pub fn construct_color<'js>(bridge: &Rc<Bridge>, args: &Args<'js>) -> rquickjs::Result<Value<'js>> {
    let channel = |index: usize, default: i64| -> rquickjs::Result<u8> {
        Ok(args.opt_integer_in(index, 0, 255, default)? as u8)
    };
    let color = Color::new(channel(0, 0)?, channel(1, 0)?, channel(2, 0)?, channel(3, 255)?);
    bridge.create_owning(args.ctx(), color)
}

pub fn color_table() -> DispatchTable {
    DispatchTable::new(Tag::Color)
        .index(color_index)
        .newindex(color_newindex)
        .namecall(color_namecall)
        .tostring(color_tostring)
}

fn color_index<'js>(call: &Call<'js>, atom: Atom) -> rquickjs::Result<Option<Value<'js>>> {
    let color = *call.this::<Color>()?.borrow().or_throw(&call.ctx)?;
    let channel = match atom {
        Atom::R => color.r,
        Atom::G => color.g,
        Atom::B => color.b,
        Atom::A => color.a,
        _ => return Ok(None),
    };
    call.value(channel as i32).map(Some)
}

fn color_newindex<'js>(call: &Call<'js>, atom: Atom, value: Value<'js>) -> rquickjs::Result<()> {
    let native = call.this::<Color>()?;
    let mut color = native.borrow_mut().or_throw(&call.ctx)?;
    let channel = match atom {
        Atom::R => &mut color.r,
        Atom::G => &mut color.g,
        Atom::B => &mut color.b,
        Atom::A => &mut color.a,
        _ => return Err(call.invalid_field(atom)),
    };
    *channel = assigned_integer(call, &value, 0, 255)? as u8;
    Ok(())
}

fn color_namecall<'js>(call: &Call<'js>, atom: Atom) -> rquickjs::Result<Value<'js>> {
    match atom {
        Atom::AsTuple => {
            let color = *call.this::<Color>()?.borrow().or_throw(&call.ctx)?;
            call.value(vec![color.r as i32, color.g as i32, color.b as i32, color.a as i32])
        }
        _ => Err(call.invalid_method(atom)),
    }
}

fn color_tostring(call: &Call<'_>) -> rquickjs::Result<String> {
    let color = *call.this::<Color>()?.borrow().or_throw(&call.ctx)?;
    Ok(color.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_formats() {
        assert_eq!(Rect::new(1.0, 2.5, 3.0, 4.0).to_string(), "Rect: {1, 2.5, 3, 4}");
        assert_eq!(Color::new(1, 2, 3, 255).to_string(), "Color(1, 2, 3, 255)");
        assert_eq!(Color::default(), Color::BLACK);
    }
}
