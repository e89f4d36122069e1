//! 暴露给脚本的原生类型
//!
//! 每个子模块提供一个类型的数据结构和它的分派表；[`table`] 按标签汇总，
//! 作为 [`Bridge`] 的表提供者。

pub mod console;
pub mod geometry;
pub mod input;
pub mod renderer;
pub mod runtime;
pub mod state;
pub mod texture;
pub mod window;

use std::path::PathBuf;
use std::rc::Rc;

use rquickjs::{Ctx, Exception, Value};

use crate::bridge::handle::describe_value;
use crate::bridge::{Args, Bridge, Call, DispatchTable, Native, Tag, Tagged, TypedKey};
use crate::callbacks::subscription;

pub use console::{Console, ConsoleEntry, ConsoleSink, Severity};
pub use geometry::{Color, Rect};
pub use input::{Keyboard, Mouse};
pub use renderer::Renderer;
pub use state::State;
pub use texture::{Font, Texture, TextureFactory};
pub use window::Window;

/// 宿主拥有的根对象，脚本只拿到它们的引用型句柄
#[derive(Debug, Clone, Copy)]
pub struct Roots {
    pub state: TypedKey<State>,
    pub console: TypedKey<Console>,
    pub keyboard: TypedKey<Keyboard>,
    pub mouse: TypedKey<Mouse>,
    pub window: TypedKey<Window>,
    pub renderer: TypedKey<Renderer>,
    pub texture: TypedKey<TextureFactory>,
}

/// 值为句柄代理的全局名，锁定时不做深度冻结
pub const HANDLE_GLOBALS: &[&str] = &["lou"];

/// 按标签提供分派表
pub fn table(tag: Tag) -> DispatchTable {
    match tag {
        Tag::State => state::table(),
        Tag::Console => console::table(),
        Tag::Rect => geometry::rect_table(),
        Tag::Vec2 => geometry::vec2_table(),
        Tag::Color => geometry::color_table(),
        Tag::Texture => texture::texture_table(),
        Tag::Font => texture::font_table(),
        Tag::Window => window::table(),
        Tag::Renderer => renderer::table(),
        Tag::Keyboard => input::keyboard_table(),
        Tag::Mouse => input::mouse_table(),
        Tag::TextureFactory => texture::factory_table(),
        Tag::Subscription => subscription::table(),
        Tag::Unknown => DispatchTable::new(Tag::Unknown),
    }
}

/// 安装全局名：`lou`、构造器、`print`/`warn` 以及 `collectgarbage`/`loadstring`
pub fn install_globals<'js>(ctx: &Ctx<'js>, bridge: &Rc<Bridge>, roots: Roots) -> rquickjs::Result<()> {
    let globals = ctx.globals();
    globals.set("lou", bridge.create_reference(ctx, roots.state)?)?;
    globals.set("Rect", bridge.global_function(ctx, "Rect", geometry::construct_rect)?)?;
    globals.set("Vec2", bridge.global_function(ctx, "Vec2", geometry::construct_vec2)?)?;
    globals.set("Color", bridge.global_function(ctx, "Color", geometry::construct_color)?)?;
    globals.set("Font", bridge.global_function(ctx, "Font", texture::construct_font)?)?;
    globals.set("print", bridge.global_function(ctx, "print", console::global_print)?)?;
    globals.set("warn", bridge.global_function(ctx, "warn", console::global_warn)?)?;
    globals.set(
        "collectgarbage",
        bridge.global_function(ctx, "collectgarbage", runtime::global_collectgarbage)?,
    )?;
    globals.set("loadstring", bridge.global_function(ctx, "loadstring", runtime::global_loadstring)?)?;
    tracing::debug!(target: "lou::bridge", "globals installed");
    Ok(())
}

pub(crate) fn roots(ctx: &Ctx<'_>, bridge: &Bridge) -> rquickjs::Result<Roots> {
    bridge
        .roots()
        .ok_or_else(|| Exception::throw_internal(ctx, "host state is not installed"))
}

/// 取某个根对象
pub(crate) fn root<T: Tagged>(ctx: &Ctx<'_>, bridge: &Bridge, pick: fn(Roots) -> TypedKey<T>) -> rquickjs::Result<Native<T>> {
    let key = pick(roots(ctx, bridge)?);
    bridge.store().typed(key).map_err(|err| err.throw(ctx))
}

/// 字段赋值的右值必须是数字
pub(crate) fn assigned_number(call: &Call<'_>, value: &Value<'_>) -> rquickjs::Result<f64> {
    value
        .as_number()
        .ok_or_else(|| call.args.error(0, format!("number expected, got {}", describe_value(value))))
}

pub(crate) fn assigned_integer(call: &Call<'_>, value: &Value<'_>, min: i64, max: i64) -> rquickjs::Result<i64> {
    let number = assigned_number(call, value)?;
    if number.fract() != 0.0 || number < min as f64 || number > max as f64 {
        return Err(call
            .args
            .error(0, format!("integer in {min}..={max} expected, got {number}")));
    }
    Ok(number as i64)
}

pub(crate) fn assigned_native<T: Tagged>(call: &Call<'_>, value: &Value<'_>) -> rquickjs::Result<Native<T>> {
    call.bridge
        .store()
        .resolve_value::<T>(value)
        .map_err(|err| call.args.reject(0, err))
}

/// 脚本给出的相对路径相对入口目录解析
pub(crate) fn script_path(bridge: &Bridge, path: &str) -> PathBuf {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        path
    } else {
        bridge.loader().root().join(path)
    }
}

/// 全局函数的第 `index` 个参数作为 `T` 解析
pub(crate) fn arg_native<T: Tagged>(bridge: &Bridge, args: &Args<'_>, index: usize) -> rquickjs::Result<Native<T>> {
    bridge
        .store()
        .resolve_value::<T>(&args.get(index))
        .map_err(|err| args.reject(index, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_tag_has_its_own_table() {
        for tag in Tag::ALL {
            assert_eq!(table(tag).tag, tag);
        }
    }

    #[test]
    fn test_pure_data_tables_have_no_namecall() {
        assert!(table(Tag::Font).namecall.is_none());
        assert!(table(Tag::Unknown).index.is_none());
        assert!(table(Tag::Vec2).arith.is_some());
        assert!(table(Tag::Rect).arith.is_none());
    }
}
