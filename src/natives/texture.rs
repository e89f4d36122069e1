//! 纹理、字体与纹理工厂（`lou.texture`），委托给 [`Graphics`] 协作方

use std::rc::Rc;

use rquickjs::Value;

use super::geometry::{Color, Rect};
use super::{arg_native, assigned_native, root, script_path};
use crate::bridge::{Args, Atom, Bridge, Call, DispatchTable, Tag, Tagged};
use crate::core::error::{BridgeError, OrThrow};
use crate::platform::{FontInfo, Graphics, TextureInfo};

// ============================================================================
// Texture
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    info: TextureInfo,
    color: Color,
}

impl Tagged for Texture {
    const TAG: Tag = Tag::Texture;
}

impl Texture {
    pub fn new(info: TextureInfo) -> Self {
        Self {
            info,
            color: Color::WHITE,
        }
    }

    pub fn info(&self) -> &TextureInfo {
        &self.info
    }

    /// 绘制时的色调
    pub fn color(&self) -> Color {
        self.color
    }
}

pub fn texture_table() -> DispatchTable {
    DispatchTable::new(Tag::Texture)
        .index(texture_index)
        .newindex(texture_newindex)
        .namecall(texture_namecall)
        .tostring(texture_tostring)
}

fn texture_index<'js>(call: &Call<'js>, atom: Atom) -> rquickjs::Result<Option<Value<'js>>> {
    let native = call.this::<Texture>()?;
    match atom {
        Atom::Size => {
            let (w, h) = {
                let texture = native.borrow().or_throw(&call.ctx)?;
                (texture.info.width, texture.info.height)
            };
            call.value(vec![w, h]).map(Some)
        }
        Atom::Color => {
            let color = native.borrow().or_throw(&call.ctx)?.color;
            call.owning(color).map(Some)
        }
        _ => Ok(None),
    }
}

fn texture_newindex<'js>(call: &Call<'js>, atom: Atom, value: Value<'js>) -> rquickjs::Result<()> {
    match atom {
        Atom::Size => Err(call.readonly(atom)),
        Atom::Color => {
            let color = *assigned_native::<Color>(call, &value)?.borrow().or_throw(&call.ctx)?;
            call.this::<Texture>()?.borrow_mut().or_throw(&call.ctx)?.color = color;
            Ok(())
        }
        _ => Err(call.invalid_field(atom)),
    }
}

fn texture_namecall<'js>(call: &Call<'js>, atom: Atom) -> rquickjs::Result<Value<'js>> {
    let angle = match atom {
        Atom::Render => 0.0,
        Atom::RenderRotated => call.args.number(2)?,
        _ => return Err(call.invalid_method(atom)),
    };
    let x = call.args.number(0)? as f32;
    let y = call.args.number(1)? as f32;
    let native = call.this::<Texture>()?;
    let texture = native.borrow().or_throw(&call.ctx)?;
    let dst = Rect::new(x, y, texture.info.width as f32, texture.info.height as f32);
    let renderer = root(&call.ctx, &call.bridge, |roots| roots.renderer)?;
    call.check(
        renderer
            .borrow_mut()
            .or_throw(&call.ctx)?
            .draw_texture(&texture, Some(dst), None, angle),
    )?;
    Ok(call.undefined())
}

fn texture_tostring(call: &Call<'_>) -> rquickjs::Result<String> {
    let native = call.this::<Texture>()?;
    let texture = native.borrow().or_throw(&call.ctx)?;
    Ok(format!(
        "Texture({}, {}x{})",
        texture.info.source, texture.info.width, texture.info.height
    ))
}

// ============================================================================
// Font
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Font {
    info: FontInfo,
}

impl Tagged for Font {
    const TAG: Tag = Tag::Font;
}

impl Font {
    pub fn info(&self) -> &FontInfo {
        &self.info
    }
}

/// `Font(path, size)`
pub fn construct_font<'js>(bridge: &Rc<Bridge>, args: &Args<'js>) -> rquickjs::Result<Value<'js>> {
    let path = script_path(bridge, &args.string(0)?);
    let size = args.number(1)? as f32;
    let factory = root(args.ctx(), bridge, |roots| roots.texture)?;
    let info = factory
        .borrow_mut()
        .or_throw(args.ctx())?
        .graphics
        .open_font(&path, size)
        .map_err(|err| BridgeError::Native(err.to_string()).throw(args.ctx()))?;
    bridge.create_owning(args.ctx(), Font { info })
}

pub fn font_table() -> DispatchTable {
    DispatchTable::new(Tag::Font).index(font_index).tostring(font_tostring)
}

fn font_index<'js>(call: &Call<'js>, atom: Atom) -> rquickjs::Result<Option<Value<'js>>> {
    match atom {
        Atom::Size => {
            let size = call.this::<Font>()?.borrow().or_throw(&call.ctx)?.info.size;
            call.value(size as f64).map(Some)
        }
        _ => Ok(None),
    }
}

fn font_tostring(call: &Call<'_>) -> rquickjs::Result<String> {
    let native = call.this::<Font>()?;
    let font = native.borrow().or_throw(&call.ctx)?;
    Ok(format!("Font({}, {})", font.info.path.display(), font.info.size))
}

// ============================================================================
// TextureFactory
// ============================================================================

pub struct TextureFactory {
    graphics: Box<dyn Graphics>,
}

impl Tagged for TextureFactory {
    const TAG: Tag = Tag::TextureFactory;
}

impl TextureFactory {
    pub fn new(graphics: Box<dyn Graphics>) -> Self {
        Self { graphics }
    }
}

pub fn factory_table() -> DispatchTable {
    DispatchTable::new(Tag::TextureFactory).namecall(factory_namecall)
}

fn factory_namecall<'js>(call: &Call<'js>, atom: Atom) -> rquickjs::Result<Value<'js>> {
    let native = call.this::<TextureFactory>()?;
    let info = match atom {
        Atom::LoadImage => {
            let path = script_path(&call.bridge, &call.args.string(0)?);
            let mut factory = native.borrow_mut().or_throw(&call.ctx)?;
            call.check(factory.graphics.load_image(&path))?
        }
        Atom::FromText => {
            let font = arg_native::<Font>(&call.bridge, &call.args, 0)?;
            let text = call.args.string(1)?;
            let color = match call.opt_native::<Color>(2) {
                Some(color) => *color.borrow().or_throw(&call.ctx)?,
                None => Color::WHITE,
            };
            let font = font.borrow().or_throw(&call.ctx)?;
            let mut factory = native.borrow_mut().or_throw(&call.ctx)?;
            call.check(factory.graphics.render_text(&font.info, &text, color))?
        }
        _ => return Err(call.invalid_method(atom)),
    };
    tracing::debug!(target: "lou::bridge", source = %info.source, width = info.width, height = info.height, "texture created");
    call.owning(Texture::new(info))
}
