pub mod headless;

use std::fmt;
use std::path::{Path, PathBuf};

use glam::Vec2;
use thiserror::Error;

use crate::natives::geometry::{Color, Rect};

pub use headless::{HeadlessProbe, QueuedEvents};

// ============================================================================
// Backend Errors
// ============================================================================

/// 外部协作方返回的失败
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("{0}")]
    Failed(String),

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("failed to load {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },
}

pub type BackendResult<T> = Result<T, BackendError>;

// ============================================================================
// Window Abstraction
// ============================================================================

/// 窗口协作方
pub trait WindowBackend {
    fn position(&self) -> BackendResult<(i32, i32)>;
    fn set_position(&mut self, x: i32, y: i32) -> BackendResult<()>;
    fn size(&self) -> BackendResult<(u32, u32)>;
    fn set_size(&mut self, width: u32, height: u32) -> BackendResult<()>;
    fn size_in_pixels(&self) -> BackendResult<(u32, u32)>;
    fn title(&self) -> String;
    fn set_title(&mut self, title: &str) -> BackendResult<()>;
    fn opacity(&self) -> BackendResult<f32>;
    fn set_opacity(&mut self, opacity: f32) -> BackendResult<()>;
    fn maximize(&mut self) -> BackendResult<()>;
    fn minimize(&mut self) -> BackendResult<()>;
    fn restore(&mut self) -> BackendResult<()>;
    fn set_fullscreen(&mut self, fullscreen: bool) -> BackendResult<()>;
    fn resizable(&self) -> bool;
    fn set_resizable(&mut self, resizable: bool) -> BackendResult<()>;
}

// ============================================================================
// Drawing Abstraction
// ============================================================================

/// 混合模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendMode {
    #[default]
    None,
    Blend,
    BlendPremultiplied,
    Add,
    AddPremultiplied,
    Mod,
    Mul,
}

impl BlendMode {
    pub const ALL: [BlendMode; 7] = [
        BlendMode::None,
        BlendMode::Blend,
        BlendMode::BlendPremultiplied,
        BlendMode::Add,
        BlendMode::AddPremultiplied,
        BlendMode::Mod,
        BlendMode::Mul,
    ];

    /// 脚本使用的名称
    pub const fn name(self) -> &'static str {
        match self {
            BlendMode::None => "none",
            BlendMode::Blend => "blend",
            BlendMode::BlendPremultiplied => "blend premultiplied",
            BlendMode::Add => "add",
            BlendMode::AddPremultiplied => "add premultiplied",
            BlendMode::Mod => "mod",
            BlendMode::Mul => "mul",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        BlendMode::ALL.into_iter().find(|mode| mode.name() == name)
    }
}

impl fmt::Display for BlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 协作方创建的纹理
#[derive(Debug, Clone, PartialEq)]
pub struct TextureInfo {
    pub id: u64,
    pub width: u32,
    pub height: u32,
    pub source: String,
}

/// 协作方打开的字体
#[derive(Debug, Clone, PartialEq)]
pub struct FontInfo {
    pub id: u64,
    pub path: PathBuf,
    pub size: f32,
}

/// 记录型画布产生的绘制指令
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Clear(Color),
    Rect { rect: Rect, filled: bool, color: Color },
    Point { at: Vec2, color: Color },
    Line { from: Vec2, to: Vec2, color: Color },
    Texture {
        id: u64,
        src: Option<Rect>,
        dst: Rect,
        angle: f64,
        tint: Color,
    },
    Present,
}

/// 绘制协作方
pub trait Canvas {
    fn clear(&mut self) -> BackendResult<()>;
    fn set_draw_color(&mut self, color: Color);
    fn draw_color(&self) -> Color;
    fn set_blend_mode(&mut self, mode: BlendMode) -> BackendResult<()>;
    fn blend_mode(&self) -> BlendMode;
    fn draw_rect(&mut self, rect: Rect, filled: bool) -> BackendResult<()>;
    fn draw_point(&mut self, at: Vec2) -> BackendResult<()>;
    fn draw_line(&mut self, from: Vec2, to: Vec2) -> BackendResult<()>;
    fn draw_texture(
        &mut self,
        texture: &TextureInfo,
        src: Option<Rect>,
        dst: Rect,
        angle: f64,
        tint: Color,
    ) -> BackendResult<()>;
    fn present(&mut self) -> BackendResult<()>;
}

/// 纹理与字体协作方
pub trait Graphics {
    fn load_image(&mut self, path: &Path) -> BackendResult<TextureInfo>;
    fn open_font(&mut self, path: &Path, size: f32) -> BackendResult<FontInfo>;
    fn render_text(&mut self, font: &FontInfo, text: &str, color: Color) -> BackendResult<TextureInfo>;
}

// ============================================================================
// Input Abstraction
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerButton {
    Left,
    Middle,
    Right,
    Unknown,
}

impl PointerButton {
    pub const fn name(self) -> &'static str {
        match self {
            PointerButton::Left => "left",
            PointerButton::Middle => "middle",
            PointerButton::Right => "right",
            PointerButton::Unknown => "unknown",
        }
    }
}

/// 宿主从操作系统取得的事件
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Quit,
    KeyDown { key: String },
    KeyUp { key: String },
    PointerMove { x: f32, y: f32 },
    PointerButton {
        button: PointerButton,
        pressed: bool,
        x: f32,
        y: f32,
    },
}

/// 事件来源
pub trait EventSource {
    fn poll(&mut self) -> Option<HostEvent>;
}

/// 宿主需要的全部协作方
pub struct Backends {
    pub window: Box<dyn WindowBackend>,
    pub canvas: Box<dyn Canvas>,
    pub graphics: Box<dyn Graphics>,
    pub events: Box<dyn EventSource>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_mode_names() {
        for mode in BlendMode::ALL {
            assert_eq!(BlendMode::from_name(mode.name()), Some(mode));
        }
        assert_eq!(BlendMode::from_name("screen"), None);
        assert_eq!(BlendMode::AddPremultiplied.to_string(), "add premultiplied");
    }
}
