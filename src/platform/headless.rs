//! 无界面协作方
//!
//! 窗口状态只存在内存里，画布把绘制指令记录下来，纹理只读取图片头部尺寸，
//! 事件来自一个可从外部推入的队列。二进制程序和测试都使用这一套实现。

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::Path;
use std::rc::Rc;

use glam::Vec2;

use super::{
    Backends, BackendError, BackendResult, BlendMode, Canvas, DrawCommand, EventSource, FontInfo, Graphics,
    HostEvent, TextureInfo, WindowBackend,
};
use crate::config::WindowConfig;
use crate::natives::geometry::{Color, Rect};

/// 最大化时使用的假想显示器尺寸
const DISPLAY_SIZE: (u32, u32) = (1920, 1080);

/// 内存中的窗口
#[derive(Debug, Clone)]
pub struct HeadlessWindow {
    position: (i32, i32),
    size: (u32, u32),
    restored_size: (u32, u32),
    pixel_density: u32,
    title: String,
    opacity: f32,
    minimized: bool,
    fullscreen: bool,
    resizable: bool,
}

impl HeadlessWindow {
    pub fn new(config: &WindowConfig) -> Self {
        Self {
            position: (0, 0),
            size: (config.width, config.height),
            restored_size: (config.width, config.height),
            pixel_density: 1,
            title: config.title.clone(),
            opacity: 1.0,
            minimized: false,
            fullscreen: false,
            resizable: config.resizable,
        }
    }

    pub fn is_minimized(&self) -> bool {
        self.minimized
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }
}

impl WindowBackend for HeadlessWindow {
    fn position(&self) -> BackendResult<(i32, i32)> {
        Ok(self.position)
    }

    fn set_position(&mut self, x: i32, y: i32) -> BackendResult<()> {
        self.position = (x, y);
        Ok(())
    }

    fn size(&self) -> BackendResult<(u32, u32)> {
        Ok(self.size)
    }

    fn set_size(&mut self, width: u32, height: u32) -> BackendResult<()> {
        if width == 0 || height == 0 {
            return Err(BackendError::Failed(format!("invalid window size {width}x{height}")));
        }
        self.size = (width, height);
        self.restored_size = self.size;
        Ok(())
    }

    fn size_in_pixels(&self) -> BackendResult<(u32, u32)> {
        Ok((self.size.0 * self.pixel_density, self.size.1 * self.pixel_density))
    }

    fn title(&self) -> String {
        self.title.clone()
    }

    fn set_title(&mut self, title: &str) -> BackendResult<()> {
        self.title = title.to_string();
        Ok(())
    }

    fn opacity(&self) -> BackendResult<f32> {
        Ok(self.opacity)
    }

    fn set_opacity(&mut self, opacity: f32) -> BackendResult<()> {
        if !opacity.is_finite() {
            return Err(BackendError::Failed("opacity must be a finite number".to_string()));
        }
        self.opacity = opacity.clamp(0.0, 1.0);
        Ok(())
    }

    fn maximize(&mut self) -> BackendResult<()> {
        if !self.resizable {
            return Err(BackendError::Failed("window is not resizable".to_string()));
        }
        self.minimized = false;
        self.size = DISPLAY_SIZE;
        Ok(())
    }

    fn minimize(&mut self) -> BackendResult<()> {
        self.minimized = true;
        Ok(())
    }

    fn restore(&mut self) -> BackendResult<()> {
        self.minimized = false;
        self.size = self.restored_size;
        Ok(())
    }

    fn set_fullscreen(&mut self, fullscreen: bool) -> BackendResult<()> {
        self.fullscreen = fullscreen;
        Ok(())
    }

    fn resizable(&self) -> bool {
        self.resizable
    }

    fn set_resizable(&mut self, resizable: bool) -> BackendResult<()> {
        self.resizable = resizable;
        Ok(())
    }
}

/// 记录绘制指令的画布
pub struct RecordingCanvas {
    color: Color,
    blend: BlendMode,
    commands: Rc<RefCell<Vec<DrawCommand>>>,
}

impl RecordingCanvas {
    pub fn new(commands: Rc<RefCell<Vec<DrawCommand>>>) -> Self {
        Self {
            color: Color::BLACK,
            blend: BlendMode::default(),
            commands,
        }
    }

    fn record(&self, command: DrawCommand) -> BackendResult<()> {
        self.commands.borrow_mut().push(command);
        Ok(())
    }
}

impl Canvas for RecordingCanvas {
    fn clear(&mut self) -> BackendResult<()> {
        self.record(DrawCommand::Clear(self.color))
    }

    fn set_draw_color(&mut self, color: Color) {
        self.color = color;
    }

    fn draw_color(&self) -> Color {
        self.color
    }

    fn set_blend_mode(&mut self, mode: BlendMode) -> BackendResult<()> {
        self.blend = mode;
        Ok(())
    }

    fn blend_mode(&self) -> BlendMode {
        self.blend
    }

    fn draw_rect(&mut self, rect: Rect, filled: bool) -> BackendResult<()> {
        self.record(DrawCommand::Rect {
            rect,
            filled,
            color: self.color,
        })
    }

    fn draw_point(&mut self, at: Vec2) -> BackendResult<()> {
        self.record(DrawCommand::Point { at, color: self.color })
    }

    fn draw_line(&mut self, from: Vec2, to: Vec2) -> BackendResult<()> {
        self.record(DrawCommand::Line {
            from,
            to,
            color: self.color,
        })
    }

    fn draw_texture(
        &mut self,
        texture: &TextureInfo,
        src: Option<Rect>,
        dst: Rect,
        angle: f64,
        tint: Color,
    ) -> BackendResult<()> {
        self.record(DrawCommand::Texture {
            id: texture.id,
            src,
            dst,
            angle,
            tint,
        })
    }

    fn present(&mut self) -> BackendResult<()> {
        self.record(DrawCommand::Present)
    }
}

/// 只读取图片尺寸的图形后端
#[derive(Debug, Default)]
pub struct ImageGraphics {
    next_id: u64,
}

impl ImageGraphics {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl Graphics for ImageGraphics {
    fn load_image(&mut self, path: &Path) -> BackendResult<TextureInfo> {
        let (width, height) = image::image_dimensions(path).map_err(|err| BackendError::Load {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        Ok(TextureInfo {
            id: self.next_id(),
            width,
            height,
            source: path.display().to_string(),
        })
    }

    fn open_font(&mut self, path: &Path, size: f32) -> BackendResult<FontInfo> {
        if !path.is_file() {
            return Err(BackendError::Load {
                path: path.to_path_buf(),
                reason: "no such font file".to_string(),
            });
        }
        if !(size > 0.0) {
            return Err(BackendError::Failed(format!("invalid font size {size}")));
        }
        Ok(FontInfo {
            id: self.next_id(),
            path: path.to_path_buf(),
            size,
        })
    }

    fn render_text(&mut self, font: &FontInfo, text: &str, _color: Color) -> BackendResult<TextureInfo> {
        if text.is_empty() {
            return Err(BackendError::Failed("text has zero width".to_string()));
        }
        // 等宽近似：每个字符半个字号宽
        let width = (text.chars().count() as f32 * font.size * 0.5).ceil() as u32;
        Ok(TextureInfo {
            id: self.next_id(),
            width,
            height: font.size.ceil() as u32,
            source: format!("text:{text}"),
        })
    }
}

/// 可从外部推入事件的队列
pub struct QueuedEvents {
    queue: Rc<RefCell<VecDeque<HostEvent>>>,
}

impl EventSource for QueuedEvents {
    fn poll(&mut self) -> Option<HostEvent> {
        self.queue.borrow_mut().pop_front()
    }
}

/// 测试和二进制程序观察无界面后端的入口
#[derive(Clone, Default)]
pub struct HeadlessProbe {
    commands: Rc<RefCell<Vec<DrawCommand>>>,
    events: Rc<RefCell<VecDeque<HostEvent>>>,
}

impl HeadlessProbe {
    pub fn push(&self, event: HostEvent) {
        self.events.borrow_mut().push_back(event);
    }

    pub fn commands(&self) -> Vec<DrawCommand> {
        self.commands.borrow().clone()
    }

    pub fn take_commands(&self) -> Vec<DrawCommand> {
        std::mem::take(&mut *self.commands.borrow_mut())
    }

    pub fn pending_events(&self) -> usize {
        self.events.borrow().len()
    }
}

/// 创建全套无界面协作方
pub fn backends(config: &WindowConfig) -> (Backends, HeadlessProbe) {
    let probe = HeadlessProbe::default();
    let backends = Backends {
        window: Box::new(HeadlessWindow::new(config)),
        canvas: Box::new(RecordingCanvas::new(Rc::clone(&probe.commands))),
        graphics: Box::new(ImageGraphics::new()),
        events: Box::new(QueuedEvents {
            queue: Rc::clone(&probe.events),
        }),
    };
    (backends, probe)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_state() {
        let mut window = HeadlessWindow::new(&WindowConfig::default());
        assert_eq!(window.size().unwrap(), (800, 600));
        window.maximize().unwrap();
        assert_eq!(window.size().unwrap(), DISPLAY_SIZE);
        window.restore().unwrap();
        assert_eq!(window.size().unwrap(), (800, 600));
        assert!(window.set_size(0, 10).is_err());
        window.set_opacity(3.0).unwrap();
        assert_eq!(window.opacity().unwrap(), 1.0);
        window.set_resizable(false).unwrap();
        assert!(window.maximize().is_err());
    }

    #[test]
    fn test_probe_sees_canvas_and_feeds_events() {
        let (mut backends, probe) = backends(&WindowConfig::default());
        backends.canvas.set_draw_color(Color::new(1, 2, 3, 4));
        backends.canvas.clear().unwrap();
        assert_eq!(probe.commands(), vec![DrawCommand::Clear(Color::new(1, 2, 3, 4))]);

        probe.push(HostEvent::Quit);
        assert_eq!(probe.pending_events(), 1);
        assert_eq!(backends.events.poll(), Some(HostEvent::Quit));
        assert_eq!(backends.events.poll(), None);
    }

    #[test]
    fn test_graphics_errors_carry_path() {
        let mut graphics = ImageGraphics::new();
        let err = graphics.load_image(Path::new("/no/such/image.png")).unwrap_err();
        assert!(err.to_string().contains("/no/such/image.png"));
    }
}
