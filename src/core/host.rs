//! 宿主
//!
//! 负责启动序列和帧循环：
//!
//! 1. 创建解释器实例（`Runtime` + `Context::full`），失败即致命
//! 2. 把根对象放进存储，注册分派表，驻留方法名
//! 3. 把根宿主状态以全局名 `lou` 暴露，然后锁定全局环境（内置对象深度冻结）
//! 4. 运行入口脚本，之后每帧：事件 → `on_update(dt)` → `clear` / `on_render()` / `present`
//!
//! 所有脚本代码都在受保护调用中执行，错误写入控制台而不会终止帧循环。

use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use rquickjs::{Context, Ctx, Runtime};

use super::error::{describe_caught, HostError, HostResult};
use super::logging::init_logging;
use crate::bridge::{atom, Bridge, Store, Tagged, TypedKey};
use crate::callbacks::DrainReport;
use crate::config::HostConfig;
use crate::modules::{sandbox, ModuleLoader};
use crate::natives::{
    self, Console, ConsoleEntry, ConsoleSink, Keyboard, Mouse, Renderer, Roots, Severity, State, TextureFactory,
    Window,
};
use crate::platform::{headless, Backends, EventSource, HeadlessProbe, HostEvent};

/// 一个解释器实例及其宿主状态
///
/// 字段顺序决定析构顺序：持有解释器值的部分先于 `context` 和 `runtime` 析构。
pub struct Host {
    bridge: Rc<Bridge>,
    store: Rc<Store>,
    roots: Roots,
    events: Box<dyn EventSource>,
    config: HostConfig,
    last_frame: Option<Instant>,
    frames: u64,
    context: Context,
    runtime: Runtime,
}

impl Host {
    /// 启动宿主
    pub fn new(config: HostConfig, backends: Backends) -> HostResult<Self> {
        let runtime = Runtime::new().map_err(|e| HostError::Runtime(e.to_string()))?;
        let context = Context::full(&runtime).map_err(|e| HostError::Runtime(e.to_string()))?;

        let Backends {
            window,
            canvas,
            graphics,
            events,
        } = backends;

        let store = Rc::new(Store::new());
        let roots = Roots {
            state: store.insert(State::new()),
            console: store.insert(Console::new(config.console.capacity, config.console.echo)),
            keyboard: store.insert(Keyboard::new()),
            mouse: store.insert(Mouse::new()),
            window: store.insert(Window::new(window)),
            renderer: store.insert(Renderer::new(canvas)),
            texture: store.insert(TextureFactory::new(graphics)),
        };

        let root_dir = match config.script.entry.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => std::env::current_dir()?,
        };
        let loader = ModuleLoader::new(root_dir, config.script.extension.clone());
        let bridge = Bridge::new(Rc::clone(&store), natives::table, loader);
        bridge.set_roots(roots);

        let names = atom::install();
        let booted = context.with(|ctx| {
            Self::install(&ctx, &bridge, roots).map_err(|err| describe_caught(&ctx, err))
        });
        if let Err(message) = booted {
            bridge.shutdown();
            return Err(HostError::Script(message));
        }
        tracing::info!(target: "lou::host", names, "script bridge ready");

        Ok(Self {
            bridge,
            store,
            roots,
            events,
            config,
            last_frame: None,
            frames: 0,
            context,
            runtime,
        })
    }

    /// 使用无界面协作方启动
    pub fn headless(config: HostConfig) -> HostResult<(Self, HeadlessProbe)> {
        let (backends, probe) = headless::backends(&config.window);
        Ok((Self::new(config, backends)?, probe))
    }

    fn install<'js>(ctx: &Ctx<'js>, bridge: &Rc<Bridge>, roots: Roots) -> rquickjs::Result<()> {
        bridge.install(ctx)?;
        natives::install_globals(ctx, bridge, roots)?;
        sandbox::lockdown(ctx, natives::HANDLE_GLOBALS)?;
        Ok(())
    }

    /// 读取配置、启动无界面宿主、运行入口脚本并进入帧循环
    pub fn run() -> HostResult<()> {
        let mut config = HostConfig::load_or_default();
        config.apply_env_overrides();
        if let Some(entry) = std::env::args_os().nth(1) {
            config.script.entry = PathBuf::from(entry);
        }
        init_logging(config.logging.level);
        config.validate()?;

        tracing::info!(target: "lou::host", entry = %config.script.entry.display(), "host starting");
        let entry = config.script.entry.clone();
        let (mut host, _probe) = Self::headless(config)?;
        host.run_entry(&entry);
        let frames = host.run_loop();
        tracing::info!(target: "lou::host", frames, "host shutting down");
        Ok(())
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn bridge(&self) -> &Rc<Bridge> {
        &self.bridge
    }

    pub fn store(&self) -> &Rc<Store> {
        &self.store
    }

    pub fn roots(&self) -> Roots {
        self.roots
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// 在解释器上下文中执行
    pub fn with<R>(&self, f: impl FnOnce(Ctx<'_>, &Rc<Bridge>) -> R) -> R {
        self.context.with(|ctx| f(ctx, &self.bridge))
    }

    // ========================================================================
    // Scripts
    // ========================================================================

    /// 运行入口脚本；失败写入控制台，返回是否成功
    pub fn run_entry(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let result = self.context.with(|ctx| {
            self.bridge
                .loader()
                .run_entry(&self.bridge, &ctx, path)
                .map(|_| ())
        });
        match result {
            Ok(()) => true,
            Err(err) => {
                self.report(Severity::Error, err.to_string());
                false
            }
        }
    }

    /// 以临时代码块运行一段源码
    pub fn eval(&self, source: &str, label: &str) -> bool {
        let result = self.context.with(|ctx| {
            self.bridge
                .loader()
                .run_transient(&self.bridge, &ctx, label, source)
                .map(|_| ())
        });
        match result {
            Ok(()) => true,
            Err(err) => {
                self.report(Severity::Error, err.to_string());
                false
            }
        }
    }

    // ========================================================================
    // Console
    // ========================================================================

    /// 写一条控制台记录
    pub fn report(&self, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        let written = self.with_root(self.roots.console, |console| console.push(severity, message.clone()));
        if written.is_none() {
            tracing::error!(target: "lou::host", "{message}");
        }
    }

    pub fn console_entries(&self) -> Vec<ConsoleEntry> {
        self.with_root(self.roots.console, |console| console.entries().cloned().collect())
            .unwrap_or_default()
    }

    pub fn console_errors(&self) -> Vec<String> {
        self.console_entries()
            .into_iter()
            .filter(|entry| entry.severity == Severity::Error)
            .map(|entry| entry.message)
            .collect()
    }

    fn with_root<T: Tagged, R>(&self, key: TypedKey<T>, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let native = match self.store.typed(key) {
            Ok(native) => native,
            Err(err) => {
                tracing::warn!(target: "lou::host", %err, "root object unavailable");
                return None;
            }
        };
        let result = match native.borrow_mut() {
            Ok(mut value) => Some(f(&mut value)),
            Err(err) => {
                tracing::warn!(target: "lou::host", %err, "root object unavailable");
                None
            }
        };
        result
    }

    // ========================================================================
    // Frame Loop
    // ========================================================================

    pub fn is_running(&self) -> bool {
        self.with_root(self.roots.state, |state| state.is_running())
            .unwrap_or(false)
    }

    pub fn quit(&self) {
        self.with_root(self.roots.state, State::quit);
    }

    /// 处理所有待处理事件，返回事件数量
    pub fn process_events(&mut self) -> usize {
        let mut count = 0;
        while let Some(event) = self.events.poll() {
            self.dispatch(event);
            count += 1;
        }
        count
    }

    /// 把一个事件翻译成恰好一次回调列表调用
    pub fn dispatch(&self, event: HostEvent) -> DrainReport {
        tracing::trace!(target: "lou::host", ?event, "event");
        let sink = ConsoleSink::new(&self.store, self.roots.console);
        match event {
            HostEvent::Quit => {
                self.quit();
                DrainReport::default()
            }
            HostEvent::KeyDown { key } => {
                let list = self.with_root(self.roots.keyboard, |keyboard| {
                    keyboard.key_down(&key);
                    keyboard.pressed.clone()
                });
                list.map_or_else(DrainReport::default, |list| {
                    self.context.with(|ctx| list.call(&ctx, &sink, (key,)))
                })
            }
            HostEvent::KeyUp { key } => {
                let list = self.with_root(self.roots.keyboard, |keyboard| {
                    keyboard.key_up(&key);
                    keyboard.released.clone()
                });
                list.map_or_else(DrainReport::default, |list| {
                    self.context.with(|ctx| list.call(&ctx, &sink, (key,)))
                })
            }
            HostEvent::PointerMove { x, y } => {
                let list = self.with_root(self.roots.mouse, |mouse| {
                    mouse.set_position(x, y);
                    mouse.moved.clone()
                });
                list.map_or_else(DrainReport::default, |list| {
                    self.context.with(|ctx| list.call(&ctx, &sink, (x as f64, y as f64)))
                })
            }
            HostEvent::PointerButton { button, pressed, x, y } => {
                let list = self.with_root(self.roots.mouse, |mouse| {
                    mouse.set_position(x, y);
                    if pressed {
                        mouse.pressed.clone()
                    } else {
                        mouse.released.clone()
                    }
                });
                let args = (button.name().to_string(), x as f64, y as f64);
                list.map_or_else(DrainReport::default, |list| {
                    self.context.with(|ctx| list.call(&ctx, &sink, args))
                })
            }
        }
    }

    /// 以 `dt` 秒调用 `on_update`
    pub fn advance(&self, dt: f64) -> DrainReport {
        let Some(list) = self.with_root(self.roots.state, |state| state.on_update.clone()) else {
            return DrainReport::default();
        };
        let sink = ConsoleSink::new(&self.store, self.roots.console);
        self.context.with(|ctx| list.call(&ctx, &sink, (dt,)))
    }

    /// 清屏、调用 `on_render`、呈现
    pub fn render(&self) -> DrainReport {
        self.canvas_step("clear", |renderer| renderer.canvas_mut().clear());
        let report = match self.with_root(self.roots.state, |state| state.on_render.clone()) {
            Some(list) => {
                let sink = ConsoleSink::new(&self.store, self.roots.console);
                self.context.with(|ctx| list.call(&ctx, &sink, ()))
            }
            None => DrainReport::default(),
        };
        self.canvas_step("present", |renderer| renderer.canvas_mut().present());
        report
    }

    fn canvas_step(&self, step: &str, f: impl FnOnce(&mut Renderer) -> crate::platform::BackendResult<()>) {
        if let Some(Err(err)) = self.with_root(self.roots.renderer, f) {
            self.report(Severity::Error, format!("renderer {step} failed: {err}"));
        }
    }

    /// 运行一帧，返回宿主是否仍在运行
    pub fn frame(&mut self) -> bool {
        let now = Instant::now();
        let fallback = 1.0 / self.config.frame.target_fps.max(1) as f64;
        let dt = self
            .last_frame
            .map_or(fallback, |last| now.duration_since(last).as_secs_f64());
        self.last_frame = Some(now);

        self.process_events();
        self.advance(dt);
        self.render();
        self.frames += 1;
        self.runtime.run_gc();
        self.is_running()
    }

    /// 按目标帧率循环，直到退出或达到帧数上限；返回运行的帧数
    pub fn run_loop(&mut self) -> u64 {
        let frame_time = Duration::from_secs_f64(1.0 / self.config.frame.target_fps.max(1) as f64);
        let start = self.frames;
        while self.is_running() {
            if let Some(max) = self.config.frame.max_frames {
                if self.frames - start >= max {
                    break;
                }
            }
            let begin = Instant::now();
            self.frame();
            let elapsed = begin.elapsed();
            if elapsed < frame_time {
                thread::sleep(frame_time - elapsed);
            }
        }
        self.frames - start
    }

    /// 释放所有持久化的解释器值，必须在运行时析构前完成
    fn shutdown(&self) {
        self.with_root(self.roots.state, |state| state.clear());
        self.with_root(self.roots.keyboard, |keyboard| keyboard.clear());
        self.with_root(self.roots.mouse, |mouse| mouse.clear());
        self.bridge.shutdown();
        tracing::debug!(target: "lou::host", live = self.store.len(), "script state released");
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        self.shutdown();
    }
}
