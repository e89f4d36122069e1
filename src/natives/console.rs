//! 控制台
//!
//! 宿主状态拥有的显式输出目标，代替进程级的全局日志单例。每条记录带严重级别和
//! 相对宿主启动的时间，同时镜像到 `tracing` 的 `lou::console` 目标。

use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use rquickjs::convert::Coerced;
use rquickjs::Value;

use super::root;
use crate::bridge::{Args, Atom, Bridge, Call, DispatchTable, Store, Tag, Tagged, TypedKey};
use crate::callbacks::ErrorSink;
use crate::core::error::OrThrow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Comment,
    Warning,
    Error,
}

impl Severity {
    pub const fn name(self) -> &'static str {
        match self {
            Severity::Comment => "comment",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleEntry {
    pub severity: Severity,
    pub message: String,
    pub elapsed: Duration,
}

impl fmt::Display for ConsoleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:>9.3}] {:<7} {}",
            self.elapsed.as_secs_f64(),
            self.severity.name(),
            self.message
        )
    }
}

/// 容量有限的控制台，满了丢弃最旧的记录
#[derive(Debug)]
pub struct Console {
    entries: VecDeque<ConsoleEntry>,
    capacity: usize,
    echo: bool,
    started: Instant,
}

impl Tagged for Console {
    const TAG: Tag = Tag::Console;
}

impl Console {
    pub fn new(capacity: usize, echo: bool) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(256)),
            capacity: capacity.max(1),
            echo,
            started: Instant::now(),
        }
    }

    pub fn push(&mut self, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        match severity {
            Severity::Comment => tracing::info!(target: "lou::console", "{message}"),
            Severity::Warning => tracing::warn!(target: "lou::console", "{message}"),
            Severity::Error => tracing::error!(target: "lou::console", "{message}"),
        }
        let entry = ConsoleEntry {
            severity,
            message,
            elapsed: self.started.elapsed(),
        };
        if self.echo {
            println!("{entry}");
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn comment(&mut self, message: impl Into<String>) {
        self.push(Severity::Comment, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(Severity::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(Severity::Error, message);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> impl Iterator<Item = &ConsoleEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 某个级别的记录数
    pub fn count(&self, severity: Severity) -> usize {
        self.entries.iter().filter(|entry| entry.severity == severity).count()
    }
}

/// 把回调错误写进存储中的控制台
pub struct ConsoleSink<'a> {
    store: &'a Store,
    key: TypedKey<Console>,
}

impl<'a> ConsoleSink<'a> {
    pub fn new(store: &'a Store, key: TypedKey<Console>) -> Self {
        Self { store, key }
    }
}

impl ErrorSink for ConsoleSink<'_> {
    fn report(&self, source: &str, message: &str) {
        let console = match self.store.typed(self.key) {
            Ok(console) => console,
            Err(err) => {
                tracing::warn!(target: "lou::console", %err, "console unavailable");
                return;
            }
        };
        match console.borrow_mut() {
            Ok(mut console) => console.error(format!("{source}: {message}")),
            Err(err) => tracing::warn!(target: "lou::console", %err, "error report dropped"),
        };
    }
}

/// 用 JS 的 `ToString` 把所有参数以空格连接
pub fn join_message(values: &[Value<'_>]) -> rquickjs::Result<String> {
    let mut parts = Vec::with_capacity(values.len());
    for value in values {
        parts.push(value.get::<Coerced<String>>()?.0);
    }
    Ok(parts.join(" "))
}

fn write(bridge: &Bridge, args: &Args<'_>, severity: Severity) -> rquickjs::Result<()> {
    let message = join_message(args.values())?;
    let console = root(args.ctx(), bridge, |roots| roots.console)?;
    console.borrow_mut().or_throw(args.ctx())?.push(severity, message);
    Ok(())
}

pub fn global_print<'js>(bridge: &Rc<Bridge>, args: &Args<'js>) -> rquickjs::Result<Value<'js>> {
    write(bridge, args, Severity::Comment)?;
    Ok(Value::new_undefined(args.ctx().clone()))
}

pub fn global_warn<'js>(bridge: &Rc<Bridge>, args: &Args<'js>) -> rquickjs::Result<Value<'js>> {
    write(bridge, args, Severity::Warning)?;
    Ok(Value::new_undefined(args.ctx().clone()))
}

pub fn table() -> DispatchTable {
    DispatchTable::new(Tag::Console).namecall(namecall).tostring(tostring)
}

fn namecall<'js>(call: &Call<'js>, atom: Atom) -> rquickjs::Result<Value<'js>> {
    let severity = match atom {
        Atom::Print | Atom::Comment => Severity::Comment,
        Atom::Warn => Severity::Warning,
        Atom::Error => Severity::Error,
        Atom::Clear => {
            call.this::<Console>()?.borrow_mut().or_throw(&call.ctx)?.clear();
            return Ok(call.undefined());
        }
        _ => return Err(call.invalid_method(atom)),
    };
    let message = join_message(call.args.values())?;
    call.this::<Console>()?
        .borrow_mut()
        .or_throw(&call.ctx)?
        .push(severity, message);
    Ok(call.undefined())
}

fn tostring(call: &Call<'_>) -> rquickjs::Result<String> {
    let native = call.this::<Console>()?;
    let console = native.borrow().or_throw(&call.ctx)?;
    Ok(format!("Console({}/{})", console.len(), console.capacity()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_drops_oldest() {
        let mut console = Console::new(2, false);
        console.comment("a");
        console.warn("b");
        console.error("c");
        let messages: Vec<_> = console.entries().map(|entry| entry.message.as_str()).collect();
        assert_eq!(messages, ["b", "c"]);
        assert_eq!(console.count(Severity::Error), 1);
        console.clear();
        assert!(console.is_empty());
    }

    #[test]
    fn test_sink_reports_into_stored_console() {
        let store = Store::new();
        let key = store.insert(Console::new(8, false));
        ConsoleSink::new(&store, key).report("on_update", "Error: boom");
        let console = store.typed(key).unwrap();
        let console = console.borrow().unwrap();
        let entry = console.entries().next().unwrap();
        assert_eq!(entry.severity, Severity::Error);
        assert_eq!(entry.message, "on_update: Error: boom");
    }
}
