//! 统一错误处理模块
//!
//! ## 错误分层
//!
//! - [`BridgeError`]: 脚本调用原生对象时的错误（类型、方法、字段、参数、原生调用失败）
//! - [`ModuleError`]: 模块解析、编译、执行错误
//! - [`HostError`]: 宿主启动阶段的致命错误
//!
//! 前两类在解释器内部以异常形式抛出，在最近的保护调用边界被捕获并写入控制台；
//! 最后一类直接终止启动。

use std::path::PathBuf;

use rquickjs::{convert::Coerced, Ctx, Exception, Value};
use thiserror::Error;

use crate::config::ConfigError;

/// 脚本与原生对象交界处的错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    #[error("expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: String,
    },

    #[error("no such method for {type_name} -> {method}")]
    InvalidMethod {
        type_name: &'static str,
        method: String,
    },

    #[error("invalid field '{field}' for {type_name}")]
    InvalidField {
        type_name: &'static str,
        field: String,
    },

    #[error("field '{field}' of {type_name} is readonly")]
    ReadOnlyField {
        type_name: &'static str,
        field: &'static str,
    },

    #[error("bad argument #{position} to '{function}' ({message})")]
    Argument {
        position: usize,
        function: String,
        message: String,
    },

    /// 参数解析失败，保留内层错误的种类
    #[error("bad argument #{position} to '{function}' ({cause})")]
    BadArgument {
        position: usize,
        function: String,
        #[source]
        cause: Box<BridgeError>,
    },

    /// 外部协作方返回的失败，原样携带其消息
    #[error("{0}")]
    Native(String),

    #[error("stale reference to {type_name}: the object no longer exists")]
    StaleReference { type_name: &'static str },

    #[error("{type_name} is already in use")]
    Busy { type_name: &'static str },
}

impl BridgeError {
    pub fn argument(position: usize, function: impl Into<String>, message: impl Into<String>) -> Self {
        BridgeError::Argument {
            position,
            function: function.into(),
            message: message.into(),
        }
    }

    pub fn bad_argument(position: usize, function: impl Into<String>, cause: BridgeError) -> Self {
        BridgeError::BadArgument {
            position,
            function: function.into(),
            cause: Box::new(cause),
        }
    }

    /// 决定异常种类的最内层错误
    pub fn root_cause(&self) -> &BridgeError {
        match self {
            BridgeError::BadArgument { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    /// 转换为解释器中的挂起异常
    ///
    /// 类型错误和失效引用抛出 `TypeError`，参数错误抛出 `RangeError`。
    pub fn throw(self, ctx: &Ctx<'_>) -> rquickjs::Error {
        let message = self.to_string();
        match self.root_cause() {
            BridgeError::TypeMismatch { .. }
            | BridgeError::InvalidMethod { .. }
            | BridgeError::StaleReference { .. } => Exception::throw_type(ctx, &message),
            BridgeError::Argument { .. } => Exception::throw_range(ctx, &message),
            _ => Exception::throw_message(ctx, &message),
        }
    }
}

/// 模块加载错误
#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("module '{specifier}' not found from {requester}")]
    NotFound { specifier: String, requester: String },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to compile {chunk}: {message}")]
    Compile { chunk: String, message: String },

    #[error("error while running {chunk}: {message}")]
    Runtime { chunk: String, message: String },

    #[error("module must return a value ({chunk})")]
    NoReturn { chunk: String },

    #[error("module must return a function or object ({chunk} returned {actual})")]
    BadReturn { chunk: String, actual: String },

    #[error("module can not suspend ({chunk})")]
    Suspended { chunk: String },

    #[error("require is not allowed from {chunk}")]
    NotAllowed { chunk: String },

    #[error("bare specifier '{specifier}' is only allowed from the entry script, use './' or '../'")]
    BareSpecifier { specifier: String },

    #[error("cyclic require of {}", path.display())]
    Cycle { path: PathBuf },
}

impl ModuleError {
    pub fn throw(self, ctx: &Ctx<'_>) -> rquickjs::Error {
        Exception::throw_message(ctx, &self.to_string())
    }
}

/// 宿主启动阶段的致命错误
#[derive(Error, Debug)]
pub enum HostError {
    #[error("failed to create script runtime: {0}")]
    Runtime(String),

    #[error("backend initialization failed: {0}")]
    Backend(String),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("script bridge setup failed: {0}")]
    Script(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rquickjs::Error> for HostError {
    fn from(err: rquickjs::Error) -> Self {
        HostError::Script(err.to_string())
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
pub type ModuleResult<T> = Result<T, ModuleError>;
pub type HostResult<T> = Result<T, HostError>;

/// 在当前上下文中抛出桥接错误
pub trait OrThrow<T> {
    fn or_throw(self, ctx: &Ctx<'_>) -> rquickjs::Result<T>;
}

impl<T> OrThrow<T> for BridgeResult<T> {
    fn or_throw(self, ctx: &Ctx<'_>) -> rquickjs::Result<T> {
        self.map_err(|err| err.throw(ctx))
    }
}

impl<T> OrThrow<T> for ModuleResult<T> {
    fn or_throw(self, ctx: &Ctx<'_>) -> rquickjs::Result<T> {
        self.map_err(|err| err.throw(ctx))
    }
}

/// 把捕获到的解释器错误整理成 `"<名称>: <消息>"`，带上调用栈
///
/// 对 `Error::Exception` 会取出并清除挂起的异常。
pub fn describe_caught(ctx: &Ctx<'_>, error: rquickjs::Error) -> String {
    match error {
        rquickjs::Error::Exception => describe_thrown(&ctx.catch()),
        other => other.to_string(),
    }
}

/// 描述任意被抛出的值
pub fn describe_thrown(value: &Value<'_>) -> String {
    if let Some(exception) = value.as_exception() {
        let name = exception
            .get::<_, Option<String>>("name")
            .ok()
            .flatten()
            .unwrap_or_else(|| "Error".to_string());
        let mut text = match exception.message() {
            Some(message) if !message.is_empty() => format!("{name}: {message}"),
            _ => name,
        };
        if let Some(stack) = exception.stack() {
            let stack = stack.trim_end();
            if !stack.is_empty() {
                text.push('\n');
                text.push_str(stack);
            }
        }
        return text;
    }
    if value.is_undefined() {
        return "unknown error".to_string();
    }
    value
        .get::<Coerced<String>>()
        .map(|coerced| coerced.0)
        .unwrap_or_else(|_| "unknown error".to_string())
}
