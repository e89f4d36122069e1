//! 核心模块
//!
//! 包含宿主的核心功能：
//! - `host` - 启动序列和帧循环
//! - `error` - 错误类型定义
//! - `logging` - 日志初始化

pub mod error;
pub mod host;
pub mod logging;
#[macro_use]
pub mod macros;

// 重新导出错误类型
pub use error::{
    describe_caught, describe_thrown, BridgeError, BridgeResult, HostError, HostResult, ModuleError, ModuleResult,
    OrThrow,
};

// 重新导出主要类型
pub use host::Host;
pub use logging::init_logging;
