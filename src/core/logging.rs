//! 日志初始化

use tracing_subscriber::EnvFilter;

use crate::config::LogLevel;

/// 安装 `fmt` 订阅器；`RUST_LOG` 存在时优先生效
///
/// 重复调用（例如多个测试各自启动宿主）不会报错。
pub fn init_logging(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
