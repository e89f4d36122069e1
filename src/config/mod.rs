/// 宿主配置
///
/// 提供TOML/JSON配置文件和环境变量覆盖
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub mod script;
pub mod window;

pub use script::{ConsoleConfig, FrameConfig, ScriptConfig};
pub use window::WindowConfig;

/// 配置文件名（不带扩展名）
const CONFIG_NAME: &str = "lou";

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 文件读取错误
    #[error("Config file error: {0}")]
    FileError(#[from] std::io::Error),
    /// 解析错误
    #[error("Config parse error: {0}")]
    ParseError(String),
    /// 验证错误
    #[error("Config validation error: {0}")]
    ValidationError(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// 宿主主配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    /// 窗口配置
    #[serde(default)]
    pub window: WindowConfig,

    /// 脚本配置
    #[serde(default)]
    pub script: ScriptConfig,

    /// 帧循环配置
    #[serde(default)]
    pub frame: FrameConfig,

    /// 控制台配置
    #[serde(default)]
    pub console: ConsoleConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl HostConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 从TOML文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_toml_str(&content)
    }

    /// 从TOML字符串解析配置
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 从JSON文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_json_str(&content)
    }

    /// 从JSON字符串解析配置
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 保存为TOML文件
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, content).map_err(ConfigError::FileError)
    }

    /// 保存为JSON文件
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, content).map_err(ConfigError::FileError)
    }

    /// 从环境变量覆盖配置
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("LOU_ENTRY") {
            self.script.entry = PathBuf::from(val);
        }

        // 窗口配置
        if let Some(val) = lookup("LOU_WINDOW_TITLE") {
            self.window.title = val;
        }
        if let Some(width) = lookup("LOU_WINDOW_WIDTH").and_then(|val| val.parse().ok()) {
            self.window.width = width;
        }
        if let Some(height) = lookup("LOU_WINDOW_HEIGHT").and_then(|val| val.parse().ok()) {
            self.window.height = height;
        }

        // 帧循环配置
        if let Some(fps) = lookup("LOU_TARGET_FPS").and_then(|val| val.parse().ok()) {
            self.frame.target_fps = fps;
        }
        if let Some(frames) = lookup("LOU_MAX_FRAMES").and_then(|val| val.parse().ok()) {
            self.frame.max_frames = Some(frames);
        }

        if let Some(level) = lookup("LOU_LOG_LEVEL").and_then(|val| val.parse().ok()) {
            self.logging.level = level;
        }
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        self.window.validate()?;
        self.script.validate()?;
        self.frame.validate()?;
        self.console.validate()?;
        Ok(())
    }

    /// 自动查找并加载配置文件
    ///
    /// 按以下顺序查找：
    /// 1. ./lou.toml
    /// 2. ./lou.json
    /// 3. <用户配置目录>/lou/lou.toml
    /// 4. 使用默认配置
    pub fn load_or_default() -> Self {
        let toml_name = format!("{CONFIG_NAME}.toml");
        let json_name = format!("{CONFIG_NAME}.json");

        if Path::new(&toml_name).is_file() {
            match Self::from_toml_file(&toml_name) {
                Ok(config) => {
                    tracing::info!(target: "lou::host", "Loaded config from {toml_name}");
                    return config;
                }
                Err(e) => tracing::warn!(target: "lou::host", "Ignoring {toml_name}: {e}"),
            }
        }

        if Path::new(&json_name).is_file() {
            match Self::from_json_file(&json_name) {
                Ok(config) => {
                    tracing::info!(target: "lou::host", "Loaded config from {json_name}");
                    return config;
                }
                Err(e) => tracing::warn!(target: "lou::host", "Ignoring {json_name}: {e}"),
            }
        }

        if let Some(config_path) = user_config_path() {
            if let Ok(config) = Self::from_toml_file(&config_path) {
                tracing::info!(target: "lou::host", "Loaded config from {:?}", config_path);
                return config;
            }
        }

        tracing::info!(target: "lou::host", "Using default configuration");
        Self::default()
    }
}

/// 用户配置目录中的配置文件
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_NAME).join(format!("{CONFIG_NAME}.toml")))
}

/// 日志配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别，`RUST_LOG` 优先
    pub level: LogLevel,
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// 跟踪
    Trace,
    /// 调试
    Debug,
    /// 信息
    #[default]
    Info,
    /// 警告
    Warn,
    /// 错误
    Error,
}

impl LogLevel {
    /// `EnvFilter` 指令
    pub const fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(ConfigError::ParseError(format!("unknown log level '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = HostConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.window.width, 800);
        assert_eq!(config.frame.target_fps, 60);
        assert_eq!(config.script.entry, PathBuf::from("init.js"));
    }

    #[test]
    fn test_toml_serialization() {
        let config = HostConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: HostConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = HostConfig::from_toml_str(
            r#"
            [window]
            title = "demo"

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.window.title, "demo");
        assert_eq!(config.window.height, 600);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.script.extension, "js");
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("lou.json");
        let mut config = HostConfig::default();
        config.frame.max_frames = Some(3);
        config.save_json(&path).unwrap();
        assert_eq!(HostConfig::from_json_file(&path).unwrap(), config);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("LOU_ENTRY", "game/main.js"),
            ("LOU_WINDOW_WIDTH", "1024"),
            ("LOU_WINDOW_HEIGHT", "not a number"),
            ("LOU_MAX_FRAMES", "10"),
            ("LOU_LOG_LEVEL", "WARN"),
        ]
        .into_iter()
        .collect();
        let mut config = HostConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|val| val.to_string()));
        assert_eq!(config.script.entry, PathBuf::from("game/main.js"));
        assert_eq!(config.window.width, 1024);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.frame.max_frames, Some(10));
        assert_eq!(config.logging.level, LogLevel::Warn);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = HostConfig::default();
        config.frame.target_fps = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));

        let mut config = HostConfig::default();
        config.script.extension = ".js".to_string();
        assert!(config.validate().is_err());
    }
}
