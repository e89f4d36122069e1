use super::{ConfigError, ConfigResult};
use crate::impl_default;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 脚本配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// 入口脚本
    pub entry: PathBuf,

    /// 模块文件扩展名（不带点）
    pub extension: String,
}

impl_default!(ScriptConfig {
    entry: PathBuf::from("init.js"),
    extension: "js".to_string(),
});

impl ScriptConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.extension.is_empty() || self.extension.starts_with('.') {
            return Err(ConfigError::ValidationError(format!(
                "Invalid module extension '{}'",
                self.extension
            )));
        }
        if self.entry.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError("Empty entry script path".to_string()));
        }
        Ok(())
    }
}

/// 帧循环配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// 目标帧率
    pub target_fps: u32,

    /// 运行指定帧数后退出
    pub max_frames: Option<u64>,
}

impl_default!(FrameConfig {
    target_fps: 60,
    max_frames: None,
});

impl FrameConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.target_fps == 0 || self.target_fps > 1000 {
            return Err(ConfigError::ValidationError(
                "Invalid target FPS".to_string(),
            ));
        }
        Ok(())
    }
}

/// 控制台配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// 保留的记录条数
    pub capacity: usize,

    /// 同时打印到标准输出
    pub echo: bool,
}

impl_default!(ConsoleConfig {
    capacity: 1024,
    echo: true,
});

impl ConsoleConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.capacity == 0 {
            return Err(ConfigError::ValidationError(
                "Console capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
