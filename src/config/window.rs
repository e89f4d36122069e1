use super::{ConfigError, ConfigResult};
use crate::impl_default;
use serde::{Deserialize, Serialize};

/// 窗口配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// 标题
    pub title: String,

    /// 宽度（逻辑像素）
    pub width: u32,

    /// 高度（逻辑像素）
    pub height: u32,

    /// 是否允许调整大小
    pub resizable: bool,
}

impl_default!(WindowConfig {
    title: "lou".to_string(),
    width: 800,
    height: 600,
    resizable: true,
});

impl WindowConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::ValidationError(format!(
                "Invalid window size {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}
