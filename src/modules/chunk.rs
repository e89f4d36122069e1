//! 代码块名称
//!
//! `@<绝对路径>` 表示来自真实文件，`=<标签>` 表示临时代码（REPL、宿主 `eval`）。

use std::fmt;
use std::path::{Path, PathBuf};

/// 标准输入来的临时代码块允许 `require`
pub const STDIN_LABEL: &str = "stdin";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChunkName {
    /// 入口脚本，可以使用裸模块名
    Entry(PathBuf),
    /// 被加载的模块文件
    File(PathBuf),
    /// 临时代码
    Transient(String),
}

impl ChunkName {
    pub fn parse(name: &str) -> Option<Self> {
        if let Some(path) = name.strip_prefix('@') {
            return Some(ChunkName::File(PathBuf::from(path)));
        }
        name.strip_prefix('=')
            .map(|label| ChunkName::Transient(label.to_string()))
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            ChunkName::Entry(path) | ChunkName::File(path) => Some(path),
            ChunkName::Transient(_) => None,
        }
    }

    pub fn is_entry(&self) -> bool {
        matches!(self, ChunkName::Entry(_))
    }

    pub fn is_stdin(&self) -> bool {
        matches!(self, ChunkName::Transient(label) if label == STDIN_LABEL)
    }

    /// 只有真实文件和标准输入可以继续导入
    pub fn may_require(&self) -> bool {
        self.path().is_some() || self.is_stdin()
    }
}

impl fmt::Display for ChunkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkName::Entry(path) | ChunkName::File(path) => write!(f, "@{}", path.display()),
            ChunkName::Transient(label) => write!(f, "={label}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigils() {
        let file = ChunkName::parse("@/game/init.js").unwrap();
        assert_eq!(file, ChunkName::File(PathBuf::from("/game/init.js")));
        assert_eq!(file.to_string(), "@/game/init.js");
        assert!(file.may_require());

        let repl = ChunkName::parse("=repl").unwrap();
        assert_eq!(repl.to_string(), "=repl");
        assert!(!repl.may_require());
        assert!(ChunkName::Transient(STDIN_LABEL.into()).may_require());
        assert_eq!(ChunkName::parse("init.js"), None);
    }
}
