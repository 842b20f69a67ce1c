use thiserror::Error;

/// 统一的错误处理类型
///
/// 应用层代码（事件处理方法、自定义校验等）使用 anyhow::Result，
/// 通过 .context() 方法添加错误上下文信息。
///
/// # 示例
///
/// ```rust,ignore
/// use anyhow::{Context, Result};
///
/// fn load_user(&self, name: &str) -> Result<User> {
///     self.users.get(name)
///         .cloned()
///         .ok_or_else(|| anyhow::anyhow!("User not found"))
///         .context(format!("Failed to load user '{}'", name))
/// }
/// ```
pub use anyhow::Result;

/// 基础设施层错误
#[derive(Debug, Error)]
pub enum CoreError {
    /// 日志系统初始化失败（通常是重复初始化）
    #[error("Failed to initialize logging: {0}")]
    LoggingInitFailed(String),

    /// 配置文件读取失败
    #[error("Failed to read config file {path}: {message}")]
    ConfigRead { path: String, message: String },

    /// 配置文件解析失败
    #[error("Failed to parse config '{name}': {message}")]
    ConfigParse { name: String, message: String },
}
