// tessera-core: Tessera 框架的公共基础设施
//
// 提供各个模块共用的能力：
// - 分层配置（Environment + PropertySource）
// - 日志初始化（tracing-subscriber）
// - 统一错误类型
// - 命名工具（属性名、字段显示名）

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod utils;

pub use config::{
    ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource, PropertySource,
    TomlPropertySource,
};
pub use constants::*;
pub use error::{CoreError, Result};
pub use logging::{LogFormat, LogLevel, LoggingConfig};

/// Prelude 模块，包含常用的类型
pub mod prelude {
    pub use crate::config::{
        ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource, PropertySource,
        TomlPropertySource,
    };
    pub use crate::error::{CoreError, Result};
    pub use crate::logging::{LogFormat, LogLevel, LoggingConfig};
    pub use crate::utils;
    pub use anyhow::{anyhow, Context};
}
