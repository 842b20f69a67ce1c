//! 框架配置常量定义
//!
//! 定义所有框架使用的配置键名称

// ==================== Server 配置 ====================

/// 服务器监听地址
pub const SERVER_HOST: &str = "server.host";

/// 服务器监听端口
pub const SERVER_PORT: &str = "server.port";

/// 是否启用请求日志
pub const SERVER_ENABLE_REQUEST_LOGGING: &str = "server.enable-request-logging";

// ==================== Dispatcher 配置 ====================

/// 默认区域设置（例如 en_US、de_DE）
pub const WEB_DEFAULT_LOCALE: &str = "tessera.web.default-locale";

/// 指定事件名称的特殊请求参数
pub const WEB_EVENT_PARAMETER: &str = "tessera.web.event-parameter";

/// 记录来源页面的请求参数（用于回显）
pub const WEB_SOURCE_PAGE_PARAMETER: &str = "tessera.web.source-page-parameter";

/// 记录当前页面字段清单的隐藏参数（向导流程使用）
pub const WEB_FIELDS_PRESENT_PARAMETER: &str = "tessera.web.fields-present-parameter";

/// 绑定时序列索引的上限，超出的参数作为绑定错误跳过
pub const WEB_MAX_INDEX: &str = "tessera.web.max-index";

// ==================== 默认值 ====================

pub const DEFAULT_EVENT_PARAMETER: &str = "_eventName";
pub const DEFAULT_SOURCE_PAGE_PARAMETER: &str = "_sourcePage";
pub const DEFAULT_FIELDS_PRESENT_PARAMETER: &str = "__fp";
pub const DEFAULT_LOCALE: &str = "en_US";
pub const DEFAULT_MAX_INDEX: usize = 10_000;
