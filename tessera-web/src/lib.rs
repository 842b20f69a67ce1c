//! # Tessera Web
//!
//! Action bean 风格的 Rust Web 框架，基于 Axum 构建
//!
//! ## 核心特性
//!
//! - **URL 绑定** - 请求路径按最长前缀匹配到 action bean，事件名决定处理方法
//! - **参数绑定** - `user.address[0].city` 形式的属性路径，自动创建中间对象
//! - **类型转换** - 区域相关的数字、日期、枚举转换，失败时收集为字段错误
//! - **校验** - 字段声明式校验、自定义校验方法、向导流程的分步必填检查
//! - **异常处理链** - 按错误类型选择处理器，从根因向外查找
//!
//! ## 示例
//!
//! ```ignore
//! use tessera_web::prelude::*;
//!
//! #[derive(Debug, Default, Bean)]
//! pub struct CalculatorActionBean {
//!     #[validate(required)]
//!     number_one: Option<f64>,
//!     #[validate(required)]
//!     number_two: Option<f64>,
//!     result: Option<f64>,
//! }
//!
//! let definition = ActionBeanBuilder::<CalculatorActionBean>::new("/Calculator.action")
//!     .default_handler("addition", |bean, _| {
//!         bean.result = Some(bean.number_one.unwrap_or_default() + bean.number_two.unwrap_or_default());
//!         Ok(Outcome::forward("/index.jsp"))
//!     })
//!     .build();
//! ```

extern crate self as tessera_web;

pub mod action;
pub mod bean;
pub mod binding;
pub mod dispatcher;
pub mod exception_handler;
pub mod manifest;
pub mod outcome;
pub mod property;
pub mod request;
pub mod resolver;
pub mod server;

pub use action::{
    ActionBeanBuilder, ActionBeanDefinition, ActionBeanRegistration, ActionContext, Event,
    HandlerMethod, ValidationMethod,
};
pub use bean::{Bean, BeanDescriptor};
pub use binding::{BindingError, BindingResult, PropertyPathResolver};
pub use dispatcher::{DispatchError, DispatchResult, DispatchState, Dispatcher, DispatcherSettings};
pub use exception_handler::{
    CatchAllExceptionHandler, ExceptionContext, ExceptionHandler, ExceptionHandlerRegistration,
    ExceptionHandlerRegistry, HandlerRole, TypedExceptionHandler,
};
pub use manifest::{DelimitedManifestCodec, FieldManifestCodec};
pub use outcome::{Onward, Outcome, Redisplay, StreamOutcome};
pub use property::{Property, PropertyError, PropertyPath, Segment};
pub use request::ActionRequest;
pub use resolver::{ActionResolver, ResolverError, UrlBinding};
pub use server::{ActionServer, ServerProperties};

// 派生宏与同名 trait 位于不同命名空间
pub use tessera_web_macros::{Bean, Enumerated};

// 重新导出 inventory，供 `inventory::submit!` 使用
pub use inventory;

pub mod prelude {
    //! 预导入模块

    pub use crate::action::*;
    pub use crate::dispatcher::{Dispatcher, DispatcherSettings};
    pub use crate::exception_handler::{
        ExceptionContext, ExceptionHandler, ExceptionHandlerRegistration, ExceptionHandlerRegistry,
    };
    pub use crate::outcome::Outcome;
    pub use crate::request::ActionRequest;
    pub use crate::resolver::ActionResolver;
    pub use crate::server::{ActionServer, ServerProperties};
    pub use crate::{Bean, Enumerated};

    pub use tessera_validator::{
        Enumerated, Locale, MapLocalizationProvider, TypeConverterRegistry, ValidationError,
        ValidationErrors,
    };
}

/// 派生宏生成代码使用的路径，不属于公开 API
#[doc(hidden)]
pub mod __private {
    pub use crate::bean::{inspect_bean, navigate_bean, snapshot_bean, Bean, BeanDescriptor};
    pub use crate::property::{
        assign_scalar, BindContext, ConversionFailure, Property, PropertyError, Segment,
    };
    pub use serde_json::Value;
    pub use std::any::Any;
    pub use std::sync::OnceLock;
    pub use tessera_validator::{
        enum_from_converted, Converted, Convertible, Enumerated, FieldValidationSpec, SpecError,
        TargetType, ValidationSpecSet,
    };
}
