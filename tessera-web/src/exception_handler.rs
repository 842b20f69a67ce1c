//! 异常处理链
//!
//! 分派过程中的致命错误（路由失败、事件不存在、事件处理方法返回错误）交给
//! [`ExceptionHandlerRegistry`]。选择规则：
//!
//! 1. 沿错误的 `source()` 链从根因向外查找
//! 2. 每一层按优先级依次询问已注册的处理器，第一个返回结果的处理器生效
//! 3. 都不处理时使用兜底处理器；仍未处理则错误返回给调用者
//!
//! 处理器可以显式注册，也可以用 `inventory::submit!` 提交
//! [`ExceptionHandlerRegistration`]，再由 [`ExceptionHandlerRegistry::register_inventory`] 收集。

use std::error::Error;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::dispatcher::DispatchError;
use crate::outcome::Outcome;

/// 错误发生时的请求上下文
#[derive(Debug, Clone, Default)]
pub struct ExceptionContext {
    pub path: String,
    pub event: Option<String>,
    pub handler_type: Option<&'static str>,
}

impl ExceptionContext {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_event(mut self, event: Option<String>) -> Self {
        self.event = event;
        self
    }

    pub fn with_handler_type(mut self, handler_type: Option<&'static str>) -> Self {
        self.handler_type = handler_type;
        self
    }
}

/// 异常处理器
///
/// # 示例
///
/// ```ignore
/// struct NotFoundHandler;
///
/// impl ExceptionHandler for NotFoundHandler {
///     fn name(&self) -> &str {
///         "NotFoundHandler"
///     }
///
///     fn can_handle(&self, error: &(dyn Error + 'static)) -> bool {
///         error.is::<RecordNotFound>()
///     }
///
///     fn handle(&self, _error: &(dyn Error + 'static), _cx: &ExceptionContext) -> Option<Outcome> {
///         Some(Outcome::forward("/error/404"))
///     }
/// }
/// ```
pub trait ExceptionHandler: Send + Sync {
    fn name(&self) -> &str;

    /// 优先级，数字越小优先级越高
    fn priority(&self) -> i32 {
        100
    }

    fn can_handle(&self, error: &(dyn Error + 'static)) -> bool;

    /// 返回 `None` 表示放弃处理，继续询问下一个处理器
    fn handle(&self, error: &(dyn Error + 'static), cx: &ExceptionContext) -> Option<Outcome>;
}

/// 按具体错误类型匹配的处理器
pub struct TypedExceptionHandler<E, F> {
    name: String,
    priority: i32,
    handle: F,
    _marker: PhantomData<fn(&E)>,
}

impl<E, F> TypedExceptionHandler<E, F>
where
    E: Error + 'static,
    F: Fn(&E, &ExceptionContext) -> Option<Outcome> + Send + Sync,
{
    pub fn new(name: impl Into<String>, handle: F) -> Self {
        Self {
            name: name.into(),
            priority: 100,
            handle,
            _marker: PhantomData,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl<E, F> ExceptionHandler for TypedExceptionHandler<E, F>
where
    E: Error + 'static,
    F: Fn(&E, &ExceptionContext) -> Option<Outcome> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn can_handle(&self, error: &(dyn Error + 'static)) -> bool {
        error.is::<E>()
    }

    fn handle(&self, error: &(dyn Error + 'static), cx: &ExceptionContext) -> Option<Outcome> {
        error.downcast_ref::<E>().and_then(|e| (self.handle)(e, cx))
    }
}

/// 接受任何错误的兜底处理器
pub struct CatchAllExceptionHandler<F> {
    handle: F,
}

impl<F> CatchAllExceptionHandler<F>
where
    F: Fn(&(dyn Error + 'static), &ExceptionContext) -> Option<Outcome> + Send + Sync,
{
    pub fn new(handle: F) -> Self {
        Self { handle }
    }
}

impl<F> ExceptionHandler for CatchAllExceptionHandler<F>
where
    F: Fn(&(dyn Error + 'static), &ExceptionContext) -> Option<Outcome> + Send + Sync,
{
    fn name(&self) -> &str {
        "CatchAllExceptionHandler"
    }

    fn priority(&self) -> i32 {
        i32::MAX
    }

    fn can_handle(&self, _error: &(dyn Error + 'static)) -> bool {
        true
    }

    fn handle(&self, error: &(dyn Error + 'static), cx: &ExceptionContext) -> Option<Outcome> {
        (self.handle)(error, cx)
    }
}

/// 通过 inventory 提交的处理器所占的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerRole {
    /// 按错误类型匹配，参与优先级排序
    Typed,
    /// 填入兜底位置
    Fallback,
}

/// 编译时提交的异常处理器
///
/// ```ignore
/// inventory::submit! {
///     ExceptionHandlerRegistration::new("bugNotFound", bug_not_found_handler)
/// }
/// ```
pub struct ExceptionHandlerRegistration {
    pub name: &'static str,
    pub role: HandlerRole,
    pub create: fn() -> Box<dyn ExceptionHandler>,
}

impl ExceptionHandlerRegistration {
    pub const fn new(name: &'static str, create: fn() -> Box<dyn ExceptionHandler>) -> Self {
        Self {
            name,
            role: HandlerRole::Typed,
            create,
        }
    }

    pub const fn fallback(name: &'static str, create: fn() -> Box<dyn ExceptionHandler>) -> Self {
        Self {
            name,
            role: HandlerRole::Fallback,
            create,
        }
    }
}

inventory::collect!(ExceptionHandlerRegistration);

/// 异常处理器注册表
#[derive(Default)]
pub struct ExceptionHandlerRegistry {
    handlers: Vec<Arc<dyn ExceptionHandler>>,
    fallback: Option<Arc<dyn ExceptionHandler>>,
}

impl ExceptionHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H: ExceptionHandler + 'static>(&mut self, handler: H) {
        self.register_arc(Arc::new(handler));
    }

    pub fn register_boxed(&mut self, handler: Box<dyn ExceptionHandler>) {
        self.register_arc(Arc::from(handler));
    }

    pub fn register_arc(&mut self, handler: Arc<dyn ExceptionHandler>) {
        self.handlers.push(handler);
        // 按优先级排序
        self.handlers.sort_by_key(|h| h.priority());
    }

    /// 为具体错误类型注册处理函数
    pub fn on<E, F>(mut self, name: impl Into<String>, handle: F) -> Self
    where
        E: Error + 'static,
        F: Fn(&E, &ExceptionContext) -> Option<Outcome> + Send + Sync + 'static,
    {
        self.register(TypedExceptionHandler::new(name, handle));
        self
    }

    /// 设置兜底处理器，在所有类型处理器之后询问
    pub fn set_fallback<H: ExceptionHandler + 'static>(&mut self, handler: H) {
        self.set_fallback_arc(Arc::new(handler));
    }

    fn set_fallback_arc(&mut self, handler: Arc<dyn ExceptionHandler>) {
        if let Some(previous) = self.fallback.replace(handler) {
            tracing::warn!(replaced = previous.name(), "Fallback exception handler replaced");
        }
    }

    /// 收集所有通过 `inventory::submit!` 提交的处理器
    ///
    /// 按注册名排序后加入，结果与链接顺序无关；多个兜底处理器时名称靠后的生效
    pub fn register_inventory(mut self) -> Self {
        tracing::info!("🔍 Discovering exception handlers from inventory...");

        let mut registrations: Vec<&ExceptionHandlerRegistration> =
            inventory::iter::<ExceptionHandlerRegistration>.into_iter().collect();
        registrations.sort_by_key(|r| r.name);

        for registration in registrations {
            let handler: Arc<dyn ExceptionHandler> = Arc::from((registration.create)());
            match registration.role {
                HandlerRole::Typed => {
                    tracing::info!(
                        "✅ Auto-registered exception handler: {} (priority {})",
                        registration.name,
                        handler.priority()
                    );
                    self.register_arc(handler);
                }
                HandlerRole::Fallback => {
                    tracing::info!("✅ Auto-registered fallback handler: {}", registration.name);
                    self.set_fallback_arc(handler);
                }
            }
        }

        tracing::info!(
            "✅ Exception handler discovery completed: {} handlers, fallback: {}",
            self.handlers.len(),
            self.has_fallback()
        );
        self
    }

    pub fn with_fallback<F>(mut self, handle: F) -> Self
    where
        F: Fn(&(dyn Error + 'static), &ExceptionContext) -> Option<Outcome> + Send + Sync + 'static,
    {
        self.set_fallback(CatchAllExceptionHandler::new(handle));
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty() && self.fallback.is_none()
    }

    /// 处理分派错误；返回 `None` 表示没有处理器接手
    pub fn handle(&self, error: &DispatchError, cx: &ExceptionContext) -> Option<Outcome> {
        let outermost: &(dyn Error + 'static) = error;
        let mut chain: Vec<&(dyn Error + 'static)> =
            std::iter::successors(Some(outermost), |&e| e.source()).collect();
        chain.reverse();

        for cause in chain {
            for handler in &self.handlers {
                if !handler.can_handle(cause) {
                    continue;
                }
                if let Some(outcome) = handler.handle(cause, cx) {
                    tracing::debug!(
                        handler = handler.name(),
                        error = %cause,
                        path = %cx.path,
                        "Error handled by exception handler"
                    );
                    return Some(outcome);
                }
            }
        }

        let fallback = self.fallback.as_ref()?;
        let outcome = fallback.handle(outermost, cx)?;
        tracing::debug!(
            handler = fallback.name(),
            error = %error,
            path = %cx.path,
            "Error handled by fallback handler"
        );
        Some(outcome)
    }
}

impl fmt::Debug for ExceptionHandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.handlers.iter().map(|h| h.name()).collect();
        f.debug_struct("ExceptionHandlerRegistry")
            .field("handlers", &names)
            .field("fallback", &self.fallback.as_ref().map(|h| h.name()))
            .finish()
    }
}
