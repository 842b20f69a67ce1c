//! Action bean 注册
//!
//! 每个 action bean 类型对应一个 [`ActionBeanDefinition`]：URL 绑定、事件处理方法、
//! 自定义校验方法以及字段校验声明。定义在启动时构建，之后只读。

use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tessera_validator::{
    CustomValidator, Locale, SpecError, ValidationErrors, ValidationSpecSet, ValidationState,
};

use crate::bean::Bean;
use crate::outcome::{Outcome, Redisplay};
use crate::property::Property;

/// 类型擦除后的事件处理函数
pub type HandlerFn =
    Arc<dyn Fn(&mut dyn Any, &mut ActionContext) -> anyhow::Result<Outcome> + Send + Sync>;

/// 事件处理方法
#[derive(Clone)]
pub struct HandlerMethod {
    handler_type: TypeId,
    handler_name: &'static str,
    event_name: String,
    invoke: HandlerFn,
    is_default: bool,
    ignore_validation_errors: bool,
    skip_validation: bool,
}

impl HandlerMethod {
    pub fn handler_type(&self) -> TypeId {
        self.handler_type
    }

    pub fn handler_name(&self) -> &'static str {
        self.handler_name
    }

    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    /// 即使存在校验错误也执行
    pub fn ignores_validation_errors(&self) -> bool {
        self.ignore_validation_errors
    }

    /// 绑定后不执行任何校验
    pub fn skips_validation(&self) -> bool {
        self.skip_validation
    }

    pub fn invoke(&self, bean: &mut dyn Any, cx: &mut ActionContext) -> anyhow::Result<Outcome> {
        (self.invoke)(bean, cx)
    }
}

impl fmt::Debug for HandlerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerMethod")
            .field("handler", &self.handler_name)
            .field("event", &self.event_name)
            .field("is_default", &self.is_default)
            .field("ignore_validation_errors", &self.ignore_validation_errors)
            .field("skip_validation", &self.skip_validation)
            .finish()
    }
}

/// 事件声明
pub struct Event<T> {
    name: String,
    invoke: HandlerFn,
    is_default: bool,
    ignore_validation_errors: bool,
    skip_validation: bool,
    _marker: PhantomData<fn(&mut T)>,
}

impl<T: Bean> Event<T> {
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut T, &mut ActionContext) -> anyhow::Result<Outcome> + Send + Sync + 'static,
    {
        let name = name.into();
        let event = name.clone();
        let invoke: HandlerFn = Arc::new(move |bean: &mut dyn Any, cx: &mut ActionContext| {
            let bean = bean.downcast_mut::<T>().ok_or_else(|| {
                anyhow::anyhow!(
                    "event '{}' expects a {} bean",
                    event,
                    std::any::type_name::<T>()
                )
            })?;
            handler(bean, cx)
        });

        Self {
            name,
            invoke,
            is_default: false,
            ignore_validation_errors: false,
            skip_validation: false,
            _marker: PhantomData,
        }
    }

    /// 标记为默认事件
    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// 存在校验错误时仍然执行
    pub fn ignore_validation_errors(mut self) -> Self {
        self.ignore_validation_errors = true;
        self
    }

    /// 跳过校验（参数仍然绑定）
    pub fn dont_validate(mut self) -> Self {
        self.skip_validation = true;
        self
    }
}

/// 自定义校验方法声明
pub struct ValidationMethod<T> {
    name: String,
    events: Vec<String>,
    when: ValidationState,
    check: Box<dyn Fn(&T, &mut ValidationErrors) + Send + Sync>,
}

impl<T: Bean> ValidationMethod<T> {
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&T, &mut ValidationErrors) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            events: Vec::new(),
            when: ValidationState::Always,
            check: Box::new(check),
        }
    }

    /// 限定事件，`!name` 表示排除
    pub fn on<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.events = events.into_iter().map(Into::into).collect();
        self
    }

    /// 只有此前没有任何错误时才执行
    pub fn when_valid(mut self) -> Self {
        self.when = ValidationState::NoErrors;
        self
    }

    fn into_validator(self) -> CustomValidator<dyn Any> {
        let check = self.check;
        CustomValidator::new(self.name, move |bean: &dyn Any, errors: &mut ValidationErrors| {
            if let Some(bean) = bean.downcast_ref::<T>() {
                check(bean, errors);
            }
        })
        .on(self.events)
        .when(self.when)
    }
}

fn create_bean<T: Bean + Default>() -> Box<dyn Property> {
    Box::new(T::default())
}

/// Action bean 定义
pub struct ActionBeanDefinition {
    type_id: TypeId,
    type_name: &'static str,
    url_binding: String,
    wizard: bool,
    factory: fn() -> Box<dyn Property>,
    specs: fn() -> Result<ValidationSpecSet, SpecError>,
    handlers: Vec<HandlerMethod>,
    validators: Vec<CustomValidator<dyn Any>>,
}

impl ActionBeanDefinition {
    pub fn builder<T: Bean + Default>(url_binding: impl Into<String>) -> ActionBeanBuilder<T> {
        ActionBeanBuilder::new(url_binding)
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn url_binding(&self) -> &str {
        &self.url_binding
    }

    /// 是否为多步骤向导流程
    pub fn is_wizard(&self) -> bool {
        self.wizard
    }

    /// 为一次请求创建新的 bean 实例
    pub fn create_bean(&self) -> Box<dyn Property> {
        (self.factory)()
    }

    pub fn validation_specs(&self) -> Result<ValidationSpecSet, SpecError> {
        (self.specs)()
    }

    pub fn handlers(&self) -> &[HandlerMethod] {
        &self.handlers
    }

    pub fn handler(&self, event: &str) -> Option<&HandlerMethod> {
        self.handlers.iter().find(|h| h.event_name == event)
    }

    /// 显式标记的默认事件；只有一个事件时它就是默认事件
    pub fn default_handler(&self) -> Option<&HandlerMethod> {
        self.handlers.iter().find(|h| h.is_default).or(match self.handlers.as_slice() {
            [only] => Some(only),
            _ => None,
        })
    }

    pub fn validators(&self) -> &[CustomValidator<dyn Any>] {
        &self.validators
    }
}

impl fmt::Debug for ActionBeanDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionBeanDefinition")
            .field("type_name", &self.type_name)
            .field("url_binding", &self.url_binding)
            .field("wizard", &self.wizard)
            .field("handlers", &self.handlers)
            .field("validators", &self.validators)
            .finish()
    }
}

/// Action bean 定义构建器
pub struct ActionBeanBuilder<T> {
    url_binding: String,
    wizard: bool,
    events: Vec<Event<T>>,
    validators: Vec<CustomValidator<dyn Any>>,
}

impl<T: Bean + Default> ActionBeanBuilder<T> {
    pub fn new(url_binding: impl Into<String>) -> Self {
        Self {
            url_binding: url_binding.into(),
            wizard: false,
            events: Vec::new(),
            validators: Vec::new(),
        }
    }

    /// 标记为多步骤向导流程
    pub fn wizard(mut self) -> Self {
        self.wizard = true;
        self
    }

    pub fn event(mut self, event: Event<T>) -> Self {
        self.events.push(event);
        self
    }

    pub fn handler<F>(self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut T, &mut ActionContext) -> anyhow::Result<Outcome> + Send + Sync + 'static,
    {
        self.event(Event::new(name, handler))
    }

    pub fn default_handler<F>(self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut T, &mut ActionContext) -> anyhow::Result<Outcome> + Send + Sync + 'static,
    {
        self.event(Event::new(name, handler).as_default())
    }

    /// 注册自定义校验方法，按注册顺序执行
    pub fn validation_method(mut self, method: ValidationMethod<T>) -> Self {
        self.validators.push(method.into_validator());
        self
    }

    pub fn build(self) -> ActionBeanDefinition {
        let type_id = TypeId::of::<T>();
        let type_name = T::descriptor().type_name();
        let handlers = self
            .events
            .into_iter()
            .map(|event| HandlerMethod {
                handler_type: type_id,
                handler_name: type_name,
                event_name: event.name,
                invoke: event.invoke,
                is_default: event.is_default,
                ignore_validation_errors: event.ignore_validation_errors,
                skip_validation: event.skip_validation,
            })
            .collect();

        ActionBeanDefinition {
            type_id,
            type_name,
            url_binding: self.url_binding,
            wizard: self.wizard,
            factory: create_bean::<T>,
            specs: T::validation_spec_set,
            handlers,
            validators: self.validators,
        }
    }
}

/// 事件处理方法可见的请求上下文
#[derive(Debug, Clone)]
pub struct ActionContext {
    path: String,
    url_binding: String,
    event: String,
    parameters: BTreeMap<String, Vec<String>>,
    locale: Locale,
    source_page: Option<String>,
    errors: ValidationErrors,
}

impl ActionContext {
    pub(crate) fn new(
        path: String,
        url_binding: String,
        event: String,
        parameters: BTreeMap<String, Vec<String>>,
        locale: Locale,
        source_page: Option<String>,
        errors: ValidationErrors,
    ) -> Self {
        Self {
            path,
            url_binding,
            event,
            parameters,
            locale,
            source_page,
            errors,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn url_binding(&self) -> &str {
        &self.url_binding
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(name)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    pub fn parameters(&self) -> &BTreeMap<String, Vec<String>> {
        &self.parameters
    }

    pub fn locale(&self) -> &Locale {
        &self.locale
    }

    pub fn source_page(&self) -> Option<&str> {
        self.source_page.as_deref()
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    /// 事件处理方法也可以添加错误，然后返回 [`ActionContext::redisplay`]
    pub fn errors_mut(&mut self) -> &mut ValidationErrors {
        &mut self.errors
    }

    /// 回显来源页面，携带当前错误与全部提交值
    pub fn redisplay(&self) -> Outcome {
        Outcome::Redisplay(Redisplay::new(
            self.source_page.clone(),
            self.errors.clone(),
            self.parameters.clone(),
        ))
    }

    pub(crate) fn into_errors(self) -> ValidationErrors {
        self.errors
    }
}

/// Action bean 注册信息
///
/// 用于编译时自动收集，使用方式：
///
/// ```ignore
/// inventory::submit! {
///     ActionBeanRegistration::new("CalculatorActionBean", calculator_definition)
/// }
/// ```
pub struct ActionBeanRegistration {
    pub name: &'static str,
    pub create: fn() -> ActionBeanDefinition,
}

impl ActionBeanRegistration {
    pub const fn new(name: &'static str, create: fn() -> ActionBeanDefinition) -> Self {
        Self { name, create }
    }
}

inventory::collect!(ActionBeanRegistration);

/// 获取所有注册的 action bean
pub fn get_all_action_beans() -> Vec<&'static ActionBeanRegistration> {
    inventory::iter::<ActionBeanRegistration>
        .into_iter()
        .collect()
}
