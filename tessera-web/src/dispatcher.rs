//! 请求分派
//!
//! 一次请求的处理过程是一个状态机：
//!
//! ```text
//! ResolveHandler → BindParameters → ValidateCustom → InvokeHandler → ExecuteOutcome → Done
//!        └────────────────┴─────────────────┴──────────────┴──→ Failed
//! ```
//!
//! 绑定出错时仍然进入校验；存在校验错误时跳过 `InvokeHandler`，直接以回显结果进入
//! `ExecuteOutcome`，除非事件处理方法声明忽略校验错误。整个过程同步执行，
//! 注册表与规则集合只读，bean 与绑定结果由本次分派独占。

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tessera_core::config::Environment;
use tessera_core::constants::{
    DEFAULT_EVENT_PARAMETER, DEFAULT_FIELDS_PRESENT_PARAMETER, DEFAULT_LOCALE, DEFAULT_MAX_INDEX,
    DEFAULT_SOURCE_PAGE_PARAMETER, WEB_DEFAULT_LOCALE, WEB_EVENT_PARAMETER,
    WEB_FIELDS_PRESENT_PARAMETER, WEB_MAX_INDEX, WEB_SOURCE_PAGE_PARAMETER,
};
use tessera_validator::{
    FieldValues, Locale, RequiredScope, TypeConverterRegistry, ValidationEngine, ValidationErrors,
};
use thiserror::Error;

use crate::action::{ActionBeanDefinition, ActionContext, HandlerMethod};
use crate::binding::{BindingError, BindingResult};
use crate::exception_handler::{ExceptionContext, ExceptionHandlerRegistry};
use crate::manifest::{DelimitedManifestCodec, FieldManifestCodec};
use crate::outcome::{Outcome, Redisplay};
use crate::property::{BindContext, Property};
use crate::request::ActionRequest;
use crate::resolver::{event_name_of, ActionResolver, ResolverError};

/// 分派状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    ResolveHandler,
    BindParameters,
    ValidateCustom,
    InvokeHandler,
    ExecuteOutcome,
    Done,
    Failed,
}

/// 分派过程中的致命错误
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("No action bean is bound to '{path}'")]
    NoBindingForPath { path: String },

    #[error(transparent)]
    Resolver(#[from] ResolverError),

    #[error("Event '{event}' of {handler_type} failed: {source}")]
    HandlerInvocation {
        handler_type: &'static str,
        event: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Unhandled error while dispatching '{path}': {source}")]
    Unhandled {
        path: String,
        #[source]
        source: Box<DispatchError>,
    },
}

impl DispatchError {
    /// 去掉 `Unhandled` 包装后的原始错误
    pub fn root(&self) -> &DispatchError {
        match self {
            DispatchError::Unhandled { source, .. } => source.root(),
            other => other,
        }
    }

    /// 路由层面的错误（没有匹配的绑定或事件）
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.root(),
            DispatchError::NoBindingForPath { .. }
                | DispatchError::Resolver(ResolverError::HandlerNotFound { .. })
                | DispatchError::Resolver(ResolverError::DefaultHandlerNotFound { .. })
        )
    }
}

/// 分派配置
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub event_parameter: String,
    pub source_page_parameter: String,
    pub fields_present_parameter: String,
    pub default_locale: Locale,
    pub max_index: usize,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            event_parameter: DEFAULT_EVENT_PARAMETER.to_string(),
            source_page_parameter: DEFAULT_SOURCE_PAGE_PARAMETER.to_string(),
            fields_present_parameter: DEFAULT_FIELDS_PRESENT_PARAMETER.to_string(),
            default_locale: Locale::parse(DEFAULT_LOCALE),
            max_index: DEFAULT_MAX_INDEX,
        }
    }
}

impl DispatcherSettings {
    /// 从 Environment 加载配置
    pub fn from_environment(env: &Environment) -> Self {
        Self {
            event_parameter: env.get_string_or(WEB_EVENT_PARAMETER, DEFAULT_EVENT_PARAMETER),
            source_page_parameter: env
                .get_string_or(WEB_SOURCE_PAGE_PARAMETER, DEFAULT_SOURCE_PAGE_PARAMETER),
            fields_present_parameter: env
                .get_string_or(WEB_FIELDS_PRESENT_PARAMETER, DEFAULT_FIELDS_PRESENT_PARAMETER),
            default_locale: Locale::parse(&env.get_string_or(WEB_DEFAULT_LOCALE, DEFAULT_LOCALE)),
            max_index: env
                .get_i64(WEB_MAX_INDEX)
                .and_then(|limit| usize::try_from(limit).ok())
                .unwrap_or(DEFAULT_MAX_INDEX),
        }
    }

    fn is_special(&self, name: &str) -> bool {
        name == self.event_parameter
            || name == self.source_page_parameter
            || name == self.fields_present_parameter
    }
}

/// 一次分派的结果
pub struct DispatchResult {
    outcome: Outcome,
    states: Vec<DispatchState>,
    event: Option<String>,
    errors: ValidationErrors,
    bean: Option<Box<dyn Property>>,
    binding_errors: Vec<BindingError>,
    handled_error: Option<DispatchError>,
}

impl DispatchResult {
    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn into_outcome(self) -> Outcome {
        self.outcome
    }

    /// 经过的状态
    pub fn states(&self) -> &[DispatchState] {
        &self.states
    }

    pub fn invoked(&self) -> bool {
        self.states.contains(&DispatchState::InvokeHandler)
    }

    pub fn event(&self) -> Option<&str> {
        self.event.as_deref()
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    /// 本次请求绑定的 bean；分派在绑定前失败时为 `None`
    pub fn bean<T: 'static>(&self) -> Option<&T> {
        self.bean.as_deref()?.as_any().downcast_ref::<T>()
    }

    pub fn bean_snapshot(&self) -> Option<serde_json::Value> {
        self.bean.as_deref().map(|bean| bean.snapshot())
    }

    pub fn binding_errors(&self) -> &[BindingError] {
        &self.binding_errors
    }

    /// 被异常处理器接手的错误
    pub fn handled_error(&self) -> Option<&DispatchError> {
        self.handled_error.as_ref()
    }
}

impl fmt::Debug for DispatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchResult")
            .field("outcome", &self.outcome)
            .field("states", &self.states)
            .field("event", &self.event)
            .field("errors", &self.errors)
            .field("bean", &self.bean_snapshot())
            .field("binding_errors", &self.binding_errors)
            .field("handled_error", &self.handled_error)
            .finish()
    }
}

/// 分派进度
struct Progress {
    states: Vec<DispatchState>,
    event: Option<String>,
    handler_type: Option<&'static str>,
}

impl Progress {
    fn new() -> Self {
        Self {
            states: Vec::with_capacity(6),
            event: None,
            handler_type: None,
        }
    }

    fn enter(&mut self, state: DispatchState) {
        tracing::debug!(state = ?state, event = ?self.event, "Dispatch state transition");
        self.states.push(state);
    }
}

/// 请求分派器
///
/// 只持有启动时构建的只读数据，可以放进 `Arc` 在请求间共享
pub struct Dispatcher {
    resolver: Arc<ActionResolver>,
    converters: Arc<TypeConverterRegistry>,
    exception_handlers: Arc<ExceptionHandlerRegistry>,
    manifest_codec: Arc<dyn FieldManifestCodec>,
    settings: DispatcherSettings,
}

impl Dispatcher {
    pub fn new(resolver: Arc<ActionResolver>) -> Self {
        Self {
            resolver,
            converters: Arc::new(TypeConverterRegistry::new()),
            exception_handlers: Arc::new(ExceptionHandlerRegistry::new()),
            manifest_codec: Arc::new(DelimitedManifestCodec::default()),
            settings: DispatcherSettings::default(),
        }
    }

    pub fn with_converters(mut self, converters: TypeConverterRegistry) -> Self {
        self.converters = Arc::new(converters);
        self
    }

    pub fn with_exception_handlers(mut self, handlers: ExceptionHandlerRegistry) -> Self {
        self.exception_handlers = Arc::new(handlers);
        self
    }

    pub fn with_manifest_codec(mut self, codec: impl FieldManifestCodec + 'static) -> Self {
        self.manifest_codec = Arc::new(codec);
        self
    }

    pub fn with_settings(mut self, settings: DispatcherSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn resolver(&self) -> &ActionResolver {
        &self.resolver
    }

    pub fn settings(&self) -> &DispatcherSettings {
        &self.settings
    }

    pub fn manifest_codec(&self) -> &dyn FieldManifestCodec {
        self.manifest_codec.as_ref()
    }

    /// 分派一次请求
    ///
    /// 致命错误先交给异常处理链；没有处理器接手时返回 [`DispatchError::Unhandled`]
    pub fn dispatch(&self, request: &ActionRequest) -> Result<DispatchResult, DispatchError> {
        let mut progress = Progress::new();

        match self.run(request, &mut progress) {
            Ok(result) => Ok(result),
            Err(error) => {
                progress.enter(DispatchState::Failed);
                let cx = ExceptionContext::new(request.path())
                    .with_event(progress.event.clone())
                    .with_handler_type(progress.handler_type);

                match self.exception_handlers.handle(&error, &cx) {
                    Some(outcome) => {
                        tracing::warn!(path = %request.path(), error = %error, "Dispatch failed, error handled");
                        Ok(DispatchResult {
                            outcome,
                            states: progress.states,
                            event: progress.event,
                            errors: ValidationErrors::new(),
                            bean: None,
                            binding_errors: Vec::new(),
                            handled_error: Some(error),
                        })
                    }
                    None => {
                        tracing::error!(path = %request.path(), error = %error, "Unhandled dispatch error");
                        Err(DispatchError::Unhandled {
                            path: request.path().to_string(),
                            source: Box::new(error),
                        })
                    }
                }
            }
        }
    }

    fn run(
        &self,
        request: &ActionRequest,
        progress: &mut Progress,
    ) -> Result<DispatchResult, DispatchError> {
        progress.enter(DispatchState::ResolveHandler);

        let matched = self
            .resolver
            .binding_for_path(request.path())
            .ok_or_else(|| DispatchError::NoBindingForPath {
                path: request.path().to_string(),
            })?;
        let binding = matched.binding();
        let definition = self
            .resolver
            .definition(binding.handler_type())
            .ok_or_else(|| ResolverError::UnknownBeanType {
                type_name: binding.handler_name().to_string(),
            })?;
        progress.handler_type = Some(definition.type_name());

        let parameters = request.merged_parameters(matched.captured());
        let handler = ActionResolver::resolve_event(
            definition,
            request.event_indicator(),
            &parameters,
            matched.path_info(),
            &self.settings.event_parameter,
        )?;
        let event = handler.event_name().to_string();
        progress.event = Some(event.clone());

        tracing::debug!(
            path = %request.path(),
            binding = %binding.pattern(),
            event = %event,
            "Resolved action bean"
        );

        let locale = request
            .requested_locale()
            .cloned()
            .unwrap_or_else(|| self.settings.default_locale.clone());

        progress.enter(DispatchState::BindParameters);
        let mut bean = definition.create_bean();
        let cx = BindContext::new(&self.converters, &locale).with_max_index(self.settings.max_index);
        let bound = BindingResult::bind_parameters(
            bean.as_mut(),
            &parameters,
            |name| self.settings.is_special(name) || definition.handler(event_name_of(name)).is_some(),
            &cx,
        );

        progress.enter(DispatchState::ValidateCustom);
        let (errors, binding_errors) = self.validate(definition, handler, &parameters, bean.as_any(), bound);

        let source_page = parameters
            .get(&self.settings.source_page_parameter)
            .and_then(|values| values.first())
            .cloned();

        let blocked = !errors.is_empty()
            && !handler.ignores_validation_errors()
            && !handler.skips_validation();

        let (outcome, errors) = if blocked {
            tracing::debug!(
                event = %event,
                errors = errors.len(),
                "Validation failed, redisplaying source page"
            );
            let outcome = Outcome::Redisplay(Redisplay::new(source_page, errors.clone(), parameters));
            (outcome, errors)
        } else {
            progress.enter(DispatchState::InvokeHandler);
            let mut cx = ActionContext::new(
                request.path().to_string(),
                binding.pattern().to_string(),
                event.clone(),
                parameters,
                locale,
                source_page,
                errors,
            );

            let any: &mut dyn Any = bean.as_any_mut();
            let outcome = handler
                .invoke(any, &mut cx)
                .map_err(|source| DispatchError::HandlerInvocation {
                    handler_type: definition.type_name(),
                    event: event.clone(),
                    source,
                })?;
            (outcome, cx.into_errors())
        };

        progress.enter(DispatchState::ExecuteOutcome);
        tracing::debug!(outcome = outcome.kind(), event = %event, "Dispatch produced outcome");
        progress.enter(DispatchState::Done);

        Ok(DispatchResult {
            outcome,
            states: std::mem::take(&mut progress.states),
            event: Some(event),
            errors,
            bean: Some(bean),
            binding_errors,
            handled_error: None,
        })
    }

    /// 字段校验与自定义校验；转换错误总是保留在结果中
    fn validate(
        &self,
        definition: &ActionBeanDefinition,
        handler: &HandlerMethod,
        parameters: &BTreeMap<String, Vec<String>>,
        bean: &dyn Any,
        bound: BindingResult,
    ) -> (ValidationErrors, Vec<BindingError>) {
        if handler.skips_validation() {
            tracing::debug!(event = %handler.event_name(), "Validation skipped for event");
            return bound.into_parts();
        }

        let event = handler.event_name();
        let scope = if definition.is_wizard() {
            self.wizard_scope(parameters, &bound)
        } else {
            RequiredScope::All
        };

        let field_errors = self
            .resolver
            .validation_engine()
            .validate(definition.type_id(), &bound, event, &scope);

        let (mut errors, binding_errors) = bound.into_parts();
        errors.merge(field_errors);
        ValidationEngine::run_custom(definition.validators(), bean, event, &mut errors);

        (errors, binding_errors)
    }

    /// 向导流程只对当前页面出现过的字段做必填检查
    fn wizard_scope(
        &self,
        parameters: &BTreeMap<String, Vec<String>>,
        bound: &BindingResult,
    ) -> RequiredScope {
        let manifest = parameters
            .get(&self.settings.fields_present_parameter)
            .into_iter()
            .flatten()
            .filter_map(|value| self.manifest_codec.decode(value))
            .flatten()
            .collect::<Vec<_>>();

        if manifest.is_empty() {
            tracing::debug!("No field manifest submitted, using submitted fields as required scope");
            RequiredScope::manifest(bound.submitted_names())
        } else {
            RequiredScope::manifest(manifest)
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("resolver", &self.resolver)
            .field("exception_handlers", &self.exception_handlers)
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionBeanBuilder, Event, ValidationMethod};
    use tessera_validator::ValidationError;

    #[derive(Debug, Default, crate::Bean)]
    struct Transfer {
        #[validate(required, min_value = 1)]
        amount: Option<i64>,
        #[validate(required, on = "!preview")]
        account: Option<String>,
        confirmed: bool,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("account {0} is locked")]
    struct AccountLocked(String);

    fn dispatcher(handlers: ExceptionHandlerRegistry) -> Dispatcher {
        let definition = ActionBeanBuilder::<Transfer>::new("/Transfer.action")
            .default_handler("submit", |t: &mut Transfer, _| {
                match t.account.as_deref() {
                    Some("locked") => Err(AccountLocked("locked".to_string()).into()),
                    _ => Ok(Outcome::redirect("/done").with_parameter("amount", t.amount)),
                }
            })
            .event(
                Event::new("preview", |_: &mut Transfer, _| Ok(Outcome::forward("/preview.jsp")))
                    .ignore_validation_errors(),
            )
            .event(
                Event::new("cancel", |_: &mut Transfer, _| Ok(Outcome::redirect("/home")))
                    .dont_validate(),
            )
            .validation_method(
                ValidationMethod::new("confirmation", |t: &Transfer, errors| {
                    if !t.confirmed {
                        errors.add("confirmed", ValidationError::simple("Please confirm"));
                    }
                })
                .on(["submit"])
                .when_valid(),
            )
            .build();

        let resolver = ActionResolver::builder().register(definition).build().unwrap();
        Dispatcher::new(Arc::new(resolver)).with_exception_handlers(handlers)
    }

    #[test]
    fn test_successful_dispatch_walks_all_states() {
        let dispatcher = dispatcher(ExceptionHandlerRegistry::new());
        let request = ActionRequest::from_pairs(
            "/Transfer.action",
            [("amount", "10"), ("account", "main"), ("confirmed", "on")],
        );

        let result = dispatcher.dispatch(&request).unwrap();
        assert_eq!(
            result.states(),
            &[
                DispatchState::ResolveHandler,
                DispatchState::BindParameters,
                DispatchState::ValidateCustom,
                DispatchState::InvokeHandler,
                DispatchState::ExecuteOutcome,
                DispatchState::Done,
            ]
        );
        assert_eq!(result.event(), Some("submit"));
        assert_eq!(result.outcome().url().unwrap(), "/done?amount=10");
        assert_eq!(result.bean::<Transfer>().unwrap().amount, Some(10));
    }

    #[test]
    fn test_validation_errors_skip_invocation() {
        let dispatcher = dispatcher(ExceptionHandlerRegistry::new());
        let request = ActionRequest::from_pairs(
            "/Transfer.action",
            [("amount", "0"), ("_sourcePage", "/transfer.jsp")],
        );

        let result = dispatcher.dispatch(&request).unwrap();
        assert!(!result.invoked());
        assert!(result.states().contains(&DispatchState::ExecuteOutcome));
        assert!(result.errors().has_field_errors("amount"));
        assert!(result.errors().has_field_errors("account"));
        // 已有错误时 when_valid 的校验方法不执行
        assert!(!result.errors().has_field_errors("confirmed"));

        match result.outcome() {
            Outcome::Redisplay(redisplay) => {
                assert_eq!(redisplay.source_page(), Some("/transfer.jsp"));
                assert_eq!(redisplay.values()["amount"], vec!["0".to_string()]);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_custom_validation_runs_on_clean_input() {
        let dispatcher = dispatcher(ExceptionHandlerRegistry::new());
        let request =
            ActionRequest::from_pairs("/Transfer.action", [("amount", "5"), ("account", "main")]);

        let result = dispatcher.dispatch(&request).unwrap();
        assert!(!result.invoked());
        assert_eq!(result.errors().fields().collect::<Vec<_>>(), vec!["confirmed"]);
    }

    #[test]
    fn test_ignore_validation_errors_still_invokes() {
        let dispatcher = dispatcher(ExceptionHandlerRegistry::new());
        let request =
            ActionRequest::from_pairs("/Transfer.action", [("amount", "abc"), ("preview", "")]);

        let result = dispatcher.dispatch(&request).unwrap();
        assert!(result.invoked());
        assert_eq!(result.event(), Some("preview"));
        assert!(result.errors().has_conversion_error("amount"));
        assert!(!result.errors().has_field_errors("account"));
        assert_eq!(result.outcome().url().unwrap(), "/preview.jsp");
    }

    #[test]
    fn test_dont_validate_binds_without_validation() {
        let dispatcher = dispatcher(ExceptionHandlerRegistry::new());
        let request = ActionRequest::new("/Transfer.action")
            .param("amount", "-3")
            .event("cancel");

        let result = dispatcher.dispatch(&request).unwrap();
        assert!(result.invoked());
        assert!(result.errors().is_empty());
        assert_eq!(result.bean::<Transfer>().unwrap().amount, Some(-3));
    }

    #[test]
    fn test_handler_error_goes_to_exception_chain() {
        let handlers = ExceptionHandlerRegistry::new()
            .on::<AccountLocked, _>("locked", |e, cx| {
                Some(Outcome::forward("/locked.jsp").with_parameter("account", [&e.0]).with_anchor(
                    cx.event.clone().unwrap_or_default(),
                ))
            });
        let dispatcher = dispatcher(handlers);
        let request = ActionRequest::from_pairs(
            "/Transfer.action",
            [("amount", "10"), ("account", "locked"), ("confirmed", "true")],
        );

        let result = dispatcher.dispatch(&request).unwrap();
        assert_eq!(result.states().last(), Some(&DispatchState::Failed));
        assert_eq!(result.outcome().url().unwrap(), "/locked.jsp?account=locked#submit");
        assert!(matches!(
            result.handled_error(),
            Some(DispatchError::HandlerInvocation { .. })
        ));
    }

    #[test]
    fn test_unhandled_errors_are_returned() {
        let dispatcher = dispatcher(ExceptionHandlerRegistry::new());

        let error = dispatcher
            .dispatch(&ActionRequest::new("/Nowhere.action"))
            .unwrap_err();
        assert!(error.is_not_found());
        assert!(matches!(error.root(), DispatchError::NoBindingForPath { .. }));

        let error = dispatcher
            .dispatch(&ActionRequest::new("/Transfer.action").param("_eventName", "refund"))
            .unwrap_err();
        assert!(matches!(
            error.root(),
            DispatchError::Resolver(ResolverError::HandlerNotFound { .. })
        ));

        let request = ActionRequest::from_pairs(
            "/Transfer.action",
            [("amount", "10"), ("account", "locked"), ("confirmed", "yes")],
        );
        let error = dispatcher.dispatch(&request).unwrap_err();
        assert!(matches!(error, DispatchError::Unhandled { .. }));
        assert!(!error.is_not_found());
    }

    #[test]
    fn test_settings_from_environment() {
        use tessera_core::config::{ConfigValue, MapPropertySource};

        let env = Environment::new().with_property_source(
            MapPropertySource::new("test")
                .with_property(WEB_EVENT_PARAMETER, ConfigValue::String("_event".into()))
                .with_property(WEB_DEFAULT_LOCALE, ConfigValue::String("de_DE".into()))
                .with_property(WEB_MAX_INDEX, ConfigValue::Int(50)),
        );
        let settings = DispatcherSettings::from_environment(&env);
        assert_eq!(settings.event_parameter, "_event");
        assert_eq!(settings.source_page_parameter, "_sourcePage");
        assert_eq!(settings.default_locale.language(), "de");
        assert_eq!(settings.max_index, 50);
        assert_eq!(DispatcherSettings::default().max_index, DEFAULT_MAX_INDEX);
    }
}
