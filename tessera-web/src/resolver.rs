//! URL 绑定与事件解析
//!
//! [`ActionResolver`] 在启动时由全部 action bean 定义构建，构建时拒绝有歧义的配置
//! （重复或重叠的 URL 绑定、重复事件、多个默认事件），之后只读并在请求间共享。
//!
//! 匹配规则：请求路径按 `/` 分段，绑定的模式必须是路径的前缀；`{name}` 段匹配任意一个
//! 非空路径段并把值作为请求参数。多个绑定同时匹配时，段数多者优先，其次字面段多者优先。

use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tessera_validator::{SpecError, ValidationEngine};
use thiserror::Error;

use crate::action::{get_all_action_beans, ActionBeanDefinition, HandlerMethod};

/// 解析与注册错误
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("URL binding '{conflicting}' of {conflicting_type} overlaps '{existing}' of {existing_type}")]
    DuplicateBinding {
        existing: String,
        existing_type: &'static str,
        conflicting: String,
        conflicting_type: &'static str,
    },

    #[error("No handler for event '{event}' in {handler_type}")]
    HandlerNotFound {
        handler_type: &'static str,
        event: String,
    },

    #[error("No default handler in {handler_type}")]
    DefaultHandlerNotFound { handler_type: &'static str },

    #[error("Event '{event}' is declared more than once in {handler_type}")]
    DuplicateEvent {
        handler_type: &'static str,
        event: String,
    },

    #[error("{handler_type} declares more than one default handler: {events:?}")]
    MultipleDefaultHandlers {
        handler_type: &'static str,
        events: Vec<String>,
    },

    #[error("{type_name} is not registered as an action bean")]
    UnknownBeanType { type_name: String },

    #[error("{type_name} is registered more than once")]
    DuplicateBeanType { type_name: &'static str },

    #[error("Invalid URL binding '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid validation declaration on {type_name}: {source}")]
    InvalidValidation {
        type_name: &'static str,
        #[source]
        source: SpecError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternSegment {
    Literal(String),
    Parameter(String),
}

impl PatternSegment {
    fn matches(&self, segment: &str) -> bool {
        match self {
            PatternSegment::Literal(literal) => literal == segment,
            PatternSegment::Parameter(_) => !segment.is_empty(),
        }
    }

    /// 两个段能否匹配同一个路径段
    fn overlaps(&self, other: &PatternSegment) -> bool {
        match (self, other) {
            (PatternSegment::Literal(a), PatternSegment::Literal(b)) => a == b,
            _ => true,
        }
    }
}

/// URL 绑定：路径模式与目标 handler 类型
#[derive(Debug, Clone)]
pub struct UrlBinding {
    pattern: String,
    segments: Vec<PatternSegment>,
    handler_type: TypeId,
    handler_name: &'static str,
}

impl UrlBinding {
    pub fn parse(
        pattern: &str,
        handler_type: TypeId,
        handler_name: &'static str,
    ) -> Result<Self, ResolverError> {
        let invalid = |reason: &str| ResolverError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        if !pattern.starts_with('/') {
            return Err(invalid("must start with '/'"));
        }

        let mut segments = Vec::new();
        for raw in split_path(pattern) {
            let segment = match raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) if name.is_empty() || name.contains(['{', '}']) => {
                    return Err(invalid("empty or nested parameter name"))
                }
                Some(name) => PatternSegment::Parameter(name.to_string()),
                None if raw.contains(['{', '}']) => {
                    return Err(invalid("parameters must span a whole path segment"))
                }
                None => PatternSegment::Literal(raw.to_string()),
            };
            segments.push(segment);
        }

        if segments.is_empty() {
            return Err(invalid("must contain at least one path segment"));
        }

        Ok(Self {
            pattern: pattern.to_string(),
            segments,
            handler_type,
            handler_name,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn handler_type(&self) -> TypeId {
        self.handler_type
    }

    pub fn handler_name(&self) -> &'static str {
        self.handler_name
    }

    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            PatternSegment::Parameter(name) => Some(name.as_str()),
            PatternSegment::Literal(_) => None,
        })
    }

    fn literal_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, PatternSegment::Literal(_)))
            .count()
    }

    /// 匹配优先级：段数，其次字面段数
    fn specificity(&self) -> (usize, usize) {
        (self.segments.len(), self.literal_count())
    }

    /// 两个绑定是否会以相同优先级匹配同一个请求路径
    fn ambiguous_with(&self, other: &UrlBinding) -> bool {
        self.specificity() == other.specificity()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|(a, b)| a.overlaps(b))
    }

    fn match_path<'a>(&'a self, path: &[&str]) -> Option<BindingMatch<'a>> {
        if path.len() < self.segments.len() {
            return None;
        }

        let mut captured = Vec::new();
        for (pattern, segment) in self.segments.iter().zip(path) {
            if !pattern.matches(segment) {
                return None;
            }
            if let PatternSegment::Parameter(name) = pattern {
                captured.push((name.clone(), (*segment).to_string()));
            }
        }

        let rest = &path[self.segments.len()..];
        let path_info = (!rest.is_empty()).then(|| format!("/{}", rest.join("/")));

        Some(BindingMatch {
            binding: self,
            captured,
            path_info,
        })
    }
}

impl fmt::Display for UrlBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.pattern, self.handler_name)
    }
}

/// 一次路径匹配的结果
#[derive(Debug, Clone)]
pub struct BindingMatch<'a> {
    binding: &'a UrlBinding,
    captured: Vec<(String, String)>,
    path_info: Option<String>,
}

impl<'a> BindingMatch<'a> {
    pub fn binding(&self) -> &'a UrlBinding {
        self.binding
    }

    /// `{name}` 段捕获的值
    pub fn captured(&self) -> &[(String, String)] {
        &self.captured
    }

    /// 绑定之后剩余的路径，例如 `/Calculator.action/Division` 中的 `/Division`
    pub fn path_info(&self) -> Option<&str> {
        self.path_info.as_deref()
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    path.split('/').filter(|s| !s.is_empty())
}

/// 图片按钮提交 `name.x` / `name.y`，事件名是去掉后缀的部分
pub(crate) fn event_name_of(parameter: &str) -> &str {
    parameter
        .strip_suffix(".x")
        .or_else(|| parameter.strip_suffix(".y"))
        .unwrap_or(parameter)
}

/// Action 解析器
pub struct ActionResolver {
    bindings: Vec<UrlBinding>,
    definitions: HashMap<TypeId, ActionBeanDefinition>,
    validation: ValidationEngine,
}

impl ActionResolver {
    pub fn builder() -> ActionResolverBuilder {
        ActionResolverBuilder::default()
    }

    /// 最具体的匹配绑定；没有绑定匹配时返回 `None`
    pub fn binding_for_path(&self, path: &str) -> Option<BindingMatch<'_>> {
        let segments: Vec<&str> = split_path(path).collect();
        self.bindings
            .iter()
            .filter_map(|binding| binding.match_path(&segments))
            .max_by_key(|m| m.binding.specificity())
    }

    /// 匹配到的绑定模式文本
    pub fn binding_from_path(&self, path: &str) -> Option<&str> {
        self.binding_for_path(path).map(|m| m.binding.pattern.as_str())
    }

    /// 反向查找：某个 action bean 类型的 URL 绑定
    pub fn url_binding_for<T: 'static>(&self) -> Option<&str> {
        self.definitions
            .get(&TypeId::of::<T>())
            .map(ActionBeanDefinition::url_binding)
    }

    pub fn definition(&self, handler_type: TypeId) -> Option<&ActionBeanDefinition> {
        self.definitions.get(&handler_type)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &ActionBeanDefinition> {
        self.definitions.values()
    }

    pub fn bindings(&self) -> &[UrlBinding] {
        &self.bindings
    }

    /// 启动时编译的字段校验规则
    pub fn validation_engine(&self) -> &ValidationEngine {
        &self.validation
    }

    pub fn handler_for(
        &self,
        handler_type: TypeId,
        event: &str,
    ) -> Result<&HandlerMethod, ResolverError> {
        let definition = self.require(handler_type)?;
        definition
            .handler(event)
            .ok_or_else(|| ResolverError::HandlerNotFound {
                handler_type: definition.type_name(),
                event: event.to_string(),
            })
    }

    pub fn default_handler_for(&self, handler_type: TypeId) -> Result<&HandlerMethod, ResolverError> {
        let definition = self.require(handler_type)?;
        definition
            .default_handler()
            .ok_or(ResolverError::DefaultHandlerNotFound {
                handler_type: definition.type_name(),
            })
    }

    fn require(&self, handler_type: TypeId) -> Result<&ActionBeanDefinition, ResolverError> {
        self.definitions
            .get(&handler_type)
            .ok_or_else(|| ResolverError::UnknownBeanType {
                type_name: format!("{:?}", handler_type),
            })
    }

    /// 确定本次请求的事件
    ///
    /// 依次检查：显式事件 → 事件参数（`_eventName`）→ 与事件同名的参数 →
    /// 绑定之后的路径 → 默认事件。前两种方式指定了未知事件时返回错误；
    /// 路径中不是事件名的部分被忽略。
    pub fn resolve_event<'d>(
        definition: &'d ActionBeanDefinition,
        explicit: Option<&str>,
        parameters: &BTreeMap<String, Vec<String>>,
        path_info: Option<&str>,
        event_parameter: &str,
    ) -> Result<&'d HandlerMethod, ResolverError> {
        let named = |event: &str| {
            definition
                .handler(event)
                .ok_or_else(|| ResolverError::HandlerNotFound {
                    handler_type: definition.type_name(),
                    event: event.to_string(),
                })
        };

        if let Some(event) = explicit {
            return named(event);
        }

        let special = parameters
            .get(event_parameter)
            .and_then(|values| values.iter().map(|v| v.trim()).find(|v| !v.is_empty()));
        if let Some(event) = special {
            return named(event);
        }

        if let Some(handler) = parameters
            .keys()
            .find_map(|name| definition.handler(event_name_of(name)))
        {
            return Ok(handler);
        }

        if let Some(handler) = path_info
            .and_then(|info| split_path(info).next())
            .and_then(|event| definition.handler(event))
        {
            return Ok(handler);
        }

        definition
            .default_handler()
            .ok_or(ResolverError::DefaultHandlerNotFound {
                handler_type: definition.type_name(),
            })
    }
}

impl fmt::Debug for ActionResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionResolver")
            .field("bindings", &self.bindings)
            .finish()
    }
}

/// Action 解析器构建器
#[derive(Default)]
pub struct ActionResolverBuilder {
    definitions: Vec<ActionBeanDefinition>,
}

impl ActionResolverBuilder {
    pub fn register(mut self, definition: ActionBeanDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    /// 注册所有通过 `inventory::submit!` 收集的 action bean
    pub fn register_inventory(mut self) -> Self {
        tracing::info!("🔍 Discovering action beans from inventory...");

        for registration in get_all_action_beans() {
            let definition = (registration.create)();
            tracing::info!(
                "✅ Auto-registered action bean: {} -> {}",
                registration.name,
                definition.url_binding()
            );
            self.definitions.push(definition);
        }
        self
    }

    pub fn build(self) -> Result<ActionResolver, ResolverError> {
        let mut bindings: Vec<UrlBinding> = Vec::with_capacity(self.definitions.len());
        let mut definitions = HashMap::with_capacity(self.definitions.len());
        let mut validation = ValidationEngine::new();

        for definition in self.definitions {
            let type_id = definition.type_id();
            let type_name = definition.type_name();

            if definitions.contains_key(&type_id) {
                return Err(ResolverError::DuplicateBeanType { type_name });
            }

            check_handlers(&definition)?;

            let binding = UrlBinding::parse(definition.url_binding(), type_id, type_name)?;
            if let Some(existing) = bindings.iter().find(|b| b.ambiguous_with(&binding)) {
                return Err(ResolverError::DuplicateBinding {
                    existing: existing.pattern.clone(),
                    existing_type: existing.handler_name,
                    conflicting: binding.pattern,
                    conflicting_type: type_name,
                });
            }

            let specs = definition
                .validation_specs()
                .map_err(|source| ResolverError::InvalidValidation { type_name, source })?;
            validation.register(type_id, specs);

            tracing::debug!(binding = %binding, events = definition.handlers().len(), "Registered URL binding");
            bindings.push(binding);
            definitions.insert(type_id, definition);
        }

        tracing::info!(
            "✅ Action resolver built: {} URL bindings registered",
            bindings.len()
        );

        Ok(ActionResolver {
            bindings,
            definitions,
            validation,
        })
    }
}

fn check_handlers(definition: &ActionBeanDefinition) -> Result<(), ResolverError> {
    let handler_type = definition.type_name();
    let handlers = definition.handlers();

    for (i, handler) in handlers.iter().enumerate() {
        if handlers[..i]
            .iter()
            .any(|h| h.event_name() == handler.event_name())
        {
            return Err(ResolverError::DuplicateEvent {
                handler_type,
                event: handler.event_name().to_string(),
            });
        }
    }

    let defaults: Vec<String> = handlers
        .iter()
        .filter(|h| h.is_default())
        .map(|h| h.event_name().to_string())
        .collect();
    if defaults.len() > 1 {
        return Err(ResolverError::MultipleDefaultHandlers {
            handler_type,
            events: defaults,
        });
    }

    Ok(())
}
