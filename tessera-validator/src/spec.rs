//! 字段校验规则
//!
//! [`FieldValidationSpec`] 在注册 action bean 时由静态声明构建，
//! 编译为 [`ValidationSpecSet`] 后只读，所有请求共享。

use regex::Regex;
use std::collections::HashMap;
use thiserror::Error;

/// 规则适用的事件范围
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EventScope {
    /// 所有事件
    #[default]
    All,
    /// 仅列出的事件
    Only(Vec<String>),
    /// 除列出的事件以外
    Except(Vec<String>),
}

impl EventScope {
    /// 由事件列表构建，`!name` 形式表示排除
    ///
    /// 列表为空时表示所有事件；不允许混用包含与排除
    pub fn from_events<I, S>(events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut only = Vec::new();
        let mut except = Vec::new();
        for event in events {
            let event = event.as_ref().trim();
            match event.strip_prefix('!') {
                Some(name) => except.push(name.to_string()),
                None if !event.is_empty() => only.push(event.to_string()),
                None => {}
            }
        }

        if !only.is_empty() {
            EventScope::Only(only)
        } else if !except.is_empty() {
            EventScope::Except(except)
        } else {
            EventScope::All
        }
    }

    pub fn applies_to(&self, event: &str) -> bool {
        match self {
            EventScope::All => true,
            EventScope::Only(events) => events.iter().any(|e| e == event),
            EventScope::Except(events) => !events.iter().any(|e| e == event),
        }
    }
}

/// 单个字段的校验声明
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldValidationSpec {
    field: String,
    required: bool,
    min_length: Option<usize>,
    max_length: Option<usize>,
    min_value: Option<f64>,
    max_value: Option<f64>,
    pattern: Option<String>,
    on: EventScope,
}

impl FieldValidationSpec {
    /// `field` 为去掉索引后的属性路径，例如 `user.username`、`items.name`
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ..Self::default()
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn min_length(mut self, min: usize) -> Self {
        self.min_length = Some(min);
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn min_value(mut self, min: f64) -> Self {
        self.min_value = Some(min);
        self
    }

    pub fn max_value(mut self, max: f64) -> Self {
        self.max_value = Some(max);
        self
    }

    /// 正则表达式，需要完整匹配原始值
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// 限定规则适用的事件
    pub fn on<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.on = EventScope::from_events(events);
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn scope(&self) -> &EventScope {
        &self.on
    }

    /// 把规则挂到父属性下，例如 `username` -> `user.username`
    fn prefixed(&self, prefix: &str) -> Self {
        Self {
            field: format!("{}.{}", prefix, self.field),
            ..self.clone()
        }
    }
}

/// 构建规则集合时的错误
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("Invalid pattern '{pattern}' for field '{field}': {source}")]
    InvalidPattern {
        field: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Field '{field}': min_length {min} is greater than max_length {max}")]
    InvalidLengthBounds { field: String, min: usize, max: usize },
}

/// 已编译的字段规则
#[derive(Debug, Clone)]
pub struct CompiledSpec {
    pub(crate) spec: FieldValidationSpec,
    pub(crate) pattern: Option<Regex>,
}

impl CompiledSpec {
    fn compile(spec: FieldValidationSpec) -> Result<Self, SpecError> {
        if let (Some(min), Some(max)) = (spec.min_length, spec.max_length) {
            if min > max {
                return Err(SpecError::InvalidLengthBounds {
                    field: spec.field.clone(),
                    min,
                    max,
                });
            }
        }

        // 完整匹配：锚定整个输入
        let pattern = spec
            .pattern
            .as_deref()
            .map(|p| {
                Regex::new(&format!("^(?:{})$", p)).map_err(|source| SpecError::InvalidPattern {
                    field: spec.field.clone(),
                    pattern: p.to_string(),
                    source,
                })
            })
            .transpose()?;

        Ok(Self { spec, pattern })
    }

    pub fn spec(&self) -> &FieldValidationSpec {
        &self.spec
    }

    pub(crate) fn min_length(&self) -> Option<usize> {
        self.spec.min_length
    }

    pub(crate) fn max_length(&self) -> Option<usize> {
        self.spec.max_length
    }

    pub(crate) fn min_value(&self) -> Option<f64> {
        self.spec.min_value
    }

    pub(crate) fn max_value(&self) -> Option<f64> {
        self.spec.max_value
    }

    pub(crate) fn has_value_bounds(&self) -> bool {
        self.spec.min_value.is_some() || self.spec.max_value.is_some()
    }
}

/// 一个 handler 类型的全部字段规则（保持声明顺序）
#[derive(Debug, Clone, Default)]
pub struct ValidationSpecSet {
    specs: Vec<CompiledSpec>,
    index: HashMap<String, usize>,
}

impl ValidationSpecSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从声明列表构建；同名字段后声明的规则覆盖先声明的
    pub fn build<I>(specs: I) -> Result<Self, SpecError>
    where
        I: IntoIterator<Item = FieldValidationSpec>,
    {
        let mut set = Self::new();
        for spec in specs {
            set.insert(CompiledSpec::compile(spec)?);
        }
        Ok(set)
    }

    fn insert(&mut self, compiled: CompiledSpec) {
        match self.index.get(compiled.spec.field()) {
            Some(&i) => self.specs[i] = compiled,
            None => {
                self.index
                    .insert(compiled.spec.field().to_string(), self.specs.len());
                self.specs.push(compiled);
            }
        }
    }

    /// 嵌套属性：把子对象的规则加上父路径前缀后并入
    ///
    /// 已经在父对象上显式声明的同名字段优先
    pub fn nest(&mut self, prefix: &str, nested: &ValidationSpecSet) {
        for compiled in &nested.specs {
            let spec = compiled.spec.prefixed(prefix);
            if self.index.contains_key(spec.field()) {
                continue;
            }
            self.insert(CompiledSpec {
                spec,
                pattern: compiled.pattern.clone(),
            });
        }
    }

    pub fn get(&self, field: &str) -> Option<&CompiledSpec> {
        self.index.get(field).map(|&i| &self.specs[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompiledSpec> {
        self.specs.iter()
    }

    /// 适用于指定事件的规则
    pub fn applicable<'a>(&'a self, event: &'a str) -> impl Iterator<Item = &'a CompiledSpec> + 'a {
        self.specs.iter().filter(move |c| c.spec.on.applies_to(event))
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// 去掉属性路径中的索引部分：`items[2].name` -> `items.name`
pub fn strip_indexes(path: &str) -> String {
    let mut result = String::with_capacity(path.len());
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for ch in path.chars() {
        match (depth, quote, ch) {
            (_, Some(q), c) if c == q => quote = None,
            (_, Some(_), _) => {}
            (d, None, '\'' | '"') if d > 0 => quote = Some(ch),
            (_, None, '[') => depth += 1,
            (d, None, ']') if d > 0 => depth -= 1,
            (0, None, c) => result.push(c),
            _ => {}
        }
    }

    result
}
