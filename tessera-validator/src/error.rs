use serde::Serialize;
use std::collections::BTreeMap;

use crate::locale::Locale;
use crate::message::{self, LocalizationProvider};

/// 非字段（页面级）错误使用的保留键
pub const GLOBAL_ERROR_KEY: &str = "__page";

/// 错误消息来源
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ErrorMessage {
    /// 直接给出的消息模板
    Simple(String),
    /// 通过本地化资源查找的消息键
    Localizable(String),
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 类型转换失败
    Conversion,
    /// 声明式规则（required / length / range / pattern）不满足
    Constraint,
    /// 自定义校验方法添加的错误
    Custom,
}

/// 单个校验错误
///
/// 由转换器、校验引擎或自定义校验方法创建，放入 [`ValidationErrors`] 之后不再修改。
/// 消息模板中 `{0}` 为字段显示名，`{1}` 为提交的原始值，其余参数从 `{2}` 开始。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    field_name: Option<String>,
    message: ErrorMessage,
    parameters: Vec<String>,
    field_value: Option<String>,
    kind: ErrorKind,
}

impl ValidationError {
    /// 使用字面消息创建错误（自定义校验方法最常用）
    pub fn simple(template: impl Into<String>) -> Self {
        Self::with_kind(ErrorMessage::Simple(template.into()), ErrorKind::Custom)
    }

    /// 使用本地化消息键创建错误
    pub fn localizable(key: impl Into<String>) -> Self {
        Self::with_kind(ErrorMessage::Localizable(key.into()), ErrorKind::Custom)
    }

    /// 类型转换错误
    pub fn conversion(key: impl Into<String>) -> Self {
        Self::with_kind(ErrorMessage::Localizable(key.into()), ErrorKind::Conversion)
    }

    /// 声明式规则错误
    pub fn constraint(key: impl Into<String>) -> Self {
        Self::with_kind(ErrorMessage::Localizable(key.into()), ErrorKind::Constraint)
    }

    fn with_kind(message: ErrorMessage, kind: ErrorKind) -> Self {
        Self {
            field_name: None,
            message,
            parameters: Vec::new(),
            field_value: None,
            kind,
        }
    }

    /// 追加替换参数（依次对应 `{2}`、`{3}`...）
    pub fn with_parameter(mut self, parameter: impl ToString) -> Self {
        self.parameters.push(parameter.to_string());
        self
    }

    /// 设置字段名与原始值
    pub fn with_field(mut self, field_name: impl Into<String>, value: Option<&str>) -> Self {
        self.field_name = Some(field_name.into());
        if let Some(value) = value {
            self.field_value = Some(value.to_string());
        }
        self
    }

    pub fn field_name(&self) -> Option<&str> {
        self.field_name.as_deref()
    }

    pub fn field_value(&self) -> Option<&str> {
        self.field_value.as_deref()
    }

    pub fn message_source(&self) -> &ErrorMessage {
        &self.message
    }

    /// 消息键（仅本地化错误）
    pub fn key(&self) -> Option<&str> {
        match &self.message {
            ErrorMessage::Localizable(key) => Some(key),
            ErrorMessage::Simple(_) => None,
        }
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 渲染最终消息
    ///
    /// `action_path` 为当前 action 的 URL 绑定，本地化键会先以 `<action_path>.<key>` 查找
    pub fn render(
        &self,
        locale: &Locale,
        provider: &dyn LocalizationProvider,
        action_path: Option<&str>,
    ) -> String {
        let template = match &self.message {
            ErrorMessage::Simple(template) => template.clone(),
            ErrorMessage::Localizable(key) => {
                let scoped = action_path.and_then(|p| provider.resource_for(locale, &format!("{}.{}", p, key)));
                match scoped.or_else(|| provider.resource_for(locale, key)) {
                    Some(template) => template,
                    None => {
                        tracing::warn!(key = %key, locale = %locale, "No message template found for error key");
                        key.clone()
                    }
                }
            }
        };

        let display_name = self
            .field_name
            .as_deref()
            .map(|field| message::field_display_name(locale, provider, action_path, field))
            .unwrap_or_default();

        let mut replacements = Vec::with_capacity(self.parameters.len() + 2);
        replacements.push(display_name);
        replacements.push(self.field_value.clone().unwrap_or_default());
        replacements.extend(self.parameters.iter().cloned());

        message::format_message(&template, &replacements)
    }
}

/// 按字段名排序的错误集合
///
/// 请求级状态：由一次分派独占，结束后随请求丢弃
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    errors: BTreeMap<String, Vec<ValidationError>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为字段添加错误；错误本身未设置字段名时使用 `field`
    pub fn add(&mut self, field: impl Into<String>, error: ValidationError) {
        let field = field.into();
        let error = if error.field_name.is_none() {
            let value = error.field_value.clone();
            error.with_field(field.clone(), value.as_deref())
        } else {
            error
        };
        self.errors.entry(field).or_default().push(error);
    }

    /// 添加页面级错误
    pub fn add_global(&mut self, error: ValidationError) {
        self.errors
            .entry(GLOBAL_ERROR_KEY.to_string())
            .or_default()
            .push(error);
    }

    pub fn get(&self, field: &str) -> Option<&[ValidationError]> {
        self.errors.get(field).map(Vec::as_slice)
    }

    pub fn has_field_errors(&self, field: &str) -> bool {
        self.errors.get(field).is_some_and(|e| !e.is_empty())
    }

    /// 是否存在类型转换错误
    pub fn has_conversion_error(&self, field: &str) -> bool {
        self.errors
            .get(field)
            .is_some_and(|e| e.iter().any(|err| err.kind == ErrorKind::Conversion))
    }

    pub fn is_empty(&self) -> bool {
        self.errors.values().all(Vec::is_empty)
    }

    /// 错误总数
    pub fn len(&self) -> usize {
        self.errors.values().map(Vec::len).sum()
    }

    /// 有错误的字段名（有序）
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.errors.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ValidationError])> {
        self.errors.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// 合并另一组错误，保持各字段内的先后顺序
    pub fn merge(&mut self, other: ValidationErrors) {
        for (field, errors) in other.errors {
            self.errors.entry(field).or_default().extend(errors);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MapLocalizationProvider;

    #[test]
    fn test_errors_are_ordered_by_field() {
        let mut errors = ValidationErrors::new();
        errors.add("zeta", ValidationError::simple("z"));
        errors.add("alpha", ValidationError::simple("a"));
        errors.add("alpha", ValidationError::simple("b"));

        let fields: Vec<_> = errors.fields().collect();
        assert_eq!(fields, vec!["alpha", "zeta"]);
        assert_eq!(errors.len(), 3);
        assert_eq!(errors.get("alpha").unwrap()[0].field_name(), Some("alpha"));
    }

    #[test]
    fn test_render_replaces_display_name_and_value() {
        let provider = MapLocalizationProvider::new();
        let error = ValidationError::constraint("validation.minlength.valueTooShort")
            .with_parameter(5)
            .with_field("user.username", Some("ab"));

        let message = error.render(&Locale::us(), &provider, None);
        assert_eq!(message, "Username must be at least 5 characters long");
    }

    #[test]
    fn test_render_prefers_action_scoped_template() {
        let provider = MapLocalizationProvider::new().with_message(
            &Locale::us(),
            "/bugzooky/Register.action.passwordsDontMatch",
            "The passwords entered did not match",
        );
        let error = ValidationError::localizable("passwordsDontMatch");

        let message = error.render(&Locale::us(), &provider, Some("/bugzooky/Register.action"));
        assert_eq!(message, "The passwords entered did not match");
    }

    #[test]
    fn test_conversion_errors_are_detected() {
        let mut errors = ValidationErrors::new();
        errors.add("age", ValidationError::conversion("converter.number.invalidNumber"));
        errors.add("name", ValidationError::simple("bad"));

        assert!(errors.has_conversion_error("age"));
        assert!(!errors.has_conversion_error("name"));
    }
}
