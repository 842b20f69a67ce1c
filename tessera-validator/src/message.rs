//! 错误消息本地化
//!
//! 资源包的加载不属于本模块，这里只定义查找接口、内置的英文模板，
//! 以及 `{0}`、`{1}`... 占位符的替换规则。

use std::collections::HashMap;

use tessera_core::utils::naming;

use crate::locale::Locale;
use crate::spec::strip_indexes;

/// 本地化资源提供者
pub trait LocalizationProvider: Send + Sync {
    /// 查找指定区域下某个键的消息模板
    fn resource_for(&self, locale: &Locale, key: &str) -> Option<String>;
}

/// 内置的英文消息模板
const DEFAULT_MESSAGES: &[(&str, &str)] = &[
    ("validation.required.valueNotPresent", "{0} is a required field"),
    ("validation.minlength.valueTooShort", "{0} must be at least {2} characters long"),
    ("validation.maxlength.valueTooLong", "{0} must be no more than {2} characters long"),
    ("validation.minvalue.valueBelowMinimum", "The minimum allowed value for {0} is {2}"),
    ("validation.maxvalue.valueAboveMaximum", "The maximum allowed value for {0} is {2}"),
    ("validation.mask.valueDoesNotMatch", "{1} is not a valid {0}"),
    ("converter.number.invalidNumber", "The value ({1}) entered in field {0} must be a valid number"),
    ("converter.number.outOfRange", "The value ({1}) entered in field {0} was out of the range {2} to {3}"),
    ("converter.date.invalidDate", "The value ({1}) entered in field {0} must be a valid date"),
    ("converter.enum.notAnEnumeratedValue", "The value \"{2}\" is not a valid value for field {0}; valid values are: {3}"),
];

/// 基于内存映射的本地化提供者
///
/// 查找顺序：完整区域（`de_DE`）→ 语言（`de`）→ 默认包 → 内置英文模板
#[derive(Debug, Clone, Default)]
pub struct MapLocalizationProvider {
    bundles: HashMap<String, HashMap<String, String>>,
}

impl MapLocalizationProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为指定区域注册消息模板
    pub fn with_message(
        mut self,
        locale: &Locale,
        key: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        self.add_message(&locale.to_string(), key, template);
        self
    }

    /// 注册不区分区域的默认消息模板
    pub fn with_default_message(mut self, key: impl Into<String>, template: impl Into<String>) -> Self {
        self.add_message("", key, template);
        self
    }

    fn add_message(&mut self, bundle: &str, key: impl Into<String>, template: impl Into<String>) {
        self.bundles
            .entry(bundle.to_string())
            .or_default()
            .insert(key.into(), template.into());
    }

    fn lookup(&self, bundle: &str, key: &str) -> Option<String> {
        self.bundles.get(bundle).and_then(|b| b.get(key)).cloned()
    }
}

impl LocalizationProvider for MapLocalizationProvider {
    fn resource_for(&self, locale: &Locale, key: &str) -> Option<String> {
        self.lookup(&locale.to_string(), key)
            .or_else(|| self.lookup(locale.language(), key))
            .or_else(|| self.lookup("", key))
            .or_else(|| {
                DEFAULT_MESSAGES
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, template)| template.to_string())
            })
    }
}

/// 计算字段的显示名
///
/// 依次查找 `<action_path>.<field>`、`<field>`（均为去掉索引后的字段名），
/// 都没有时根据属性名生成，例如 `numberOne` -> `Number One`
pub fn field_display_name(
    locale: &Locale,
    provider: &dyn LocalizationProvider,
    action_path: Option<&str>,
    field: &str,
) -> String {
    let field = strip_indexes(field);
    action_path
        .and_then(|p| provider.resource_for(locale, &format!("{}.{}", p, field)))
        .or_else(|| provider.resource_for(locale, &field))
        .unwrap_or_else(|| naming::humanize(&field))
}

/// 替换模板中的 `{n}` 占位符；越界或无法解析的占位符保持原样
pub fn format_message(template: &str, parameters: &[String]) -> String {
    let mut result = String::with_capacity(template.len() + 16);
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        result.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let replaced = after.find('}').and_then(|end| {
            let index: usize = after[..end].trim().parse().ok()?;
            parameters.get(index).map(|p| (p, end))
        });

        match replaced {
            Some((parameter, end)) => {
                result.push_str(parameter);
                rest = &after[end + 1..];
            }
            None => {
                result.push('{');
                rest = after;
            }
        }
    }
    result.push_str(rest);

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_message() {
        let params = vec!["Age".to_string(), "abc".to_string(), "18".to_string()];
        assert_eq!(
            format_message("{0} ({1}) must be over {2}", &params),
            "Age (abc) must be over 18"
        );
        assert_eq!(format_message("{9} and {x}", &params), "{9} and {x}");
    }

    #[test]
    fn test_lookup_falls_back_to_language_and_builtins() {
        let provider = MapLocalizationProvider::new()
            .with_message(&Locale::parse("de"), "validation.required.valueNotPresent", "{0} ist ein Pflichtfeld");

        assert_eq!(
            provider
                .resource_for(&Locale::parse("de_AT"), "validation.required.valueNotPresent")
                .as_deref(),
            Some("{0} ist ein Pflichtfeld")
        );
        assert_eq!(
            provider
                .resource_for(&Locale::us(), "validation.required.valueNotPresent")
                .as_deref(),
            Some("{0} is a required field")
        );
        assert!(provider.resource_for(&Locale::us(), "no.such.key").is_none());
    }

    #[test]
    fn test_field_display_name() {
        let provider = MapLocalizationProvider::new().with_default_message("user.username", "Login");
        let locale = Locale::us();

        assert_eq!(field_display_name(&locale, &provider, None, "user.username"), "Login");
        assert_eq!(field_display_name(&locale, &provider, None, "numberTwo"), "Number Two");
        assert_eq!(field_display_name(&locale, &provider, None, "items[3].unitPrice"), "Unit Price");
    }
}
