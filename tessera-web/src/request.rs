//! 请求来源
//!
//! 与传输层无关的请求表示：路径、多值参数以及可选的事件指示

use std::collections::BTreeMap;
use tessera_validator::Locale;

/// 一次 action 请求
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionRequest {
    path: String,
    parameters: BTreeMap<String, Vec<String>>,
    event: Option<String>,
    locale: Option<Locale>,
}

impl ActionRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// 从 `(name, value)` 对构建，同名参数的值按出现顺序合并
    pub fn from_pairs<I, K, V>(path: impl Into<String>, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        pairs
            .into_iter()
            .fold(Self::new(path), |request, (k, v)| request.param(k, v))
    }

    /// 追加一个参数值
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    /// 追加多个参数值
    pub fn params<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.parameters
            .entry(name.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// 显式指定事件（优先于所有参数约定）
    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn locale(mut self, locale: Locale) -> Self {
        self.locale = Some(locale);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn parameters(&self) -> &BTreeMap<String, Vec<String>> {
        &self.parameters
    }

    /// 某个参数的第一个值
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    pub fn event_indicator(&self) -> Option<&str> {
        self.event.as_deref()
    }

    pub fn requested_locale(&self) -> Option<&Locale> {
        self.locale.as_ref()
    }

    /// 合并 URL 路径参数；已经显式提交的同名参数不被覆盖
    pub(crate) fn merged_parameters(
        &self,
        captured: &[(String, String)],
    ) -> BTreeMap<String, Vec<String>> {
        let mut parameters = self.parameters.clone();
        for (name, value) in captured {
            parameters
                .entry(name.clone())
                .or_insert_with(|| vec![value.clone()]);
        }
        parameters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_valued_parameters() {
        let request = ActionRequest::from_pairs("/x", [("a", "1"), ("b", "2"), ("a", "3")]);
        assert_eq!(request.parameters()["a"], vec!["1".to_string(), "3".to_string()]);
        assert_eq!(request.parameter("b"), Some("2"));
        assert_eq!(request.parameter("c"), None);
    }

    #[test]
    fn test_captured_parameters_do_not_override() {
        let request = ActionRequest::new("/bug/7").param("id", "9");
        let merged = request.merged_parameters(&[
            ("id".to_string(), "7".to_string()),
            ("kind".to_string(), "open".to_string()),
        ]);
        assert_eq!(merged["id"], vec!["9".to_string()]);
        assert_eq!(merged["kind"], vec!["open".to_string()]);
    }
}
