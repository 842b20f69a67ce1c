//! 处理结果
//!
//! 事件处理方法返回 [`Outcome`]，决定下一步导航：转发、重定向、流式响应或回显表单。
//! 执行（真正写出 HTTP 响应）由外部的执行器完成，参见 `server` 模块。

use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use tessera_validator::ValidationErrors;

use crate::resolver::ActionResolver;

/// 转发或重定向的目标
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Onward {
    path: String,
    parameters: Vec<(String, Vec<String>)>,
    anchor: Option<String>,
}

impl Onward {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn parameters(&self) -> &[(String, Vec<String>)] {
        &self.parameters
    }

    pub fn anchor(&self) -> Option<&str> {
        self.anchor.as_deref()
    }

    /// 带查询参数与锚点的完整 URL
    pub fn url(&self) -> String {
        let mut url = self.path.clone();
        let mut separator = if url.contains('?') { '&' } else { '?' };

        for (name, values) in &self.parameters {
            for value in values {
                url.push(separator);
                separator = '&';
                let _ = write!(url, "{}={}", encode_component(name), encode_component(value));
            }
        }

        if let Some(anchor) = &self.anchor {
            url.push('#');
            url.push_str(anchor);
        }
        url
    }
}

/// 流式响应
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOutcome {
    content_type: String,
    filename: Option<String>,
    body: Bytes,
}

impl StreamOutcome {
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// 设置后以附件形式下载
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

/// 校验失败时回显来源页面
///
/// 保留全部提交值（包括有效字段），用户不必重新输入
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Redisplay {
    source_page: Option<String>,
    errors: ValidationErrors,
    values: BTreeMap<String, Vec<String>>,
}

impl Redisplay {
    pub fn new(
        source_page: Option<String>,
        errors: ValidationErrors,
        values: BTreeMap<String, Vec<String>>,
    ) -> Self {
        Self {
            source_page,
            errors,
            values,
        }
    }

    pub fn source_page(&self) -> Option<&str> {
        self.source_page.as_deref()
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn values(&self) -> &BTreeMap<String, Vec<String>> {
        &self.values
    }
}

/// 事件处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Forward(Onward),
    Redirect(Onward),
    Stream(StreamOutcome),
    Redisplay(Redisplay),
}

impl Outcome {
    pub fn forward(path: impl Into<String>) -> Self {
        Outcome::Forward(Onward::new(path))
    }

    pub fn redirect(path: impl Into<String>) -> Self {
        Outcome::Redirect(Onward::new(path))
    }

    pub fn stream(content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Outcome::Stream(StreamOutcome {
            content_type: content_type.into(),
            filename: None,
            body: body.into(),
        })
    }

    /// 转发到另一个 action bean 的事件；类型未注册时返回 `None`
    pub fn forward_to<T: 'static>(resolver: &ActionResolver, event: Option<&str>) -> Option<Self> {
        let binding = resolver.url_binding_for::<T>()?;
        Some(Self::forward(binding).with_event(event))
    }

    /// 重定向到另一个 action bean 的事件；类型未注册时返回 `None`
    pub fn redirect_to<T: 'static>(resolver: &ActionResolver, event: Option<&str>) -> Option<Self> {
        let binding = resolver.url_binding_for::<T>()?;
        Some(Self::redirect(binding).with_event(event))
    }

    fn with_event(self, event: Option<&str>) -> Self {
        match event {
            Some(event) => self.with_parameter(event, Vec::<String>::new()),
            None => self,
        }
    }

    /// 追加参数（仅转发与重定向）；同名参数的值会合并
    pub fn with_parameter<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        if let Outcome::Forward(onward) | Outcome::Redirect(onward) = &mut self {
            let name = name.into();
            let mut values: Vec<String> = values.into_iter().map(|v| v.to_string()).collect();
            // 没有值的参数（例如事件名）也要出现在 URL 中
            if values.is_empty() {
                values.push(String::new());
            }
            match onward.parameters.iter_mut().find(|(n, _)| *n == name) {
                Some((_, existing)) => existing.extend(values),
                None => onward.parameters.push((name, values)),
            }
        }
        self
    }

    /// 设置锚点（仅转发与重定向）
    pub fn with_anchor(mut self, anchor: impl Into<String>) -> Self {
        if let Outcome::Forward(onward) | Outcome::Redirect(onward) = &mut self {
            onward.anchor = Some(anchor.into());
        }
        self
    }

    /// 设置下载文件名（仅流式响应）
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        if let Outcome::Stream(stream) = &mut self {
            stream.filename = Some(filename.into());
        }
        self
    }

    /// 目标 URL（转发与重定向）
    pub fn url(&self) -> Option<String> {
        match self {
            Outcome::Forward(onward) | Outcome::Redirect(onward) => Some(onward.url()),
            Outcome::Stream(_) | Outcome::Redisplay(_) => None,
        }
    }

    pub fn is_redisplay(&self) -> bool {
        matches!(self, Outcome::Redisplay(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Forward(_) => "forward",
            Outcome::Redirect(_) => "redirect",
            Outcome::Stream(_) => "stream",
            Outcome::Redisplay(_) => "redisplay",
        }
    }
}

/// RFC 3986 非保留字符以外的字节都要编码
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// URL 组件百分号编码
pub fn encode_component(input: &str) -> String {
    utf8_percent_encode(input, COMPONENT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_with_parameters() {
        let outcome = Outcome::redirect("/bugzooky/BugList.action")
            .with_parameter("bug.id", [42])
            .with_parameter("q", ["a b&c"])
            .with_parameter("bug.id", [43])
            .with_anchor("top");

        assert_eq!(
            outcome.url().unwrap(),
            "/bugzooky/BugList.action?bug.id=42&bug.id=43&q=a%20b%26c#top"
        );
    }

    #[test]
    fn test_url_appends_to_existing_query() {
        let outcome = Outcome::forward("/view?x=1").with_parameter("y", ["2"]);
        assert_eq!(outcome.url().unwrap(), "/view?x=1&y=2");
    }

    #[test]
    fn test_encoding_utf8() {
        assert_eq!(encode_component("é/ü"), "%C3%A9%2F%C3%BC");
    }

    #[test]
    fn test_stream_filename() {
        let outcome = Outcome::stream("text/csv", "a,b\n").with_filename("report.csv");
        match outcome {
            Outcome::Stream(stream) => {
                assert_eq!(stream.filename(), Some("report.csv"));
                assert_eq!(stream.body().as_ref(), b"a,b\n");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_parameters_ignored_for_stream() {
        let outcome = Outcome::stream("text/plain", "x").with_parameter("a", ["1"]);
        assert_eq!(outcome.url(), None);
        assert_eq!(outcome.kind(), "stream");
    }
}
