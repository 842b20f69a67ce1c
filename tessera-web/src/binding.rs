//! 参数绑定
//!
//! [`PropertyPathResolver`] 沿属性路径导航并赋值；[`BindingResult`] 记录一次请求的
//! 提交值、转换结果与错误，供校验引擎读取。

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tessera_validator::{FieldValues, ValidationError, ValidationErrors};
use thiserror::Error;

use crate::property::{BindContext, PathError, Property, PropertyError, PropertyPath};

/// 绑定错误：只影响出错的这一条路径，请求继续处理
#[derive(Debug, Error)]
pub enum BindingError {
    #[error("invalid property path '{path}': {source}")]
    InvalidPath {
        path: String,
        #[source]
        source: PathError,
    },

    #[error("cannot bind '{path}': {source}")]
    Property {
        path: String,
        #[source]
        source: PropertyError,
    },
}

impl BindingError {
    pub fn path(&self) -> &str {
        match self {
            BindingError::InvalidPath { path, .. } | BindingError::Property { path, .. } => path,
        }
    }
}

/// 属性路径解析器
pub struct PropertyPathResolver;

impl PropertyPathResolver {
    /// 读取路径上的当前值；任何一段缺失都返回 `None`
    pub fn resolve<'a>(root: &'a dyn Property, path: &PropertyPath) -> Option<&'a dyn Property> {
        path.segments()
            .iter()
            .try_fold(root, |current, segment| current.inspect(segment))
    }

    /// 沿路径导航（按需创建中间对象）并把提交值赋给末端属性
    ///
    /// 返回转换失败列表；导航失败时返回 [`BindingError`]
    pub fn bind(
        root: &mut dyn Property,
        path: &PropertyPath,
        values: &[String],
        cx: &BindContext<'_>,
    ) -> Result<Vec<crate::property::ConversionFailure>, BindingError> {
        let wrap = |source: PropertyError| BindingError::Property {
            path: path.to_string(),
            source,
        };

        let mut current = root;
        for segment in path.segments() {
            current = current.navigate(segment, cx).map_err(wrap)?;
        }

        current.assign(values, cx).map_err(wrap)
    }
}

/// 一次请求的绑定结果
///
/// 请求级状态：由一次分派独占，结束后丢弃
#[derive(Debug, Default)]
pub struct BindingResult {
    submitted: BTreeMap<String, Vec<String>>,
    bound: BTreeSet<String>,
    numbers: HashMap<String, Vec<f64>>,
    failed: HashSet<String>,
    errors: ValidationErrors,
    binding_errors: Vec<BindingError>,
}

impl BindingResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// 把参数逐个绑定到 bean
    ///
    /// 参数按名称排序处理；`skip` 返回 `true` 的参数（事件名、来源页等特殊参数）不参与绑定
    pub fn bind_parameters<'p, I, F>(
        bean: &mut dyn Property,
        parameters: I,
        skip: F,
        cx: &BindContext<'_>,
    ) -> Self
    where
        I: IntoIterator<Item = (&'p String, &'p Vec<String>)>,
        F: Fn(&str) -> bool,
    {
        let mut result = Self::new();

        for (name, values) in parameters {
            if skip(name) {
                continue;
            }

            let values: Vec<String> = values.iter().map(|v| v.trim().to_string()).collect();
            result.submitted.insert(name.clone(), values.clone());

            let path = match PropertyPath::parse(name) {
                Ok(path) => path,
                Err(source) => {
                    tracing::warn!(path = %name, error = %source, "Skipping unparsable parameter name");
                    result.binding_errors.push(BindingError::InvalidPath {
                        path: name.clone(),
                        source,
                    });
                    continue;
                }
            };

            match PropertyPathResolver::bind(bean, &path, &values, cx) {
                Ok(failures) if failures.is_empty() => {
                    tracing::debug!(path = %name, "Bound parameter");
                    let numbers = PropertyPathResolver::resolve(bean, &path)
                        .map(Property::as_numbers)
                        .unwrap_or_default();
                    if !numbers.is_empty() {
                        result.numbers.insert(name.clone(), numbers);
                    }
                    result.bound.insert(name.clone());
                }
                Ok(failures) => {
                    tracing::debug!(path = %name, failures = failures.len(), "Parameter failed conversion");
                    result.failed.insert(name.clone());
                    for failure in failures {
                        result.errors.add(
                            name.clone(),
                            failure.error.with_field(name.clone(), Some(failure.value.as_str())),
                        );
                    }
                }
                Err(error) => {
                    tracing::warn!(error = %error, "Could not bind parameter");
                    result.binding_errors.push(error);
                }
            }
        }

        result
    }

    /// 提交的原始值（已去除首尾空白）
    pub fn submitted_values(&self) -> &BTreeMap<String, Vec<String>> {
        &self.submitted
    }

    /// 成功绑定的路径
    pub fn bound_paths(&self) -> impl Iterator<Item = &str> {
        self.bound.iter().map(String::as_str)
    }

    pub fn is_bound(&self, path: &str) -> bool {
        self.bound.contains(path)
    }

    /// 类型转换错误
    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn binding_errors(&self) -> &[BindingError] {
        &self.binding_errors
    }

    pub fn add_error(&mut self, field: impl Into<String>, error: ValidationError) {
        self.errors.add(field, error);
    }

    pub(crate) fn into_parts(self) -> (ValidationErrors, Vec<BindingError>) {
        (self.errors, self.binding_errors)
    }
}

impl FieldValues for BindingResult {
    fn submitted_names(&self) -> Vec<&str> {
        self.submitted.keys().map(String::as_str).collect()
    }

    fn submitted(&self, name: &str) -> Option<&[String]> {
        self.submitted.get(name).map(Vec::as_slice)
    }

    fn converted_numbers(&self, name: &str) -> &[f64] {
        self.numbers.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    fn conversion_failed(&self, name: &str) -> bool {
        self.failed.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::Segment;
    use tessera_validator::{Locale, TypeConverterRegistry};

    fn bind(root: &mut dyn Property, path: &str, value: &str) -> Result<usize, BindingError> {
        let registry = TypeConverterRegistry::new();
        let locale = Locale::us();
        let cx = BindContext::new(&registry, &locale);
        let path = PropertyPath::parse(path).unwrap();
        PropertyPathResolver::bind(root, &path, &[value.to_string()], &cx).map(|f| f.len())
    }

    #[test]
    fn test_sparse_index_grows_sequence() {
        let mut scores: Vec<Option<i32>> = Vec::new();
        assert_eq!(bind(&mut scores, "[4]", "17").unwrap(), 0);
        assert_eq!(scores.len(), 5);
        assert!(scores[..4].iter().all(Option::is_none));
        assert_eq!(scores[4], Some(17));
    }

    #[test]
    fn test_nested_collections() {
        let mut grid: Vec<Vec<u8>> = Vec::new();
        bind(&mut grid, "[1][2]", "9").unwrap();
        assert_eq!(grid, vec![vec![], vec![0, 0, 9]]);

        let mut tags: HashMap<String, Vec<String>> = HashMap::new();
        bind(&mut tags, "['rust'][0]", "fast").unwrap();
        assert_eq!(tags["rust"], vec!["fast".to_string()]);
    }

    #[test]
    fn test_resolve_does_not_create() {
        let mut values: Vec<Option<i32>> = Vec::new();
        let path = PropertyPath::parse("[3]").unwrap();
        assert!(PropertyPathResolver::resolve(&values, &path).is_none());
        assert!(values.is_empty());

        bind(&mut values, "[3]", "1").unwrap();
        let resolved = PropertyPathResolver::resolve(&values, &path).unwrap();
        assert_eq!(resolved.as_number(), Some(1.0));
    }

    #[test]
    fn test_conversion_failure_is_not_a_binding_error() {
        let mut amounts: Vec<f64> = Vec::new();
        assert_eq!(bind(&mut amounts, "[0]", "abc").unwrap(), 1);
    }

    #[test]
    fn test_navigation_error_names_path() {
        let mut amounts: Vec<f64> = Vec::new();
        let error = bind(&mut amounts, "[0].value", "1").unwrap_err();
        assert_eq!(error.path(), "[0].value");
        assert!(matches!(
            error,
            BindingError::Property { source: PropertyError::NotNavigable { .. }, .. }
        ));
    }

    #[test]
    fn test_bind_parameters_records_state() {
        let registry = TypeConverterRegistry::new();
        let locale = Locale::us();
        let cx = BindContext::new(&registry, &locale);

        let mut numbers: HashMap<String, f64> = HashMap::new();
        let mut parameters = BTreeMap::new();
        parameters.insert("a".to_string(), vec![" 1.5 ".to_string()]);
        parameters.insert("b".to_string(), vec!["x".to_string()]);
        parameters.insert("_eventName".to_string(), vec!["go".to_string()]);
        parameters.insert("c[".to_string(), vec!["1".to_string()]);

        let result = BindingResult::bind_parameters(
            &mut numbers,
            &parameters,
            |name| name.starts_with('_'),
            &cx,
        );

        assert!(result.is_bound("a"));
        assert_eq!(result.converted_numbers("a"), &[1.5]);
        assert_eq!(result.submitted("a").unwrap(), &["1.5".to_string()]);
        assert!(result.conversion_failed("b"));
        assert!(result.errors().has_conversion_error("b"));
        assert_eq!(result.errors().get("b").unwrap()[0].field_value(), Some("x"));
        assert!(result.submitted("_eventName").is_none());
        assert_eq!(result.binding_errors().len(), 1);
        assert!(numbers.contains_key("a"));
        assert!(numbers.inspect(&Segment::Index("a".into())).is_some());
    }

    #[test]
    fn test_bind_parameters_records_every_sequence_number() {
        let registry = TypeConverterRegistry::new();
        let locale = Locale::us();
        let cx = BindContext::new(&registry, &locale);

        let mut quantities: HashMap<String, Vec<i64>> = HashMap::new();
        let mut parameters = BTreeMap::new();
        parameters.insert("qty".to_string(), vec!["0".to_string(), "99".to_string()]);

        let result = BindingResult::bind_parameters(&mut quantities, &parameters, |_| false, &cx);

        assert!(result.is_bound("qty"));
        assert_eq!(result.converted_numbers("qty"), &[0.0, 99.0]);
        assert!(result.converted_numbers("missing").is_empty());
    }
}
