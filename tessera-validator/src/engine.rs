//! 校验引擎
//!
//! 字段规则按声明顺序执行，每个字段依次检查：必填 → 长度 → 数值范围 → 正则。
//! 必填失败时跳过该字段的其它检查；转换失败时跳过范围与正则检查。
//! 字段检查结束后按注册顺序执行自定义校验方法。

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::error::ValidationErrors;
use crate::rules::ValidationRules;
use crate::spec::{strip_indexes, CompiledSpec, EventScope, ValidationSpecSet};

/// 校验引擎读取提交值与绑定结果的接口
///
/// 由绑定结果实现，引擎本身不接触 bean
pub trait FieldValues {
    /// 所有提交的参数名（可能带索引）
    fn submitted_names(&self) -> Vec<&str>;

    /// 某个参数提交的原始值
    fn submitted(&self, name: &str) -> Option<&[String]>;

    /// 转换后的数值（仅数值类型的属性），序列属性按非空提交值的顺序逐个给出
    fn converted_numbers(&self, name: &str) -> &[f64];

    /// 该参数是否因类型转换失败而没有得到值
    fn conversion_failed(&self, name: &str) -> bool;
}

/// 必填检查的范围
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RequiredScope {
    /// 所有声明的字段
    #[default]
    All,
    /// 仅字段清单中列出的字段（向导流程）
    Manifest(HashSet<String>),
}

impl RequiredScope {
    /// 由页面字段清单构建，名称会去掉索引
    pub fn manifest<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        RequiredScope::Manifest(
            fields
                .into_iter()
                .map(|f| strip_indexes(f.as_ref()))
                .collect(),
        )
    }

    /// 未提交的字段是否需要报告必填错误
    pub fn requires(&self, field: &str) -> bool {
        match self {
            RequiredScope::All => true,
            RequiredScope::Manifest(fields) => fields.contains(field),
        }
    }
}

/// 自定义校验方法的执行条件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationState {
    /// 总是执行
    #[default]
    Always,
    /// 只有此前没有任何错误时才执行
    NoErrors,
}

type CheckFn<B> = dyn Fn(&B, &mut ValidationErrors) + Send + Sync;

/// 自定义校验方法
///
/// 接收绑定完成的 bean 与可变的错误集合，可以为任意字段添加错误。
/// 已有字段错误的字段不会被排除，校验方法应自行假设输入可能不完整。
pub struct CustomValidator<B: ?Sized> {
    name: String,
    scope: EventScope,
    when: ValidationState,
    check: Box<CheckFn<B>>,
}

impl<B: ?Sized> CustomValidator<B> {
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&B, &mut ValidationErrors) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            scope: EventScope::All,
            when: ValidationState::Always,
            check: Box::new(check),
        }
    }

    /// 限定适用的事件，`!name` 表示排除
    pub fn on<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.scope = EventScope::from_events(events);
        self
    }

    pub fn when(mut self, state: ValidationState) -> Self {
        self.when = state;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> &EventScope {
        &self.scope
    }

    pub fn state(&self) -> ValidationState {
        self.when
    }

    pub fn run(&self, bean: &B, errors: &mut ValidationErrors) {
        (self.check)(bean, errors)
    }
}

impl<B: ?Sized> fmt::Debug for CustomValidator<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomValidator")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("when", &self.when)
            .finish()
    }
}

/// 校验引擎
///
/// 规则集合在启动时按 handler 类型注册，之后只读，可在请求间共享
#[derive(Debug, Clone, Default)]
pub struct ValidationEngine {
    specs: HashMap<TypeId, Arc<ValidationSpecSet>>,
}

impl ValidationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册某个 handler 类型的规则集合
    pub fn register(&mut self, handler_type: TypeId, specs: ValidationSpecSet) {
        tracing::debug!(
            handler_type = ?handler_type,
            count = specs.len(),
            "Registered validation specs"
        );
        self.specs.insert(handler_type, Arc::new(specs));
    }

    pub fn specs_for(&self, handler_type: TypeId) -> Option<&ValidationSpecSet> {
        self.specs.get(&handler_type).map(Arc::as_ref)
    }

    /// 对某个 handler 类型执行字段校验；类型未注册规则时返回空集合
    pub fn validate(
        &self,
        handler_type: TypeId,
        values: &dyn FieldValues,
        event: &str,
        scope: &RequiredScope,
    ) -> ValidationErrors {
        match self.specs.get(&handler_type) {
            Some(specs) => Self::validate_specs(specs, values, event, scope),
            None => ValidationErrors::new(),
        }
    }

    /// 按给定规则集合执行字段校验
    pub fn validate_specs(
        specs: &ValidationSpecSet,
        values: &dyn FieldValues,
        event: &str,
        scope: &RequiredScope,
    ) -> ValidationErrors {
        let mut names = values.submitted_names();
        names.sort_unstable();

        let mut errors = ValidationErrors::new();
        for compiled in specs.applicable(event) {
            Self::validate_field(compiled, &names, values, scope, &mut errors);
        }

        tracing::debug!(event = %event, errors = errors.len(), "Field validation finished");
        errors
    }

    fn validate_field(
        compiled: &CompiledSpec,
        names: &[&str],
        values: &dyn FieldValues,
        scope: &RequiredScope,
        errors: &mut ValidationErrors,
    ) {
        let spec = compiled.spec();
        let field = spec.field();
        let matches: Vec<&str> = names
            .iter()
            .copied()
            .filter(|name| strip_indexes(name) == field)
            .collect();

        if matches.is_empty() {
            if spec.is_required() && scope.requires(field) {
                if let Some(error) = ValidationRules::required(&[]) {
                    errors.add(field, error);
                }
            }
            return;
        }

        for name in matches {
            let submitted = values.submitted(name).unwrap_or_default();

            if let Some(error) = ValidationRules::required(submitted) {
                // 空值：必填错误后不再检查；整行为空的索引行不要求必填
                if spec.is_required() && !is_blank_row(name, names, values) {
                    errors.add(name, error);
                }
                continue;
            }

            let present = submitted.iter().map(|v| v.trim()).filter(|v| !v.is_empty());

            for value in present.clone() {
                if let Some(error) =
                    ValidationRules::length(value, compiled.min_length(), compiled.max_length())
                {
                    errors.add(name, error.with_field(name, Some(value)));
                }
            }

            if values.conversion_failed(name) {
                continue;
            }

            if compiled.has_value_bounds() {
                let numbers = values.converted_numbers(name);
                for (raw, &number) in present.clone().zip(numbers) {
                    if let Some(error) =
                        ValidationRules::range(number, compiled.min_value(), compiled.max_value())
                    {
                        errors.add(name, error.with_field(name, Some(raw)));
                    }
                }
            }

            if let Some(regex) = &compiled.pattern {
                for value in present {
                    if let Some(error) = ValidationRules::pattern(value, regex) {
                        errors.add(name, error.with_field(name, Some(value)));
                    }
                }
            }
        }
    }

    /// 按注册顺序执行适用于当前事件的自定义校验方法
    pub fn run_custom<B: ?Sized>(
        validators: &[CustomValidator<B>],
        bean: &B,
        event: &str,
        errors: &mut ValidationErrors,
    ) {
        for validator in validators {
            if !validator.scope.applies_to(event) {
                continue;
            }
            if validator.when == ValidationState::NoErrors && !errors.is_empty() {
                tracing::debug!(validator = %validator.name, "Skipping validator, errors present");
                continue;
            }

            tracing::debug!(validator = %validator.name, event = %event, "Running custom validator");
            validator.run(bean, errors);
        }
    }
}

/// 索引行（例如 `items[3]`）下提交的所有参数是否都为空
fn is_blank_row(name: &str, names: &[&str], values: &dyn FieldValues) -> bool {
    let Some(end) = name.rfind(']') else {
        return false;
    };
    let row = &name[..=end];

    names
        .iter()
        .filter(|other| {
            other
                .strip_prefix(row)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with(['.', '[']))
        })
        .all(|other| {
            values
                .submitted(other)
                .map_or(true, |v| v.iter().all(|s| s.trim().is_empty()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::spec::FieldValidationSpec;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct Submitted {
        values: BTreeMap<String, Vec<String>>,
        numbers: HashMap<String, Vec<f64>>,
        failed: HashSet<String>,
    }

    impl Submitted {
        fn with(mut self, name: &str, value: &str) -> Self {
            self.values.insert(name.to_string(), vec![value.to_string()]);
            if let Ok(n) = value.parse::<f64>() {
                self.numbers.insert(name.to_string(), vec![n]);
            }
            self
        }

        fn with_all(mut self, name: &str, values: &[&str]) -> Self {
            self.values
                .insert(name.to_string(), values.iter().map(|v| v.to_string()).collect());
            let numbers = values.iter().filter_map(|v| v.parse::<f64>().ok()).collect();
            self.numbers.insert(name.to_string(), numbers);
            self
        }

        fn failed(mut self, name: &str) -> Self {
            self.failed.insert(name.to_string());
            self.numbers.remove(name);
            self
        }
    }

    impl FieldValues for Submitted {
        fn submitted_names(&self) -> Vec<&str> {
            self.values.keys().map(String::as_str).collect()
        }

        fn submitted(&self, name: &str) -> Option<&[String]> {
            self.values.get(name).map(Vec::as_slice)
        }

        fn converted_numbers(&self, name: &str) -> &[f64] {
            self.numbers.get(name).map(Vec::as_slice).unwrap_or_default()
        }

        fn conversion_failed(&self, name: &str) -> bool {
            self.failed.contains(name)
        }
    }

    fn keys(errors: &ValidationErrors, field: &str) -> Vec<String> {
        errors
            .get(field)
            .unwrap_or_default()
            .iter()
            .filter_map(|e| e.key().map(str::to_string))
            .collect()
    }

    fn register_specs() -> ValidationSpecSet {
        ValidationSpecSet::build([
            FieldValidationSpec::new("user.username")
                .required()
                .min_length(5)
                .max_length(20)
                .pattern("[a-z]+"),
            FieldValidationSpec::new("user.age").min_value(18.0).max_value(120.0),
            FieldValidationSpec::new("confirmPassword").required().on(["register"]),
        ])
        .unwrap()
    }

    #[test]
    fn test_required_suppresses_length_and_pattern() {
        let values = Submitted::default().with("user.username", "   ");
        let errors = ValidationEngine::validate_specs(&register_specs(), &values, "save", &RequiredScope::All);

        assert_eq!(keys(&errors, "user.username"), vec!["validation.required.valueNotPresent"]);
    }

    #[test]
    fn test_missing_required_field_is_reported() {
        let values = Submitted::default();
        let errors = ValidationEngine::validate_specs(&register_specs(), &values, "register", &RequiredScope::All);

        assert!(errors.has_field_errors("user.username"));
        assert!(errors.has_field_errors("confirmPassword"));
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_event_scope_is_respected() {
        let values = Submitted::default().with("user.username", "alice");
        let errors = ValidationEngine::validate_specs(&register_specs(), &values, "save", &RequiredScope::All);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_length_and_pattern_on_raw_value() {
        let values = Submitted::default().with("user.username", "AB");
        let errors = ValidationEngine::validate_specs(&register_specs(), &values, "save", &RequiredScope::All);

        assert_eq!(
            keys(&errors, "user.username"),
            vec!["validation.minlength.valueTooShort", "validation.mask.valueDoesNotMatch"]
        );
        assert_eq!(errors.get("user.username").unwrap()[0].field_value(), Some("AB"));
    }

    #[test]
    fn test_range_uses_converted_value() {
        let values = Submitted::default().with("user.username", "alice").with("user.age", "12");
        let errors = ValidationEngine::validate_specs(&register_specs(), &values, "save", &RequiredScope::All);
        assert_eq!(keys(&errors, "user.age"), vec!["validation.minvalue.valueBelowMinimum"]);
    }

    #[test]
    fn test_range_checks_every_sequence_element() {
        let specs = ValidationSpecSet::build([
            FieldValidationSpec::new("qty").min_value(1.0).max_value(10.0),
        ])
        .unwrap();
        let values = Submitted::default().with_all("qty", &["0", "5", "99"]);

        let errors = ValidationEngine::validate_specs(&specs, &values, "save", &RequiredScope::All);
        let qty = errors.get("qty").unwrap();
        assert_eq!(
            keys(&errors, "qty"),
            vec!["validation.minvalue.valueBelowMinimum", "validation.maxvalue.valueAboveMaximum"]
        );
        assert_eq!(qty[0].field_value(), Some("0"));
        assert_eq!(qty[1].field_value(), Some("99"));
    }

    #[test]
    fn test_range_on_indexed_scalar() {
        let specs = ValidationSpecSet::build([
            FieldValidationSpec::new("items.quantity").min_value(1.0),
        ])
        .unwrap();
        let values = Submitted::default()
            .with("items[0].quantity", "3")
            .with("items[2].quantity", "0");

        let errors = ValidationEngine::validate_specs(&specs, &values, "save", &RequiredScope::All);
        assert!(!errors.has_field_errors("items[0].quantity"));
        assert_eq!(
            keys(&errors, "items[2].quantity"),
            vec!["validation.minvalue.valueBelowMinimum"]
        );
    }

    #[test]
    fn test_conversion_failure_suppresses_range() {
        let values = Submitted::default()
            .with("user.username", "alice")
            .with("user.age", "twelve")
            .failed("user.age");
        let errors = ValidationEngine::validate_specs(&register_specs(), &values, "save", &RequiredScope::All);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_validation_is_idempotent() {
        let values = Submitted::default().with("user.username", "AB").with("user.age", "500");
        let specs = register_specs();

        let first = ValidationEngine::validate_specs(&specs, &values, "register", &RequiredScope::All);
        let second = ValidationEngine::validate_specs(&specs, &values, "register", &RequiredScope::All);
        assert_eq!(first, second);
        assert_eq!(first.fields().collect::<Vec<_>>(), second.fields().collect::<Vec<_>>());
    }

    #[test]
    fn test_manifest_scope_limits_required_fields() {
        let specs = ValidationSpecSet::build([
            FieldValidationSpec::new("name").required(),
            FieldValidationSpec::new("email").required(),
            FieldValidationSpec::new("phone").required(),
        ])
        .unwrap();
        let values = Submitted::default().with("email", "");
        let scope = RequiredScope::manifest(["email", "phone"]);

        let errors = ValidationEngine::validate_specs(&specs, &values, "next", &scope);
        assert!(!errors.has_field_errors("name"));
        assert!(errors.has_field_errors("email"));
        assert!(errors.has_field_errors("phone"));
    }

    #[test]
    fn test_indexed_fields_and_blank_rows() {
        let specs = ValidationSpecSet::build([
            FieldValidationSpec::new("items.name").required().min_length(3),
            FieldValidationSpec::new("items.quantity").required(),
        ])
        .unwrap();
        let values = Submitted::default()
            .with("items[0].name", "ab")
            .with("items[0].quantity", "")
            .with("items[1].name", "")
            .with("items[1].quantity", " ");

        let errors = ValidationEngine::validate_specs(&specs, &values, "save", &RequiredScope::All);
        assert_eq!(keys(&errors, "items[0].name"), vec!["validation.minlength.valueTooShort"]);
        assert_eq!(keys(&errors, "items[0].quantity"), vec!["validation.required.valueNotPresent"]);
        assert!(!errors.has_field_errors("items[1].name"));
        assert!(!errors.has_field_errors("items[1].quantity"));
    }

    #[test]
    fn test_engine_registry_lookup() {
        struct Calculator;

        let mut engine = ValidationEngine::new();
        engine.register(TypeId::of::<Calculator>(), register_specs());

        let values = Submitted::default();
        let errors = engine.validate(TypeId::of::<Calculator>(), &values, "save", &RequiredScope::All);
        assert!(errors.has_field_errors("user.username"));

        let errors = engine.validate(TypeId::of::<String>(), &values, "save", &RequiredScope::All);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_custom_validators_run_in_order() {
        struct Numbers {
            one: f64,
            two: f64,
        }

        let validators = vec![
            CustomValidator::new("divisorNotZero", |bean: &Numbers, errors: &mut ValidationErrors| {
                if bean.two == 0.0 {
                    errors.add("numberTwo", ValidationError::simple("Dividing by zero is not allowed."));
                }
            })
            .on(["Division"]),
            CustomValidator::new("onlyWhenClean", |bean: &Numbers, errors: &mut ValidationErrors| {
                if bean.one < 0.0 {
                    errors.add("numberOne", ValidationError::simple("negative"));
                }
            })
            .when(ValidationState::NoErrors),
        ];

        let bean = Numbers { one: -1.0, two: 0.0 };

        let mut errors = ValidationErrors::new();
        ValidationEngine::run_custom(&validators, &bean, "Division", &mut errors);
        assert!(errors.has_field_errors("numberTwo"));
        assert!(!errors.has_field_errors("numberOne"));

        let mut errors = ValidationErrors::new();
        ValidationEngine::run_custom(&validators, &bean, "Addition", &mut errors);
        assert!(errors.has_field_errors("numberOne"));
    }
}
