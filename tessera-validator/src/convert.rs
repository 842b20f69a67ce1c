//! 类型转换
//!
//! 目标类型 -> 转换器 的映射在启动时构建，之后只读。转换失败不会越过注册表边界：
//! 错误被追加到调用方提供的集合中，返回值为 `None`。

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use num_bigint::BigInt;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::error::ValidationError;
use crate::locale::{DateOrder, Locale};

/// 转换结果（类型擦除）
pub type Converted = Box<dyn Any + Send>;

/// 通用枚举转换器的输出：匹配到的常量序号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumOrdinal(pub usize);

/// 转换目标类型描述
#[derive(Debug, Clone, Copy)]
pub struct TargetType {
    id: TypeId,
    name: &'static str,
    constants: Option<&'static [&'static str]>,
}

impl TargetType {
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            constants: None,
        }
    }

    /// 枚举类型，`constants` 为按序号排列的常量名
    pub fn enumeration<T: 'static>(constants: &'static [&'static str]) -> Self {
        Self {
            constants: Some(constants),
            ..Self::of::<T>()
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn constants(&self) -> Option<&'static [&'static str]> {
        self.constants
    }

    pub fn is_enum(&self) -> bool {
        self.constants.is_some()
    }
}

/// 类型转换器
pub trait TypeConverter: Send + Sync {
    /// 把字符串转换为目标类型；失败时向 `errors` 追加错误并返回 `None`
    fn convert(
        &self,
        input: &str,
        target: &TargetType,
        locale: &Locale,
        errors: &mut Vec<ValidationError>,
    ) -> Option<Converted>;
}

/// 可以由注册表转换得到的类型
pub trait Convertible: Sized + Send + 'static {
    fn target_type() -> TargetType {
        TargetType::of::<Self>()
    }

    fn from_converted(value: Converted) -> Option<Self> {
        value.downcast::<Self>().ok().map(|b| *b)
    }
}

/// 枚举类型：按名称（区分大小写）转换
pub trait Enumerated: Sized + Send + 'static {
    /// 按序号排列的常量名
    const NAMES: &'static [&'static str];

    fn from_ordinal(ordinal: usize) -> Option<Self>;

    fn name(&self) -> &'static str;
}

/// 枚举类型的 `Convertible::from_converted` 实现：既接受显式注册转换器的直接结果，
/// 也接受通用枚举转换器给出的序号
pub fn enum_from_converted<E: Enumerated>(value: Converted) -> Option<E> {
    match value.downcast::<E>() {
        Ok(v) => Some(*v),
        Err(value) => value
            .downcast::<EnumOrdinal>()
            .ok()
            .and_then(|ordinal| E::from_ordinal(ordinal.0)),
    }
}

macro_rules! impl_convertible {
    ($($ty:ty),* $(,)?) => {
        $(impl Convertible for $ty {})*
    };
}

impl_convertible!(
    bool, i8, i16, i32, i64, u8, u16, u32, u64, usize, f32, f64, char, String, BigInt,
    BigDecimal, NaiveDate,
);

/// 转换器查找/配置错误（非用户输入错误）
#[derive(Debug, Error)]
pub enum ConverterError {
    #[error("No type converter registered for type {type_name}")]
    NotFound { type_name: &'static str },

    #[error("Type converter for {type_name} produced a value of an unexpected type")]
    TypeMismatch { type_name: &'static str },
}

/// 绑定了区域设置的转换器
pub struct LocalizedConverter<'a> {
    converter: &'a dyn TypeConverter,
    target: TargetType,
    locale: &'a Locale,
}

impl LocalizedConverter<'_> {
    pub fn convert(&self, input: &str, errors: &mut Vec<ValidationError>) -> Option<Converted> {
        self.converter.convert(input, &self.target, self.locale, errors)
    }
}

/// 类型转换器注册表
pub struct TypeConverterRegistry {
    converters: HashMap<TypeId, Arc<dyn TypeConverter>>,
    enum_converter: Arc<dyn TypeConverter>,
}

impl std::fmt::Debug for TypeConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeConverterRegistry")
            .field("converters", &self.converters.len())
            .finish()
    }
}

impl TypeConverterRegistry {
    /// 不含任何转换器的注册表（枚举回退仍然可用）
    pub fn empty() -> Self {
        Self {
            converters: HashMap::new(),
            enum_converter: Arc::new(EnumeratedConverter),
        }
    }

    /// 包含所有内置转换器的注册表
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.add::<bool>(BooleanConverter);
        registry.add::<i8>(I8Converter);
        registry.add::<i16>(I16Converter);
        registry.add::<i32>(I32Converter);
        registry.add::<i64>(I64Converter);
        registry.add::<u8>(U8Converter);
        registry.add::<u16>(U16Converter);
        registry.add::<u32>(U32Converter);
        registry.add::<u64>(U64Converter);
        registry.add::<usize>(UsizeConverter);
        registry.add::<f32>(FloatConverter);
        registry.add::<f64>(DoubleConverter);
        registry.add::<BigInt>(BigIntegerConverter);
        registry.add::<BigDecimal>(BigDecimalConverter);
        registry.add::<NaiveDate>(DateConverter);
        registry.add::<String>(StringConverter);
        registry.add::<char>(CharConverter);
        registry
    }

    /// 注册（或覆盖）某个目标类型的转换器
    pub fn add<T: 'static>(&mut self, converter: impl TypeConverter + 'static) {
        self.converters.insert(TypeId::of::<T>(), Arc::new(converter));
    }

    pub fn with<T: 'static>(mut self, converter: impl TypeConverter + 'static) -> Self {
        self.add::<T>(converter);
        self
    }

    /// 查找转换器：先查显式映射，未命中且目标为枚举时回退到通用枚举转换器
    pub fn converter_for<'a>(
        &'a self,
        target: TargetType,
        locale: &'a Locale,
    ) -> Option<LocalizedConverter<'a>> {
        let converter = match self.converters.get(&target.id()) {
            Some(converter) => converter.as_ref(),
            None if target.is_enum() => self.enum_converter.as_ref(),
            None => return None,
        };

        Some(LocalizedConverter {
            converter,
            target,
            locale,
        })
    }

    /// 转换为具体类型
    ///
    /// 返回 `Ok(None)` 表示输入无法转换（错误已追加到 `errors`）
    pub fn convert<T: Convertible>(
        &self,
        input: &str,
        locale: &Locale,
        errors: &mut Vec<ValidationError>,
    ) -> Result<Option<T>, ConverterError> {
        let target = T::target_type();
        let converter = self
            .converter_for(target, locale)
            .ok_or(ConverterError::NotFound {
                type_name: target.name(),
            })?;

        let before = errors.len();
        let converted = converter.convert(input, errors);
        if errors.len() > before {
            return Ok(None);
        }

        match converted {
            Some(value) => T::from_converted(value)
                .map(Some)
                .ok_or(ConverterError::TypeMismatch {
                    type_name: target.name(),
                }),
            None => Ok(None),
        }
    }
}

impl Default for TypeConverterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// 内置转换器
// ============================================================================

fn invalid_number() -> ValidationError {
    ValidationError::conversion("converter.number.invalidNumber")
}

fn out_of_range(min: impl ToString, max: impl ToString) -> ValidationError {
    ValidationError::conversion("converter.number.outOfRange")
        .with_parameter(min)
        .with_parameter(max)
}

/// 去掉全为 0 的小数部分；含非零小数时返回 `None`
fn integer_digits(normalized: &str) -> Option<&str> {
    match normalized.split_once('.') {
        Some((int_part, frac)) if frac.chars().all(|c| c == '0') && !int_part.is_empty() && int_part != "-" => {
            Some(int_part)
        }
        Some(_) => None,
        None => Some(normalized),
    }
}

/// 解析整数；返回 `Err(true)` 表示数字合法但超出 i128 范围
fn parse_integer(input: &str, locale: &Locale) -> Result<i128, bool> {
    let normalized = locale.normalize_number(input).ok_or(false)?;
    let digits = integer_digits(&normalized).ok_or(false)?;
    digits.parse::<i128>().map_err(|_| true)
}

macro_rules! integer_converter {
    ($($name:ident => $ty:ty),* $(,)?) => {
        $(
            #[doc = concat!("`", stringify!($ty), "` 转换器")]
            pub struct $name;

            impl TypeConverter for $name {
                fn convert(
                    &self,
                    input: &str,
                    _target: &TargetType,
                    locale: &Locale,
                    errors: &mut Vec<ValidationError>,
                ) -> Option<Converted> {
                    let in_range = match parse_integer(input, locale) {
                        Ok(number) => <$ty>::try_from(number).ok(),
                        Err(false) => {
                            errors.push(invalid_number());
                            return None;
                        }
                        Err(true) => None,
                    };

                    match in_range {
                        Some(value) => Some(Box::new(value)),
                        None => {
                            errors.push(out_of_range(<$ty>::MIN, <$ty>::MAX));
                            None
                        }
                    }
                }
            }
        )*
    };
}

integer_converter!(
    I8Converter => i8,
    I16Converter => i16,
    I32Converter => i32,
    I64Converter => i64,
    U8Converter => u8,
    U16Converter => u16,
    U32Converter => u32,
    U64Converter => u64,
    UsizeConverter => usize,
);

fn parse_double(input: &str, locale: &Locale, errors: &mut Vec<ValidationError>) -> Option<f64> {
    let parsed = locale
        .normalize_number(input)
        .and_then(|n| n.parse::<f64>().ok())
        .filter(|v| v.is_finite());
    if parsed.is_none() {
        errors.push(invalid_number());
    }
    parsed
}

/// `f64` 转换器
pub struct DoubleConverter;

impl TypeConverter for DoubleConverter {
    fn convert(
        &self,
        input: &str,
        _target: &TargetType,
        locale: &Locale,
        errors: &mut Vec<ValidationError>,
    ) -> Option<Converted> {
        parse_double(input, locale, errors).map(|v| Box::new(v) as Converted)
    }
}

/// `f32` 转换器
pub struct FloatConverter;

impl TypeConverter for FloatConverter {
    fn convert(
        &self,
        input: &str,
        _target: &TargetType,
        locale: &Locale,
        errors: &mut Vec<ValidationError>,
    ) -> Option<Converted> {
        let value = parse_double(input, locale, errors)?;
        if value.abs() > f64::from(f32::MAX) {
            errors.push(out_of_range(f32::MIN, f32::MAX));
            return None;
        }
        Some(Box::new(value as f32))
    }
}

/// `BigInt` 转换器
pub struct BigIntegerConverter;

impl TypeConverter for BigIntegerConverter {
    fn convert(
        &self,
        input: &str,
        _target: &TargetType,
        locale: &Locale,
        errors: &mut Vec<ValidationError>,
    ) -> Option<Converted> {
        let parsed = locale.normalize_number(input).and_then(|normalized| {
            integer_digits(&normalized).and_then(|digits| BigInt::from_str(digits).ok())
        });
        match parsed {
            Some(value) => Some(Box::new(value)),
            None => {
                errors.push(invalid_number());
                None
            }
        }
    }
}

/// `BigDecimal` 转换器
pub struct BigDecimalConverter;

impl TypeConverter for BigDecimalConverter {
    fn convert(
        &self,
        input: &str,
        _target: &TargetType,
        locale: &Locale,
        errors: &mut Vec<ValidationError>,
    ) -> Option<Converted> {
        let parsed = locale
            .normalize_number(input)
            .and_then(|normalized| BigDecimal::from_str(&normalized).ok());
        match parsed {
            Some(value) => Some(Box::new(value)),
            None => {
                errors.push(invalid_number());
                None
            }
        }
    }
}

/// 布尔转换器：`true`/`t`/`yes`/`y`/`on`/`1`（不区分大小写）为真，其余为假
pub struct BooleanConverter;

impl TypeConverter for BooleanConverter {
    fn convert(
        &self,
        input: &str,
        _target: &TargetType,
        _locale: &Locale,
        _errors: &mut Vec<ValidationError>,
    ) -> Option<Converted> {
        let value = matches!(
            input.trim().to_lowercase().as_str(),
            "true" | "t" | "yes" | "y" | "on" | "1"
        );
        Some(Box::new(value))
    }
}

/// 日期转换器
///
/// 依次尝试 ISO 格式、区域相关的数字格式以及带月份名称的格式
pub struct DateConverter;

impl DateConverter {
    fn formats(locale: &Locale) -> Vec<&'static str> {
        let mut formats = vec!["%Y-%m-%d"];
        match locale.date_order() {
            DateOrder::MonthDayYear => formats.extend(["%m/%d/%Y", "%m-%d-%Y"]),
            DateOrder::DayMonthYear => formats.extend(["%d.%m.%Y", "%d/%m/%Y", "%d-%m-%Y"]),
            DateOrder::YearMonthDay => formats.extend(["%Y.%m.%d"]),
        }
        formats.extend(["%Y/%m/%d", "%B %d, %Y", "%b %d, %Y", "%d %B %Y", "%d %b %Y"]);
        formats
    }
}

impl TypeConverter for DateConverter {
    fn convert(
        &self,
        input: &str,
        _target: &TargetType,
        locale: &Locale,
        errors: &mut Vec<ValidationError>,
    ) -> Option<Converted> {
        let input = input.trim();
        let parsed = Self::formats(locale)
            .into_iter()
            .find_map(|format| NaiveDate::parse_from_str(input, format).ok());

        match parsed {
            Some(date) => Some(Box::new(date)),
            None => {
                errors.push(ValidationError::conversion("converter.date.invalidDate"));
                None
            }
        }
    }
}

/// 字符串：原样保留
pub struct StringConverter;

impl TypeConverter for StringConverter {
    fn convert(
        &self,
        input: &str,
        _target: &TargetType,
        _locale: &Locale,
        _errors: &mut Vec<ValidationError>,
    ) -> Option<Converted> {
        Some(Box::new(input.to_string()))
    }
}

/// 字符：取第一个字符
pub struct CharConverter;

impl TypeConverter for CharConverter {
    fn convert(
        &self,
        input: &str,
        _target: &TargetType,
        _locale: &Locale,
        _errors: &mut Vec<ValidationError>,
    ) -> Option<Converted> {
        input.chars().next().map(|c| Box::new(c) as Converted)
    }
}

/// 通用枚举转换器：按常量名精确匹配（区分大小写）
pub struct EnumeratedConverter;

impl TypeConverter for EnumeratedConverter {
    fn convert(
        &self,
        input: &str,
        target: &TargetType,
        _locale: &Locale,
        errors: &mut Vec<ValidationError>,
    ) -> Option<Converted> {
        let constants = target.constants().unwrap_or_default();
        match constants.iter().position(|name| *name == input) {
            Some(ordinal) => Some(Box::new(EnumOrdinal(ordinal))),
            None => {
                errors.push(
                    ValidationError::conversion("converter.enum.notAnEnumeratedValue")
                        .with_parameter(input)
                        .with_parameter(constants.join(", ")),
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Color {
        Red,
        Green,
    }

    impl Enumerated for Color {
        const NAMES: &'static [&'static str] = &["Red", "Green"];

        fn from_ordinal(ordinal: usize) -> Option<Self> {
            match ordinal {
                0 => Some(Color::Red),
                1 => Some(Color::Green),
                _ => None,
            }
        }

        fn name(&self) -> &'static str {
            Self::NAMES[*self as usize]
        }
    }

    impl Convertible for Color {
        fn target_type() -> TargetType {
            TargetType::enumeration::<Self>(Self::NAMES)
        }

        fn from_converted(value: Converted) -> Option<Self> {
            enum_from_converted(value)
        }
    }

    fn convert<T: Convertible>(input: &str, locale: &Locale) -> (Option<T>, Vec<ValidationError>) {
        let registry = TypeConverterRegistry::new();
        let mut errors = Vec::new();
        let value = registry.convert::<T>(input, locale, &mut errors).unwrap();
        (value, errors)
    }

    #[test]
    fn test_integer_conversion() {
        let us = Locale::us();
        assert_eq!(convert::<i32>("1,234", &us).0, Some(1234));
        assert_eq!(convert::<i64>("-42", &us).0, Some(-42));
        assert_eq!(convert::<i32>("5.0", &us).0, Some(5));

        let (value, errors) = convert::<i32>("5.5", &us);
        assert_eq!(value, None);
        assert_eq!(errors[0].key(), Some("converter.number.invalidNumber"));
    }

    #[test]
    fn test_trailing_characters_fail() {
        let (value, errors) = convert::<f64>("12abc", &Locale::us());
        assert_eq!(value, None);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].key(), Some("converter.number.invalidNumber"));
    }

    #[test]
    fn test_integer_range_is_checked() {
        let (value, errors) = convert::<u8>("256", &Locale::us());
        assert_eq!(value, None);
        assert_eq!(errors[0].key(), Some("converter.number.outOfRange"));
        assert_eq!(errors[0].parameters(), &["0".to_string(), "255".to_string()]);
    }

    #[test]
    fn test_locale_decimal_parsing() {
        assert_eq!(convert::<f64>("1.234,5", &Locale::parse("de_DE")).0, Some(1234.5));
        assert_eq!(convert::<f64>("1,234.5", &Locale::us()).0, Some(1234.5));
    }

    #[test]
    fn test_big_numbers() {
        let us = Locale::us();
        assert_eq!(
            convert::<BigInt>("123,456,789,012,345,678,901", &us).0,
            Some(BigInt::from_str("123456789012345678901").unwrap())
        );
        assert_eq!(
            convert::<BigDecimal>("3.14159", &us).0,
            Some(BigDecimal::from_str("3.14159").unwrap())
        );
    }

    #[test]
    fn test_boolean_conversion() {
        let us = Locale::us();
        assert_eq!(convert::<bool>("on", &us).0, Some(true));
        assert_eq!(convert::<bool>("YES", &us).0, Some(true));
        assert_eq!(convert::<bool>("nope", &us).0, Some(false));
    }

    #[test]
    fn test_date_conversion() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 7);
        assert_eq!(convert::<NaiveDate>("2024-03-07", &Locale::us()).0, expected);
        assert_eq!(convert::<NaiveDate>("3/7/2024", &Locale::us()).0, expected);
        assert_eq!(convert::<NaiveDate>("7.3.2024", &Locale::parse("de_DE")).0, expected);

        let (value, errors) = convert::<NaiveDate>("yesterday", &Locale::us());
        assert_eq!(value, None);
        assert_eq!(errors[0].key(), Some("converter.date.invalidDate"));
    }

    #[test]
    fn test_enum_fallback_is_case_sensitive() {
        let us = Locale::us();
        assert_eq!(convert::<Color>("Green", &us).0, Some(Color::Green));

        let (value, errors) = convert::<Color>("green", &us);
        assert_eq!(value, None);
        assert_eq!(errors[0].key(), Some("converter.enum.notAnEnumeratedValue"));
        assert_eq!(errors[0].parameters(), &["green".to_string(), "Red, Green".to_string()]);
    }

    #[test]
    fn test_explicit_converter_wins_over_enum_fallback() {
        struct LenientColor;
        impl TypeConverter for LenientColor {
            fn convert(
                &self,
                input: &str,
                _target: &TargetType,
                _locale: &Locale,
                _errors: &mut Vec<ValidationError>,
            ) -> Option<Converted> {
                match input.to_lowercase().as_str() {
                    "red" => Some(Box::new(Color::Red)),
                    _ => Some(Box::new(Color::Green)),
                }
            }
        }

        let registry = TypeConverterRegistry::new().with::<Color>(LenientColor);
        let mut errors = Vec::new();
        let value = registry.convert::<Color>("RED", &Locale::us(), &mut errors).unwrap();
        assert_eq!(value, Some(Color::Red));
        assert!(errors.is_empty());
    }

    #[test]
    fn test_missing_converter() {
        struct Opaque;
        impl Convertible for Opaque {}

        let registry = TypeConverterRegistry::new();
        let mut errors = Vec::new();
        let result = registry.convert::<Opaque>("x", &Locale::us(), &mut errors);
        assert!(matches!(result, Err(ConverterError::NotFound { .. })));
    }

    proptest! {
        #[test]
        fn prop_i64_round_trips_through_locale_format(n in any::<i64>(), tag in prop::sample::select(vec!["en_US", "de_DE", "fr_FR", "de_CH"])) {
            let locale = Locale::parse(tag);
            let formatted = locale.format_number(n);
            prop_assert_eq!(convert::<i64>(&formatted, &locale).0, Some(n));
        }

        #[test]
        fn prop_f64_round_trips_through_locale_format(n in -1.0e12f64..1.0e12f64, tag in prop::sample::select(vec!["en_US", "de_DE", "fr_FR"])) {
            let locale = Locale::parse(tag);
            let formatted = locale.format_number(n);
            prop_assert_eq!(convert::<f64>(&formatted, &locale).0, Some(n));
        }
    }
}
