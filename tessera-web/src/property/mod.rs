//! 属性访问
//!
//! [`Property`] 是对任意 bean 形状的多态访问能力：导航到子属性、只读查看、
//! 从提交的字符串赋值。标量、`Option`、`Box`、`Vec`、`HashMap`/`BTreeMap`
//! 在这里实现，bean 由 `#[derive(Bean)]` 生成实现。

pub mod path;

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use num_bigint::BigInt;
use serde_json::Value;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use tessera_validator::{Convertible, ConverterError, Locale, TypeConverterRegistry, ValidationError};
use tessera_core::constants::DEFAULT_MAX_INDEX;
use thiserror::Error;

pub use path::{PathError, PropertyPath, Segment};

/// 绑定时使用的环境：转换器、区域设置与序列索引上限
#[derive(Debug, Clone, Copy)]
pub struct BindContext<'a> {
    pub converters: &'a TypeConverterRegistry,
    pub locale: &'a Locale,
    pub max_index: usize,
}

impl<'a> BindContext<'a> {
    pub fn new(converters: &'a TypeConverterRegistry, locale: &'a Locale) -> Self {
        Self {
            converters,
            locale,
            max_index: DEFAULT_MAX_INDEX,
        }
    }

    pub fn with_max_index(mut self, max_index: usize) -> Self {
        self.max_index = max_index;
        self
    }
}

/// 一次转换失败：原始值与对应的错误
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionFailure {
    pub value: String,
    pub error: ValidationError,
}

/// 属性访问错误（只影响当前路径）
#[derive(Debug, Error)]
pub enum PropertyError {
    #[error("no property '{name}' on {type_name}")]
    UnknownProperty {
        name: String,
        type_name: &'static str,
    },

    #[error("{type_name} has no nested property '{segment}'")]
    NotNavigable {
        type_name: &'static str,
        segment: String,
    },

    #[error("'{key}' is not a valid index into {type_name}")]
    InvalidIndex { key: String, type_name: &'static str },

    #[error("index {index} exceeds the configured limit of {limit}")]
    IndexLimit { index: usize, limit: usize },

    #[error("cannot instantiate {type_name}: no default value available")]
    Uninstantiable { type_name: &'static str },

    #[error("{type_name} cannot be assigned from request values")]
    NotAssignable { type_name: &'static str },

    #[error(transparent)]
    Converter(#[from] ConverterError),
}

/// 可通过属性路径访问的值
pub trait Property: Any + Send {
    fn type_name(&self) -> &'static str;

    /// 导航到子属性，缺失的中间对象按需创建
    fn navigate(
        &mut self,
        segment: &Segment,
        _cx: &BindContext<'_>,
    ) -> Result<&mut dyn Property, PropertyError> {
        Err(PropertyError::NotNavigable {
            type_name: self.type_name(),
            segment: segment.to_string(),
        })
    }

    /// 只读查看子属性，不创建任何对象
    fn inspect(&self, _segment: &Segment) -> Option<&dyn Property> {
        None
    }

    /// 从提交的字符串赋值；转换失败作为数据返回，不作为错误
    fn assign(
        &mut self,
        values: &[String],
        cx: &BindContext<'_>,
    ) -> Result<Vec<ConversionFailure>, PropertyError>;

    /// 数值属性的值（用于范围校验）
    fn as_number(&self) -> Option<f64> {
        None
    }

    /// 转换后的全部数值；序列属性按元素顺序返回每个元素的值
    fn as_numbers(&self) -> Vec<f64> {
        self.as_number().into_iter().collect()
    }

    /// 当前值的 JSON 表示
    fn snapshot(&self) -> Value;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// 默认实例；没有无参构造时返回 `None`
    fn instantiate() -> Option<Self>
    where
        Self: Sized;
}

/// 标量赋值：取第一个非空值转换后写入，空值保持原值
pub fn assign_scalar<T: Convertible>(
    slot: &mut T,
    values: &[String],
    cx: &BindContext<'_>,
) -> Result<Vec<ConversionFailure>, PropertyError> {
    let Some(raw) = values.iter().map(|v| v.trim()).find(|v| !v.is_empty()) else {
        return Ok(Vec::new());
    };

    let mut errors = Vec::new();
    match cx.converters.convert::<T>(raw, cx.locale, &mut errors)? {
        Some(value) => {
            *slot = value;
            Ok(Vec::new())
        }
        None => Ok(errors
            .into_iter()
            .map(|error| ConversionFailure {
                value: raw.to_string(),
                error,
            })
            .collect()),
    }
}

macro_rules! scalar_property {
    (@common $ty:ty) => {
        fn type_name(&self) -> &'static str {
            stringify!($ty)
        }

        fn assign(
            &mut self,
            values: &[String],
            cx: &BindContext<'_>,
        ) -> Result<Vec<ConversionFailure>, PropertyError> {
            assign_scalar(self, values, cx)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }

        fn instantiate() -> Option<Self> {
            Some(<$ty>::default())
        }
    };
    (number: $($ty:ty),*) => {
        $(impl Property for $ty {
            scalar_property!(@common $ty);

            fn as_number(&self) -> Option<f64> {
                Some(*self as f64)
            }

            fn snapshot(&self) -> Value {
                serde_json::json!(*self)
            }
        })*
    };
    (text: $($ty:ty),*) => {
        $(impl Property for $ty {
            scalar_property!(@common $ty);

            fn snapshot(&self) -> Value {
                Value::String(self.to_string())
            }
        })*
    };
}

scalar_property!(number: i8, i16, i32, i64, u8, u16, u32, u64, usize, f32, f64);
scalar_property!(text: char, String, NaiveDate);

impl Property for bool {
    scalar_property!(@common bool);

    fn snapshot(&self) -> Value {
        Value::Bool(*self)
    }
}

macro_rules! big_number_property {
    ($($ty:ty),*) => {
        $(impl Property for $ty {
            scalar_property!(@common $ty);

            fn as_number(&self) -> Option<f64> {
                self.to_string().parse().ok()
            }

            fn snapshot(&self) -> Value {
                Value::String(self.to_string())
            }
        })*
    };
}

big_number_property!(BigInt, BigDecimal);

impl<T: Property> Property for Option<T> {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn navigate(
        &mut self,
        segment: &Segment,
        cx: &BindContext<'_>,
    ) -> Result<&mut dyn Property, PropertyError> {
        if self.is_none() {
            let created = T::instantiate().ok_or(PropertyError::Uninstantiable {
                type_name: std::any::type_name::<T>(),
            })?;
            tracing::trace!(type_name = std::any::type_name::<T>(), "Instantiated intermediate property");
            *self = Some(created);
        }
        match self {
            Some(inner) => inner.navigate(segment, cx),
            None => Err(PropertyError::Uninstantiable {
                type_name: std::any::type_name::<T>(),
            }),
        }
    }

    fn inspect(&self, segment: &Segment) -> Option<&dyn Property> {
        self.as_ref().and_then(|inner| inner.inspect(segment))
    }

    fn assign(
        &mut self,
        values: &[String],
        cx: &BindContext<'_>,
    ) -> Result<Vec<ConversionFailure>, PropertyError> {
        if values.iter().all(|v| v.trim().is_empty()) {
            *self = None;
            return Ok(Vec::new());
        }

        let mut candidate = T::instantiate().ok_or(PropertyError::Uninstantiable {
            type_name: std::any::type_name::<T>(),
        })?;
        let failures = candidate.assign(values, cx)?;
        if failures.is_empty() {
            *self = Some(candidate);
        }
        Ok(failures)
    }

    fn as_number(&self) -> Option<f64> {
        self.as_ref().and_then(Property::as_number)
    }

    fn as_numbers(&self) -> Vec<f64> {
        self.as_ref().map(Property::as_numbers).unwrap_or_default()
    }

    fn snapshot(&self) -> Value {
        self.as_ref().map_or(Value::Null, Property::snapshot)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn instantiate() -> Option<Self> {
        Some(None)
    }
}

impl<T: Property> Property for Box<T> {
    fn type_name(&self) -> &'static str {
        self.as_ref().type_name()
    }

    fn navigate(
        &mut self,
        segment: &Segment,
        cx: &BindContext<'_>,
    ) -> Result<&mut dyn Property, PropertyError> {
        self.as_mut().navigate(segment, cx)
    }

    fn inspect(&self, segment: &Segment) -> Option<&dyn Property> {
        self.as_ref().inspect(segment)
    }

    fn assign(
        &mut self,
        values: &[String],
        cx: &BindContext<'_>,
    ) -> Result<Vec<ConversionFailure>, PropertyError> {
        self.as_mut().assign(values, cx)
    }

    fn as_number(&self) -> Option<f64> {
        self.as_ref().as_number()
    }

    fn as_numbers(&self) -> Vec<f64> {
        self.as_ref().as_numbers()
    }

    fn snapshot(&self) -> Value {
        self.as_ref().snapshot()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn instantiate() -> Option<Self> {
        T::instantiate().map(Box::new)
    }
}

impl<T: Property> Property for Vec<T> {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// 索引越界时追加默认元素直到该索引（稀疏索引不会报错）
    ///
    /// 索引不能超过 [`BindContext::max_index`]
    fn navigate(
        &mut self,
        segment: &Segment,
        cx: &BindContext<'_>,
    ) -> Result<&mut dyn Property, PropertyError> {
        let Segment::Index(key) = segment else {
            return Err(PropertyError::NotNavigable {
                type_name: std::any::type_name::<Self>(),
                segment: segment.to_string(),
            });
        };
        let index: usize = key.parse().map_err(|_| PropertyError::InvalidIndex {
            key: key.clone(),
            type_name: std::any::type_name::<Self>(),
        })?;
        if index > cx.max_index {
            return Err(PropertyError::IndexLimit {
                index,
                limit: cx.max_index,
            });
        }

        while self.len() <= index {
            let element = T::instantiate().ok_or(PropertyError::Uninstantiable {
                type_name: std::any::type_name::<T>(),
            })?;
            self.push(element);
        }

        Ok(&mut self[index] as &mut dyn Property)
    }

    fn inspect(&self, segment: &Segment) -> Option<&dyn Property> {
        match segment {
            Segment::Index(key) => key
                .parse::<usize>()
                .ok()
                .and_then(|i| self.get(i))
                .map(|v| v as &dyn Property),
            Segment::Property(_) => None,
        }
    }

    /// 逐个转换所有非空值，收集全部失败；全部成功时才替换原序列
    fn assign(
        &mut self,
        values: &[String],
        cx: &BindContext<'_>,
    ) -> Result<Vec<ConversionFailure>, PropertyError> {
        let mut elements = Vec::with_capacity(values.len());
        let mut failures = Vec::new();

        for value in values.iter().filter(|v| !v.trim().is_empty()) {
            let mut element = T::instantiate().ok_or(PropertyError::Uninstantiable {
                type_name: std::any::type_name::<T>(),
            })?;
            let element_failures = element.assign(std::slice::from_ref(value), cx)?;
            if element_failures.is_empty() {
                elements.push(element);
            } else {
                failures.extend(element_failures);
            }
        }

        if failures.is_empty() {
            *self = elements;
        }
        Ok(failures)
    }

    fn as_numbers(&self) -> Vec<f64> {
        self.iter().filter_map(Property::as_number).collect()
    }

    fn snapshot(&self) -> Value {
        Value::Array(self.iter().map(Property::snapshot).collect())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn instantiate() -> Option<Self> {
        Some(Vec::new())
    }
}

/// 可以作为映射键的类型
pub trait MapKey: Sized + Send + 'static {
    fn parse_key(raw: &str) -> Option<Self>;

    fn key_text(&self) -> String;
}

macro_rules! map_key {
    ($($ty:ty),*) => {
        $(impl MapKey for $ty {
            fn parse_key(raw: &str) -> Option<Self> {
                raw.trim().parse().ok()
            }

            fn key_text(&self) -> String {
                self.to_string()
            }
        })*
    };
}

map_key!(i32, i64, u32, u64, usize);

impl MapKey for String {
    fn parse_key(raw: &str) -> Option<Self> {
        Some(raw.to_string())
    }

    fn key_text(&self) -> String {
        self.clone()
    }
}

macro_rules! map_property {
    ($map:ident, $($bound:path),+) => {
        impl<K, T> Property for $map<K, T>
        where
            K: MapKey $(+ $bound)+,
            T: Property,
        {
            fn type_name(&self) -> &'static str {
                std::any::type_name::<Self>()
            }

            /// 按键查找，不存在时插入默认值；`map.key` 与 `map[key]` 等价
            fn navigate(
                &mut self,
                segment: &Segment,
                _cx: &BindContext<'_>,
            ) -> Result<&mut dyn Property, PropertyError> {
                let key = K::parse_key(segment.key()).ok_or_else(|| PropertyError::InvalidIndex {
                    key: segment.key().to_string(),
                    type_name: std::any::type_name::<Self>(),
                })?;

                if !self.contains_key(&key) {
                    let value = T::instantiate().ok_or(PropertyError::Uninstantiable {
                        type_name: std::any::type_name::<T>(),
                    })?;
                    return Ok(self.entry(key).or_insert(value) as &mut dyn Property);
                }

                self.get_mut(&key)
                    .map(|v| v as &mut dyn Property)
                    .ok_or_else(|| PropertyError::InvalidIndex {
                        key: segment.key().to_string(),
                        type_name: std::any::type_name::<Self>(),
                    })
            }

            fn inspect(&self, segment: &Segment) -> Option<&dyn Property> {
                K::parse_key(segment.key())
                    .and_then(|key| self.get(&key))
                    .map(|v| v as &dyn Property)
            }

            fn assign(
                &mut self,
                _values: &[String],
                _cx: &BindContext<'_>,
            ) -> Result<Vec<ConversionFailure>, PropertyError> {
                Err(PropertyError::NotAssignable {
                    type_name: std::any::type_name::<Self>(),
                })
            }

            fn snapshot(&self) -> Value {
                Value::Object(
                    self.iter()
                        .map(|(k, v)| (k.key_text(), v.snapshot()))
                        .collect(),
                )
            }

            fn as_any(&self) -> &dyn Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn Any {
                self
            }

            fn instantiate() -> Option<Self> {
                Some($map::new())
            }
        }
    };
}

map_property!(HashMap, Eq, Hash);
map_property!(BTreeMap, Ord);

#[cfg(test)]
mod tests {
    use super::*;

    fn values(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_scalar_assignment_and_failure() {
        let registry = TypeConverterRegistry::new();
        let locale = Locale::us();
        let cx = BindContext::new(&registry, &locale);

        let mut age = 0i32;
        assert!(age.assign(&values(&["42"]), &cx).unwrap().is_empty());
        assert_eq!(age, 42);

        let failures = age.assign(&values(&["4x"]), &cx).unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].value, "4x");
        assert_eq!(age, 42);
    }

    #[test]
    fn test_option_blank_clears_value() {
        let registry = TypeConverterRegistry::new();
        let locale = Locale::us();
        let cx = BindContext::new(&registry, &locale);

        let mut amount: Option<f64> = Some(1.5);
        amount.assign(&values(&["  "]), &cx).unwrap();
        assert_eq!(amount, None);

        amount.assign(&values(&["2.25"]), &cx).unwrap();
        assert_eq!(amount, Some(2.25));
        assert_eq!(Property::as_number(&amount), Some(2.25));
    }

    #[test]
    fn test_vec_collects_every_element_failure() {
        let registry = TypeConverterRegistry::new();
        let locale = Locale::us();
        let cx = BindContext::new(&registry, &locale);

        let mut numbers: Vec<i64> = vec![9];
        let failures = numbers.assign(&values(&["1", "x", "3", "y"]), &cx).unwrap();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].value, "x");
        assert_eq!(failures[1].value, "y");
        assert_eq!(numbers, vec![9]);

        numbers.assign(&values(&["1", "", "3"]), &cx).unwrap();
        assert_eq!(numbers, vec![1, 3]);
        assert_eq!(numbers.as_numbers(), vec![1.0, 3.0]);

        let mut wrapped: Option<Vec<i64>> = None;
        wrapped.assign(&values(&["4", "5"]), &cx).unwrap();
        assert_eq!(Property::as_number(&wrapped), None);
        assert_eq!(wrapped.as_numbers(), vec![4.0, 5.0]);
    }

    #[test]
    fn test_vec_index_grows_sequence() {
        let registry = TypeConverterRegistry::new();
        let locale = Locale::us();
        let cx = BindContext::new(&registry, &locale);

        let mut names: Vec<String> = Vec::new();
        names.navigate(&Segment::Index("3".into()), &cx).unwrap();
        assert_eq!(names.len(), 4);
        assert!(names.iter().all(String::is_empty));

        let result = names.navigate(&Segment::Index("x".into()), &cx);
        assert!(matches!(result, Err(PropertyError::InvalidIndex { .. })));
    }

    #[test]
    fn test_vec_index_limit() {
        let registry = TypeConverterRegistry::new();
        let locale = Locale::us();
        let cx = BindContext::new(&registry, &locale).with_max_index(8);

        let mut names: Vec<String> = Vec::new();
        names.navigate(&Segment::Index("8".into()), &cx).unwrap();
        assert_eq!(names.len(), 9);

        let result = names.navigate(&Segment::Index("400000000".into()), &cx);
        assert!(matches!(result, Err(PropertyError::IndexLimit { index: 400000000, limit: 8 })));
        assert_eq!(names.len(), 9);
    }

    #[test]
    fn test_map_insert_or_fetch() {
        let registry = TypeConverterRegistry::new();
        let locale = Locale::us();
        let cx = BindContext::new(&registry, &locale).with_max_index(1);

        let mut scores: HashMap<String, i32> = HashMap::new();
        scores.navigate(&Segment::Index("alice".into()), &cx).unwrap();
        assert_eq!(scores.get("alice"), Some(&0));

        let mut by_id: BTreeMap<u32, String> = BTreeMap::new();
        assert!(by_id.navigate(&Segment::Index("x".into()), &cx).is_err());
        by_id.navigate(&Segment::Index("7".into()), &cx).unwrap();
        assert!(by_id.inspect(&Segment::Index("7".into())).is_some());
    }

    #[test]
    fn test_scalar_is_not_navigable() {
        let registry = TypeConverterRegistry::new();
        let locale = Locale::us();
        let cx = BindContext::new(&registry, &locale);

        let mut name = String::new();
        let result = name.navigate(&Segment::Property("length".into()), &cx);
        assert!(matches!(result, Err(PropertyError::NotNavigable { .. })));
    }
}
