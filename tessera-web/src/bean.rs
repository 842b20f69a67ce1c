//! Bean 内省
//!
//! 每个 bean 类型有一张在首次使用时构建、之后只读的属性访问表
//! （属性名 -> getter/setter 函数指针），请求处理时不再做任何类型分析。
//! 访问表与校验声明通常由 `#[derive(Bean)]` 生成。

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use tessera_validator::{SpecError, ValidationSpecSet};

use crate::property::{Property, PropertyError, Segment};

/// 单个属性的访问器
pub struct PropertyAccessor<T> {
    name: &'static str,
    get: fn(&T) -> &dyn Property,
    get_mut: fn(&mut T) -> &mut dyn Property,
}

impl<T> PropertyAccessor<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get<'a>(&self, bean: &'a T) -> &'a dyn Property {
        (self.get)(bean)
    }

    pub fn get_mut<'a>(&self, bean: &'a mut T) -> &'a mut dyn Property {
        (self.get_mut)(bean)
    }
}

/// Bean 类型的属性访问表
pub struct BeanDescriptor<T> {
    type_name: &'static str,
    accessors: Vec<PropertyAccessor<T>>,
    index: HashMap<&'static str, usize>,
}

impl<T> BeanDescriptor<T> {
    pub fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            accessors: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// 添加属性；同名属性后添加的覆盖先添加的
    pub fn property(
        mut self,
        name: &'static str,
        get: fn(&T) -> &dyn Property,
        get_mut: fn(&mut T) -> &mut dyn Property,
    ) -> Self {
        let accessor = PropertyAccessor { name, get, get_mut };
        match self.index.get(name) {
            Some(&i) => self.accessors[i] = accessor,
            None => {
                self.index.insert(name, self.accessors.len());
                self.accessors.push(accessor);
            }
        }
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn accessor(&self, name: &str) -> Option<&PropertyAccessor<T>> {
        self.index.get(name).map(|&i| &self.accessors[i])
    }

    /// 按声明顺序的属性名
    pub fn property_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.accessors.iter().map(|a| a.name)
    }

    pub fn len(&self) -> usize {
        self.accessors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accessors.is_empty()
    }
}

impl<T> fmt::Debug for BeanDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanDescriptor")
            .field("type_name", &self.type_name)
            .field("properties", &self.property_names().collect::<Vec<_>>())
            .finish()
    }
}

/// 可绑定请求参数的 bean
pub trait Bean: Property + Sized {
    /// 属性访问表（每个类型构建一次）
    fn descriptor() -> &'static BeanDescriptor<Self>;

    /// 字段校验声明，嵌套属性的规则已加上父路径前缀
    fn validation_spec_set() -> Result<ValidationSpecSet, SpecError> {
        Ok(ValidationSpecSet::new())
    }
}

/// `Property::navigate` 的 bean 实现
///
/// `bean['name']` 与 `bean.name` 等价
pub fn navigate_bean<'a, T: Bean>(
    bean: &'a mut T,
    segment: &Segment,
) -> Result<&'a mut dyn Property, PropertyError> {
    let descriptor = T::descriptor();
    let accessor = descriptor
        .accessor(segment.key())
        .ok_or_else(|| PropertyError::UnknownProperty {
            name: segment.key().to_string(),
            type_name: descriptor.type_name(),
        })?;
    Ok(accessor.get_mut(bean))
}

/// `Property::inspect` 的 bean 实现
pub fn inspect_bean<'a, T: Bean>(bean: &'a T, segment: &Segment) -> Option<&'a dyn Property> {
    T::descriptor()
        .accessor(segment.key())
        .map(|accessor| accessor.get(bean))
}

/// `Property::snapshot` 的 bean 实现
pub fn snapshot_bean<T: Bean>(bean: &T) -> Value {
    let descriptor = T::descriptor();
    let mut object = Map::new();
    for accessor in &descriptor.accessors {
        object.insert(accessor.name.to_string(), accessor.get(bean).snapshot());
    }
    Value::Object(object)
}
