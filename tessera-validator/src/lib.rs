//! Tessera Validator - 类型转换与参数校验模块
//!
//! 负责把请求中的字符串参数转换为强类型值，并按照声明式规则进行校验：
//!
//! - [`TypeConverterRegistry`] - 按目标类型查找转换器（区域设置感知）
//! - [`ValidationSpecSet`] - 启动时构建、之后只读的字段校验规则集合
//! - [`ValidationEngine`] - 按事件执行字段校验与自定义校验方法
//! - [`ValidationErrors`] - 按字段名排序的错误集合
//! - [`LocalizationProvider`] - 错误消息模板的本地化来源

pub mod convert;
pub mod engine;
pub mod error;
pub mod locale;
pub mod message;
pub mod rules;
pub mod spec;

pub use convert::{
    enum_from_converted, Convertible, Converted, ConverterError, EnumOrdinal, Enumerated,
    LocalizedConverter, TargetType, TypeConverter, TypeConverterRegistry,
};
pub use engine::{CustomValidator, FieldValues, RequiredScope, ValidationEngine, ValidationState};
pub use error::{ErrorKind, ErrorMessage, ValidationError, ValidationErrors, GLOBAL_ERROR_KEY};
pub use locale::Locale;
pub use message::{format_message, LocalizationProvider, MapLocalizationProvider};
pub use rules::ValidationRules;
pub use spec::{strip_indexes, EventScope, FieldValidationSpec, SpecError, ValidationSpecSet};
