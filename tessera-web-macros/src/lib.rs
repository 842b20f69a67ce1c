//! Tessera Web Macros
//!
//! 提供 action bean 相关的派生宏：属性访问表、校验声明与枚举转换

mod bean;
mod enumerated;
mod utils;

use proc_macro::TokenStream;
use proc_macro_error::proc_macro_error;
use syn::{parse_macro_input, DeriveInput};

/// Bean 派生宏
///
/// 为结构体生成 `Property` 与 `Bean` 实现：按字段构建属性访问表（属性名为 camelCase），
/// 并把字段上的 `#[validate(...)]` 声明收集为校验规则。
///
/// # 字段属性
///
/// - `#[bean(rename = "name")]` - 自定义属性名
/// - `#[bean(skip)]` - 不参与绑定
/// - `#[validate(required, min_length = 5, max_length = 20, min_value = 0, max_value = 100.5, pattern = "^\\d+$", on = "save, !cancel")]`
/// - `#[validate(field = "username", required)]` - 声明嵌套属性的规则
/// - `#[validate(nested)]` - 合并嵌套 bean 自身的规则
///
/// # 结构体属性
///
/// - `#[bean(no_default)]` - 没有默认实例，作为中间对象时无法自动创建
///
/// # 示例
///
/// ```ignore
/// #[derive(Debug, Default, Bean)]
/// struct RegisterActionBean {
///     #[validate(nested)]
///     user: Option<User>,
///     #[validate(required, min_length = 5)]
///     confirm_password: Option<String>,
/// }
/// ```
#[proc_macro_error]
#[proc_macro_derive(Bean, attributes(bean, validate))]
pub fn derive_bean(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    bean::derive_bean_impl(&input).into()
}

/// Enumerated 派生宏
///
/// 为无字段枚举生成按名称转换（区分大小写）的实现，枚举值可以直接作为 bean 属性
///
/// ```ignore
/// #[derive(Debug, Clone, Copy, PartialEq, Enumerated)]
/// enum Priority {
///     Low,
///     High,
/// }
/// ```
#[proc_macro_error]
#[proc_macro_derive(Enumerated)]
pub fn derive_enumerated(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    enumerated::derive_enumerated_impl(&input).into()
}
