//! Bean 派生宏实现

use proc_macro2::TokenStream;
use proc_macro_error::abort;
use quote::{format_ident, quote};
use syn::spanned::Spanned;
use syn::{Attribute, Data, DataStruct, DeriveInput, Expr, Field, Fields, LitInt, LitStr};

use crate::utils;

/// 结构体级别的 `#[bean(...)]`
#[derive(Default)]
struct BeanOptions {
    no_default: bool,
}

impl BeanOptions {
    fn from_attrs(attrs: &[Attribute]) -> Self {
        let mut options = Self::default();
        for attr in attrs.iter().filter(|a| a.path().is_ident("bean")) {
            let result = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("no_default") {
                    options.no_default = true;
                    Ok(())
                } else {
                    Err(meta.error("unsupported bean option, expected `no_default`"))
                }
            });
            if let Err(error) = result {
                abort!(error.span(), "{}", error);
            }
        }
        options
    }
}

/// 一条 `#[validate(...)]` 声明
#[derive(Default)]
struct ValidateAttr {
    field: Option<String>,
    required: bool,
    min_length: Option<usize>,
    max_length: Option<usize>,
    min_value: Option<f64>,
    max_value: Option<f64>,
    pattern: Option<String>,
    on: Vec<String>,
    nested: bool,
}

impl ValidateAttr {
    fn parse(attr: &Attribute) -> Self {
        let mut rule = Self::default();
        let result = attr.parse_nested_meta(|meta| {
            let Some(ident) = meta.path.get_ident() else {
                return Err(meta.error("expected a validation rule name"));
            };

            match ident.to_string().as_str() {
                "required" => rule.required = true,
                "nested" => rule.nested = true,
                "min_length" => {
                    let lit: LitInt = meta.value()?.parse()?;
                    rule.min_length = Some(lit.base10_parse()?);
                }
                "max_length" => {
                    let lit: LitInt = meta.value()?.parse()?;
                    rule.max_length = Some(lit.base10_parse()?);
                }
                "min_value" => {
                    let expr: Expr = meta.value()?.parse()?;
                    rule.min_value = Some(utils::numeric_literal(&expr));
                }
                "max_value" => {
                    let expr: Expr = meta.value()?.parse()?;
                    rule.max_value = Some(utils::numeric_literal(&expr));
                }
                "pattern" => {
                    let lit: LitStr = meta.value()?.parse()?;
                    rule.pattern = Some(lit.value());
                }
                "on" => {
                    let lit: LitStr = meta.value()?.parse()?;
                    rule.on = lit
                        .value()
                        .split(',')
                        .map(str::trim)
                        .filter(|e| !e.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                "field" => {
                    let lit: LitStr = meta.value()?.parse()?;
                    rule.field = Some(lit.value());
                }
                other => {
                    return Err(meta.error(format!("unknown validation rule `{}`", other)));
                }
            }
            Ok(())
        });

        if let Err(error) = result {
            abort!(error.span(), "{}", error);
        }
        if let (Some(min), Some(max)) = (rule.min_length, rule.max_length) {
            if min > max {
                abort!(attr, "min_length {} is greater than max_length {}", min, max);
            }
        }
        rule
    }

    fn has_rules(&self) -> bool {
        self.required
            || self.min_length.is_some()
            || self.max_length.is_some()
            || self.min_value.is_some()
            || self.max_value.is_some()
            || self.pattern.is_some()
    }

    fn spec_tokens(&self, property: &str) -> TokenStream {
        let path = match &self.field {
            Some(sub) => format!("{}.{}", property, sub),
            None => property.to_string(),
        };

        let mut spec = quote! { __tessera::FieldValidationSpec::new(#path) };
        if self.required {
            spec = quote! { #spec.required() };
        }
        if let Some(min) = self.min_length {
            spec = quote! { #spec.min_length(#min) };
        }
        if let Some(max) = self.max_length {
            spec = quote! { #spec.max_length(#max) };
        }
        if let Some(min) = self.min_value {
            spec = quote! { #spec.min_value(#min) };
        }
        if let Some(max) = self.max_value {
            spec = quote! { #spec.max_value(#max) };
        }
        if let Some(pattern) = &self.pattern {
            spec = quote! { #spec.pattern(#pattern) };
        }
        if !self.on.is_empty() {
            let events = &self.on;
            spec = quote! { #spec.on([#(#events),*]) };
        }
        spec
    }
}

/// 字段级别的 `#[bean(...)]`
struct FieldOptions {
    rename: Option<String>,
    skip: bool,
}

impl FieldOptions {
    fn from_field(field: &Field) -> Self {
        let mut options = Self {
            rename: None,
            skip: false,
        };
        for attr in field.attrs.iter().filter(|a| a.path().is_ident("bean")) {
            let result = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("skip") {
                    options.skip = true;
                    Ok(())
                } else if meta.path.is_ident("rename") {
                    let lit: LitStr = meta.value()?.parse()?;
                    options.rename = Some(lit.value());
                    Ok(())
                } else {
                    Err(meta.error("unsupported bean option, expected `rename` or `skip`"))
                }
            });
            if let Err(error) = result {
                abort!(error.span(), "{}", error);
            }
        }
        options
    }
}

pub fn derive_bean_impl(input: &DeriveInput) -> TokenStream {
    let name = &input.ident;
    let name_str = name.to_string();

    if !input.generics.params.is_empty() {
        abort!(
            input.generics.span(),
            "#[derive(Bean)] does not support generic types"
        );
    }

    let fields = match &input.data {
        Data::Struct(DataStruct {
            fields: Fields::Named(named),
            ..
        }) => &named.named,
        _ => abort!(name, "#[derive(Bean)] requires a struct with named fields"),
    };

    let options = BeanOptions::from_attrs(&input.attrs);

    let mut accessors = Vec::new();
    let mut properties = Vec::new();
    let mut specs = Vec::new();
    let mut nests = Vec::new();

    for field in fields {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let field_options = FieldOptions::from_field(field);
        if field_options.skip {
            continue;
        }

        let property = field_options
            .rename
            .unwrap_or_else(|| utils::property_name(ident));
        let ty = &field.ty;
        let getter = format_ident!("__get_{}", ident);
        let getter_mut = format_ident!("__get_{}_mut", ident);

        accessors.push(quote! {
            fn #getter(bean: &#name) -> &dyn __tessera::Property {
                &bean.#ident
            }

            fn #getter_mut(bean: &mut #name) -> &mut dyn __tessera::Property {
                &mut bean.#ident
            }
        });
        properties.push(quote! { .property(#property, #getter, #getter_mut) });

        for attr in field.attrs.iter().filter(|a| a.path().is_ident("validate")) {
            let rule = ValidateAttr::parse(attr);
            if rule.nested {
                if rule.field.is_some() {
                    abort!(attr, "`nested` cannot be combined with `field`");
                }
                let inner = utils::inner_bean_type(ty);
                nests.push(quote! {
                    set.nest(#property, &<#inner as __tessera::Bean>::validation_spec_set()?);
                });
            }
            if rule.has_rules() || (!rule.nested && !rule.on.is_empty()) {
                specs.push(rule.spec_tokens(&property));
            }
        }
    }

    let instantiate = if options.no_default {
        quote! { ::core::option::Option::None }
    } else {
        quote! { ::core::option::Option::Some(<Self as ::core::default::Default>::default()) }
    };

    quote! {
        const _: () = {
            use ::tessera_web::__private as __tessera;

            impl __tessera::Property for #name {
                fn type_name(&self) -> &'static str {
                    #name_str
                }

                fn navigate(
                    &mut self,
                    segment: &__tessera::Segment,
                    _cx: &__tessera::BindContext<'_>,
                ) -> ::core::result::Result<&mut dyn __tessera::Property, __tessera::PropertyError> {
                    __tessera::navigate_bean(self, segment)
                }

                fn inspect(
                    &self,
                    segment: &__tessera::Segment,
                ) -> ::core::option::Option<&dyn __tessera::Property> {
                    __tessera::inspect_bean(self, segment)
                }

                fn assign(
                    &mut self,
                    _values: &[::std::string::String],
                    _cx: &__tessera::BindContext<'_>,
                ) -> ::core::result::Result<
                    ::std::vec::Vec<__tessera::ConversionFailure>,
                    __tessera::PropertyError,
                > {
                    ::core::result::Result::Err(__tessera::PropertyError::NotAssignable {
                        type_name: #name_str,
                    })
                }

                fn snapshot(&self) -> __tessera::Value {
                    __tessera::snapshot_bean(self)
                }

                fn as_any(&self) -> &dyn __tessera::Any {
                    self
                }

                fn as_any_mut(&mut self) -> &mut dyn __tessera::Any {
                    self
                }

                fn instantiate() -> ::core::option::Option<Self> {
                    #instantiate
                }
            }

            impl __tessera::Bean for #name {
                fn descriptor() -> &'static __tessera::BeanDescriptor<Self> {
                    #(#accessors)*

                    static DESCRIPTOR: __tessera::OnceLock<__tessera::BeanDescriptor<#name>> =
                        __tessera::OnceLock::new();
                    DESCRIPTOR.get_or_init(|| {
                        __tessera::BeanDescriptor::new(#name_str)
                            #(#properties)*
                    })
                }

                fn validation_spec_set() -> ::core::result::Result<
                    __tessera::ValidationSpecSet,
                    __tessera::SpecError,
                > {
                    let specs: ::std::vec::Vec<__tessera::FieldValidationSpec> = ::std::vec![#(#specs),*];
                    #[allow(unused_mut)]
                    let mut set = __tessera::ValidationSpecSet::build(specs)?;
                    #(#nests)*
                    ::core::result::Result::Ok(set)
                }
            }
        };
    }
}
