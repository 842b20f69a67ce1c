//! Enumerated 派生宏实现

use proc_macro2::TokenStream;
use proc_macro_error::abort;
use quote::quote;
use syn::{Data, DeriveInput, Fields};

pub fn derive_enumerated_impl(input: &DeriveInput) -> TokenStream {
    let name = &input.ident;
    let name_str = name.to_string();

    let Data::Enum(data) = &input.data else {
        abort!(name, "#[derive(Enumerated)] only supports enums");
    };
    if data.variants.is_empty() {
        abort!(name, "#[derive(Enumerated)] requires at least one variant");
    }
    if !input.generics.params.is_empty() {
        abort!(name, "#[derive(Enumerated)] does not support generic enums");
    }

    let mut idents = Vec::new();
    for variant in &data.variants {
        if !matches!(variant.fields, Fields::Unit) {
            abort!(variant, "enum variants must not carry fields");
        }
        idents.push(&variant.ident);
    }

    let names: Vec<String> = idents.iter().map(|i| i.to_string()).collect();
    let ordinals: Vec<usize> = (0..idents.len()).collect();

    quote! {
        const _: () = {
            use ::tessera_web::__private as __tessera;

            impl __tessera::Enumerated for #name {
                const NAMES: &'static [&'static str] = &[#(#names),*];

                fn from_ordinal(ordinal: usize) -> ::core::option::Option<Self> {
                    match ordinal {
                        #(#ordinals => ::core::option::Option::Some(Self::#idents),)*
                        _ => ::core::option::Option::None,
                    }
                }

                fn name(&self) -> &'static str {
                    match self {
                        #(Self::#idents => #names,)*
                    }
                }
            }

            impl __tessera::Convertible for #name {
                fn target_type() -> __tessera::TargetType {
                    __tessera::TargetType::enumeration::<Self>(
                        <Self as __tessera::Enumerated>::NAMES,
                    )
                }

                fn from_converted(value: __tessera::Converted) -> ::core::option::Option<Self> {
                    __tessera::enum_from_converted::<Self>(value)
                }
            }

            impl __tessera::Property for #name {
                fn type_name(&self) -> &'static str {
                    #name_str
                }

                fn assign(
                    &mut self,
                    values: &[::std::string::String],
                    cx: &__tessera::BindContext<'_>,
                ) -> ::core::result::Result<
                    ::std::vec::Vec<__tessera::ConversionFailure>,
                    __tessera::PropertyError,
                > {
                    __tessera::assign_scalar(self, values, cx)
                }

                fn snapshot(&self) -> __tessera::Value {
                    __tessera::Value::String(
                        ::std::string::ToString::to_string(
                            <Self as __tessera::Enumerated>::name(self),
                        ),
                    )
                }

                fn as_any(&self) -> &dyn __tessera::Any {
                    self
                }

                fn as_any_mut(&mut self) -> &mut dyn __tessera::Any {
                    self
                }

                fn instantiate() -> ::core::option::Option<Self> {
                    <Self as __tessera::Enumerated>::from_ordinal(0)
                }
            }
        };
    }
}
