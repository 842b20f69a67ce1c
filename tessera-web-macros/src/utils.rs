//! 宏辅助工具函数

use proc_macro_error::abort;
use syn::{Expr, ExprLit, GenericArgument, Ident, Lit, PathArguments, Type, UnOp};

/// 字段名转属性名：`number_one` -> `numberOne`
pub fn property_name(ident: &Ident) -> String {
    let raw = ident.to_string();
    let name = raw.strip_prefix("r#").unwrap_or(&raw);

    let mut result = String::with_capacity(name.len());
    let mut upper_next = false;
    for ch in name.trim_start_matches('_').chars() {
        if ch == '_' {
            upper_next = true;
        } else if upper_next {
            result.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            result.push(ch);
        }
    }
    result
}

/// 容器类型中的 bean 类型：`Option<Vec<Item>>` -> `Item`，映射取值类型
pub fn inner_bean_type(ty: &Type) -> &Type {
    let Type::Path(type_path) = ty else {
        return ty;
    };
    let Some(segment) = type_path.path.segments.last() else {
        return ty;
    };
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return ty;
    };

    let mut types = args.args.iter().filter_map(|arg| match arg {
        GenericArgument::Type(ty) => Some(ty),
        _ => None,
    });

    let inner = match segment.ident.to_string().as_str() {
        "Option" | "Box" | "Vec" => types.next(),
        "HashMap" | "BTreeMap" => types.last(),
        _ => None,
    };

    match inner {
        Some(inner) => inner_bean_type(inner),
        None => ty,
    }
}

/// 数值字面量（可带负号）
pub fn numeric_literal(expr: &Expr) -> f64 {
    match expr {
        Expr::Lit(ExprLit {
            lit: Lit::Int(lit), ..
        }) => lit
            .base10_parse::<f64>()
            .unwrap_or_else(|e| abort!(lit.span(), "invalid number: {}", e)),
        Expr::Lit(ExprLit {
            lit: Lit::Float(lit),
            ..
        }) => lit
            .base10_parse::<f64>()
            .unwrap_or_else(|e| abort!(lit.span(), "invalid number: {}", e)),
        Expr::Unary(unary) if matches!(unary.op, UnOp::Neg(_)) => -numeric_literal(&unary.expr),
        Expr::Paren(paren) => numeric_literal(&paren.expr),
        Expr::Group(group) => numeric_literal(&group.expr),
        other => abort!(other, "expected a numeric literal"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quote::format_ident;

    #[test]
    fn test_property_name() {
        assert_eq!(property_name(&format_ident!("number_one")), "numberOne");
        assert_eq!(property_name(&format_ident!("user")), "user");
        assert_eq!(property_name(&format_ident!("r#type")), "type");
    }

    #[test]
    fn test_inner_bean_type() {
        let ty: Type = syn::parse_quote!(Option<Vec<LineItem>>);
        let expected: Type = syn::parse_quote!(LineItem);
        assert_eq!(inner_bean_type(&ty), &expected);

        let ty: Type = syn::parse_quote!(HashMap<String, Box<Address>>);
        let expected: Type = syn::parse_quote!(Address);
        assert_eq!(inner_bean_type(&ty), &expected);
    }

    #[test]
    fn test_numeric_literal() {
        let expr: Expr = syn::parse_quote!(-2.5);
        assert_eq!(numeric_literal(&expr), -2.5);
        let expr: Expr = syn::parse_quote!(10);
        assert_eq!(numeric_literal(&expr), 10.0);
    }
}
