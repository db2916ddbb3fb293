use heck::{
    ToKebabCase, ToLowerCamelCase, ToShoutySnakeCase, ToSnakeCase, ToUpperCamelCase,
};
use proc_macro2::{Literal, TokenStream};
use proc_macro_error2::abort;
use quote::quote;
use syn::spanned::Spanned;
use syn::{Attribute, Expr, ExprLit, ExprUnary, Lit, LitStr, UnOp};

/// Parsed `#[options(...)]` on a struct field.
#[derive(Default)]
pub struct FieldAttrs {
    pub body: Option<String>,
    pub query: Option<String>,
    pub skip_body: bool,
    pub required: bool,
    pub omit_zero: bool,
    pub default: Option<TokenStream>,
}

/// Parsed `#[options(...)]` on a struct or enum.
#[derive(Default)]
pub struct ContainerAttrs {
    pub wrap: Option<String>,
    pub rename_all: Option<RenameRule>,
}

#[derive(Clone, Copy)]
pub enum RenameRule {
    Lower,
    Upper,
    Snake,
    ScreamingSnake,
    Kebab,
    Pascal,
    Camel,
}

impl RenameRule {
    fn parse(lit: &LitStr) -> Self {
        match lit.value().as_str() {
            "lowercase" => Self::Lower,
            "UPPERCASE" => Self::Upper,
            "snake_case" => Self::Snake,
            "SCREAMING_SNAKE_CASE" => Self::ScreamingSnake,
            "kebab-case" => Self::Kebab,
            "PascalCase" => Self::Pascal,
            "camelCase" => Self::Camel,
            other => abort!(lit, "unknown rename rule `{}`", other),
        }
    }

    pub fn apply(self, ident: &str) -> String {
        match self {
            Self::Lower => ident.to_lowercase(),
            Self::Upper => ident.to_uppercase(),
            Self::Snake => ident.to_snake_case(),
            Self::ScreamingSnake => ident.to_shouty_snake_case(),
            Self::Kebab => ident.to_kebab_case(),
            Self::Pascal => ident.to_upper_camel_case(),
            Self::Camel => ident.to_lower_camel_case(),
        }
    }
}

fn options_attrs(attrs: &[Attribute]) -> impl Iterator<Item = &Attribute> {
    attrs.iter().filter(|a| a.path().is_ident("options"))
}

pub fn parse_field_attrs(attrs: &[Attribute]) -> FieldAttrs {
    let mut out = FieldAttrs::default();
    for attr in options_attrs(attrs) {
        let result = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("body") {
                out.body = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("query") {
                out.query = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("skip_body") {
                out.skip_body = true;
            } else if meta.path.is_ident("required") {
                out.required = true;
            } else if meta.path.is_ident("omit_zero") {
                out.omit_zero = true;
            } else if meta.path.is_ident("default") {
                let expr: Expr = meta.value()?.parse()?;
                out.default = Some(default_tokens(&expr));
            } else {
                return Err(meta.error(
                    "expected one of: body, query, skip_body, required, omit_zero, default",
                ));
            }
            Ok(())
        });
        if let Err(err) = result {
            abort!(err.span(), "{}", err);
        }
    }

    if out.skip_body && out.body.is_some() {
        abort!(
            attrs.first().map_or_else(proc_macro2::Span::call_site, Spanned::span),
            "`skip_body` conflicts with `body = ...`"
        );
    }
    out
}

pub fn parse_container_attrs(attrs: &[Attribute]) -> ContainerAttrs {
    let mut out = ContainerAttrs::default();
    for attr in options_attrs(attrs) {
        let result = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("wrap") {
                out.wrap = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("rename_all") {
                out.rename_all = Some(RenameRule::parse(&meta.value()?.parse::<LitStr>()?));
            } else {
                return Err(meta.error("expected `wrap` or `rename_all`"));
            }
            Ok(())
        });
        if let Err(err) = result {
            abort!(err.span(), "{}", err);
        }
    }
    out
}

/// `#[options(name = "...")]` on an enum variant.
pub fn parse_variant_name(attrs: &[Attribute]) -> Option<String> {
    let mut name = None;
    for attr in options_attrs(attrs) {
        let result = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                name = Some(meta.value()?.parse::<LitStr>()?.value());
                Ok(())
            } else {
                Err(meta.error("expected `name = \"...\"`"))
            }
        });
        if let Err(err) = result {
            abort!(err.span(), "{}", err);
        }
    }
    name
}

/// Turn a default literal into a `DefaultValue` constructor.
fn default_tokens(expr: &Expr) -> TokenStream {
    match expr {
        Expr::Lit(ExprLit { lit, .. }) => literal_default(lit, false),
        Expr::Unary(ExprUnary {
            op: UnOp::Neg(_),
            expr,
            ..
        }) => match expr.as_ref() {
            Expr::Lit(ExprLit { lit, .. }) => literal_default(lit, true),
            other => abort!(other, "default must be a literal"),
        },
        other => abort!(other, "default must be a literal"),
    }
}

fn literal_default(lit: &Lit, negative: bool) -> TokenStream {
    match lit {
        Lit::Str(s) if !negative => {
            let value = s.value();
            quote! { ::stratus_core::options::DefaultValue::Str(#value) }
        }
        Lit::Bool(b) if !negative => {
            let value = b.value;
            quote! { ::stratus_core::options::DefaultValue::Bool(#value) }
        }
        Lit::Int(i) => {
            let parsed: i64 = match i.base10_parse() {
                Ok(v) => v,
                Err(err) => abort!(i, "{}", err),
            };
            let value = Literal::i64_suffixed(if negative { -parsed } else { parsed });
            quote! { ::stratus_core::options::DefaultValue::Int(#value) }
        }
        Lit::Float(f) => {
            let parsed: f64 = match f.base10_parse() {
                Ok(v) => v,
                Err(err) => abort!(f, "{}", err),
            };
            let value = Literal::f64_suffixed(if negative { -parsed } else { parsed });
            quote! { ::stratus_core::options::DefaultValue::Float(#value) }
        }
        other => abort!(other, "unsupported default literal"),
    }
}
