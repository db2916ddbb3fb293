use crate::attrs::{parse_container_attrs, parse_field_attrs};
use proc_macro2::TokenStream;
use proc_macro_error2::abort;
use quote::quote;
use syn::ext::IdentExt;
use syn::{Data, DeriveInput, Fields};

pub fn expand_derive_request_options(input: &DeriveInput) -> TokenStream {
    let struct_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => abort!(input, "RequestOptions only supports structs with named fields"),
        },
        _ => abort!(
            input,
            "RequestOptions can only be derived for structs; use OptionEnum for enums"
        ),
    };

    let container = parse_container_attrs(&input.attrs);

    let mut seen_query = std::collections::HashSet::new();
    let mut entries = Vec::with_capacity(fields.len());
    for field in fields {
        let Some(field_ident) = field.ident.as_ref() else {
            abort!(field, "RequestOptions requires named fields");
        };
        let attrs = parse_field_attrs(&field.attrs);
        let name = field_ident.unraw().to_string();

        if let Some(query) = &attrs.query
            && !seen_query.insert(query.clone())
        {
            abort!(field, "duplicate query name `{}`", query);
        }

        let body = if attrs.skip_body {
            None
        } else {
            match (&attrs.body, &attrs.query) {
                (Some(body), _) => Some(body.clone()),
                (None, Some(_)) => None,
                (None, None) => Some(name.clone()),
            }
        };
        let body = option_str(body.as_deref());
        let query = option_str(attrs.query.as_deref());
        let required = attrs.required;
        let omit_zero = attrs.omit_zero;
        let default = match &attrs.default {
            Some(tokens) => quote! { ::core::option::Option::Some(#tokens) },
            None => quote! { ::core::option::Option::None },
        };

        entries.push(quote! {
            ::stratus_core::options::Field::new(
                ::stratus_core::options::FieldSpec {
                    name: #name,
                    body: #body,
                    query: #query,
                    required: #required,
                    omit_zero: #omit_zero,
                    default: #default,
                },
                ::stratus_core::options::ToFieldValue::to_field_value(&self.#field_ident),
            )
        });
    }

    let wrap = option_str(container.wrap.as_deref());

    quote! {
        impl #impl_generics ::stratus_core::options::RequestOptions for #struct_name #ty_generics #where_clause {
            fn fields(&self) -> ::std::vec::Vec<::stratus_core::options::Field> {
                ::std::vec![#(#entries),*]
            }

            fn body_wrap(&self) -> ::core::option::Option<&'static str> {
                #wrap
            }
        }

        impl #impl_generics ::stratus_core::options::ToFieldValue for #struct_name #ty_generics #where_clause {
            fn to_field_value(&self) -> ::stratus_core::options::FieldValue {
                ::stratus_core::options::FieldValue::Record(
                    ::stratus_core::options::RequestOptions::fields(self),
                )
            }
        }
    }
}

fn option_str(value: Option<&str>) -> TokenStream {
    match value {
        Some(v) => quote! { ::core::option::Option::Some(#v) },
        None => quote! { ::core::option::Option::None },
    }
}
