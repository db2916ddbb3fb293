use crate::attrs::{RenameRule, parse_container_attrs, parse_variant_name};
use proc_macro2::TokenStream;
use proc_macro_error2::abort;
use quote::quote;
use syn::{Data, DeriveInput, Fields};

pub fn expand_derive_option_enum(input: &DeriveInput) -> TokenStream {
    let enum_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let Data::Enum(data) = &input.data else {
        abort!(input, "OptionEnum can only be derived for enums");
    };

    let container = parse_container_attrs(&input.attrs);
    if container.wrap.is_some() {
        abort!(input, "`wrap` is only valid on RequestOptions structs");
    }
    let rule = container.rename_all.unwrap_or(RenameRule::Snake);

    let arms = data.variants.iter().map(|variant| {
        if !matches!(variant.fields, Fields::Unit) {
            abort!(variant, "OptionEnum variants must be unit variants");
        }
        let ident = &variant.ident;
        let name = parse_variant_name(&variant.attrs)
            .unwrap_or_else(|| rule.apply(&ident.to_string()));
        quote! { Self::#ident => #name }
    });

    quote! {
        impl #impl_generics ::stratus_core::options::OptionEnum for #enum_name #ty_generics #where_clause {
            fn external_name(&self) -> &'static str {
                match self {
                    #(#arms,)*
                }
            }
        }

        impl #impl_generics ::stratus_core::options::ToFieldValue for #enum_name #ty_generics #where_clause {
            fn to_field_value(&self) -> ::stratus_core::options::FieldValue {
                ::stratus_core::options::FieldValue::Enum(
                    ::stratus_core::options::OptionEnum::external_name(self),
                )
            }
        }
    }
}
