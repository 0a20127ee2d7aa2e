//! Procedural macros for the wirebus event transport.
//!
//! - `#[derive(EventKind)]`: maps a fieldless enum onto the event UID space.
//!   Generates `wirebus::EventKind` (uid, name, from_uid) together with
//!   `From<Kind> for wirebus::Uid` and `From<Kind> for wirebus::Subscription`.
//!
//! Usage:
//! ```rust,ignore
//! use wirebus::EventKind;
//!
//! #[derive(Clone, Copy, Debug, PartialEq, Eq, EventKind)]
//! #[repr(u8)]
//! enum GameEvent {
//!     LuaError = 1,
//!     EntitySelected,
//!     EntityDeselected,
//! }
//! ```
use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, parse_macro_input};

#[proc_macro_derive(EventKind)]
pub fn derive_event_kind(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let ident = input.ident.clone();

    let data_enum = match &input.data {
        Data::Enum(data_enum) => data_enum,
        _ => {
            return syn::Error::new_spanned(&input.ident, "EventKind can only be derived for enums")
                .to_compile_error()
                .into();
        }
    };

    if !input.generics.params.is_empty() {
        return syn::Error::new_spanned(&input.generics, "EventKind enums cannot be generic")
            .to_compile_error()
            .into();
    }

    // The UID is the variant's discriminant, so every variant must be a unit.
    if let Some(variant) = data_enum
        .variants
        .iter()
        .find(|v| !matches!(v.fields, Fields::Unit))
    {
        return syn::Error::new_spanned(
            &variant.ident,
            "EventKind variants must not carry fields",
        )
        .to_compile_error()
        .into();
    }

    let variants: Vec<_> = data_enum.variants.iter().map(|v| &v.ident).collect();
    let names: Vec<_> = variants.iter().map(|v| v.to_string()).collect();

    let expanded = quote! {
        impl wirebus::EventKind for #ident {
            fn uid(&self) -> wirebus::Uid {
                match self {
                    #(Self::#variants => wirebus::Uid::new(Self::#variants as u8)),*
                }
            }

            fn name(&self) -> &'static str {
                match self {
                    #(Self::#variants => #names),*
                }
            }

            fn from_uid(uid: wirebus::Uid) -> ::core::option::Option<Self> {
                #(
                    if uid.get() == Self::#variants as u8 {
                        return ::core::option::Option::Some(Self::#variants);
                    }
                )*
                ::core::option::Option::None
            }
        }

        impl ::core::convert::From<#ident> for wirebus::Uid {
            fn from(kind: #ident) -> Self {
                wirebus::EventKind::uid(&kind)
            }
        }

        impl ::core::convert::From<#ident> for wirebus::Subscription {
            fn from(kind: #ident) -> Self {
                wirebus::Subscription::Uid(wirebus::EventKind::uid(&kind))
            }
        }
    };

    TokenStream::from(expanded)
}
