//! Shared implementation of the `Event` and `Command` derives.
//!
//! Both derives generate the same three pieces:
//!
//! 1. `impl Named`: the stable message name as an associated const
//! 2. `impl Event` / `impl Command`: name accessor and `as_any`
//! 3. for events only, `to_payload` delegating to `serde_json::to_value`
//!
//! Generated paths go through `::herald_core`, which re-exports `serde_json`
//! under `__private` so downstream crates do not need their own dependency.

use proc_macro2::TokenStream;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, spanned::Spanned};

/// Which message trait is being derived.
#[derive(Clone, Copy)]
pub enum MessageKind {
    Event,
    Command,
}

impl MessageKind {
    fn attr_name(self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Command => "command",
        }
    }

    fn derive_name(self) -> &'static str {
        match self {
            Self::Event => "Event",
            Self::Command => "Command",
        }
    }
}

pub fn derive_message(input: &DeriveInput, kind: MessageKind) -> syn::Result<TokenStream> {
    if let Data::Union(_) = input.data {
        return Err(syn::Error::new(
            input.span(),
            format!("{} cannot be derived for unions", kind.derive_name()),
        ));
    }

    let ident = &input.ident;
    let message_name = parse_name(&input.attrs, kind)?.unwrap_or_else(|| ident.to_string());
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let named = quote! {
        impl #impl_generics ::herald_core::Named for #ident #ty_generics #where_clause {
            const NAME: &'static str = #message_name;
        }
    };

    let message_impl = match kind {
        MessageKind::Event => quote! {
            impl #impl_generics ::herald_core::Event for #ident #ty_generics #where_clause {
                fn event_name(&self) -> &'static str {
                    #message_name
                }

                fn as_any(&self) -> &dyn ::core::any::Any {
                    self
                }

                fn to_payload(
                    &self,
                ) -> ::herald_core::__private::serde_json::Result<
                    ::herald_core::__private::serde_json::Value,
                > {
                    ::herald_core::__private::serde_json::to_value(self)
                }
            }
        },
        MessageKind::Command => quote! {
            impl #impl_generics ::herald_core::Command for #ident #ty_generics #where_clause {
                fn command_name(&self) -> &'static str {
                    #message_name
                }

                fn as_any(&self) -> &dyn ::core::any::Any {
                    self
                }
            }
        },
    };

    Ok(quote! {
        #named
        #message_impl
    })
}

/// Reads `#[event(name = "...")]` / `#[command(name = "...")]`.
fn parse_name(attrs: &[Attribute], kind: MessageKind) -> syn::Result<Option<String>> {
    let mut name = None;

    for attr in attrs {
        if !attr.path().is_ident(kind.attr_name()) {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let value = meta.value()?.parse::<syn::LitStr>()?.value();
                if value.is_empty() {
                    return Err(meta.error("message name cannot be empty"));
                }
                name = Some(value);
                Ok(())
            } else {
                Err(meta.error(format!(
                    "unknown `{}` attribute key, expected `name`",
                    kind.attr_name()
                )))
            }
        })?;
    }

    Ok(name)
}
