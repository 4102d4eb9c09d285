//! Procedural macros for the fninvoke function runtime.
//!
//! This crate provides the `#[function]` attribute macro, which turns an
//! async fn into a function type that can be registered by identifier.
//!
//! # Example
//!
//! ```ignore
//! use fninvoke::prelude::*;
//!
//! #[function(id = "orders", kind = "open")]
//! async fn orders(ctx: &mut InvocationContext, payload: &str) -> Result<Option<Out>, FunctionError> {
//!     ctx.send("notify", payload).await.map_err(|e| FunctionError::new(e.to_string()))?;
//!     Ok(None)
//! }
//!
//! registry.register(OrdersFunction::ID, OrdersFunction.into_function()).await?;
//! ```

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{parse_macro_input, punctuated::Punctuated, Expr, ExprLit, ItemFn, Lit, Meta, Token};

/// Signature variant the annotated fn implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Open,
    Http,
    CloudEvent,
}

impl Kind {
    fn parse(value: &str, span: &Lit) -> syn::Result<Self> {
        match value {
            "open" => Ok(Kind::Open),
            "http" => Ok(Kind::Http),
            "cloudevent" => Ok(Kind::CloudEvent),
            other => Err(syn::Error::new_spanned(
                span,
                format!("unknown function kind '{}', expected open, http or cloudevent", other),
            )),
        }
    }
}

/// Attributes for the `#[function]` macro.
#[derive(Default, Debug)]
struct FunctionAttrs {
    /// Registration identifier.
    id: Option<String>,
    kind: Option<Kind>,
    /// Path prefix, raw-HTTP functions only.
    path: Option<String>,
}

impl FunctionAttrs {
    fn parse_meta_list(metas: Punctuated<Meta, Token![,]>) -> syn::Result<Self> {
        let mut attrs = FunctionAttrs::default();

        for meta in metas {
            let nv = match meta {
                Meta::NameValue(nv) => nv,
                other => return Err(syn::Error::new_spanned(other, "expected name = value")),
            };
            let ident = nv
                .path
                .get_ident()
                .ok_or_else(|| syn::Error::new_spanned(&nv.path, "expected identifier"))?
                .to_string();

            let lit = match &nv.value {
                Expr::Lit(ExprLit { lit, .. }) => lit.clone(),
                _ => return Err(syn::Error::new_spanned(&nv.value, "expected literal")),
            };
            let value = match &lit {
                Lit::Str(lit_str) => lit_str.value(),
                _ => return Err(syn::Error::new_spanned(&lit, "expected string literal")),
            };

            match ident.as_str() {
                "id" => attrs.id = Some(value),
                "kind" => attrs.kind = Some(Kind::parse(&value, &lit)?),
                "path" => attrs.path = Some(value),
                _ => {
                    return Err(syn::Error::new_spanned(
                        nv.path,
                        format!("unknown attribute: {}", ident),
                    ));
                }
            }
        }

        Ok(attrs)
    }
}

/// Turn an async fn into a registrable function type.
///
/// For `async fn orders(..)` this generates a unit struct `OrdersFunction`
/// with an `ID` constant and an `into_function()` constructor, and
/// implements the trait matching `kind`:
///
/// - `open`: `async fn(&mut InvocationContext, &str) -> Result<Option<Out>, FunctionError>`
/// - `http`: `async fn(&mut InvocationContext) -> Result<(), FunctionError>`
/// - `cloudevent`: `async fn(&mut InvocationContext, &CloudEvent) -> Result<(), FunctionError>`
///
/// # Attributes
///
/// - `id` (required): registration identifier
/// - `kind` (optional): `open` (default), `http` or `cloudevent`
/// - `path` (optional, `http` only): path prefix the function is served under
#[proc_macro_attribute]
pub fn function(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = parse_macro_input!(args with Punctuated::<Meta, Token![,]>::parse_terminated);
    let input_fn = parse_macro_input!(input as ItemFn);

    match generate_function(args, input_fn) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn generate_function(
    args: Punctuated<Meta, Token![,]>,
    input_fn: ItemFn,
) -> syn::Result<proc_macro2::TokenStream> {
    let attrs = FunctionAttrs::parse_meta_list(args)?;

    let function_id = attrs.id.ok_or_else(|| {
        syn::Error::new(
            proc_macro2::Span::call_site(),
            "missing required attribute: id",
        )
    })?;
    let kind = attrs.kind.unwrap_or(Kind::Open);

    if input_fn.sig.asyncness.is_none() {
        return Err(syn::Error::new_spanned(&input_fn.sig, "function must be async"));
    }
    if attrs.path.is_some() && kind != Kind::Http {
        return Err(syn::Error::new(
            proc_macro2::Span::call_site(),
            "path is only supported for kind = \"http\"",
        ));
    }

    let fn_name = &input_fn.sig.ident;
    let fn_vis = &input_fn.vis;
    let struct_name = format_ident!("{}Function", to_pascal_case(&fn_name.to_string()));

    let (trait_impl, constructor) = match kind {
        Kind::Open => (
            quote! {
                impl ::fninvoke::function::OpenFunction for #struct_name {
                    async fn accept(
                        &self,
                        ctx: &mut ::fninvoke::context::InvocationContext,
                        payload: &str,
                    ) -> ::std::result::Result<
                        ::std::option::Option<::fninvoke::context::Out>,
                        ::fninvoke::function::FunctionError,
                    > {
                        #fn_name(ctx, payload).await
                    }
                }
            },
            quote! { ::fninvoke::function::Function::open(self) },
        ),
        Kind::Http => {
            let path = attrs.path.map(|path| {
                quote! {
                    fn path(&self) -> &str {
                        #path
                    }
                }
            });
            (
                quote! {
                    impl ::fninvoke::function::HttpFunction for #struct_name {
                        async fn service(
                            &self,
                            ctx: &mut ::fninvoke::context::InvocationContext,
                        ) -> ::std::result::Result<(), ::fninvoke::function::FunctionError> {
                            #fn_name(ctx).await
                        }

                        #path
                    }
                },
                quote! { ::fninvoke::function::Function::http(self) },
            )
        }
        Kind::CloudEvent => (
            quote! {
                impl ::fninvoke::function::CloudEventFunction for #struct_name {
                    async fn accept(
                        &self,
                        ctx: &mut ::fninvoke::context::InvocationContext,
                        event: &::fninvoke::context::CloudEvent,
                    ) -> ::std::result::Result<(), ::fninvoke::function::FunctionError> {
                        #fn_name(ctx, event).await
                    }
                }
            },
            quote! { ::fninvoke::function::Function::cloud_event(self) },
        ),
    };

    Ok(quote! {
        #input_fn

        /// Generated function type.
        #[derive(Debug, Default, Clone, Copy)]
        #fn_vis struct #struct_name;

        impl #struct_name {
            /// Registration identifier.
            pub const ID: &'static str = #function_id;

            /// Wrap this function for registration.
            pub fn into_function(self) -> ::fninvoke::function::Function {
                #constructor
            }
        }

        #[::fninvoke::prelude::async_trait]
        #trait_impl
    })
}

/// Convert a snake_case string to PascalCase.
fn to_pascal_case(s: &str) -> String {
    s.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                None => String::new(),
                Some(first) => first.to_uppercase().chain(chars).collect(),
            }
        })
        .collect()
}
