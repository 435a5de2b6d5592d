use syn::parse::{Parse, ParseStream};

use super::*;
use crate::utils::{parse_key_value, set_once};

mod kw {
    syn::custom_keyword!(capacity);
    syn::custom_keyword!(expiration);
    syn::custom_keyword!(clock);
}

/// The retention options in `#[memoize(...)]`.
#[derive(Default)]
pub struct Options {
    capacity: Option<syn::Expr>,
    expiration: Option<syn::Expr>,
    clock: Option<syn::Expr>,
}

impl Parse for Options {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut options = Options::default();
        while !input.is_empty() {
            if let Some(expr) = parse_key_value::<kw::capacity, syn::Expr>(input)? {
                set_once(&mut options.capacity, expr, "capacity", input)?;
            } else if let Some(expr) = parse_key_value::<kw::expiration, syn::Expr>(input)? {
                set_once(&mut options.expiration, expr, "expiration", input)?;
            } else if let Some(expr) = parse_key_value::<kw::clock, syn::Expr>(input)? {
                set_once(&mut options.clock, expr, "clock", input)?;
            } else {
                return Err(
                    input.error("recall: expected `capacity`, `expiration` or `clock`")
                );
            }
        }
        Ok(options)
    }
}

/// Memoize a function.
pub fn expand(options: Options, mut func: syn::ItemFn) -> Result<proc_macro2::TokenStream> {
    if let Some(asyncness) = &func.sig.asyncness {
        bail!(asyncness, "async functions are not supported");
    }

    if !func.sig.generics.params.is_empty() {
        bail!(func.sig.generics, "generic functions are not supported");
    }

    let mut args = vec![];
    let mut types = vec![];
    for input in &func.sig.inputs {
        let typed = match input {
            syn::FnArg::Typed(typed) => typed,
            syn::FnArg::Receiver(_) => {
                bail!(input, "methods are not supported")
            }
        };

        let name = match typed.pat.as_ref() {
            syn::Pat::Ident(syn::PatIdent {
                by_ref: None,
                mutability: None,
                ident,
                subpat: None,
                ..
            }) => ident,
            pat => bail!(pat, "only simple identifiers are supported"),
        };

        let ty = typed.ty.as_ref();
        match ty {
            syn::Type::Reference(_) => bail!(ty, "arguments must be owned values"),
            syn::Type::ImplTrait(_) => bail!(ty, "`impl Trait` arguments are not supported"),
            _ => {}
        }

        args.push(name);
        types.push(ty);
    }

    let output = match &func.sig.output {
        syn::ReturnType::Default => quote! { () },
        syn::ReturnType::Type(_, ty) => quote! { #ty },
    };

    // The arguments form a tuple that serves as the cache key.
    let arg_tuple = quote! { (#(#args,)*) };
    let key_type = quote! { (#(#types,)*) };

    // Construct assertions that the arguments and output fulfill the
    // necessary bounds.
    let bounds = types.iter().map(|ty| {
        quote! {
            ::recall::internal::assert_memoizable::<#ty>();
        }
    });

    let mut config = quote! { ::recall::Config::new() };
    if let Some(capacity) = &options.capacity {
        config = quote! { #config.with_capacity(#capacity) };
    }
    if let Some(expiration) = &options.expiration {
        config = quote! { #config.with_expiration(#expiration) };
    }
    if let Some(clock) = &options.clock {
        config = quote! { #config.with_clock(#clock) };
    }

    // Move the original body into a plain function that takes the key by
    // reference, and route the original function through a static cache.
    let body = &func.block;
    func.block = parse_quote! { {
        #(#bounds)*
        ::recall::internal::assert_output::<#output>();

        #[allow(unused_variables)]
        fn __recall_body(__recall_key: &#key_type) -> #output {
            let #arg_tuple = ::core::clone::Clone::clone(__recall_key);
            #body
        }

        static __RECALL_CACHE: ::recall::internal::LazyLock<
            ::recall::SyncMemoized<#key_type, #output, fn(&#key_type) -> #output>,
        > = ::recall::internal::LazyLock::new(|| {
            ::recall::SyncMemoized::new(
                __recall_body as fn(&#key_type) -> #output,
                #config,
            )
        });

        __RECALL_CACHE.call(#arg_tuple)
    } };

    Ok(quote! { #func })
}
