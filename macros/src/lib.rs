extern crate proc_macro;

macro_rules! bail {
    ($item:expr, $fmt:literal $($tts:tt)*) => {
        return Err(Error::new_spanned(
            &$item,
            format!(concat!("recall: ", $fmt) $($tts)*)
        ))
    }
}

mod memoize;
mod utils;

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_quote, Error, Result};

/// Memoize a pure free function.
///
/// The function's arguments together form the cache key. They must be owned
/// values that are `Hash + Eq + Clone + Send + 'static` and the return type
/// must be `Clone + Send + 'static`. The cache is shared by all threads.
///
/// ```ignore
/// #[recall::memoize]
/// fn fib(n: u64) -> u64 {
///     if n <= 2 { 1 } else { fib(n - 1) + fib(n - 2) }
/// }
/// ```
///
/// The retention policy is configured with optional arguments, each taking an
/// expression. `clock` replaces the time source used for expiration.
///
/// ```ignore
/// use std::time::Duration;
///
/// #[recall::memoize(capacity = 256, expiration = Duration::from_secs(60))]
/// fn describe(width: u32, height: u32) -> String {
///     format!("{width}x{height}")
/// }
/// ```
#[proc_macro_attribute]
pub fn memoize(args: TokenStream, stream: TokenStream) -> TokenStream {
    let options = syn::parse_macro_input!(args as memoize::Options);
    let func = syn::parse_macro_input!(stream as syn::ItemFn);
    memoize::expand(options, func)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}
