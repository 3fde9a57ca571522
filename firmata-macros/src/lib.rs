//! Defines firmata-host runtime macros.

#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]

extern crate proc_macro;

use proc_macro::TokenStream;

use crate::runtime_macro::{runtime_macro, TokioMode};

mod helpers;
mod runtime_macro;

/// Macro definition for the firmata-host runtime.
///
/// This macro should be used once only in a project, on an `async` function.
///
/// _Runs the function in a Tokio runtime and waits, before returning, for every task spawned
/// through `task::run` (the background reading of a board, the handshake timers, etc.)._
///
/// # Example
/// ```
/// #[firmata_host::runtime]
/// async fn main() {
///     // whatever
/// }
/// ```
///
/// The function must be `async`:
/// ```compile_fail
/// #[firmata_host::runtime]
/// fn main() {}
/// ```
#[proc_macro_attribute]
pub fn runtime(_: TokenStream, item: TokenStream) -> TokenStream {
    runtime_macro(item.into(), TokioMode::Main).into()
}

/// Same as `#[firmata_host::runtime]` but for tests: tests using it run one at a time.
#[proc_macro_attribute]
pub fn test(_: TokenStream, item: TokenStream) -> TokenStream {
    runtime_macro(item.into(), TokioMode::Test).into()
}
