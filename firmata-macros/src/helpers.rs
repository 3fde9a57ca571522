use proc_macro2::TokenStream;
use quote::quote;

/// Determines what path the generated code uses to refer to firmata-host:
/// `crate::...` inside the crate itself, `firmata_host::...` everywhere else (doctests included).
pub fn firmata_host_crate_path() -> TokenStream {
    let is_internal = std::env::var("CARGO_CRATE_NAME")
        .map(|name| name == "firmata_host")
        .unwrap_or_default()
        && std::env::var("UNSTABLE_RUSTDOC_TEST_PATH").is_err();

    match is_internal {
        true => quote!(crate),
        false => quote!(firmata_host),
    }
}
