use proc_macro2::TokenStream;
use quote::quote;
use syn::{ItemFn, ReturnType, Stmt};

use crate::helpers::firmata_host_crate_path;

pub enum TokioMode {
    Main,
    Test,
}

/// See `#[firmata_macros::runtime]` for details.
///
/// Works on proc_macro2 streams so the expansion can be exercised at run time (through
/// `runtime-macros`) and compared in unit tests.
pub fn runtime_macro(item: TokenStream, tokio: TokioMode) -> TokenStream {
    let firmata_host = firmata_host_crate_path();
    let tokio_path = format!("{}::utils::tokio", firmata_host);

    let input: ItemFn = match syn::parse2(item) {
        Ok(input) => input,
        Err(err) => return err.to_compile_error(),
    };
    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = input;

    let mut stmts = block.stmts;

    let has_return_type = match &sig.output {
        ReturnType::Default => false,
        ReturnType::Type(_, ty) => match &**ty {
            syn::Type::Tuple(tuple) if tuple.elems.is_empty() => false,
            _ => true,
        },
    };

    // The trailing expression is the returned value: it goes after the wait for tasks.
    let return_expr = match has_return_type {
        true => match stmts.pop() {
            Some(Stmt::Expr(expr, None)) => Some(expr),
            Some(stmt) => {
                stmts.push(stmt);
                None
            }
            None => None,
        },
        false => None,
    };

    let tokio_attr = match tokio {
        TokioMode::Main => quote! {
            #[#firmata_host::utils::tokio::main(crate = #tokio_path)]
        },
        TokioMode::Test => quote! {
            #[#firmata_host::utils::tokio::test(crate = #tokio_path)]
            #[#firmata_host::utils::serial_test::serial]
        },
    };

    let mut body = vec![quote! {
        #firmata_host::utils::task::init_task_channel().await;
    }];

    // A trailing `()` is dropped: it would not be the last expression anymore.
    body.extend(stmts.into_iter().map(|stmt| match &stmt {
        Stmt::Expr(syn::Expr::Tuple(tuple), None) if tuple.elems.is_empty() => quote!(),
        _ => quote! { #stmt },
    }));

    body.push(quote! {
        let _ = #firmata_host::utils::task::wait_for_tasks().await;
    });

    if let Some(return_expr) = return_expr {
        body.push(quote! { #return_expr });
    }

    quote! {
        #tokio_attr
        #(#attrs)*
        #vis #sig {
            #(#body)*
        }
    }
}

#[cfg(test)]
mod tests {
    use proc_macro2::TokenStream;
    use quote::quote;
    use runtime_macros::emulate_attributelike_macro_expansion;
    use serial_test::serial;

    use crate::runtime_macro::{runtime_macro, TokioMode};

    fn runtime_macro_internal(_: TokenStream, item: TokenStream) -> TokenStream {
        runtime_macro(item, TokioMode::Main)
    }

    fn test_macro_internal(_: TokenStream, item: TokenStream) -> TokenStream {
        runtime_macro(item, TokioMode::Test)
    }

    fn before() -> TokenStream {
        quote! { firmata_host::utils::task::init_task_channel().await; }
    }

    fn after() -> TokenStream {
        quote! { let _ = firmata_host::utils::task::wait_for_tasks().await; }
    }

    #[test]
    #[serial]
    fn test_runtime_macro_result() {
        let (before, after) = (before(), after());
        let input = quote! {
            async fn main() -> Result<(), Error> {
                let x = 3;
                Ok(())
            }
        };
        let control = quote! {
            #[firmata_host::utils::tokio::main(crate = "firmata_host::utils::tokio")]
            async fn main() -> Result<(), Error> {
                #before
                let x = 3;
                #after
                Ok(())
            }
        };
        assert_eq!(
            runtime_macro(input, TokioMode::Main).to_string(),
            control.to_string()
        );
    }

    #[test]
    #[serial]
    fn test_runtime_macro_no_result() {
        let (before, after) = (before(), after());
        let input = quote! {
            async fn main() {
                let x = 3;
                blabla.await;
                ()
            }
        };
        let control = quote! {
            #[firmata_host::utils::tokio::main(crate = "firmata_host::utils::tokio")]
            async fn main() {
                #before
                let x = 3;
                blabla.await;
                #after
            }
        };
        assert_eq!(
            runtime_macro(input, TokioMode::Main).to_string(),
            control.to_string()
        );
    }

    #[test]
    #[serial]
    fn test_runtime_macro_test() {
        let (before, after) = (before(), after());
        let input = quote! {
            #[ignore]
            async fn some_test() { }
        };
        let control = quote! {
            #[firmata_host::utils::tokio::test(crate = "firmata_host::utils::tokio")]
            #[firmata_host::utils::serial_test::serial]
            #[ignore]
            async fn some_test() {
                #before
                #after
            }
        };
        assert_eq!(
            runtime_macro(input, TokioMode::Test).to_string(),
            control.to_string()
        );
    }

    #[test]
    #[serial]
    fn test_runtime_macro_not_a_function() {
        let output = runtime_macro(quote! { struct Foo; }, TokioMode::Main).to_string();
        assert!(output.contains("compile_error"));
    }

    #[test]
    fn code_coverage() {
        // Expands the macros at run time so coverage tools can see the expansion code.
        let file = std::fs::File::open("tests/runtime_macro.rs").unwrap();
        emulate_attributelike_macro_expansion(file, &[("runtime", runtime_macro_internal)])
            .unwrap();

        let file = std::fs::File::open("tests/runtime_macro.rs").unwrap();
        emulate_attributelike_macro_expansion(file, &[("test", test_macro_internal)]).unwrap();
    }
}
