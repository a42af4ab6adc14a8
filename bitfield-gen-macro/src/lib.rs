// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Build-time compilation of bitfield specifications into Rust.
//!
//! Both macros expand to the items `bitfield_gen` emits in its Rust mode:
//! a `#[repr(C)]` `<name>_t` struct per block and tagged union, with its
//! constructors and accessors. The generated structs derive the `zerocopy`
//! traits, so the invoking crate must depend on `zerocopy` with the `derive`
//! feature.

use std::path::PathBuf;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use syn::{LitStr, parse_macro_input};

/// Compiles a specification given inline.
///
/// ```ignore
/// bitfield_gen_macro::bitfields!("
///     base 32
///     block endpoint {
///         field badge 28
///         field rights 4
///     }
/// ");
///
/// let ep = endpoint_t::new(0x123, 0x3);
/// assert_eq!(ep.get_badge(), 0x123);
/// ```
#[proc_macro]
pub fn bitfields(item: TokenStream) -> TokenStream {
    let source = parse_macro_input!(item as LitStr);
    expand(&source, &source.value()).into()
}

/// Compiles a specification read from a file, relative to the invoking
/// crate's manifest directory.
#[proc_macro]
pub fn include_bitfields(item: TokenStream) -> TokenStream {
    let path = parse_macro_input!(item as LitStr);
    let mut full = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").unwrap_or_default());
    full.push(path.value());
    match std::fs::read_to_string(&full) {
        Ok(source) => {
            let items = expand(&path, &source);
            // Rebuild when the specification changes.
            let full = full.to_string_lossy();
            quote::quote! {
                const _: &str = include_str!(#full);
                #items
            }
            .into()
        }
        Err(err) => syn::Error::new(path.span(), format!("{}: {err}", full.display()))
            .to_compile_error()
            .into(),
    }
}

fn expand(literal: &LitStr, source: &str) -> TokenStream2 {
    bitfield_gen::rust_tokens(source)
        .unwrap_or_else(|err| syn::Error::new(literal.span(), err).to_compile_error())
}
