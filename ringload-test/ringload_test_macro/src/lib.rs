/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

use proc_macro::TokenStream;

use quote::{format_ident, quote};
use syn::{parse_macro_input, ItemFn};

/// Turns an `async fn` returning a `Result` into a `#[test]` that runs on a
/// multi-threaded Tokio runtime.
///
/// Relay agents and the controller spawn their loops onto the ambient runtime,
/// so the single-threaded default of `#[tokio::test]` would serialize the whole
/// ring. Panics raised by spawned tasks fail the test too.
#[proc_macro_attribute]
pub fn ringload_test(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let ItemFn {
        attrs,
        vis,
        mut sig,
        block,
    } = parse_macro_input!(item as ItemFn);

    if sig.asyncness.is_none() {
        return syn::Error::new_spanned(sig.fn_token, "#[ringload_test] requires an async fn")
            .to_compile_error()
            .into();
    }

    let name = sig.ident.clone();
    sig.ident = format_ident!("__{}_body", name);
    let body_name = &sig.ident;

    quote! {
        #[test]
        #(#attrs)*
        #vis fn #name() {
            ::ringload_test::__private::run_test(stringify!(#name), #body_name())
        }

        #sig #block
    }
    .into()
}
