// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! The Rust target: one `#[repr(C)]` word-array struct per object, with the
//! same value and pointer accessor families as the C header. The value family
//! is `const fn` taking and returning `self` by value; the pointer family
//! works through `&self` and `&mut self`.

use std::collections::BTreeSet;

use proc_macro2::{Ident, Literal, Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};

use super::Emit;
use crate::error::Result;
use crate::layout::{Block, Field, FieldAccess};
use crate::union::{TagClass, TagEncoding, TaggedUnion, Variant};
use crate::word::{Base, Shift};

fn hex_literal(value: u64) -> Literal {
    // `Literal` has no hex constructor; an unsuffixed hex literal takes its
    // type from context like any other.
    format!("{value:#x}")
        .parse()
        .unwrap_or_else(|_| Literal::u64_unsuffixed(value))
}

fn word_type(base: Base) -> Ident {
    format_ident!("u{}", base.bits())
}

/// A parameter name that is not a keyword.
fn param(name: &str) -> Ident {
    if syn::parse_str::<Ident>(name).is_ok() {
        Ident::new(name, Span::call_site())
    } else {
        format_ident!("{}_", name)
    }
}

/// `value <shift>`, omitting shifts by zero.
fn shifted(value: &TokenStream2, shift: Shift) -> TokenStream2 {
    let amount = Literal::u32_unsuffixed(shift.amount());
    match shift {
        _ if shift.amount() == 0 => quote! { #value },
        Shift::Left(_) => quote! { (#value << #amount) },
        Shift::Right(_) => quote! { (#value >> #amount) },
    }
}

/// The arithmetic of one field over `self.words`.
struct FieldTokens {
    access: FieldAccess,
}

impl FieldTokens {
    fn word(&self) -> TokenStream2 {
        let index = Literal::usize_unsuffixed(self.access.index);
        quote! { self.words[#index] }
    }

    fn read(&self) -> TokenStream2 {
        let word = self.word();
        let mask = hex_literal(self.access.word_mask);
        let value = shifted(&quote! { (#word & #mask) }, self.access.read_shift);
        match self.access.sign_extend {
            Some(ext) => {
                let bit = Literal::u32_unsuffixed(ext.extend_bit);
                let high_bits = hex_literal(ext.high_bits);
                quote! {
                    let ret = #value;
                    if ret & (1 << #bit) != 0 { ret | #high_bits } else { ret }
                }
            }
            None => quote! { #value },
        }
    }

    /// The assertion that `value` loses no bits, if one is needed.
    fn check(&self, value: &Ident) -> TokenStream2 {
        if self.access.is_full_word() {
            return quote! {};
        }
        let value_mask = hex_literal(self.access.value_mask);
        let expected = match self.access.sign_extend {
            Some(ext) => {
                let bit = Literal::u32_unsuffixed(ext.extend_bit);
                let high_bits = hex_literal(ext.high_bits);
                quote! { if #value & (1 << #bit) != 0 { #high_bits } else { 0 } }
            }
            None => quote! { 0 },
        };
        let message = format!("{value} has bits outside its field");
        quote! { debug_assert!((#value & !#value_mask) == (#expected), #message); }
    }

    fn write(&self, value: &Ident) -> TokenStream2 {
        let word = self.word();
        let mask = hex_literal(self.access.word_mask);
        let shifted = shifted(&quote! { #value }, self.access.write_shift());
        quote! {
            #word &= !#mask;
            #word |= #shifted & #mask;
        }
    }

    /// A constructor term ORed into the field's word.
    fn init(&self, value: &TokenStream2) -> TokenStream2 {
        if self.access.is_full_word() {
            shifted(value, self.access.write_shift())
        } else {
            let value_mask = hex_literal(self.access.value_mask);
            shifted(&quote! { (#value & #value_mask) }, self.access.write_shift())
        }
    }
}

/// A term of a constructor, by word.
struct Init {
    index: usize,
    term: TokenStream2,
    check: TokenStream2,
}

/// One accessor family: a standalone block, or one variant of a union.
struct Family<'a> {
    ty: Ident,
    word: Ident,
    multiple: usize,
    /// The C-side prefix of every function name, used for pruning.
    c_prefix: String,
    /// The prefix of every method name.
    method_prefix: String,
    names: &'a BTreeSet<String>,
    guard: TokenStream2,
}

impl Family<'_> {
    fn wants(&self, op: &str) -> bool {
        self.names.contains(&format!("{}{op}", self.c_prefix))
    }

    fn method(&self, op: &str) -> Ident {
        format_ident!("{}{}", self.method_prefix, op)
    }

    fn constructors(&self, params: &[Ident], inits: &[Init]) -> TokenStream2 {
        let word = &self.word;
        let ty = &self.ty;
        let checks = inits.iter().map(|init| &init.check).collect::<Vec<_>>();
        let words = (0..self.multiple)
            .map(|index| {
                let terms = inits
                    .iter()
                    .filter(|init| init.index == index)
                    .map(|init| &init.term)
                    .collect::<Vec<_>>();
                if terms.is_empty() {
                    quote! { 0 }
                } else {
                    quote! { #(#terms)|* }
                }
            })
            .collect::<Vec<_>>();
        let indices = (0..self.multiple).map(Literal::usize_unsuffixed);

        let mut tokens = TokenStream2::new();
        if self.wants("new") {
            let name = self.method("new");
            let doc = format!("Returns a new `{ty}` from the given field values.");
            tokens.extend(quote! {
                #[doc = #doc]
                #[inline]
                #[must_use]
                pub const fn #name(#(#params: #word),*) -> Self {
                    #(#checks)*
                    Self { words: [#(#words),*] }
                }
            });
        }
        if self.wants("ptr_new") {
            let name = self.method("ptr_new");
            let doc = format!("Overwrites `self` with a new `{ty}` from the given field values.");
            tokens.extend(quote! {
                #[doc = #doc]
                #[inline]
                pub fn #name(&mut self, #(#params: #word),*) {
                    #(#checks)*
                    #(self.words[#indices] = #words;)*
                }
            });
        }
        tokens
    }

    fn accessors(&self, field: &Field, code: &FieldTokens) -> TokenStream2 {
        let Some(name) = field.name.as_deref() else {
            return TokenStream2::new();
        };
        let word = &self.word;
        let guard = &self.guard;
        let value = format_ident!("v{}", code.access.base.bits());
        let read = code.read();
        let check = code.check(&value);
        let write = code.write(&value);
        let low = field.offset % code.access.base.bits();
        let bits = format!(
            "bits `[{}:{low}]` of word {}",
            low + field.size - 1,
            code.access.index
        );

        let mut tokens = TokenStream2::new();
        if self.wants(&format!("get_{name}")) {
            let method = self.method(&format!("get_{name}"));
            let doc = format!("Returns the value of the `{name}` field ({bits}).");
            tokens.extend(quote! {
                #[doc = #doc]
                #[inline]
                #[must_use]
                pub const fn #method(self) -> #word {
                    #guard
                    #read
                }
            });
        }
        if self.wants(&format!("set_{name}")) {
            let method = self.method(&format!("set_{name}"));
            let doc = format!("Returns a copy with the `{name}` field ({bits}) replaced.");
            tokens.extend(quote! {
                #[doc = #doc]
                #[inline]
                #[must_use]
                pub const fn #method(mut self, #value: #word) -> Self {
                    #guard
                    #check
                    #write
                    self
                }
            });
        }
        if self.wants(&format!("ptr_get_{name}")) {
            let method = self.method(&format!("ptr_get_{name}"));
            let doc = format!("Reads the `{name}` field ({bits}) in place.");
            tokens.extend(quote! {
                #[doc = #doc]
                #[inline]
                #[must_use]
                pub fn #method(&self) -> #word {
                    #guard
                    #read
                }
            });
        }
        if self.wants(&format!("ptr_set_{name}")) {
            let method = self.method(&format!("ptr_set_{name}"));
            let doc = format!("Writes the `{name}` field ({bits}) in place.");
            tokens.extend(quote! {
                #[doc = #doc]
                #[inline]
                pub fn #method(&mut self, #value: #word) {
                    #guard
                    #check
                    #write
                }
            });
        }
        tokens
    }
}

fn struct_def(name: &str, ty: &Ident, word: &Ident, multiple: usize) -> TokenStream2 {
    let multiple = Literal::usize_unsuffixed(multiple);
    let doc = format!("The packed representation of `{name}`.");
    quote! {
        #[doc = #doc]
        #[allow(non_camel_case_types)]
        #[repr(C)]
        #[derive(
            Clone,
            Copy,
            Debug,
            Eq,
            Hash,
            PartialEq,
            ::zerocopy::FromBytes,
            ::zerocopy::Immutable,
            ::zerocopy::IntoBytes,
            ::zerocopy::KnownLayout,
        )]
        pub struct #ty {
            pub words: [#word; #multiple],
        }
    }
}

/// Builds a Rust module, one object at a time.
#[derive(Default)]
pub struct Module {
    items: TokenStream2,
}

impl Module {
    /// The generated items, unrendered.
    #[must_use]
    pub fn into_tokens(self) -> TokenStream2 {
        self.items
    }
}

impl Emit for Module {
    fn block(&mut self, block: &Block, names: &BTreeSet<String>) -> Result<()> {
        let ty = format_ident!("{}_t", block.name);
        let word = word_type(block.base.base);
        let family = Family {
            ty: ty.clone(),
            word: word.clone(),
            multiple: block.multiple,
            c_prefix: format!("{}_", block.name),
            method_prefix: String::new(),
            names,
            guard: TokenStream2::new(),
        };

        let mut inits = Vec::new();
        let mut params = Vec::new();
        for name in &block.visible_order {
            let code = FieldTokens {
                access: block.access_of(name)?,
            };
            let ident = param(name);
            inits.push(Init {
                index: code.access.index,
                term: code.init(&quote! { #ident }),
                check: code.check(&ident),
            });
            params.push(ident);
        }

        let constructors = family.constructors(&params, &inits);
        let accessors = block.fields().map(|field| {
            family.accessors(field, &FieldTokens {
                access: block.access(field),
            })
        });
        let def = struct_def(&block.name, &ty, &word, block.multiple);
        self.items.extend(quote! {
            #def

            #[allow(non_snake_case, clippy::too_many_arguments)]
            impl #ty {
                #constructors
                #(#accessors)*
            }
        });
        Ok(())
    }

    fn union(&mut self, union: &TaggedUnion, names: &BTreeSet<String>) -> Result<()> {
        let ty = format_ident!("{}_t", union.name);
        let word = word_type(union.base.base);

        let constants = union.variants.iter().map(|variant| {
            let name = tag_constant(variant);
            let value = hex_literal(variant.value);
            let doc = format!("The `{}` tag of `{}`.", variant.name, union.tag_name);
            quote! {
                #[doc = #doc]
                pub const #name: #word = #value;
            }
        });

        let tag_functions = tag_functions(union, &word, names);
        let variants = union
            .variants
            .iter()
            .map(|variant| variant_functions(union, variant, &ty, &word, names))
            .collect::<Result<Vec<_>>>()?;

        let def = struct_def(&union.name, &ty, &word, union.multiple);
        self.items.extend(quote! {
            #def

            #[allow(non_snake_case, clippy::too_many_arguments)]
            impl #ty {
                #(#constants)*
                #tag_functions
                #(#variants)*
            }
        });
        Ok(())
    }

    fn finish(self) -> Result<String> {
        let file = syn::parse2::<syn::File>(self.items)?;
        Ok(prettyplease::unparse(&file))
    }
}

fn tag_constant(variant: &Variant) -> Ident {
    format_ident!("{}", variant.name.to_uppercase())
}

/// An expression computing the tag of `self`.
fn tag_reader(union: &TaggedUnion) -> TokenStream2 {
    match &union.encoding {
        TagEncoding::Sliced(sliced) => {
            let index = Literal::usize_unsuffixed(sliced.index);
            let parts = sliced.slices.iter().map(|slice| {
                let mask = hex_literal(slice.word_mask());
                shifted(&quote! { (self.words[#index] & #mask) }, slice.compress_shift())
            });
            quote! { (#(#parts)|*) }
        }
        TagEncoding::Classed(classed) => {
            let index = Literal::usize_unsuffixed(classed.index);
            let extract = |class: &TagClass| {
                let shift = Literal::u32_unsuffixed(class.shift);
                let mask = hex_literal(class.value_mask());
                quote! { ((self.words[#index] >> #shift) & #mask) }
            };
            let Some((widest, narrower)) = classed.classes.split_last() else {
                return quote! { 0 };
            };
            let fallback = extract(widest);
            if narrower.is_empty() {
                return fallback;
            }
            // Narrowest first: a class claims the word unless its escape
            // pattern is set.
            let conditions = narrower.iter().map(|class| {
                let classmask = hex_literal(class.word_classmask);
                quote! { self.words[#index] & #classmask != #classmask }
            });
            let values = narrower.iter().map(extract);
            quote! {
                (#(if #conditions { #values } else)* { #fallback })
            }
        }
    }
}

fn tag_functions(union: &TaggedUnion, word: &Ident, names: &BTreeSet<String>) -> TokenStream2 {
    let tag = &union.tag_name;
    let reader = tag_reader(union);
    let mut tokens = TokenStream2::new();

    if names.contains(&format!("{}_get_{tag}", union.name)) {
        let method = format_ident!("get_{}", tag);
        let doc = format!("Returns the `{tag}` tag.");
        tokens.extend(quote! {
            #[doc = #doc]
            #[inline]
            #[must_use]
            pub const fn #method(self) -> #word {
                #reader
            }
        });
    }
    if names.contains(&format!("{}_{tag}_equals", union.name)) {
        let method = format_ident!("{}_equals", tag);
        let argument = format_ident!("{}_type_tag", union.name);
        let doc = format!("Whether the `{tag}` tag equals `{argument}`.");
        tokens.extend(quote! {
            #[doc = #doc]
            #[inline]
            #[must_use]
            pub const fn #method(self, #argument: #word) -> bool {
                #reader == #argument
            }
        });
    }
    if names.contains(&format!("{}_ptr_get_{tag}", union.name)) {
        let method = format_ident!("ptr_get_{}", tag);
        let doc = format!("Reads the `{tag}` tag in place.");
        tokens.extend(quote! {
            #[doc = #doc]
            #[inline]
            #[must_use]
            pub fn #method(&self) -> #word {
                #reader
            }
        });
    }
    tokens
}

fn variant_functions(
    union: &TaggedUnion,
    variant: &Variant,
    ty: &Ident,
    word: &Ident,
    names: &BTreeSet<String>,
) -> Result<TokenStream2> {
    let block = &variant.block;
    let constant = tag_constant(variant);
    let check = variant.check;
    let index = Literal::usize_unsuffixed(check.index);
    let shift = Literal::u32_unsuffixed(check.shift);
    let mask = hex_literal(check.mask);
    let expected = match &union.encoding {
        TagEncoding::Sliced(_) => {
            let value = hex_literal(check.value);
            quote! { #value }
        }
        TagEncoding::Classed(_) => quote! { Self::#constant },
    };
    let message = format!("{} does not hold {}", union.name, variant.name);
    let family = Family {
        ty: ty.clone(),
        word: word.clone(),
        multiple: union.multiple,
        c_prefix: format!("{}_{}_", union.name, variant.name),
        method_prefix: format!("{}_", variant.name),
        names,
        guard: quote! {
            debug_assert!(((self.words[#index] >> #shift) & #mask) == #expected, #message);
        },
    };

    let mut inits = Vec::new();
    let mut params = Vec::new();
    for name in &block.visible_order {
        let code = FieldTokens {
            access: block.access_of(name)?,
        };
        if *name == union.tag_name && matches!(union.encoding, TagEncoding::Classed(_)) {
            inits.push(Init {
                index: code.access.index,
                term: code.init(&quote! { Self::#constant }),
                check: TokenStream2::new(),
            });
        } else if !union.is_tag_field(name) {
            let ident = param(name);
            inits.push(Init {
                index: code.access.index,
                term: code.init(&quote! { #ident }),
                check: code.check(&ident),
            });
            params.push(ident);
        }
    }
    if let TagEncoding::Sliced(sliced) = &union.encoding {
        let value = hex_literal(sliced.expand(variant.value));
        inits.push(Init {
            index: sliced.index,
            term: quote! { #value },
            check: TokenStream2::new(),
        });
    }

    let constructors = family.constructors(&params, &inits);
    let accessors = union.fields(variant).map(|field| {
        family.accessors(field, &FieldTokens {
            access: block.access(field),
        })
    });
    Ok(quote! {
        #constructors
        #(#accessors)*
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_and_params() {
        assert_eq!(hex_literal(0xf0).to_string(), "0xf0");
        assert_eq!(param("type").to_string(), "type_");
        assert_eq!(param("badge").to_string(), "badge");
        assert_eq!(
            shifted(&quote! { x }, Shift::Right(0)).to_string(),
            "x"
        );
        assert_eq!(
            shifted(&quote! { x }, Shift::Left(4)).to_string(),
            "(x << 4)"
        );
    }
}
