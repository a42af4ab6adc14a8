// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! `bitfield_gen` compiles specifications of packed bitfield structures into
//! accessor code. The imagined user is a kernel developer who wants a C
//! structure made of machine words, every field in it read and written with a
//! shift and a mask, and no compiler-defined bitfield layout anywhere.
//!
//! A specification declares three kinds of things:
//!
//! * a `base`: the word width subsequent objects are built from, optionally
//!   with a narrower canonical width and sign extension of high-aligned
//!   fields (`base 64(48,1)`);
//! * a `block`: fields and padding packed from the most significant bit of
//!   the first word down, spanning one or more words;
//! * a `tagged_union`: a set of blocks sharing a tag field, with the tag
//!   either split into slices or, with `mask` declarations, encoded in
//!   variable-width classes.
//!
//! ## Outputs
//!
//! * a C header of `static inline` functions: constructors, getters and
//!   setters by value and through a pointer, plus tag readers for unions;
//! * a Rust module with the same accessors over `#[repr(C)]` word arrays,
//!   also reachable at build time through the `bitfield-gen-macro` crate;
//! * verification descriptors (JSON): the logical record and lift of every
//!   object, and one proof obligation per emitted function.
//!
//! Output can be pruned to the function names found in a set of files.
//!
//! ## Example
//!
//! ```rust
//! use bitfield_gen::{Options, generate};
//!
//! let header = generate(
//!     "
//!     base 32
//!     block endpoint {
//!         field badge 28
//!         field rights 4
//!     }
//!     ",
//!     &Options::default(),
//! )
//! .unwrap();
//! assert!(header.contains("typedef struct endpoint endpoint_t;"));
//! assert!(header.contains("endpoint_get_badge(endpoint_t endpoint)"));
//! ```
//!
//! Resolved objects are available too, with a reference evaluator over word
//! arrays that mirrors the generated code:
//!
//! ```rust
//! use bitfield_gen::{SymbolTable, parse};
//!
//! let table = SymbolTable::build(&parse("base 32 block pair { field hi 16 field lo 16 }").unwrap()).unwrap();
//! let pair = table.block("pair").unwrap();
//! let words = pair.construct(&[("hi", 0x12), ("lo", 0x34)]).unwrap();
//! assert_eq!(words, [0x0012_0034]);
//! assert_eq!(pair.get(&words, "hi").unwrap(), 0x12);
//! ```

pub mod ast;
pub mod driver;
pub mod emit;
pub mod env;
pub mod error;
pub mod layout;
pub mod lexer;
pub mod parser;
pub mod prune;
pub mod symtab;
pub mod topology;
pub mod union;
pub mod word;

pub use driver::{Mode, Options, generate, rust_tokens};
pub use env::Environment;
pub use error::{Error, Result};
pub use layout::{Block, Field, FieldAccess};
pub use parser::parse;
pub use prune::Prune;
pub use symtab::{Object, SymbolTable};
pub use topology::{Frame, TypeMap};
pub use union::{TagEncoding, TaggedUnion, Variant};
pub use word::{Base, BaseSpec};
