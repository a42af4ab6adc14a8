// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Output targets.
//!
//! Every target walks the same resolved objects in the same order; a target
//! only decides what to write for a block and for a union. Each object comes
//! with the set of function names it may emit, already pruned, and objects
//! left with no names are skipped entirely.

pub mod c;
pub mod rust;
pub mod verify;

use std::collections::BTreeSet;

use crate::env::Environment;
use crate::error::Result;
use crate::layout::Block;
use crate::prune::Prune;
use crate::symtab::{Object, SymbolTable};
use crate::union::TaggedUnion;

pub use verify::ProofConfig;

/// One output target.
pub trait Emit {
    fn block(&mut self, block: &Block, names: &BTreeSet<String>) -> Result<()>;
    fn union(&mut self, union: &TaggedUnion, names: &BTreeSet<String>) -> Result<()>;
    fn finish(self) -> Result<String>;
}

/// Feeds every object of `table` that survives `prune` to `emitter`.
pub fn visit(table: &SymbolTable, prune: &Prune, emitter: &mut impl Emit) -> Result<()> {
    for object in table.objects() {
        let names = prune.select(object.names());
        if names.is_empty() {
            log::debug!("{}: pruned", object.name());
            continue;
        }
        match object {
            Object::Block(block) => emitter.block(block, &names)?,
            Object::Union(union) => emitter.union(union, &names)?,
        }
        log::debug!("{}: emitted {} functions", object.name(), names.len());
    }
    Ok(())
}

/// The closed set of things a compilation can produce.
#[derive(Clone, Debug)]
pub enum Target {
    CHeader {
        env: Environment,
        from_file: Option<String>,
    },
    RustModule,
    VerificationDefs {
        module: Option<String>,
    },
    VerificationProofs(ProofConfig),
}

impl Target {
    pub fn emit(&self, table: &SymbolTable, prune: &Prune) -> Result<String> {
        match self {
            Self::CHeader { env, from_file } => {
                let mut header = c::Header::new(*env, from_file.as_deref());
                visit(table, prune, &mut header)?;
                header.finish()
            }
            Self::RustModule => {
                let mut module = rust::Module::default();
                visit(table, prune, &mut module)?;
                module.finish()
            }
            Self::VerificationDefs { module } => {
                let mut defs = verify::Definitions::new(module.clone());
                visit(table, prune, &mut defs)?;
                defs.finish()
            }
            Self::VerificationProofs(config) => {
                let mut proofs = verify::Proofs::new(config.clone());
                visit(table, prune, &mut proofs)?;
                proofs.finish()
            }
        }
    }
}
