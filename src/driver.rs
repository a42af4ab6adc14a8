// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! One compilation, end to end: parse, resolve, prune, emit.

use std::path::{Path, PathBuf};

use proc_macro2::TokenStream as TokenStream2;

use crate::emit::{ProofConfig, Target, rust, visit};
use crate::env::Environment;
use crate::error::{Error, Result};
use crate::prune::Prune;
use crate::symtab::SymbolTable;
use crate::topology::{self, TypeMap};

/// The output mode.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, clap::ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum Mode {
    /// A C header.
    #[default]
    CDefs,
    /// Verification definitions, as JSON.
    HolDefs,
    /// Verification proof obligations, as JSON.
    HolProofs,
    /// A Rust module.
    RustDefs,
}

/// Everything besides the source text that shapes the output.
#[derive(Clone, Debug, Default)]
pub struct Options {
    pub mode: Mode,
    pub env: Environment,
    /// Files whose identifiers restrict what gets emitted.
    pub prune: Vec<PathBuf>,
    /// Heap types pointer obligations are framed against.
    pub toplevel: Vec<String>,
    /// The type map relating `toplevel` types to the objects they contain.
    pub umm_types: Option<PathBuf>,
    pub skip_modifies: bool,
    pub sorry: bool,
    /// Recorded in the C preamble.
    pub from_file: Option<String>,
    /// The input file, which names the verification module.
    pub input: Option<PathBuf>,
    /// Names the verification module `debug` regardless of the input.
    pub debug: bool,
}

impl Options {
    fn module(&self) -> Option<String> {
        if self.debug {
            return Some("debug".to_string());
        }
        self.input
            .as_deref()
            .and_then(Path::file_stem)
            .map(|stem| stem.to_string_lossy().into_owned())
    }

    fn target(&self, table: &SymbolTable) -> Result<Target> {
        Ok(match self.mode {
            Mode::CDefs => Target::CHeader {
                env: self.env,
                from_file: self.from_file.clone(),
            },
            Mode::RustDefs => Target::RustModule,
            Mode::HolDefs => Target::VerificationDefs {
                module: Some(self.module().ok_or(Error::MissingArgument(
                    "verification definitions need an input file",
                ))?),
            },
            Mode::HolProofs => Target::VerificationProofs(self.proof_config(table)?),
        })
    }

    fn proof_config(&self, table: &SymbolTable) -> Result<ProofConfig> {
        let module = self
            .module()
            .ok_or(Error::MissingArgument("proofs need an input file"))?;
        if self.toplevel.is_empty() {
            return Err(Error::MissingArgument("proofs need at least one --toplevel type"));
        }
        let path = self
            .umm_types
            .as_deref()
            .ok_or(Error::MissingArgument("proofs need a --umm-types type map"))?;
        let map = TypeMap::from_file(path)?;
        for toplevel in &self.toplevel {
            if !map.contains(toplevel) && table.object(toplevel).is_none() {
                log::warn!("toplevel type {toplevel} is not in the type map");
            }
        }
        let frames = topology::invert(&map, &self.toplevel, |ty| table.object(ty).is_some())?;
        log::debug!("{} framed types", frames.len());
        Ok(ProofConfig {
            module,
            frames,
            skip_modifies: self.skip_modifies,
            sorry: self.sorry,
        })
    }
}

fn resolve(source: &str) -> Result<SymbolTable> {
    let spec = crate::parser::parse(source)?;
    SymbolTable::build(&spec)
}

/// Compiles `source` into the output `options` ask for.
pub fn generate(source: &str, options: &Options) -> Result<String> {
    let table = resolve(source)?;
    let prune = Prune::from_files(&options.prune)?;
    options.target(&table)?.emit(&table, &prune)
}

/// Compiles `source` into unrendered Rust items, for the proc macro.
pub fn rust_tokens(source: &str) -> Result<TokenStream2> {
    let table = resolve(source)?;
    let mut module = rust::Module::default();
    visit(&table, &Prune::default(), &mut module)?;
    Ok(module.into_tokens())
}
