// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Output pruning against an allow-list of identifiers.
//!
//! The allow-list is every identifier-shaped token in a set of text files.
//! This is a textual filter, not a dependency analysis: a name that merely
//! appears in a comment is kept.

use std::collections::BTreeSet;
use std::path::Path;

use regex::Regex;

use crate::error::{Error, Result};

const IDENTIFIER: &str = "[A-Za-z0-9_]+";

/// The set of names to emit. The default, unrestricted filter emits
/// everything.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Prune {
    allowed: Option<BTreeSet<String>>,
}

impl Prune {
    /// A filter allowing only tokens found in `texts`.
    pub fn from_texts<'a>(texts: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let identifier = Regex::new(IDENTIFIER)?;
        let allowed = texts
            .into_iter()
            .flat_map(|text| identifier.find_iter(text))
            .map(|m| m.as_str().to_string())
            .collect();
        Ok(Self {
            allowed: Some(allowed),
        })
    }

    /// Reads every file in `paths`. No paths means no pruning.
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        if paths.is_empty() {
            return Ok(Self::default());
        }
        let texts = paths
            .iter()
            .map(|path| {
                let path = path.as_ref();
                std::fs::read_to_string(path).map_err(|err| Error::io(path, err))
            })
            .collect::<Result<Vec<_>>>()?;
        let prune = Self::from_texts(texts.iter().map(String::as_str))?;
        log::debug!(
            "pruning to {} identifiers from {} files",
            prune.allowed.as_ref().map_or(0, BTreeSet::len),
            paths.len()
        );
        Ok(prune)
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.allowed.is_some()
    }

    #[must_use]
    pub fn allows(&self, name: &str) -> bool {
        self.allowed
            .as_ref()
            .is_none_or(|allowed| allowed.contains(name))
    }

    /// Filters `candidates` down to the allowed names.
    pub fn select(&self, candidates: Vec<String>) -> BTreeSet<String> {
        candidates.into_iter().filter(|name| self.allows(name)).collect()
    }
}
