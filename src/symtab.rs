// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! The global symbol table: every block and union of one compilation,
//! resolved.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use crate::ast::Spec;
use crate::error::{Error, Result};
use crate::layout::Block;
use crate::union::TaggedUnion;

/// An object that produces output: a standalone block or a tagged union.
#[derive(Clone, Copy, Debug)]
pub enum Object<'a> {
    Block(&'a Block),
    Union(&'a TaggedUnion),
}

impl Object<'_> {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Block(block) => &block.name,
            Self::Union(union) => &union.name,
        }
    }

    /// Every function name this object can emit.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        match self {
            Self::Block(block) => block_names(block, &block.name, |_| true),
            Self::Union(union) => {
                let mut names = vec![
                    format!("{}_get_{}", union.name, union.tag_name),
                    format!("{}_ptr_get_{}", union.name, union.tag_name),
                    format!("{}_{}_equals", union.name, union.tag_name),
                ];
                for variant in &union.variants {
                    let prefix = format!("{}_{}", union.name, variant.name);
                    names.extend(block_names(&variant.block, &prefix, |field| {
                        !union.is_tag_field(field)
                    }));
                }
                names
            }
        }
    }
}

fn block_names(block: &Block, prefix: &str, keep: impl Fn(&str) -> bool) -> Vec<String> {
    let mut names = vec![format!("{prefix}_new"), format!("{prefix}_ptr_new")];
    for field in block.fields().filter_map(|f| f.name.as_deref()) {
        if keep(field) {
            names.extend(
                ["get", "set", "ptr_get", "ptr_set"]
                    .iter()
                    .map(|op| format!("{prefix}_{op}_{field}")),
            );
        }
    }
    names
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    blocks: BTreeMap<String, Rc<Block>>,
    unions: BTreeMap<String, TaggedUnion>,
    /// Blocks that are variants of some union.
    tagged: BTreeSet<String>,
}

impl SymbolTable {
    /// Resolves every object of `spec`. Block and union names share one
    /// namespace.
    pub fn build(spec: &Spec) -> Result<Self> {
        let mut table = Self::default();
        let mut seen = BTreeSet::new();
        let mut claim = |name: &str| {
            if seen.insert(name.to_string()) {
                Ok(())
            } else {
                Err(Error::DuplicateSymbol {
                    name: name.to_string(),
                })
            }
        };
        for raw in spec.blocks.values().flatten() {
            claim(&raw.name)?;
        }
        for raw in spec.unions.values().flatten() {
            claim(&raw.name)?;
        }

        for (base, raws) in &spec.blocks {
            for raw in raws {
                let block = Block::resolve(raw, *base)?;
                table.blocks.insert(raw.name.clone(), Rc::new(block));
            }
        }

        for (base, raws) in &spec.unions {
            for raw in raws {
                let union =
                    TaggedUnion::resolve(raw, *base, |name| table.blocks.get(name).cloned())?;
                table
                    .tagged
                    .extend(union.variants.iter().map(|v| v.block.name.clone()));
                table.unions.insert(raw.name.clone(), union);
            }
        }

        log::debug!(
            "symbol table: {} blocks ({} tagged), {} unions",
            table.blocks.len(),
            table.tagged.len(),
            table.unions.len()
        );
        Ok(table)
    }

    #[must_use]
    pub fn block(&self, name: &str) -> Option<&Block> {
        self.blocks.get(name).map(AsRef::as_ref)
    }

    #[must_use]
    pub fn union(&self, name: &str) -> Option<&TaggedUnion> {
        self.unions.get(name)
    }

    #[must_use]
    pub fn is_tagged(&self, block: &str) -> bool {
        self.tagged.contains(block)
    }

    /// The standalone block or union named `name`.
    #[must_use]
    pub fn object(&self, name: &str) -> Option<Object<'_>> {
        if let Some(union) = self.union(name) {
            return Some(Object::Union(union));
        }
        self.block(name)
            .filter(|block| !self.is_tagged(&block.name))
            .map(Object::Block)
    }

    /// The objects that produce output, in emission order: standalone blocks
    /// by name, then unions by name.
    pub fn objects(&self) -> impl Iterator<Item = Object<'_>> {
        self.blocks
            .values()
            .filter(|block| !self.is_tagged(&block.name))
            .map(|block| Object::Block(block.as_ref()))
            .chain(self.unions.values().map(Object::Union))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    const SOURCE: &str = "
        base 64
        block zeta { field a 32 field b 32 }
        block untyped { field kind 4 field payload 60 }
        block frame { field kind 4 field data 60 }
        tagged_union obj kind {
            tag untyped 1
            tag frame 2
        }
        base 32
        block alpha { field x 32 }";

    #[test]
    fn objects_in_emission_order() {
        let table = SymbolTable::build(&parse(SOURCE).unwrap()).unwrap();
        let names = table.objects().map(|o| o.name().to_string()).collect::<Vec<_>>();
        assert_eq!(names, ["alpha", "zeta", "obj"]);
        assert!(table.is_tagged("frame"));
        assert!(!table.is_tagged("zeta"));
        assert_eq!(table.union("obj").unwrap().variants.len(), 2);
        assert_eq!(table.block("alpha").unwrap().multiple, 1);
    }

    #[test]
    fn candidate_names() {
        let table = SymbolTable::build(&parse(SOURCE).unwrap()).unwrap();
        let union = Object::Union(table.union("obj").unwrap());
        let names = union.names();
        assert!(names.contains(&"obj_get_kind".to_string()));
        assert!(names.contains(&"obj_kind_equals".to_string()));
        assert!(names.contains(&"obj_frame_ptr_set_data".to_string()));
        assert!(!names.contains(&"obj_frame_get_kind".to_string()));

        let block = Object::Block(table.block("alpha").unwrap());
        assert_eq!(
            block.names(),
            [
                "alpha_new",
                "alpha_ptr_new",
                "alpha_get_x",
                "alpha_set_x",
                "alpha_ptr_get_x",
                "alpha_ptr_set_x"
            ]
        );
    }

    #[test]
    fn names_are_unique() {
        let spec = parse("base 32 block a { field x 32 } base 64 block a { field y 64 }").unwrap();
        assert!(matches!(
            SymbolTable::build(&spec),
            Err(Error::DuplicateSymbol { ref name }) if name == "a"
        ));

        let spec = parse("base 32 block a { field k 32 } tagged_union a k { tag a 0 }").unwrap();
        assert!(matches!(
            SymbolTable::build(&spec),
            Err(Error::DuplicateSymbol { .. })
        ));
    }
}
