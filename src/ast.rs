// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Unresolved syntax nodes, exactly as written in the source.

use std::collections::BTreeMap;

use crate::word::BaseSpec;

/// A `field`, `field_high` or `padding` declaration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawField {
    /// `None` for padding.
    pub name: Option<String>,
    pub size: u32,
    pub high: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawBlock {
    pub name: String,
    pub fields: Vec<RawField>,
    /// The explicit constructor parameter order, if one was given.
    pub visible_order: Option<Vec<String>>,
}

/// A `tag` line: a variant name (which is also its block's name) and one or
/// more raw values.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawTag {
    pub name: String,
    pub values: Vec<u64>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawUnion {
    pub name: String,
    pub tag_name: String,
    /// Empty unless the tag is split over several fields.
    pub tag_slices: Vec<String>,
    /// `(width, classmask)` pairs, in declaration order.
    pub masks: Vec<(u32, u64)>,
    pub tags: Vec<RawTag>,
}

impl RawUnion {
    /// The fields forming the tag; the tag name itself unless slices were
    /// given.
    #[must_use]
    pub fn slices(&self) -> Vec<String> {
        if self.tag_slices.is_empty() {
            vec![self.tag_name.clone()]
        } else {
            self.tag_slices.clone()
        }
    }
}

/// A parsed specification, with every object grouped under the base in force
/// where it was declared.
#[derive(Clone, Debug, Default)]
pub struct Spec {
    /// The base in force at the end of the input.
    pub default_base: Option<BaseSpec>,
    pub blocks: BTreeMap<BaseSpec, Vec<RawBlock>>,
    pub unions: BTreeMap<BaseSpec, Vec<RawUnion>>,
}
