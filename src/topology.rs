// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Type nesting for pointer proof obligations.
//!
//! A pointer-based accessor is only meaningful for a value that lives somewhere
//! in the heap, and a proof about it needs to know where: either the value is
//! itself a toplevel heap type, or it is reached through a path of fields from
//! one. The nesting is read from a type map:
//!
//! ```text
//! # Comments run to the end of the line.
//! type tcb
//!     ctable  cte
//!     state   thread_state
//! type cte
//!     cap     cap
//!     mdb     mdb_node
//! ```
//!
//! Each `type` line opens a record; every following `FIELD TYPE` line adds a
//! field to it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Serialize;

use crate::error::{Error, Result};

/// The fields of every record type, in declaration order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TypeMap {
    types: BTreeMap<String, Vec<(String, String)>>,
}

impl TypeMap {
    pub fn parse(text: &str) -> Result<Self> {
        let mut map = Self::default();
        let mut current: Option<String> = None;
        for (number, line) in text.lines().enumerate() {
            let line_no = number + 1;
            let error = |message: String| Error::Topology {
                line: line_no,
                message,
            };
            let content = line.split('#').next().unwrap_or_default();
            let words = content.split_whitespace().collect::<Vec<_>>();
            match words.as_slice() {
                [] => {}
                ["type", name] => {
                    if map.types.contains_key(*name) {
                        return Err(error(format!("type {name} declared twice")));
                    }
                    map.types.insert((*name).to_string(), Vec::new());
                    current = Some((*name).to_string());
                }
                [field, ty] => {
                    let Some(fields) = current.as_ref().and_then(|c| map.types.get_mut(c)) else {
                        return Err(error(format!("field {field} outside of any type")));
                    };
                    if fields.iter().any(|(f, _)| f == field) {
                        return Err(error(format!("duplicate field {field}")));
                    }
                    fields.push(((*field).to_string(), (*ty).to_string()));
                }
                _ => return Err(error(format!("malformed line '{}'", content.trim()))),
            }
        }
        log::debug!("type map: {} types", map.types.len());
        Ok(map)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| Error::io(path, err))?;
        Self::parse(&text)
    }

    #[must_use]
    pub fn contains(&self, ty: &str) -> bool {
        self.types.contains_key(ty)
    }

    /// Every `(path, type)` reachable from `toplevel` whose type satisfies
    /// `is_target`, including `toplevel` itself with an empty path. The
    /// search does not descend into targets.
    pub fn paths_to(
        &self,
        toplevel: &str,
        is_target: &impl Fn(&str) -> bool,
    ) -> Vec<(Vec<String>, String)> {
        let mut found = Vec::new();
        let mut path = Vec::new();
        let mut stack = BTreeSet::new();
        self.search(toplevel, is_target, &mut path, &mut stack, &mut found);
        found
    }

    fn search<'a>(
        &'a self,
        ty: &'a str,
        is_target: &impl Fn(&str) -> bool,
        path: &mut Vec<String>,
        stack: &mut BTreeSet<&'a str>,
        found: &mut Vec<(Vec<String>, String)>,
    ) {
        if is_target(ty) {
            found.push((path.clone(), ty.to_string()));
            return;
        }
        let Some(fields) = self.types.get(ty) else {
            return;
        };
        // A recursive type can only reach what it already reached.
        if !stack.insert(ty) {
            return;
        }
        for (field, field_ty) in fields {
            path.push(field.clone());
            self.search(field_ty, is_target, path, stack, found);
            path.pop();
        }
        stack.remove(ty);
    }
}

/// Where a pointer to a type points.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Frame {
    /// The type is itself a toplevel heap type.
    Direct,
    /// The type sits at `path` within `toplevel`.
    Path { toplevel: String, path: Vec<String> },
}

/// Maps every target type reachable from `toplevels` to its unique frame.
pub fn invert(
    map: &TypeMap,
    toplevels: &[String],
    is_target: impl Fn(&str) -> bool,
) -> Result<BTreeMap<String, Frame>> {
    let mut frames = BTreeMap::new();
    for toplevel in toplevels {
        for (path, ty) in map.paths_to(toplevel, &is_target) {
            let frame = if path.is_empty() {
                Frame::Direct
            } else {
                Frame::Path {
                    toplevel: toplevel.clone(),
                    path,
                }
            };
            if frames.insert(ty.clone(), frame).is_some() {
                return Err(Error::MultipleParents { ty });
            }
        }
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAP: &str = "
        # kernel objects
        type tcb
            ctable  cte
            state   thread_state   # a bitfield block
            fault   fault
        type cte
            cap     cap
            mdb     mdb_node
        type list
            next    list
        ";

    fn is_bitfield(ty: &str) -> bool {
        ["cap", "mdb_node", "thread_state", "fault", "pte"].contains(&ty)
    }

    #[test]
    fn paths_through_records() {
        let map = TypeMap::parse(MAP).unwrap();
        let paths = map.paths_to("tcb", &is_bitfield);
        assert_eq!(
            paths,
            vec![
                (vec!["ctable".to_string(), "cap".to_string()], "cap".to_string()),
                (vec!["ctable".to_string(), "mdb".to_string()], "mdb_node".to_string()),
                (vec!["state".to_string()], "thread_state".to_string()),
                (vec!["fault".to_string()], "fault".to_string()),
            ]
        );
        assert!(map.paths_to("list", &is_bitfield).is_empty());
        assert_eq!(map.paths_to("pte", &is_bitfield), vec![(vec![], "pte".to_string())]);
    }

    #[test]
    fn inversion() {
        let map = TypeMap::parse(MAP).unwrap();
        let frames = invert(&map, &["tcb".to_string(), "pte".to_string()], is_bitfield).unwrap();
        assert_eq!(frames["pte"], Frame::Direct);
        assert_eq!(
            frames["mdb_node"],
            Frame::Path {
                toplevel: "tcb".to_string(),
                path: vec!["ctable".to_string(), "mdb".to_string()],
            }
        );
        assert!(!frames.contains_key("pde"));

        // cte is reachable both directly and through tcb.
        assert!(matches!(
            invert(&map, &["tcb".to_string(), "cte".to_string()], is_bitfield),
            Err(Error::MultipleParents { ref ty }) if ty == "cap"
        ));
    }

    #[test]
    fn malformed_maps() {
        assert!(matches!(
            TypeMap::parse("cap cap_t"),
            Err(Error::Topology { line: 1, .. })
        ));
        assert!(matches!(
            TypeMap::parse("type a\n  x b c"),
            Err(Error::Topology { line: 2, .. })
        ));
        assert!(matches!(
            TypeMap::parse("type a\ntype a"),
            Err(Error::Topology { line: 2, .. })
        ));
        assert!(matches!(
            TypeMap::parse("type a\n x b\n x c"),
            Err(Error::Topology { line: 3, .. })
        ));
    }
}
