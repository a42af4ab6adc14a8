// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use bitfield_gen::{
        Environment, Error, Mode, Options, SymbolTable, TagEncoding, generate, parse,
    };
    use serde_json::Value;

    const CAP: &str = "
        base 32
        block cap_t {
            field type 4
            field badge 28
        }";

    const DEMO: &str = include_str!("../demos/structures.bf");

    fn demo(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("demos").join(name)
    }

    fn c_header(source: &str) -> String {
        generate(source, &Options::default()).unwrap()
    }

    fn table(source: &str) -> SymbolTable {
        SymbolTable::build(&parse(source).unwrap()).unwrap()
    }

    #[test]
    fn cap_constructor_packs_fields() {
        let header = c_header(CAP);
        assert!(header.contains(
            "struct cap_t {\n    uint32_t words[1];\n};\ntypedef struct cap_t cap_t_t;"
        ));
        assert!(header.contains(
            "static inline cap_t_t CONST\n\
             cap_t_new(uint32_t type, uint32_t badge) {\n\
             \x20   cap_t_t cap_t;\n\
             \n\
             \x20   /* fail if user has passed bits that we will override */\n\
             \x20   assert((type & ~0xfu) == 0);\n\
             \x20   assert((badge & ~0xfffffffu) == 0);\n\
             \n\
             \x20   cap_t.words[0] = 0\n\
             \x20       | (type & 0xfu) << 28\n\
             \x20       | (badge & 0xfffffffu) << 0;\n\
             \n\
             \x20   return cap_t;\n\
             }"
        ));
        assert!(header.contains(
            "static inline uint32_t CONST\n\
             cap_t_get_type(cap_t_t cap_t) {\n\
             \x20   uint32_t ret;\n\
             \x20   ret = (cap_t.words[0] & 0xf0000000u) >> 28;\n\
             \x20   return ret;\n\
             }"
        ));
        assert!(header.contains("cap_t.words[0] &= ~0xfffffffu;"));
        assert!(header.contains("cap_t_ptr->words[0] |= (v32 << 0) & 0xfffffffu;"));
        assert!(header.contains("static inline uint32_t PURE\ncap_t_ptr_get_badge(cap_t_t *cap_t_ptr) {"));
    }

    #[test]
    fn cap_values() {
        let table = table(CAP);
        let cap = table.block("cap_t").unwrap();
        let mut words = cap.construct(&[("type", 5), ("badge", 0x123_4567)]).unwrap();
        assert_eq!(words, [0x5123_4567]);
        assert_eq!(cap.get(&words, "type").unwrap(), 5);

        cap.set(&mut words, "badge", 0xfff_ffff).unwrap();
        assert_eq!(cap.get(&words, "type").unwrap(), 5);
        assert_eq!(words, [0x5fff_ffff]);

        assert!(matches!(
            cap.set(&mut words, "type", 0x10),
            Err(Error::InvalidFieldValue { value: 0x10, .. })
        ));
    }

    #[test]
    fn pruning_to_one_getter() {
        let dir = tempfile::tempdir().unwrap();
        let allowed = dir.path().join("allowed.c");
        std::fs::write(&allowed, "x = cap_t_get_type(cap);").unwrap();

        let source = format!("{CAP}\nblock other {{ field x 32 }}");
        let header = generate(
            &source,
            &Options {
                prune: vec![allowed],
                ..Options::default()
            },
        )
        .unwrap();
        assert!(header.contains("cap_t_get_type(cap_t_t cap_t)"));
        assert!(header.contains("typedef struct cap_t cap_t_t;"));
        for pruned in ["cap_t_set_type", "cap_t_new", "cap_t_ptr_get_type", "cap_t_get_badge"] {
            assert!(!header.contains(pruned), "{pruned} survived pruning");
        }
        assert!(!header.contains("struct other"));
    }

    #[test]
    fn missing_prune_file() {
        let dir = tempfile::tempdir().unwrap();
        let options = Options {
            prune: vec![dir.path().join("absent")],
            ..Options::default()
        };
        assert!(matches!(generate(CAP, &options), Err(Error::Io { .. })));
    }

    #[test]
    fn demo_header() {
        let header = generate(
            DEMO,
            &Options {
                from_file: Some("structures.bf".to_string()),
                ..Options::default()
            },
        )
        .unwrap();
        assert!(header.starts_with(
            "/* generated from structures.bf */\n\n#pragma once\n\n#include <config.h>\n"
        ));

        // Standalone blocks by name, then unions by name; variant blocks
        // have no structure of their own.
        let position = |needle: &str| header.find(needle).unwrap();
        assert!(position("struct cap_t {") < position("struct mdb_node {"));
        assert!(position("struct mdb_node {") < position("struct cap {"));
        assert!(position("struct cap {") < position("struct fault {"));
        assert!(position("struct fault {") < position("struct thread_state {"));
        assert!(!header.contains("struct endpoint_cap {"));

        assert!(header.contains(
            "enum cap_tag {\n    cap_null_cap = 0,\n    cap_frame_cap = 1,\n    \
             cap_endpoint_cap = 4\n};\ntypedef enum cap_tag cap_tag_t;"
        ));
        assert!(header.contains("/* Possibly sign extend */"));
        assert!(header.contains("ret |= 0xffff000000000000ull;"));
        assert!(header.contains(
            "assert(((cap.words[0] >> 59) & 0x1full) == cap_endpoint_cap);"
        ));
        assert!(header.contains("cap_endpoint_cap_new(uint64_t capEPPtr, uint64_t capEPBadge)"));
        assert!(header.contains("int CONST\nthread_state_kind_equals("));
        assert!(header.contains("if ((thread_state.words[0] & 0x3u) != 0x3u)"));
        assert!(header.contains("fault.words[0] = 0\n        | (address & 0x3ffffffffffffffull) << 4\n        | 0x8000000000000001ull;"));
    }

    #[test]
    fn environments() {
        let header = generate(
            CAP,
            &Options {
                env: Environment::Libsel4,
                ..Options::default()
            },
        )
        .unwrap();
        assert!(header.contains("#include <sel4/simple_types.h>"));
        assert!(header.contains("LIBSEL4_INLINE_FUNC seL4_Uint32 CONST\ncap_t_get_type("));
        assert!(header.contains("seL4_DebugAssert((type & ~0xfu) == 0);"));
        assert!(!header.contains("#include <assert.h>"));
    }

    #[test]
    fn classed_escape_reservation() {
        let source = "
            base 32
            block narrow { field payload 30 field kind 2 }
            block wide { field payload 28 field kind 4 }
            tagged_union u kind {
                mask 2 0b11
                mask 4 0b11
                tag narrow NARROW
                tag wide 0b0111
            }";
        let accepted = parse(&source.replace("NARROW", "0b01")).unwrap();
        assert!(SymbolTable::build(&accepted).is_ok());

        let rejected = parse(&source.replace("NARROW", "0b11")).unwrap();
        assert!(matches!(
            SymbolTable::build(&rejected),
            Err(Error::TagValueEscapes { width: 2, value: 0b11, .. })
        ));
    }

    #[test]
    fn demo_unions_discriminate() {
        let table = table(DEMO);
        for name in ["cap", "fault", "thread_state"] {
            let union = table.union(name).unwrap();
            for variant in &union.variants {
                let words = union.construct(&variant.name, &[]).unwrap();
                assert_eq!(union.read_tag(&words), variant.value, "{name}.{}", variant.name);
                for other in &union.variants {
                    assert_eq!(
                        union.tag_equals(&words, other.value),
                        other.name == variant.name
                    );
                    assert_eq!(
                        union.variant_matches(&words, &other.name).unwrap(),
                        other.name == variant.name
                    );
                }
            }
        }
        assert!(matches!(
            table.union("fault").unwrap().encoding,
            TagEncoding::Sliced(_)
        ));
    }

    #[test]
    fn errors_name_their_cause() {
        let error = |source: &str| {
            parse(source)
                .and_then(|spec| SymbolTable::build(&spec))
                .unwrap_err()
                .to_string()
        };
        assert_eq!(error("base 32\nblock a {\n field x 32 $"), "line 3: unexpected character '$'");
        assert_eq!(
            error("block a { field x 32 }"),
            "a is declared before any base"
        );
        assert_eq!(
            error("base 32 block a { field x 31 }"),
            "size of block a (31 bits) not a multiple of base 32"
        );
        assert_eq!(
            error("base 32 block a { field x 16 field x 16 }"),
            "duplicate field x in block a"
        );
        assert_eq!(
            error("base 32 block a { field k 32 } tagged_union u k { tag b 0 }"),
            "tagged union u refers to unknown block b"
        );
        assert!(error("base 32 block a { field x 16 field y 32 padding 16 }").contains("crosses a word boundary"));
        assert_eq!(
            error("base 64 block a { padding 24 field t 40 } tagged_union u k (t, t, t) { tag a (1, 1, 1) }"),
            "tag slice t appears twice in tagged union u"
        );
    }

    fn verification(mode: Mode, extra: impl FnOnce(&mut Options)) -> Value {
        let mut options = Options {
            mode,
            input: Some(demo("structures.bf")),
            toplevel: vec!["tcb".to_string()],
            umm_types: Some(demo("structures.umm")),
            ..Options::default()
        };
        extra(&mut options);
        serde_json::from_str(&generate(DEMO, &options).unwrap()).unwrap()
    }

    #[test]
    fn definitions() {
        let defs = verification(Mode::HolDefs, |_| {});
        assert_eq!(defs["theory"], "structures_defs");

        let blocks = defs["blocks"].as_array().unwrap();
        let names = blocks.iter().map(|b| b["name"].as_str().unwrap()).collect::<Vec<_>>();
        assert_eq!(names, ["cap_t", "mdb_node"]);

        let mdb = &blocks[1];
        assert_eq!(mdb["record"], "mdb_node_CL");
        let next = &mdb["fields"][0];
        assert_eq!(next["field"], "mdbNext");
        assert_eq!(next["index"], 1);
        assert_eq!(next["mask"], "NOT (mask 2)");
        assert_eq!(next["sign_extend"], 47);
        let prev = &mdb["fields"][3];
        assert_eq!(prev["field"], "mdbPrev");
        assert_eq!(prev["mask"], Value::Null);

        let unions = defs["unions"].as_array().unwrap();
        let cap = &unions[0];
        assert_eq!(cap["datatype"], "cap_CL");
        assert_eq!(cap["variants"][0]["constructor"], "Cap_null_cap");
        assert_eq!(cap["variants"][0]["record"], Value::Null);
        assert_eq!(cap["variants"][2]["record"], "cap_endpoint_cap_CL");
        assert_eq!(cap["tag_reader"]["kind"], "cascade");

        let fault = &unions[1];
        assert_eq!(fault["tag_reader"]["kind"], "compressed");
        assert_eq!(fault["tag_reader"]["parts"][1]["shift"]["direction"], "right");
        assert_eq!(fault["tag_reader"]["parts"][1]["shift"]["amount"], 58);

        let state = &unions[2];
        let helpers = state["mask_helpers"].as_array().unwrap();
        assert_eq!(helpers.len(), 1);
        assert_eq!(helpers[0]["variant"], "state_blocked");
        assert_eq!(helpers[0]["full_mask"], 0xf);
        assert_eq!(helpers[0]["parts"][0]["mask"], 3);
        assert_eq!(helpers[0]["parts"][0]["value"], 3);
    }

    fn obligations(proofs: &Value, function: &str) -> Vec<Value> {
        proofs["obligations"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|o| o["function"] == function)
            .cloned()
            .collect()
    }

    #[test]
    fn proofs() {
        let proofs = verification(Mode::HolProofs, |_| {});
        assert_eq!(proofs["theory"], "structures_proofs");
        assert_eq!(proofs["imports"][0], "structures_defs");
        assert_eq!(proofs["structs"][0]["lemmas"][0], "cap_t_ptr_words_NULL");

        // cap_t is not reachable from the toplevel type.
        let kinds = |function| {
            obligations(&proofs, function)
                .iter()
                .map(|o| o["kind"].as_str().unwrap().to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(kinds("cap_t_get_type"), ["const_modifies", "get_spec"]);
        assert!(kinds("cap_t_ptr_get_type").iter().all(|kind| kind == "const_modifies"));

        let ptr_get = obligations(&proofs, "cap_ptr_get_capType");
        let spec = ptr_get.iter().find(|o| o["kind"] == "ptr_get_tag_spec").unwrap();
        assert_eq!(spec["frame"]["kind"], "path");
        assert_eq!(spec["frame"]["toplevel"], "tcb");
        assert_eq!(spec["frame"]["path"][0], "tcbCTable");
        assert_eq!(spec["frame"]["path"][1], "cap");
        assert_eq!(spec["status"], "proved");

        assert_eq!(kinds("cap_null_cap_new"), ["const_modifies", "empty_union_new_spec"]);
        assert_eq!(kinds("cap_endpoint_cap_new"), ["const_modifies", "union_new_spec"]);
        let setter = obligations(&proofs, "cap_endpoint_cap_ptr_set_capEPPtr");
        assert_eq!(setter[0]["kind"], "ptr_set_modifies");
        assert_eq!(setter[0]["args"][0], "cap_ptr");
        assert_eq!(setter[1]["field"]["sign_extend"], 47);
        assert_eq!(setter[1]["field"]["return_name"], "ret__unsigned_longlong");
    }

    #[test]
    fn proof_options() {
        let proofs = verification(Mode::HolProofs, |options| {
            options.skip_modifies = true;
            options.sorry = true;
            options.debug = true;
        });
        assert_eq!(proofs["theory"], "debug_proofs");
        let all = proofs["obligations"].as_array().unwrap();
        assert!(!all.is_empty());
        assert!(all.iter().all(|o| o["status"] == "sorry"));
        assert!(all.iter().all(|o| o["kind"] != "const_modifies" && o["kind"] != "ptr_set_modifies"));
    }

    #[test]
    fn proofs_need_a_type_map() {
        let dir = tempfile::tempdir().unwrap();
        let map = dir.path().join("nested.umm");
        std::fs::write(&map, "type tcb\n  slot cte\ntype cte\n  cap cap\n").unwrap();

        let options = Options {
            mode: Mode::HolProofs,
            input: Some(demo("structures.bf")),
            toplevel: vec!["tcb".to_string(), "cte".to_string()],
            umm_types: Some(map.clone()),
            ..Options::default()
        };
        assert!(matches!(
            generate(DEMO, &options),
            Err(Error::MultipleParents { ref ty }) if ty == "cap"
        ));

        let options = Options {
            umm_types: Some(dir.path().join("absent.umm")),
            ..options
        };
        assert!(matches!(generate(DEMO, &options), Err(Error::Io { .. })));
    }

    #[test]
    fn rust_module() {
        let module = generate(
            DEMO,
            &Options {
                mode: Mode::RustDefs,
                ..Options::default()
            },
        )
        .unwrap();
        assert!(module.contains("pub struct cap_t_t {"));
        assert!(module.contains("pub words: [u64; 2],"));
        assert!(module.contains("pub const ENDPOINT_CAP: u64 = 0x4;"));
        assert!(module.contains("pub const fn endpoint_cap_new(capEPPtr: u64, capEPBadge: u64) -> Self"));
        assert!(module.contains("pub fn ptr_get_kind(&self) -> u32"));
        assert!(module.contains("::zerocopy::IntoBytes"));
    }
}
