// Copyright (c) 2025 Joshua Seaton
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

#[cfg(test)]
mod tests {
    use bitfield_gen_macro::bitfields;
    use zerocopy::IntoBytes;

    bitfields!(
        "
        base 32
        block cap {
            field type 4
            field badge 28
        }

        base 16
        block word_pair {
            field hi 8
            field lo 8
            field next 16
        }
        "
    );

    mod demo {
        bitfield_gen_macro::include_bitfields!("../demos/structures.bf");
    }

    #[test]
    fn size_and_alignment() {
        assert_eq!(size_of::<cap_t>(), size_of::<u32>());
        assert_eq!(align_of::<cap_t>(), align_of::<u32>());
        assert_eq!(size_of::<word_pair_t>(), 2 * size_of::<u16>());
        assert_eq!(size_of::<demo::cap_t>(), 2 * size_of::<u64>());
        assert_eq!(size_of::<demo::thread_state_t>(), size_of::<u32>());
    }

    #[test]
    fn cap_scenario() {
        const CAP: cap_t = cap_t::new(5, 0x123_4567);
        assert_eq!(CAP.words, [0x5123_4567]);
        assert_eq!(CAP.get_type(), 5);
        assert_eq!(CAP.get_badge(), 0x123_4567);

        let cap = CAP.set_badge(0xfff_ffff);
        assert_eq!(cap.get_type(), 5);
        assert_eq!(cap.get_badge(), 0xfff_ffff);
        assert_eq!(cap.as_bytes(), 0x5fff_ffff_u32.as_bytes());
    }

    #[test]
    fn pointer_family() {
        let mut pair = word_pair_t { words: [0; 2] };
        pair.ptr_new(0x12, 0x34, 0xbeef);
        assert_eq!(pair.words, [0xbeef, 0x1234]);
        pair.ptr_set_lo(0xff);
        assert_eq!(pair.ptr_get_hi(), 0x12);
        assert_eq!(pair.ptr_get_lo(), 0xff);
        assert_eq!(pair.ptr_get_next(), 0xbeef);
        assert_eq!(pair, word_pair_t::new(0x12, 0xff, 0xbeef));
    }

    #[test]
    fn tag_discrimination() {
        use demo::{cap_t, fault_t, thread_state_t};

        let ep = cap_t::endpoint_cap_new(0xffff_8000_1234_5000, 0xbad);
        assert_eq!(ep.get_capType(), cap_t::ENDPOINT_CAP);
        assert!(ep.capType_equals(cap_t::ENDPOINT_CAP));
        assert!(!ep.capType_equals(cap_t::NULL_CAP));
        assert_eq!(ep.endpoint_cap_get_capEPPtr(), 0xffff_8000_1234_5000);

        let null = cap_t::null_cap_new();
        assert_eq!(null.get_capType(), cap_t::NULL_CAP);
        assert_eq!(null.ptr_get_capType(), 0);

        let vm = fault_t::fault_vm_new(5);
        assert_eq!(vm.words, [0x8000_0000_0000_0051]);
        assert_eq!(vm.get_faultType(), 0x21);
        assert!(vm.faultType_equals(fault_t::FAULT_VM));
        assert_eq!(vm.fault_vm_get_address(), 5);
        assert_eq!(fault_t::fault_cap_new(1).get_faultType(), fault_t::FAULT_CAP);

        let blocked = thread_state_t::state_blocked_new(0xfff_ffff);
        assert_eq!(blocked.get_kind(), 0b0111);
        assert!(blocked.kind_equals(thread_state_t::STATE_BLOCKED));
        let running = thread_state_t::state_running_new(7);
        assert_eq!(running.get_kind(), thread_state_t::STATE_RUNNING);
        assert!(!running.kind_equals(thread_state_t::STATE_BLOCKED));
        assert_eq!(thread_state_t::state_inactive_new().get_kind(), 0);
    }

    #[test]
    fn sign_extension() {
        let node = demo::mdb_node_t::new(0xffff_8000_0000_1000, 1, 0, 0);
        assert_eq!(node.get_mdbNext(), 0xffff_8000_0000_1000);
        assert_eq!(node.words[1] >> 48, 0);

        let node = node.set_mdbNext(0x7fff_0000_1000);
        assert_eq!(node.get_mdbNext(), 0x7fff_0000_1000);
        assert_eq!(node.get_mdbRevocable(), 1);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "v32 has bits outside its field")]
    fn out_of_range_write() {
        let _ = cap_t::new(0, 0).set_type(0x10);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "cap does not hold endpoint_cap")]
    fn wrong_variant() {
        let _ = demo::cap_t::null_cap_new().endpoint_cap_get_capEPBadge();
    }
}
