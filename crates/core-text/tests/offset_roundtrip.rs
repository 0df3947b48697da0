//! Property tests for offset conversion round-trips over mixed Unicode text.

use core_text::{Encoding, HostIdentity, Offset, TextSnapshot};
use proptest::prelude::*;

fn piece() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![
        "a", "Z", " ", ",", "é", "e\u{0301}", "漢", "😀", "🇯🇵", "👍🏽", "👨‍👩‍👧‍👦", "\n", "ß",
    ])
}

fn text() -> impl Strategy<Value = String> {
    prop::collection::vec(piece(), 0..40).prop_map(|parts| parts.concat())
}

proptest! {
    // Every grapheme boundary survives grapheme -> X -> grapheme for both other encodings.
    #[test]
    fn grapheme_offsets_round_trip(t in text()) {
        let snap = TextSnapshot::new(HostIdentity::new("prop"), t.as_str());
        for g in 0..=snap.len_in(Encoding::GraphemeCluster) {
            let o = Offset::grapheme(g);
            for via in [Encoding::Utf16Unit, Encoding::UnicodeScalar] {
                let there = snap.convert(o, via).unwrap();
                let back = snap.convert(there, Encoding::GraphemeCluster).unwrap();
                prop_assert_eq!(back, o);
            }
        }
    }

    // Every scalar offset survives scalar -> utf16 -> scalar.
    #[test]
    fn scalar_utf16_round_trip(t in text()) {
        let snap = TextSnapshot::new(HostIdentity::new("prop"), t.as_str());
        for s in 0..=snap.len_in(Encoding::UnicodeScalar) {
            let o = Offset::scalar(s);
            let u = snap.convert(o, Encoding::Utf16Unit).unwrap();
            prop_assert_eq!(snap.convert(u, Encoding::UnicodeScalar).unwrap(), o);
        }
    }

    // Whenever a conversion succeeds, the reverse conversion restores the original.
    #[test]
    fn successful_conversions_are_reversible(t in text(), raw in 0usize..200) {
        let snap = TextSnapshot::new(HostIdentity::new("prop"), t.as_str());
        for from in Encoding::ALL {
            for to in Encoding::ALL {
                let o = Offset::new(raw, from);
                if let Ok(there) = snap.convert(o, to) {
                    prop_assert_eq!(snap.convert(there, from).unwrap(), o);
                }
            }
        }
    }

    // Offsets past the end are always rejected, never clamped.
    #[test]
    fn past_end_is_out_of_range(t in text(), extra in 1usize..10) {
        let snap = TextSnapshot::new(HostIdentity::new("prop"), t.as_str());
        for enc in Encoding::ALL {
            let o = Offset::new(snap.len_in(enc) + extra, enc);
            let is_out_of_range = matches!(
                snap.convert(o, Encoding::UnicodeScalar),
                Err(core_text::OffsetError::OutOfRange { .. })
            );
            prop_assert!(is_out_of_range);
        }
    }
}
