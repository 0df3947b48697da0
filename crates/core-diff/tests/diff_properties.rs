//! Property tests: the changed region always reconstructs the new snapshot.

use core_diff::{DiffEngine, DiffOutcome, EditClass, reconstruct};
use core_text::{Encoding, HostIdentity, TextSnapshot};
use proptest::prelude::*;

fn piece() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["a", "b", " ", "é", "e\u{0301}", "😀", "🇫🇷", "\n", "漢"])
}

fn text() -> impl Strategy<Value = String> {
    prop::collection::vec(piece(), 0..30).prop_map(|p| p.concat())
}

fn snap(t: &str) -> TextSnapshot {
    TextSnapshot::new(HostIdentity::new("prop"), t)
}

proptest! {
    #[test]
    fn region_reconstructs_new(old in text(), new in text()) {
        let (o, n) = (snap(&old), snap(&new));
        match DiffEngine::default().diff(&o, &n) {
            DiffOutcome::NoChange => prop_assert_eq!(old, new),
            DiffOutcome::Changed(region) => {
                prop_assert_eq!(reconstruct(&o, &n, &region).unwrap(), new.clone());
                let delta = n.len_in(Encoding::UnicodeScalar) as isize
                    - o.len_in(Encoding::UnicodeScalar) as isize;
                prop_assert_eq!(region.length_delta(), delta);
            }
        }
    }

    #[test]
    fn region_boundaries_are_cluster_aligned(old in text(), new in text()) {
        let (o, n) = (snap(&old), snap(&new));
        if let DiffOutcome::Changed(region) = DiffEngine::default().diff(&o, &n) {
            prop_assert!(o.index().is_cluster_boundary(region.start().value));
            prop_assert!(n.index().is_cluster_boundary(region.new_range().end().value));
            prop_assert!(o.index().is_cluster_boundary(region.old_range().end().value));
        }
    }

    #[test]
    fn threshold_classifies_by_changed_units(old in text(), new in text(), threshold in 0usize..40) {
        let (o, n) = (snap(&old), snap(&new));
        if let DiffOutcome::Changed(region) = DiffEngine::new(threshold).diff(&o, &n) {
            let expected = if region.changed_units() > threshold { EditClass::Large } else { EditClass::Small };
            prop_assert_eq!(region.class(), expected);
        }
    }
}
