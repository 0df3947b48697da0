use core_cache::{CachePolicy, ResultCache};
use proptest::prelude::*;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
enum Op {
    Put { key: u8, advance_ms: u64 },
    Get { key: u8, advance_ms: u64 },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..16, 0u64..400).prop_map(|(key, advance_ms)| Op::Put { key, advance_ms }),
        (0u8..16, 0u64..400).prop_map(|(key, advance_ms)| Op::Get { key, advance_ms }),
    ]
}

proptest! {
    #[test]
    fn size_and_age_bounded_after_every_put(
        max_entries in 1usize..8,
        max_age_ms in 100u64..2000,
        ops in prop::collection::vec(op(), 1..80),
    ) {
        let policy = CachePolicy::new(max_entries, Duration::from_millis(max_age_ms));
        let mut cache: ResultCache<u8, u64> = ResultCache::new("prop", policy);
        let mut now = Instant::now();
        for op in ops {
            match op {
                Op::Put { key, advance_ms } => {
                    now += Duration::from_millis(advance_ms);
                    cache.put_at(key, advance_ms, now);
                    prop_assert!(cache.len() <= max_entries);
                    for age in cache.ages_at(now) {
                        prop_assert!(age <= policy.max_age);
                    }
                }
                Op::Get { key, advance_ms } => {
                    now += Duration::from_millis(advance_ms);
                    if cache.get_at(&key, now).is_some() {
                        let recency = cache.keys_by_recency();
                        prop_assert_eq!(recency.first(), Some(&key));
                    }
                }
            }
        }
    }
}
