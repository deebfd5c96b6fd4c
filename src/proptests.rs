use crate::{
    compact, contains, get, Analysis, Analyzer, ChunkMode, Config, Error, Matcher, NodeStorage,
    PackedTree, RadixBuilder, ShiftLayout, Tree, WordWidth,
};

use proptest::prelude::*;
use std::collections::BTreeMap;

const STORAGES: [NodeStorage; 4] = [
    NodeStorage::InlineWord(WordWidth::W32),
    NodeStorage::InlineWord(WordWidth::W64),
    NodeStorage::ByteBody(3),
    NodeStorage::ByteBody(5),
];

const MODES: [ChunkMode; 2] = [ChunkMode::Whole, ChunkMode::Firstless];

fn validate_analysis(a: &Analysis) {
    let records = a.records();
    let stats = a.stats();

    for (i, r) in records.iter().enumerate() {
        // Crammed buffer must give back every stored chunk.
        assert_eq!(a.stored_chunk(i), r.chunk.as_slice(), "chunk {i} not recoverable");
        assert!(r.chunk.len() <= stats.max_chunk_len);
        if let Some(v) = r.value {
            assert!(v <= stats.max_value);
        }

        if i > 0 {
            assert!(r.parent < i, "parent must precede child");
            assert!(records[r.parent].children.contains(&i));
        }

        assert!(r.children_count() <= stats.max_children);
        if !r.children.is_empty() {
            assert!(r.children.start > i);
            assert!(r.children.start - i <= stats.max_child_delta);
        }
        let leads: Vec<Option<u8>> = r.children.clone().map(|c| records[c].lead).collect();
        for w in leads.windows(2) {
            assert!(w[0] < w[1], "siblings must be sorted by lead byte");
        }
    }

    // Sibling ranges tile 1..len in order.
    let mut next = 1;
    for r in records {
        if !r.children.is_empty() {
            assert_eq!(r.children.start, next, "children ranges must be contiguous");
            next = r.children.end;
        }
    }
    if !records.is_empty() {
        assert_eq!(next, records.len());
    }
}

fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    // A small alphabet so keys share prefixes and chunks overlap.
    prop::collection::vec(prop::sample::select(b"abcd-/x".to_vec()), 0..=10)
}

fn map_strategy() -> impl Strategy<Value = BTreeMap<Vec<u8>, u64>> {
    prop::collection::btree_map(key_strategy(), 0u64..5000, 0..=48)
}

fn build(map: &BTreeMap<Vec<u8>, u64>) -> RadixBuilder {
    map.iter().map(|(k, v)| (k.as_slice(), *v)).collect()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_analysis_invariants(map in map_strategy()) {
        let b = build(&map);
        for mode in MODES {
            let a = Analyzer::new(mode).analyze(&b);
            prop_assert_eq!(a.len(), b.size());
            validate_analysis(&a);
        }
    }

    #[test]
    fn prop_layout_round_trip(map in map_strategy(), extra in 0u32..8) {
        let a = Analyzer::default().analyze(&build(&map));
        let needed = ShiftLayout::compute(64, 64, &a).unwrap().widths().total();
        let budget = (needed + extra).min(64);
        let layout = ShiftLayout::compute(budget, 64, &a).unwrap();
        for (i, r) in a.records().iter().enumerate() {
            let fields = layout.fields_of(i, r);
            prop_assert_eq!(layout.decode(layout.encode(i, r)), fields);
        }
        if needed > 0 {
            let too_small = ShiftLayout::compute(needed - 1, 64, &a);
            prop_assert!(
                matches!(too_small, Err(Error::Overflow { .. })),
                "expected overflow, got {:?}",
                too_small
            );
        }
    }

    #[test]
    fn prop_matcher_equivalence(map in map_strategy(), probes in prop::collection::vec(key_strategy(), 0..32)) {
        let b = build(&map);
        for mode in MODES {
            let a = Analyzer::new(mode).analyze(&b);
            for storage in STORAGES {
                let p = match PackedTree::pack(&a, storage) {
                    Ok(p) => p,
                    // Narrow storages may legitimately not fit.
                    Err(Error::Overflow { .. }) => continue,
                    Err(e) => panic!("unexpected error: {e}"),
                };
                for (k, v) in &map {
                    prop_assert_eq!(get(&p, k), Some(*v));
                    // A proper prefix is found only if it is itself a key.
                    for cut in 0..k.len() {
                        let prefix = &k[..cut];
                        prop_assert_eq!(contains(&p, prefix), map.contains_key(prefix));
                    }
                }
                for probe in &probes {
                    prop_assert_eq!(get(&p, probe), map.get(probe).copied());
                    prop_assert_eq!(get(&b, probe), map.get(probe).copied());
                }
            }
        }
    }

    #[test]
    fn prop_image_round_trip(map in map_strategy()) {
        let b = build(&map);
        for mode in MODES {
            let a = Analyzer::new(mode).analyze(&b);
            let p = PackedTree::pack(&a, NodeStorage::InlineWord(WordWidth::W64)).unwrap();
            let back = PackedTree::from_bytes(&p.to_bytes()).unwrap();
            prop_assert_eq!(&back, &p);
            for k in map.keys() {
                prop_assert_eq!(get(&back, k), map.get(k).copied());
            }
        }
    }
}

fn for_each_permutation<T: Clone>(items: &[T], mut f: impl FnMut(Vec<T>)) {
    fn rec<T: Clone>(items: &[T], used: &mut [bool], out: &mut Vec<T>, f: &mut impl FnMut(Vec<T>)) {
        if out.len() == items.len() {
            f(out.clone());
            return;
        }
        for (i, item) in items.iter().enumerate() {
            if std::mem::replace(&mut used[i], true) {
                continue;
            }
            out.push(item.clone());
            rec(items, used, out, f);
            out.pop();
            used[i] = false;
        }
    }

    let mut used = vec![false; items.len()];
    let mut out = Vec::with_capacity(items.len());
    rec(items, &mut used, &mut out, &mut f);
}

#[test]
fn exhaustive_insert_order_gives_identical_image() {
    let keys: Vec<(&str, u64)> = vec![
        ("a", 1),
        ("b", 2),
        ("ab", 3),
        ("abc", 4),
        ("ba", 5),
        ("", 6),
    ];

    let reference = compact(&keys.iter().copied().collect::<RadixBuilder>(), &Config::default())
        .unwrap()
        .to_bytes();

    for_each_permutation(&keys, |perm| {
        let b: RadixBuilder = perm.into_iter().collect();
        let image = compact(&b, &Config::default()).unwrap().to_bytes();
        assert_eq!(image, reference);
    });
}

#[test]
fn headers_scenario() {
    let pairs = [
        ("auth", 4u64),
        ("author", 2),
        ("authentication", 3),
        ("authorization", 1),
        ("authority", 0),
        ("content-type", 5),
        ("content-length", 6),
        ("content-disposition", 7),
    ];
    let b: RadixBuilder = pairs.into_iter().collect();

    for mode in MODES {
        let a = Analyzer::new(mode).analyze(&b);
        validate_analysis(&a);
        let raw: usize = a.records().iter().map(|r| r.chunk.len()).sum();
        assert!(a.crammed().len() < raw, "{mode:?}: cramming must reuse bytes");

        for storage in STORAGES {
            let p = PackedTree::pack(&a, storage).unwrap();
            let mut m = Matcher::new(&p);
            assert!(m.feed_all(b"authorization"));
            let node = m.node().unwrap();
            assert_eq!(p.value_of(node), Some(1));

            m.reset();
            assert!(m.feed_all(b"conten"));
            assert!(m.feed_all(b"t-"));
            assert!(!m.feed(b'w'));
            assert!(!m.feed_all(b"idth"));
            assert!(!m.found());
        }
    }
}

#[test]
fn randomized_against_btreemap() {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut map: BTreeMap<Vec<u8>, u64> = BTreeMap::new();
    for i in 0..1500u64 {
        let len = rng.gen_range(1..24);
        let key: Vec<u8> = (0..len).map(|_| b"abcdefgh/-._"[rng.gen_range(0..12)]).collect();
        map.insert(key, i);
    }

    let b = build(&map);
    for mode in MODES {
        let a = Analyzer::new(mode).analyze(&b);
        validate_analysis(&a);
        let p = PackedTree::pack(&a, NodeStorage::InlineWord(WordWidth::W64)).unwrap();
        for (k, v) in &map {
            assert_eq!(get(&p, k), Some(*v));
        }
        for _ in 0..1000 {
            let len = rng.gen_range(0..24);
            let probe: Vec<u8> = (0..len).map(|_| b"abcdefgh/-._"[rng.gen_range(0..12)]).collect();
            assert_eq!(get(&p, &probe), map.get(&probe).copied());
        }
    }
}
