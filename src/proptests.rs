use super::Element::{Key, Wildcard};
use super::*;

use proptest::prelude::*;
use proptest_derive::Arbitrary;
use std::collections::BTreeMap;

fn validate_map<K, V, S>(m: &PathMap<K, V, S>) {
    let mut stack: Vec<&Node<K, V, S>> = Vec::new();
    let mut value_count = usize::from(m.root.value.is_some());
    stack.extend(m.root.wildcard.as_deref());
    stack.extend(m.root.children.values());

    while let Some(node) = stack.pop() {
        assert!(!node.is_vacant(), "vacant node below the root");
        if node.value.is_some() {
            value_count += 1;
        }
        stack.extend(node.wildcard.as_deref());
        stack.extend(node.children.values());
    }

    assert_eq!(
        value_count,
        m.len(),
        "reachable value count must match PathMap::len"
    );
}

/// Small alphabet so that registrations share branches and wildcard
/// patterns overlap with concrete ones.
#[derive(Clone, Copy, Debug, Arbitrary)]
enum Seg {
    #[proptest(weight = 1)]
    Wild,
    #[proptest(weight = 3)]
    Key(#[proptest(strategy = "0u8..4")] u8),
}

impl Seg {
    fn element(self) -> Element<u8> {
        match self {
            Seg::Wild => Wildcard,
            Seg::Key(k) => Key(k),
        }
    }
}

fn pattern_strategy() -> impl Strategy<Value = Vec<Element<u8>>> {
    prop::collection::vec(any::<Seg>(), 0..=4)
        .prop_map(|segs| segs.into_iter().map(Seg::element).collect())
}

fn query_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(0u8..4, 0..=5)
}

#[derive(Clone, Debug, Arbitrary)]
enum Op {
    #[proptest(weight = 50)]
    Set(
        #[proptest(strategy = "pattern_strategy()")] Vec<Element<u8>>,
        u64,
    ),
    #[proptest(weight = 25)]
    Delete(#[proptest(strategy = "pattern_strategy()")] Vec<Element<u8>>),
    #[proptest(weight = 15)]
    Get(#[proptest(strategy = "pattern_strategy()")] Vec<Element<u8>>),
    #[proptest(weight = 10)]
    Visit(#[proptest(strategy = "query_strategy()")] Vec<u8>),
}

/// Whether each element of `pattern` matches the query key at its position.
fn pattern_covers(pattern: &[Element<u8>], query: &[u8]) -> bool {
    pattern.iter().zip(query).all(|(element, key)| match element {
        Wildcard => true,
        Key(k) => k == key,
    })
}

/// Values whose pattern matches `query` exactly, in model order.
///
/// Model order is lexicographic with the wildcard first, which is the order
/// the traversal reports values in.
fn expected_matches(model: &Model, query: &[u8]) -> Vec<u64> {
    model
        .iter()
        .filter(|(p, _)| p.len() == query.len() && pattern_covers(p, query))
        .map(|(_, v)| *v)
        .collect()
}

fn expected_prefix_matches(model: &Model, query: &[u8]) -> Vec<u64> {
    model
        .iter()
        .filter(|(p, _)| p.len() <= query.len() && pattern_covers(p, query))
        .map(|(_, v)| *v)
        .collect()
}

type Model = BTreeMap<Vec<Element<u8>>, u64>;

fn build(entries: &[(Vec<Element<u8>>, u64)]) -> (PathMap<u8, u64>, Model) {
    let mut m = PathMap::new();
    let mut model = BTreeMap::new();
    for (path, value) in entries {
        m.set(path, *value);
        model.insert(path.clone(), *value);
    }
    (m, model)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 50_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_equivalence(ops in prop::collection::vec(any::<Op>(), 0..=500)) {
        let mut m: PathMap<u8, u64> = PathMap::new();
        let mut model = Model::new();

        for op in ops {
            match op {
                Op::Set(path, value) => {
                    let old_m = m.set(&path, value);
                    let old_model = model.insert(path, value);
                    prop_assert_eq!(old_m, old_model);
                }
                Op::Delete(path) => {
                    // With pruning, a path exists iff it is the root or a
                    // prefix of some registered pattern.
                    let exists = path.is_empty() || model.keys().any(|k| k.starts_with(&path));
                    let deleted = m.delete(&path);
                    model.remove(&path);
                    prop_assert_eq!(deleted, exists);
                    prop_assert_eq!(m.get(&path), None);
                }
                Op::Get(path) => {
                    prop_assert_eq!(m.get(&path).copied(), model.get(&path).copied());
                }
                Op::Visit(query) => {
                    let got: Vec<u64> = m.matches(&query).into_iter().copied().collect();
                    prop_assert_eq!(got, expected_matches(&model, &query));
                    let got: Vec<u64> = m.prefix_matches(&query).into_iter().copied().collect();
                    prop_assert_eq!(got, expected_prefix_matches(&model, &query));
                }
            }

            prop_assert_eq!(m.len(), model.len());
        }

        validate_map(&m);
        let mut got: Vec<(Vec<Element<u8>>, u64)> = m
            .iter()
            .map(|(p, v)| (p.into_iter().map(Element::cloned).collect(), *v))
            .collect();
        got.sort();
        let expected: Vec<(Vec<Element<u8>>, u64)> =
            model.iter().map(|(k, v)| (k.clone(), *v)).collect();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn prop_visit_stops_at_first_error(
        entries in prop::collection::vec((pattern_strategy(), any::<u64>()), 0..=64),
        query in query_strategy(),
        stop_after in 1usize..8,
    ) {
        let (m, model) = build(&entries);

        for prefixes in [false, true] {
            let expected = if prefixes {
                expected_prefix_matches(&model, &query)
            } else {
                expected_matches(&model, &query)
            };

            let mut seen = Vec::new();
            let mut visitor = |v: &u64| {
                seen.push(*v);
                if seen.len() == stop_after { Err(seen.len()) } else { Ok(()) }
            };
            let res = if prefixes {
                m.visit_prefixes(&query, &mut visitor)
            } else {
                m.visit(&query, &mut visitor)
            };

            if expected.len() >= stop_after {
                prop_assert_eq!(res, Err(stop_after));
                prop_assert_eq!(&seen[..], &expected[..stop_after]);
            } else {
                prop_assert_eq!(res, Ok(()));
                prop_assert_eq!(seen, expected);
            }
        }
    }

    #[test]
    fn prop_delete_all_leaves_empty_root(
        entries in prop::collection::vec((pattern_strategy(), any::<u64>()), 0..=64),
    ) {
        let (mut m, model) = build(&entries);
        validate_map(&m);

        for path in model.keys().rev() {
            prop_assert!(m.delete(path));
            validate_map(&m);
        }
        prop_assert!(m.is_empty());
        prop_assert!(m.root.is_vacant());
        prop_assert_eq!(m.to_string(), "");
    }
}

#[test]
fn exhaustive_delete_order_small_set() {
    let paths: Vec<Vec<Element<u8>>> = vec![
        vec![],
        vec![Key(0)],
        vec![Wildcard],
        vec![Key(0), Key(1)],
        vec![Key(0), Wildcard],
        vec![Wildcard, Key(1)],
    ];

    let mut base: PathMap<u8, u64> = PathMap::new();
    for (i, p) in paths.iter().enumerate() {
        base.set(p, i as u64);
    }
    validate_map(&base);

    let mut orders = 0;
    for_each_order(paths.len(), |order| {
        orders += 1;
        let mut m = base.clone();
        for &i in order {
            let p = &paths[i];
            assert!(m.delete(p));
            assert_eq!(m.get(p), None);
            validate_map(&m);
        }
        assert!(m.is_empty());
        assert!(m.root.is_vacant());
    });
    assert_eq!(orders, 720);
}

/// Calls `f` with every ordering of `0..n`, generated by Heap's algorithm.
fn for_each_order(n: usize, mut f: impl FnMut(&[usize])) {
    let mut order: Vec<usize> = (0..n).collect();
    let mut swaps = vec![0usize; n];
    f(&order);

    let mut i = 1;
    while i < n {
        if swaps[i] < i {
            let j = if i % 2 == 0 { 0 } else { swaps[i] };
            order.swap(j, i);
            f(&order);
            swaps[i] += 1;
            i = 1;
        } else {
            swaps[i] = 0;
            i += 1;
        }
    }
}
