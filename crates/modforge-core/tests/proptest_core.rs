//! Property-based tests for the Modforge core.
//!
//! Uses proptest to generate random dependency graphs, arrays and patch
//! sets, then verify ordering, merge and allocation invariants hold.

use modforge_core::category::Category;
use modforge_core::merge::{merge_array, merge_value};
use modforge_core::patch::{RawPatches, apply_in_order};
use modforge_core::resolver::resolve;
use modforge_core::test_utils::*;
use proptest::prelude::*;
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};

// ===========================================================================
// Generators
// ===========================================================================

/// Package ids `p_a`, `p_b`, ... (ids may only use lowercase and `_`).
fn package_id(i: usize) -> String {
    let mut id = String::from("p_");
    let mut n = i;
    loop {
        id.push((b'a' + (n % 26) as u8) as char);
        n /= 26;
        if n == 0 {
            break;
        }
    }
    id
}

/// A random DAG: package `i` may only depend on packages `j < i`. The
/// insertion order is then shuffled so the resolver has real work to do.
fn arb_dag(max_nodes: usize) -> impl Strategy<Value = Vec<(String, Vec<String>)>> {
    (1..=max_nodes).prop_flat_map(|n| {
        let edges = proptest::collection::vec(proptest::collection::vec(any::<bool>(), n), n);
        (edges, Just(n)).prop_flat_map(|(edges, n)| {
            let nodes: Vec<(String, Vec<String>)> = (0..n)
                .map(|i| {
                    let deps = (0..i)
                        .filter(|&j| edges[i][j])
                        .map(package_id)
                        .collect();
                    (package_id(i), deps)
                })
                .collect();
            Just(nodes).prop_shuffle()
        })
    })
}

fn arb_plain_strings() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec("[a-z]{1,3}", 0..6)
}

/// A JSON object tree without arrays, for deep-merge comparison.
fn arb_object() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        any::<i32>().prop_map(Value::from),
        "[a-z]{0,4}".prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        proptest::collection::btree_map("[a-c]", inner, 0..4)
            .prop_map(|m| Value::Object(m.into_iter().collect::<Map<String, Value>>()))
    })
    .prop_map(|v| match v {
        Value::Object(_) => v,
        other => json!({"root": other}),
    })
}

/// Reference deep merge for array-free trees.
fn reference_merge(original: &Value, patch: &Value) -> Value {
    match (original, patch) {
        (Value::Object(o), Value::Object(p)) => {
            let mut out = o.clone();
            for (k, pv) in p {
                let merged = match (o.get(k), pv) {
                    (Some(ov @ Value::Object(_)), Value::Object(_)) => reference_merge(ov, pv),
                    (_, Value::Object(_)) => reference_merge(&json!({}), pv),
                    _ => pv.clone(),
                };
                out.insert(k.clone(), merged);
            }
            Value::Object(out)
        }
        (_, p) => p.clone(),
    }
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every dependency appears before every package that declares it.
    #[test]
    fn dependencies_precede_dependants(dag in arb_dag(12)) {
        let packages: Vec<_> = dag
            .iter()
            .map(|(id, deps)| {
                let deps: Vec<&str> = deps.iter().map(String::as_str).collect();
                make_package(id, &deps)
            })
            .collect();
        let mut set = package_set(packages);
        let resolution = resolve(&mut set, None).unwrap();

        let position: HashMap<&str, usize> = resolution
            .order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        prop_assert_eq!(position.len(), dag.len());
        for (id, deps) in &dag {
            for dep in deps {
                prop_assert!(position[dep.as_str()] < position[id.as_str()]);
            }
        }
    }

    /// Closing any chain into a loop makes resolution fail.
    #[test]
    fn closed_chain_is_a_cycle(len in 1usize..8, extra in 0usize..4) {
        let mut packages = Vec::new();
        for i in 0..len {
            let dep = package_id((i + 1) % len);
            packages.push(make_package(&package_id(i), &[dep.as_str()]));
        }
        for i in 0..extra {
            packages.push(make_package(&package_id(100 + i), &[]));
        }
        let mut set = package_set(packages);
        let err = resolve(&mut set, None).unwrap_err();
        prop_assert_eq!(err.packages.len(), len);
    }

    /// Only `+` markers: the original survives intact, additions follow in order.
    #[test]
    fn plus_markers_append(original in arb_plain_strings(), added in arb_plain_strings()) {
        prop_assume!(!added.is_empty());
        let orig: Vec<Value> = original.iter().map(|s| json!(s)).collect();
        let patch: Vec<Value> = added.iter().map(|s| json!(format!("+{s}"))).collect();
        let merged = merge_array(&orig, &patch, false);

        let mut expected = orig.clone();
        expected.extend(added.iter().map(|s| json!(s)));
        prop_assert_eq!(merged, expected);
    }

    /// Unmarked strings replace the original outright.
    #[test]
    fn unmarked_strings_replace(original in arb_plain_strings(), patch in arb_plain_strings()) {
        let orig: Vec<Value> = original.iter().map(|s| json!(s)).collect();
        let patch: Vec<Value> = patch.iter().map(|s| json!(s)).collect();
        prop_assert_eq!(merge_array(&orig, &patch, false), patch);
    }

    /// `-x` removes exactly one occurrence when present and nothing otherwise.
    #[test]
    fn minus_removes_at_most_one(original in arb_plain_strings(), target in "[a-z]{1,3}") {
        let orig: Vec<Value> = original.iter().map(|s| json!(s)).collect();
        let merged = merge_array(&orig, &[json!(format!("-{target}"))], false);

        let before = original.iter().filter(|s| **s == target).count();
        let after = merged.iter().filter(|v| v.as_str() == Some(target.as_str())).count();
        if before == 0 {
            prop_assert_eq!(merged, orig);
        } else {
            prop_assert_eq!(after, before - 1);
            prop_assert_eq!(merged.len(), orig.len() - 1);
        }
    }

    /// Array-free patches behave like a plain recursive deep merge.
    #[test]
    fn object_merge_is_deep_merge(original in arb_object(), patch in arb_object()) {
        let expected = reference_merge(&original, &patch);
        let mut merged = original.clone();
        merge_value(&mut merged, patch);
        prop_assert_eq!(merged, expected);
    }

    /// New entries across any number of packages get distinct indices at or
    /// above the reserved offset.
    #[test]
    fn allocated_indices_are_unique(counts in proptest::collection::vec(0usize..5, 1..6)) {
        let packages: Vec<_> = counts
            .iter()
            .enumerate()
            .map(|(p, &n)| {
                let units: Map<String, Value> = (0..n)
                    .map(|u| (format!("unit_{p}_{u}"), json!({"idx": -1})))
                    .collect();
                with_patch(make_package(&package_id(p), &[]), json!({"unitData": units}))
            })
            .collect();
        let mut set = package_set(packages);
        let order = resolve(&mut set, None).unwrap().order;
        let mut session = sample_session();
        let outcome = apply_in_order(&mut session, &mut set, &order, &mut RawPatches);
        prop_assert!(outcome.failed.is_empty());

        let units = session.document()["unitData"].as_object().unwrap();
        let mut seen = HashSet::new();
        for (name, unit) in units {
            if !name.starts_with("unit_") {
                continue;
            }
            let idx = unit["idx"].as_u64().unwrap();
            prop_assert!(idx >= 1000);
            prop_assert!(seen.insert(idx));
            let resolved = session.identifiers().resolve(Category::Unit, name).unwrap();
            prop_assert_eq!(u64::from(resolved.0), idx);
        }
        prop_assert_eq!(seen.len(), counts.iter().sum::<usize>());
    }
}
