#![cfg(test)]

// Property tests for Dict kept inside the crate so they can also check the
// bucket arrays and arena directly.

use crate::config::{DictConfig, ResizePolicy};
use crate::dict::{Dict, Replaced};
use crate::dict_type::{DictType, HashedKeys};
use crate::entry::{EntryRef, Value};
use crate::error::DictError;
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::collections::{BTreeSet, HashMap, HashSet};

// Pool-indexed operations to improve shrinking: indices shrink to earlier keys,
// pool length shrinks, and op lists shrink in length.
#[derive(Clone, Debug)]
enum OpI {
    Insert(usize, i32),
    Replace(usize, i32),
    Delete(usize),
    Unlink(usize),
    Find(usize),
    Contains(String),
    Mutate(usize, i32),
    RehashStep(usize),
    Resize,
    Scan,
    SafeDelete(usize),
    Sample(usize),
    Iterate,
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<OpI>)> {
    proptest::collection::vec("[a-z]{0,5}", 1..=40).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let contains_pool = proptest::sample::select(pool.clone());
        let op = prop_oneof![
            6 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::Insert(i, v)),
            2 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::Replace(i, v)),
            2 => idx.clone().prop_map(OpI::Delete),
            1 => idx.clone().prop_map(OpI::Unlink),
            2 => idx.clone().prop_map(OpI::Find),
            1 => prop_oneof![
                contains_pool.prop_map(|s: String| s),
                "[a-z]{0,5}".prop_map(|s| s)
            ]
            .prop_map(OpI::Contains),
            1 => (idx.clone(), any::<i32>()).prop_map(|(i, d)| OpI::Mutate(i, d)),
            1 => (0usize..8).prop_map(OpI::RehashStep),
            1 => Just(OpI::Resize),
            1 => Just(OpI::Scan),
            1 => idx.clone().prop_map(OpI::SafeDelete),
            1 => (0usize..20).prop_map(OpI::Sample),
            1 => Just(OpI::Iterate),
        ];
        proptest::collection::vec(op, 1..120).prop_map(move |ops| (pool.clone(), ops))
    })
}

// Structural invariants: chain counts match the occupancy counters, the arena
// holds exactly the linked entries, and the old generation is empty below
// the rehash cursor.
fn check_structure<D>(d: &Dict<String, i32, D>) -> Result<(), TestCaseError>
where
    D: DictType<String, i32>,
{
    let mut counted = [0usize; 2];
    for (t, slot) in counted.iter_mut().enumerate() {
        for idx in 0..d.tables[t].size() {
            let mut cur = d.tables[t].head(idx);
            while let Some(k) = cur {
                *slot += 1;
                cur = d.entries[k].next;
            }
        }
    }
    prop_assert_eq!(counted, d.generation_used());
    prop_assert_eq!(d.entries.len(), d.len());
    match d.rehash_index() {
        Some(idx) => {
            prop_assert!(idx < d.tables[0].size());
            prop_assert!(d.tables[0].buckets[..idx].iter().all(Option::is_none));
        }
        None => prop_assert_eq!(d.generation_sizes()[1], 0),
    }
    Ok(())
}

fn full_scan<D>(d: &mut Dict<String, i32, D>) -> Vec<String>
where
    D: DictType<String, i32>,
{
    let mut out = Vec::new();
    let mut cursor = 0;
    loop {
        cursor = d.scan(cursor, |k, _| out.push(k.clone()));
        if cursor == 0 {
            return out;
        }
    }
}

// Property: State-machine equivalence against std::collections::HashMap.
// Invariants exercised across random operation sequences:
// - Duplicate inserts fail with the live handle; replace reports Inserted/Updated.
// - `find`/`contains_key` parity and handle stability across rehashing.
// - `delete` on a missing key is NotFound; `unlink` hands back the model's value.
// - Full scans and iteration yield each live key exactly once.
// - Safe iteration tolerates deleting the yielded entry and leaves rehashing unpaused.
// - Stale handles never resolve; `len` parity and structural checks after each op.
fn run_state_machine<D>(
    mut sut: Dict<String, i32, D>,
    pool: &[String],
    ops: Vec<OpI>,
) -> Result<(), TestCaseError>
where
    D: DictType<String, i32>,
{
    let mut model: HashMap<String, i32> = HashMap::new();
    let mut live: HashMap<String, EntryRef> = HashMap::new();
    let mut stale: Vec<EntryRef> = Vec::new();

    for op in ops {
        match op {
            OpI::Insert(i, v) => {
                let k = pool[i].clone();
                match sut.insert(k.clone(), v) {
                    Ok(h) => {
                        prop_assert!(!model.contains_key(&k), "insert must fail on duplicate");
                        live.insert(k.clone(), h);
                        model.insert(k, v);
                    }
                    Err(DictError::AlreadyExists(h)) => {
                        prop_assert_eq!(live.get(&k), Some(&h), "duplicate reports the live entry");
                    }
                    Err(e) => return Err(TestCaseError::fail(format!("insert failed: {e}"))),
                }
            }
            OpI::Replace(i, v) => {
                let k = pool[i].clone();
                let r = sut
                    .insert_or_replace(k.clone(), v)
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert_eq!(r == Replaced::Updated, model.contains_key(&k));
                if r == Replaced::Inserted {
                    let h = sut.find(&k);
                    prop_assert!(h.is_some());
                    live.insert(k.clone(), h.unwrap());
                }
                model.insert(k, v);
            }
            OpI::Delete(i) => {
                let k = pool[i].clone();
                let r = sut.delete(&k);
                if model.remove(&k).is_some() {
                    prop_assert_eq!(r, Ok(()));
                    stale.push(live.remove(&k).unwrap());
                } else {
                    prop_assert_eq!(r, Err(DictError::NotFound));
                }
            }
            OpI::Unlink(i) => {
                let k = pool[i].clone();
                match sut.unlink(&k) {
                    Some(u) => {
                        let expected = model.remove(&k);
                        prop_assert_eq!(u.key(), &k);
                        prop_assert_eq!(Some(u.value().clone()), expected.map(Value::Object));
                        stale.push(live.remove(&k).unwrap());
                        sut.free_unlinked(u);
                    }
                    None => prop_assert!(!model.contains_key(&k)),
                }
            }
            OpI::Find(i) => {
                let k = pool[i].clone();
                let s = sut.find(&k);
                prop_assert_eq!(s, live.get(&k).copied());
            }
            OpI::Contains(s) => {
                prop_assert_eq!(sut.contains_key(&s), model.contains_key(&s));
            }
            OpI::Mutate(i, d) => {
                let k = pool[i].clone();
                if let Some(&h) = live.get(&k) {
                    match h.value_mut(&mut sut) {
                        Some(Value::Object(v)) => *v = v.saturating_add(d),
                        _ => prop_assert!(false, "live handle should resolve to an object"),
                    }
                    if let Some(mv) = model.get_mut(&k) {
                        *mv = mv.saturating_add(d);
                    }
                }
            }
            OpI::RehashStep(n) => {
                sut.rehash_step(n);
            }
            OpI::Resize => {
                let _ = sut.resize();
            }
            OpI::Scan => {
                let keys = full_scan(&mut sut);
                prop_assert_eq!(keys.len(), model.len(), "scan yields each key once");
                let s_keys: BTreeSet<_> = keys.into_iter().collect();
                let m_keys: BTreeSet<_> = model.keys().cloned().collect();
                prop_assert_eq!(s_keys, m_keys);
            }
            OpI::SafeDelete(i) => {
                let target = pool[i].clone();
                let before = model.len();
                let mut visited = 0;
                let mut it = sut.safe_iter();
                while let Some(e) = it.next() {
                    visited += 1;
                    if e.key(it.dict_ref()) == Some(&target) {
                        prop_assert_eq!(it.dict().delete(&target), Ok(()));
                    }
                }
                drop(it);
                prop_assert_eq!(visited, before);
                if model.remove(&target).is_some() {
                    stale.push(live.remove(&target).unwrap());
                }
            }
            OpI::Sample(n) => {
                let s = sut.sample(n);
                prop_assert!(s.len() <= n.min(model.len()));
                let mut seen = HashSet::new();
                for h in s {
                    let k = h.key(&sut);
                    prop_assert!(k.is_some(), "sampled handle must be live");
                    prop_assert!(seen.insert(h), "sample repeats an entry");
                }
            }
            OpI::Iterate => {
                let s_keys: BTreeSet<_> = sut.iter().map(|(k, _)| k.clone()).collect();
                let m_keys: BTreeSet<_> = model.keys().cloned().collect();
                prop_assert_eq!(s_keys, m_keys);
            }
        }

        // Post-conditions after each op
        for &h in &stale {
            prop_assert!(h.value(&sut).is_none());
        }
        prop_assert_eq!(sut.len(), model.len());
        prop_assert_eq!(sut.is_empty(), model.is_empty());
        prop_assert!(!sut.is_paused());
        check_structure(&sut)?;
    }

    for (k, v) in &model {
        prop_assert_eq!(sut.fetch_value(k), Some(&Value::Object(*v)));
    }
    Ok(())
}

fn pinned() -> DictConfig {
    DictConfig::default().with_resize_policy(ResizePolicy::Enabled)
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        let sut: Dict<String, i32> = Dict::with_config(HashedKeys::new(), pinned());
        run_state_machine(sut, &pool, ops)?;
    }
}

// Collision variant using a constant hash to stress equality resolution
// within a single chain, through every resize and migration.
struct ConstKeys;
impl DictType<String, i32> for ConstKeys {
    fn hash(&self, _key: &String) -> u64 {
        0
    }
    fn key_eq(&self, a: &String, b: &String) -> bool {
        a == b
    }
}

// Property: Same state-machine invariants as above, under worst-case
// collision behavior.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_with_collisions((pool, ops) in arb_scenario()) {
        let sut: Dict<String, i32, ConstKeys> = Dict::with_config(ConstKeys, pinned());
        run_state_machine(sut, &pool, ops)?;
    }
}

// Property: the same sequences under `AvoidIfPossible`, where growth waits
// for the force-resize ratio and small rehashes are held back.
proptest! {
    #![proptest_config(ProptestConfig { cases: 32, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_avoid_policy((pool, ops) in arb_scenario()) {
        let cfg = DictConfig::default().with_resize_policy(ResizePolicy::AvoidIfPossible);
        let sut: Dict<String, i32> = Dict::with_config(HashedKeys::new(), cfg);
        run_state_machine(sut, &pool, ops)?;
    }
}
