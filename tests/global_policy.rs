// Process-wide resize policy.
//
// Kept in its own test binary: the policy is global state, and unit or
// integration tests in other binaries rely on the default.
use rehash_dict::{resize_policy, set_resize_policy, Dict, DictConfig, HashedKeys, ResizePolicy};

// Test: the global switch reaches tables that follow it, and not pinned ones.
// Assumes: tables created without an override follow the global policy.
// Verifies: Forbidden stops growth and migration for following tables;
// restoring Enabled lets them resize again.
#[test]
fn global_policy_drives_unpinned_tables() {
    assert_eq!(resize_policy(), ResizePolicy::Enabled);

    let mut follows: Dict<u64, u64> = Dict::new();
    let pinned_cfg = DictConfig::default().with_resize_policy(ResizePolicy::Enabled);
    let mut pinned: Dict<u64, u64> = Dict::with_config(HashedKeys::new(), pinned_cfg);

    set_resize_policy(ResizePolicy::Forbidden);
    assert_eq!(resize_policy(), ResizePolicy::Forbidden);
    for k in 0..64u64 {
        follows.insert(k, k).unwrap();
        pinned.insert(k, k).unwrap();
    }
    assert_eq!(follows.generation_sizes(), [4, 0]);
    assert!(pinned.slots() > 4);
    assert!(follows.resize().is_err());

    set_resize_policy(ResizePolicy::Enabled);
    follows.insert(64, 64).unwrap();
    assert!(follows.is_rehashing());
    while follows.rehash_step(100) {}
    assert_eq!(follows.generation_sizes(), [128, 0]);
    assert_eq!(follows.len(), 65);
}
