//! Ordering properties checked over generated catalogs

use std::collections::HashSet;

use addonctl_common::ConfigIssue;
use addonctl_core::{resolve, AddonDescriptor, AddonRegistry};
use rstest::rstest;

/// Small deterministic generator so failures reproduce from the seed alone
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

/// Acyclic catalog: addon `i` may only depend on addons with a lower index.
/// The catalog is then shuffled so registration order says nothing about
/// dependency order.
fn generated_dag(seed: u64, size: usize) -> Vec<AddonDescriptor> {
    let mut rng = Lcg(seed);
    let mut addons: Vec<AddonDescriptor> = (0..size)
        .map(|i| {
            let deps: Vec<String> = (0..i)
                .filter(|_| rng.below(4) == 0)
                .map(|j| format!("addon-{}", j))
                .collect();
            AddonDescriptor::new(format!("addon-{}", i)).depends_on(deps)
        })
        .collect();
    for i in (1..addons.len()).rev() {
        let j = rng.below(i as u64 + 1) as usize;
        addons.swap(i, j);
    }
    addons
}

/// Disable a random subset of addons nothing depends on, which keeps the
/// enabled set closed under dependencies.
fn disable_leaves(addons: &mut [AddonDescriptor], seed: u64) -> HashSet<String> {
    let mut rng = Lcg(seed ^ 0x5eed);
    let depended_on: HashSet<String> = addons
        .iter()
        .flat_map(|a| a.depends_on.iter().cloned())
        .collect();
    let mut disabled = HashSet::new();
    for addon in addons.iter_mut() {
        if !depended_on.contains(&addon.id) && rng.below(3) == 0 {
            addon.enabled = false;
            disabled.insert(addon.id.clone());
        }
    }
    disabled
}

#[rstest]
#[case(1, 8)]
#[case(7, 12)]
#[case(42, 20)]
#[case(1337, 30)]
#[case(90210, 40)]
fn every_dependency_precedes_its_dependent(#[case] seed: u64, #[case] size: usize) {
    let mut addons = generated_dag(seed, size);
    let disabled = disable_leaves(&mut addons, seed);
    let registry = AddonRegistry::new(addons).unwrap();

    let order = resolve::<&str>(&registry, &[]).unwrap();

    let unique: HashSet<&String> = order.iter().collect();
    assert_eq!(unique.len(), order.len(), "ids appear at most once");
    assert_eq!(order.len(), size - disabled.len(), "exactly the enabled set");
    for id in &order {
        assert!(!disabled.contains(id));
        let addon = registry.get(id).unwrap();
        let pos = order.iter().position(|x| x == id).unwrap();
        for dep in &addon.depends_on {
            let dep_pos = order.iter().position(|x| x == dep).unwrap();
            assert!(dep_pos < pos, "{} must precede {}", dep, id);
        }
    }
}

#[rstest]
#[case(3, 15)]
#[case(11, 25)]
fn resolution_is_deterministic(#[case] seed: u64, #[case] size: usize) {
    let registry = AddonRegistry::new(generated_dag(seed, size)).unwrap();

    let first = resolve::<&str>(&registry, &[]).unwrap();
    for _ in 0..5 {
        assert_eq!(resolve::<&str>(&registry, &[]).unwrap(), first);
    }
}

#[rstest]
#[case(5, 10)]
#[case(21, 18)]
fn closing_a_loop_is_reported_as_cycle(#[case] seed: u64, #[case] size: usize) {
    let mut addons = generated_dag(seed, size);
    // addon-1 -> addon-0 -> addon-1, whatever else was generated
    for addon in addons.iter_mut() {
        if addon.id == "addon-0" {
            *addon = addon.clone().depends_on(["addon-1"]);
        } else if addon.id == "addon-1" {
            *addon = addon.clone().depends_on(["addon-0"]);
        }
    }
    let registry = AddonRegistry::new(addons).unwrap();

    let err = resolve::<&str>(&registry, &[]).unwrap_err();

    assert_eq!(err.config_issue(), Some(ConfigIssue::Cycle));
}
