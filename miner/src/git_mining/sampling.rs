//! Balanced random selection of two populations.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Draw up to `target_per_group` items from each group without replacement,
/// then cut both draws to the shorter one.
///
/// Both outputs have length `min(target_per_group, a.len(), b.len())`.
pub fn balance<T, R>(a: Vec<T>, b: Vec<T>, target_per_group: usize, rng: &mut R) -> (Vec<T>, Vec<T>)
where
    R: Rng + ?Sized,
{
    let mut picked_a = sample(a, target_per_group, rng);
    let mut picked_b = sample(b, target_per_group, rng);

    let keep = picked_a.len().min(picked_b.len());
    picked_a.truncate(keep);
    picked_b.truncate(keep);
    (picked_a, picked_b)
}

/// Uniform sample of `amount` items, in draw order.
fn sample<T, R>(group: Vec<T>, amount: usize, rng: &mut R) -> Vec<T>
where
    R: Rng + ?Sized,
{
    let amount = amount.min(group.len());
    if amount == 0 {
        return Vec::new();
    }

    let picks = index::sample(rng, group.len(), amount);
    let mut slots: Vec<Option<T>> = group.into_iter().map(Some).collect();
    picks
        .into_iter()
        .filter_map(|i| slots.get_mut(i).and_then(Option::take))
        .collect()
}

/// Seed for one repository's draw, stable across restarts of the same build.
pub fn repository_seed(seed: u64, repository: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    repository.hash(&mut hasher);
    hasher.finish()
}

pub fn repository_rng(seed: u64, repository: &str) -> StdRng {
    StdRng::seed_from_u64(repository_seed(seed, repository))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_equal_length_output() {
        for (a_len, b_len, k) in [(5, 3, 10), (5, 3, 2), (0, 4, 3), (4, 0, 3), (6, 6, 0), (10, 10, 10)] {
            let a: Vec<u32> = (0..a_len).collect();
            let b: Vec<u32> = (100..100 + b_len).collect();
            let (sa, sb) = balance(a, b, k, &mut rng());
            let expected = k.min(a_len as usize).min(b_len as usize);
            assert_eq!(sa.len(), expected, "a={a_len} b={b_len} k={k}");
            assert_eq!(sb.len(), expected, "a={a_len} b={b_len} k={k}");
        }
    }

    #[test]
    fn test_empty_inputs() {
        let (a, b) = balance(Vec::<u8>::new(), Vec::new(), 5, &mut rng());
        assert!(a.is_empty() && b.is_empty());
    }

    #[test]
    fn test_draws_without_replacement_from_own_group() {
        let a: Vec<u32> = (0..20).collect();
        let b: Vec<u32> = (100..120).collect();
        let (sa, sb) = balance(a, b, 8, &mut rng());

        assert_eq!(sa.iter().collect::<HashSet<_>>().len(), 8);
        assert!(sa.iter().all(|x| *x < 20));
        assert!(sb.iter().all(|x| (100..120).contains(x)));
    }

    #[test]
    fn test_same_seed_same_selection() {
        let run = || {
            let a: Vec<String> = (0..30).map(|i| format!("ai_{i}.py")).collect();
            let b: Vec<String> = (0..30).map(|i| format!("human_{i}.py")).collect();
            balance(a, b, 5, &mut repository_rng(3, "octo/repo"))
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_repository_seed_depends_on_both_inputs() {
        assert_eq!(repository_seed(1, "octo/a"), repository_seed(1, "octo/a"));
        assert_ne!(repository_seed(1, "octo/a"), repository_seed(1, "octo/b"));
        assert_ne!(repository_seed(1, "octo/a"), repository_seed(2, "octo/a"));
    }
}
