//! Set-at-a-time merge helpers for fan-in.

use std::collections::BTreeSet;

/// Result of a deduplicating merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merged<T> {
    pub items: Vec<T>,

    /// Items dropped because their key was already taken.
    pub duplicates: usize,
}

/// Drop duplicate keys, keeping the first occurrence at its position.
pub fn keep_first<T, K, F>(items: impl IntoIterator<Item = T>, key: F) -> Merged<T>
where
    K: Ord,
    F: Fn(&T) -> K,
{
    let mut seen = BTreeSet::new();
    let mut duplicates = 0;
    let mut out = Vec::new();

    for item in items {
        if seen.insert(key(&item)) {
            out.push(item);
        } else {
            duplicates += 1;
        }
    }

    Merged {
        items: out,
        duplicates,
    }
}

/// Drop duplicate keys, keeping the last occurrence at its position.
pub fn keep_last<T, K, F>(items: impl IntoIterator<Item = T>, key: F) -> Merged<T>
where
    K: Ord,
    F: Fn(&T) -> K,
{
    let items: Vec<T> = items.into_iter().collect();
    let mut merged = keep_first(items.into_iter().rev(), key);
    merged.items.reverse();
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keep_first() {
        let merged = keep_first(vec![(1, "a"), (2, "b"), (1, "c")], |(k, _)| *k);
        assert_eq!(merged.items, vec![(1, "a"), (2, "b")]);
        assert_eq!(merged.duplicates, 1);
    }

    #[test]
    fn test_keep_last() {
        let merged = keep_last(vec![(1, "a"), (2, "b"), (1, "c")], |(k, _)| *k);
        assert_eq!(merged.items, vec![(2, "b"), (1, "c")]);
        assert_eq!(merged.duplicates, 1);
    }

    #[test]
    fn test_no_duplicates_is_identity() {
        let merged = keep_last(vec![3, 1, 2], |v| *v);
        assert_eq!(merged.items, vec![3, 1, 2]);
        assert_eq!(merged.duplicates, 0);
    }
}
