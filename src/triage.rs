//! Grouping of input addresses by domain.

use std::collections::btree_map;
use std::collections::{BTreeMap, HashSet};

/// Domain → addresses, in arrival order. Built once by [`triage`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriageMap {
    buckets: BTreeMap<String, Vec<String>>,
}

impl TriageMap {
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn bucket(&self, domain: &str) -> Option<&[String]> {
        self.buckets.get(domain).map(Vec::as_slice)
    }

    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.buckets.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Vec<String>> {
        self.buckets.iter()
    }

    /// Total number of addresses across all buckets.
    pub fn address_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}

impl IntoIterator for TriageMap {
    type Item = (String, Vec<String>);
    type IntoIter = btree_map::IntoIter<String, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.buckets.into_iter()
    }
}

/// Returns the domain part of `address`, or `None` when the address does not
/// contain exactly one `@` followed by a non-empty domain.
pub fn domain_of(address: &str) -> Option<&str> {
    let (_, domain) = address.split_once('@')?;
    if domain.is_empty() || domain.contains('@') {
        None
    } else {
        Some(domain)
    }
}

/// Splits `addresses` into per-domain buckets.
///
/// Addresses without a usable domain part are dropped on purpose: they never
/// show up in any later result, not even as an error. Within a bucket the
/// arrival order is kept and a repeated address is kept once, at its first
/// position.
pub fn triage<I, S>(addresses: I) -> TriageMap
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut buckets: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut seen: HashSet<String> = HashSet::new();
    for address in addresses {
        let address = address.as_ref();
        let Some(domain) = domain_of(address) else {
            continue;
        };
        if seen.contains(address) {
            continue;
        }
        seen.insert(address.to_string());
        buckets
            .entry(domain.to_string())
            .or_default()
            .push(address.to_string());
    }
    TriageMap { buckets }
}
