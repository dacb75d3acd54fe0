//! Allocation-only change detection
//!
//! Decides whether an edit only redistributes traffic among buckets that
//! were already active. Only such edits are cascaded to downstream
//! environments without review.

use std::collections::BTreeMap;

use crate::model::{Range, TestDefinition};

/// Sum range lengths per bucket value.
pub fn allocation_range_map(ranges: &[Range]) -> BTreeMap<i32, f64> {
    let mut map = BTreeMap::new();
    for range in ranges {
        *map.entry(range.bucket_value).or_insert(0.0) += range.length;
    }
    map
}

/// True when `updated` differs from `existing` at most in range lengths.
///
/// Rules, in order:
/// 1. the targeting rule is identical (`None` differs from `Some("")`)
/// 2. constants, special constants, test type and salt are equal, the bucket
///    lists have the same names and the allocation counts match
/// 3. buckets at each position agree on value, payload and description
/// 4. allocations at each position agree on rule and on the set of bucket
///    values they reference; a bucket at exactly zero must stay at zero
pub fn is_allocation_only_change(existing: &TestDefinition, updated: &TestDefinition) -> bool {
    if existing.rule != updated.rule {
        return false;
    }

    if existing.constants != updated.constants
        || existing.special_constants != updated.special_constants
        || existing.test_type != updated.test_type
        || existing.salt != updated.salt
    {
        return false;
    }
    if existing.buckets.len() != updated.buckets.len()
        || existing.allocations.len() != updated.allocations.len()
    {
        return false;
    }

    for (old, new) in existing.buckets.iter().zip(&updated.buckets) {
        if old.name != new.name
            || old.value != new.value
            || old.payload != new.payload
            || old.description != new.description
        {
            return false;
        }
    }

    for (old, new) in existing.allocations.iter().zip(&updated.allocations) {
        if old.rule != new.rule {
            return false;
        }
        let old_map = allocation_range_map(&old.ranges);
        let new_map = allocation_range_map(&new.ranges);
        if !old_map.keys().eq(new_map.keys()) {
            return false;
        }
        for (value, old_length) in &old_map {
            if *old_length == 0.0 && new_map.get(value).copied() != Some(0.0) {
                return false;
            }
        }
    }

    true
}
