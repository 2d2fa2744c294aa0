use super::{stream::Aggregation, Bucket};
use crate::{Entity, Value};

/// Per-entity query results.
///
/// Every requested entity has an entry; an entity whose readings could not be
/// fetched carries its own error without affecting the others.
///
/// Call `.collect()` to get all results, failing if any entity failed.
pub struct Grouped<T>(pub(crate) crate::HashMap<Entity, crate::Result<T>>);

impl<T> std::ops::Deref for Grouped<T> {
    type Target = crate::HashMap<Entity, crate::Result<T>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> IntoIterator for Grouped<T> {
    type Item = (Entity, crate::Result<T>);
    type IntoIter = std::collections::hash_map::IntoIter<Entity, crate::Result<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<T> Grouped<T> {
    /// Consumes all entities, returning a dictionary mapping each entity to its result.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered, if any entity failed.
    pub fn collect(self) -> crate::Result<crate::HashMap<Entity, T>> {
        let mut map =
            crate::HashMap::with_capacity_and_hasher(self.0.len(), rustc_hash::FxBuildHasher);

        for (entity, result) in self.0 {
            map.insert(entity, result?);
        }

        Ok(map)
    }
}

/// Adds a member's series into the group's, bucket by bucket.
///
/// Both series must come from the same plan.
pub(crate) fn merge_series<A: Aggregation>(
    group: &mut [Bucket<A::Output>],
    member: Vec<Bucket<A::Output>>,
) {
    debug_assert_eq!(group.len(), member.len(), "members planned differently");

    for (total, bucket) in group.iter_mut().zip(member) {
        debug_assert_eq!(total.start, bucket.start);
        A::merge(&mut total.value, bucket.value);
    }
}

/// Adds a member's sparse rollup rows into the group's, matching rows by start.
pub(crate) fn merge_rollups(
    group: Vec<Bucket<Value>>,
    member: Vec<Bucket<Value>>,
) -> Vec<Bucket<Value>> {
    let mut rows = std::collections::BTreeMap::new();

    for bucket in group.into_iter().chain(member) {
        let value = bucket.value;
        rows.entry(bucket.start)
            .and_modify(|total: &mut Bucket<Value>| total.value += value)
            .or_insert(bucket);
    }

    rows.into_values().collect()
}
