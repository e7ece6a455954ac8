//! # IDs
//!
//! Scene objects, entities, and scene-graph nodes all need identity that is stable for
//! the life of the process and namespaced by what it refers to. `Id<T>` provides that:
//! a process-unique `u64` tagged with a marker type, so an object id can never be
//! confused for a node id at compile time.
//!
//! Ids are never reused. A committed copy of a draft object gets a *fresh* id on
//! purpose, so that anything keyed by id (renderers, cached extents) is re-evaluated.

static NEXT: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);

/// A process-unique ID, namespaced by `T`.
///
/// Ids of differing namespaces never compare, even if their numeric values collide
/// (they won't - the counter is shared - but don't rely on that either).
pub struct Id<T> {
    value: std::num::NonZeroU64,
    // `fn() -> T` keeps the namespace without inheriting `T`'s auto traits.
    _namespace: std::marker::PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    /// Allocate the next unused ID in this process.
    #[must_use]
    pub fn fresh() -> Self {
        let value = NEXT.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        // Exhausting u64::MAX ids by single increments is unreachable in any real
        // session, but a wrapped counter would hand out duplicate identity, which
        // nothing downstream can survive. Die loudly instead.
        let Some(value) = std::num::NonZeroU64::new(value) else {
            std::process::abort();
        };
        Self {
            value,
            _namespace: std::marker::PhantomData,
        }
    }
    /// The raw numeric value. Only meaningful within this process.
    #[must_use]
    pub fn value(self) -> u64 {
        self.value.get()
    }
}

// Manual impls - derives would incorrectly bound `T`.
impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Id<T> {}
impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}
impl<T> Eq for Id<T> {}
impl<T> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<T> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}
impl<T> std::hash::Hash for Id<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}
impl<T> std::fmt::Display for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Last path segment only - `inkstage_core::state::object::ObjectState#3` is noise.
        let name = std::any::type_name::<T>().rsplit("::").next().unwrap();
        write!(f, "{name}#{}", self.value)
    }
}
impl<T> std::fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Display>::fmt(self, f)
    }
}

#[cfg(test)]
mod test {
    use super::Id;

    struct Namespace;
    struct OtherNamespace;

    #[test]
    fn unique() {
        let mut ids: Vec<_> = (0..1024).map(|_| Id::<Namespace>::fresh()).collect();
        ids.sort_unstable();
        let before = ids.len();
        ids.dedup();
        assert_eq!(before, ids.len(), "duplicate ids handed out");
    }
    #[test]
    fn display_uses_short_name() {
        let id = Id::<OtherNamespace>::fresh();
        let shown = id.to_string();
        assert!(shown.starts_with("OtherNamespace#"), "got {shown}");
    }
}
