use std::fmt::{Debug, Display};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use crossbeam::atomic::AtomicCell;

pub type LocalIdValue = u64;
static LOCAL_ID_COUNTER: AtomicCell<LocalIdValue> = AtomicCell::new(1);

/// A process-local identifier for resources that only live in memory,
/// such as live connections. Never persisted, never reused within a process.
pub struct LocalId<T> {
    value: LocalIdValue,
    kind: PhantomData<fn() -> T>,
}

impl<T> LocalId<T> {
    pub fn new() -> Self {
        Self {
            value: LOCAL_ID_COUNTER.fetch_add(1),
            kind: PhantomData,
        }
    }

    pub fn value(&self) -> LocalIdValue {
        self.value
    }
}

impl<T> Default for LocalId<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Debug for LocalId<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.value)
    }
}

impl<T> Display for LocalId<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<T> PartialEq for LocalId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for LocalId<T> {}

impl<T> Hash for LocalId<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state)
    }
}

impl<T> Clone for LocalId<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for LocalId<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    struct Marker;

    #[test]
    fn ids_are_unique_and_copyable() {
        let a = LocalId::<Marker>::new();
        let b = LocalId::<Marker>::new();
        let c = a;

        assert_ne!(a, b);
        assert_eq!(a, c);
        assert!(b.value() > a.value());
    }
}
