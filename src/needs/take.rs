use std::collections::BTreeMap;

use log::warn;

use super::{Needs, Values};

/// Renames slots when one [Needs] takes values from another.
///
/// Maps a slot name of the source to a slot name of the destination. Keys are
/// unique and iterate in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyMap(BTreeMap<String, String>);

impl KeyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route the source slot `from` into the destination slot `to`,
    /// returning the previous destination for `from`.
    pub fn insert(&mut self, from: impl Into<String>, to: impl Into<String>) -> Option<String> {
        self.0.insert(from.into(), to.into())
    }

    pub fn get(&self, from: &str) -> Option<&str> {
        self.0.get(from).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for KeyMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for KeyMap {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl<T: Clone + 'static, E: Clone + 'static> Needs<T, E> {
    /// Fill this `Needs` from `source`, matching slots by name.
    ///
    /// Equivalent to [Needs::take_with] with an empty [KeyMap].
    pub fn take(&self, source: &Needs<T, E>) -> &Self {
        self.take_with(source, KeyMap::new())
    }

    /// Fill this `Needs` from `source` once `source` is kept.
    ///
    /// Each of `source`'s slots goes to the slot of the same name here, if
    /// there is one. A `map` entry sends a source slot to a different slot
    /// instead, and wins over a same-named match for that destination.
    /// Source slots with nowhere to go are ignored. If `source` fails, this
    /// `Needs` fails with the same [super::Failure].
    ///
    /// ```
    /// use ::needs::{needs, needs::Needs};
    ///
    /// let p1: Needs<i32> = needs!("foo", "bar", "baz");
    /// let p2: Needs<i32> = needs!("foo", "bar", "buz", "qux");
    ///
    /// p1.take_with(&p2, [("qux", "bar"), ("buz", "baz")]);
    /// p2.keep("foo", 1)?.keep("bar", 2)?.keep("buz", 3)?.keep("qux", 4)?;
    ///
    /// let values = p1.values().unwrap();
    /// assert_eq!(values.get("foo"), Some(&1));
    /// assert_eq!(values.get("bar"), Some(&4));
    /// assert_eq!(values.get("baz"), Some(&3));
    /// # Ok::<(), ::needs::needs::UsageError>(())
    /// ```
    pub fn take_with(&self, source: &Needs<T, E>, map: impl Into<KeyMap>) -> &Self {
        let map = map.into();

        let dest = self.clone();
        source.on_fail(move |failure| {
            dest.settle_failed(failure.clone());
        });

        let dest = self.clone();
        source.on_keep(move |got| dest.absorb(got, &map));

        self
    }

    /// Work out which destination slot each of `got`'s values lands in.
    fn stage(&self, got: &Values<T>, map: &KeyMap) -> BTreeMap<String, Option<T>> {
        let inner = self.inner.borrow();
        let mut staged = BTreeMap::new();

        for (name, value) in got.entries() {
            if inner.slots.is_declared(name) {
                staged.insert(name.clone(), value.clone());
            }
        }

        for (name, value) in got.entries() {
            if let Some(to) = map.get(name) {
                if inner.slots.is_declared(to) {
                    staged.insert(to.to_owned(), value.clone());
                }
            }
        }

        staged
    }

    fn absorb(&self, got: &Values<T>, map: &KeyMap) {
        for (name, value) in self.stage(got, map) {
            // Another source may already have filled this slot; there is no
            // caller to hand the error to.
            if let Err(e) = self.keep(&name, value) {
                warn!("not forwarding into {name:?}: {e}");
            }
        }
    }
}
