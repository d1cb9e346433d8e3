use std::collections::BTreeMap;

/// The values a [super::Needs] has collected, by slot name.
///
/// A slot kept with no value (`None`) is present but empty: [Values::contains]
/// is `true` while [Values::get] returns `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Values<T>(BTreeMap<String, Option<T>>);

impl<T> Default for Values<T> {
    fn default() -> Self {
        Self(BTreeMap::new())
    }
}

impl<T> Values<T> {
    pub fn get(&self, name: &str) -> Option<&T> {
        self.0.get(name)?.as_ref()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&T>)> + '_ {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    pub fn into_inner(self) -> BTreeMap<String, Option<T>> {
        self.0
    }

    pub(super) fn insert(&mut self, name: String, value: Option<T>) {
        self.0.insert(name, value);
    }

    pub(super) fn entries(&self) -> impl Iterator<Item = (&String, &Option<T>)> + '_ {
        self.0.iter()
    }
}
