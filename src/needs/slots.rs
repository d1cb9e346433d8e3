use std::collections::BTreeMap;

use super::UsageError;

struct Slot {
    name: String,
    filled: bool,
}

/// The fixed set of names a [super::Needs] waits on.
///
/// Names are declared once, at construction; duplicates collapse onto the
/// first declaration. `unfilled` is kept up to date so checking for
/// completion after each fill is O(1).
pub(super) struct SlotRegistry {
    slots: Vec<Slot>,
    index: BTreeMap<String, usize>,
    unfilled: usize,
}

impl SlotRegistry {
    pub fn new<I>(names: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut slots = Vec::new();
        let mut index = BTreeMap::new();

        for name in names {
            let name = name.into();
            if index.contains_key(&name) {
                continue;
            }

            index.insert(name.clone(), slots.len());
            slots.push(Slot {
                name,
                filled: false,
            });
        }

        let unfilled = slots.len();

        Self {
            slots,
            index,
            unfilled,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn is_filled(&self, name: &str) -> bool {
        self.index
            .get(name)
            .is_some_and(|&idx| self.slots[idx].filled)
    }

    pub fn all_filled(&self) -> bool {
        self.unfilled == 0
    }

    /// Find the slot for `name`, failing if it can't be filled.
    pub fn check(&self, name: &str) -> Result<usize, UsageError> {
        let &idx = self
            .index
            .get(name)
            .ok_or_else(|| UsageError::NotNeeded(name.to_owned()))?;

        if self.slots[idx].filled {
            return Err(UsageError::AlreadyKept(name.to_owned()));
        }

        Ok(idx)
    }

    /// Mark a slot returned by [SlotRegistry::check] as filled.
    pub fn fill(&mut self, idx: usize) {
        let slot = &mut self.slots[idx];
        if !slot.filled {
            slot.filled = true;
            self.unfilled -= 1;
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.slots.iter().map(|slot| slot.name.as_str())
    }

    pub fn unfilled(&self) -> Vec<String> {
        self.slots
            .iter()
            .filter(|slot| !slot.filled)
            .map(|slot| slot.name.clone())
            .collect()
    }
}
