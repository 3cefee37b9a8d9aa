//! Persistent and volatile parameter slots owned by a tracker.

use crate::core::param::{Param, ParamOption, ValueSource};

/// Ordered parameter buffer.
///
/// A key lives in at most one of the two slots. Setting a key with
/// `persistent = true` moves it out of the volatile slot and vice versa.
#[derive(Debug, Clone, Default)]
pub struct Buffer {
    persistent: Vec<Param>,
    volatile: Vec<Param>,
}

impl Buffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter.
    ///
    /// With `options.append` the value is added to the existing param in the
    /// target slot (if any); otherwise the param is replaced in place, keeping
    /// its position.
    pub fn set_param(&mut self, key: &str, value: impl Into<ValueSource>, options: ParamOption) {
        let value = value.into();
        let (target, other) = if options.persistent {
            (&mut self.persistent, &mut self.volatile)
        } else {
            (&mut self.volatile, &mut self.persistent)
        };

        // Appending to a param from the other slot carries its sources over.
        let mut carried = Vec::new();
        if let Some(pos) = other.iter().position(|p| p.key == key) {
            let moved = other.remove(pos);
            if options.append {
                carried = moved.values;
            }
        }

        match target.iter_mut().find(|p| p.key == key) {
            Some(existing) if options.append => {
                existing.values.extend(carried);
                existing.values.push(value);
                existing.options = options;
            }
            Some(existing) => {
                existing.values = vec![value];
                existing.options = options;
            }
            None => {
                carried.push(value);
                target.push(Param {
                    key: key.to_string(),
                    values: carried,
                    options,
                });
            }
        }
    }

    /// Remove a key from both slots.
    pub fn unset_param(&mut self, key: &str) {
        self.persistent.retain(|p| p.key != key);
        self.volatile.retain(|p| p.key != key);
    }

    pub fn get(&self, key: &str) -> Option<&Param> {
        self.persistent
            .iter()
            .chain(self.volatile.iter())
            .find(|p| p.key == key)
    }

    pub fn persistent(&self) -> &[Param] {
        &self.persistent
    }

    pub fn volatile(&self) -> &[Param] {
        &self.volatile
    }

    pub fn clear_volatile(&mut self) {
        self.volatile.clear();
    }

    /// Take a snapshot for one build pass and reset the volatile slot.
    pub fn take_for_build(&mut self) -> (Vec<Param>, Vec<Param>) {
        (self.persistent.clone(), std::mem::take(&mut self.volatile))
    }
}
