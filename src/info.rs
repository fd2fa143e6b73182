use std::collections::BTreeMap;

use crate::error::IbeError;

/// Request parameters and result-table rows, keyed by field name.
///
/// Lookups treat blank values as absent, so `Some` always carries text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoMap {
    fields: BTreeMap<String, String>,
}

impl InfoMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        self.fields.insert(key.to_string(), value.to_string());
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// First non-blank value among `keys`, in order.
    pub fn first_of(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| self.get(key))
    }

    pub fn require(&self, key: &str) -> Result<&str, IbeError> {
        self.get(key)
            .ok_or_else(|| IbeError::MissingField(key.to_string()))
    }

    pub fn require_any(&self, keys: &[&str]) -> Result<&str, IbeError> {
        self.first_of(keys)
            .ok_or_else(|| IbeError::MissingField(keys.join("|")))
    }

    /// Parses a non-negative integer field.
    pub fn require_u32(&self, key: &str) -> Result<u32, IbeError> {
        let value = self.require(key)?;
        value
            .parse::<u32>()
            .or_else(|_| {
                // table readers hand integer columns over as "76.0" at times
                value
                    .parse::<f64>()
                    .ok()
                    .filter(|number| {
                        number.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(number)
                    })
                    .map(|number| number as u32)
                    .ok_or(())
            })
            .map_err(|_| IbeError::invalid(key, value))
    }

    pub fn is_true(&self, key: &str) -> bool {
        self.get(key)
            .map(|value| matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "mcen"))
            .unwrap_or(false)
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for InfoMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = InfoMap::new();
        for (key, value) in iter {
            map.insert(key.as_ref(), value.as_ref());
        }
        map
    }
}
