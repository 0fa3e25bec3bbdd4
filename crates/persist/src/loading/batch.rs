//! Owner keys and the bounded key batches bound into a static select

use std::fmt;

use crate::backends::DatabaseValue;
use crate::error::{OrmError, OrmResult};

/// Identifier value(s) of an entity owning a collection
#[derive(Debug, Clone, PartialEq)]
pub struct OwnerKey(Vec<DatabaseValue>);

impl OwnerKey {
    /// Multi-column identifier, values in key column order
    pub fn composite(values: Vec<DatabaseValue>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[DatabaseValue] {
        &self.0
    }

    pub fn width(&self) -> usize {
        self.0.len()
    }

    /// Key column comparison against values read from a row
    pub fn matches(&self, values: &[DatabaseValue]) -> bool {
        self.0.len() == values.len() && self.0.iter().zip(values).all(|(a, b)| a.key_eq(b))
    }
}

impl From<DatabaseValue> for OwnerKey {
    fn from(value: DatabaseValue) -> Self {
        Self(vec![value])
    }
}

macro_rules! single_column_key {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for OwnerKey {
                fn from(value: $ty) -> Self {
                    Self(vec![DatabaseValue::from(value)])
                }
            }
        )*
    };
}

single_column_key!(i32, i64, String, &str, uuid::Uuid);

impl fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let render = |value: &DatabaseValue| match value {
            DatabaseValue::String(s) => s.clone(),
            DatabaseValue::Int32(i) => i.to_string(),
            DatabaseValue::Int64(i) => i.to_string(),
            DatabaseValue::Uuid(u) => u.to_string(),
            other => format!("{:?}", other),
        };
        match self.0.as_slice() {
            [single] => f.write_str(&render(single)),
            values => {
                let parts: Vec<String> = values.iter().map(render).collect();
                write!(f, "({})", parts.join(", "))
            }
        }
    }
}

/// Ordered, bounded set of owner keys supplied to one load call
#[derive(Debug, Clone, PartialEq)]
pub struct BatchKeySet {
    capacity: usize,
    keys: Vec<OwnerKey>,
}

impl BatchKeySet {
    /// Empty batch holding at most `capacity` keys
    pub fn new(capacity: usize) -> OrmResult<Self> {
        if capacity == 0 {
            return Err(OrmError::InvalidBatchSize(capacity));
        }
        Ok(Self {
            capacity,
            keys: Vec::with_capacity(capacity),
        })
    }

    /// Batch from keys in order; duplicates are dropped
    pub fn from_keys<K>(capacity: usize, keys: impl IntoIterator<Item = K>) -> OrmResult<Self>
    where
        K: Into<OwnerKey>,
    {
        let mut batch = Self::new(capacity)?;
        for key in keys {
            batch.insert(key)?;
        }
        Ok(batch)
    }

    /// Add a key; returns false if it was already present.
    ///
    /// Fails for keys with NULL components, keys whose width differs from
    /// the keys already in the batch, or when the batch is full.
    pub fn insert(&mut self, key: impl Into<OwnerKey>) -> OrmResult<bool> {
        let key = key.into();

        if key.width() == 0 || key.values().iter().any(DatabaseValue::is_null) {
            return Err(OrmError::InvalidKey(format!("Owner key {} has an empty or NULL component", key)));
        }
        if let Some(first) = self.keys.first() {
            if first.width() != key.width() {
                return Err(OrmError::InvalidKey(format!(
                    "Owner key {} has {} columns, batch keys have {}",
                    key,
                    key.width(),
                    first.width()
                )));
            }
        }
        if self.keys.iter().any(|existing| existing.matches(key.values())) {
            return Ok(false);
        }
        if self.keys.len() == self.capacity {
            return Err(OrmError::InvalidKey(format!(
                "Batch is full with {} keys, cannot add {}",
                self.capacity, key
            )));
        }

        self.keys.push(key);
        Ok(true)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OwnerKey> {
        self.keys.iter()
    }

    /// Key width shared by every key, if any key was inserted
    pub fn key_width(&self) -> Option<usize> {
        self.keys.first().map(OwnerKey::width)
    }
}

impl fmt::Display for BatchKeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self.keys.iter().map(ToString::to_string).collect();
        write!(f, "<{}>", keys.join(", "))
    }
}
