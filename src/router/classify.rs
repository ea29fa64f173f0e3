//! Payload classification.
//!
//! [`Classifier::classify`] extracts the separator value from a JSON
//! payload. The payload shape is picked from the first significant byte
//! so non-JSON traffic is rejected without running the parser. For a JSON
//! array the first element stands for the whole batch.

use serde_json::{Map, Value};

use crate::error::ClassifyError;

/// Framing of a payload, decided by its first non-whitespace byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    Object,
    Array,
    Invalid,
}

impl PayloadShape {
    #[must_use]
    pub fn of(payload: &[u8]) -> Self {
        match payload.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') => Self::Object,
            Some(b'[') => Self::Array,
            _ => Self::Invalid,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Classifier {
    field: String,
}

impl Classifier {
    #[must_use]
    pub fn new(field: &str) -> Self {
        Self {
            field: field.to_string(),
        }
    }

    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn classify(&self, payload: &[u8]) -> Result<String, ClassifyError> {
        match PayloadShape::of(payload) {
            PayloadShape::Object => {
                let record: Map<String, Value> = serde_json::from_slice(payload)?;
                self.key_of(&record)
            }
            PayloadShape::Array => {
                let batch: Vec<Map<String, Value>> = serde_json::from_slice(payload)?;
                match batch.first() {
                    Some(first) => self.key_of(first),
                    None => Err(self.no_key()),
                }
            }
            PayloadShape::Invalid => Err(ClassifyError::Shape),
        }
    }

    fn key_of(&self, record: &Map<String, Value>) -> Result<String, ClassifyError> {
        match record.get(&self.field) {
            Some(Value::String(key)) => Ok(key.clone()),
            _ => Err(self.no_key()),
        }
    }

    fn no_key(&self) -> ClassifyError {
        ClassifyError::NoKey {
            field: self.field.clone(),
        }
    }
}
