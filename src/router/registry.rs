//! Immutable separator → destination table.
//!
//! [`DestinationRegistry::build`] connects every destination of the list
//! in order and fails as a whole if any one of them cannot be reached,
//! closing the ones already opened. Once built the table is never
//! modified; the dispatch loop reads it through an `Arc`.

use std::collections::HashMap;

use crate::config::model::DestinationSpec;
use crate::error::RouterError;
use crate::transport::{Connector, Destination};

struct Entry {
    separator: String,
    handle: Box<dyn Destination>,
}

pub struct DestinationRegistry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl std::fmt::Debug for DestinationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| (&e.separator, e.handle.subject())))
            .finish()
    }
}

impl DestinationRegistry {
    pub async fn build<C: Connector + ?Sized>(
        specs: &[DestinationSpec],
        connector: &C,
    ) -> Result<Self, RouterError> {
        let mut handles = Vec::with_capacity(specs.len());
        for (i, spec) in specs.iter().enumerate() {
            match connector.connect_destination(spec).await {
                Ok(handle) => handles.push((spec.separator_value.clone(), handle)),
                Err(e) => {
                    tracing::error!(
                        index = i,
                        separator = %spec.separator_value,
                        error = %e,
                        connected = handles.len(),
                        "destination connect failed, closing connected destinations"
                    );
                    Self::from_handles(handles).close_all().await;
                    return Err(e);
                }
            }
        }
        Ok(Self::from_handles(handles))
    }

    /// Build from already connected handles, in broadcast order. When a
    /// separator repeats, lookups resolve to its first handle.
    #[must_use]
    pub fn from_handles(handles: Vec<(String, Box<dyn Destination>)>) -> Self {
        let mut index = HashMap::with_capacity(handles.len());
        let entries: Vec<Entry> = handles
            .into_iter()
            .enumerate()
            .map(|(i, (separator, handle))| {
                index.entry(separator.clone()).or_insert(i);
                Entry { separator, handle }
            })
            .collect();
        Self { entries, index }
    }

    #[must_use]
    pub fn lookup(&self, separator: &str) -> Option<&dyn Destination> {
        self.index
            .get(separator)
            .map(|&i| self.entries[i].handle.as_ref())
    }

    /// Every destination in list order, with its separator.
    pub fn all(&self) -> impl Iterator<Item = (&str, &dyn Destination)> {
        self.entries
            .iter()
            .map(|e| (e.separator.as_str(), e.handle.as_ref()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Close every destination. Failures are logged and returned, never
    /// propagated, and do not stop the remaining closes.
    pub async fn close_all(&self) -> Vec<RouterError> {
        let mut failures = Vec::new();
        for entry in &self.entries {
            match entry.handle.close().await {
                Ok(()) => tracing::debug!(separator = %entry.separator, "destination closed"),
                Err(e) => {
                    tracing::error!(
                        separator = %entry.separator,
                        error = %e,
                        "close destination failed"
                    );
                    failures.push(e);
                }
            }
        }
        failures
    }
}
