//! In-memory feature source.
//!
//! Cursors read from a snapshot taken when they are opened, so inserts made
//! during a traversal are visible only to traversals started afterwards.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::collection::{FeatureSource, Query, RawCursor};
use crate::error::{FeatureError, Result};
use crate::feature::{Feature, RawFeature, RawRecord};
use crate::schema::{RawSchema, Schema, SchemaDescriptor};
use crate::types::RawValue;

/// A growable table of raw records described by a [`Schema`].
#[derive(Debug)]
pub struct MemoryStore {
    descriptor: SchemaDescriptor,
    records: RwLock<Arc<Vec<RawFeature>>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new(schema: &Schema) -> Self {
        Self {
            descriptor: schema.descriptor(),
            records: RwLock::new(Arc::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Append a feature and return the id assigned to it.
    ///
    /// Properties are matched by name; attributes the feature does not carry
    /// are stored as null.
    pub fn insert(&self, feature: &Feature) -> Result<String> {
        let mut record = MemoryRecord::new(&self.descriptor);
        feature.write_to(&mut record)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let raw = RawFeature {
            id: Some(id.clone()),
            values: record.values,
        };

        let mut records = self
            .records
            .write()
            .map_err(|_| FeatureError::Resource("memory store lock poisoned".to_string()))?;
        Arc::make_mut(&mut records).push(raw);
        Ok(id)
    }

    /// Insert every feature, stopping at the first failure.
    pub fn insert_all<'a, I>(&self, features: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = &'a Feature>,
    {
        features.into_iter().map(|feature| self.insert(feature)).collect()
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.snapshot()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn snapshot(&self) -> Result<Arc<Vec<RawFeature>>> {
        let records = self
            .records
            .read()
            .map_err(|_| FeatureError::Resource("memory store lock poisoned".to_string()))?;
        Ok(Arc::clone(&records))
    }
}

impl FeatureSource for MemoryStore {
    type Descriptor = SchemaDescriptor;
    type Cursor<'a> = MemoryCursor;

    fn descriptor(&self) -> &SchemaDescriptor {
        &self.descriptor
    }

    fn open(&self, query: &Query) -> Result<MemoryCursor> {
        let records = self.snapshot()?;
        let end = match query.limit {
            Some(limit) => query.offset.saturating_add(limit).min(records.len()),
            None => records.len(),
        };
        debug!(
            schema = %self.descriptor.name(),
            rows = records.len(),
            "opened memory cursor"
        );
        Ok(MemoryCursor {
            records,
            position: query.offset,
            end,
        })
    }
}

/// Cursor over a snapshot of a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryCursor {
    records: Arc<Vec<RawFeature>>,
    position: usize,
    end: usize,
}

impl RawCursor for MemoryCursor {
    fn has_next(&mut self) -> Result<bool> {
        Ok(self.position < self.end)
    }

    fn next_record(&mut self) -> Result<RawFeature> {
        let record = self
            .records
            .get(self.position)
            .filter(|_| self.position < self.end)
            .cloned()
            .ok_or_else(|| FeatureError::Resource("cursor is exhausted".to_string()))?;
        self.position += 1;
        Ok(record)
    }

    fn close(&mut self) -> Result<()> {
        self.position = self.end;
        Ok(())
    }
}

// Collects written values by attribute name into schema order.
struct MemoryRecord<'a> {
    index_by_name: HashMap<&'a str, usize>,
    values: Vec<RawValue>,
}

impl<'a> MemoryRecord<'a> {
    fn new(descriptor: &'a SchemaDescriptor) -> Self {
        let index_by_name = descriptor
            .attributes()
            .iter()
            .enumerate()
            .map(|(idx, attr)| (attr.name.as_str(), idx))
            .collect();
        Self {
            index_by_name,
            values: vec![RawValue::Null; descriptor.attributes().len()],
        }
    }
}

impl RawRecord for MemoryRecord<'_> {
    fn set(&mut self, name: &str, value: RawValue) -> Result<()> {
        let idx = *self
            .index_by_name
            .get(name)
            .ok_or_else(|| FeatureError::UnknownAttribute {
                name: name.to_string(),
            })?;
        self.values[idx] = value;
        Ok(())
    }
}
