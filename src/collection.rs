//! Lazy, closeable iteration over features of an external source.
//!
//! A [`FeatureCollection`] holds a source and a [`Query`], never the data.
//! Every call to [`FeatureCollection::features`] runs the query again and
//! returns a [`Features`] iterator that owns the cursor it opened. The
//! cursor is released exactly once: when the cursor is exhausted, when a
//! fetch or decode fails, or when the iterator is dropped early.

use std::iter::FusedIterator;

use tracing::{debug, warn};

use crate::error::{FeatureError, Result};
use crate::feature::{Feature, RawFeature};
use crate::schema::{RawSchema, Schema};

/// Rows a paging cursor fetches per round-trip unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: usize = 256;

/// What to fetch from a source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    /// Maximum number of features, `None` for all.
    pub limit: Option<usize>,
    /// Number of leading features to skip.
    pub offset: usize,
    /// Fetch size hint for cursors that page through their source.
    pub page_size: usize,
}

impl Query {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

impl Default for Query {
    fn default() -> Self {
        Self {
            limit: None,
            offset: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Cursor over raw records opened by a [`FeatureSource`].
pub trait RawCursor {
    fn has_next(&mut self) -> Result<bool>;

    fn next_record(&mut self) -> Result<RawFeature>;

    /// Release the underlying resource. Called exactly once per cursor.
    fn close(&mut self) -> Result<()>;
}

/// External source of features: a schema description plus repeatable queries.
pub trait FeatureSource {
    type Descriptor: RawSchema;
    type Cursor<'a>: RawCursor
    where
        Self: 'a;

    fn descriptor(&self) -> &Self::Descriptor;

    /// Start a new, independent cursor for `query`.
    fn open(&self, query: &Query) -> Result<Self::Cursor<'_>>;
}

/// A re-iterable sequence of features backed by a query against a source.
pub struct FeatureCollection<'s, S: FeatureSource> {
    source: &'s S,
    query: Query,
    schema: Schema,
}

impl<'s, S: FeatureSource> FeatureCollection<'s, S> {
    pub fn new(source: &'s S, query: Query) -> Result<Self> {
        let schema = Schema::from_raw(source.descriptor())?;
        Ok(Self {
            source,
            query,
            schema,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Run the query and iterate its features.
    ///
    /// Each call opens its own cursor, so traversals never share state.
    pub fn features(&self) -> Result<Features<'s, S>> {
        let cursor = self.source.open(&self.query)?;
        debug!(
            schema = %self.schema.name(),
            limit = ?self.query.limit,
            offset = self.query.offset,
            "opened feature cursor"
        );
        Ok(Features {
            cursor: Some(cursor),
            schema: self.schema.clone(),
        })
    }

    /// Traverse once and count the features.
    pub fn count(&self) -> Result<usize> {
        let mut count = 0;
        for feature in self.features()? {
            feature?;
            count += 1;
        }
        Ok(count)
    }

    /// Traverse once and collect the features.
    pub fn to_vec(&self) -> Result<Vec<Feature>> {
        self.features()?.collect()
    }
}

impl<S: FeatureSource> Clone for FeatureCollection<'_, S> {
    fn clone(&self) -> Self {
        Self {
            source: self.source,
            query: self.query.clone(),
            schema: self.schema.clone(),
        }
    }
}

/// One traversal of a [`FeatureCollection`].
///
/// Yields `Err` at most once; after an error, or after the last feature, the
/// cursor is already closed and the iterator returns `None`.
pub struct Features<'s, S: FeatureSource + 's> {
    cursor: Option<S::Cursor<'s>>,
    schema: Schema,
}

impl<'s, S: FeatureSource + 's> Features<'s, S> {
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn is_closed(&self) -> bool {
        self.cursor.is_none()
    }

    fn release(&mut self) -> Result<()> {
        match self.cursor.take() {
            Some(mut cursor) => {
                debug!(schema = %self.schema.name(), "released feature cursor");
                cursor.close()
            }
            None => Ok(()),
        }
    }

    // Release after a failure; the original error wins over a close error.
    fn fail(&mut self, err: FeatureError) -> Option<Result<Feature>> {
        if let Err(close_err) = self.release() {
            warn!(error = %close_err, "failed to release feature cursor after error");
        }
        Some(Err(err))
    }

    fn advance(cursor: &mut S::Cursor<'s>, schema: &Schema) -> Result<Option<Feature>> {
        if !cursor.has_next()? {
            return Ok(None);
        }
        let raw = cursor.next_record()?;
        Feature::decode(schema, raw).map(Some)
    }
}

impl<'s, S: FeatureSource + 's> Iterator for Features<'s, S> {
    type Item = Result<Feature>;

    fn next(&mut self) -> Option<Self::Item> {
        let cursor = self.cursor.as_mut()?;
        match Self::advance(cursor, &self.schema) {
            Ok(Some(feature)) => Some(Ok(feature)),
            Ok(None) => match self.release() {
                Ok(()) => None,
                Err(err) => Some(Err(err)),
            },
            Err(err) => self.fail(err),
        }
    }
}

impl<'s, S: FeatureSource + 's> FusedIterator for Features<'s, S> {}

impl<'s, S: FeatureSource + 's> Drop for Features<'s, S> {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!(error = %err, "failed to release feature cursor");
        }
    }
}
