use std::collections::VecDeque;

use rusqlite::types::ValueRef;
use tracing::debug;

use crate::collection::RawCursor;
use crate::error::{FeatureError, Result};
use crate::feature::RawFeature;
use crate::types::RawValue;

use super::gpkg_geometry_to_wkb;

/// Cursor over the rows of a layer.
///
/// Rows are fetched `page_size` at a time with `LIMIT ? OFFSET ?` on a single
/// prepared statement; the statement is finalized on `close`.
pub struct GpkgCursor<'a> {
    pub(super) stmt: Option<rusqlite::Statement<'a>>,
    pub(super) layer_name: String,
    // Position of the geometry column among the selected values (pk excluded).
    pub(super) geometry_index: usize,
    pub(super) buffer: VecDeque<RawFeature>,
    pub(super) page_size: usize,
    pub(super) offset: usize,
    pub(super) remaining: Option<usize>,
    pub(super) end_of_rows: bool,
}

impl GpkgCursor<'_> {
    fn fetch_page(&mut self) -> Result<()> {
        let want = match self.remaining {
            Some(remaining) => remaining.min(self.page_size),
            None => self.page_size,
        };
        if want == 0 {
            self.end_of_rows = true;
            return Ok(());
        }

        let stmt = self.stmt.as_mut().ok_or_else(|| {
            FeatureError::Resource(format!("cursor on layer {} is closed", self.layer_name))
        })?;
        let column_count = stmt.column_count();
        let mut rows = stmt.query(rusqlite::params![want as i64, self.offset as i64])?;

        let mut fetched = 0;
        while let Some(row) = rows.next()? {
            self.buffer
                .push_back(row_to_raw(row, column_count, self.geometry_index)?);
            fetched += 1;
        }

        // A short page means the table has no more rows.
        if fetched < want {
            self.end_of_rows = true;
        }
        self.offset += fetched;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= fetched;
        }
        debug!(layer = %self.layer_name, fetched, offset = self.offset, "fetched page");
        Ok(())
    }
}

impl RawCursor for GpkgCursor<'_> {
    fn has_next(&mut self) -> Result<bool> {
        if self.buffer.is_empty() && !self.end_of_rows {
            self.fetch_page()?;
        }
        Ok(!self.buffer.is_empty())
    }

    fn next_record(&mut self) -> Result<RawFeature> {
        if !self.has_next()? {
            return Err(FeatureError::Resource(format!(
                "cursor on layer {} is exhausted",
                self.layer_name
            )));
        }
        self.buffer.pop_front().ok_or_else(|| {
            FeatureError::Resource(format!("cursor on layer {} is exhausted", self.layer_name))
        })
    }

    fn close(&mut self) -> Result<()> {
        self.buffer.clear();
        self.end_of_rows = true;
        match self.stmt.take() {
            Some(stmt) => Ok(stmt.finalize()?),
            None => Ok(()),
        }
    }
}

// Column 0 is the primary key; the rest follow the layer's attribute order.
fn row_to_raw(
    row: &rusqlite::Row<'_>,
    column_count: usize,
    geometry_index: usize,
) -> Result<RawFeature> {
    let id: i64 = row.get(0)?;
    let mut values = Vec::with_capacity(column_count.saturating_sub(1));
    for idx in 1..column_count {
        let value = match row.get_ref(idx)? {
            ValueRef::Null => RawValue::Null,
            ValueRef::Integer(v) => RawValue::Integer(v),
            ValueRef::Real(v) => RawValue::Real(v),
            ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => RawValue::Text(text.to_owned()),
                Err(err) => {
                    return Err(FeatureError::Resource(format!(
                        "row {id}: column {} is not valid UTF-8: {err}",
                        row.as_ref().column_name(idx)?
                    )));
                }
            },
            ValueRef::Blob(bytes) if idx - 1 == geometry_index => {
                RawValue::Geometry(gpkg_geometry_to_wkb(bytes)?.to_vec())
            }
            ValueRef::Blob(bytes) => RawValue::Blob(bytes.to_vec()),
        };
        values.push(value);
    }
    Ok(RawFeature {
        id: Some(id.to_string()),
        values,
    })
}
