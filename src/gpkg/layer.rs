use std::collections::{HashMap, VecDeque};

use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use tracing::debug;

use crate::collection::{FeatureCollection, FeatureSource, Query};
use crate::error::{FeatureError, Result};
use crate::feature::{Feature, RawRecord};
use crate::ogc_sql::{sql_delete_all, sql_select_features};
use crate::schema::{AttributeDescriptor, Schema, SchemaDescriptor};
use crate::types::RawValue;

use super::{Gpkg, GpkgCursor, wkb_to_gpkg_geometry};

#[derive(Debug)]
/// A GeoPackage feature table, readable as a [`FeatureSource`] and writable
/// one [`Feature`] at a time.
pub struct GpkgLayer<'a> {
    pub(super) conn: &'a Gpkg,
    pub layer_name: String,
    pub geometry_column: String,
    pub primary_key_column: String,
    pub srs_id: i32,
    pub(super) descriptor: SchemaDescriptor,
    pub(super) geometry_index: usize,
    pub(super) insert_sql: String,
}

impl<'a> GpkgLayer<'a> {
    /// The layer's schema, with columns in table order and the primary key left out.
    pub fn schema(&self) -> Result<Schema> {
        Schema::from_raw(&self.descriptor)
    }

    /// Features of the layer selected by `query`, in primary key order.
    ///
    /// Example:
    /// ```no_run
    /// use geo_features::{Gpkg, Query};
    ///
    /// let gpkg = Gpkg::open_read_only("data/example.gpkg")?;
    /// let layer = gpkg.open_layer("points")?;
    /// for feature in layer.collection(Query::all())?.features()? {
    ///     let feature = feature?;
    ///     let _id = feature.id();
    ///     let _geom = feature.geometry()?;
    /// }
    /// # Ok::<(), geo_features::FeatureError>(())
    /// ```
    pub fn collection(&self, query: Query) -> Result<FeatureCollection<'_, Self>> {
        FeatureCollection::new(self, query)
    }

    /// Number of rows in the layer.
    pub fn count(&self) -> Result<usize> {
        let sql = format!(
            "SELECT COUNT(*) FROM {}",
            crate::ogc_sql::quote_ident(&self.layer_name)
        );
        let count: i64 = self.conn.connection().query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Remove all rows from the layer.
    pub fn truncate(&self) -> Result<usize> {
        self.ensure_writable()?;
        let sql = sql_delete_all(&self.layer_name);
        Ok(self.conn.connection().execute(&sql, [])?)
    }

    /// Insert a feature and return the primary key assigned to it.
    ///
    /// Properties are matched to columns by name; columns the feature does not
    /// carry are written as `NULL`.
    ///
    /// Example:
    /// ```no_run
    /// use geo_types::Point;
    /// use geo_features::{Gpkg, props};
    ///
    /// let gpkg = Gpkg::open("data/example.gpkg")?;
    /// let layer = gpkg.open_layer("points")?;
    /// let schema = layer.schema()?;
    /// let feature = schema.create(props!["name" => "alpha", "geom" => Point::new(1.0, 2.0)])?;
    /// let _fid = layer.insert(&feature)?;
    /// # Ok::<(), geo_features::FeatureError>(())
    /// ```
    pub fn insert(&self, feature: &Feature) -> Result<String> {
        self.ensure_writable()?;

        let mut record = GpkgRecord::new(&self.descriptor.attributes, self.srs_id);
        feature.write_to(&mut record)?;

        let conn = self.conn.connection();
        let mut stmt = conn.prepare_cached(&self.insert_sql)?;
        stmt.execute(params_from_iter(record.values))?;
        Ok(conn.last_insert_rowid().to_string())
    }

    /// Insert features in one transaction; nothing is written if any insert fails.
    pub fn insert_all<'f, I>(&self, features: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = &'f Feature>,
    {
        self.ensure_writable()?;
        let tx = self.conn.connection().unchecked_transaction()?;
        let ids = features
            .into_iter()
            .map(|feature| self.insert(feature))
            .collect::<Result<Vec<String>>>()?;
        tx.commit()?;
        Ok(ids)
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.conn.is_read_only() {
            return Err(FeatureError::ReadOnly);
        }
        Ok(())
    }
}

impl<'g> FeatureSource for GpkgLayer<'g> {
    type Descriptor = SchemaDescriptor;
    type Cursor<'a>
        = GpkgCursor<'a>
    where
        Self: 'a;

    fn descriptor(&self) -> &SchemaDescriptor {
        &self.descriptor
    }

    fn open(&self, query: &Query) -> Result<GpkgCursor<'_>> {
        let columns = self
            .descriptor
            .attributes
            .iter()
            .map(|attr| attr.name.as_str());
        let sql = sql_select_features(&self.layer_name, &self.primary_key_column, columns);
        let stmt = self.conn.connection().prepare(&sql)?;
        debug!(
            layer = %self.layer_name,
            offset = query.offset,
            limit = ?query.limit,
            page_size = query.page_size,
            "prepared layer cursor"
        );

        Ok(GpkgCursor {
            stmt: Some(stmt),
            layer_name: self.layer_name.clone(),
            geometry_index: self.geometry_index,
            buffer: VecDeque::new(),
            page_size: query.page_size.max(1),
            offset: query.offset,
            remaining: query.limit,
            end_of_rows: false,
        })
    }
}

// Row under construction for an INSERT, one SQLite value per column.
struct GpkgRecord<'a> {
    attributes: &'a [AttributeDescriptor],
    index_by_name: HashMap<&'a str, usize>,
    values: Vec<SqlValue>,
    srs_id: i32,
}

impl<'a> GpkgRecord<'a> {
    fn new(attributes: &'a [AttributeDescriptor], srs_id: i32) -> Self {
        let index_by_name = attributes
            .iter()
            .enumerate()
            .map(|(idx, attr)| (attr.name.as_str(), idx))
            .collect();
        Self {
            attributes,
            index_by_name,
            values: vec![SqlValue::Null; attributes.len()],
            srs_id,
        }
    }
}

impl RawRecord for GpkgRecord<'_> {
    fn set(&mut self, name: &str, value: RawValue) -> Result<()> {
        let idx = *self
            .index_by_name
            .get(name)
            .ok_or_else(|| FeatureError::UnknownAttribute {
                name: name.to_string(),
            })?;
        let attr = &self.attributes[idx];

        self.values[idx] = match (value, attr.binding.is_geometry()) {
            (RawValue::Null, _) => SqlValue::Null,
            (RawValue::Geometry(wkb) | RawValue::Blob(wkb), true) => {
                SqlValue::Blob(wkb_to_gpkg_geometry(&wkb, self.srs_id))
            }
            (RawValue::Integer(v), false) => SqlValue::Integer(v),
            (RawValue::Real(v), false) => SqlValue::Real(v),
            (RawValue::Text(v), false) => SqlValue::Text(v),
            (RawValue::Blob(v), false) => SqlValue::Blob(v),
            (raw, _) => {
                return Err(FeatureError::UnexpectedRawValue {
                    field: attr.name.clone(),
                    expected: attr.binding.to_string(),
                    actual: raw.type_name(),
                });
            }
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::Result;
    use crate::collection::Query;
    use crate::error::FeatureError;
    use crate::feature::Feature;
    use crate::geometry::Geometry;
    use crate::gpkg::Gpkg;
    use crate::memory::MemoryStore;
    use crate::projection::Projection;
    use crate::props;
    use crate::schema::{Field, Schema};
    use crate::types::{Binding, GeometryKind, Value};
    use geo_types::{
        GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon,
    };

    fn places() -> Result<Schema> {
        Schema::new(
            "places",
            [
                Field::scalar("name", Binding::Text),
                Field::scalar("rank", Binding::Integer),
                Field::scalar("open", Binding::Boolean),
                Field::geometry("geom", GeometryKind::Point, Some(Projection::epsg(4326))),
                Field::scalar("score", Binding::Double),
            ],
        )
    }

    fn place(schema: &Schema, i: usize) -> Result<Feature> {
        schema.create(props![
            "name" => format!("place-{i}"),
            "rank" => i as i64,
            "open" => i % 2 == 0,
            "geom" => Point::new(i as f64, 2.0 * i as f64),
            "score" => i as f64 / 2.0,
        ])
    }

    fn square(min: f64, max: f64) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![(min, min), (max, min), (max, max), (min, max), (min, min)]),
            vec![],
        )
    }

    #[test]
    fn inserted_features_read_back_with_types_and_projection() -> Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        let schema = places()?;
        let layer = gpkg.create_layer(&schema)?;
        assert_eq!(layer.schema()?, schema);

        for i in 0..3 {
            layer.insert(&place(&schema, i)?)?;
        }

        let features = layer.collection(Query::all())?.to_vec()?;
        assert_eq!(features.len(), 3);

        let second = &features[1];
        assert_eq!(second.id(), Some("2"));
        assert_eq!(second.get::<String>("name")?, "place-1");
        assert_eq!(second.get::<i64>("rank")?, 1);
        assert!(!second.get::<bool>("open")?);
        assert_eq!(second.get::<f64>("score")?, 0.5);
        assert_eq!(
            second.geometry()?,
            Geometry::new(Point::new(1.0, 2.0)).in_projection(Projection::epsg(4326))
        );
        Ok(())
    }

    #[test]
    fn stored_blob_carries_geopackage_header() -> Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        let schema = places()?;
        let layer = gpkg.create_layer(&schema)?;
        let fid = layer.insert(&place(&schema, 4)?)?;

        let blob: Vec<u8> = gpkg.connection().query_row(
            "SELECT geom FROM places WHERE fid = ?1",
            [fid.parse::<i64>().expect("integer fid")],
            |row| row.get(0),
        )?;
        assert_eq!(&blob[..2], b"GP");
        assert_eq!(&blob[4..8], &4326_i32.to_le_bytes());
        assert_eq!(
            Geometry::from_wkb(&blob[8..])?,
            Geometry::new(Point::new(4.0, 8.0))
        );
        Ok(())
    }

    #[test]
    fn roundtrips_all_geometry_kinds() -> Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        let schema = Schema::new(
            "shapes",
            [Field::geometry("geom", GeometryKind::Any, None)],
        )?;
        let layer = gpkg.create_layer(&schema)?;

        let line = LineString::from(vec![(0.0, 0.0), (1.5, 1.0), (2.0, 0.5)]);
        let shapes: Vec<geo_types::Geometry<f64>> = vec![
            Point::new(1.0, 2.0).into(),
            line.clone().into(),
            square(0.0, 3.0).into(),
            MultiPoint::from(vec![Point::new(1.0, 1.0), Point::new(2.0, 2.0)]).into(),
            MultiLineString::new(vec![line.clone()]).into(),
            MultiPolygon::new(vec![square(0.0, 1.0), square(5.0, 6.0)]).into(),
            geo_types::Geometry::GeometryCollection(GeometryCollection::from(vec![
                geo_types::Geometry::Point(Point::new(-1.0, -2.0)),
                geo_types::Geometry::LineString(line),
            ])),
        ];
        for shape in &shapes {
            layer.insert(&Feature::from_pairs(props!["geom" => shape.clone()]))?;
        }

        let read: Vec<geo_types::Geometry<f64>> = layer
            .collection(Query::all())?
            .features()?
            .map(|feature| Ok(feature?.geometry()?.shape().clone()))
            .collect::<Result<_>>()?;
        assert_eq!(read, shapes);
        Ok(())
    }

    #[test]
    fn pages_honor_offset_and_limit() -> Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        let schema = places()?;
        let layer = gpkg.create_layer(&schema)?;
        let features = (0..7).map(|i| place(&schema, i)).collect::<Result<Vec<_>>>()?;
        layer.insert_all(&features)?;

        let ranks = |query: Query| -> Result<Vec<i64>> {
            layer
                .collection(query)?
                .features()?
                .map(|feature| feature?.get::<i64>("rank"))
                .collect()
        };

        assert_eq!(ranks(Query::all().with_page_size(3))?, (0..7).collect::<Vec<_>>());
        assert_eq!(ranks(Query::all().with_page_size(7))?, (0..7).collect::<Vec<_>>());
        assert_eq!(
            ranks(Query::all().with_offset(2).with_limit(4).with_page_size(3))?,
            vec![2, 3, 4, 5]
        );
        assert_eq!(ranks(Query::all().with_offset(6).with_page_size(2))?, vec![6]);
        assert!(ranks(Query::all().with_offset(10))?.is_empty());
        assert!(ranks(Query::all().with_limit(0))?.is_empty());
        Ok(())
    }

    #[test]
    fn traversal_closes_cursor_and_is_restartable() -> Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        let schema = places()?;
        let layer = gpkg.create_layer(&schema)?;
        layer.insert(&place(&schema, 0)?)?;
        let collection = layer.collection(Query::all().with_page_size(1))?;

        let mut features = collection.features()?;
        assert!(features.next().is_some());
        assert!(features.next().is_none());
        assert!(features.is_closed());

        layer.insert(&place(&schema, 1)?)?;
        assert_eq!(collection.count()?, 2);
        Ok(())
    }

    #[test]
    fn ad_hoc_features_leave_missing_columns_null() -> Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        let layer = gpkg.create_layer(&places()?)?;
        layer.insert(&Feature::from_pairs(props![
            "geom" => Point::new(0.0, 0.0),
            "name" => "bare",
        ]))?;

        let feature = layer
            .collection(Query::all())?
            .features()?
            .next()
            .expect("one feature")?;
        assert_eq!(feature.value("rank")?, Value::Null);
        assert_eq!(feature.get::<Option<f64>>("score")?, None);
        assert_eq!(feature.get::<String>("name")?, "bare");
        Ok(())
    }

    #[test]
    fn insert_rejects_unknown_and_misplaced_values() -> Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        let layer = gpkg.create_layer(&places()?)?;

        let unknown = layer.insert(&Feature::from_pairs(props!["height" => 3_i64]));
        assert!(matches!(
            unknown,
            Err(FeatureError::UnknownAttribute { name }) if name == "height"
        ));

        let misplaced = layer.insert(&Feature::from_pairs(props!["geom" => "not a shape"]));
        assert!(matches!(
            misplaced,
            Err(FeatureError::UnexpectedRawValue { field, .. }) if field == "geom"
        ));
        assert_eq!(layer.count()?, 0);
        Ok(())
    }

    #[test]
    fn insert_all_is_atomic() -> Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        let schema = places()?;
        let layer = gpkg.create_layer(&schema)?;

        let good = place(&schema, 0)?;
        let bad = Feature::from_pairs(props!["nope" => 1_i64]);
        assert!(layer.insert_all([&good, &bad]).is_err());
        assert_eq!(layer.count()?, 0);

        layer.insert_all([&good, &good])?;
        assert_eq!(layer.count()?, 2);
        Ok(())
    }

    #[test]
    fn corrupt_geometry_fails_during_traversal() -> Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        let schema = places()?;
        let layer = gpkg.create_layer(&schema)?;
        layer.insert(&place(&schema, 0)?)?;
        gpkg.connection().execute(
            "INSERT INTO places (name, geom) VALUES ('broken', X'4750000100000000FF')",
            [],
        )?;

        let mut features = layer.collection(Query::all())?.features()?;
        assert!(features.next().expect("first")?.id().is_some());
        assert!(matches!(features.next(), Some(Err(FeatureError::Wkb(_)))));
        assert!(features.next().is_none());
        Ok(())
    }

    #[test]
    fn invalid_utf8_text_fails_during_traversal() -> Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        let schema = places()?;
        let layer = gpkg.create_layer(&schema)?;
        layer.insert(&place(&schema, 0)?)?;
        gpkg.connection().execute(
            "INSERT INTO places (name) VALUES (CAST(X'61FF62' AS TEXT))",
            [],
        )?;

        let mut features = layer
            .collection(Query::all().with_page_size(1))?
            .features()?;
        assert_eq!(features.next().expect("first")?.get::<String>("name")?, "place-0");
        assert!(matches!(
            features.next(),
            Some(Err(FeatureError::Resource(message))) if message.contains("name")
        ));
        assert!(features.next().is_none());
        Ok(())
    }

    #[test]
    fn truncates_rows() -> Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        let schema = places()?;
        let layer = gpkg.create_layer(&schema)?;
        layer.insert(&place(&schema, 0)?)?;
        layer.insert(&place(&schema, 1)?)?;

        assert_eq!(layer.truncate()?, 2);
        assert_eq!(layer.count()?, 0);
        assert_eq!(layer.collection(Query::all())?.count()?, 0);
        Ok(())
    }

    #[test]
    fn copies_features_from_memory_store() -> Result<()> {
        let schema = places()?;
        let store = MemoryStore::new(&schema);
        for i in 0..5 {
            store.insert(&place(&schema, i)?)?;
        }

        let gpkg = Gpkg::new_in_memory()?;
        let layer = gpkg.create_layer(&schema)?;
        let stored = crate::FeatureCollection::new(&store, Query::all())?.to_vec()?;
        layer.insert_all(&stored)?;

        let copied = layer.collection(Query::all().with_offset(4))?.to_vec()?;
        assert_eq!(copied.len(), 1);
        assert_eq!(copied[0], stored[4]);
        assert_eq!(copied[0].properties()?, place(&schema, 4)?.properties()?);
        Ok(())
    }
}
