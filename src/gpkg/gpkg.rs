use crate::conversions::{binding_from_column_type, binding_to_column_type, geometry_kind_from_str};
use crate::error::{FeatureError, Result};
use crate::ogc_sql::{
    SQL_DELETE_GPKG_CONTENTS, SQL_DELETE_GPKG_GEOMETRY_COLUMNS, SQL_INSERT_GPKG_CONTENTS,
    SQL_INSERT_GPKG_GEOMETRY_COLUMNS, SQL_INSERT_SRS, SQL_LAYER_EXISTS, SQL_LIST_LAYERS,
    SQL_SELECT_GEOMETRY_COLUMN_META, SQL_SELECT_SRS_BY_CODE, SQL_SELECT_SRS_BY_ID,
    SQL_TABLE_COLUMNS, initialize_gpkg, quote_ident, sql_create_table, sql_drop_table,
    sql_insert_feature,
};
use crate::projection::Projection;
use crate::schema::{AttributeDescriptor, Schema, SchemaDescriptor};
use crate::types::Binding;
use rusqlite::{OpenFlags, OptionalExtension};
use std::path::Path;
use tracing::debug;

use super::layer::GpkgLayer;

const PRIMARY_KEY_COLUMN: &str = "fid";

#[derive(Debug)]
/// GeoPackage connection wrapper for reading and writing feature layers.
pub struct Gpkg {
    conn: rusqlite::Connection,
    read_only: bool,
}

impl Gpkg {
    /// Open a GeoPackage in read-only mode.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = rusqlite::Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(Self {
            conn,
            read_only: true,
        })
    }

    /// Open a GeoPackage in read-write mode.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(FeatureError::Message(format!(
                "GeoPackage file does not exist: {}",
                path.display()
            )));
        }

        let conn = rusqlite::Connection::open(path)?;
        Ok(Self {
            conn,
            read_only: false,
        })
    }

    /// Create a new GeoPackage
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Err(FeatureError::Message(format!(
                "GeoPackage file already exists: {}",
                path.display()
            )));
        }

        let conn = rusqlite::Connection::open(path)?;
        initialize_gpkg(&conn)?;
        debug!(path = %path.display(), "created GeoPackage");

        Ok(Self {
            conn,
            read_only: false,
        })
    }

    /// Create a new GeoPackage in memory
    pub fn new_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()?;
        initialize_gpkg(&conn)?;

        Ok(Self {
            conn,
            read_only: false,
        })
    }

    /// Register a spatial reference system in gpkg_spatial_ref_sys.
    ///
    /// Layers can only be created for projections registered here. EPSG:4326
    /// and the two undefined systems are registered when a GeoPackage is
    /// created; anything else needs its full WKT `definition`, which this
    /// crate does not bundle. No validation of the WKT is performed.
    ///
    /// Example: register EPSG:3857 (Web Mercator / Pseudo-Mercator).
    /// ```
    /// # use geo_features::Gpkg;
    /// let gpkg = Gpkg::new_in_memory()?;
    /// let definition = r#"PROJCS["WGS 84 / Pseudo-Mercator",GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563]],PRIMEM["Greenwich",0],UNIT["degree",0.0174532925199433]],PROJECTION["Mercator_1SP"],PARAMETER["central_meridian",0],PARAMETER["scale_factor",1],PARAMETER["false_easting",0],PARAMETER["false_northing",0],UNIT["metre",1],AUTHORITY["EPSG","3857"]]"#;
    /// gpkg.register_srs(
    ///     "WGS 84 / Pseudo-Mercator",
    ///     3857,
    ///     "EPSG",
    ///     3857,
    ///     definition,
    ///     "Web Mercator / Pseudo-Mercator (EPSG:3857)",
    /// )?;
    /// # Ok::<(), geo_features::FeatureError>(())
    /// ```
    pub fn register_srs(
        &self,
        srs_name: &str,
        srs_id: i32,
        organization: &str,
        organization_coordsys_id: i32,
        definition: &str,
        description: &str,
    ) -> Result<()> {
        if self.read_only {
            return Err(FeatureError::ReadOnly);
        }

        self.conn.execute(
            SQL_INSERT_SRS,
            rusqlite::params![
                srs_name,
                srs_id,
                organization,
                organization_coordsys_id,
                definition,
                description
            ],
        )?;
        Ok(())
    }

    /// List the names of the feature layers.
    pub fn list_layers(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(SQL_LIST_LAYERS)?;
        let layers = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(layers)
    }

    /// Load a layer definition by name.
    ///
    /// The layer's attributes follow the table's column order with the
    /// primary key left out; the geometry column carries the projection of
    /// its spatial reference system.
    pub fn open_layer<'a>(&'a self, layer_name: &str) -> Result<GpkgLayer<'a>> {
        let (geometry_column, geometry_type, srs_id) = self
            .conn
            .query_row(SQL_SELECT_GEOMETRY_COLUMN_META, [layer_name], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i32>(2)?,
                ))
            })
            .optional()?
            .ok_or_else(|| FeatureError::MissingGeometryColumn {
                layer_name: layer_name.to_string(),
            })?;
        let kind = geometry_kind_from_str(&geometry_type)?;
        let projection = self.projection_for_srs(srs_id)?;

        let (primary_key_column, attributes) =
            self.get_attributes(layer_name, &geometry_column, Binding::Geometry(kind), projection)?;
        let geometry_index = attributes
            .iter()
            .position(|attr| attr.name == geometry_column)
            .ok_or_else(|| FeatureError::MissingGeometryColumn {
                layer_name: layer_name.to_string(),
            })?;

        let insert_sql = sql_insert_feature(layer_name, attributes.iter().map(|a| a.name.as_str()));
        debug!(
            layer = %layer_name,
            geometry_column = %geometry_column,
            srs_id,
            columns = attributes.len(),
            "opened layer"
        );

        Ok(GpkgLayer {
            conn: self,
            layer_name: layer_name.to_string(),
            geometry_column,
            primary_key_column,
            srs_id,
            descriptor: SchemaDescriptor {
                name: layer_name.to_string(),
                attributes,
            },
            geometry_index,
            insert_sql,
        })
    }

    /// Create a feature table from `schema`.
    ///
    /// The table is named after the schema and gets an integer `fid` primary
    /// key followed by one column per field. The schema must have exactly one
    /// geometry field, and its projection must be registered in
    /// gpkg_spatial_ref_sys; a geometry field without a projection uses the
    /// undefined Cartesian system.
    pub fn create_layer(&self, schema: &Schema) -> Result<GpkgLayer<'_>> {
        if self.read_only {
            return Err(FeatureError::ReadOnly);
        }

        let layer_name = schema.name();
        let exists: bool = self
            .conn
            .query_row(SQL_LAYER_EXISTS, [layer_name], |row| row.get(0))?;
        if exists {
            return Err(FeatureError::LayerAlreadyExists {
                layer_name: layer_name.to_string(),
            });
        }

        let mut geometry_fields = schema.fields().iter().filter(|field| field.is_geometry());
        let geometry_field =
            geometry_fields
                .next()
                .ok_or_else(|| FeatureError::MissingGeometryColumn {
                    layer_name: layer_name.to_string(),
                })?;
        if geometry_fields.next().is_some() {
            return Err(FeatureError::Message(format!(
                "GeoPackage feature tables have a single geometry column, but {layer_name} declares several"
            )));
        }
        let srs_id = self.srs_id_for(geometry_field.projection())?;

        let mut column_defs = Vec::with_capacity(schema.len() + 1);
        column_defs.push(format!(
            "{} INTEGER PRIMARY KEY AUTOINCREMENT",
            quote_ident(PRIMARY_KEY_COLUMN)
        ));
        for field in schema.fields() {
            column_defs.push(format!(
                "{} {}",
                quote_ident(field.name()),
                binding_to_column_type(field.binding())
            ));
        }

        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch(&sql_create_table(layer_name, &column_defs.join(", ")))?;
        tx.execute(
            SQL_INSERT_GPKG_CONTENTS,
            rusqlite::params![layer_name, layer_name, srs_id],
        )?;
        tx.execute(
            SQL_INSERT_GPKG_GEOMETRY_COLUMNS,
            rusqlite::params![
                layer_name,
                geometry_field.name(),
                binding_to_column_type(geometry_field.binding()),
                srs_id
            ],
        )?;
        tx.commit()?;
        debug!(layer = %layer_name, srs_id, "created layer");

        self.open_layer(layer_name)
    }

    /// Delete a layer and its metadata.
    pub fn delete_layer(&self, layer_name: &str) -> Result<()> {
        if self.read_only {
            return Err(FeatureError::ReadOnly);
        }

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(SQL_DELETE_GPKG_GEOMETRY_COLUMNS, [layer_name])?;
        tx.execute(SQL_DELETE_GPKG_CONTENTS, [layer_name])?;
        tx.execute_batch(&sql_drop_table(layer_name))?;
        tx.commit()?;
        Ok(())
    }

    pub(crate) fn connection(&self) -> &rusqlite::Connection {
        &self.conn
    }

    pub(crate) fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Resolve the table columns, mapping declared SQLite types to bindings.
    fn get_attributes(
        &self,
        layer_name: &str,
        geometry_column: &str,
        geometry_binding: Binding,
        projection: Option<Projection>,
    ) -> Result<(String, Vec<AttributeDescriptor>)> {
        let mut stmt = self.conn.prepare(SQL_TABLE_COLUMNS)?;
        let columns = stmt
            .query_map([layer_name], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i32>(2)? != 0,
                ))
            })?
            .collect::<std::result::Result<Vec<(String, String, bool)>, _>>()?;

        let mut primary_key: Option<String> = None;
        let mut attributes = Vec::with_capacity(columns.len());
        for (name, declared_type, is_primary_key) in columns {
            if is_primary_key {
                if primary_key.is_some() {
                    return Err(FeatureError::CompositePrimaryKeyUnsupported {
                        layer_name: layer_name.to_string(),
                    });
                }
                primary_key = Some(name);
                continue;
            }

            if name == geometry_column {
                attributes.push(AttributeDescriptor {
                    name,
                    binding: geometry_binding,
                    crs: projection.clone(),
                });
                continue;
            }

            // cf. https://www.geopackage.org/spec140/index.html#_sqlite_container
            let binding = binding_from_column_type(&declared_type)
                .filter(|binding| !binding.is_geometry())
                .ok_or_else(|| FeatureError::UnsupportedColumnType {
                    column: name.clone(),
                    declared_type,
                })?;
            attributes.push(AttributeDescriptor {
                name,
                binding,
                crs: None,
            });
        }

        let primary_key = primary_key.ok_or_else(|| FeatureError::MissingPrimaryKeyColumn {
            layer_name: layer_name.to_string(),
        })?;
        Ok((primary_key, attributes))
    }

    /// Projection of a gpkg_spatial_ref_sys entry; `None` for the undefined systems.
    fn projection_for_srs(&self, srs_id: i32) -> Result<Option<Projection>> {
        if srs_id <= 0 {
            return Ok(None);
        }
        let entry = self
            .conn
            .query_row(SQL_SELECT_SRS_BY_ID, [srs_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .optional()?;
        match entry {
            Some((organization, code)) if !organization.eq_ignore_ascii_case("NONE") && code > 0 => {
                Ok(Some(Projection::from_code(&format!("{organization}:{code}"))?))
            }
            _ => Ok(None),
        }
    }

    /// srs_id registered for `projection`; the undefined Cartesian system for `None`.
    fn srs_id_for(&self, projection: Option<&Projection>) -> Result<i32> {
        let Some(projection) = projection else {
            return Ok(-1);
        };
        let missing = || FeatureError::MissingSpatialRefSys {
            projection: projection.to_string(),
        };

        let (organization, code) = projection.code().split_once(':').ok_or_else(missing)?;
        let code: i64 = code.parse().map_err(|_| missing())?;
        self.conn
            .query_row(
                SQL_SELECT_SRS_BY_CODE,
                rusqlite::params![organization, code],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(missing)
    }
}
