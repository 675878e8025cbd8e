// cf. https://www.geopackage.org/spec140/index.html#table_definition_sql

// 'GPKG' in ASCII, and GeoPackage 1.4.0.
const GPKG_APPLICATION_ID: i32 = 0x4750_4B47;
const GPKG_USER_VERSION: i32 = 10400;

// gpkg_spatial_ref_sys: the SRS catalog referenced by gpkg_contents and
// gpkg_geometry_columns to describe spatial reference systems.
pub(crate) const SQL_GPKG_SPATIAL_REF_SYS: &str = "
CREATE TABLE gpkg_spatial_ref_sys (
  srs_name TEXT NOT NULL,
  srs_id INTEGER PRIMARY KEY,
  organization TEXT NOT NULL,
  organization_coordsys_id INTEGER NOT NULL,
  definition  TEXT NOT NULL,
  description TEXT
);
";

// gpkg_contents: lists all geospatial contents in the package with identifying
// and descriptive metadata for user display and access.
pub(crate) const SQL_GPKG_CONTENTS: &str = "
CREATE TABLE gpkg_contents (
  table_name TEXT NOT NULL PRIMARY KEY,
  data_type TEXT NOT NULL,
  identifier TEXT UNIQUE,
  description TEXT DEFAULT '',
  last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
  min_x DOUBLE,
  min_y DOUBLE,
  max_x DOUBLE,
  max_y DOUBLE,
  srs_id INTEGER,
  CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
);
";

// gpkg_geometry_columns: identifies geometry columns and geometry types for
// vector feature user data tables.
pub(crate) const SQL_GPKG_GEOMETRY_COLUMNS: &str = "
CREATE TABLE gpkg_geometry_columns (
  table_name TEXT NOT NULL,
  column_name TEXT NOT NULL,
  geometry_type_name TEXT NOT NULL,
  srs_id INTEGER NOT NULL,
  z TINYINT NOT NULL,
  m TINYINT NOT NULL,
  CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name),
  CONSTRAINT uk_gc_table_name UNIQUE (table_name),
  CONSTRAINT fk_gc_tn FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),
  CONSTRAINT fk_gc_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys (srs_id)
);
";

pub(crate) const SQL_LIST_LAYERS: &str =
    "SELECT table_name FROM gpkg_contents WHERE data_type = 'features' ORDER BY table_name";

pub(crate) const SQL_LAYER_EXISTS: &str = "
SELECT EXISTS(
  SELECT 1 FROM gpkg_contents WHERE table_name = ?1
  UNION ALL
  SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1
)
";

pub(crate) const SQL_INSERT_SRS: &str = "
INSERT INTO gpkg_spatial_ref_sys
  (srs_name, srs_id, organization, organization_coordsys_id, definition, description)
VALUES
  (?1, ?2, ?3, ?4, ?5, ?6)
";

pub(crate) const SQL_SELECT_SRS_BY_ID: &str = "
SELECT organization, organization_coordsys_id
FROM gpkg_spatial_ref_sys
WHERE srs_id = ?1
";

pub(crate) const SQL_SELECT_SRS_BY_CODE: &str = "
SELECT srs_id
FROM gpkg_spatial_ref_sys
WHERE upper(organization) = upper(?1) AND organization_coordsys_id = ?2
ORDER BY srs_id
LIMIT 1
";

pub(crate) const SQL_INSERT_GPKG_CONTENTS: &str = "
INSERT INTO gpkg_contents
  (table_name, data_type, identifier, description, srs_id)
VALUES
  (?1, 'features', ?2, '', ?3)
";

pub(crate) const SQL_INSERT_GPKG_GEOMETRY_COLUMNS: &str = "
INSERT INTO gpkg_geometry_columns
  (table_name, column_name, geometry_type_name, srs_id, z, m)
VALUES
  (?1, ?2, ?3, ?4, 0, 0)
";

pub(crate) const SQL_SELECT_GEOMETRY_COLUMN_META: &str = "
SELECT column_name, geometry_type_name, srs_id
FROM gpkg_geometry_columns
WHERE table_name = ?1
";

pub(crate) const SQL_DELETE_GPKG_GEOMETRY_COLUMNS: &str =
    "DELETE FROM gpkg_geometry_columns WHERE table_name = ?1";

pub(crate) const SQL_DELETE_GPKG_CONTENTS: &str = "DELETE FROM gpkg_contents WHERE table_name = ?1";

pub(crate) const SQL_TABLE_COLUMNS: &str = "SELECT name, type, pk FROM pragma_table_info(?1)";

/// Double-quote an identifier for use in SQL text.
pub(crate) fn quote_ident(name: &str) -> String {
    format!(r#""{}""#, name.replace('"', r#""""#))
}

pub(crate) fn sql_create_table(layer_name: &str, column_defs: &str) -> String {
    format!("CREATE TABLE {} ({})", quote_ident(layer_name), column_defs)
}

pub(crate) fn sql_drop_table(layer_name: &str) -> String {
    format!("DROP TABLE {}", quote_ident(layer_name))
}

/// Page through a layer in primary key order. Binds `LIMIT ?1 OFFSET ?2`.
pub(crate) fn sql_select_features<'a, I>(
    layer_name: &'a str,
    primary_key_column: &'a str,
    columns: I,
) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let columns = std::iter::once(primary_key_column)
        .chain(columns)
        .map(quote_ident)
        .collect::<Vec<String>>()
        .join(", ");
    let primary_key = quote_ident(primary_key_column);

    format!(
        "SELECT {columns} FROM {} ORDER BY {primary_key} LIMIT ?1 OFFSET ?2",
        quote_ident(layer_name)
    )
}

pub(crate) fn sql_insert_feature<'a, I>(layer_name: &'a str, columns: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let columns: Vec<String> = columns.into_iter().map(quote_ident).collect();
    let placeholders = (1..=columns.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<String>>()
        .join(",");

    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(layer_name),
        columns.join(","),
        placeholders
    )
}

pub(crate) fn sql_delete_all(layer_name: &str) -> String {
    format!("DELETE FROM {}", quote_ident(layer_name))
}

pub(crate) fn initialize_gpkg(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "application_id", GPKG_APPLICATION_ID)?;
    conn.pragma_update(None, "user_version", GPKG_USER_VERSION)?;
    conn.execute_batch(SQL_GPKG_SPATIAL_REF_SYS)?;
    register_default_srs_ids(conn)?;
    conn.execute_batch(SQL_GPKG_CONTENTS)?;
    conn.execute_batch(SQL_GPKG_GEOMETRY_COLUMNS)?;
    Ok(())
}

// gpkg_spatial_ref_sys must hold the WKT of every SRS. The required entries
// are bundled; anything else goes through `Gpkg::register_srs`.
fn register_default_srs_ids(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    const EPSG4326_WKT: &str = r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AXIS["Latitude",NORTH],AXIS["Longitude",EAST],AUTHORITY["EPSG","4326"]]"#;

    conn.execute(
        SQL_INSERT_SRS,
        rusqlite::params!["WGS 84", 4326, "EPSG", 4326, EPSG4326_WKT, "WGS 84"],
    )?;
    conn.execute(
        SQL_INSERT_SRS,
        rusqlite::params![
            "Undefined Cartesian SRS",
            -1,
            "NONE",
            -1,
            "undefined",
            "undefined Cartesian coordinate reference system"
        ],
    )?;
    conn.execute(
        SQL_INSERT_SRS,
        rusqlite::params![
            "Undefined geographic SRS",
            0,
            "NONE",
            0,
            "undefined",
            "undefined geographic coordinate reference system"
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{quote_ident, sql_insert_feature, sql_select_features};

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("points"), r#""points""#);
        assert_eq!(quote_ident(r#"odd"name"#), r#""odd""name""#);
    }

    #[test]
    fn select_pages_in_primary_key_order() {
        let sql = sql_select_features("roads", "fid", ["name", "geom"]);
        assert_eq!(
            sql,
            r#"SELECT "fid", "name", "geom" FROM "roads" ORDER BY "fid" LIMIT ?1 OFFSET ?2"#
        );
    }

    #[test]
    fn insert_binds_one_placeholder_per_column() {
        let sql = sql_insert_feature("roads", ["name", "geom"]);
        assert_eq!(sql, r#"INSERT INTO "roads" ("name","geom") VALUES (?1,?2)"#);
    }
}
