use crate::error::FeatureError;
use crate::types::{Binding, GeometryKind};

#[inline]
pub(crate) fn geometry_kind_to_str(kind: GeometryKind) -> &'static str {
    match kind {
        GeometryKind::Any => "GEOMETRY",
        GeometryKind::Point => "POINT",
        GeometryKind::LineString => "LINESTRING",
        GeometryKind::Polygon => "POLYGON",
        GeometryKind::MultiPoint => "MULTIPOINT",
        GeometryKind::MultiLineString => "MULTILINESTRING",
        GeometryKind::MultiPolygon => "MULTIPOLYGON",
        GeometryKind::GeometryCollection => "GEOMETRYCOLLECTION",
    }
}

#[inline]
pub(crate) fn geometry_kind_from_str(geometry_type_str: &str) -> Result<GeometryKind, FeatureError> {
    let s = geometry_type_str;
    if s.eq_ignore_ascii_case("GEOMETRY") {
        Ok(GeometryKind::Any)
    } else if s.eq_ignore_ascii_case("GEOMETRYCOLLECTION") {
        Ok(GeometryKind::GeometryCollection)
    } else if s.eq_ignore_ascii_case("POINT") {
        Ok(GeometryKind::Point)
    } else if s.eq_ignore_ascii_case("LINESTRING") {
        Ok(GeometryKind::LineString)
    } else if s.eq_ignore_ascii_case("POLYGON") {
        Ok(GeometryKind::Polygon)
    } else if s.eq_ignore_ascii_case("MULTIPOINT") {
        Ok(GeometryKind::MultiPoint)
    } else if s.eq_ignore_ascii_case("MULTILINESTRING") {
        Ok(GeometryKind::MultiLineString)
    } else if s.eq_ignore_ascii_case("MULTIPOLYGON") {
        Ok(GeometryKind::MultiPolygon)
    } else {
        Err(FeatureError::UnsupportedGeometryType(
            geometry_type_str.to_string(),
        ))
    }
}

#[inline]
pub(crate) fn binding_to_column_type(binding: Binding) -> &'static str {
    match binding {
        Binding::Boolean => "BOOLEAN",
        Binding::Integer => "INTEGER",
        Binding::Double => "DOUBLE",
        Binding::Text => "TEXT",
        Binding::Blob => "BLOB",
        Binding::Geometry(kind) => geometry_kind_to_str(kind),
    }
}

/// Map a declared SQLite column type to a binding.
// cf. https://www.geopackage.org/spec140/index.html#table_column_data_types
#[inline]
pub(crate) fn binding_from_column_type(column_type_str: &str) -> Option<Binding> {
    // TEXT(n) and BLOB(n) carry a maximum length we don't track.
    let s = column_type_str
        .split_once('(')
        .map_or(column_type_str, |(base, _)| base)
        .trim();
    if s.eq_ignore_ascii_case("BOOLEAN") {
        Some(Binding::Boolean)
    } else if s.eq_ignore_ascii_case("TINYINT")
        || s.eq_ignore_ascii_case("SMALLINT")
        || s.eq_ignore_ascii_case("MEDIUMINT")
        || s.eq_ignore_ascii_case("INT")
        || s.eq_ignore_ascii_case("INTEGER")
    {
        Some(Binding::Integer)
    } else if s.eq_ignore_ascii_case("DOUBLE")
        || s.eq_ignore_ascii_case("FLOAT")
        || s.eq_ignore_ascii_case("REAL")
    {
        Some(Binding::Double)
    } else if s.eq_ignore_ascii_case("TEXT")
        || s.eq_ignore_ascii_case("DATE")
        || s.eq_ignore_ascii_case("DATETIME")
    {
        Some(Binding::Text)
    } else if s.eq_ignore_ascii_case("BLOB") {
        Some(Binding::Blob)
    } else {
        geometry_kind_from_str(s).ok().map(Binding::Geometry)
    }
}
