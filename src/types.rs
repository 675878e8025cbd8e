use std::fmt;

use crate::error::{FeatureError, Result};
use crate::geometry::Geometry;

/// Shape family a geometry field is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    Any,
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
    GeometryCollection,
}

impl GeometryKind {
    /// Classify a shape. `Line` counts as a line string, `Rect` and `Triangle` as polygons.
    pub fn of(shape: &geo_types::Geometry<f64>) -> Self {
        match shape {
            geo_types::Geometry::Point(_) => Self::Point,
            geo_types::Geometry::Line(_) | geo_types::Geometry::LineString(_) => Self::LineString,
            geo_types::Geometry::Polygon(_)
            | geo_types::Geometry::Rect(_)
            | geo_types::Geometry::Triangle(_) => Self::Polygon,
            geo_types::Geometry::MultiPoint(_) => Self::MultiPoint,
            geo_types::Geometry::MultiLineString(_) => Self::MultiLineString,
            geo_types::Geometry::MultiPolygon(_) => Self::MultiPolygon,
            geo_types::Geometry::GeometryCollection(_) => Self::GeometryCollection,
        }
    }

    /// Whether a field of this kind can hold a shape of kind `other`.
    pub fn accepts(self, other: GeometryKind) -> bool {
        self == Self::Any || self == other
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Any => "Geometry",
            Self::Point => "Point",
            Self::LineString => "LineString",
            Self::Polygon => "Polygon",
            Self::MultiPoint => "MultiPoint",
            Self::MultiLineString => "MultiLineString",
            Self::MultiPolygon => "MultiPolygon",
            Self::GeometryCollection => "GeometryCollection",
        }
    }
}

/// Declared value type of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Binding {
    Boolean,
    Integer,
    Double,
    Text,
    Blob,
    Geometry(GeometryKind),
}

impl Binding {
    pub fn is_geometry(self) -> bool {
        matches!(self, Self::Geometry(_))
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Boolean => "Boolean",
            Self::Integer => "Integer",
            Self::Double => "Double",
            Self::Text => "Text",
            Self::Blob => "Blob",
            Self::Geometry(kind) => kind.name(),
        };
        f.write_str(name)
    }
}

/// Owned dynamic value of a feature property.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    Text(String),
    Blob(Vec<u8>),
    Geometry(Geometry),
}

impl Value {
    /// Runtime type name, with geometries reported by shape kind.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Boolean(_) => "Boolean",
            Self::Integer(_) => "Integer",
            Self::Double(_) => "Double",
            Self::Text(_) => "Text",
            Self::Blob(_) => "Blob",
            Self::Geometry(geometry) => geometry.kind().name(),
        }
    }

    /// `NULL` is assignable to every binding.
    pub fn is_assignable_to(&self, binding: Binding) -> bool {
        match (self, binding) {
            (Self::Null, _) => true,
            (Self::Boolean(_), Binding::Boolean)
            | (Self::Integer(_), Binding::Integer)
            | (Self::Double(_), Binding::Double)
            | (Self::Text(_), Binding::Text)
            | (Self::Blob(_), Binding::Blob) => true,
            (Self::Geometry(geometry), Binding::Geometry(kind)) => kind.accepts(geometry.kind()),
            _ => false,
        }
    }

    pub fn as_geometry(&self) -> Option<&Geometry> {
        match self {
            Self::Geometry(geometry) => Some(geometry),
            _ => None,
        }
    }

    /// Translate to the storage form external records expect. Geometries become WKB.
    pub fn to_raw(&self) -> Result<RawValue> {
        Ok(match self {
            Self::Null => RawValue::Null,
            Self::Boolean(value) => RawValue::Integer(i64::from(*value)),
            Self::Integer(value) => RawValue::Integer(*value),
            Self::Double(value) => RawValue::Real(*value),
            Self::Text(value) => RawValue::Text(value.clone()),
            Self::Blob(value) => RawValue::Blob(value.clone()),
            Self::Geometry(geometry) => RawValue::Geometry(geometry.to_wkb()?),
        })
    }
}

/// Storage form of a value as exchanged with external sources and records.
///
/// This mirrors SQLite's dynamic typing, with geometries carried as WKB.
#[derive(Clone, Debug, PartialEq)]
pub enum RawValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Geometry(Vec<u8>),
}

impl RawValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Integer(_) => "Integer",
            Self::Real(_) => "Real",
            Self::Text(_) => "Text",
            Self::Blob(_) => "Blob",
            Self::Geometry(_) => "Geometry",
        }
    }
}

fn mismatch(expected: &'static str, actual: &Value) -> FeatureError {
    FeatureError::ValueTypeMismatch {
        expected,
        actual: actual.type_name(),
    }
}

impl TryFrom<Value> for String {
    type Error = FeatureError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Text(value) => Ok(value),
            other => Err(mismatch("Text", &other)),
        }
    }
}

impl TryFrom<Value> for i64 {
    type Error = FeatureError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Integer(value) => Ok(value),
            other => Err(mismatch("Integer", &other)),
        }
    }
}

impl TryFrom<Value> for i32 {
    type Error = FeatureError;

    fn try_from(value: Value) -> Result<Self> {
        let value = i64::try_from(value)?;
        i32::try_from(value).map_err(|_| FeatureError::ValueOutOfRange { target: "i32" })
    }
}

impl TryFrom<Value> for f64 {
    type Error = FeatureError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Double(value) => Ok(value),
            Value::Integer(value) => Ok(value as f64),
            other => Err(mismatch("Double", &other)),
        }
    }
}

impl TryFrom<Value> for bool {
    type Error = FeatureError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Boolean(value) => Ok(value),
            Value::Integer(0) => Ok(false),
            Value::Integer(1) => Ok(true),
            Value::Integer(_) => Err(FeatureError::ValueOutOfRange { target: "bool" }),
            other => Err(mismatch("Boolean", &other)),
        }
    }
}

impl TryFrom<Value> for Vec<u8> {
    type Error = FeatureError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Blob(value) => Ok(value),
            other => Err(mismatch("Blob", &other)),
        }
    }
}

impl TryFrom<Value> for Geometry {
    type Error = FeatureError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Geometry(value) => Ok(value),
            other => Err(mismatch("Geometry", &other)),
        }
    }
}

// `NULL` converts to `None`, anything else goes through the plain conversion.
macro_rules! impl_try_from_value_for_option {
    ($($target:ty),+ $(,)?) => {
        $(
            impl TryFrom<Value> for Option<$target> {
                type Error = FeatureError;

                fn try_from(value: Value) -> Result<Self> {
                    match value {
                        Value::Null => Ok(None),
                        other => <$target>::try_from(other).map(Some),
                    }
                }
            }
        )+
    };
}

impl_try_from_value_for_option!(String, i64, i32, f64, bool, Vec<u8>, Geometry);

macro_rules! impl_value_from {
    ($($source:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$source> for Value {
                fn from(value: $source) -> Self {
                    Value::$variant(value.into())
                }
            }

            impl From<Option<$source>> for Value {
                fn from(value: Option<$source>) -> Self {
                    value.map_or(Value::Null, Value::from)
                }
            }
        )+
    };
}

impl_value_from!(
    bool => Boolean,
    i64 => Integer,
    i32 => Integer,
    f64 => Double,
    String => Text,
    Vec<u8> => Blob,
    Geometry => Geometry,
);

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<Option<&str>> for Value {
    fn from(value: Option<&str>) -> Self {
        value.map_or(Value::Null, Value::from)
    }
}

macro_rules! impl_value_from_shape {
    ($($shape:ty),+ $(,)?) => {
        $(
            impl From<$shape> for Value {
                fn from(value: $shape) -> Self {
                    Value::Geometry(Geometry::new(value))
                }
            }
        )+
    };
}

impl_value_from_shape!(
    geo_types::Geometry<f64>,
    geo_types::Point<f64>,
    geo_types::LineString<f64>,
    geo_types::Polygon<f64>,
    geo_types::MultiPoint<f64>,
    geo_types::MultiLineString<f64>,
    geo_types::MultiPolygon<f64>,
);

/// Build a list of `(name, Value)` pairs for `Schema::create` or `Feature::from_pairs`.
///
/// ```
/// use geo_features::{Value, props};
/// use geo_types::Point;
///
/// let pairs = props!["name" => "San Francisco", "geom" => Point::new(-122.42, 37.78)];
/// assert_eq!(pairs[0], ("name".to_string(), Value::from("San Francisco")));
/// ```
#[macro_export]
macro_rules! props {
    () => {
        ::std::vec::Vec::<(::std::string::String, $crate::Value)>::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {
        vec![$((::std::string::String::from($key), $crate::Value::from($value))),+]
    };
}

#[cfg(test)]
mod tests {
    use super::{Binding, GeometryKind, RawValue, Value};
    use crate::Result;
    use crate::error::FeatureError;
    use crate::geometry::Geometry;
    use geo_types::{Point, Rect, coord};

    #[test]
    fn converts_values_with_checked_casts() -> Result<()> {
        let name: String = Value::from("alpha").try_into()?;
        assert_eq!(name, "alpha");

        let count: i32 = Value::from(7_i64).try_into()?;
        assert_eq!(count, 7);

        let widened: f64 = Value::from(3_i64).try_into()?;
        assert_eq!(widened, 3.0);

        let active: bool = Value::Integer(1).try_into()?;
        assert!(active);

        let err = String::try_from(Value::from(5_i64)).expect_err("integer is not text");
        assert!(matches!(
            err,
            FeatureError::ValueTypeMismatch {
                expected: "Text",
                actual: "Integer"
            }
        ));

        let err = i32::try_from(Value::Integer(i64::MAX)).expect_err("too large for i32");
        assert!(matches!(err, FeatureError::ValueOutOfRange { target: "i32" }));
        Ok(())
    }

    #[test]
    fn null_converts_to_none() -> Result<()> {
        let maybe: Option<i64> = Value::Null.try_into()?;
        assert_eq!(maybe, None);

        let maybe: Option<String> = Value::from("x").try_into()?;
        assert_eq!(maybe.as_deref(), Some("x"));

        assert_eq!(Value::from(Option::<f64>::None), Value::Null);
        Ok(())
    }

    #[test]
    fn assignability_follows_binding() {
        let point = Value::from(Point::new(1.0, 2.0));
        assert!(point.is_assignable_to(Binding::Geometry(GeometryKind::Any)));
        assert!(point.is_assignable_to(Binding::Geometry(GeometryKind::Point)));
        assert!(!point.is_assignable_to(Binding::Geometry(GeometryKind::Polygon)));
        assert!(!point.is_assignable_to(Binding::Text));

        let rect = Value::Geometry(Geometry::new(Rect::new(
            coord! { x: 0.0, y: 0.0 },
            coord! { x: 1.0, y: 1.0 },
        )));
        assert!(rect.is_assignable_to(Binding::Geometry(GeometryKind::Polygon)));

        assert!(Value::Null.is_assignable_to(Binding::Integer));
        assert!(!Value::from(1.5).is_assignable_to(Binding::Integer));
    }

    #[test]
    fn to_raw_encodes_geometry_and_booleans() -> Result<()> {
        assert_eq!(Value::Boolean(true).to_raw()?, RawValue::Integer(1));
        assert_eq!(Value::from("a").to_raw()?, RawValue::Text("a".to_string()));

        let raw = Value::from(Point::new(3.0, -1.0)).to_raw()?;
        let RawValue::Geometry(wkb) = raw else {
            panic!("expected geometry, got {raw:?}");
        };
        assert_eq!(Geometry::from_wkb(&wkb)?, Geometry::new(Point::new(3.0, -1.0)));
        Ok(())
    }

    #[test]
    fn props_macro_builds_pairs() {
        let pairs = crate::props!["a" => 1_i64, "b" => "two"];
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), Value::Integer(1)),
                ("b".to_string(), Value::Text("two".to_string())),
            ]
        );
        assert!(crate::props![].is_empty());
    }
}
