use std::error::Error;
use std::fmt;

use crate::schema::Field;
use crate::types::Value;

/// Crate error type for schema, feature, geometry and source operations.
#[derive(Debug)]
pub enum FeatureError {
    /// Wraps errors returned by `rusqlite`.
    Sql(rusqlite::Error),
    /// Wraps errors returned by the `wkb` crate.
    Wkb(wkb::error::WkbError),
    /// Wraps WKT parse errors as strings.
    #[cfg(feature = "wkt")]
    Wkt(String),
    /// `Schema::create` received properties that do not conform to the schema.
    SchemaValidation {
        issue: ValidationIssue,
        supplied: Vec<(String, Value)>,
        required: Vec<Field>,
    },
    /// A schema was built with a field whose name is empty.
    EmptyFieldName,
    /// A schema was built with two fields of the same name.
    DuplicateFieldName { name: String },
    /// Requested field does not exist in the schema.
    FieldNotFound { name: String },
    /// Requested feature property does not exist in the feature.
    MissingProperty { property: String },
    /// No property of the feature holds a geometry.
    MissingGeometry,
    /// The schema has no geometry field to act as its default geometry.
    NoDefaultGeometry { schema: String },
    /// The geometry property of a feature is `NULL`.
    NullGeometryValue,
    /// WKB decoded to a shape that cannot be represented (e.g. an empty point).
    UnrepresentableGeometry,
    /// Dynamic `Value` type did not match the expected conversion target.
    ValueTypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
    /// Numeric conversion failed because the value is out of range.
    ValueOutOfRange { target: &'static str },
    /// A geometry without a projection cannot be transformed.
    MissingProjection,
    /// A projection code is not of the form `AUTHORITY:CODE`.
    InvalidProjectionCode(String),
    /// The projection service has no definition for the code.
    UnsupportedProjection { code: String },
    /// The projection service failed to transform coordinates.
    Transform {
        source: String,
        target: String,
        message: String,
    },
    /// An external feature source failed to open a cursor or fetch a record.
    Resource(String),
    /// A raw record does not have one value per schema field.
    InvalidRecord { expected: usize, got: usize },
    /// A raw value cannot be interpreted under the binding of its field.
    UnexpectedRawValue {
        field: String,
        expected: String,
        actual: &'static str,
    },
    /// An external record has no attribute of that name.
    UnknownAttribute { name: String },
    /// A geometry type in metadata could not be mapped to a supported geometry kind.
    UnsupportedGeometryType(String),
    /// A column type declared in SQLite metadata is not supported by this crate.
    UnsupportedColumnType {
        column: String,
        declared_type: String,
    },
    /// Invalid GeoPackage geometry flags byte.
    InvalidGpkgGeometryFlags(u8),
    /// GeoPackage geometry blob is shorter than its header and envelope.
    InvalidGpkgGeometryLength { len: usize, minimum: usize },
    /// A layer with the same name already exists.
    LayerAlreadyExists { layer_name: String },
    /// No spatial reference system matches the projection of the geometry field.
    MissingSpatialRefSys { projection: String },
    /// Layer schema has multiple primary key columns, which is unsupported.
    CompositePrimaryKeyUnsupported { layer_name: String },
    /// Layer schema has no primary key column.
    MissingPrimaryKeyColumn { layer_name: String },
    /// Layer schema has no geometry column.
    MissingGeometryColumn { layer_name: String },
    /// Operation not allowed on a read-only GeoPackage.
    ReadOnly,
    Message(String),
}

/// The specific rule `Schema::create` found violated.
#[derive(Clone, Debug, PartialEq)]
pub enum ValidationIssue {
    CountMismatch { expected: usize, got: usize },
    UnknownField { name: String },
    DuplicateField { name: String },
    TypeMismatch {
        field: String,
        expected: String,
        actual: &'static str,
    },
    /// A geometry is declared in a different projection than its field.
    ProjectionMismatch {
        field: String,
        expected: String,
        actual: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CountMismatch { expected, got } => {
                write!(f, "expected {expected} properties, got {got}")
            }
            Self::UnknownField { name } => write!(f, "unknown field '{name}'"),
            Self::DuplicateField { name } => write!(f, "field '{name}' supplied twice"),
            Self::TypeMismatch {
                field,
                expected,
                actual,
            } => write!(f, "field '{field}' expects {expected}, got {actual}"),
            Self::ProjectionMismatch {
                field,
                expected,
                actual,
            } => write!(f, "field '{field}' is in {expected}, geometry is in {actual}"),
        }
    }
}

impl fmt::Display for FeatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sql(err) => write!(f, "{err}"),
            Self::Wkb(err) => write!(f, "{err}"),
            #[cfg(feature = "wkt")]
            Self::Wkt(err) => write!(f, "{err}"),
            Self::SchemaValidation {
                issue,
                supplied,
                required,
            } => {
                let supplied = supplied
                    .iter()
                    .map(|(name, value)| format!("{name}: {}", value.type_name()))
                    .collect::<Vec<String>>()
                    .join(", ");
                let required = required
                    .iter()
                    .map(|field| format!("{}: {}", field.name(), field.binding()))
                    .collect::<Vec<String>>()
                    .join(", ");
                write!(
                    f,
                    "invalid feature: {issue} (supplied [{supplied}], required [{required}])"
                )
            }
            Self::EmptyFieldName => write!(f, "field name must not be empty"),
            Self::DuplicateFieldName { name } => write!(f, "duplicate field name: {name}"),
            Self::FieldNotFound { name } => write!(f, "no such field: {name}"),
            Self::MissingProperty { property } => write!(f, "missing property: {property}"),
            Self::MissingGeometry => write!(f, "feature has no geometry property"),
            Self::NoDefaultGeometry { schema } => {
                write!(f, "schema '{schema}' has no geometry field")
            }
            Self::NullGeometryValue => write!(f, "feature has null geometry value"),
            Self::UnrepresentableGeometry => {
                write!(f, "geometry cannot be represented (empty point?)")
            }
            Self::ValueTypeMismatch { expected, actual } => {
                write!(f, "expected {expected}, got {actual}")
            }
            Self::ValueOutOfRange { target } => write!(f, "value out of range for {target}"),
            Self::MissingProjection => write!(f, "geometry has no projection to transform from"),
            Self::InvalidProjectionCode(code) => {
                write!(f, "invalid projection code '{code}', expected AUTHORITY:CODE")
            }
            Self::UnsupportedProjection { code } => write!(f, "unsupported projection: {code}"),
            Self::Transform {
                source,
                target,
                message,
            } => write!(f, "transform from {source} to {target} failed: {message}"),
            Self::Resource(err) => write!(f, "feature source error: {err}"),
            Self::InvalidRecord { expected, got } => {
                write!(f, "invalid record: expected {expected} values, got {got}")
            }
            Self::UnexpectedRawValue {
                field,
                expected,
                actual,
            } => write!(f, "field '{field}' expects {expected}, source returned {actual}"),
            Self::UnknownAttribute { name } => write!(f, "record has no attribute: {name}"),
            Self::UnsupportedGeometryType(ty) => write!(f, "unsupported geometry type: {ty}"),
            Self::UnsupportedColumnType {
                column,
                declared_type,
            } => write!(
                f,
                "unsupported column type for column '{column}': {declared_type}"
            ),
            Self::InvalidGpkgGeometryFlags(flags) => {
                write!(f, "invalid gpkg geometry flags: {flags:#04x}")
            }
            Self::InvalidGpkgGeometryLength { len, minimum } => {
                write!(
                    f,
                    "invalid gpkg geometry length: got {len} bytes, expected at least {minimum}"
                )
            }
            Self::LayerAlreadyExists { layer_name } => {
                write!(f, "layer already exists: {layer_name}")
            }
            Self::MissingSpatialRefSys { projection } => {
                write!(f, "{projection} not found in gpkg_spatial_ref_sys")
            }
            Self::CompositePrimaryKeyUnsupported { layer_name } => write!(
                f,
                "composite primary keys are not supported yet for layer: {layer_name}"
            ),
            Self::MissingPrimaryKeyColumn { layer_name } => {
                write!(f, "no primary key column found for layer: {layer_name}")
            }
            Self::MissingGeometryColumn { layer_name } => {
                write!(f, "no geometry column found for layer: {layer_name}")
            }
            Self::ReadOnly => write!(f, "operation not allowed on read-only connection"),
            Self::Message(message) => write!(f, "{message}"),
        }
    }
}

impl Error for FeatureError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sql(err) => Some(err),
            Self::Wkb(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for FeatureError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Sql(err)
    }
}

impl From<wkb::error::WkbError> for FeatureError {
    fn from(err: wkb::error::WkbError) -> Self {
        Self::Wkb(err)
    }
}

pub type Result<T> = std::result::Result<T, FeatureError>;
