use crate::error::{FeatureError, Result};
use crate::geometry::Geometry;
use crate::schema::{Field, Schema};
use crate::types::{Binding, RawValue, Value};
use wkb::reader::Wkb;

/// A record as fetched from an external source: one raw value per schema field, in field order.
#[derive(Clone, Debug, PartialEq)]
pub struct RawFeature {
    pub id: Option<String>,
    pub values: Vec<RawValue>,
}

/// Mutable external record that features write their properties into.
pub trait RawRecord {
    fn set(&mut self, name: &str, value: RawValue) -> Result<()>;
}

/// An immutable record of property values.
///
/// A feature either conforms to a [`Schema`] (built by `Schema::create` or
/// decoded from a source) or stands alone (built from name/value pairs).
/// Both forms answer the same read operations. Two features are equal when
/// their ids and properties are, whichever form holds them.
#[derive(Clone, Debug)]
pub struct Feature {
    id: Option<String>,
    record: Record,
}

#[derive(Clone, Debug)]
enum Record {
    AdHoc(Vec<(String, Value)>),
    Conforming { schema: Schema, values: Vec<Value> },
    // Geometries stay WKB until read.
    Raw { schema: Schema, values: Vec<RawValue> },
}

impl Feature {
    /// Ad hoc feature without an id. Not validated against any schema.
    ///
    /// A repeated key replaces the earlier value, keeping the earlier position.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut properties: Vec<(String, Value)> = Vec::new();
        for (key, value) in pairs {
            let key = key.into();
            match properties.iter_mut().find(|(name, _)| *name == key) {
                Some(slot) => slot.1 = value,
                None => properties.push((key, value)),
            }
        }
        Self {
            id: None,
            record: Record::AdHoc(properties),
        }
    }

    /// Ad hoc feature with an id.
    pub fn with_id<I, K>(id: impl Into<String>, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            id: Some(id.into()),
            ..Self::from_pairs(pairs)
        }
    }

    // `values` are already validated and in field order.
    pub(crate) fn conforming(schema: Schema, id: Option<String>, values: Vec<Value>) -> Self {
        let values = schema
            .fields()
            .iter()
            .zip(values)
            .map(|(field, value)| match (field.projection(), value) {
                (Some(projection), Value::Geometry(geometry)) if geometry.projection().is_none() => {
                    Value::Geometry(geometry.in_projection(projection.clone()))
                }
                (_, value) => value,
            })
            .collect();
        Self {
            id,
            record: Record::Conforming { schema, values },
        }
    }

    /// Wrap a raw source record, checking it against `schema`.
    ///
    /// Each raw value must be interpretable under its field's binding and
    /// geometries must be well-formed WKB. Geometries are decoded again on
    /// every read.
    pub fn decode(schema: &Schema, raw: RawFeature) -> Result<Self> {
        if raw.values.len() != schema.len() {
            return Err(FeatureError::InvalidRecord {
                expected: schema.len(),
                got: raw.values.len(),
            });
        }
        for (field, value) in schema.fields().iter().zip(&raw.values) {
            check_raw(value, field)?;
        }
        Ok(Self {
            id: raw.id,
            record: Record::Raw {
                schema: schema.clone(),
                values: raw.values,
            },
        })
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// The schema this feature conforms to, `None` for ad hoc features.
    pub fn schema(&self) -> Option<&Schema> {
        match &self.record {
            Record::AdHoc(_) => None,
            Record::Conforming { schema, .. } | Record::Raw { schema, .. } => Some(schema),
        }
    }

    pub fn property_names(&self) -> Vec<&str> {
        match &self.record {
            Record::AdHoc(properties) => properties.iter().map(|(name, _)| name.as_str()).collect(),
            Record::Conforming { schema, .. } | Record::Raw { schema, .. } => {
                schema.field_names().collect()
            }
        }
    }

    /// Property value by name.
    pub fn value(&self, key: &str) -> Result<Value> {
        let missing = || FeatureError::MissingProperty {
            property: key.to_string(),
        };
        match &self.record {
            Record::AdHoc(properties) => properties
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value.clone())
                .ok_or_else(missing),
            Record::Conforming { schema, values } => {
                let idx = schema.index_of(key).ok_or_else(missing)?;
                Ok(values[idx].clone())
            }
            Record::Raw { schema, values } => {
                let idx = schema.index_of(key).ok_or_else(missing)?;
                decode_raw(&values[idx], &schema.fields()[idx])
            }
        }
    }

    /// Property value by name, converted to `T` with a checked cast.
    ///
    /// ```
    /// use geo_features::{Feature, props};
    ///
    /// let feature = Feature::from_pairs(props!["a" => 1_i64, "b" => "two"]);
    /// let a: i64 = feature.get("a")?;
    /// assert_eq!(a, 1);
    /// assert!(feature.get::<String>("a").is_err());
    /// # Ok::<(), geo_features::FeatureError>(())
    /// ```
    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: TryFrom<Value, Error = FeatureError>,
    {
        T::try_from(self.value(key)?)
    }

    /// The feature's geometry.
    ///
    /// Schema-backed features use the schema's default geometry field. Ad hoc
    /// features use the first geometry-valued property in insertion order.
    pub fn geometry(&self) -> Result<Geometry> {
        let value = match &self.record {
            Record::AdHoc(properties) => {
                return properties
                    .iter()
                    .find_map(|(_, value)| value.as_geometry().cloned())
                    .ok_or(FeatureError::MissingGeometry);
            }
            Record::Conforming { schema, .. } | Record::Raw { schema, .. } => {
                let field = schema.geometry()?;
                self.value(field.name())?
            }
        };
        match value {
            Value::Geometry(geometry) => Ok(geometry),
            _ => Err(FeatureError::NullGeometryValue),
        }
    }

    /// Snapshot of all properties in schema (or insertion) order.
    pub fn properties(&self) -> Result<Vec<(String, Value)>> {
        match &self.record {
            Record::AdHoc(properties) => Ok(properties.clone()),
            Record::Conforming { schema, values } => Ok(schema
                .field_names()
                .map(str::to_string)
                .zip(values.iter().cloned())
                .collect()),
            Record::Raw { schema, values } => schema
                .fields()
                .iter()
                .zip(values)
                .map(|(field, raw)| Ok((field.name().to_string(), decode_raw(raw, field)?)))
                .collect(),
        }
    }

    /// Copy every property into `record`. Geometries are written as WKB.
    pub fn write_to<R: RawRecord + ?Sized>(&self, record: &mut R) -> Result<()> {
        match &self.record {
            Record::AdHoc(properties) => {
                for (name, value) in properties {
                    record.set(name, value.to_raw()?)?;
                }
            }
            Record::Conforming { schema, values } => {
                for (name, value) in schema.field_names().zip(values) {
                    record.set(name, value.to_raw()?)?;
                }
            }
            Record::Raw { schema, values } => {
                for (name, value) in schema.field_names().zip(values) {
                    record.set(name, value.clone())?;
                }
            }
        }
        Ok(())
    }
}

fn unexpected(raw: &RawValue, field: &Field) -> FeatureError {
    FeatureError::UnexpectedRawValue {
        field: field.name().to_string(),
        expected: field.binding().to_string(),
        actual: raw.type_name(),
    }
}

// A record that fails to decode equals nothing.
impl PartialEq for Feature {
    fn eq(&self, other: &Self) -> bool {
        if self.id != other.id {
            return false;
        }
        match (self.properties(), other.properties()) {
            (Ok(left), Ok(right)) => left == right,
            _ => false,
        }
    }
}

fn check_raw(raw: &RawValue, field: &Field) -> Result<()> {
    match (raw, field) {
        (RawValue::Null, _) => Ok(()),
        (RawValue::Geometry(bytes) | RawValue::Blob(bytes), Field::Geometry { .. }) => {
            Wkb::try_new(bytes)?;
            Ok(())
        }
        (raw, Field::Scalar { binding, .. }) if scalar_matches(raw, *binding) => Ok(()),
        (raw, field) => Err(unexpected(raw, field)),
    }
}

fn scalar_matches(raw: &RawValue, binding: Binding) -> bool {
    matches!(
        (raw, binding),
        (RawValue::Integer(_), Binding::Boolean | Binding::Integer | Binding::Double)
            | (RawValue::Real(_), Binding::Double)
            | (RawValue::Text(_), Binding::Text)
            | (RawValue::Blob(_), Binding::Blob)
    )
}

// Primitive values pass through; geometries are decoded and tagged with the field's projection.
fn decode_raw(raw: &RawValue, field: &Field) -> Result<Value> {
    Ok(match (raw, field) {
        (RawValue::Null, _) => Value::Null,
        (RawValue::Geometry(bytes) | RawValue::Blob(bytes), Field::Geometry { projection, .. }) => {
            let geometry = Geometry::from_wkb(bytes)?;
            Value::Geometry(match projection {
                Some(projection) => geometry.in_projection(projection.clone()),
                None => geometry,
            })
        }
        (RawValue::Integer(value), Field::Scalar { binding, .. }) => match binding {
            Binding::Boolean => Value::Boolean(*value != 0),
            Binding::Integer => Value::Integer(*value),
            Binding::Double => Value::Double(*value as f64),
            _ => return Err(unexpected(raw, field)),
        },
        (RawValue::Real(value), Field::Scalar { binding: Binding::Double, .. }) => {
            Value::Double(*value)
        }
        (RawValue::Text(value), Field::Scalar { binding: Binding::Text, .. }) => {
            Value::Text(value.clone())
        }
        (RawValue::Blob(value), Field::Scalar { binding: Binding::Blob, .. }) => {
            Value::Blob(value.clone())
        }
        (raw, field) => return Err(unexpected(raw, field)),
    })
}
