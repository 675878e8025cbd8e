use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{FeatureError, Result, ValidationIssue};
use crate::feature::Feature;
use crate::projection::Projection;
use crate::types::{Binding, GeometryKind, Value};

/// One named, typed slot of a schema.
#[derive(Clone, Debug, PartialEq)]
pub enum Field {
    Scalar {
        name: String,
        binding: Binding,
    },
    Geometry {
        name: String,
        kind: GeometryKind,
        projection: Option<Projection>,
    },
}

impl Field {
    /// A field of the given binding. A geometry binding yields a geometry field without projection.
    pub fn scalar(name: impl Into<String>, binding: Binding) -> Self {
        let name = name.into();
        match binding {
            Binding::Geometry(kind) => Self::Geometry {
                name,
                kind,
                projection: None,
            },
            binding => Self::Scalar { name, binding },
        }
    }

    pub fn geometry(
        name: impl Into<String>,
        kind: GeometryKind,
        projection: Option<Projection>,
    ) -> Self {
        Self::Geometry {
            name: name.into(),
            kind,
            projection,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Scalar { name, .. } | Self::Geometry { name, .. } => name,
        }
    }

    pub fn binding(&self) -> Binding {
        match self {
            Self::Scalar { binding, .. } => *binding,
            Self::Geometry { kind, .. } => Binding::Geometry(*kind),
        }
    }

    pub fn projection(&self) -> Option<&Projection> {
        match self {
            Self::Scalar { .. } => None,
            Self::Geometry { projection, .. } => projection.as_ref(),
        }
    }

    pub fn is_geometry(&self) -> bool {
        matches!(self, Self::Geometry { .. })
    }

    /// Whether `value`'s runtime type is assignable to this field's binding.
    pub fn accepts(&self, value: &Value) -> bool {
        value.is_assignable_to(self.binding())
    }
}

/// Attribute description as reported by an external source.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeDescriptor {
    pub name: String,
    pub binding: Binding,
    /// Reference system of geometry-typed attributes.
    pub crs: Option<Projection>,
}

/// Raw schema description exposed by an external feature source.
pub trait RawSchema {
    fn name(&self) -> &str;

    /// Attribute descriptors in dataset order.
    fn attributes(&self) -> &[AttributeDescriptor];

    fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes().iter().find(|attr| attr.name == name)
    }
}

/// Plain owned `RawSchema`, used by the bundled sources.
#[derive(Clone, Debug, PartialEq)]
pub struct SchemaDescriptor {
    pub name: String,
    pub attributes: Vec<AttributeDescriptor>,
}

impl RawSchema for SchemaDescriptor {
    fn name(&self) -> &str {
        &self.name
    }

    fn attributes(&self) -> &[AttributeDescriptor] {
        &self.attributes
    }
}

/// Ordered, named description of the fields of a dataset.
///
/// Cloning is cheap; features built by `create` share the schema.
#[derive(Clone, Debug)]
pub struct Schema {
    inner: Arc<SchemaInner>,
}

#[derive(Debug)]
struct SchemaInner {
    name: String,
    fields: Vec<Field>,
    index_by_name: HashMap<String, usize>,
}

impl Schema {
    /// Build a schema from a dataset name and fields in order.
    ///
    /// Field names must be non-empty and unique.
    pub fn new<I>(name: impl Into<String>, fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = Field>,
    {
        let fields: Vec<Field> = fields.into_iter().collect();
        let mut index_by_name = HashMap::with_capacity(fields.len());
        for (idx, field) in fields.iter().enumerate() {
            if field.name().is_empty() {
                return Err(FeatureError::EmptyFieldName);
            }
            if index_by_name.insert(field.name().to_string(), idx).is_some() {
                return Err(FeatureError::DuplicateFieldName {
                    name: field.name().to_string(),
                });
            }
        }

        Ok(Self {
            inner: Arc::new(SchemaInner {
                name: name.into(),
                fields,
                index_by_name,
            }),
        })
    }

    /// Wrap an external schema description, keeping its attribute order.
    pub fn from_raw<R: RawSchema + ?Sized>(raw: &R) -> Result<Self> {
        let fields = raw.attributes().iter().map(|attr| match attr.binding {
            Binding::Geometry(kind) => Field::geometry(&attr.name, kind, attr.crs.clone()),
            binding => Field::scalar(&attr.name, binding),
        });
        Self::new(raw.name(), fields)
    }

    /// Describe this schema in the raw form sources consume.
    pub fn descriptor(&self) -> SchemaDescriptor {
        SchemaDescriptor {
            name: self.name().to_string(),
            attributes: self
                .fields()
                .iter()
                .map(|field| AttributeDescriptor {
                    name: field.name().to_string(),
                    binding: field.binding(),
                    crs: field.projection().cloned(),
                })
                .collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn fields(&self) -> &[Field] {
        &self.inner.fields
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.inner.fields.iter().map(Field::name)
    }

    pub fn len(&self) -> usize {
        self.inner.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.fields.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.inner.index_by_name.get(name).copied()
    }

    /// Look up a field by name.
    pub fn get(&self, name: &str) -> Result<&Field> {
        self.index_of(name)
            .map(|idx| &self.inner.fields[idx])
            .ok_or_else(|| FeatureError::FieldNotFound {
                name: name.to_string(),
            })
    }

    /// The default geometry field: the first geometry field in declared order.
    pub fn geometry(&self) -> Result<&Field> {
        self.inner
            .fields
            .iter()
            .find(|field| field.is_geometry())
            .ok_or_else(|| FeatureError::NoDefaultGeometry {
                schema: self.name().to_string(),
            })
    }

    /// Validate `pairs` against this schema and build a conforming feature without an id.
    ///
    /// Every field must be supplied exactly once, no other keys are allowed, and
    /// each value must be assignable to its field's binding.
    ///
    /// ```
    /// use geo_features::{Binding, Field, GeometryKind, Schema, props};
    /// use geo_types::Point;
    ///
    /// let schema = Schema::new(
    ///     "cities",
    ///     [
    ///         Field::scalar("name", Binding::Text),
    ///         Field::geometry("geom", GeometryKind::Point, None),
    ///     ],
    /// )?;
    /// let feature = schema.create(props!["name" => "San Francisco", "geom" => Point::new(-122.42, 37.78)])?;
    /// let name: String = feature.get("name")?;
    /// assert_eq!(name, "San Francisco");
    /// # Ok::<(), geo_features::FeatureError>(())
    /// ```
    pub fn create<I, K>(&self, pairs: I) -> Result<Feature>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.build(None, pairs)
    }

    /// Like `create`, with an identifier.
    pub fn create_with_id<I, K>(&self, id: impl Into<String>, pairs: I) -> Result<Feature>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.build(Some(id.into()), pairs)
    }

    fn build<I, K>(&self, id: Option<String>, pairs: I) -> Result<Feature>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let supplied: Vec<(String, Value)> = pairs
            .into_iter()
            .map(|(key, value)| (key.into(), value))
            .collect();

        if let Some(issue) = self.find_issue(&supplied) {
            return Err(FeatureError::SchemaValidation {
                issue,
                supplied,
                required: self.fields().to_vec(),
            });
        }

        let mut slots: Vec<Option<Value>> = vec![None; self.len()];
        for (key, value) in supplied {
            if let Some(idx) = self.index_of(&key) {
                slots[idx] = Some(value);
            }
        }
        let values = slots
            .into_iter()
            .map(|slot| slot.unwrap_or(Value::Null))
            .collect();

        Ok(Feature::conforming(self.clone(), id, values))
    }

    fn find_issue(&self, supplied: &[(String, Value)]) -> Option<ValidationIssue> {
        if supplied.len() != self.len() {
            return Some(ValidationIssue::CountMismatch {
                expected: self.len(),
                got: supplied.len(),
            });
        }

        let mut seen = vec![false; self.len()];
        for (key, value) in supplied {
            let Some(idx) = self.index_of(key) else {
                return Some(ValidationIssue::UnknownField { name: key.clone() });
            };
            if std::mem::replace(&mut seen[idx], true) {
                return Some(ValidationIssue::DuplicateField { name: key.clone() });
            }
            let field = &self.inner.fields[idx];
            if !field.accepts(value) {
                return Some(ValidationIssue::TypeMismatch {
                    field: key.clone(),
                    expected: field.binding().to_string(),
                    actual: value.type_name(),
                });
            }
            if let (Some(expected), Value::Geometry(geometry)) = (field.projection(), value)
                && let Some(actual) = geometry.projection()
                && actual != expected
            {
                return Some(ValidationIssue::ProjectionMismatch {
                    field: key.clone(),
                    expected: expected.code().to_string(),
                    actual: actual.code().to_string(),
                });
            }
        }
        None
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
            || (self.inner.name == other.inner.name && self.inner.fields == other.inner.fields)
    }
}
