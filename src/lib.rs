//! Typed features, schemas and projection-aware geometries, with lazy and
//! closeable iteration over vector data sources.
//!
//! ## Overview
//!
//! - `Geometry` is an immutable shape with an optional `Projection`. It can be
//!   reprojected through a `ProjectionService` and prepared for repeated
//!   `contains`/`intersects` checks.
//! - `Schema` is an ordered list of `Field`s; `Schema::create` validates a set
//!   of properties and builds a conforming `Feature`.
//! - `Feature` is an immutable record, either backed by a schema or built ad
//!   hoc from name/value pairs. `Value` is the dynamic property value.
//! - `FeatureCollection` runs a `Query` against a `FeatureSource` each time it
//!   is traversed. The cursor behind a traversal is released exactly once, on
//!   exhaustion, on error, or when the iterator is dropped.
//!
//! Two sources are bundled: `MemoryStore`, and `GpkgLayer` for GeoPackage
//! files. `Gpkg` is the GeoPackage entry point and supports several open modes:
//!
//! - `Gpkg::open_read_only(path)`: open an existing file without write access.
//! - `Gpkg::open(path)`: open an existing file for read/write.
//! - `Gpkg::new(path)`: create a new file.
//! - `Gpkg::new_in_memory()`: create a transient in-memory GeoPackage.
//!
//! ## Short usage
//!
//! ```
//! use geo_features::{Binding, Field, GeometryKind, Gpkg, Projection, Query, Schema, props};
//! use geo_types::Point;
//!
//! let schema = Schema::new(
//!     "cities",
//!     [
//!         Field::scalar("name", Binding::Text),
//!         Field::geometry("location", GeometryKind::Point, Some(Projection::epsg(4326))),
//!     ],
//! )?;
//! let paris = schema.create(props!["name" => "Paris", "location" => Point::new(2.35, 48.86)])?;
//!
//! let gpkg = Gpkg::new_in_memory()?;
//! let layer = gpkg.create_layer(&schema)?;
//! layer.insert(&paris)?;
//!
//! for feature in layer.collection(Query::all())?.features()? {
//!     let feature = feature?;
//!     let name: String = feature.get("name")?;
//!     let mercator = feature.geometry()?.transform(&Projection::epsg(3857))?;
//!     assert_eq!(name, "Paris");
//!     assert_eq!(mercator.projection(), Some(&Projection::epsg(3857)));
//! }
//! # Ok::<(), geo_features::FeatureError>(())
//! ```
//!
//! ## Ad hoc features
//!
//! ```
//! use geo_features::{Feature, Value, props};
//!
//! let feature = Feature::from_pairs(props!["a" => 1_i64, "b" => "two"]);
//! let a: i64 = feature.get("a")?;
//! assert_eq!(a, 1);
//! assert_eq!(feature.value("b")?, Value::Text("two".to_string()));
//!
//! // NULL converts to `None` when read as `Option<T>`.
//! let maybe: Option<i64> = Value::Null.try_into()?;
//! assert_eq!(maybe, None);
//! # Ok::<(), geo_features::FeatureError>(())
//! ```
mod collection;
mod conversions;
mod error;
mod feature;
mod geometry;
mod gpkg;
mod memory;
mod ogc_sql;
mod projection;
mod schema;
mod types;

pub use collection::{DEFAULT_PAGE_SIZE, FeatureCollection, FeatureSource, Features, Query, RawCursor};
pub use error::{FeatureError, Result, ValidationIssue};
pub use feature::{Feature, RawFeature, RawRecord};
pub use geometry::Geometry;
pub use gpkg::{Gpkg, GpkgCursor, GpkgLayer};
pub use memory::{MemoryCursor, MemoryStore};
pub use projection::{
    CoordinateTransform, Proj4Service, Proj4Transformer, Projection, ProjectionService,
};
pub use schema::{AttributeDescriptor, Field, RawSchema, Schema, SchemaDescriptor};
pub use types::{Binding, GeometryKind, RawValue, Value};
