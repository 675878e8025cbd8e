//! GeoPackage feature source and sink backed by rusqlite.
//!
//! Layers are read through the [`FeatureSource`](crate::FeatureSource)
//! protocol with a paging cursor, and written one feature at a time.

mod blob;
mod cursor;
mod gpkg;
mod layer;

pub use cursor::GpkgCursor;
pub use gpkg::Gpkg;
pub use layer::GpkgLayer;

pub(crate) use blob::{gpkg_geometry_to_wkb, wkb_to_gpkg_geometry};
