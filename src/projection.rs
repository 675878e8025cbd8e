//! Coordinate reference systems and the service that transforms between them.
//!
//! A [`Projection`] is only an identifier (`"EPSG:4326"`). The numeric work is
//! delegated to a [`ProjectionService`]; [`Proj4Service`] is the default one,
//! resolving EPSG codes with `crs-definitions` and transforming with `proj4rs`.

use std::fmt;
use std::str::FromStr;

use geo_types::Coord;
use proj4rs::proj::Proj;

use crate::error::{FeatureError, Result};

/// A coordinate reference system identified by an `AUTHORITY:CODE` string.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Projection {
    code: String,
}

impl Projection {
    /// Projection for an EPSG code, e.g. `Projection::epsg(4326)`.
    pub fn epsg(code: u16) -> Self {
        Self {
            code: format!("EPSG:{code}"),
        }
    }

    /// Parse an `AUTHORITY:CODE` identifier. The authority is upper-cased.
    pub fn from_code(code: &str) -> Result<Self> {
        let (authority, id) = code
            .split_once(':')
            .ok_or_else(|| FeatureError::InvalidProjectionCode(code.to_string()))?;
        let authority = authority.trim();
        let id = id.trim();
        if authority.is_empty() || id.is_empty() {
            return Err(FeatureError::InvalidProjectionCode(code.to_string()));
        }
        Ok(Self {
            code: format!("{}:{id}", authority.to_ascii_uppercase()),
        })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn authority(&self) -> &str {
        self.code.split_once(':').map_or("", |(authority, _)| authority)
    }

    /// The numeric code if this is an EPSG projection.
    pub fn epsg_code(&self) -> Option<u16> {
        match self.code.split_once(':') {
            Some(("EPSG", id)) => id.parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code)
    }
}

impl FromStr for Projection {
    type Err = FeatureError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_code(s)
    }
}

/// A pure per-coordinate transform between two reference systems.
pub trait CoordinateTransform {
    fn transform(&self, coord: Coord<f64>) -> Result<Coord<f64>>;
}

/// Builds coordinate transforms between projections.
pub trait ProjectionService {
    type Transformer: CoordinateTransform;

    fn transformer(&self, source: &Projection, target: &Projection) -> Result<Self::Transformer>;
}

/// Default projection service backed by `proj4rs` and the `crs-definitions` database.
#[derive(Clone, Copy, Debug, Default)]
pub struct Proj4Service;

impl ProjectionService for Proj4Service {
    type Transformer = Proj4Transformer;

    fn transformer(&self, source: &Projection, target: &Projection) -> Result<Proj4Transformer> {
        Proj4Transformer::new(source, target)
    }
}

/// Transformer between two EPSG projections using proj4rs (pure Rust).
pub struct Proj4Transformer {
    source: Projection,
    target: Projection,
    source_proj: Proj,
    target_proj: Proj,
    // proj4rs works in radians for geographic systems
    source_is_geographic: bool,
    target_is_geographic: bool,
}

impl Proj4Transformer {
    pub fn new(source: &Projection, target: &Projection) -> Result<Self> {
        let source_str = proj_string(source)?;
        let target_str = proj_string(target)?;

        let source_proj = Proj::from_proj_string(source_str).map_err(|e| FeatureError::Transform {
            source: source.to_string(),
            target: target.to_string(),
            message: format!("invalid source projection: {e:?}"),
        })?;
        let target_proj = Proj::from_proj_string(target_str).map_err(|e| FeatureError::Transform {
            source: source.to_string(),
            target: target.to_string(),
            message: format!("invalid target projection: {e:?}"),
        })?;

        Ok(Self {
            source: source.clone(),
            target: target.clone(),
            source_proj,
            target_proj,
            source_is_geographic: source_str.contains("+proj=longlat"),
            target_is_geographic: target_str.contains("+proj=longlat"),
        })
    }
}

impl CoordinateTransform for Proj4Transformer {
    fn transform(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
        let mut point = if self.source_is_geographic {
            (coord.x.to_radians(), coord.y.to_radians(), 0.0)
        } else {
            (coord.x, coord.y, 0.0)
        };

        proj4rs::transform::transform(&self.source_proj, &self.target_proj, &mut point).map_err(
            |e| FeatureError::Transform {
                source: self.source.to_string(),
                target: self.target.to_string(),
                message: format!("{e:?}"),
            },
        )?;

        Ok(if self.target_is_geographic {
            Coord {
                x: point.0.to_degrees(),
                y: point.1.to_degrees(),
            }
        } else {
            Coord {
                x: point.0,
                y: point.1,
            }
        })
    }
}

/// PROJ string for an EPSG projection from the crs-definitions database.
fn proj_string(projection: &Projection) -> Result<&'static str> {
    projection
        .epsg_code()
        .and_then(crs_definitions::from_code)
        .map(|def| def.proj4)
        .ok_or_else(|| FeatureError::UnsupportedProjection {
            code: projection.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::{CoordinateTransform, Proj4Service, Projection, ProjectionService};
    use crate::Result;
    use crate::error::FeatureError;
    use geo_types::coord;

    const EPS: f64 = 1e-6;

    #[test]
    fn parses_and_normalizes_codes() -> Result<()> {
        let projection: Projection = "epsg:3857".parse()?;
        assert_eq!(projection.code(), "EPSG:3857");
        assert_eq!(projection.authority(), "EPSG");
        assert_eq!(projection.epsg_code(), Some(3857));
        assert_eq!(projection, Projection::epsg(3857));

        let custom = Projection::from_code("IAU:30100")?;
        assert_eq!(custom.epsg_code(), None);

        assert!(matches!(
            Projection::from_code("4326"),
            Err(FeatureError::InvalidProjectionCode(_))
        ));
        assert!(matches!(
            Projection::from_code("EPSG:"),
            Err(FeatureError::InvalidProjectionCode(_))
        ));
        Ok(())
    }

    #[test]
    fn web_mercator_origin_and_back() -> Result<()> {
        let forward = Proj4Service.transformer(&Projection::epsg(4326), &Projection::epsg(3857))?;
        let origin = forward.transform(coord! { x: 0.0, y: 0.0 })?;
        assert!(origin.x.abs() < EPS);
        assert!(origin.y.abs() < EPS);

        // 180 degrees of longitude is half the Web Mercator world width
        let edge = forward.transform(coord! { x: 180.0, y: 0.0 })?;
        assert!((edge.x - 20_037_508.342_789_244).abs() < 1e-3);

        let inverse = Proj4Service.transformer(&Projection::epsg(3857), &Projection::epsg(4326))?;
        let back = inverse.transform(edge)?;
        assert!((back.x - 180.0).abs() < EPS);
        Ok(())
    }

    #[test]
    fn unknown_codes_are_unsupported() {
        let result = Proj4Service.transformer(
            &Projection::from_code("CUSTOM:1").expect("valid code"),
            &Projection::epsg(4326),
        );
        assert!(matches!(
            result,
            Err(FeatureError::UnsupportedProjection { code }) if code == "CUSTOM:1"
        ));
    }
}
