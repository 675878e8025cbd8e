use std::borrow::Cow;
use std::sync::Arc;

use geo::{BoundingRect, Intersects, MapCoords, Relate};
use geo_traits::to_geo::ToGeoGeometry;
use geo_types::{LineString, Rect};
use wkb::reader::Wkb;

use crate::error::{FeatureError, Result};
use crate::projection::{CoordinateTransform, Proj4Service, Projection, ProjectionService};
use crate::types::GeometryKind;

/// An immutable shape with an optional projection.
///
/// Coordinates never change after construction. Declaring a projection,
/// reprojecting or preparing all return a new `Geometry`; clones share the
/// underlying coordinates.
#[derive(Clone, Debug)]
pub struct Geometry {
    shape: Arc<geo_types::Geometry<f64>>,
    projection: Option<Projection>,
    prepared: Option<Prepared>,
}

// Read-optimized state. `None` envelope means the shape is empty.
#[derive(Clone, Debug)]
struct Prepared {
    envelope: Option<Rect<f64>>,
}

impl Geometry {
    pub fn new<G: Into<geo_types::Geometry<f64>>>(shape: G) -> Self {
        Self {
            shape: Arc::new(shape.into()),
            projection: None,
            prepared: None,
        }
    }

    pub fn shape(&self) -> &geo_types::Geometry<f64> {
        &self.shape
    }

    pub fn kind(&self) -> GeometryKind {
        GeometryKind::of(&self.shape)
    }

    pub fn projection(&self) -> Option<&Projection> {
        self.projection.as_ref()
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared.is_some()
    }

    /// Declare the coordinates as already being in `projection`. No numeric transform happens.
    pub fn in_projection(&self, projection: Projection) -> Self {
        Self {
            shape: Arc::clone(&self.shape),
            projection: Some(projection),
            prepared: self.prepared.clone(),
        }
    }

    /// Reproject into `target` with the default proj4rs-backed service.
    pub fn transform(&self, target: &Projection) -> Result<Self> {
        self.transform_with(target, &Proj4Service)
    }

    /// Reproject into `target` using `service`.
    ///
    /// Fails with `MissingProjection` if no source projection is declared. A
    /// prepared geometry stays prepared.
    pub fn transform_with<S: ProjectionService>(
        &self,
        target: &Projection,
        service: &S,
    ) -> Result<Self> {
        let source = self
            .projection
            .as_ref()
            .ok_or(FeatureError::MissingProjection)?;
        if source == target {
            return Ok(self.clone());
        }

        let transformer = service.transformer(source, target)?;
        let shape = self
            .shape
            .try_map_coords(|coord| transformer.transform(coord))?;

        let transformed = Self {
            shape: Arc::new(shape),
            projection: Some(target.clone()),
            prepared: None,
        };
        Ok(if self.is_prepared() {
            transformed.prepare()
        } else {
            transformed
        })
    }

    /// Variant optimized for repeated `contains`/`intersects` queries. Idempotent.
    pub fn prepare(&self) -> Self {
        if self.is_prepared() {
            return self.clone();
        }
        Self {
            shape: Arc::clone(&self.shape),
            projection: self.projection.clone(),
            prepared: Some(Prepared {
                envelope: self.shape.bounding_rect(),
            }),
        }
    }

    /// Bounding rectangle, `None` for empty shapes.
    pub fn envelope(&self) -> Option<Rect<f64>> {
        match &self.prepared {
            Some(prepared) => prepared.envelope,
            None => self.shape.bounding_rect(),
        }
    }

    /// Whether `other` lies inside this geometry. Projections are not reconciled.
    pub fn contains(&self, other: &Geometry) -> bool {
        if let Some(prepared) = &self.prepared {
            match (prepared.envelope, other.envelope()) {
                (Some(outer), Some(inner)) if !rect_covers(&outer, &inner) => return false,
                (None, _) => return false,
                _ => {}
            }
        }
        self.shape.relate(other.shape()).is_contains()
    }

    /// Whether the two geometries share any point. Projections are not reconciled.
    pub fn intersects(&self, other: &Geometry) -> bool {
        if let Some(prepared) = &self.prepared {
            match (prepared.envelope, other.envelope()) {
                (Some(a), Some(b)) if !a.intersects(&b) => return false,
                (None, _) | (_, None) => return false,
                _ => {}
            }
        }
        self.shape.intersects(other.shape())
    }

    /// Encode the shape as WKB. The projection is not part of the encoding.
    pub fn to_wkb(&self) -> Result<Vec<u8>> {
        let shape = wkb_compatible(&self.shape);
        let mut buf = Vec::new();
        wkb::writer::write_geometry(&mut buf, shape.as_ref(), &Default::default())?;
        Ok(buf)
    }

    /// Decode WKB into a geometry without a projection.
    pub fn from_wkb(bytes: &[u8]) -> Result<Self> {
        let wkb = Wkb::try_new(bytes)?;
        let shape = wkb
            .try_to_geometry()
            .ok_or(FeatureError::UnrepresentableGeometry)?;
        Ok(Self::new(shape))
    }

    #[cfg(feature = "wkt")]
    pub fn from_wkt(text: &str) -> Result<Self> {
        use wkt::TryFromWkt;

        let shape = geo_types::Geometry::<f64>::try_from_wkt_str(text)
            .map_err(|err| FeatureError::Wkt(err.to_string()))?;
        Ok(Self::new(shape))
    }

    #[cfg(feature = "wkt")]
    pub fn to_wkt(&self) -> String {
        use wkt::ToWkt;

        self.shape.wkt_string()
    }
}

/// Equality compares coordinates and projection; preparation is not observable.
impl PartialEq for Geometry {
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape && self.projection == other.projection
    }
}

fn rect_covers(outer: &Rect<f64>, inner: &Rect<f64>) -> bool {
    outer.min().x <= inner.min().x
        && outer.min().y <= inner.min().y
        && outer.max().x >= inner.max().x
        && outer.max().y >= inner.max().y
}

// WKB has no Line, Rect or Triangle; write them as their general forms.
fn wkb_compatible(shape: &geo_types::Geometry<f64>) -> Cow<'_, geo_types::Geometry<f64>> {
    match shape {
        geo_types::Geometry::Line(line) => Cow::Owned(LineString::from(vec![line.start, line.end]).into()),
        geo_types::Geometry::Rect(rect) => Cow::Owned(rect.to_polygon().into()),
        geo_types::Geometry::Triangle(triangle) => Cow::Owned(triangle.to_polygon().into()),
        other => Cow::Borrowed(other),
    }
}

#[cfg(test)]
mod tests {
    use super::Geometry;
    use crate::Result;
    use crate::error::FeatureError;
    use crate::projection::{CoordinateTransform, Projection, ProjectionService};
    use geo_types::{Coord, LineString, Point, Polygon, Rect, coord};

    fn square(min: f64, max: f64) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![(min, min), (max, min), (max, max), (min, max), (min, min)]),
            vec![],
        )
    }

    // Shifts x by a fixed offset; the inverse direction shifts back.
    struct Shift;

    struct ShiftBy(f64);

    impl CoordinateTransform for ShiftBy {
        fn transform(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
            Ok(coord! { x: coord.x + self.0, y: coord.y })
        }
    }

    impl ProjectionService for Shift {
        type Transformer = ShiftBy;

        fn transformer(&self, source: &Projection, _target: &Projection) -> Result<ShiftBy> {
            Ok(if source.code() == "TEST:1" {
                ShiftBy(10.0)
            } else {
                ShiftBy(-10.0)
            })
        }
    }

    #[test]
    fn declaring_projection_is_idempotent_and_non_transforming() {
        let geometry = Geometry::new(Point::new(1.0, 2.0));
        let declared = geometry.in_projection(Projection::epsg(4326));
        let twice = declared.in_projection(Projection::epsg(4326));

        assert_eq!(declared, twice);
        assert_eq!(declared.shape(), geometry.shape());
        assert_eq!(declared.projection(), Some(&Projection::epsg(4326)));
        assert_eq!(geometry.projection(), None);
    }

    #[test]
    fn transform_requires_source_projection() {
        let geometry = Geometry::new(Point::new(1.0, 2.0));
        let result = geometry.transform(&Projection::epsg(3857));
        assert!(matches!(result, Err(FeatureError::MissingProjection)));
    }

    #[test]
    fn transform_round_trip_recovers_coordinates() -> Result<()> {
        let wgs84 = Projection::epsg(4326);
        let mercator = Projection::epsg(3857);
        let original = Geometry::new(Point::new(-122.42, 37.78)).in_projection(wgs84.clone());

        let projected = original.transform(&mercator)?;
        assert_eq!(projected.projection(), Some(&mercator));
        let geo_types::Geometry::Point(p) = projected.shape() else {
            panic!("expected point");
        };
        assert!((p.x() - -13_627_804.0).abs() < 1_000.0);

        let back = projected.transform(&wgs84)?;
        let geo_types::Geometry::Point(q) = back.shape() else {
            panic!("expected point");
        };
        assert!(((q.x() - -122.42) / 122.42).abs() < 1e-6);
        assert!(((q.y() - 37.78) / 37.78).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn transform_with_custom_service_keeps_receiver_untouched() -> Result<()> {
        let source = Projection::from_code("TEST:1")?;
        let target = Projection::from_code("TEST:2")?;
        let original = Geometry::new(Point::new(1.0, 2.0)).in_projection(source.clone());

        let shifted = original.transform_with(&target, &Shift)?;
        assert_eq!(shifted.shape(), &geo_types::Geometry::Point(Point::new(11.0, 2.0)));
        assert_eq!(original.shape(), &geo_types::Geometry::Point(Point::new(1.0, 2.0)));

        let back = shifted.transform_with(&source, &Shift)?;
        assert_eq!(back, original);
        Ok(())
    }

    #[test]
    fn transform_to_same_projection_is_identity() -> Result<()> {
        let geometry = Geometry::new(Point::new(5.0, 6.0)).in_projection(Projection::epsg(4326));
        assert_eq!(geometry.transform(&Projection::epsg(4326))?, geometry);
        Ok(())
    }

    #[test]
    fn prepare_is_idempotent_and_keeps_predicates() {
        let polygon = Geometry::new(square(0.0, 10.0));
        let prepared = polygon.prepare();
        assert!(prepared.is_prepared());
        assert!(!polygon.is_prepared());
        assert_eq!(prepared.prepare(), prepared);
        assert_eq!(prepared, polygon);

        let inside = Geometry::new(Point::new(5.0, 5.0));
        let outside = Geometry::new(Point::new(50.0, 5.0));
        let straddling = Geometry::new(square(5.0, 15.0));

        for candidate in [&polygon, &prepared] {
            assert!(candidate.contains(&inside));
            assert!(!candidate.contains(&outside));
            assert!(!candidate.contains(&straddling));
            assert!(candidate.intersects(&straddling));
            assert!(!candidate.intersects(&outside));
        }
    }

    #[test]
    fn envelope_is_cached_on_prepare() {
        let polygon = Geometry::new(square(-1.0, 3.0)).prepare();
        let envelope = polygon.envelope().expect("non-empty");
        assert_eq!(envelope.min(), coord! { x: -1.0, y: -1.0 });
        assert_eq!(envelope.max(), coord! { x: 3.0, y: 3.0 });
    }

    #[test]
    fn wkb_round_trip_writes_rect_as_polygon() -> Result<()> {
        let rect = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 2.0, y: 1.0 });
        let decoded = Geometry::from_wkb(&Geometry::new(rect).to_wkb()?)?;
        assert_eq!(decoded.shape(), &geo_types::Geometry::Polygon(rect.to_polygon()));
        Ok(())
    }

    #[test]
    fn predicates_on_wkt_fixtures() -> Result<()> {
        use wkt::TryFromWkt;

        let parse = |text: &str| -> Result<Geometry> {
            geo_types::Geometry::<f64>::try_from_wkt_str(text)
                .map(Geometry::new)
                .map_err(|err| FeatureError::Message(err.to_string()))
        };
        let area = parse("POLYGON((0 0,10 0,10 10,0 10,0 0))")?.prepare();
        let crossing = parse("LINESTRING(-5 5,15 5)")?;
        let far = parse("LINESTRING(20 20,30 30)")?;
        let inner = parse("MULTIPOINT((1 1),(9 9))")?;

        assert!(area.intersects(&crossing));
        assert!(!area.contains(&crossing));
        assert!(!area.intersects(&far));
        assert!(area.contains(&inner));
        Ok(())
    }

    #[cfg(feature = "wkt")]
    #[test]
    fn wkt_round_trip() -> Result<()> {
        let geometry = Geometry::from_wkt("POINT(1 2)")?;
        assert_eq!(geometry, Geometry::new(Point::new(1.0, 2.0)));
        assert_eq!(Geometry::from_wkt(&geometry.to_wkt())?, geometry);
        assert!(matches!(
            Geometry::from_wkt("POINT(1"),
            Err(FeatureError::Wkt(_))
        ));
        Ok(())
    }

    #[test]
    fn from_wkb_rejects_garbage() {
        assert!(matches!(
            Geometry::from_wkb(&[0x01, 0x02]),
            Err(FeatureError::Wkb(_))
        ));
    }
}
