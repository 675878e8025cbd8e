use crate::error::{FeatureError, Result};

// Magic, version, flags and srs_id.
const HEADER_LEN: usize = 8;

/// Strip the GeoPackage header and envelope, returning the WKB payload.
// cf. https://www.geopackage.org/spec140/index.html#gpb_format
pub(crate) fn gpkg_geometry_to_wkb(b: &[u8]) -> Result<&[u8]> {
    if b.len() < HEADER_LEN {
        return Err(FeatureError::InvalidGpkgGeometryLength {
            len: b.len(),
            minimum: HEADER_LEN,
        });
    }
    if &b[0..2] != b"GP" {
        return Err(FeatureError::Message(
            "geometry blob does not start with the GeoPackage magic".to_string(),
        ));
    }

    let flags = b[3];
    let envelope_size: usize = match flags & 0b00001110 {
        0b00000000 => 0,  // no envelope
        0b00000010 => 32, // envelope is [minx, maxx, miny, maxy], 32 bytes
        0b00000100 => 48, // envelope is [minx, maxx, miny, maxy, minz, maxz], 48 bytes
        0b00000110 => 48, // envelope is [minx, maxx, miny, maxy, minm, maxm], 48 bytes
        0b00001000 => 64, // envelope is [minx, maxx, miny, maxy, minz, maxz, minm, maxm], 64 bytes
        _ => {
            return Err(FeatureError::InvalidGpkgGeometryFlags(flags));
        }
    };
    let offset = HEADER_LEN + envelope_size;
    if b.len() < offset {
        return Err(FeatureError::InvalidGpkgGeometryLength {
            len: b.len(),
            minimum: offset,
        });
    }

    Ok(&b[offset..])
}

/// Prefix WKB with a GeoPackage header carrying `srs_id` and no envelope.
// cf. https://www.geopackage.org/spec140/index.html#gpb_format
pub(crate) fn wkb_to_gpkg_geometry(wkb: &[u8], srs_id: i32) -> Vec<u8> {
    let mut geom = Vec::with_capacity(wkb.len() + HEADER_LEN);
    geom.extend_from_slice(&[
        0x47u8, // magic
        0x50u8, // magic
        0x00u8, // version
        0x01u8, // flags (little endian SRS ID, no envelope)
    ]);
    geom.extend_from_slice(&srs_id.to_le_bytes());
    geom.extend_from_slice(wkb);
    geom
}
