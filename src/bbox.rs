use crate::error::{AppError, Result};

/// A geographic bounding box in degrees.
///
/// Latitudes must lie in [-90, 90] and longitudes in [-360, 360]. The
/// extended longitude range lets callers describe boxes that cross the
/// antimeridian without wrapping, e.g. west=170, east=190. A box with
/// positive west and negative east is ambiguous and rejected outright
/// rather than wrapped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub north: f64,
    pub west: f64,
    pub south: f64,
    pub east: f64,
}

fn in_range(v: f64, start: f64, end: f64) -> bool {
    v >= start && v <= end
}

impl BoundingBox {
    pub fn new(north: f64, west: f64, south: f64, east: f64) -> Result<Self> {
        if south > north {
            return Err(AppError::Range(format!(
                "south cannot be greater than north: south = {}; north = {}",
                south, north
            )));
        }

        // Also rejects the ambiguous positive-west/negative-east submission.
        if west > east {
            return Err(AppError::Range(format!(
                "west cannot be greater than east: west = {}; east = {}",
                west, east
            )));
        }

        for (name, v, start, end) in [
            ("north", north, -90.0, 90.0),
            ("south", south, -90.0, 90.0),
            ("west", west, -360.0, 360.0),
            ("east", east, -360.0, 360.0),
        ] {
            if !in_range(v, start, end) {
                return Err(AppError::Range(format!(
                    "{} cannot be out of range {} - {} but is: {}",
                    name, start, end, v
                )));
            }
        }

        Ok(Self {
            north,
            west,
            south,
            east,
        })
    }

    /// Tests whether a point lies inside the box, handling the three
    /// longitude sign cases: both bounds negative, both non-negative, and
    /// a west-negative/east-positive box crossing the Greenwich meridian.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        if !in_range(lat, self.south, self.north) {
            return false;
        }

        let (w, e) = (self.west, self.east);

        if w < 0.0 && e < 0.0 {
            let lon = if lon > 0.0 { lon - 360.0 } else { lon };
            in_range(lon, w, e)
        } else if w >= 0.0 && e >= 0.0 {
            let lon = if lon < 0.0 { lon + 360.0 } else { lon };
            in_range(lon, w, e)
        } else {
            // Meridian-crossing box: test (w -> 0) and (0 -> e) separately.
            let lon_west = if lon >= 0.0 { lon - 360.0 } else { lon };
            let lon_east = if lon < 0.0 { lon + 360.0 } else { lon };
            in_range(lon_west, w, 0.0) || in_range(lon_east, 0.0, e)
        }
    }
}
