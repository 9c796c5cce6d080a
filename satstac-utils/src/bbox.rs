//! Geographic bounding boxes in WGS84 degrees.
//!
//! A [`Bbox`] is the `extent.spatial` value of a catalog record, stored as
//! `[min_lon, min_lat, max_lon, max_lat]` on the wire.

use std::fmt::{Display, Formatter};

use serde::{Serialize, Serializer};

use crate::{UtilsError, UtilsResult};

/// The whole world, `-180,-90,180,90`.
pub const WORLD_BBOX: Bbox = Bbox {
    min_lon: -180.0,
    min_lat: -90.0,
    max_lon: 180.0,
    max_lat: 90.0,
};

/// A rectangle in longitude/latitude space.
///
/// The rectangle is inclusive of its edges.
///
/// # Examples
///
/// ```
/// # use satstac_utils::Bbox;
/// let bbox = Bbox::from_slice(&[-10.0, -5.0, 10.0, 5.0]).unwrap();
/// assert!(bbox.is_wgs84());
/// assert_eq!(bbox.to_string(), "-10,-5,10,5");
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bbox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl Bbox {
    /// Creates a bounding box, checking that `min <= max` on both axes.
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> UtilsResult<Self> {
        let bbox = Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        };
        if min_lon > max_lon {
            return Err(UtilsError::BboxInverted(bbox, "longitude"));
        }
        if min_lat > max_lat {
            return Err(UtilsError::BboxInverted(bbox, "latitude"));
        }
        Ok(bbox)
    }

    /// Builds a bounding box from the 4-value wire representation.
    pub fn from_slice(values: &[f64]) -> UtilsResult<Self> {
        match *values {
            [min_lon, min_lat, max_lon, max_lat] => Self::new(min_lon, min_lat, max_lon, max_lat),
            _ => Err(UtilsError::BboxArity(values.len())),
        }
    }

    #[must_use]
    pub fn to_array(&self) -> [f64; 4] {
        [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
    }

    /// True if every corner is a valid WGS84 coordinate.
    #[must_use]
    pub fn is_wgs84(&self) -> bool {
        let lon = -180.0..=180.0;
        let lat = -90.0..=90.0;
        lon.contains(&self.min_lon)
            && lon.contains(&self.max_lon)
            && lat.contains(&self.min_lat)
            && lat.contains(&self.max_lat)
    }
}

impl Display for Bbox {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(prec) = f.precision() {
            write!(
                f,
                "{:.prec$},{:.prec$},{:.prec$},{:.prec$}",
                self.min_lon, self.min_lat, self.max_lon, self.max_lat
            )
        } else {
            write!(
                f,
                "{},{},{},{}",
                self.min_lon, self.min_lat, self.max_lon, self.max_lat
            )
        }
    }
}

impl Serialize for Bbox {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_array().serialize(serializer)
    }
}
