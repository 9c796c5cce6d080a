//! Small helpers shared by the `satstac` crates: bounding boxes, asset media
//! types, and filesystem path utilities.

use std::fmt::{Display, Formatter};

mod bbox;
pub use bbox::{Bbox, WORLD_BBOX};

mod paths;
pub use paths::{mkdirp, split_all};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum UtilsError {
    #[error("Bounding box must have exactly 4 values, but {0} were given")]
    BboxArity(usize),

    #[error("Bounding box {0} has min > max on the {1} axis")]
    BboxInverted(Bbox, &'static str),
}

pub type UtilsResult<T> = Result<T, UtilsError>;

/// Media type of a catalog asset, as declared in the asset's `type` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaType {
    GeoTiff,
    CloudOptimizedGeoTiff,
    Tiff,
    Jp2,
    Png,
    Jpeg,
    Gif,
    Webp,
    Json,
    GeoJson,
    Html,
    Text,
    Xml,
}

impl MediaType {
    /// Parse a MIME string. Parameters such as `; profile=cloud-optimized`
    /// are taken into account for `GeoTIFF`, and ignored otherwise.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        let mut parts = value.split(';').map(str::trim);
        let essence = parts.next()?;
        let params: Vec<&str> = parts.collect();
        let has = |p: &str| params.iter().any(|v| v.replace(' ', "") == p);

        Some(match essence {
            "image/x.geotiff" | "image/geotiff" | "image/vnd.stac.geotiff" => {
                if has("cloud-optimized=true") || has("profile=cloud-optimized") {
                    Self::CloudOptimizedGeoTiff
                } else {
                    Self::GeoTiff
                }
            }
            "image/tiff" if has("application=geotiff") => {
                if has("profile=cloud-optimized") {
                    Self::CloudOptimizedGeoTiff
                } else {
                    Self::GeoTiff
                }
            }
            "image/tiff" => Self::Tiff,
            "image/jp2" => Self::Jp2,
            "image/png" => Self::Png,
            "image/jpeg" | "image/jpg" => Self::Jpeg,
            "image/gif" => Self::Gif,
            "image/webp" => Self::Webp,
            "application/json" => Self::Json,
            "application/geo+json" => Self::GeoJson,
            "text/html" => Self::Html,
            "text/plain" => Self::Text,
            "application/xml" | "text/xml" => Self::Xml,
            _ => None?,
        })
    }

    /// True for georeferenced rasters that can carry spectral bands.
    #[must_use]
    pub fn is_raster_data(&self) -> bool {
        matches!(
            *self,
            Self::GeoTiff | Self::CloudOptimizedGeoTiff | Self::Jp2
        )
    }
}

impl Display for MediaType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match *self {
            Self::GeoTiff => "GeoTIFF",
            Self::CloudOptimizedGeoTiff => "COG",
            Self::Tiff => "TIFF",
            Self::Jp2 => "JPEG 2000",
            Self::Png => "PNG",
            Self::Jpeg => "JPEG",
            Self::Gif => "GIF",
            Self::Webp => "WebP",
            Self::Json => "JSON",
            Self::GeoJson => "GeoJSON",
            Self::Html => "HTML",
            Self::Text => "text",
            Self::Xml => "XML",
        })
    }
}
