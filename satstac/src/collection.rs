use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use satstac_utils::{Bbox, MediaType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::errors::{StacError, StacResult};

/// A STAC collection record.
///
/// Field order matches the order in which keys are written back to JSON.
/// Keys that the model does not know about are kept in `other` so that a
/// read/write cycle does not lose data.
#[serde_with::skip_serializing_none]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: String,
    pub title: Option<String>,
    pub description: String,
    pub keywords: Option<Vec<String>>,
    pub version: Option<String>,
    pub stac_version: String,
    pub extent: Extent,
    pub providers: Option<Vec<Provider>>,
    pub license: String,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub assets: BTreeMap<String, Asset>,
    pub links: Vec<crate::Link>,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

/// Spatial and temporal extent.
///
/// Both parts are kept in their raw wire form so that a malformed extent can
/// still be loaded and reported by validation instead of failing to parse.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub spatial: Vec<f64>,
    pub temporal: Vec<Option<String>>,
}

#[serde_with::skip_serializing_none]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub name: String,
    pub url: Option<String>,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

/// Collection-wide defaults shared by every item of the collection.
#[serde_with::skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Properties {
    pub collection: Option<String>,
    #[serde(rename = "eo:gsd")]
    pub gsd: Option<f64>,
    #[serde(rename = "eo:platform")]
    pub platform: Option<String>,
    #[serde(rename = "eo:instrument")]
    pub instrument: Option<String>,
    #[serde(rename = "eo:off_nadir")]
    pub off_nadir: Option<f64>,
    #[serde(rename = "eo:bands", default, skip_serializing_if = "Vec::is_empty")]
    pub bands: Vec<Band>,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

/// A spectral band. Assets refer to bands by their position in
/// `properties["eo:bands"]`, not by `id`.
#[serde_with::skip_serializing_none]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub id: String,
    pub common_name: Option<String>,
    pub gsd: Option<f64>,
    pub center_wavelength: Option<f64>,
    pub full_width_half_max: Option<f64>,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

#[serde_with::skip_serializing_none]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub href: Option<String>,
    #[serde(rename = "type")]
    pub media_type: Option<String>,
    pub title: Option<String>,
    #[serde(rename = "eo:bands")]
    pub bands: Option<Vec<usize>>,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

impl Asset {
    /// Parsed `type` value, if it is a known media type.
    #[must_use]
    pub fn media_type(&self) -> Option<MediaType> {
        self.media_type.as_deref().and_then(MediaType::parse)
    }
}

impl Display for Collection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.title {
            Some(title) => write!(f, "{} ({title})", self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

impl Collection {
    pub fn from_json(json: &str) -> StacResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> StacResult<Self> {
        let path = path.as_ref();
        debug!("Reading catalog record {}", path.display());
        let json =
            fs::read_to_string(path).map_err(|e| StacError::IoError(e, path.to_path_buf()))?;
        serde_json::from_str(&json).map_err(|e| StacError::JsonParseError(e, path.to_path_buf()))
    }

    pub fn to_json_pretty(&self) -> StacResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> StacResult<()> {
        let path = path.as_ref();
        debug!("Writing catalog record {} to {}", self.id, path.display());
        let json = self.to_json_pretty()?;
        fs::write(path, json).map_err(|e| StacError::IoError(e, PathBuf::from(path)))
    }

    #[must_use]
    pub fn band(&self, index: usize) -> Option<&Band> {
        self.properties.bands.get(index)
    }

    #[must_use]
    pub fn band_by_id(&self, id: &str) -> Option<(usize, &Band)> {
        self.properties
            .bands
            .iter()
            .enumerate()
            .find(|(_, b)| b.id == id)
    }

    /// Resolve the positional band references of an asset.
    ///
    /// Assets without `eo:bands` resolve to an empty list.
    pub fn asset_bands(&self, asset_key: &str) -> StacResult<Vec<&Band>> {
        let asset = self
            .assets
            .get(asset_key)
            .ok_or_else(|| StacError::AssetNotFound(asset_key.to_string()))?;
        asset
            .bands
            .iter()
            .flatten()
            .map(|&index| {
                self.band(index)
                    .ok_or_else(|| StacError::BandIndexOutOfRange {
                        asset: asset_key.to_string(),
                        index,
                        count: self.properties.bands.len(),
                    })
            })
            .collect()
    }

    pub fn bbox(&self) -> StacResult<Bbox> {
        Ok(Bbox::from_slice(&self.extent.spatial)?)
    }

    /// Start and end of the temporal extent, `None` meaning open-ended.
    pub fn temporal_range(&self) -> StacResult<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
        let mut values = self.extent.temporal.iter();
        let start = values.next().cloned().flatten();
        let end = values.next().cloned().flatten();
        Ok((
            start.as_deref().map(parse_datetime).transpose()?,
            end.as_deref().map(parse_datetime).transpose()?,
        ))
    }

    /// Look up any value with a dotted path such as `properties.eo:platform`
    /// or `properties.eo:bands.0.id`. Numeric segments index into arrays.
    pub fn get_value(&self, key: &str) -> StacResult<Value> {
        let root = serde_json::to_value(self)?;
        let mut current = &root;
        for segment in key.split('.').filter(|s| !s.is_empty()) {
            current = match current {
                Value::Object(map) => map.get(segment),
                Value::Array(arr) => segment.parse::<usize>().ok().and_then(|i| arr.get(i)),
                _ => None,
            }
            .ok_or_else(|| StacError::KeyNotFound(key.to_string()))?;
        }
        Ok(current.clone())
    }
}

/// Parse an ISO-8601 date (`2013-06-01`) or RFC 3339 date-time.
/// Dates are interpreted as midnight UTC.
pub fn parse_datetime(value: &str) -> StacResult<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| StacError::InvalidDate(value.to_string()))
}
