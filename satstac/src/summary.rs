use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use satstac_utils::Bbox;
use serde::Serialize;

use crate::Collection;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BandInfo {
    pub index: usize,
    pub id: String,
    pub common_name: Option<String>,
    pub gsd: Option<f64>,
    pub center_wavelength: Option<f64>,
    pub full_width_half_max: Option<f64>,
    /// Keys of the assets that reference this band
    pub assets: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Summary {
    pub id: String,
    pub title: Option<String>,
    pub stac_version: String,
    pub platform: Option<String>,
    pub instrument: Option<String>,
    pub gsd: Option<f64>,
    pub bbox: Option<Bbox>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub provider_count: usize,
    pub link_count: usize,
    pub child_count: usize,
    pub asset_count: usize,
    /// Number of assets per declared media type
    pub media_types: BTreeMap<String, usize>,
    pub bands: Vec<BandInfo>,
}

impl Display for Summary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.title {
            Some(title) => writeln!(f, "Collection: {} ({title})", self.id)?,
            None => writeln!(f, "Collection: {}", self.id)?,
        }
        writeln!(f, "STAC version: {}", self.stac_version)?;
        let unknown = "unknown".to_string();
        writeln!(
            f,
            "Platform: {} / {}",
            self.platform.as_ref().unwrap_or(&unknown),
            self.instrument.as_ref().unwrap_or(&unknown)
        )?;
        if let Some(gsd) = self.gsd {
            writeln!(f, "GSD: {gsd}m")?;
        }
        match &self.bbox {
            Some(bbox) => writeln!(f, "Spatial extent: {bbox}")?,
            None => writeln!(f, "Spatial extent: invalid")?,
        }
        writeln!(
            f,
            "Temporal extent: {} .. {}",
            self.start.as_deref().unwrap_or("open"),
            self.end.as_deref().unwrap_or("open")
        )?;
        writeln!(
            f,
            "Providers: {}, Links: {} ({} children), Assets: {}",
            self.provider_count, self.link_count, self.child_count, self.asset_count
        )?;
        for (media_type, count) in &self.media_types {
            writeln!(f, "  {count:>3} x {media_type}")?;
        }

        if !self.bands.is_empty() {
            writeln!(f)?;
            writeln!(
                f,
                "|{:^7}|{:^7}|{:^10}|{:^7}|{:^8}|{:^8}| {:<12} |",
                "Index", "Band", "Common", "GSD", "Center", "FWHM", "Assets"
            )?;
            let opt = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| v.to_string());
            for b in &self.bands {
                writeln!(
                    f,
                    "|{:>7}|{:>7}|{:>10}|{:>7}|{:>8}|{:>8}| {:<12} |",
                    b.index,
                    b.id,
                    b.common_name.as_deref().unwrap_or("-"),
                    opt(b.gsd),
                    opt(b.center_wavelength),
                    opt(b.full_width_half_max),
                    b.assets.join(","),
                )?;
            }
        }

        Ok(())
    }
}

impl Collection {
    /// Compute collection summary statistics
    #[must_use]
    pub fn summary(&self) -> Summary {
        let mut media_types = BTreeMap::new();
        for asset in self.assets.values() {
            let key = asset.media_type.clone().unwrap_or_else(|| "none".to_string());
            *media_types.entry(key).or_insert(0) += 1;
        }

        let bands = self
            .properties
            .bands
            .iter()
            .enumerate()
            .map(|(index, band)| BandInfo {
                index,
                id: band.id.clone(),
                common_name: band.common_name.clone(),
                gsd: band.gsd,
                center_wavelength: band.center_wavelength,
                full_width_half_max: band.full_width_half_max,
                assets: self
                    .assets
                    .iter()
                    .filter(|(_, a)| a.bands.as_ref().is_some_and(|b| b.contains(&index)))
                    .map(|(k, _)| k.clone())
                    .collect(),
            })
            .collect();

        let mut temporal = self.extent.temporal.iter().cloned();
        Summary {
            id: self.id.clone(),
            title: self.title.clone(),
            stac_version: self.stac_version.clone(),
            platform: self.properties.platform.clone(),
            instrument: self.properties.instrument.clone(),
            gsd: self.properties.gsd,
            bbox: self.bbox().ok(),
            start: temporal.next().flatten(),
            end: temporal.next().flatten(),
            provider_count: self.providers.as_ref().map_or(0, Vec::len),
            link_count: self.links.len(),
            child_count: self.child_hrefs().len(),
            asset_count: self.assets.len(),
            media_types,
            bands,
        }
    }
}
