use std::collections::HashSet;
use std::fmt::{Display, Formatter};

#[cfg(feature = "cli")]
use clap::ValueEnum;
use enum_display::EnumDisplay;
use satstac_utils::Bbox;
use semver::{Version, VersionReq};
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::errors::{StacError, StacResult};
use crate::links::{Rel, resolve_href};
use crate::{Collection, parse_datetime};

/// Range of `stac_version` values the model is known to read correctly.
pub const SUPPORTED_STAC_VERSIONS: &str = ">=0.6.0, <2.0.0";

#[derive(PartialEq, Eq, Default, Debug, Clone, Copy, EnumDisplay)]
#[enum_display(case = "Kebab")]
#[cfg_attr(feature = "cli", derive(ValueEnum))]
pub enum ValidationLevel {
    /// Structural checks: version, extent, links and band references
    #[default]
    Quick,
    /// Everything in `quick`, plus identifiers, link topology and asset metadata
    Full,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, EnumDisplay)]
#[enum_display(case = "Kebab")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    /// Dotted location of the offending value, e.g. `assets.B1.eo:bands`
    pub path: String,
    pub message: String,
}

impl Display for ValidationIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}: {}", self.severity, self.path, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub id: String,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            issues: Vec::new(),
        }
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.push(Severity::Error, path.into(), message.into());
    }

    fn warning(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.push(Severity::Warning, path.into(), message.into());
    }

    fn push(&mut self, severity: Severity, path: String, message: String) {
        debug!("{}: {severity} at {path}: {message}", self.id);
        self.issues.push(ValidationIssue {
            severity,
            path,
            message,
        });
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors().next().is_none()
    }

    /// Turn errors into [`StacError::FailedValidation`], keeping warnings in the report.
    pub fn into_result(self) -> StacResult<Self> {
        if self.is_valid() {
            Ok(self)
        } else {
            let errors = self.errors().cloned().collect();
            Err(StacError::FailedValidation(self.id, errors))
        }
    }
}

impl Collection {
    /// Check the record against the structural rules of a collection.
    pub fn validate(&self, level: ValidationLevel) -> ValidationReport {
        let mut report = ValidationReport::new(&self.id);
        if level == ValidationLevel::Off {
            debug!("Skipping validation of {}", self.id);
            return report;
        }

        self.check_stac_version(&mut report);
        self.check_spatial_extent(&mut report);
        self.check_temporal_extent(&mut report);
        self.check_links(&mut report);
        self.check_band_references(&mut report);

        if level == ValidationLevel::Full {
            self.check_id(&mut report);
            self.check_band_ids(&mut report);
            self.check_link_topology(&mut report);
            self.check_assets(&mut report);
            self.check_providers(&mut report);
        }

        let errors = report.errors().count();
        let warnings = report.warnings().count();
        if errors == 0 {
            info!("{self} passed {level} validation with {warnings} warning(s)");
        } else {
            warn!("{self} failed {level} validation: {errors} error(s), {warnings} warning(s)");
        }
        report
    }

    pub fn validate_strict(&self, level: ValidationLevel) -> StacResult<ValidationReport> {
        self.validate(level).into_result()
    }

    fn check_stac_version(&self, report: &mut ValidationReport) {
        let Ok(version) = Version::parse(&self.stac_version) else {
            report.error(
                "stac_version",
                format!("`{}` is not a semantic version", self.stac_version),
            );
            return;
        };
        if let Ok(req) = VersionReq::parse(SUPPORTED_STAC_VERSIONS) {
            if !req.matches(&version) {
                report.warning(
                    "stac_version",
                    format!("version {version} is outside of the supported range {req}"),
                );
            }
        }
    }

    fn check_spatial_extent(&self, report: &mut ValidationReport) {
        match Bbox::from_slice(&self.extent.spatial) {
            Ok(bbox) if !bbox.is_wgs84() => {
                report.error(
                    "extent.spatial",
                    format!("{bbox} is outside of WGS84 longitude/latitude ranges"),
                );
            }
            Ok(_) => {}
            Err(e) => report.error("extent.spatial", e.to_string()),
        }
    }

    fn check_temporal_extent(&self, report: &mut ValidationReport) {
        let temporal = &self.extent.temporal;
        if temporal.len() != 2 {
            report.error(
                "extent.temporal",
                format!(
                    "temporal extent must have exactly 2 values, but {} were given",
                    temporal.len()
                ),
            );
            return;
        }
        let mut parsed = [None, None];
        for (idx, value) in temporal.iter().enumerate() {
            if let Some(value) = value {
                match parse_datetime(value) {
                    Ok(dt) => parsed[idx] = Some(dt),
                    Err(e) => report.error(format!("extent.temporal.{idx}"), e.to_string()),
                }
            }
        }
        if let [Some(start), Some(end)] = parsed {
            if start > end {
                report.error(
                    "extent.temporal",
                    format!("start {start} is after end {end}"),
                );
            }
        }
    }

    fn check_links(&self, report: &mut ValidationReport) {
        let count = |rel: &Rel| self.links_by_rel(rel).count();
        match count(&Rel::SelfLink) {
            1 => {}
            n => report.error(
                "links",
                format!("expected exactly one `self` link, found {n}"),
            ),
        }
        for rel in [Rel::Root, Rel::Parent] {
            let n = count(&rel);
            if n > 1 {
                report.error("links", format!("expected at most one `{rel}` link, found {n}"));
            }
        }
        for (idx, link) in self.links.iter().enumerate() {
            if link.href.trim().is_empty() {
                report.error(format!("links.{idx}.href"), "href must not be empty");
            }
        }
    }

    fn check_band_references(&self, report: &mut ValidationReport) {
        let count = self.properties.bands.len();
        for (key, asset) in &self.assets {
            for (pos, &index) in asset.bands.iter().flatten().enumerate() {
                if index >= count {
                    report.error(
                        format!("assets.{key}.eo:bands.{pos}"),
                        format!("band index {index} is out of range, {count} bands are defined"),
                    );
                }
            }
        }
    }

    fn check_id(&self, report: &mut ValidationReport) {
        let is_uri_safe = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~');
        if self.id.is_empty() {
            report.error("id", "id must not be empty");
        } else if !self.id.chars().all(is_uri_safe) {
            report.error("id", format!("`{}` contains characters that are not URI-safe", self.id));
        }
        if let Some(collection) = &self.properties.collection {
            if collection != &self.id {
                report.warning(
                    "properties.collection",
                    format!("`{collection}` differs from the record id `{}`", self.id),
                );
            }
        }
    }

    fn check_band_ids(&self, report: &mut ValidationReport) {
        let mut seen = HashSet::new();
        for (idx, band) in self.properties.bands.iter().enumerate() {
            if !seen.insert(band.id.as_str()) {
                report.warning(
                    format!("properties.eo:bands.{idx}.id"),
                    format!("band id `{}` is used more than once", band.id),
                );
            }
        }
    }

    fn check_link_topology(&self, report: &mut ValidationReport) {
        if self.is_root() && self.parent_href().is_some() {
            report.error(
                "links",
                "`root` and `self` point to the same document, but a `parent` link exists",
            );
        }
        if self.root_href().is_none() {
            report.warning("links", "no `root` link found");
        }
        if let (Some(slf), Some(parent)) = (self.self_href(), self.parent_href()) {
            if resolve_href(slf, slf) == resolve_href(slf, parent) {
                report.error("links", "`parent` link points to the record itself");
            }
        }
    }

    fn check_assets(&self, report: &mut ValidationReport) {
        for (key, asset) in &self.assets {
            let path = format!("assets.{key}");
            match (&asset.media_type, asset.media_type()) {
                (None, _) => report.warning(format!("{path}.type"), "asset has no media type"),
                (Some(t), None) => {
                    report.warning(format!("{path}.type"), format!("unknown media type `{t}`"));
                }
                (Some(_), Some(mt)) => {
                    if asset.bands.is_some() && !mt.is_raster_data() {
                        report.warning(
                            format!("{path}.type"),
                            format!("asset references bands, but its media type is {mt}"),
                        );
                    }
                }
            }
            self.check_asset_title(key, report);
        }
    }

    /// Titles such as `Band 1 (coastal)` name the band's common name. Since
    /// references are positional, a reordered band list shows up as a mismatch.
    fn check_asset_title(&self, key: &str, report: &mut ValidationReport) {
        let Some(asset) = self.assets.get(key) else {
            return;
        };
        let (Some(title), Some([index])) = (&asset.title, asset.bands.as_deref()) else {
            return;
        };
        let Some(named) = title
            .rsplit_once('(')
            .and_then(|(_, rest)| rest.strip_suffix(')'))
        else {
            return;
        };
        if let Some(common) = self.band(*index).and_then(|b| b.common_name.as_deref()) {
            if !named.eq_ignore_ascii_case(common) {
                report.warning(
                    format!("assets.{key}.title"),
                    format!("title names `{named}`, but band {index} is `{common}`"),
                );
            }
        }
    }

    fn check_providers(&self, report: &mut ValidationReport) {
        for (idx, provider) in self.providers.iter().flatten().enumerate() {
            if let Some(url) = &provider.url {
                if Url::parse(url).is_err() {
                    report.warning(
                        format!("providers.{idx}.url"),
                        format!("`{url}` is not a valid URL"),
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::Link;
    use crate::collection::tests::landsat;

    fn messages(report: &ValidationReport) -> Vec<String> {
        report.issues.iter().map(ToString::to_string).collect()
    }

    #[rstest]
    #[case(ValidationLevel::Quick)]
    #[case(ValidationLevel::Full)]
    #[case(ValidationLevel::Off)]
    fn landsat_is_valid(#[case] level: ValidationLevel) {
        let report = landsat().validate(level);
        assert_eq!(messages(&report), Vec::<String>::new());
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn band_index_out_of_bounds() {
        let mut col = landsat();
        col.assets.get_mut("B11").unwrap().bands = Some(vec![10, 11]);
        let report = col.validate(ValidationLevel::Quick);
        assert_eq!(
            messages(&report),
            vec!["error at assets.B11.eo:bands.1: band index 11 is out of range, 11 bands are defined"]
        );
        let err = report.into_result().unwrap_err();
        assert!(matches!(err, StacError::FailedValidation(id, issues) if id == "landsat-8-l1" && issues.len() == 1));
    }

    #[rstest]
    #[case(vec![0.0, 0.0, 1.0], "error at extent.spatial: Bounding box must have exactly 4 values, but 3 were given")]
    #[case(vec![10.0, 0.0, -10.0, 1.0], "error at extent.spatial: Bounding box 10,0,-10,1 has min > max on the longitude axis")]
    #[case(vec![0.0, 10.0, 1.0, -10.0], "error at extent.spatial: Bounding box 0,10,1,-10 has min > max on the latitude axis")]
    #[case(vec![-200.0, 0.0, 0.0, 1.0], "error at extent.spatial: -200,0,0,1 is outside of WGS84 longitude/latitude ranges")]
    fn bad_spatial_extent(#[case] spatial: Vec<f64>, #[case] expected: &str) {
        let mut col = landsat();
        col.extent.spatial = spatial;
        assert_eq!(messages(&col.validate(ValidationLevel::Quick)), vec![expected]);
    }

    #[rstest]
    #[case(vec![None], "error at extent.temporal: temporal extent must have exactly 2 values, but 1 were given")]
    #[case(vec![Some("2020-01-01".to_string()), Some("2019-01-01".to_string())], "error at extent.temporal: start 2020-01-01 00:00:00 UTC is after end 2019-01-01 00:00:00 UTC")]
    #[case(vec![Some("June 2013".to_string()), None], "error at extent.temporal.0: Value `June 2013` is neither an ISO-8601 date nor a date-time")]
    fn bad_temporal_extent(#[case] temporal: Vec<Option<String>>, #[case] expected: &str) {
        let mut col = landsat();
        col.extent.temporal = temporal;
        assert_eq!(messages(&col.validate(ValidationLevel::Quick)), vec![expected]);
    }

    #[test]
    fn open_ended_temporal_extent() {
        let mut col = landsat();
        col.extent.temporal = vec![None, None];
        assert!(col.validate(ValidationLevel::Full).is_valid());
    }

    #[test]
    fn self_link_count() {
        let mut col = landsat();
        col.links.retain(|l| l.rel != Rel::SelfLink);
        assert_eq!(
            messages(&col.validate(ValidationLevel::Quick)),
            vec!["error at links: expected exactly one `self` link, found 0"]
        );

        let mut col = landsat();
        col.links.push(Link::new(Rel::SelfLink, "./other.json"));
        col.links.push(Link::new(Rel::Root, "../../catalog.json"));
        assert_eq!(
            messages(&col.validate(ValidationLevel::Quick)),
            vec![
                "error at links: expected exactly one `self` link, found 2",
                "error at links: expected at most one `root` link, found 2",
            ]
        );
    }

    #[rstest]
    #[case("not-semver", Severity::Error)]
    #[case("0.5.2", Severity::Warning)]
    #[case("2.0.0", Severity::Warning)]
    fn stac_version(#[case] version: &str, #[case] severity: Severity) {
        let mut col = landsat();
        col.stac_version = version.to_string();
        let report = col.validate(ValidationLevel::Quick);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].severity, severity);
        assert_eq!(report.issues[0].path, "stac_version");
    }

    #[test]
    fn root_is_self_with_parent() {
        let mut col = landsat();
        col.links = vec![
            Link::new(Rel::SelfLink, "https://example.com/catalog.json"),
            Link::new(Rel::Root, "https://example.com/catalog.json"),
            Link::new(Rel::Parent, "https://example.org/catalog.json"),
        ];
        assert_eq!(
            messages(&col.validate(ValidationLevel::Full)),
            vec![
                "error at links: `root` and `self` point to the same document, but a `parent` link exists",
            ]
        );
        // quick validation does not look at the topology
        assert!(col.validate(ValidationLevel::Quick).is_valid());
    }

    #[test]
    fn reordered_bands_are_detected() {
        let mut col = landsat();
        col.properties.bands.swap(0, 1);
        let report = col.validate(ValidationLevel::Full);
        assert!(report.is_valid());
        assert_eq!(
            messages(&report),
            vec![
                "warning at assets.B1.title: title names `coastal`, but band 0 is `blue`",
                "warning at assets.B2.title: title names `blue`, but band 1 is `coastal`",
            ]
        );
    }

    #[test]
    fn full_checks() {
        let mut col = landsat();
        col.id = "landsat 8/l1".to_string();
        col.properties.bands[1].id = "B1".to_string();
        col.assets.get_mut("thumbnail").unwrap().media_type = Some("image/x-unknown".to_string());
        col.assets.get_mut("MTL").unwrap().media_type = None;
        col.assets.get_mut("index").unwrap().bands = Some(vec![0]);
        let report = col.validate(ValidationLevel::Full);
        assert_eq!(
            messages(&report),
            vec![
                "error at id: `landsat 8/l1` contains characters that are not URI-safe",
                "warning at properties.collection: `landsat-8-l1` differs from the record id `landsat 8/l1`",
                "warning at properties.eo:bands.1.id: band id `B1` is used more than once",
                "warning at assets.MTL.type: asset has no media type",
                "warning at assets.index.type: asset references bands, but its media type is HTML",
                "warning at assets.thumbnail.type: unknown media type `image/x-unknown`",
            ]
        );
    }
}
