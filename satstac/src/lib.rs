#![doc = "Typed model, validation and tooling for SpatioTemporal Asset Catalog collection records, plus a read-only model of the CircleCI pipelines that publish them."]

mod calendar;
pub use calendar::{CalendarMonth, CalendarYear, Week, calendar_dates, parse_date_label, text_calendar};

mod collection;
pub use collection::{Asset, Band, Collection, Extent, Properties, Provider, parse_datetime};

pub mod config;
pub use config::{Config, read_config};

mod download;
pub use download::{Downloader, file_name_from_url};

pub mod env;

mod errors;
pub use errors::{StacError, StacResult};

mod links;
pub use links::{Link, Rel, resolve_href};

#[cfg(feature = "cli")]
pub mod logging;

pub mod pipeline;
pub use pipeline::Pipeline;

pub mod s3;

mod summary;
pub use summary::{BandInfo, Summary};

mod validation;
pub use validation::{
    SUPPORTED_STAC_VERSIONS, Severity, ValidationIssue, ValidationLevel, ValidationReport,
};

// Re-export of crates used in the public API
pub use satstac_utils::{Bbox, MediaType, UtilsError, WORLD_BBOX, mkdirp, split_all};
