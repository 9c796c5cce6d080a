use std::fmt::Write as _;
use std::path::PathBuf;

use satstac_utils::UtilsError;

use crate::validation::ValidationIssue;

fn join_issues(issues: &[ValidationIssue]) -> String {
    let mut s = String::new();
    for (i, issue) in issues.iter().enumerate() {
        if i > 0 {
            s.push_str("\n    ");
        }
        let _ = write!(s, "{issue}");
    }
    s
}

#[derive(thiserror::Error, Debug)]
pub enum StacError {
    #[error("IO error {0}: {1}")]
    IoError(#[source] std::io::Error, PathBuf),

    #[error("Unable to parse catalog record {1}: {0}")]
    JsonParseError(#[source] serde_json::Error, PathBuf),

    #[error(transparent)]
    JsonSerdeError(#[from] serde_json::Error),

    #[error("Unable to parse pipeline definition {1}: {0}")]
    YamlParseError(#[source] serde_yaml::Error, PathBuf),

    #[error(transparent)]
    YamlSerdeError(#[from] serde_yaml::Error),

    #[error("Unsupported cache key expression `{{{{ {0} }}}}`")]
    InvalidTemplate(String),

    #[error("Unable to load config file {1}: {0}")]
    ConfigLoadError(#[source] std::io::Error, PathBuf),

    #[error("Unable to parse config file {1}: {0}")]
    ConfigParseError(#[source] subst::yaml::Error, PathBuf),

    #[error("Invalid spatial extent: {0}")]
    InvalidBbox(#[from] UtilsError),

    #[error("Value `{0}` is neither an ISO-8601 date nor a date-time")]
    InvalidDate(String),

    #[error("Key `{0}` was not found in the catalog record")]
    KeyNotFound(String),

    #[error("Asset `{0}` does not exist in the catalog record")]
    AssetNotFound(String),

    #[error("Asset `{asset}` references band index {index}, but only {count} bands are defined")]
    BandIndexOutOfRange {
        asset: String,
        index: usize,
        count: usize,
    },

    #[error("Catalog record {} failed validation:\n    {}", .0, join_issues(.1))]
    FailedValidation(String, Vec<ValidationIssue>),

    #[error("Workflow `{workflow}` refers to job `{job}` that is not declared in `jobs`")]
    UnknownJob { workflow: String, job: String },

    #[error("Job `{job}` in workflow `{workflow}` requires `{required}`, which is not part of the workflow")]
    UnknownRequirement {
        workflow: String,
        job: String,
        required: String,
    },

    #[error("Workflow `{workflow}` invokes more than one job named `{job}`")]
    DuplicateJobName { workflow: String, job: String },

    #[error("Workflow `{0}` has a dependency cycle involving jobs: {1:?}")]
    DependencyCycle(String, Vec<String>),

    #[error("Branch filter {1} is not a valid regular expression: {0}")]
    InvalidBranchFilter(#[source] regex::Error, String),

    #[error("Unable to download file {0}: {1}")]
    DownloadFailed(String, String),

    #[error(transparent)]
    HttpError(#[from] reqwest::Error),

    #[error("Error {0} while parsing URL {1}")]
    InvalidUrl(#[source] url::ParseError, String),

    #[error("URL {0} does not point to an S3 object")]
    NotAnS3Url(String),

    #[error("Invalid request signing key: {0}")]
    InvalidSigningKey(#[from] hmac::digest::InvalidLength),

    #[error("Cannot build a file name from URL {0}, please provide one explicitly")]
    NoFileName(String),

    #[error("A calendar needs at least one date")]
    EmptyCalendar,

    #[error("Calendar width must be between 1 and 12 months, but {0} was given")]
    InvalidCalendarWidth(usize),
}

pub type StacResult<T> = Result<T, StacError>;
