use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use reqwest::{Client, Response, StatusCode};
use satstac_utils::mkdirp;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt as _;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Config;
use crate::errors::{StacError, StacResult};
use crate::s3::{Credentials, is_s3_url, sign_s3_url};

/// Downloads remote files to disk, signing S3 requests when credentials are
/// available.
#[derive(Clone, Debug)]
pub struct Downloader {
    client: Client,
    region: String,
    credentials: Option<Credentials>,
    download_dir: PathBuf,
}

/// Last non-empty path segment of `url`.
pub fn file_name_from_url(url: &str) -> StacResult<String> {
    let parsed = Url::parse(url).map_err(|e| StacError::InvalidUrl(e, url.to_string()))?;
    parsed
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .map(ToString::to_string)
        .ok_or_else(|| StacError::NoFileName(url.to_string()))
}

impl Downloader {
    /// Credentials are only used when `config.s3.requester_pays` is set.
    pub fn new(config: &Config, credentials: Option<Credentials>) -> StacResult<Self> {
        let client = Client::builder().user_agent(config.user_agent()).build()?;
        Ok(Self {
            client,
            region: config.s3.region.clone(),
            credentials: credentials.filter(|_| config.s3.requester_pays),
            download_dir: config.download_dir().to_path_buf(),
        })
    }

    /// Download `url` to `filename`, or to the last URL path segment inside
    /// the download directory. Returns the path written to.
    pub async fn download(&self, url: &str, filename: Option<&Path>) -> StacResult<PathBuf> {
        let path = match filename {
            Some(f) => f.to_path_buf(),
            None => self.download_dir.join(file_name_from_url(url)?),
        };
        info!("Downloading {url} as {}", path.display());

        let resp = self.fetch(url).await?;
        if resp.status() != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(StacError::DownloadFailed(url.to_string(), body));
        }
        save(resp, &path).await?;
        Ok(path)
    }

    /// Signed request first for S3 URLs when credentials are set, then an
    /// unsigned one if signing or the signed request fails.
    async fn fetch(&self, url: &str) -> StacResult<Response> {
        if let Some(credentials) = self.credentials.as_ref().filter(|_| is_s3_url(url)) {
            match sign_s3_url(url, &self.region, credentials, Utc::now()) {
                Ok(signed) => {
                    let mut req = self.client.get(&signed.url);
                    for (name, value) in &signed.headers {
                        req = req.header(name, value);
                    }
                    match req.send().await {
                        Ok(resp) if resp.status() == StatusCode::OK => return Ok(resp),
                        Ok(resp) => debug!("Signed request for {url} returned {}, retrying unsigned", resp.status()),
                        Err(e) => warn!("Signed request for {url} failed, retrying unsigned: {e}"),
                    }
                }
                Err(e) => debug!("Unable to sign request for {url}, retrying unsigned: {e}"),
            }
        }
        Ok(self.client.get(url).send().await?)
    }
}

/// Stream the body to `path`. A partially written file is removed.
async fn save(resp: Response, path: &Path) -> StacResult<()> {
    if let Some(parent) = path.parent() {
        mkdirp(parent).map_err(|e| StacError::IoError(e, parent.to_path_buf()))?;
    }
    let result = write_body(resp, path).await;
    if result.is_err()
        && let Err(e) = fs::remove_file(path).await
        && e.kind() != ErrorKind::NotFound
    {
        warn!("Unable to remove incomplete download {}: {e}", path.display());
    }
    result
}

async fn write_body(mut resp: Response, path: &Path) -> StacResult<()> {
    let io_err = |e| StacError::IoError(e, path.to_path_buf());
    let mut file = File::create(path).await.map_err(io_err)?;
    let mut size = 0;
    while let Some(chunk) = resp.chunk().await? {
        file.write_all(&chunk).await.map_err(io_err)?;
        size += chunk.len();
    }
    file.flush().await.map_err(io_err)?;
    debug!("Wrote {size} bytes to {}", path.display());
    Ok(())
}
