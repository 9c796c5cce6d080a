//! AWS Signature Version 4 signing of S3 `GET` requests.
//!
//! Only what is needed to read from requester-pays buckets over
//! virtual-hosted URLs (`https://<bucket>.s3.amazonaws.com/<key>`) is
//! supported. The payload is never hashed.

use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac as _};
use sha2::{Digest as _, Sha256};
use tracing::debug;
use url::Url;

use crate::env::Env;
use crate::errors::{StacError, StacResult};

pub const DEFAULT_REGION: &str = "eu-central-1";

const S3_HOST_SUFFIX: &str = ".s3.amazonaws.com";
const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";
const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";
const SIGNED_HEADERS: &str = "host;x-amz-content-sha256;x-amz-date;x-amz-request-payer";

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .finish()
    }
}

impl Credentials {
    /// Read `AWS_ACCESS_KEY_ID` and `AWS_SECRET_ACCESS_KEY`. Both must be set.
    #[must_use]
    pub fn from_env<'a>(env: &impl Env<'a>) -> Option<Self> {
        let access_key_id = env.get_env_str("AWS_ACCESS_KEY_ID")?;
        let secret_access_key = env.get_env_str("AWS_SECRET_ACCESS_KEY")?;
        Some(Self {
            access_key_id,
            secret_access_key,
        })
    }
}

/// A request URL with the headers that must accompany it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
}

#[must_use]
pub fn is_s3_url(url: &str) -> bool {
    url.contains("s3.amazonaws.com")
}

/// Split a virtual-hosted S3 URL into bucket and percent-encoded key.
pub fn parse_s3_url(url: &str) -> StacResult<(String, String)> {
    let parsed = Url::parse(url).map_err(|e| StacError::InvalidUrl(e, url.to_string()))?;
    let bucket = parsed
        .host_str()
        .and_then(|h| h.strip_suffix(S3_HOST_SUFFIX))
        .filter(|b| !b.is_empty())
        .ok_or_else(|| StacError::NotAnS3Url(url.to_string()))?;
    let key = parsed.path().trim_start_matches('/');
    if key.is_empty() {
        return Err(StacError::NotAnS3Url(url.to_string()));
    }
    Ok((bucket.to_string(), key.to_string()))
}

fn hmac_sha256(key: &[u8], msg: &str) -> StacResult<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)?;
    mac.update(msg.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

fn signing_key(secret: &str, date: &str, region: &str) -> StacResult<Vec<u8>> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date)?;
    let k_region = hmac_sha256(&k_date, region)?;
    let k_service = hmac_sha256(&k_region, SERVICE)?;
    hmac_sha256(&k_service, "aws4_request")
}

/// Sign a `GET` of an S3 object for a requester-pays bucket.
pub fn sign_s3_url(
    url: &str,
    region: &str,
    credentials: &Credentials,
    now: DateTime<Utc>,
) -> StacResult<SignedRequest> {
    let (bucket, key) = parse_s3_url(url)?;
    let host = format!("{bucket}{S3_HOST_SUFFIX}");
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = now.format("%Y%m%d").to_string();

    let canonical_uri = format!("/{key}");
    let canonical_headers = format!(
        "host:{host}\nx-amz-content-sha256:{UNSIGNED_PAYLOAD}\nx-amz-date:{amz_date}\nx-amz-request-payer:requester\n"
    );
    let canonical_request =
        format!("GET\n{canonical_uri}\n\n{canonical_headers}\n{SIGNED_HEADERS}\n{UNSIGNED_PAYLOAD}");

    let scope = format!("{date_stamp}/{region}/{SERVICE}/aws4_request");
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );
    let key = signing_key(&credentials.secret_access_key, &date_stamp, region)?;
    let signature = hex::encode(hmac_sha256(&key, &string_to_sign)?);

    let authorization = format!(
        "{ALGORITHM} Credential={}/{scope}, SignedHeaders={SIGNED_HEADERS}, Signature={signature}",
        credentials.access_key_id
    );
    let headers = BTreeMap::from([
        ("Authorization".to_string(), authorization),
        ("x-amz-content-sha256".to_string(), UNSIGNED_PAYLOAD.to_string()),
        ("x-amz-date".to_string(), amz_date),
        ("x-amz-request-payer".to_string(), "requester".to_string()),
    ]);
    let url = format!("https://{host}{canonical_uri}");
    debug!("Signed request URL = {url}");
    Ok(SignedRequest { url, headers })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;
    use insta::assert_snapshot;
    use rstest::rstest;

    use super::*;
    use crate::env::FauxEnv;

    const B1: &str = "https://landsat-pds.s3.amazonaws.com/c1/L8/139/045/LC08_L1TP_139045_20170304_20170316_01_T1/LC08_L1TP_139045_20170304_20170316_01_T1_B1.TIF";

    fn creds() -> Credentials {
        Credentials {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string(),
        }
    }

    #[test]
    fn sign_landsat_band() {
        let now = Utc.with_ymd_and_hms(2019, 1, 1, 12, 0, 0).unwrap();
        let req = sign_s3_url(B1, DEFAULT_REGION, &creds(), now).unwrap();
        assert_eq!(req.url, B1);
        assert_snapshot!(req.headers["Authorization"], @"AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20190101/eu-central-1/s3/aws4_request, SignedHeaders=host;x-amz-content-sha256;x-amz-date;x-amz-request-payer, Signature=4ec068311949b851b500277c4c29a45ed64917eef52c1b259bbb19d92d29e498");
        assert_eq!(req.headers["x-amz-date"], "20190101T120000Z");
        assert_eq!(req.headers["x-amz-content-sha256"], "UNSIGNED-PAYLOAD");
        assert_eq!(req.headers["x-amz-request-payer"], "requester");
    }

    #[test]
    fn region_changes_signature() {
        let now = Utc.with_ymd_and_hms(2019, 1, 1, 12, 0, 0).unwrap();
        let a = sign_s3_url(B1, DEFAULT_REGION, &creds(), now).unwrap();
        let b = sign_s3_url(B1, "us-west-2", &creds(), now).unwrap();
        assert_ne!(a.headers["Authorization"], b.headers["Authorization"]);
        assert!(b.headers["Authorization"].contains("/us-west-2/s3/aws4_request"));
    }

    #[rstest]
    #[case("https://landsat-pds.s3.amazonaws.com/a/b.TIF", "landsat-pds", "a/b.TIF")]
    #[case("https://sat-stac.s3.amazonaws.com/landsat-8-l1/catalog.json", "sat-stac", "landsat-8-l1/catalog.json")]
    fn parse_urls(#[case] url: &str, #[case] bucket: &str, #[case] key: &str) {
        assert_eq!(parse_s3_url(url).unwrap(), (bucket.to_string(), key.to_string()));
    }

    #[rstest]
    #[case("https://example.com/a.tif")]
    #[case("https://s3.amazonaws.com/a.tif")]
    #[case("https://bucket.s3.amazonaws.com/")]
    fn not_s3(#[case] url: &str) {
        assert!(matches!(parse_s3_url(url), Err(StacError::NotAnS3Url(_))));
    }

    #[test]
    fn credentials_need_both_keys() {
        let env = FauxEnv::from_pairs([("AWS_ACCESS_KEY_ID", "AKIDEXAMPLE")]);
        assert_eq!(Credentials::from_env(&env), None);
        let env = FauxEnv::from_pairs([
            ("AWS_ACCESS_KEY_ID", "AKIDEXAMPLE"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
        ]);
        let creds = Credentials::from_env(&env).unwrap();
        assert_eq!(creds.access_key_id, "AKIDEXAMPLE");
        assert!(!format!("{creds:?}").contains("secret\""));
    }
}
