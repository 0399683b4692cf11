use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, Method};
use sha2::{Digest, Sha256};
use url::Url;

use crate::config::ObjectStorageSettings;

type HmacSha256 = Hmac<Sha256>;

const AWS_URI_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// S3-compatible client used to archive uploaded spreadsheets.
#[derive(Clone, Debug)]
pub struct ObjectStorageClient {
    http: Client,
    bucket: String,
    region: String,
    endpoint: Url,
    access_key: String,
    secret_key: String,
    prefix: String,
}

struct SignedRequest {
    url: Url,
    authorization: String,
    amz_date: String,
    payload_hash: String,
}

impl ObjectStorageClient {
    pub fn new(settings: ObjectStorageSettings) -> Result<Self> {
        let endpoint = settings
            .endpoint
            .unwrap_or_else(|| "https://s3.amazonaws.com".to_string());

        let endpoint = Url::parse(&endpoint).context("Invalid object storage endpoint URL")?;
        if endpoint.host_str().is_none() {
            bail!("Object storage endpoint must include a host");
        }

        let app_env = std::env::var("APP_ENV").unwrap_or_else(|_| "prod".to_string());
        if app_env == "prod" && endpoint.scheme() != "https" {
            bail!(
                "Object storage endpoint must use HTTPS in production mode. Got: {}",
                endpoint.scheme()
            );
        }
        if endpoint.scheme() != "https" && endpoint.scheme() != "http" {
            bail!(
                "Invalid endpoint scheme: {}. Must be http or https.",
                endpoint.scheme()
            );
        }

        Ok(Self {
            http: Client::new(),
            bucket: settings.bucket,
            region: settings.region,
            access_key: settings.access_key,
            secret_key: settings.secret_key,
            endpoint,
            prefix: sanitize_prefix(&settings.uploads_prefix),
        })
    }

    /// Stores `bytes` and returns the full object key to use as a file reference.
    pub async fn upload_bytes(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        let object_key = self.full_key(key);
        let payload_hash = hex::encode(Sha256::digest(&bytes));
        let signed = self.sign(&Method::PUT, &object_key, payload_hash)?;

        self.http
            .put(signed.url)
            .header("Authorization", signed.authorization)
            .header("x-amz-date", signed.amz_date)
            .header("x-amz-content-sha256", signed.payload_hash)
            .header("content-type", content_type)
            .body(bytes)
            .send()
            .await
            .with_context(|| format!("Failed to upload object {}", object_key))?
            .error_for_status()
            .context("Object storage upload returned error status")?;

        Ok(object_key)
    }

    /// Fetches an object previously returned by [`Self::upload_bytes`].
    ///
    /// Objects larger than `max_bytes` are refused.
    pub async fn download_bytes(&self, file_ref: &str, max_bytes: usize) -> Result<Vec<u8>> {
        let object_key = file_ref.trim_matches('/').to_string();
        let signed = self.sign(&Method::GET, &object_key, EMPTY_PAYLOAD_SHA256.to_string())?;

        let response = self
            .http
            .get(signed.url)
            .header("Authorization", signed.authorization)
            .header("x-amz-date", signed.amz_date)
            .header("x-amz-content-sha256", signed.payload_hash)
            .send()
            .await
            .with_context(|| format!("Failed to download object {}", object_key))?
            .error_for_status()
            .context("Object storage download returned error status")?;

        if let Some(length) = response.content_length() {
            if length > max_bytes as u64 {
                bail!("Object {} is {} bytes, limit is {}", object_key, length, max_bytes);
            }
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read object body")?;
        if bytes.len() > max_bytes {
            bail!("Object {} exceeds {} bytes", object_key, max_bytes);
        }
        Ok(bytes.to_vec())
    }

    /// True when `file_ref` is an archived upload of this shop and import type.
    pub fn owns_upload(&self, file_ref: &str, shop_id: &str, profile: &str) -> bool {
        if shop_id.is_empty() || shop_id.contains('/') {
            return false;
        }
        let object_key = file_ref.trim_matches('/');
        if object_key.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..") {
            return false;
        }
        let prefix = format!("{}/", self.full_key(&upload_prefix(shop_id, profile)));
        object_key
            .strip_prefix(prefix.as_str())
            .is_some_and(|name| !name.is_empty() && !name.contains('/'))
    }

    /// `imports/{shop}/{profile}/{timestamp}-{file}` with the file name made key-safe.
    pub fn build_upload_key(&self, shop_id: &str, profile: &str, file_name: &str) -> String {
        let timestamp = Utc::now().format("%Y%m%dT%H%M%S");
        let safe_name: String = file_name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}/{timestamp}-{safe_name}", upload_prefix(shop_id, profile))
    }

    fn sign(&self, method: &Method, object_key: &str, payload_hash: String) -> Result<SignedRequest> {
        let canonical_uri = self.canonical_uri(object_key);
        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        let scope = format!("{}/{}/s3/aws4_request", date_stamp, self.region);

        let host = self
            .endpoint
            .host_str()
            .ok_or_else(|| anyhow!("Object storage endpoint missing host"))?
            .to_lowercase();
        let host = match self.endpoint.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host,
        };

        let canonical_headers = format!(
            "host:{}\nx-amz-content-sha256:{}\nx-amz-date:{}\n",
            host, payload_hash, amz_date
        );
        let signed_headers = "host;x-amz-content-sha256;x-amz-date";

        let canonical_request = format!(
            "{}\n{}\n\n{}\n{}\n{}",
            method.as_str(),
            canonical_uri,
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signing_key = derive_signing_key(&self.secret_key, &date_stamp, &self.region, "s3")?;
        let signature = hex::encode(hmac_sign(&signing_key, string_to_sign.as_bytes())?);

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.access_key, scope, signed_headers, signature
        );

        let mut url = self.endpoint.clone();
        url.set_path(&canonical_uri);

        Ok(SignedRequest {
            url,
            authorization,
            amz_date,
            payload_hash,
        })
    }

    fn full_key(&self, key: &str) -> String {
        let cleaned = key.trim_matches('/');
        if self.prefix.is_empty() {
            cleaned.to_string()
        } else if cleaned.is_empty() {
            self.prefix.clone()
        } else {
            format!("{}/{}", self.prefix, cleaned)
        }
    }

    fn canonical_uri(&self, key: &str) -> String {
        let encoded_key = key
            .split('/')
            .map(|segment| utf8_percent_encode(segment, AWS_URI_ENCODE_SET).to_string())
            .collect::<Vec<_>>()
            .join("/");

        format!("/{}/{}", self.bucket, encoded_key)
    }
}

fn upload_prefix(shop_id: &str, profile: &str) -> String {
    format!("imports/{shop_id}/{profile}")
}

fn sanitize_prefix(prefix: &str) -> String {
    prefix
        .trim_matches('/')
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

fn derive_signing_key(secret: &str, date: &str, region: &str, service: &str) -> Result<Vec<u8>> {
    let mut key = format!("AWS4{}", secret).into_bytes();
    key = hmac_sign(&key, date)?;
    key = hmac_sign(&key, region)?;
    key = hmac_sign(&key, service)?;
    hmac_sign(&key, b"aws4_request")
}

fn hmac_sign(key: &[u8], message: impl AsRef<[u8]>) -> Result<Vec<u8>> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|err| anyhow!("invalid HMAC key: {}", err))?;
    mac.update(message.as_ref());
    Ok(mac.finalize().into_bytes().to_vec())
}
