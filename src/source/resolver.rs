//! Turns a document URL into PDF bytes
//!
//! Accepted forms: plain filesystem paths and `file://` URLs, `http(s)://`
//! URLs, and `data:application/pdf;base64,...` URLs. Remote hosts must be
//! public unless the config allows private addresses, and downloads are
//! capped at `max_download_bytes`.

use crate::config::SourceConfig;
use crate::error::{Error, Result};
use base64::Engine;
use futures_util::StreamExt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Load the bytes behind `url`, checking that they start with a PDF header
pub async fn resolve(url: &str, config: &SourceConfig) -> Result<Vec<u8>> {
    let data = if let Some(payload) = url.strip_prefix("data:") {
        let (_, encoded) = payload
            .split_once(";base64,")
            .ok_or_else(|| Error::SourceResolution {
                reason: "Only base64 data URLs are supported".to_string(),
            })?;
        base64::engine::general_purpose::STANDARD.decode(encoded)?
    } else if url.starts_with("http://") || url.starts_with("https://") {
        download(url, config).await?
    } else {
        let path = local_path(url.strip_prefix("file://").unwrap_or(url), config)?;
        if !path.exists() {
            return Err(Error::PdfNotFound {
                path: path.display().to_string(),
            });
        }
        std::fs::read(&path)?
    };

    if !data.starts_with(b"%PDF") {
        return Err(Error::InvalidPdf {
            reason: format!("{} is not a PDF document", describe(url)),
        });
    }
    Ok(data)
}

/// Shortened form of `url` for error text; data URLs carry the whole document
fn describe(url: &str) -> &str {
    if url.starts_with("data:") {
        "data URL"
    } else {
        url
    }
}

/// Map `path` into the configured resource directories. With none
/// configured every path is accepted as given.
fn local_path(path: &str, config: &SourceConfig) -> Result<PathBuf> {
    if config.resource_dirs.is_empty() {
        return Ok(PathBuf::from(path));
    }

    let denied = || Error::PathAccessDenied {
        path: path.to_string(),
    };
    let canonical = std::fs::canonicalize(path).map_err(|_| denied())?;
    let allowed = config
        .resource_dirs
        .iter()
        .filter_map(|dir| std::fs::canonicalize(dir).ok())
        .any(|dir| canonical.starts_with(dir));

    if allowed {
        Ok(canonical)
    } else {
        Err(denied())
    }
}

fn is_public(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, ..] = v4.octets();
            let shared = a == 100 && (b & 0xC0) == 64;
            !(v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                || shared)
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            let unique_local = (first & 0xFE00) == 0xFC00;
            let link_local = (first & 0xFFC0) == 0xFE80;
            !(v6.is_loopback() || v6.is_unspecified() || unique_local || link_local)
        }
    }
}

/// Refuse hosts that resolve to any non-public address
async fn ensure_public_host(url: &Url) -> Result<()> {
    let host = url.host_str().ok_or_else(|| Error::SourceResolution {
        reason: "URL has no host".to_string(),
    })?;
    let port = url.port_or_known_default().unwrap_or(443);

    let mut addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| Error::SourceResolution {
            reason: format!("DNS resolution failed for {host}: {e}"),
        })?;

    if addrs.any(|addr| !is_public(addr.ip())) {
        return Err(Error::SsrfBlocked {
            url: url.to_string(),
        });
    }
    Ok(())
}

async fn download(url: &str, config: &SourceConfig) -> Result<Vec<u8>> {
    let parsed = Url::parse(url).map_err(|e| Error::SourceResolution {
        reason: format!("Invalid URL: {e}"),
    })?;
    if !config.allow_private_urls {
        ensure_public_host(&parsed).await?;
    }

    let limit = config.max_download_bytes;
    let too_large = |size: u64| Error::DownloadTooLarge {
        size,
        max_size: limit,
    };

    let response = reqwest::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .build()?
        .get(parsed)
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::SourceResolution {
            reason: format!("HTTP request failed with status: {status}"),
        });
    }
    if let Some(size) = response.content_length().filter(|&size| size > limit) {
        return Err(too_large(size));
    }

    let mut data = Vec::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        data.extend_from_slice(&chunk?);
        if data.len() as u64 > limit {
            return Err(too_large(data.len() as u64));
        }
    }
    Ok(data)
}
