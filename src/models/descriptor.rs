//! Local and remote snapshots of one artifact's sync-relevant metadata.

use crate::{
    errors::{SyncError, SyncResult, sync_io},
    models::content_table::{ContentTable, extension_of, item_path},
};
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use futures::{StreamExt, pin_mut};
use md5::Context;
use reqwest::header::{self, HeaderMap};
use serde::Serialize;
use std::path::Path;
use tokio::fs::{self, File};
use tokio_util::io::ReaderStream;

/// Vendor header carrying the local modification time.
pub const META_MODIFIED_TIME: &str = "x-amz-meta-modifiedtime";
/// Vendor header carrying the content fingerprint.
pub const META_FINGERPRINT: &str = "x-amz-meta-md5";
pub const WEBSITE_REDIRECT: &str = "x-amz-website-redirect-location";

/// RFC1123 with a numeric zone, e.g. `Mon, 02 Jan 2006 15:04:05 -0700`.
pub const STORE_TIME_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

pub fn format_store_time<Tz: TimeZone>(time: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    time.format(STORE_TIME_FORMAT).to_string()
}

pub fn parse_store_time(value: &str) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
    DateTime::parse_from_str(value, STORE_TIME_FORMAT)
}

/// Snapshot of one file in the build tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalDescriptor {
    /// Remote key (markup extension stripped).
    pub item_path: String,
    pub content_length: u64,
    pub mod_time: DateTime<Utc>,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    /// Lowercase hex MD5 of the file content.
    pub fingerprint: String,
    pub public: bool,
}

impl LocalDescriptor {
    /// Describe the file at `path`, published under `relative` (its path
    /// below the build root).
    ///
    /// The fingerprint is computed in-process; an unreadable file is an error
    /// rather than an empty fingerprint.
    pub async fn from_file(
        path: &Path,
        relative: &Path,
        table: &ContentTable,
    ) -> SyncResult<Self> {
        let metadata = fs::metadata(path).await.map_err(|e| sync_io(path, e))?;
        let mod_time: DateTime<Utc> = metadata.modified().map_err(|e| sync_io(path, e))?.into();

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = extension_of(&name);

        Ok(Self {
            item_path: item_path(relative),
            content_length: metadata.len(),
            mod_time,
            content_type: table.content_type(ext).map(str::to_string),
            content_encoding: table.content_encoding(ext).map(str::to_string),
            fingerprint: fingerprint_file(path).await?,
            public: true,
        })
    }
}

/// Stream a file through MD5 without holding it in memory.
pub async fn fingerprint_file(path: &Path) -> SyncResult<String> {
    let file = File::open(path).await.map_err(|e| sync_io(path, e))?;
    let stream = ReaderStream::new(file);
    pin_mut!(stream);

    let mut digest = Context::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| sync_io(path, e))?;
        digest.consume(&chunk);
    }
    Ok(format!("{:x}", digest.compute()))
}

pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}

/// Snapshot of an object as reported by a HEAD probe.
///
/// A missing object is `RemoteDescriptor::absent()`: every field zeroed and
/// `exists == false`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemoteDescriptor {
    pub exists: bool,
    pub size: u64,
    pub mod_time: Option<DateTime<FixedOffset>>,
    pub content_type: String,
    pub fingerprint: String,
    pub url: String,
    pub redirect_url: Option<String>,
}

impl RemoteDescriptor {
    pub fn absent() -> Self {
        Self::default()
    }

    /// Parse the headers of a successful probe response.
    ///
    /// Unparseable `Content-Length` or modification-time values are errors:
    /// a malformed response must not be mistaken for an empty object.
    pub fn from_headers(url: impl Into<String>, headers: &HeaderMap) -> SyncResult<Self> {
        let size = match header_str(headers, header::CONTENT_LENGTH.as_str()) {
            Some(value) if !value.is_empty() => {
                value
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| SyncError::MalformedHeader {
                        name: header::CONTENT_LENGTH.to_string(),
                        value,
                    })?
            }
            _ => 0,
        };

        let mod_time = match header_str(headers, META_MODIFIED_TIME) {
            Some(value) if !value.is_empty() => {
                Some(
                    parse_store_time(&value).map_err(|_| SyncError::MalformedHeader {
                        name: META_MODIFIED_TIME.to_string(),
                        value,
                    })?,
                )
            }
            _ => None,
        };

        Ok(Self {
            exists: true,
            size,
            mod_time,
            content_type: header_str(headers, header::CONTENT_TYPE.as_str()).unwrap_or_default(),
            fingerprint: header_str(headers, META_FINGERPRINT).unwrap_or_default(),
            url: url.into(),
            redirect_url: header_str(headers, WEBSITE_REDIRECT).filter(|v| !v.is_empty()),
        })
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
}
