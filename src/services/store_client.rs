//! HTTP access to the object store: HEAD probes and signed PUT uploads.

use crate::{
    errors::{SyncError, SyncResult, sync_io},
    models::{
        Credentials, LocalDescriptor, RemoteDescriptor,
        descriptor::{
            META_FINGERPRINT, META_MODIFIED_TIME, fingerprint_bytes, format_store_time,
        },
    },
    services::signer::RequestSigner,
};
use bytes::Bytes;
use chrono::Utc;
use reqwest::{
    Client, StatusCode, Url,
    header::{self, HeaderMap, HeaderName, HeaderValue},
};
use std::{path::Path, sync::Arc, time::Instant};
use tokio::fs;
use tracing::{debug, info, warn};

pub const ACL_HEADER: &str = "x-amz-acl";
pub const ACL_PUBLIC_READ: &str = "public-read";
pub const ACL_OWNER_FULL_CONTROL: &str = "bucket-owner-full-control";

pub const DEFAULT_STORE_HOST: &str = "s3.amazonaws.com";

/// Where objects live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEndpoint {
    /// `http://<bucket>.<host>/<item>`
    VirtualHost { host: String },
    /// `<base>/<bucket>/<item>`, for local or compatible stores.
    PathStyle { base: Url },
}

impl StoreEndpoint {
    pub fn object_url(&self, bucket: &str, item_path: &str) -> SyncResult<Url> {
        let (mut url, leading) = match self {
            StoreEndpoint::VirtualHost { host } => {
                let url = Url::parse(&format!("http://{bucket}.{host}/"))
                    .map_err(|_| SyncError::InvalidUrl(format!("{bucket}.{host}")))?;
                (url, None)
            }
            StoreEndpoint::PathStyle { base } => (base.clone(), Some(bucket)),
        };

        url.path_segments_mut()
            .map_err(|_| SyncError::InvalidUrl(item_path.to_string()))?
            .pop_if_empty()
            .extend(leading)
            .extend(item_path.split('/'));
        Ok(url)
    }
}

/// Probe and upload client. Cheap to clone; clones share the HTTP connection
/// pool and the credentials.
#[derive(Clone, Debug)]
pub struct StoreClient {
    http: Client,
    endpoint: StoreEndpoint,
    signer: RequestSigner,
    credentials: Arc<Credentials>,
}

impl StoreClient {
    pub fn new(endpoint: StoreEndpoint, signer: RequestSigner, credentials: Credentials) -> Self {
        Self {
            http: Client::new(),
            endpoint,
            signer,
            credentials: Arc::new(credentials),
        }
    }

    pub fn endpoint(&self) -> &StoreEndpoint {
        &self.endpoint
    }

    /// HEAD the object at `item_path`.
    ///
    /// Any non-200 status means the object does not exist yet and yields
    /// [`RemoteDescriptor::absent`]. Transport failures and malformed
    /// metadata are errors.
    pub async fn probe(&self, bucket: &str, item_path: &str) -> SyncResult<RemoteDescriptor> {
        let url = self.endpoint.object_url(bucket, item_path)?;
        let response = self.http.head(url.clone()).send().await?;

        if response.status() != StatusCode::OK {
            debug!("probe {} returned {}, treating as absent", url, response.status());
            return Ok(RemoteDescriptor::absent());
        }
        RemoteDescriptor::from_headers(url.as_str(), response.headers())
    }

    /// PUT the file at `path` under `local.item_path`. No retries; a
    /// non-success status is returned as [`SyncError::Rejected`].
    pub async fn upload(
        &self,
        path: &Path,
        bucket: &str,
        local: &LocalDescriptor,
    ) -> SyncResult<()> {
        let url = self.endpoint.object_url(bucket, &local.item_path)?;
        let body = fs::read(path).await.map_err(|e| sync_io(path, e))?;

        // The file may have been rewritten since it was described.
        let fingerprint = fingerprint_bytes(&body);
        if fingerprint != local.fingerprint {
            warn!(
                "{} changed while syncing, uploading current content",
                path.display()
            );
        }

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len() as u64));
        headers.insert(header::DATE, header_value(&format_store_time(&Utc::now()))?);
        headers.insert(
            HeaderName::from_static(META_MODIFIED_TIME),
            header_value(&format_store_time(&local.mod_time))?,
        );
        headers.insert(
            HeaderName::from_static(META_FINGERPRINT),
            header_value(&fingerprint)?,
        );
        if let Some(content_type) = &local.content_type {
            headers.insert(header::CONTENT_TYPE, header_value(content_type)?);
        }
        if let Some(encoding) = &local.content_encoding {
            headers.insert(header::CONTENT_ENCODING, header_value(encoding)?);
        }
        let acl = if local.public {
            ACL_PUBLIC_READ
        } else {
            ACL_OWNER_FULL_CONTROL
        };
        headers.insert(
            HeaderName::from_static(ACL_HEADER),
            HeaderValue::from_static(acl),
        );

        let mut request = self
            .http
            .put(url.clone())
            .headers(headers)
            .body(Bytes::from(body))
            .build()?;
        self.signer.sign(&mut request, &self.credentials)?;

        info!("uploading {}", url);
        let started = Instant::now();
        let response = self.http.execute(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Rejected {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        info!("upload {} took {:?}", url, started.elapsed());
        Ok(())
    }
}

fn header_value(value: &str) -> SyncResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| SyncError::MalformedHeader {
        name: "request header".into(),
        value: value.to_string(),
    })
}
