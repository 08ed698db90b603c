//! In-process object store used by the integration tests.
//!
//! Serves `HEAD`, `PUT` and `GET` on `/{bucket}/{*key}` the way the real
//! store does for the headers the sync engine cares about, and rejects any
//! PUT whose `Authorization` header does not match the canonical signature.

#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, Bytes},
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header},
    response::Response,
    routing::put,
};
use reqwest::Url;
use site_sync::{
    models::{ContentTable, Credentials, descriptor::{META_FINGERPRINT, META_MODIFIED_TIME}},
    services::{
        signer::RequestSigner,
        store_client::{DEFAULT_STORE_HOST, StoreClient, StoreEndpoint},
        sync_service::{SyncOptions, SyncService},
    },
};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio::net::TcpListener;

pub const BUCKET: &str = "site";

pub fn credentials() -> Credentials {
    Credentials::new("AKIDTEST", "test-secret")
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub headers: HeaderMap,
}

#[derive(Clone)]
pub struct FakeStore {
    objects: Arc<Mutex<HashMap<String, StoredObject>>>,
    reject: Arc<Mutex<HashSet<String>>>,
    head_status: Arc<Mutex<HashMap<String, StatusCode>>>,
    puts: Arc<AtomicUsize>,
    heads: Arc<AtomicUsize>,
    signer: RequestSigner,
    credentials: Credentials,
}

impl FakeStore {
    /// Start a store on an ephemeral port and return it with its base URL.
    pub async fn spawn() -> (Self, Url) {
        let store = FakeStore {
            objects: Arc::default(),
            reject: Arc::default(),
            head_status: Arc::default(),
            puts: Arc::default(),
            heads: Arc::default(),
            signer: RequestSigner::new(DEFAULT_STORE_HOST),
            credentials: credentials(),
        };

        let app = Router::new()
            .route(
                "/{bucket}/{*key}",
                put(put_object).head(head_object).get(get_object),
            )
            .with_state(store.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });

        let base = Url::parse(&format!("http://{addr}")).expect("base url");
        (store, base)
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn heads(&self) -> usize {
        self.heads.load(Ordering::SeqCst)
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().expect("lock").get(key).cloned()
    }

    /// Answer PUTs for `key` with a 500.
    pub fn reject_key(&self, key: &str) {
        self.reject.lock().expect("lock").insert(key.to_string());
    }

    /// Answer HEADs for `key` with `status` instead of the object.
    pub fn answer_head(&self, key: &str, status: StatusCode) {
        self.head_status
            .lock()
            .expect("lock")
            .insert(key.to_string(), status);
    }

    /// Key → body, for comparing end states.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        self.objects
            .lock()
            .expect("lock")
            .iter()
            .map(|(k, v)| (k.clone(), v.body.clone()))
            .collect()
    }
}

async fn put_object(
    State(store): State<FakeStore>,
    Path((bucket, key)): Path<(String, String)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    store.puts.fetch_add(1, Ordering::SeqCst);
    if bucket != BUCKET {
        return StatusCode::NOT_FOUND;
    }

    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let url = match Url::parse(&format!("http://{host}{}", uri.path())) {
        Ok(url) => url,
        Err(_) => return StatusCode::BAD_REQUEST,
    };
    let mut signed = headers.clone();
    signed.remove(header::AUTHORIZATION);
    let expected = store
        .signer
        .authorization(method.as_str(), &url, &signed, &store.credentials);
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if presented != expected || !headers.contains_key(header::DATE) {
        return StatusCode::FORBIDDEN;
    }

    if store.reject.lock().expect("lock").contains(&key) {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }

    store.objects.lock().expect("lock").insert(
        key,
        StoredObject {
            body: body.to_vec(),
            headers,
        },
    );
    StatusCode::OK
}

async fn head_object(
    State(store): State<FakeStore>,
    Path((_bucket, key)): Path<(String, String)>,
) -> Response {
    store.heads.fetch_add(1, Ordering::SeqCst);
    let forced = store.head_status.lock().expect("lock").get(&key).copied();
    if let Some(status) = forced {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = status;
        return response;
    }
    object_response(&store, &key, false)
}

async fn get_object(
    State(store): State<FakeStore>,
    Path((_bucket, key)): Path<(String, String)>,
) -> Response {
    object_response(&store, &key, true)
}

fn object_response(store: &FakeStore, key: &str, with_body: bool) -> Response {
    let Some(object) = store.object(key) else {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NOT_FOUND;
        return response;
    };

    let len = object.body.len();
    let mut response = if with_body {
        Response::new(Body::from(object.body))
    } else {
        Response::new(Body::empty())
    };
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len as u64));
    for name in [
        header::CONTENT_TYPE.as_str(),
        header::CONTENT_ENCODING.as_str(),
        META_FINGERPRINT,
        META_MODIFIED_TIME,
    ] {
        if let Some(value) = object.headers.get(name) {
            headers.insert(
                header::HeaderName::from_bytes(name.as_bytes()).expect("name"),
                value.clone(),
            );
        }
    }
    response
}

pub fn client_for(base: &Url, credentials: Credentials) -> StoreClient {
    StoreClient::new(
        StoreEndpoint::PathStyle { base: base.clone() },
        RequestSigner::new(DEFAULT_STORE_HOST),
        credentials,
    )
}

pub fn service(base: &Url, options: SyncOptions) -> SyncService {
    SyncService::new(
        client_for(base, credentials()),
        ContentTable::site_defaults(),
        BUCKET,
        options,
    )
}

pub fn write(root: &std::path::Path, relative: &str, bytes: &[u8]) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    std::fs::write(path, bytes).expect("write");
}
