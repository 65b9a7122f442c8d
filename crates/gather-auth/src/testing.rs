//! Test doubles shared by the unit tests in this crate.

use crate::transport::{ApiRequest, ApiResponse, Transport, TransportError};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use gather_storage::{SecureStorage, StorageError, StorageResult};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

/// In-memory secure storage that records operations and can be told to fail
/// each primitive.
pub(crate) struct MemoryStorage {
    data: Mutex<HashMap<String, String>>,
    ops: Mutex<Vec<String>>,
    fail_adds: Mutex<bool>,
    fail_reads: Mutex<bool>,
    fail_removes: Mutex<bool>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
            ops: Mutex::new(Vec::new()),
            fail_adds: Mutex::new(false),
            fail_reads: Mutex::new(false),
            fail_removes: Mutex::new(false),
        }
    }

    pub fn recorded_ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    pub fn clear_ops(&self) {
        self.ops.lock().unwrap().clear();
    }

    pub fn set_fail_adds(&self, fail: bool) {
        *self.fail_adds.lock().unwrap() = fail;
    }

    pub fn set_fail_reads(&self, fail: bool) {
        *self.fail_reads.lock().unwrap() = fail;
    }

    pub fn set_fail_removes(&self, fail: bool) {
        *self.fail_removes.lock().unwrap() = fail;
    }
}

impl SecureStorage for MemoryStorage {
    fn add(&self, key: &str, value: &str) -> StorageResult<()> {
        self.ops.lock().unwrap().push(format!("add:{key}"));
        if *self.fail_adds.lock().unwrap() {
            return Err(StorageError::Add("injected add failure".to_string()));
        }
        self.data
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.ops.lock().unwrap().push(format!("get:{key}"));
        if *self.fail_reads.lock().unwrap() {
            return Err(StorageError::Read("injected read failure".to_string()));
        }
        Ok(self.data.lock().unwrap().get(key).cloned())
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        self.ops.lock().unwrap().push(format!("remove:{key}"));
        if *self.fail_removes.lock().unwrap() {
            return Err(StorageError::Remove("injected remove failure".to_string()));
        }
        Ok(self.data.lock().unwrap().remove(key).is_some())
    }
}

// Shared handle so tests can keep inspecting storage they handed to a store.
// A local newtype is needed because the orphan rule forbids implementing the
// foreign `SecureStorage` trait directly for `Arc<MemoryStorage>` in this crate.
pub(crate) struct SharedStorage(pub Arc<MemoryStorage>);

impl SecureStorage for SharedStorage {
    fn add(&self, key: &str, value: &str) -> StorageResult<()> {
        self.0.as_ref().add(key, value)
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.0.as_ref().get(key)
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        self.0.as_ref().remove(key)
    }
}

type TransportHandler =
    dyn Fn(ApiRequest) -> BoxFuture<'static, Result<ApiResponse, TransportError>> + Send + Sync;

/// Scripted transport: every exchange runs through a caller-supplied handler.
pub(crate) struct FakeTransport {
    handler: Box<TransportHandler>,
}

impl FakeTransport {
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(ApiRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ApiResponse, TransportError>> + Send + 'static,
    {
        Self {
            handler: Box::new(move |request| handler(request).boxed()),
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        (self.handler)(request).await
    }
}

/// Response carrying a JSON body.
pub(crate) fn json_response(status: u16, body: serde_json::Value) -> ApiResponse {
    ApiResponse {
        status,
        headers: vec![("Content-Type".to_string(), "application/json".to_string())],
        body: body.to_string().into_bytes(),
    }
}

/// Response with an empty body.
pub(crate) fn status_response(status: u16) -> ApiResponse {
    ApiResponse {
        status,
        headers: Vec::new(),
        body: Vec::new(),
    }
}

/// Backend-shaped error response with validation metadata.
pub(crate) fn error_response(status: u16, metadata: &[&str]) -> ApiResponse {
    json_response(
        status,
        serde_json::json!({
            "code": 1000,
            "message": "request rejected",
            "metadata": metadata,
        }),
    )
}

/// The bearer token attached to a request, if any.
pub(crate) fn bearer_of(request: &ApiRequest) -> Option<String> {
    request
        .header("Authorization")
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}
