//! Shared test transport

#![allow(dead_code)]

use async_trait::async_trait;
use dashboard_cache::{ApiError, FetchParams, Method, Transport};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// In-memory API with scripted responses and call counting
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<HashMap<String, Value>>,
    fetch_calls: Mutex<Vec<(String, FetchParams)>>,
    writes: AtomicUsize,
    offline: AtomicBool,
    reject_writes: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, endpoint: &str, body: Value) {
        self.responses
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), body);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_calls.lock().unwrap().len()
    }

    pub fn fetches_of(&self, endpoint: &str) -> usize {
        self.fetch_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| e == endpoint)
            .count()
    }

    pub fn last_params(&self) -> Option<FetchParams> {
        self.fetch_calls
            .lock()
            .unwrap()
            .last()
            .map(|(_, params)| params.clone())
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch(&self, endpoint: &str, params: &FetchParams) -> Result<Value, ApiError> {
        self.fetch_calls
            .lock()
            .unwrap()
            .push((endpoint.to_string(), params.clone()));

        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(ApiError::Network("connection refused".to_string()));
        }
        let response = self.responses.lock().unwrap().get(endpoint).cloned();
        response.ok_or_else(|| ApiError::NotFound(endpoint.to_string()))
    }

    async fn write(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(ApiError::AccessDenied(format!("{} {}", method, endpoint)));
        }
        Ok(json!({ "method": method, "endpoint": endpoint, "body": body }))
    }
}
