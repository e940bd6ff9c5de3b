//! Reactive projection of a cached read for UI-style consumers.
//!
//! A [`ResourceBinding`] owns at most one in-flight read. Its state is
//! published on a `tokio::sync::watch` channel so any number of observers
//! can follow loading, data and error without polling.

use crate::cache::ReadOptions;
use crate::error::ApiError;
use crate::resource::ResourceType;
use crate::session::CacheSession;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// What a binding reads for one dependency value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundRequest {
    pub endpoint: String,
    pub options: ReadOptions,
}

impl BoundRequest {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            options: ReadOptions::new(),
        }
    }

    pub fn with_options(mut self, options: ReadOptions) -> Self {
        self.options = options;
        self
    }
}

/// Snapshot published to observers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingState {
    /// A read for the current dependencies has not settled yet
    pub loading: bool,

    /// Last payload delivered; kept while reloading and after a failure
    pub data: Option<Value>,

    /// Failure of the most recent read; cleared by the next success or
    /// when new deps are watched
    pub error: Option<ApiError>,

    /// `data` came from an expired entry because the fetch failed
    pub was_stale: bool,
}

type RequestFn<D> = dyn Fn(&D) -> BoundRequest + Send + Sync;

/// Keeps one resource view in sync with an explicit dependency value.
///
/// Reads go through the session under whatever role it holds when the read
/// is issued.
pub struct ResourceBinding<D> {
    session: Arc<CacheSession>,
    resource_type: ResourceType,
    request_for: Box<RequestFn<D>>,
    deps: Option<D>,
    generation: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
    state: Arc<watch::Sender<BindingState>>,
}

impl<D> ResourceBinding<D>
where
    D: PartialEq,
{
    pub fn new(
        session: Arc<CacheSession>,
        resource_type: ResourceType,
        request_for: impl Fn(&D) -> BoundRequest + Send + Sync + 'static,
    ) -> Self {
        let (state, _) = watch::channel(BindingState::default());
        Self {
            session,
            resource_type,
            request_for: Box::new(request_for),
            deps: None,
            generation: Arc::new(AtomicU64::new(0)),
            task: None,
            state: Arc::new(state),
        }
    }

    /// Point the binding at `deps`.
    ///
    /// Issues one read per distinct value. Repeating the current value does
    /// nothing, whether its read is still running or already settled.
    pub fn watch(&mut self, deps: D) {
        if self.deps.as_ref() == Some(&deps) {
            return;
        }
        self.deps = Some(deps);
        self.issue(false);
    }

    /// Re-read the current dependencies, bypassing fresh cache entries.
    /// Does nothing before the first [`watch`](Self::watch).
    pub fn refresh(&mut self) {
        if self.deps.is_some() {
            self.issue(true);
        }
    }

    pub fn deps(&self) -> Option<&D> {
        self.deps.as_ref()
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn state(&self) -> BindingState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BindingState> {
        self.state.subscribe()
    }

    fn issue(&mut self, force_refresh: bool) {
        let Some(deps) = self.deps.as_ref() else {
            return;
        };
        let mut request = (self.request_for)(deps);
        if force_refresh {
            request.options.force_refresh = true;
        }

        if let Some(task) = self.task.take() {
            task.abort();
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_modify(|state| {
            state.loading = true;
            // A failure belongs to the deps that produced it; a refresh of
            // the same deps keeps it visible until the retry settles
            if !force_refresh {
                state.error = None;
            }
        });

        debug!(
            resource_type = %self.resource_type,
            endpoint = %request.endpoint,
            generation,
            force_refresh,
            "Binding read issued"
        );

        let session = Arc::clone(&self.session);
        let current = Arc::clone(&self.generation);
        let state = Arc::clone(&self.state);
        let resource_type = self.resource_type;

        self.task = Some(tokio::spawn(async move {
            let BoundRequest { endpoint, options } = request;
            let result = session
                .cached_get_with_status(resource_type, &endpoint, options)
                .await;

            // Checked under the channel lock so a newer issue() cannot
            // interleave between the check and the update
            state.send_if_modified(|state| {
                if current.load(Ordering::SeqCst) != generation {
                    return false;
                }
                state.loading = false;
                match result {
                    Ok(read) => {
                        state.was_stale = read.was_stale();
                        state.data = Some(read.into_value());
                        state.error = None;
                    }
                    Err(e) => state.error = Some(e),
                }
                true
            });
        }));
    }
}

impl<D> Drop for ResourceBinding<D> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl<D: std::fmt::Debug> std::fmt::Debug for ResourceBinding<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceBinding")
            .field("resource_type", &self.resource_type)
            .field("deps", &self.deps)
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .finish()
    }
}
