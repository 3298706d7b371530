// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! The build worker: single-slot cycle scheduling and result publishing.
//!
//! A worker owns one [`BuildContext`]. Update requests are scheduled into a
//! single slot: submitting a new request aborts the cycle in flight. Every
//! cycle gets a monotonic id, and a result is only published when no newer
//! cycle has already published one.
//!
//! Published results go to every subscriber through a broadcast channel;
//! the latest one is kept for subscribers that connect later.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::cycle::{run_cycle, BuildContext, CycleConfig, CycleOutcome};
use crate::error::Result;
use crate::intercept::{AssetInterceptor, InterceptedAsset};
use crate::protocol::{HostMessage, HostRequest, WorkerMessage};
use crate::tools::DependencyLoader;
use crate::types::{BuildOptions, BuildResult};

/// Capacity of the result broadcast channel.
const CHANNEL_CAPACITY: usize = 16;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

struct Inner {
    ctx: tokio::sync::Mutex<BuildContext>,
    loader: DependencyLoader,
    config: CycleConfig,
    interceptor: RwLock<AssetInterceptor>,
    latest: Mutex<Option<(u64, BuildResult)>>,
    next_id: AtomicU64,
    in_flight: Mutex<Option<JoinHandle<()>>>,
    sender: broadcast::Sender<Arc<WorkerMessage>>,
}

/// A cloneable handle to the build worker.
#[derive(Clone)]
pub struct Worker {
    inner: Arc<Inner>,
}

impl Worker {
    /// Creates a worker with an empty build context.
    pub fn new(loader: DependencyLoader, config: CycleConfig) -> Self {
        Self::with_context(loader, config, BuildContext::default())
    }

    /// Creates a worker around an existing build context.
    pub fn with_context(loader: DependencyLoader, config: CycleConfig, ctx: BuildContext) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                ctx: tokio::sync::Mutex::new(ctx),
                loader,
                config,
                interceptor: RwLock::new(AssetInterceptor::new()),
                latest: Mutex::new(None),
                next_id: AtomicU64::new(0),
                in_flight: Mutex::new(None),
                sender,
            }),
        }
    }

    /// Subscribes to published results. Returns the latest published result
    /// along with the receiver.
    pub fn subscribe(&self) -> (Option<BuildResult>, broadcast::Receiver<Arc<WorkerMessage>>) {
        let latest = lock(&self.inner.latest);
        let receiver = self.inner.sender.subscribe();
        (latest.as_ref().map(|(_, result)| result.clone()), receiver)
    }

    /// Latest published result.
    pub fn latest(&self) -> Option<BuildResult> {
        lock(&self.inner.latest).as_ref().map(|(_, result)| result.clone())
    }

    /// Schedules a cycle, aborting the one in flight. Returns the cycle id.
    pub fn submit(&self, version: impl Into<String>, options: BuildOptions) -> u64 {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let version = version.into();

        let mut slot = lock(&self.inner.in_flight);
        if let Some(previous) = slot.take() {
            if !previous.is_finished() {
                tracing::debug!("aborting cycle superseded by cycle {}", id);
            }
            previous.abort();
        }

        let inner = self.inner.clone();
        *slot = Some(tokio::spawn(async move {
            inner.run(id, &version, &options).await;
        }));
        id
    }

    /// Runs a cycle on the current task and publishes its result.
    pub async fn run_cycle_now(&self, version: &str, options: &BuildOptions) -> CycleOutcome {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.run(id, version, options).await
    }

    /// Handles one inbound host message.
    ///
    /// An invalid piggybacked location is reported after the request in the
    /// same message has been dispatched.
    pub fn handle_message(&self, text: &str) -> Result<()> {
        let message = HostMessage::parse(text)?;
        let located = match message.location {
            Some(location) => self.set_location(&location),
            None => Ok(()),
        };
        if let Some(HostRequest::Update { version, options }) = message.request {
            self.submit(version, options);
        }
        located
    }

    /// Updates the tracked iframe location.
    pub fn set_location(&self, location: &str) -> Result<()> {
        self.inner
            .interceptor
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .set_location(location)
    }

    /// Answers a result-frame request from the last completed build.
    pub fn intercept(&self, request_url: &str) -> Option<InterceptedAsset> {
        self.inner
            .interceptor
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .intercept(request_url)
    }
}

impl Inner {
    async fn run(&self, id: u64, version: &str, options: &BuildOptions) -> CycleOutcome {
        let (outcome, core_version) = {
            let mut ctx = self.ctx.lock().await;
            let outcome = run_cycle(&mut ctx, &self.loader, version, options, &self.config).await;
            let core_version = ctx.tools.as_ref().map(|tools| tools.core.version.clone());
            (outcome, core_version)
        };
        self.publish(id, &outcome, core_version);
        outcome
    }

    fn publish(&self, id: u64, outcome: &CycleOutcome, core_version: Option<String>) -> bool {
        let mut latest = lock(&self.latest);
        if let Some((published, _)) = latest.as_ref() {
            if *published > id {
                tracing::debug!("dropping result of cycle {}, cycle {} already published", id, published);
                return false;
            }
        }

        if outcome.is_completed() {
            self.interceptor
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .replace_modules(outcome.result.client_modules.clone(), core_version.unwrap_or_default());
        }

        *latest = Some((id, outcome.result.clone()));
        let receivers = self
            .sender
            .send(Arc::new(WorkerMessage::Result(outcome.result.clone())))
            .unwrap_or(0);
        tracing::info!("published cycle {} ({}) to {} client(s)", id, outcome.state, receivers);
        true
    }
}
