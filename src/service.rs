//! Service wiring: builds every component from one [`Config`] and runs them.
//!
//! Teardown order matters: the worker is stopped (and its in-flight event
//! allowed to finish) before the HTTP listener closes.

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{error, info};

use crate::api::{self, AuthGate};
use crate::chat::ChatHandler;
use crate::codec::Codec;
use crate::config::Config;
use crate::delivery::discord::DiscordSink;
use crate::delivery::{Delivery, MessageSink};
use crate::error::{Error, Result};
use crate::model::{Event, WorkerState};
use crate::payload::catalog::{CatalogLookup, FlaskfarmCatalog};
use crate::payload::release::PatternParser;
use crate::payload::PayloadBuilder;
use crate::relay::worker::Pipeline;
use crate::relay::{EventSink, RelayQueue, RelayWorker, WorkerHandle};

pub struct RelayService {
    queue: RelayQueue,
    worker: RelayWorker,
    chat: Arc<ChatHandler>,
    gate: AuthGate,
    addr: String,
}

impl RelayService {
    /// Wire the production collaborators: Discord REST and the catalog API.
    pub fn from_config(config: &Config) -> Result<Self> {
        let sink = Arc::new(DiscordSink::new(&config.chat)?);
        let catalog = Arc::new(FlaskfarmCatalog::new(&config.catalog)?);
        Self::with_collaborators(config, sink, catalog)
    }

    /// Wire with caller-provided message sink and catalog.
    pub fn with_collaborators(
        config: &Config,
        sink: Arc<dyn MessageSink>,
        catalog: Arc<dyn CatalogLookup>,
    ) -> Result<Self> {
        let codec = Codec::new(&config.broadcast.encrypt.key)?;
        let delivery = Delivery::new(sink, config.destinations().to_vec(), config.retry_policy());
        let builder = PayloadBuilder::new(
            config.payload.clone(),
            Arc::new(PatternParser),
            catalog,
            config.catalog.timeout(),
        );

        let (queue, receiver) = RelayQueue::new();
        let worker = RelayWorker::new(receiver, Pipeline::new(builder, codec, delivery.clone()));
        let chat = Arc::new(ChatHandler::new(
            &config.chat.command,
            &config.broadcast.source,
            &config.payload,
            Arc::new(queue.clone()),
            delivery,
        ));

        Ok(Self {
            queue,
            worker,
            chat,
            gate: AuthGate::new(&config.api.keys),
            addr: format!("{}:{}", config.api.host, config.api.port),
        })
    }

    pub fn queue(&self) -> RelayQueue {
        self.queue.clone()
    }

    /// Handler the chat connection feeds incoming messages to.
    pub fn chat(&self) -> Arc<ChatHandler> {
        Arc::clone(&self.chat)
    }

    pub fn router(&self) -> Router {
        api::router(Arc::new(self.queue.clone()), self.gate.clone())
    }

    pub fn worker(&self) -> WorkerHandle {
        self.worker.handle()
    }

    pub fn worker_state(&self) -> WorkerState {
        self.worker.state()
    }

    /// Start the relay worker. A second call is a no-op and returns `false`.
    pub fn start(&mut self) -> bool {
        self.worker.start()
    }

    /// Stop the worker, waiting for its in-flight event.
    pub async fn stop(&mut self) {
        self.worker.stop().await;
    }

    /// Run worker and HTTP listener until `shutdown` resolves.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let listener = TcpListener::bind(&self.addr)
            .await
            .map_err(|e| Error::Other(format!("cannot bind {}: {e}", self.addr)))?;
        self.run_on(listener, shutdown).await
    }

    pub async fn run_on(
        mut self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()>,
    ) -> Result<()> {
        self.start();

        let http_stop = Arc::new(Notify::new());
        let stop = Arc::clone(&http_stop);
        let server = tokio::spawn(api::serve(listener, self.router(), async move {
            stop.notified().await;
        }));

        shutdown.await;
        info!("shutdown requested");

        self.worker.stop().await;
        http_stop.notify_one();
        match server.await {
            Ok(result) => result?,
            Err(e) => error!("http server task failed: {e}"),
        }
        info!("relay service stopped");
        Ok(())
    }
}

impl EventSink for RelayService {
    fn push_event(&self, event: Event) -> Result<()> {
        self.queue.push(event)
    }
}
