//! # HTTP Transport
//!
//! Request/response transport for nodes that cannot join the gossip overlay.
//!
//! ## Receiving
//!
//! An axum server accepts `POST /` with a JSON array of envelopes. Each
//! envelope is verified and allow-list checked; accepted ones are delivered
//! per topic. The response carries the number accepted, or `400` for a
//! malformed body.
//!
//! ## Sending
//!
//! Broadcasts are sealed and queued into the current batch. A flush ticker
//! posts the batch to every consumer from the address book. Recipients are
//! fixed when a batch opens: consumers that appear later get the next batch,
//! consumers that disappeared before the flush are skipped.

use crate::domain::{AllowList, InboundFilter, Sealer, TopicHub};
use crate::errors::TransportError;
use crate::ports::{AddressBook, Subscription, Transport};
use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use os_supervisor::Ticker;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use shared_crypto::Signer;
use shared_types::{Address, Envelope, Lifecycle, Message, ReceivedMessage, Service, ServiceError, TopicSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const SUBSYSTEM: &str = "webapi";

// =============================================================================
// Configuration
// =============================================================================

/// The `transport.webapi` config block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WebApiConfig {
    pub listen_addr: String,
    /// SOCKS5 proxy for outgoing requests; empty for direct connections.
    pub socks5_proxy_addr: String,
    pub ethereum_key: Option<String>,
    /// Seconds between batch flushes.
    pub flush_interval: u64,
    /// Request timeout in seconds.
    pub timeout: u64,
    pub feeds: Vec<Address>,
    pub feeds_filter_disable: bool,
    pub ethereum_address_book: Option<EthereumAddressBookConfig>,
    pub static_address_book: Option<StaticAddressBookConfig>,
}

impl Default for WebApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            socks5_proxy_addr: String::new(),
            ethereum_key: None,
            flush_interval: 60,
            timeout: 30,
            feeds: Vec::new(),
            feeds_filter_disable: false,
            ethereum_address_book: None,
            static_address_book: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EthereumAddressBookConfig {
    pub contract_addr: Address,
    /// Name of an `ethereum.client` block.
    pub ethereum_client: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StaticAddressBookConfig {
    pub addresses: Vec<String>,
}

/// Runtime dependencies of a [`WebApiTransport`].
pub struct WebApiOptions {
    pub listen_addr: SocketAddr,
    pub socks5_proxy_addr: Option<String>,
    pub timeout: Duration,
    pub flush_interval: Duration,
    pub signer: Option<Arc<dyn Signer>>,
    pub allow: AllowList,
    pub topics: TopicSet,
    pub address_book: Arc<dyn AddressBook>,
}

/// HTTP client with the configured timeout and optional SOCKS5 proxy.
pub fn http_client(timeout: Duration, socks5_proxy_addr: Option<&str>) -> Result<reqwest::Client, TransportError> {
    let mut builder = reqwest::Client::builder().timeout(timeout);
    if let Some(proxy) = socks5_proxy_addr.filter(|p| !p.is_empty()) {
        let proxy = reqwest::Proxy::all(format!("socks5h://{proxy}"))
            .map_err(|e| TransportError::Validation(format!("socks5_proxy_addr: {e}")))?;
        builder = builder.proxy(proxy);
    }
    builder
        .build()
        .map_err(|e| TransportError::Construction(e.to_string()))
}

// =============================================================================
// Transport
// =============================================================================

/// Body returned by `POST /`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveResponse {
    pub accepted: usize,
}

struct Batch {
    envelopes: Vec<Envelope>,
    recipients: Vec<String>,
}

/// Outgoing batch and the means to deliver it.
struct Outbox {
    client: reqwest::Client,
    address_book: Arc<dyn AddressBook>,
    batch: Mutex<Option<Batch>>,
}

impl Outbox {
    async fn enqueue(&self, envelope: Envelope) -> Result<(), TransportError> {
        let mut batch = self.batch.lock().await;
        if batch.is_none() {
            let recipients = self.address_book.consumers().await?;
            *batch = Some(Batch {
                envelopes: Vec::new(),
                recipients,
            });
        }
        if let Some(open) = batch.as_mut() {
            open.envelopes.push(envelope);
        }
        Ok(())
    }

    /// Send the current batch. Returns the number of consumers reached.
    async fn flush(&self) -> usize {
        let Some(batch) = self.batch.lock().await.take() else {
            return 0;
        };
        let current = match self.address_book.consumers().await {
            Ok(current) => current,
            Err(err) => {
                warn!(error = %err, kind = "TransientFailure", "Address book unavailable, using batch recipients");
                batch.recipients.clone()
            }
        };

        let mut delivered = 0;
        for url in batch.recipients.iter().filter(|url| current.contains(url)) {
            let result = self
                .client
                .post(url)
                .json(&batch.envelopes)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status);
            match result {
                Ok(_) => delivered += 1,
                Err(err) => warn!(
                    consumer = %url,
                    error = %err,
                    kind = "TransientFailure",
                    "Failed to deliver batch"
                ),
            }
        }
        debug!(
            messages = batch.envelopes.len(),
            consumers = delivered,
            "Batch flushed"
        );
        delivered
    }
}

#[derive(Clone)]
struct ServerState {
    filter: InboundFilter,
    hub: Arc<TopicHub>,
}

async fn receive(
    State(state): State<ServerState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    body: Bytes,
) -> Result<Json<ReceiveResponse>, (StatusCode, String)> {
    let envelopes: Vec<Envelope> =
        serde_json::from_slice(&body).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    let mut accepted = 0;
    for envelope in envelopes {
        match state.filter.check(&envelope) {
            Ok(()) => {
                state.hub.publish(ReceivedMessage::new(envelope, remote.to_string()));
                accepted += 1;
            }
            Err(rejection) => debug!(remote = %remote, %rejection, "Dropping envelope"),
        }
    }
    Ok(Json(ReceiveResponse { accepted }))
}

pub struct WebApiTransport {
    lifecycle: Arc<Lifecycle>,
    listen_addr: SocketAddr,
    bound_addr: RwLock<Option<SocketAddr>>,
    flush_interval: Duration,
    sealer: Sealer,
    filter: InboundFilter,
    hub: Arc<TopicHub>,
    outbox: Arc<Outbox>,
}

impl WebApiTransport {
    pub fn new(options: WebApiOptions) -> Result<Self, TransportError> {
        let client = http_client(options.timeout, options.socks5_proxy_addr.as_deref())?;
        let sealer = Sealer::new(options.signer, options.topics.clone());
        let allow = Arc::new(options.allow.with_signer(sealer.address()));
        Ok(Self {
            lifecycle: Arc::new(Lifecycle::new(SUBSYSTEM)),
            listen_addr: options.listen_addr,
            bound_addr: RwLock::new(None),
            flush_interval: options.flush_interval,
            hub: Arc::new(TopicHub::new(&options.topics)),
            filter: InboundFilter::new(options.topics, allow),
            sealer,
            outbox: Arc::new(Outbox {
                client,
                address_book: options.address_book,
                batch: Mutex::new(None),
            }),
        })
    }

    /// The bound server address, once started.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.bound_addr.read()
    }

    /// Send the pending batch now. Returns the number of consumers reached.
    pub async fn flush_now(&self) -> usize {
        self.outbox.flush().await
    }

    fn router(&self) -> Router {
        Router::new().route("/", post(receive)).with_state(ServerState {
            filter: self.filter.clone(),
            hub: Arc::clone(&self.hub),
        })
    }
}

#[async_trait]
impl Service for WebApiTransport {
    fn name(&self) -> &str {
        self.lifecycle.name()
    }

    async fn start(&self, ctx: CancellationToken) -> Result<(), ServiceError> {
        self.lifecycle.begin()?;
        let listener = match TcpListener::bind(self.listen_addr).await {
            Ok(listener) => listener,
            Err(err) => {
                let err = ServiceError::runtime(SUBSYSTEM, format!("bind {}: {err}", self.listen_addr));
                self.lifecycle.finish(Err(err.clone()));
                return Err(err);
            }
        };
        let local = listener.local_addr().unwrap_or(self.listen_addr);
        *self.bound_addr.write() = Some(local);
        info!(addr = %local, "HTTP transport listening");

        let router = self.router();
        let server_ctx = ctx.clone();
        let server = tokio::spawn(async move {
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { server_ctx.cancelled().await })
            .await
        });

        let ticker = Ticker::new(self.flush_interval);
        ticker.start(ctx.clone());
        let outbox = Arc::clone(&self.outbox);
        let flusher = tokio::spawn(async move {
            while ticker.recv().await.is_some() {
                outbox.flush().await;
            }
            outbox.flush().await;
        });

        let hub = Arc::clone(&self.hub);
        let task = tokio::spawn(async move {
            let served = server.await;
            if let Err(err) = flusher.await {
                warn!(error = %err, "Flush task failed");
            }
            hub.close();
            match served {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(ServiceError::runtime(SUBSYSTEM, err)),
                Err(err) => Err(ServiceError::runtime(SUBSYSTEM, err)),
            }
        });
        self.lifecycle.finish_with(task);
        Ok(())
    }

    async fn wait(&self) -> Result<(), ServiceError> {
        self.lifecycle.wait().await
    }
}

#[async_trait]
impl Transport for WebApiTransport {
    async fn broadcast(&self, topic: &str, message: Message) -> Result<(), TransportError> {
        let envelope = self.sealer.seal(topic, message)?;
        self.outbox.enqueue(envelope).await
    }

    fn messages(&self, topic: &str) -> Subscription {
        self.hub.subscribe(topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::StaticAddressBook;
    use shared_crypto::EthereumKey;
    use shared_types::{default_topics, TOPIC_PRICE};

    fn options(book: Arc<dyn AddressBook>, signer: Option<Arc<dyn Signer>>, allow: AllowList) -> WebApiOptions {
        WebApiOptions {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            socks5_proxy_addr: None,
            timeout: Duration::from_secs(5),
            flush_interval: Duration::ZERO,
            signer,
            allow,
            topics: default_topics(),
            address_book: book,
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = WebApiConfig::default();
        assert_eq!(config.flush_interval, 60);
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_socks_proxy_client() {
        assert!(http_client(Duration::from_secs(1), Some("127.0.0.1:9050")).is_ok());
        assert!(http_client(Duration::from_secs(1), Some("")).is_ok());
    }

    #[tokio::test]
    async fn test_malformed_body_rejected() {
        let transport =
            WebApiTransport::new(options(Arc::new(StaticAddressBook::default()), None, AllowList::default())).unwrap();
        let ctx = CancellationToken::new();
        transport.start(ctx.clone()).await.unwrap();
        let addr = transport.local_addr().unwrap();

        let response = reqwest::Client::new()
            .post(format!("http://{addr}/"))
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

        ctx.cancel();
        transport.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_unlisted_author_not_accepted() {
        let receiver =
            WebApiTransport::new(options(Arc::new(StaticAddressBook::default()), None, AllowList::default())).unwrap();
        let ctx = CancellationToken::new();
        receiver.start(ctx.clone()).await.unwrap();
        let addr = receiver.local_addr().unwrap();

        let key: Arc<dyn Signer> = Arc::new(EthereumKey::generate());
        let envelope = shared_crypto::seal(key.as_ref(), TOPIC_PRICE, Message::new("1")).unwrap();
        let response: ReceiveResponse = reqwest::Client::new()
            .post(format!("http://{addr}/"))
            .json(&vec![envelope])
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(response, ReceiveResponse { accepted: 0 });
        ctx.cancel();
    }
}
