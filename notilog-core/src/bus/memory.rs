use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use compact_str::CompactString;
use tokio::sync::{Mutex, broadcast};
use tracing::debug;

use super::{BusChannel, BusError, MessageBus, MessageParameters};

/// Capacity of each exchange's live broadcast.
const EXCHANGE_BUFFER: usize = 1024;

/// Messages kept per exchange for [`InMemoryBus::delivered`].
pub const DEFAULT_RETENTION: usize = 1024;

/// A message as accepted by an in-memory exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredMessage {
    pub exchange: CompactString,
    pub body: Bytes,
    pub parameters: MessageParameters,
}

struct Exchange {
    live: broadcast::Sender<DeliveredMessage>,
    /// The most recently accepted messages, oldest first.
    retained: VecDeque<DeliveredMessage>,
}

impl Exchange {
    fn new() -> Self {
        let (live, _) = broadcast::channel(EXCHANGE_BUFFER);
        Self {
            live,
            retained: VecDeque::new(),
        }
    }

    fn retain(&mut self, message: DeliveredMessage, limit: usize) {
        if limit == 0 {
            return;
        }
        while self.retained.len() >= limit {
            self.retained.pop_front();
        }
        self.retained.push_back(message);
    }
}

type Exchanges = Arc<Mutex<HashMap<CompactString, Exchange>>>;

/// Fan-out bus held in process memory.
///
/// Live subscribers get messages through a broadcast channel. The last
/// `retention` messages of each exchange are also kept so late readers can
/// inspect recent deliveries; older ones are dropped.
#[derive(Clone)]
pub struct InMemoryBus {
    exchanges: Exchanges,
    retention: usize,
    open_channels: Arc<AtomicUsize>,
    opened_total: Arc<AtomicUsize>,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `retention` messages per exchange; 0 keeps none.
    pub fn with_retention(retention: usize) -> Self {
        Self {
            exchanges: Exchanges::default(),
            retention,
            open_channels: Arc::default(),
            opened_total: Arc::default(),
        }
    }

    /// Subscribe to live messages of `exchange`, creating it if needed.
    pub async fn subscribe(&self, exchange: &str) -> broadcast::Receiver<DeliveredMessage> {
        let mut exchanges = self.exchanges.lock().await;
        exchanges
            .entry(CompactString::from(exchange))
            .or_insert_with(Exchange::new)
            .live
            .subscribe()
    }

    /// The retained messages of `exchange`, oldest first.
    pub async fn delivered(&self, exchange: &str) -> Vec<DeliveredMessage> {
        let exchanges = self.exchanges.lock().await;
        exchanges
            .get(exchange)
            .map(|e| e.retained.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Channels opened and not yet released.
    pub fn open_channels(&self) -> usize {
        self.open_channels.load(Ordering::SeqCst)
    }

    /// Channels opened since the bus was created.
    pub fn opened_total(&self) -> usize {
        self.opened_total.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for InMemoryBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBus")
            .field("open_channels", &self.open_channels())
            .finish()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn open_channel(&self, exchange: &str) -> Result<Box<dyn BusChannel>, BusError> {
        self.exchanges
            .lock()
            .await
            .entry(CompactString::from(exchange))
            .or_insert_with(Exchange::new);

        self.open_channels.fetch_add(1, Ordering::SeqCst);
        self.opened_total.fetch_add(1, Ordering::SeqCst);
        debug!(exchange, "Opened in-memory channel");

        Ok(Box::new(InMemoryChannel {
            exchange: CompactString::from(exchange),
            exchanges: self.exchanges.clone(),
            retention: self.retention,
            lease: Some(ChannelLease(self.open_channels.clone())),
        }))
    }
}

/// Decrements the open-channel count when dropped, so a channel abandoned
/// mid-cycle is still released.
struct ChannelLease(Arc<AtomicUsize>);

impl Drop for ChannelLease {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct InMemoryChannel {
    exchange: CompactString,
    exchanges: Exchanges,
    retention: usize,
    lease: Option<ChannelLease>,
}

#[async_trait]
impl BusChannel for InMemoryChannel {
    async fn send(&mut self, body: &Bytes, parameters: &MessageParameters) -> Result<(), BusError> {
        if self.lease.is_none() {
            return Err(BusError::Closed);
        }
        let message = DeliveredMessage {
            exchange: self.exchange.clone(),
            body: body.clone(),
            parameters: parameters.clone(),
        };
        let mut exchanges = self.exchanges.lock().await;
        let exchange = exchanges
            .entry(self.exchange.clone())
            .or_insert_with(Exchange::new);
        exchange.retain(message.clone(), self.retention);
        // No live subscriber is fine.
        let _ = exchange.live.send(message);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BusError> {
        self.lease.take();
        Ok(())
    }
}
