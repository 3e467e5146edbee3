//! Live account subscriptions multiplexed over one pubsub websocket.
//!
//! [`SubscriptionTable`] holds the registrations and decides what to send and
//! where inbound frames go. [`SubscriptionManager`] drives a table from a single
//! background task that owns the socket and reconnects on failure. Subscribers
//! only see decoded values; transport errors never reach them.
use std::{
    collections::HashMap,
    str::FromStr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use backoff::{backoff::Backoff, ExponentialBackoff};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use solana_program::pubkey::Pubkey;
use solana_sdk::commitment_config::CommitmentConfig;
use tokio::{
    net::TcpStream,
    sync::{broadcast, watch, Notify},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::{
    account::AccountInfo,
    config::ClientConfig,
    error::{MangoError, MangoResult},
    state::AccountLayout,
};

/// Buffered values per subscription before slow receivers start lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Local handle of a registration, stable across reconnects.
pub type SubscriptionId = u64;

/// Where a registration stands on the current connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// No request on the current connection yet.
    Unsent,
    /// Request sent with this JSON-RPC id, waiting for confirmation.
    Requested(u64),
    /// Confirmed under this transport subscription id.
    Confirmed(u64),
}

/// What an inbound frame did to the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// A subscribe request was accepted.
    #[allow(missing_docs)]
    Confirmed {
        subscription: SubscriptionId,
        transport_id: u64,
    },
    /// A notification was decoded and broadcast.
    #[allow(missing_docs)]
    Published {
        subscription: SubscriptionId,
        slot: u64,
    },
    /// The server answered a request with an error.
    #[allow(missing_docs)]
    Rejected {
        subscription: Option<SubscriptionId>,
        message: String,
    },
    /// Anything else, including notifications for unbound transport ids.
    Ignored,
}

trait AccountPublisher: Send {
    fn publish(&self, info: &AccountInfo) -> MangoResult;
}

type DecodeFn<T> = Box<dyn Fn(&AccountInfo) -> MangoResult<T> + Send + Sync>;

struct TypedPublisher<T> {
    decode: DecodeFn<T>,
    sender: broadcast::Sender<Arc<T>>,
}

impl<T: Send + Sync + 'static> AccountPublisher for TypedPublisher<T> {
    fn publish(&self, info: &AccountInfo) -> MangoResult {
        let value = (self.decode)(info)?;
        // no live receivers is not a failure
        let _ = self.sender.send(Arc::new(value));
        Ok(())
    }
}

struct Subscription {
    id: SubscriptionId,
    address: Pubkey,
    state: SubscriptionState,
    publisher: Box<dyn AccountPublisher>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Inbound {
    Confirmation {
        id: u64,
        result: u64,
    },
    Failure {
        id: Option<u64>,
        error: RpcErrorBody,
    },
    Notification {
        method: String,
        params: NotificationParams,
    },
    Other(serde::de::IgnoredAny),
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct NotificationParams {
    result: NotificationResult,
    subscription: u64,
}

#[derive(Deserialize)]
struct NotificationResult {
    context: NotificationContext,
    value: NotifiedAccount,
}

#[derive(Deserialize)]
struct NotificationContext {
    slot: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotifiedAccount {
    data: (String, String),
    executable: bool,
    lamports: u64,
    owner: String,
    rent_epoch: u64,
}

impl NotifiedAccount {
    fn into_account_info(self, address: Pubkey) -> MangoResult<AccountInfo> {
        // always requested as base64
        let (payload, _encoding) = self.data;
        let owner =
            Pubkey::from_str(&self.owner).map_err(|_| MangoError::InvalidPubkey(self.owner))?;
        Ok(AccountInfo {
            address,
            owner,
            executable: self.executable,
            lamports: self.lamports,
            rent_epoch: self.rent_epoch,
            data: STANDARD.decode(payload)?,
        })
    }
}

/// Registrations and their binding to the current connection.
pub struct SubscriptionTable {
    commitment: CommitmentConfig,
    channel_capacity: usize,
    next_subscription_id: SubscriptionId,
    next_request_id: u64,
    subscriptions: Vec<Subscription>,
    /// transport subscription id -> index in `subscriptions`
    bindings: HashMap<u64, usize>,
}

impl SubscriptionTable {
    /// An empty table requesting notifications at `commitment`.
    pub fn new(commitment: CommitmentConfig) -> Self {
        SubscriptionTable {
            commitment,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            next_subscription_id: 0,
            next_request_id: 0,
            subscriptions: vec![],
            bindings: HashMap::new(),
        }
    }

    /// Buffer size of the channels created by later registrations, at least 1.
    pub fn with_channel_capacity(mut self, channel_capacity: usize) -> Self {
        self.channel_capacity = channel_capacity.max(1);
        self
    }

    /// Number of registrations.
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// `None` for an unknown id.
    pub fn state(&self, subscription: SubscriptionId) -> Option<SubscriptionState> {
        self.subscriptions
            .iter()
            .find(|s| s.id == subscription)
            .map(|s| s.state)
    }

    /// Every notification for `address` is run through `decode` and the result
    /// is sent to the returned receiver and its clones.
    pub fn register<T, F>(
        &mut self,
        address: Pubkey,
        decode: F,
    ) -> (SubscriptionId, broadcast::Receiver<Arc<T>>)
    where
        T: Send + Sync + 'static,
        F: Fn(&AccountInfo) -> MangoResult<T> + Send + Sync + 'static,
    {
        let (sender, receiver) = broadcast::channel(self.channel_capacity);
        self.next_subscription_id += 1;
        let id = self.next_subscription_id;
        self.subscriptions.push(Subscription {
            id,
            address,
            state: SubscriptionState::Unsent,
            publisher: Box::new(TypedPublisher {
                decode: Box::new(decode),
                sender,
            }),
        });
        (id, receiver)
    }

    /// Like [`Self::register`], decoding with `T`'s layout.
    pub fn register_layout<T>(
        &mut self,
        address: Pubkey,
    ) -> (SubscriptionId, broadcast::Receiver<Arc<T>>)
    where
        T: AccountLayout + Send + Sync + 'static,
    {
        self.register(address, |info: &AccountInfo| info.decode::<T>())
    }

    /// Serialized `accountSubscribe` requests for every unsent registration.
    /// The registrations are marked as requested.
    pub fn take_unsent_requests(&mut self) -> Vec<String> {
        let commitment = self.commitment.commitment;
        let mut requests = vec![];
        for subscription in self.subscriptions.iter_mut() {
            if subscription.state != SubscriptionState::Unsent {
                continue;
            }
            self.next_request_id += 1;
            let request_id = self.next_request_id;
            subscription.state = SubscriptionState::Requested(request_id);
            let request = json!({
                "jsonrpc": "2.0",
                "id": request_id,
                "method": "accountSubscribe",
                "params": [
                    subscription.address.to_string(),
                    {"encoding": "base64", "commitment": commitment}
                ]
            });
            requests.push(request.to_string());
        }
        requests
    }

    /// Applies one inbound text frame. A payload the registered decoder rejects
    /// is returned as an error; the table stays usable.
    pub fn handle_message(&mut self, text: &str) -> MangoResult<Dispatch> {
        match serde_json::from_str::<Inbound>(text)? {
            Inbound::Confirmation { id, result } => Ok(self.confirm(id, result)),
            Inbound::Failure { id, error } => {
                let subscription = id
                    .and_then(|id| self.requested(id))
                    .map(|index| self.subscriptions[index].id);
                warn!(
                    ?subscription,
                    code = error.code,
                    reason = %error.message,
                    "subscribe request rejected"
                );
                Ok(Dispatch::Rejected {
                    subscription,
                    message: error.message,
                })
            }
            Inbound::Notification { method, params } if method == "accountNotification" => {
                self.publish(params)
            }
            Inbound::Notification { .. } | Inbound::Other(_) => Ok(Dispatch::Ignored),
        }
    }

    fn requested(&self, request_id: u64) -> Option<usize> {
        self.subscriptions
            .iter()
            .position(|s| s.state == SubscriptionState::Requested(request_id))
    }

    fn confirm(&mut self, request_id: u64, transport_id: u64) -> Dispatch {
        let index = match self.requested(request_id) {
            Some(index) => index,
            None => return Dispatch::Ignored,
        };
        let subscription = &mut self.subscriptions[index];
        subscription.state = SubscriptionState::Confirmed(transport_id);
        self.bindings.insert(transport_id, index);
        debug!(
            subscription = subscription.id,
            address = %subscription.address,
            transport_id,
            "subscription confirmed"
        );
        Dispatch::Confirmed {
            subscription: subscription.id,
            transport_id,
        }
    }

    fn publish(&self, params: NotificationParams) -> MangoResult<Dispatch> {
        let subscription = match self.bindings.get(&params.subscription) {
            Some(&index) => &self.subscriptions[index],
            None => {
                debug!(transport_id = params.subscription, "notification for unknown subscription");
                return Ok(Dispatch::Ignored);
            }
        };
        let slot = params.result.context.slot;
        let info = params.result.value.into_account_info(subscription.address)?;
        subscription.publisher.publish(&info)?;
        debug!(subscription = subscription.id, slot, "published account update");
        Ok(Dispatch::Published {
            subscription: subscription.id,
            slot,
        })
    }

    /// Forgets the current connection. Registrations are kept and will be
    /// requested again.
    pub fn reset_bindings(&mut self) {
        self.bindings.clear();
        for subscription in self.subscriptions.iter_mut() {
            subscription.state = SubscriptionState::Unsent;
        }
    }

    /// Drops every publisher, closing all receivers.
    pub fn dispose_all(&mut self) {
        self.bindings.clear();
        self.subscriptions.clear();
    }
}

fn lock(table: &Mutex<SubscriptionTable>) -> MutexGuard<'_, SubscriptionTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the websocket task. Dropping the manager stops the task without
/// waiting for it; [`Self::dispose`] also waits.
pub struct SubscriptionManager {
    table: Arc<Mutex<SubscriptionTable>>,
    wake: Arc<Notify>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SubscriptionManager {
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: &ClientConfig) -> Self {
        let table = Arc::new(Mutex::new(SubscriptionTable::new(config.commitment)));
        let wake = Arc::new(Notify::new());
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(
            config.ws_url.clone(),
            Arc::clone(&table),
            Arc::clone(&wake),
            shutdown_rx,
            config.reconnect_max_backoff,
        ));
        SubscriptionManager {
            table,
            wake,
            shutdown,
            task: Some(task),
        }
    }

    /// Register with the running task. The request goes out on the current
    /// connection, or on the next one.
    pub fn register<T, F>(&self, address: Pubkey, decode: F) -> broadcast::Receiver<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: Fn(&AccountInfo) -> MangoResult<T> + Send + Sync + 'static,
    {
        let (_, receiver) = lock(&self.table).register(address, decode);
        self.wake.notify_one();
        receiver
    }

    /// Like [`Self::register`], decoding with `T`'s layout.
    pub fn register_layout<T>(&self, address: Pubkey) -> broadcast::Receiver<Arc<T>>
    where
        T: AccountLayout + Send + Sync + 'static,
    {
        let (_, receiver) = lock(&self.table).register_layout::<T>(address);
        self.wake.notify_one();
        receiver
    }

    /// Number of registrations.
    pub fn subscription_count(&self) -> usize {
        lock(&self.table).len()
    }

    /// Stops the task, waits for it and closes every subscriber channel.
    pub async fn dispose(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                warn!(%error, "subscription task ended abnormally");
            }
        }
        lock(&self.table).dispose_all();
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// Retries forever; no single delay is longer than `max_backoff`.
fn reconnect_backoff(max_backoff: Duration) -> ExponentialBackoff {
    let initial_interval = max_backoff.min(Duration::from_millis(500));
    ExponentialBackoff {
        initial_interval,
        current_interval: initial_interval,
        max_interval: max_backoff,
        max_elapsed_time: None,
        ..Default::default()
    }
}

async fn run(
    ws_url: String,
    table: Arc<Mutex<SubscriptionTable>>,
    wake: Arc<Notify>,
    mut shutdown: watch::Receiver<bool>,
    max_backoff: Duration,
) {
    let mut backoff = reconnect_backoff(max_backoff);
    loop {
        if *shutdown.borrow() {
            break;
        }
        let connection = tokio::select! {
            result = connect_async(ws_url.as_str()) => result,
            _ = shutdown.changed() => break,
        };
        match connection {
            Ok((stream, _response)) => {
                info!(%ws_url, "subscription transport connected");
                backoff.reset();
                match serve(stream, &table, &wake, &mut shutdown).await {
                    Ok(()) => break,
                    Err(error) => warn!(%error, "subscription transport failed"),
                }
            }
            Err(error) => warn!(%ws_url, %error, "subscription transport connect failed"),
        }

        lock(&table).reset_bindings();
        let delay = backoff
            .next_backoff()
            .map_or(max_backoff, |delay| delay.min(max_backoff));
        warn!(delay_ms = delay.as_millis() as u64, "reconnecting");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            result = shutdown.changed() => {
                if result.is_err() {
                    break;
                }
            }
        }
    }
    debug!("subscription task stopped");
}

/// Returns `Ok` only when shutdown was requested.
async fn serve(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    table: &Mutex<SubscriptionTable>,
    wake: &Notify,
    shutdown: &mut watch::Receiver<bool>,
) -> MangoResult {
    let (mut write, mut read) = stream.split();
    loop {
        let requests = lock(table).take_unsent_requests();
        for request in requests {
            write.send(Message::Text(request)).await?;
        }

        tokio::select! {
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if let Err(error) = lock(table).handle_message(&text) {
                        warn!(%error, "skipping account notification");
                    }
                }
                Some(Ok(Message::Ping(payload))) => write.send(Message::Pong(payload)).await?,
                Some(Ok(Message::Close(frame))) => {
                    warn!(?frame, "subscription transport closed by peer");
                    return Err(MangoError::TransportClosed);
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => return Err(error.into()),
                None => return Err(MangoError::TransportClosed),
            },
            _ = wake.notified() => {}
            result = shutdown.changed() => {
                if result.is_err() || *shutdown.borrow() {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
            }
        }
    }
}
