//! JSON-RPC request/response correlation
//!
//! Requests get monotonically increasing numeric ids. A single dispatch task
//! consumes inbound frames in order: responses settle their pending call,
//! notifications run every subscribed handler inline, and agent requests are
//! answered through the [`AgentClient`] delegate.

use super::protocol::{self, methods, Envelope};
use super::traits::AgentClient;
use super::transport::{Inbound, InboundReceiver, Transport};
use crate::error::{AcpError, Error, Result};
use crate::types::{
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
    RequestPermissionParams, RequestPermissionResult,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

/// Handler invoked for each notification of a subscribed method
pub type NotificationHandler = Arc<dyn Fn(&JsonRpcNotification) + Send + Sync>;

/// Handler invoked once when the connection terminates
pub type DisconnectHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// One-shot completion for a pending call. Settling twice is a no-op.
struct ResultSlot(Option<oneshot::Sender<Result<Value>>>);

impl ResultSlot {
    fn settle(&mut self, outcome: Result<Value>) -> bool {
        match self.0.take() {
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }
}

struct PendingCall {
    method: String,
    slot: ResultSlot,
}

#[derive(Default)]
struct PendingTable {
    calls: HashMap<u64, PendingCall>,
    /// Set once the connection terminated
    closed: Option<String>,
}

#[derive(Default)]
struct Registry {
    next_token: u64,
    notifications: HashMap<String, Vec<(u64, NotificationHandler)>>,
    disconnect: Vec<(u64, DisconnectHandler)>,
}

impl Registry {
    fn token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }
}

enum SubscriptionKind {
    Notification(String),
    Disconnect,
}

/// Keeps a handler registered; dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    token: u64,
    kind: SubscriptionKind,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = registry.lock();
        match &self.kind {
            SubscriptionKind::Notification(method) => {
                if let Some(handlers) = registry.notifications.get_mut(method) {
                    handlers.retain(|(token, _)| *token != self.token);
                    if handlers.is_empty() {
                        registry.notifications.remove(method);
                    }
                }
            }
            SubscriptionKind::Disconnect => {
                registry.disconnect.retain(|(token, _)| *token != self.token);
            }
        }
    }
}

struct Inner {
    transport: Transport,
    pending: Mutex<PendingTable>,
    registry: Arc<Mutex<Registry>>,
    next_id: AtomicU64,
    delegate: Arc<dyn AgentClient>,
}

/// Correlating JSON-RPC client over a [`Transport`]
pub struct RpcClient {
    inner: Arc<Inner>,
    default_timeout: Option<Duration>,
    dispatch: JoinHandle<()>,
}

impl RpcClient {
    /// Start dispatching the transport's inbound frames.
    pub fn new(
        transport: Transport,
        inbound: InboundReceiver,
        delegate: Arc<dyn AgentClient>,
        default_timeout: Option<Duration>,
    ) -> Self {
        let inner = Arc::new(Inner {
            transport,
            pending: Mutex::new(PendingTable::default()),
            registry: Arc::new(Mutex::new(Registry::default())),
            next_id: AtomicU64::new(1),
            delegate,
        });
        let dispatch = tokio::spawn(dispatch_loop(Arc::clone(&inner), inbound));
        Self {
            inner,
            default_timeout,
            dispatch,
        }
    }

    pub fn transport(&self) -> &Transport {
        &self.inner.transport
    }

    /// Terminated connections reject every new call.
    pub fn is_closed(&self) -> bool {
        self.inner.pending.lock().closed.is_some()
    }

    /// Number of calls awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.lock().calls.len()
    }

    /// Send a request and wait for its response, using the default timeout.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.call_with_timeout(method, params, self.default_timeout)
            .await
    }

    /// Send a request and wait at most `timeout` for its response.
    ///
    /// On expiry the call fails with `Timeout` and a late response is
    /// discarded; the connection is unaffected.
    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let frame = protocol::encode(&Envelope::Request(JsonRpcRequest::new(id, method, params)))?;

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.inner.pending.lock();
            if let Some(reason) = &pending.closed {
                return Err(Error::Acp(AcpError::Transport(reason.clone())));
            }
            pending.calls.insert(
                id,
                PendingCall {
                    method: method.to_string(),
                    slot: ResultSlot(Some(tx)),
                },
            );
        }

        debug!("Sending request {} method={}", id, method);
        if let Err(e) = self.inner.transport.send(frame).await {
            self.inner.pending.lock().calls.remove(&id);
            return Err(e);
        }

        let settled = match timeout {
            Some(after) => match tokio::time::timeout(after, rx).await {
                Ok(settled) => settled,
                Err(_) => {
                    self.inner.pending.lock().calls.remove(&id);
                    warn!("Request {} ({}) timed out after {:?}", id, method, after);
                    return Err(Error::Acp(AcpError::Timeout {
                        method: method.to_string(),
                        after,
                    }));
                }
            },
            None => rx.await,
        };

        settled.map_err(|_| {
            Error::Acp(AcpError::Transport(
                "response channel closed".to_string(),
            ))
        })?
    }

    /// Send a notification; no response is expected.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        if let Some(reason) = &self.inner.pending.lock().closed {
            return Err(Error::Acp(AcpError::Transport(reason.clone())));
        }
        let frame = protocol::encode(&Envelope::Notification(JsonRpcNotification::new(
            method, params,
        )))?;
        debug!("Sending notification {}", method);
        self.inner.transport.send(frame).await
    }

    /// Run `handler` for every notification of `method`, in arrival order,
    /// until the returned guard is dropped.
    pub fn subscribe(&self, method: &str, handler: NotificationHandler) -> Subscription {
        let mut registry = self.inner.registry.lock();
        let token = registry.token();
        registry
            .notifications
            .entry(method.to_string())
            .or_default()
            .push((token, handler));
        Subscription {
            registry: Arc::downgrade(&self.inner.registry),
            token,
            kind: SubscriptionKind::Notification(method.to_string()),
        }
    }

    /// Run `handler` once when the connection terminates.
    pub fn on_disconnect(&self, handler: DisconnectHandler) -> Subscription {
        let mut registry = self.inner.registry.lock();
        let token = registry.token();
        registry.disconnect.push((token, handler));
        Subscription {
            registry: Arc::downgrade(&self.inner.registry),
            token,
            kind: SubscriptionKind::Disconnect,
        }
    }

    /// Stop the transport and fail every pending call.
    pub async fn stop(&self) {
        self.inner.transport.stop().await;
        self.inner.shutdown("connection stopped");
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.dispatch.abort();
    }
}

impl Inner {
    /// Mark the connection closed, notify disconnect handlers, then settle
    /// every pending call with a transport error. Runs at most once.
    fn shutdown(&self, reason: &str) {
        let drained = {
            let mut pending = self.pending.lock();
            if pending.closed.is_some() {
                return;
            }
            pending.closed = Some(reason.to_string());
            std::mem::take(&mut pending.calls)
        };

        debug!(
            "Connection terminated ({}), failing {} pending calls",
            reason,
            drained.len()
        );

        let handlers: Vec<DisconnectHandler> = self
            .registry
            .lock()
            .disconnect
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler(reason);
        }

        for (id, mut call) in drained {
            trace!("Failing request {} ({})", id, call.method);
            call.slot
                .settle(Err(Error::Acp(AcpError::Transport(reason.to_string()))));
        }
    }

    fn handle_response(&self, response: JsonRpcResponse) {
        let Some(id) = response.id.as_ref().and_then(RequestId::as_u64) else {
            debug!("Discarding response without a numeric id: {:?}", response.id);
            return;
        };

        let call = self.pending.lock().calls.remove(&id);
        let Some(mut call) = call else {
            debug!("Discarding response for unknown request {}", id);
            return;
        };

        let outcome = match (response.error, response.result) {
            (Some(error), _) => Err(Error::Acp(AcpError::Agent {
                code: error.code,
                message: error.message,
                data: error.data,
            })),
            (None, result) => Ok(result.unwrap_or(Value::Null)),
        };

        debug!("Delivering response for request {} ({})", id, call.method);
        call.slot.settle(outcome);
    }

    fn handle_notification(&self, notification: JsonRpcNotification) {
        let handlers: Vec<NotificationHandler> = self
            .registry
            .lock()
            .notifications
            .get(&notification.method)
            .map(|handlers| handlers.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        if handlers.is_empty() {
            trace!("No subscriber for notification {}", notification.method);
            return;
        }
        for handler in handlers {
            handler(&notification);
        }
    }

    /// Answer a request the agent sent us.
    async fn answer(&self, request: &JsonRpcRequest) -> std::result::Result<Value, JsonRpcError> {
        match request.method.as_str() {
            methods::SESSION_REQUEST_PERMISSION => {
                let params: RequestPermissionParams =
                    serde_json::from_value(request.params.clone().unwrap_or(Value::Null))
                        .map_err(JsonRpcError::invalid_params)?;
                let outcome = self
                    .delegate
                    .request_permission(params)
                    .await
                    .map_err(JsonRpcError::internal)?;
                serde_json::to_value(RequestPermissionResult { outcome })
                    .map_err(JsonRpcError::internal)
            }
            other => self.delegate.handle_request(other, request.params.clone()).await,
        }
    }
}

fn spawn_agent_request(inner: &Arc<Inner>, request: JsonRpcRequest) {
    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        debug!("Agent request {} method={}", request.id, request.method);
        let response = match inner.answer(&request).await {
            Ok(result) => JsonRpcResponse::success(request.id.clone(), result),
            Err(error) => {
                debug!(
                    "Rejecting agent request {}: {} ({})",
                    request.method, error.message, error.code
                );
                JsonRpcResponse::failure(request.id.clone(), error)
            }
        };

        let frame = match protocol::encode(&Envelope::Response(response)) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to encode response to {}: {}", request.method, e);
                return;
            }
        };
        if let Err(e) = inner.transport.send(frame).await {
            error!("Failed to send response to {}: {}", request.method, e);
        }
    });
}

async fn dispatch_loop(inner: Arc<Inner>, mut inbound: InboundReceiver) {
    let reason = loop {
        let frame = match inbound.recv().await {
            Some(Inbound::Frame(frame)) => frame,
            Some(Inbound::Closed(reason)) => break reason,
            None => break "transport dropped".to_string(),
        };

        match protocol::decode(&frame) {
            Ok(Envelope::Response(response)) => inner.handle_response(response),
            Ok(Envelope::Notification(notification)) => inner.handle_notification(notification),
            Ok(Envelope::Request(request)) => spawn_agent_request(&inner, request),
            Err(e) => {
                let snippet: String = frame.chars().take(200).collect();
                warn!("Dropping malformed frame ({}): {}", e, snippet);
            }
        }
    };

    inner.shutdown(&reason);
}
