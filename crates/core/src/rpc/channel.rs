use std::{
    collections::HashMap,
    fmt::{Debug, Display},
    hash::Hash,
    time::{Duration, Instant},
};

use alloy::rpc::json_rpc::{Id, Request};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::transport::{Connect, RpcTransport};
use crate::{error::Error, Result};

pub type RequestId = u64;

/// An in-flight request, keyed by the caller's logical identity (nonce, tx hash).
#[derive(Clone, Debug)]
pub struct PendingRequest<K> {
    pub id: RequestId,
    pub key: K,
    pub method: String,
    pub params: Value,
    pub sent_at: Instant,
}

/// The `error` object of a JSON-RPC response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcFailure {
    pub code: i64,
    pub message: String,
}

impl RpcFailure {
    /// `code` defaults to 0; a missing `message` falls back to the raw object.
    fn from_error_object(error: &Value) -> Self {
        if let Some(message) = error.as_str() {
            return Self {
                code: 0,
                message: message.to_owned(),
            };
        }
        Self {
            code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .map_or_else(|| error.to_string(), str::to_owned),
        }
    }
}

impl Display for RpcFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

#[derive(Clone, Debug)]
pub struct MatchedResponse<K> {
    pub id: RequestId,
    pub key: K,
    pub method: String,
    pub result: std::result::Result<Value, RpcFailure>,
    pub latency: Duration,
}

/// Multiplexes many logical requests over one connection and routes each
/// response back to the request that produced it, purely by request id.
///
/// Ids start at 1 and only grow; a retired id is never handed out again.
/// A logical key may have at most one request in flight at a time.
pub struct CorrelationChannel<T, K> {
    transport: T,
    next_id: RequestId,
    pending: HashMap<RequestId, PendingRequest<K>>,
    by_key: HashMap<K, RequestId>,
    closed: bool,
}

impl<T, K> CorrelationChannel<T, K>
where
    T: RpcTransport,
    K: Clone + Eq + Hash + Debug + Display,
{
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            next_id: 1,
            pending: HashMap::new(),
            by_key: HashMap::new(),
            closed: false,
        }
    }

    pub async fn open<C>(connector: &C) -> Result<Self>
    where
        C: Connect<Transport = T>,
    {
        let transport = connector.connect().await?;
        debug!("opened channel to {}", connector.endpoint());
        Ok(Self::new(transport))
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.by_key.contains_key(key)
    }

    /// Transmits a request without waiting for its reply.
    pub async fn send(&mut self, method: &str, params: Value, key: K) -> Result<RequestId> {
        if self.closed {
            return Err(Error::Send("channel is closed".to_owned()));
        }
        if self.by_key.contains_key(&key) {
            return Err(Error::KeyInFlight(key.to_string()));
        }

        let id = self.next_id;
        self.next_id += 1;
        let request = Request::new(method.to_owned(), Id::Number(id), params.clone());
        let text = serde_json::to_string(&request)?;

        if let Err(e) = self.transport.send_text(text).await {
            self.closed = true;
            return Err(e);
        }

        self.by_key.insert(key.clone(), id);
        self.pending.insert(
            id,
            PendingRequest {
                id,
                key,
                method: method.to_owned(),
                params,
                sent_at: Instant::now(),
            },
        );
        Ok(id)
    }

    /// Waits for the next inbound message and matches it to its request.
    ///
    /// Returns `Ok(None)` as soon as `cancel` fires. Unknown ids and undecodable
    /// frames come back as [`Error::UnmatchedResponse`] / [`Error::MalformedResponse`];
    /// the channel stays usable after either.
    pub async fn receive_one(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<MatchedResponse<K>>> {
        if self.closed {
            return Err(Error::Connection("channel is closed".to_owned()));
        }
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            frame = self.transport.next_text() => frame,
        };
        match frame {
            Some(Ok(text)) => self.match_response(&text).map(Some),
            Some(Err(e)) if e.is_protocol() => Err(e),
            Some(Err(e)) => {
                self.closed = true;
                Err(e)
            }
            None => {
                self.closed = true;
                Err(Error::Connection("connection closed by remote".to_owned()))
            }
        }
    }

    /// Decodes leniently: only a numeric `id` is required. Once the id
    /// belongs to a pending request the request is retired, and a reply with
    /// neither `result` nor a usable `error` comes back as a failure so the
    /// owner can resend.
    fn match_response(&mut self, text: &str) -> Result<MatchedResponse<K>> {
        let frame: Value = serde_json::from_str(text)
            .map_err(|e| Error::MalformedResponse(format!("{e}: {text}")))?;
        let id = frame
            .get("id")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::MalformedResponse(format!("expected a numeric id: {text}")))?;
        let pending = self
            .pending
            .remove(&id)
            .ok_or(Error::UnmatchedResponse(id))?;
        self.by_key.remove(&pending.key);

        let result = match (frame.get("error"), frame.get("result")) {
            (Some(error), _) if !error.is_null() => Err(RpcFailure::from_error_object(error)),
            (_, Some(result)) => Ok(result.clone()),
            _ => Err(RpcFailure {
                code: 0,
                message: format!("response has neither result nor error: {text}"),
            }),
        };
        Ok(MatchedResponse {
            id,
            key: pending.key,
            method: pending.method,
            result,
            latency: pending.sent_at.elapsed(),
        })
    }

    /// Forgets an in-flight request; a late reply for it is reported as unmatched.
    pub fn abandon(&mut self, id: RequestId) -> Option<PendingRequest<K>> {
        let pending = self.pending.remove(&id)?;
        self.by_key.remove(&pending.key);
        Some(pending)
    }

    /// Releases the connection. Requests still in flight are returned and
    /// must be treated as never answered.
    pub async fn close(mut self) -> Vec<PendingRequest<K>> {
        if !self.closed {
            if let Err(e) = self.transport.close().await {
                debug!("error while closing channel: {e}");
            }
        }
        let mut dropped = self.pending.into_values().collect::<Vec<_>>();
        dropped.sort_by_key(|p| p.id);
        dropped
    }
}
