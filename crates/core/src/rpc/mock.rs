//! In-memory transports for exercising channels, submitters and resolvers
//! without a node.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::transport::{Connect, RpcTransport};
use crate::{error::Error, Result};

enum MockFrame {
    Text(String),
    Close,
}

pub struct MockTransport {
    outbound: mpsc::UnboundedSender<String>,
    inbound: mpsc::UnboundedReceiver<MockFrame>,
}

/// The node side of a [`MockTransport`].
pub struct MockRemote {
    requests: mpsc::UnboundedReceiver<String>,
    responses: mpsc::UnboundedSender<MockFrame>,
}

pub fn mock_pair() -> (MockTransport, MockRemote) {
    let (outbound, requests) = mpsc::unbounded_channel();
    let (responses, inbound) = mpsc::unbounded_channel();
    (
        MockTransport { outbound, inbound },
        MockRemote {
            requests,
            responses,
        },
    )
}

#[async_trait]
impl RpcTransport for MockTransport {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.outbound
            .send(text)
            .map_err(|_| Error::Send("mock remote hung up".to_owned()))
    }

    async fn next_text(&mut self) -> Option<Result<String>> {
        match self.inbound.recv().await? {
            MockFrame::Text(text) => Some(Ok(text)),
            MockFrame::Close => None,
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.inbound.close();
        Ok(())
    }
}

impl MockRemote {
    /// Next request the client sent, decoded. `None` once the client is gone.
    pub async fn next_request(&mut self) -> Option<Value> {
        let text = self.requests.recv().await?;
        serde_json::from_str(&text).ok()
    }

    pub fn reply(&self, text: impl Into<String>) {
        let _ = self.responses.send(MockFrame::Text(text.into()));
    }

    pub fn reply_result(&self, id: u64, result: Value) {
        self.reply(json!({ "jsonrpc": "2.0", "id": id, "result": result }).to_string());
    }

    pub fn reply_error(&self, id: u64, code: i64, message: &str) {
        self.reply(
            json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } })
                .to_string(),
        );
    }

    /// Replies with `fields` merged into a bare `{"jsonrpc", "id"}` envelope.
    pub fn reply_with(&self, id: u64, fields: Value) {
        let mut frame = json!({ "jsonrpc": "2.0", "id": id });
        if let (Some(envelope), Value::Object(extra)) = (frame.as_object_mut(), fields) {
            envelope.extend(extra);
        }
        self.reply(frame.to_string());
    }

    pub fn close(&self) {
        let _ = self.responses.send(MockFrame::Close);
    }
}

/// A request as seen by a [`MockConnector`] handler.
#[derive(Clone, Debug)]
pub struct MockRequest {
    pub id: u64,
    pub method: String,
    pub params: Value,
    /// Zero-based index of the connection that carried the request.
    pub connection: usize,
    /// How many identical (method, params) requests arrived before this one.
    pub seen: usize,
}

#[derive(Clone, Debug)]
pub enum MockReply {
    Result(Value),
    Error { code: i64, message: String },
    /// Fields sent as-is next to `jsonrpc` and `id`, for nonstandard replies.
    Raw(Value),
}

impl MockReply {
    pub fn error(message: impl Into<String>) -> Self {
        MockReply::Error {
            code: -32000,
            message: message.into(),
        }
    }
}

type Handler = dyn Fn(&MockRequest) -> Option<MockReply> + Send + Sync;

#[derive(Default)]
struct MockState {
    requests: Vec<MockRequest>,
    seen: HashMap<String, usize>,
}

/// Scripted node: every connection it opens is served by the same handler.
/// A handler returning `None` leaves the request unanswered.
#[derive(Clone)]
pub struct MockConnector {
    handler: Arc<Handler>,
    state: Arc<Mutex<MockState>>,
    connections: Arc<AtomicUsize>,
    failed_connects: usize,
    close_after: HashMap<usize, usize>,
}

impl MockConnector {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&MockRequest) -> Option<MockReply> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            state: Default::default(),
            connections: Default::default(),
            failed_connects: 0,
            close_after: HashMap::new(),
        }
    }

    /// The first `n` connection attempts fail.
    pub fn failing_first_connects(mut self, n: usize) -> Self {
        self.failed_connects = n;
        self
    }

    /// Connection number `connection` is closed by the node once it has
    /// answered `responses` requests.
    pub fn close_after(mut self, connection: usize, responses: usize) -> Self {
        self.close_after.insert(connection, responses);
        self
    }

    /// Connection attempts so far, including failed ones.
    pub fn connect_attempts(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<MockRequest> {
        self.state.lock().expect("mock state poisoned").requests.clone()
    }

    pub fn requests_on(&self, connection: usize) -> Vec<MockRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.connection == connection)
            .collect()
    }

    fn record(&self, raw: &Value, connection: usize) -> Option<MockRequest> {
        let id = raw.get("id")?.as_u64()?;
        let method = raw.get("method")?.as_str()?.to_owned();
        let params = raw.get("params").cloned().unwrap_or(Value::Null);
        let mut guard = self.state.lock().expect("mock state poisoned");
        let state = &mut *guard;
        let seen = state
            .seen
            .entry(format!("{method}:{params}"))
            .or_insert(0);
        let request = MockRequest {
            id,
            method,
            params,
            connection,
            seen: *seen,
        };
        *seen += 1;
        state.requests.push(request.clone());
        Some(request)
    }

    async fn serve(self, mut remote: MockRemote, connection: usize) {
        let limit = self.close_after.get(&connection).copied();
        let mut answered = 0;
        while let Some(raw) = remote.next_request().await {
            let Some(request) = self.record(&raw, connection) else {
                continue;
            };
            match (self.handler)(&request) {
                Some(MockReply::Result(result)) => remote.reply_result(request.id, result),
                Some(MockReply::Error { code, message }) => {
                    remote.reply_error(request.id, code, &message)
                }
                Some(MockReply::Raw(fields)) => remote.reply_with(request.id, fields),
                None => continue,
            }
            answered += 1;
            if limit == Some(answered) {
                remote.close();
                return;
            }
        }
    }
}

#[async_trait]
impl Connect for MockConnector {
    type Transport = MockTransport;

    async fn connect(&self) -> Result<MockTransport> {
        let connection = self.connections.fetch_add(1, Ordering::SeqCst);
        if connection < self.failed_connects {
            return Err(Error::Connection(format!(
                "mock refused connection #{connection}"
            )));
        }
        let (transport, remote) = mock_pair();
        let served = connection - self.failed_connects;
        tokio::spawn(self.clone().serve(remote, served));
        Ok(transport)
    }

    fn endpoint(&self) -> String {
        "mock://node".to_owned()
    }
}
