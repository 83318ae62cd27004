//! In-memory transport double that replays scripted responses and records
//! every request it receives.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::{
    error::TransportError,
    transport::{resolve_url, RequestBody, Transport, TransportRequest, TransportResponse},
};

pub const TEST_BASE_URL: &str = "http://backend.test";

type Reply = Result<TransportResponse, TransportError>;

struct Scripted {
    reply: Reply,
    gate: Option<oneshot::Receiver<()>>,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub body: RequestBody,
}

impl RecordedCall {
    pub fn json_body(&self) -> Option<&Value> {
        match &self.body {
            RequestBody::Json(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<Scripted>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, method: Method, path: &str, scripted: Scripted) {
        self.routes
            .lock()
            .expect("routes lock")
            .entry((method, path.to_string()))
            .or_default()
            .push_back(scripted);
    }

    pub fn reply(&self, method: Method, path: &str, reply: Reply) {
        self.push(method, path, Scripted { reply, gate: None });
    }

    pub fn ok_json(&self, method: Method, path: &str, body: Value) {
        self.reply(method, path, Ok(TransportResponse::json(200, body)));
    }

    pub fn rejected(&self, method: Method, path: &str, status: u16, message: Option<&str>) {
        self.reply(
            method,
            path,
            Err(TransportError::Rejected {
                status,
                server_message: message.map(str::to_string),
            }),
        );
    }

    pub fn unreachable(&self, method: Method, path: &str) {
        self.reply(
            method,
            path,
            Err(TransportError::Unreachable {
                reason: "connection refused".to_string(),
            }),
        );
    }

    /// Scripts a reply that is held back until the returned sender fires.
    pub fn gated(&self, method: Method, path: &str, reply: Reply) -> oneshot::Sender<()> {
        let (release, gate) = oneshot::channel();
        self.push(
            method,
            path,
            Scripted {
                reply,
                gate: Some(gate),
            },
        );
        release
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.method == method && call.path == path)
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        self.calls.lock().expect("calls lock").push(RecordedCall {
            method: request.method.clone(),
            path: request.path.clone(),
            body: request.body.clone(),
        });

        let scripted = self
            .routes
            .lock()
            .expect("routes lock")
            .get_mut(&(request.method.clone(), request.path.clone()))
            .and_then(VecDeque::pop_front);

        let Some(scripted) = scripted else {
            return Err(TransportError::Unreachable {
                reason: format!("no scripted response for {} {}", request.method, request.path),
            });
        };
        if let Some(gate) = scripted.gate {
            let _ = gate.await;
        }
        scripted.reply
    }

    async fn url_for(&self, path: &str) -> Result<String, TransportError> {
        resolve_url(TEST_BASE_URL, path).map(String::from)
    }
}
