//! In-process [`Transport`] with scripted answers and completion order.
//!
//! Routes are keyed by URL host. When a completion order is set, a call for
//! the host at rank `k` only finishes after `k` other calls have finished,
//! which lets tests pin the order in which the scheduler sees completions.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use batchfetch_core::options::TransportOptions;
use batchfetch_core::transport::{Transport, TransportError, TransportResponse};
use tokio::sync::Notify;

/// What the transport does for one host.
#[derive(Debug, Clone)]
pub enum Script {
    Respond { status: u16, body: Vec<u8> },
    Refuse,
    Hang,
    Panic,
}

impl Script {
    pub fn ok(body: &str) -> Self {
        Self::Respond {
            status: 200,
            body: body.as_bytes().to_vec(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self::Respond {
            status,
            body: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    finished: usize,
    in_flight: usize,
    max_in_flight: usize,
    calls: Vec<TransportOptions>,
}

#[derive(Debug, Default)]
pub struct ScriptedTransport {
    routes: HashMap<String, Script>,
    order: Vec<String>,
    delay: Duration,
    state: Mutex<State>,
    finished: Notify,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, host: &str, script: Script) -> Self {
        self.routes.insert(host.to_string(), script);
        self
    }

    /// Hosts in the order their calls must finish.
    pub fn finish_order(mut self, hosts: &[&str]) -> Self {
        self.order = hosts.iter().map(|h| (*h).to_string()).collect();
        self
    }

    /// Time every call spends in flight before answering.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<TransportOptions> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.lock().unwrap().max_in_flight
    }

    /// Hosts in the order calls were started.
    pub fn launched_hosts(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|options| options.url.as_deref().map(host_of))
            .collect()
    }

    async fn wait_for_turn(&self, host: &str) {
        let Some(rank) = self.order.iter().position(|h| h == host) else {
            return;
        };
        loop {
            let notified = self.finished.notified();
            if self.state.lock().unwrap().finished >= rank {
                return;
            }
            notified.await;
        }
    }

    fn finish(&self) {
        {
            let mut state = self.state.lock().unwrap();
            state.finished += 1;
            state.in_flight -= 1;
        }
        self.finished.notify_waiters();
    }
}

pub fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default()
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn perform(
        &self,
        options: &TransportOptions,
    ) -> Result<TransportResponse, TransportError> {
        {
            let mut state = self.state.lock().unwrap();
            state.calls.push(options.clone());
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
        }

        let Some(url) = options.url.as_deref() else {
            self.finish();
            return Err(TransportError::MissingUrl);
        };
        let host = host_of(url);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.wait_for_turn(&host).await;

        let script = self
            .routes
            .get(&host)
            .cloned()
            .unwrap_or_else(|| Script::ok(&host));
        let result = match script {
            Script::Respond { status, body } => Ok(TransportResponse::with_body(status, body)),
            Script::Refuse => Err(TransportError::connection(url, "connection refused")),
            Script::Hang => std::future::pending().await,
            Script::Panic => panic!("scripted transport panic for {host}"),
        };
        self.finish();
        result
    }
}
