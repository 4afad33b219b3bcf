//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;

use crate::error::{Result, SyncError};
use crate::invoker::RpcTransport;
use crate::protocol::decode_payload;

/// Recording [`RpcTransport`] with scripted replies, failures, latency
/// and an optional gate that holds calls in flight until released.
#[derive(Clone)]
pub struct MockTransport(Arc<MockInner>);

struct MockInner {
    connected: bool,
    calls: Mutex<Vec<(&'static str, Option<Vec<u8>>)>>,
    replies: Mutex<HashMap<&'static str, Vec<u8>>>,
    failures: Mutex<HashMap<&'static str, String>>,
    gate: Option<Arc<Semaphore>>,
    delay: Mutex<Option<Duration>>,
}

impl MockTransport {
    /// Connected transport that echoes parameter bytes back as results.
    pub fn new() -> Self {
        Self::build(true, false)
    }

    /// Transport reporting no usable connection.
    pub fn disconnected() -> Self {
        Self::build(false, false)
    }

    /// Connected transport whose calls block until [`Self::release`].
    pub fn gated() -> Self {
        Self::build(true, true)
    }

    fn build(connected: bool, gated: bool) -> Self {
        Self(Arc::new(MockInner {
            connected,
            calls: Mutex::new(Vec::new()),
            replies: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            gate: gated.then(|| Arc::new(Semaphore::new(0))),
            delay: Mutex::new(None),
        }))
    }

    /// Adds fixed latency to every call.
    pub fn set_delay(&self, delay: Duration) {
        *self.0.delay.lock().unwrap() = Some(delay);
    }

    /// Scripts the result bytes for one method.
    pub fn reply_with(&self, method: &'static str, bytes: Vec<u8>) {
        self.0.replies.lock().unwrap().insert(method, bytes);
    }

    /// Scripts a backend error for one method.
    pub fn fail_method(&self, method: &'static str, message: &str) {
        self.0
            .failures
            .lock()
            .unwrap()
            .insert(method, message.to_string());
    }

    /// Lets `n` gated calls through.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.0.gate {
            gate.add_permits(n);
        }
    }

    /// Methods called so far, in backend receipt order.
    pub fn methods(&self) -> Vec<&'static str> {
        self.0
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(method, _)| *method)
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.0.calls.lock().unwrap().len()
    }

    /// Decodes the parameters of the `i`-th call.
    pub fn decoded_params<T: DeserializeOwned>(&self, i: usize) -> T {
        let calls = self.0.calls.lock().unwrap();
        let (_, params) = calls.get(i).expect("call index out of range");
        decode_payload(params.as_ref().expect("call had no params")).expect("params decode")
    }
}

impl RpcTransport for MockTransport {
    fn call(
        &self,
        method: &'static str,
        params: Option<Vec<u8>>,
    ) -> BoxFuture<'static, Result<Vec<u8>>> {
        let inner = self.0.clone();
        Box::pin(async move {
            inner.calls.lock().unwrap().push((method, params.clone()));
            let delay = *inner.delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(gate) = &inner.gate {
                let permit = gate.acquire().await.map_err(|_| SyncError::Closed)?;
                permit.forget();
            }
            if let Some(message) = inner.failures.lock().unwrap().get(method) {
                return Err(SyncError::Backend(message.clone()));
            }
            if let Some(bytes) = inner.replies.lock().unwrap().get(method) {
                return Ok(bytes.clone());
            }
            Ok(params.unwrap_or_default())
        })
    }

    fn is_connected(&self) -> bool {
        self.0.connected
    }
}
