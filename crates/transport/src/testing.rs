//! Scripted transport for tests
//!
//! Responses are queued per URL. A queue with more than one entry is consumed
//! front to back; the last entry stays and answers every later call. URLs with
//! no script answer 404 so a missing route shows up as a failed assertion
//! rather than a hang.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::{HttpRequest, HttpResponse, Result, Transport, TransportError};

#[derive(Debug, Clone)]
enum Scripted {
    Respond(HttpResponse),
    Fail(TransportError),
}

#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<HttpRequest>>,
    delay: Duration,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every response for `delay` so concurrent callers overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn respond(&self, url: &str, status: u16, body: impl Into<String>) {
        self.push(url, Scripted::Respond(HttpResponse::new(status, body)));
    }

    pub fn respond_json(&self, url: &str, status: u16, body: serde_json::Value) {
        self.respond(url, status, body.to_string());
    }

    pub fn fail(&self, url: &str, error: TransportError) {
        self.push(url, Scripted::Fail(error));
    }

    /// Every request received so far, in arrival order.
    pub fn calls(&self) -> Vec<HttpRequest> {
        lock(&self.calls).clone()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        lock(&self.calls).iter().filter(|r| r.url == url).count()
    }

    fn push(&self, url: &str, scripted: Scripted) {
        lock(&self.routes)
            .entry(url.to_string())
            .or_default()
            .push_back(scripted);
    }

    fn next(&self, url: &str) -> Scripted {
        let mut routes = lock(&self.routes);
        match routes.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(not_found),
            Some(queue) => queue.front().cloned().unwrap_or_else(not_found),
            None => not_found(),
        }
    }
}

impl Transport for ScriptedTransport {
    fn send(
        &self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse>> + Send + '_>> {
        Box::pin(async move {
            let url = request.url.clone();
            lock(&self.calls).push(request);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match self.next(&url) {
                Scripted::Respond(response) => Ok(response),
                Scripted::Fail(error) => Err(error),
            }
        })
    }
}

fn not_found() -> Scripted {
    Scripted::Respond(HttpResponse::new(404, "no scripted response"))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
