//! Scripted in-memory transport shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use resilient_fetch::client::RequestDescriptor;
use resilient_fetch::transport::{Transport, TransportError, TransportResponse};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// One scripted reply: wait `delay`, then answer with `result`.
#[derive(Debug, Clone)]
pub struct Step {
    pub delay: Duration,
    pub result: Result<Value, TransportError>,
}

impl Step {
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

pub fn ok(body: Value) -> Step {
    Step {
        delay: Duration::ZERO,
        result: Ok(body),
    }
}

pub fn status(code: u16) -> Step {
    Step {
        delay: Duration::ZERO,
        result: Err(TransportError::Http {
            status: code,
            message: format!("scripted {}", code),
        }),
    }
}

pub fn network(message: &str) -> Step {
    Step {
        delay: Duration::ZERO,
        result: Err(TransportError::Network(message.to_string())),
    }
}

pub fn timed_out() -> Step {
    Step {
        delay: Duration::ZERO,
        result: Err(TransportError::Timeout(Duration::from_secs(30))),
    }
}

#[derive(Debug, Clone)]
pub struct Call {
    pub descriptor: RequestDescriptor,
    pub at: Instant,
}

impl Call {
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.descriptor.params.as_ref().and_then(|p| p.get(name))
    }
}

pub struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    repeat: Option<Step>,
    honor_cancel: bool,
    calls: Mutex<Vec<Call>>,
    cancelled: AtomicUsize,
}

impl ScriptedTransport {
    /// Replies in order; once exhausted every call answers `null`.
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            repeat: None,
            honor_cancel: true,
            calls: Mutex::new(Vec::new()),
            cancelled: AtomicUsize::new(0),
        }
    }

    /// Every call gets the same reply.
    pub fn always(step: Step) -> Self {
        Self {
            repeat: Some(step),
            ..Self::new(Vec::new())
        }
    }

    /// Behave like a transport that cannot be aborted: the reply always arrives.
    pub fn ignoring_cancellation(mut self) -> Self {
        self.honor_cancel = false;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn cancelled_count(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Step {
        if let Some(step) = &self.repeat {
            return step.clone();
        }
        self.steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ok(Value::Null))
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        request: &RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<TransportResponse, TransportError> {
        self.calls.lock().unwrap().push(Call {
            descriptor: request.clone(),
            at: Instant::now(),
        });
        let step = self.next_step();

        if self.honor_cancel {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.cancelled.fetch_add(1, Ordering::SeqCst);
                    return Err(TransportError::Cancelled);
                }
                _ = tokio::time::sleep(step.delay) => {}
            }
        } else {
            tokio::time::sleep(step.delay).await;
        }
        step.result.map(TransportResponse::ok)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
