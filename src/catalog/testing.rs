//! Scripted transport for tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use super::client::{HttpResponse, HttpTransport, TransportError};

/// One scripted reaction to a request.
#[derive(Debug, Clone)]
pub enum Step {
  Respond(u16, Value),
  Fail(&'static str),
  /// Never answers
  Hang,
  Delay(Duration, Box<Step>),
}

impl Step {
  pub fn json(body: Value) -> Self {
    Step::Respond(200, body)
  }

  pub fn status(status: u16) -> Self {
    Step::Respond(status, Value::Null)
  }

  pub fn delayed(delay: Duration, step: Step) -> Self {
    Step::Delay(delay, Box::new(step))
  }
}

/// Answers requests from per-URL scripts. Steps are consumed in order and the
/// last step of a script repeats; unknown URLs get a 404.
#[derive(Default)]
pub struct FakeTransport {
  routes: Mutex<HashMap<String, VecDeque<Step>>>,
  calls: Mutex<Vec<(String, Instant)>>,
}

impl FakeTransport {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn route(&self, url: &str, step: Step) {
    self
      .routes
      .lock()
      .unwrap()
      .entry(url.to_string())
      .or_default()
      .push_back(step);
  }

  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().iter().map(|(u, _)| u.clone()).collect()
  }

  pub fn calls_to(&self, url: &str) -> usize {
    self.calls.lock().unwrap().iter().filter(|(u, _)| u == url).count()
  }

  pub fn call_times(&self) -> Vec<Instant> {
    self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
  }

  fn next_step(&self, url: &str) -> Option<Step> {
    let mut routes = self.routes.lock().unwrap();
    let script = routes.get_mut(url)?;
    if script.len() > 1 {
      script.pop_front()
    } else {
      script.front().cloned()
    }
  }
}

#[async_trait]
impl HttpTransport for FakeTransport {
  async fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
    self
      .calls
      .lock()
      .unwrap()
      .push((url.to_string(), Instant::now()));

    let mut step = self.next_step(url).unwrap_or_else(|| Step::status(404));
    loop {
      match step {
        Step::Respond(status, body) => {
          return Ok(HttpResponse {
            status,
            body: serde_json::to_vec(&body).unwrap(),
          })
        }
        Step::Fail(msg) => return Err(TransportError(msg.to_string())),
        Step::Hang => return std::future::pending().await,
        Step::Delay(delay, inner) => {
          tokio::time::sleep(delay).await;
          step = *inner;
        }
      }
    }
  }
}
