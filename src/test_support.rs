//! Test doubles shared by the unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult, ErrorCode};
use crate::http::{HttpRequest, HttpResponse, NetworkExecutor, TransportFailure};
use crate::pin::{Pin, PinRemote};
use crate::store::{KeyValueStore, MemoryStore, Record};
use crate::sync::MutationAction;

// ============================================================================
// Network executor
// ============================================================================

/// What the mock executor does for one call.
#[derive(Debug, Clone)]
pub enum Scripted {
  Respond(HttpResponse),
  Fail(TransportFailure),
  /// Never answers; resolves only when the call is cancelled.
  Hang,
}

#[derive(Default)]
struct ExecutorState {
  script: VecDeque<Scripted>,
  fallback: Option<Scripted>,
  requests: Vec<HttpRequest>,
  times: Vec<Instant>,
  tokens: Vec<CancellationToken>,
}

/// Scripted executor. Clones share the script and the call log.
#[derive(Clone, Default)]
pub struct MockExecutor {
  state: Arc<Mutex<ExecutorState>>,
}

impl MockExecutor {
  pub fn new() -> Self {
    Self::default()
  }

  /// Queue the outcome of the next unscripted call.
  pub fn push(&self, step: Scripted) {
    self.state.lock().unwrap().script.push_back(step);
  }

  /// Outcome once the script is exhausted.
  pub fn set_fallback(&self, step: Scripted) {
    self.state.lock().unwrap().fallback = Some(step);
  }

  pub fn requests(&self) -> Vec<HttpRequest> {
    self.state.lock().unwrap().requests.clone()
  }

  pub fn call_count(&self) -> usize {
    self.state.lock().unwrap().requests.len()
  }

  pub fn call_times(&self) -> Vec<Instant> {
    self.state.lock().unwrap().times.clone()
  }

  pub fn tokens(&self) -> Vec<CancellationToken> {
    self.state.lock().unwrap().tokens.clone()
  }
}

#[async_trait]
impl NetworkExecutor for MockExecutor {
  async fn execute(
    &self,
    request: HttpRequest,
    cancel: CancellationToken,
  ) -> Result<HttpResponse, TransportFailure> {
    let step = {
      let mut state = self.state.lock().unwrap();
      state.requests.push(request);
      state.times.push(Instant::now());
      state.tokens.push(cancel.clone());
      state
        .script
        .pop_front()
        .or_else(|| state.fallback.clone())
        .unwrap_or_else(|| Scripted::Fail(TransportFailure::Connect("no scripted response".into())))
    };

    match step {
      Scripted::Respond(response) => Ok(response),
      Scripted::Fail(failure) => Err(failure),
      Scripted::Hang => {
        cancel.cancelled().await;
        Err(TransportFailure::Cancelled)
      }
    }
  }
}

pub fn json_response(status: u16, body: Value) -> HttpResponse {
  HttpResponse {
    status,
    headers: vec![("content-type".to_string(), "application/json".to_string())],
    body: serde_json::to_vec(&body).unwrap(),
  }
}

pub fn text_response(status: u16, body: &str) -> HttpResponse {
  HttpResponse {
    status,
    headers: vec![("content-type".to_string(), "text/plain".to_string())],
    body: body.as_bytes().to_vec(),
  }
}

// ============================================================================
// Records and stores
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
  pub id: String,
  pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotePatch {
  pub text: Option<String>,
}

impl Record for Note {
  type Patch = NotePatch;

  fn record_id(&self) -> &str {
    &self.id
  }

  fn set_record_id(&mut self, id: &str) {
    self.id = id.to_string();
  }

  fn apply(&self, patch: &NotePatch) -> Self {
    Note {
      id: self.id.clone(),
      text: patch.text.clone().unwrap_or_else(|| self.text.clone()),
    }
  }

  fn collection() -> &'static str {
    "notes"
  }
}

pub fn note(id: &str, text: &str) -> Note {
  Note {
    id: id.to_string(),
    text: text.to_string(),
  }
}

/// Memory store whose writes can be switched to fail.
#[derive(Clone, Default)]
pub struct FailingStore {
  inner: MemoryStore,
  fail_writes: Arc<AtomicBool>,
}

impl FailingStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn fail_writes(&self, fail: bool) {
    self.fail_writes.store(fail, Ordering::SeqCst);
  }

  fn check(&self) -> Result<()> {
    if self.fail_writes.load(Ordering::SeqCst) {
      return Err(eyre!("disk full"));
    }
    Ok(())
  }
}

#[async_trait]
impl KeyValueStore for FailingStore {
  async fn get(&self, key: &str) -> Result<Option<Value>> {
    self.inner.get(key).await
  }

  async fn set(&self, key: &str, value: Value) -> Result<()> {
    self.check()?;
    self.inner.set(key, value).await
  }

  async fn remove(&self, key: &str) -> Result<()> {
    self.check()?;
    self.inner.remove(key).await
  }

  fn name(&self) -> &'static str {
    "failing"
  }
}

// ============================================================================
// Pin remote
// ============================================================================

#[derive(Default)]
struct RemoteState {
  pins: Vec<Pin>,
  fail_all: Option<AppError>,
  fail_ops: HashMap<String, AppError>,
  unsupported: HashSet<MutationAction>,
  calls: Vec<String>,
  delay: Option<Duration>,
  next_id: u64,
}

/// In-memory server. Clones share state.
#[derive(Clone, Default)]
pub struct MockPinRemote {
  state: Arc<Mutex<RemoteState>>,
}

impl MockPinRemote {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set_pins(&self, pins: Vec<Pin>) {
    self.state.lock().unwrap().pins = pins;
  }

  pub fn server_pins(&self) -> Vec<Pin> {
    self.state.lock().unwrap().pins.clone()
  }

  /// Fail every operation with `err` (or stop failing with `None`).
  pub fn fail_with(&self, err: Option<AppError>) {
    self.state.lock().unwrap().fail_all = err;
  }

  /// Fail only `op` ("list", "create", "update", "delete").
  pub fn fail_on(&self, op: &str, err: AppError) {
    self.state.lock().unwrap().fail_ops.insert(op.to_string(), err);
  }

  pub fn set_supported(&self, action: MutationAction, supported: bool) {
    let mut state = self.state.lock().unwrap();
    if supported {
      state.unsupported.remove(&action);
    } else {
      state.unsupported.insert(action);
    }
  }

  pub fn set_delay(&self, delay: Option<Duration>) {
    self.state.lock().unwrap().delay = delay;
  }

  pub fn calls(&self) -> Vec<String> {
    self.state.lock().unwrap().calls.clone()
  }

  pub fn count(&self, op: &str) -> usize {
    self.calls().iter().filter(|c| *c == op).count()
  }

  async fn enter(&self, op: &str) -> AppResult<()> {
    let delay = {
      let mut state = self.state.lock().unwrap();
      state.calls.push(op.to_string());
      state.delay
    };
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }

    let state = self.state.lock().unwrap();
    match state.fail_all.as_ref().or_else(|| state.fail_ops.get(op)) {
      Some(err) => Err(err.clone()),
      None => Ok(()),
    }
  }
}

#[async_trait]
impl PinRemote for MockPinRemote {
  async fn list(&self) -> AppResult<Vec<Pin>> {
    self.enter("list").await?;
    Ok(self.server_pins())
  }

  async fn create(&self, pin: &Pin) -> AppResult<Pin> {
    self.enter("create").await?;
    let mut state = self.state.lock().unwrap();
    state.next_id += 1;
    let created = pin.clone().with_id(format!("srv-{}", state.next_id));
    state.pins.push(created.clone());
    Ok(created)
  }

  async fn update(&self, pin: &Pin) -> AppResult<Pin> {
    self.enter("update").await?;
    let mut state = self.state.lock().unwrap();
    match state.pins.iter_mut().find(|p| p.id == pin.id) {
      Some(existing) => {
        *existing = pin.clone();
        Ok(pin.clone())
      }
      None => Err(AppError::operational(ErrorCode::Http(404), "Pin not found")),
    }
  }

  async fn delete(&self, id: &str) -> AppResult<()> {
    self.enter("delete").await?;
    self.state.lock().unwrap().pins.retain(|p| p.id != id);
    Ok(())
  }

  fn supports(&self, action: MutationAction) -> bool {
    !self.state.lock().unwrap().unsupported.contains(&action)
  }
}
