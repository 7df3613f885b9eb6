// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport stack abstraction.
//!
//! The directory core never touches sockets. It registers an
//! [`EntityHandler`] with a [`TransportStack`] and answers requests through
//! the stack's [`ResponseSubmitter`]. [`TcpTransport`](super::tcp::TcpTransport)
//! is the production stack; [`MockTransport`] records everything for tests.

use super::payload::{RdPayload, ResourceProperties};
use super::request::{
    EntityHandlerFlag, EntityHandlerRequest, EntityHandlerResponse, EntityHandlerResult,
    PayloadKind, RequestHandle, ResourceHandle,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Role the stack is initialised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackMode {
    Client,
    Server,
    ClientServer,
}

impl StackMode {
    /// Whether this mode accepts inbound requests.
    pub fn serves(self) -> bool {
        matches!(self, Self::Server | Self::ClientServer)
    }
}

/// Resource registration parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSpec {
    pub resource_type: String,
    pub interface: String,
    pub uri: String,
    pub properties: ResourceProperties,
}

/// Transport stack errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StackError {
    #[error("Transport stack not initialized")]
    NotInitialized,

    #[error("Transport stack already initialized")]
    AlreadyInitialized,

    #[error("Bind error: {0}")]
    Bind(String),

    #[error("Resource already registered at {0}")]
    ResourceExists(String),

    #[error("Unknown request handle {0:?}")]
    UnknownRequest(RequestHandle),

    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Callback receiving every request addressed to one resource.
pub trait EntityHandler: Send + Sync {
    /// Handle one event. `request` is `None` when the stack has no request
    /// to attach.
    fn handle(
        &self,
        flag: EntityHandlerFlag,
        request: Option<&EntityHandlerRequest>,
    ) -> EntityHandlerResult;
}

/// Response-submission primitive of a transport stack.
pub trait ResponseSubmitter: Send + Sync {
    /// Submit one response. No retry is attempted.
    fn submit_response(&self, response: &EntityHandlerResponse<'_>) -> Result<(), StackError>;
}

/// Request/response transport stack.
pub trait TransportStack: Send + Sync {
    /// Bring the stack up in `mode`.
    fn init(&self, mode: StackMode) -> Result<(), StackError>;

    /// Shut the stack down, dropping every registered resource.
    fn stop(&self) -> Result<(), StackError>;

    /// Register a resource and the handler serving it.
    fn create_resource(
        &self,
        spec: ResourceSpec,
        handler: Arc<dyn EntityHandler>,
    ) -> Result<ResourceHandle, StackError>;

    /// Handle used to submit responses.
    fn responder(&self) -> Arc<dyn ResponseSubmitter>;
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

/// Response captured by [`MockTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedResponse {
    pub request_handle: RequestHandle,
    pub resource_handle: ResourceHandle,
    pub result: EntityHandlerResult,
    pub payload_kind: PayloadKind,
    pub payload: RdPayload,
}

/// Responder half of [`MockTransport`].
#[derive(Default)]
pub struct MockResponder {
    responses: Mutex<Vec<SubmittedResponse>>,
    fail: AtomicBool,
}

impl MockResponder {
    /// Make every following submission fail (or succeed again).
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Responses submitted successfully so far.
    pub fn responses(&self) -> Vec<SubmittedResponse> {
        lock(&self.responses).clone()
    }
}

impl ResponseSubmitter for MockResponder {
    fn submit_response(&self, response: &EntityHandlerResponse<'_>) -> Result<(), StackError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StackError::SendFailed("injected failure".into()));
        }
        lock(&self.responses).push(SubmittedResponse {
            request_handle: response.request_handle,
            resource_handle: response.resource_handle,
            result: response.result,
            payload_kind: response.payload_kind,
            payload: response.payload.clone(),
        });
        Ok(())
    }
}

struct MockResource {
    handle: ResourceHandle,
    spec: ResourceSpec,
    handler: Arc<dyn EntityHandler>,
}

#[derive(Default)]
struct MockState {
    mode: Option<StackMode>,
    resources: Vec<MockResource>,
    next_handle: u64,
    init_calls: usize,
    stop_calls: usize,
    fail_init: bool,
}

/// In-process transport stack for tests.
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
    responder: Arc<MockResponder>,
}

impl MockTransport {
    /// Create a new mock stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `init` calls fail.
    pub fn set_fail_init(&self, fail: bool) {
        lock(&self.state).fail_init = fail;
    }

    /// Make response submission fail.
    pub fn set_fail_responses(&self, fail: bool) {
        self.responder.set_fail(fail);
    }

    /// Mode the stack is running in, if initialised.
    pub fn mode(&self) -> Option<StackMode> {
        lock(&self.state).mode
    }

    /// Number of `init` calls seen.
    pub fn init_calls(&self) -> usize {
        lock(&self.state).init_calls
    }

    /// Number of `stop` calls seen.
    pub fn stop_calls(&self) -> usize {
        lock(&self.state).stop_calls
    }

    /// Registered resources.
    pub fn resources(&self) -> Vec<(ResourceHandle, ResourceSpec)> {
        lock(&self.state)
            .resources
            .iter()
            .map(|r| (r.handle, r.spec.clone()))
            .collect()
    }

    /// Responses submitted so far.
    pub fn responses(&self) -> Vec<SubmittedResponse> {
        self.responder.responses()
    }

    /// Deliver an event to the handler registered at `uri`, as the stack would.
    ///
    /// Returns `None` if no resource is registered there.
    pub fn deliver(
        &self,
        uri: &str,
        flag: EntityHandlerFlag,
        request: Option<&EntityHandlerRequest>,
    ) -> Option<EntityHandlerResult> {
        let handler = lock(&self.state)
            .resources
            .iter()
            .find(|r| r.spec.uri == uri)
            .map(|r| Arc::clone(&r.handler))?;
        Some(handler.handle(flag, request))
    }
}

impl TransportStack for MockTransport {
    fn init(&self, mode: StackMode) -> Result<(), StackError> {
        let mut state = lock(&self.state);
        state.init_calls += 1;
        if state.fail_init {
            return Err(StackError::Bind("injected failure".into()));
        }
        if state.mode.is_some() {
            return Err(StackError::AlreadyInitialized);
        }
        state.mode = Some(mode);
        Ok(())
    }

    fn stop(&self) -> Result<(), StackError> {
        let mut state = lock(&self.state);
        state.stop_calls += 1;
        if state.mode.take().is_none() {
            return Err(StackError::NotInitialized);
        }
        state.resources.clear();
        Ok(())
    }

    fn create_resource(
        &self,
        spec: ResourceSpec,
        handler: Arc<dyn EntityHandler>,
    ) -> Result<ResourceHandle, StackError> {
        let mut state = lock(&self.state);
        if state.mode.is_none() {
            return Err(StackError::NotInitialized);
        }
        if state.resources.iter().any(|r| r.spec.uri == spec.uri) {
            return Err(StackError::ResourceExists(spec.uri));
        }
        state.next_handle += 1;
        let handle = ResourceHandle(state.next_handle);
        state.resources.push(MockResource {
            handle,
            spec,
            handler,
        });
        Ok(handle)
    }

    fn responder(&self) -> Arc<dyn ResponseSubmitter> {
        self.responder.clone()
    }
}
