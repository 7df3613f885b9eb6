// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Entity handler of the RD resource.
//!
//! GET/DISCOVER requests are answered with a discovery payload carrying the
//! configured bias and the stored links matching the request query. POST requests hand their publish records to storage and
//! are acknowledged with a response payload. Every other method is accepted
//! and left unanswered.

use super::payload::{NoMemory, PayloadFactory, PayloadGuard, RdPayload, RdPayloadType};
use super::registry::ResourceStore;
use super::request::{
    EntityHandlerFlag, EntityHandlerRequest, EntityHandlerResponse, EntityHandlerResult, Method,
    PayloadKind, StackPayload,
};
use super::transport::{EntityHandler, ResponseSubmitter, StackError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Outcome of a discovery or publish handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("Invalid request")]
    InvalidRequest,

    #[error(transparent)]
    NoMemory(#[from] NoMemory),

    #[error("Sending response failed: {0}")]
    SendFailed(#[from] StackError),
}

/// Build the response envelope for `request` and submit it once.
pub fn send_response(
    responder: &dyn ResponseSubmitter,
    request: &EntityHandlerRequest,
    payload: &RdPayload,
) -> Result<(), StackError> {
    let response = EntityHandlerResponse {
        request_handle: request.request_handle,
        resource_handle: request.resource_handle,
        result: EntityHandlerResult::Ok,
        payload_kind: PayloadKind::Rd,
        payload,
    };
    responder.submit_response(&response)
}

/// Request dispatcher registered as the RD resource's entity handler.
pub struct RequestDispatcher {
    bias: u8,
    factory: Arc<dyn PayloadFactory>,
    store: Arc<dyn ResourceStore>,
    responder: Arc<dyn ResponseSubmitter>,
}

impl RequestDispatcher {
    /// Create a dispatcher advertising `bias` in discovery responses.
    pub fn new(
        bias: u8,
        factory: Arc<dyn PayloadFactory>,
        store: Arc<dyn ResourceStore>,
        responder: Arc<dyn ResponseSubmitter>,
    ) -> Self {
        Self {
            bias,
            factory,
            store,
            responder,
        }
    }

    /// Discovery bias advertised by this dispatcher.
    pub fn bias(&self) -> u8 {
        self.bias
    }

    /// Answer a GET/DISCOVER request with the directory's discovery payload.
    pub fn handle_discovery(
        &self,
        request: Option<&EntityHandlerRequest>,
    ) -> Result<(), HandlerError> {
        let Some(request) = request else {
            debug!("Invalid request pointer");
            return Err(HandlerError::InvalidRequest);
        };

        debug!(
            "Received {} from client with query: {}",
            request.method, request.query
        );

        let mut payload = PayloadGuard::allocate(self.factory.as_ref(), RdPayloadType::Discovery)?;
        let descriptor = self.factory.create_discovery_descriptor(self.bias)?;
        if let Some(body) = payload.as_discovery_mut() {
            body.descriptor = Some(descriptor);
            body.links = self.store.find_resources(&request.query);
            debug!("Listing {} published links", body.links.len());
        }

        debug!("RD payload: {:?}", *payload);

        send_response(self.responder.as_ref(), request, &payload).map_err(|e| {
            error!("Sending response failed: {}", e);
            HandlerError::from(e)
        })
    }

    /// Store a publish submission and acknowledge it.
    pub fn handle_publish(&self, request: Option<&EntityHandlerRequest>) -> Result<(), HandlerError> {
        let Some(request) = request else {
            debug!("Invalid request pointer");
            return Err(HandlerError::InvalidRequest);
        };

        debug!(
            "Received {} from client with query: {}",
            request.method, request.query
        );

        match request.payload.as_ref().and_then(StackPayload::as_rd) {
            Some(RdPayload::Publish(publish)) => {
                debug!("Storing {} publish records", publish.records.len());
                self.store.store_published_resources(&publish.records);
            }
            Some(other) => {
                debug!("Not storing {:?} payload", other.payload_type());
            }
            None => {
                debug!("Publish request carries no RD payload");
            }
        }

        let mut payload = PayloadGuard::allocate(self.factory.as_ref(), RdPayloadType::Discovery)?;
        debug!("RD payload: {:?}", *payload);
        payload.mark_as_response();

        send_response(self.responder.as_ref(), request, &payload).map_err(|e| {
            error!("Sending response failed: {}", e);
            HandlerError::from(e)
        })
    }
}

impl EntityHandler for RequestDispatcher {
    fn handle(
        &self,
        flag: EntityHandlerFlag,
        request: Option<&EntityHandlerRequest>,
    ) -> EntityHandlerResult {
        let Some(request) = request else {
            return EntityHandlerResult::Error;
        };

        if flag.contains(EntityHandlerFlag::REQUEST) {
            debug!("Flag includes request flag");
            let outcome = match request.method {
                Method::Get | Method::Discover => Some(self.handle_discovery(Some(request))),
                Method::Post => Some(self.handle_publish(Some(request))),
                Method::Put
                | Method::Delete
                | Method::Observe
                | Method::ObserveAll
                | Method::CancelObserve
                | Method::Presence
                | Method::NoMethod => None,
            };

            match outcome {
                Some(Ok(())) => debug!("{} request answered", request.method),
                Some(Err(e)) => warn!("{} request failed: {}", request.method, e),
                None => debug!("{} request left unanswered", request.method),
            }
        }

        // Handler outcomes are reported through the log only.
        EntityHandlerResult::Error
    }
}
