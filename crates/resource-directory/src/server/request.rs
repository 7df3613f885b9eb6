// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Inbound request and outbound response envelopes exchanged with the
//! transport stack.

use super::payload::RdPayload;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Request method carried by an inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Method {
    Get,
    Discover,
    Post,
    Put,
    Delete,
    Observe,
    ObserveAll,
    CancelObserve,
    Presence,
    #[serde(rename = "NONE")]
    NoMethod,
}

impl Method {
    /// Observer lifecycle methods (delivered with the OBSERVE flag as well).
    pub fn is_observe(self) -> bool {
        matches!(
            self,
            Self::Observe | Self::ObserveAll | Self::CancelObserve
        )
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Get => "GET",
            Self::Discover => "DISCOVER",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Observe => "OBSERVE",
            Self::ObserveAll => "OBSERVE_ALL",
            Self::CancelObserve => "CANCEL_OBSERVE",
            Self::Presence => "PRESENCE",
            Self::NoMethod => "NONE",
        };
        f.write_str(name)
    }
}

/// Event flags passed alongside a request to an entity handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EntityHandlerFlag(u8);

impl EntityHandlerFlag {
    /// No event.
    pub const NONE: EntityHandlerFlag = EntityHandlerFlag(0);

    /// Resource initialisation event.
    pub const INIT: EntityHandlerFlag = EntityHandlerFlag(1 << 0);

    /// Regular request event.
    pub const REQUEST: EntityHandlerFlag = EntityHandlerFlag(1 << 1);

    /// Observer registration/deregistration event.
    pub const OBSERVE: EntityHandlerFlag = EntityHandlerFlag(1 << 2);

    /// Create a flag set from raw bits
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        EntityHandlerFlag(bits)
    }

    /// Get the raw bits value
    #[must_use]
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Check if this set contains all bits of `other`
    #[must_use]
    pub const fn contains(&self, other: EntityHandlerFlag) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for EntityHandlerFlag {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        EntityHandlerFlag(self.0 | rhs.0)
    }
}

/// Opaque token identifying one in-flight request inside the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestHandle(pub u64);

/// Opaque token identifying a resource registered with the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceHandle(pub u64);

/// Payload kinds understood by the transport stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Rd,
    Representation,
}

/// A typed payload attached to a request or response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum StackPayload {
    /// Resource directory payload.
    Rd(RdPayload),
    /// Any other resource representation.
    Representation(serde_json::Value),
}

impl StackPayload {
    /// Payload kind tag.
    pub fn kind(&self) -> PayloadKind {
        match self {
            Self::Rd(_) => PayloadKind::Rd,
            Self::Representation(_) => PayloadKind::Representation,
        }
    }

    /// Interpret this payload as an RD payload.
    pub fn as_rd(&self) -> Option<&RdPayload> {
        match self {
            Self::Rd(payload) => Some(payload),
            Self::Representation(_) => None,
        }
    }
}

/// Inbound request delivered by the transport to an entity handler.
#[derive(Debug, Clone)]
pub struct EntityHandlerRequest {
    pub method: Method,
    pub query: String,
    pub payload: Option<StackPayload>,
    pub request_handle: RequestHandle,
    pub resource_handle: ResourceHandle,
}

impl EntityHandlerRequest {
    /// Create a request without query or payload.
    pub fn new(method: Method, request_handle: RequestHandle, resource_handle: ResourceHandle) -> Self {
        Self {
            method,
            query: String::new(),
            payload: None,
            request_handle,
            resource_handle,
        }
    }

    /// Attach a query string.
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: StackPayload) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Result code returned by entity handlers and carried in responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityHandlerResult {
    Ok,
    Error,
}

/// Outbound response envelope handed to the transport.
///
/// The payload is borrowed: ownership stays with the handler that built it.
#[derive(Debug, Clone, Copy)]
pub struct EntityHandlerResponse<'a> {
    pub request_handle: RequestHandle,
    pub resource_handle: ResourceHandle,
    pub result: EntityHandlerResult,
    pub payload_kind: PayloadKind,
    pub payload: &'a RdPayload,
}
