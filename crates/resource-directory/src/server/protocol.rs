// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Resource directory wire protocol.
//!
//! Simple length-prefixed JSON framing used by the TCP transport.
//!
//! Wire format:
//! ```text
//! +----------------+-------------------+
//! | Length (4B BE) | JSON payload      |
//! +----------------+-------------------+
//! ```

use super::request::{EntityHandlerResult, Method, StackPayload};
use serde::{Deserialize, Serialize};

/// Error code sent when no resource is registered at the requested uri.
pub const ERROR_NOT_FOUND: u32 = 404;

/// Error code sent when a frame cannot be decoded.
pub const ERROR_BAD_REQUEST: u32 = 400;

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Frames exchanged between clients and the directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WireMessage {
    /// Client request addressed to a resource uri.
    #[serde(rename = "request")]
    Request {
        token: u64,
        method: Method,
        uri: String,
        #[serde(default)]
        query: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<StackPayload>,
    },

    /// Server response correlated by token.
    #[serde(rename = "response")]
    Response {
        token: u64,
        result: EntityHandlerResult,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<StackPayload>,
    },

    /// Transport-level error.
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        token: Option<u64>,
        code: u32,
        message: String,
    },
}

impl WireMessage {
    /// Correlation token, if the frame carries one.
    pub fn token(&self) -> Option<u64> {
        match self {
            Self::Request { token, .. } | Self::Response { token, .. } => Some(*token),
            Self::Error { token, .. } => *token,
        }
    }
}

/// Encode a frame: big-endian length prefix followed by the JSON body.
pub fn encode_frame(msg: &WireMessage) -> Result<Vec<u8>, serde_json::Error> {
    let body = serde_json::to_vec(msg)?;
    let len = u32::try_from(body.len()).map_err(|_| {
        <serde_json::Error as serde::ser::Error>::custom("frame body exceeds length prefix range")
    })?;
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_LEN + body.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}
