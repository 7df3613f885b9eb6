// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-flight requests awaiting a response.
//!
//! Each request frame read by a connection gets a [`RequestHandle`] that
//! maps back to the frame's token and to the connection's outbound channel.
//! Submitting a response consumes the entry, so at most one response leaves
//! per request.

use super::protocol::WireMessage;
use super::request::{EntityHandlerResponse, RequestHandle, StackPayload};
use super::transport::{lock, ResponseSubmitter, StackError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Response delivery statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResponseStats {
    /// Responses queued to a connection.
    pub responses_sent: u64,
    /// Submissions that could not be queued.
    pub send_errors: u64,
    /// Requests the handler left unanswered.
    pub unanswered: u64,
}

struct PendingEntry {
    token: u64,
    tx: mpsc::Sender<WireMessage>,
}

/// Table of requests awaiting a response.
pub struct PendingResponses {
    entries: Mutex<HashMap<RequestHandle, PendingEntry>>,
    next_handle: AtomicU64,
    stats: Mutex<ResponseStats>,
}

impl PendingResponses {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
            stats: Mutex::new(ResponseStats::default()),
        }
    }

    /// Track a request read from a connection and return its handle.
    pub fn register(&self, token: u64, tx: mpsc::Sender<WireMessage>) -> RequestHandle {
        let handle = RequestHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        lock(&self.entries).insert(handle, PendingEntry { token, tx });
        handle
    }

    /// Drop a request that received no response. Returns true if it was still pending.
    pub fn discard(&self, handle: RequestHandle) -> bool {
        let removed = lock(&self.entries).remove(&handle).is_some();
        if removed {
            lock(&self.stats).unanswered += 1;
        }
        removed
    }

    /// Drop every pending request.
    pub fn clear(&self) {
        lock(&self.entries).clear();
    }

    /// Number of requests awaiting a response.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Whether no request is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of delivery statistics.
    pub fn stats(&self) -> ResponseStats {
        lock(&self.stats).clone()
    }
}

impl Default for PendingResponses {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseSubmitter for PendingResponses {
    fn submit_response(&self, response: &EntityHandlerResponse<'_>) -> Result<(), StackError> {
        let entry = lock(&self.entries)
            .remove(&response.request_handle)
            .ok_or(StackError::UnknownRequest(response.request_handle))?;

        let msg = WireMessage::Response {
            token: entry.token,
            result: response.result,
            payload: Some(StackPayload::Rd(response.payload.clone())),
        };

        match entry.tx.try_send(msg) {
            Ok(()) => {
                lock(&self.stats).responses_sent += 1;
                Ok(())
            }
            Err(e) => {
                lock(&self.stats).send_errors += 1;
                Err(StackError::SendFailed(e.to_string()))
            }
        }
    }
}
