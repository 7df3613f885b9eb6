// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Resource directory client.
//!
//! Async TCP client speaking the directory's framed protocol. Used to
//! discover a directory and to publish device resources to it.

use crate::config::DEFAULT_RD_URI;
use crate::server::connection::{ConnectionError, FrameReader, FrameWriter};
use crate::server::payload::{PublishRecord, RdPayload};
use crate::server::protocol::WireMessage;
use crate::server::request::{EntityHandlerResult, Method, StackPayload};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

/// Default time to wait for a response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

const CLIENT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Client error types.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(std::io::Error),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("Connection closed")]
    Closed,

    #[error("Server error {code}: {message}")]
    Server { code: u32, message: String },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

/// Client connection to a resource directory.
pub struct RdClient {
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
    uri: String,
    next_token: u64,
    timeout: Duration,
}

impl RdClient {
    /// Connect to a directory served at the default uri.
    pub async fn connect(addr: SocketAddr) -> Result<Self, ClientError> {
        Self::connect_to(addr, DEFAULT_RD_URI).await
    }

    /// Connect to a directory served at `uri`.
    pub async fn connect_to(addr: SocketAddr, uri: impl Into<String>) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(ClientError::ConnectionFailed)?;
        stream.set_nodelay(true).ok();

        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: FrameReader::new(read_half, CLIENT_MAX_MESSAGE_SIZE),
            writer: FrameWriter::new(write_half, CLIENT_MAX_MESSAGE_SIZE),
            uri: uri.into(),
            next_token: 1,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Set the per-request response timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send one request and wait for the response carrying its token.
    ///
    /// Frames for other tokens are skipped. On `Timeout` any partially
    /// received frame stays buffered, so the connection remains usable and
    /// a late response to the timed-out request is skipped by the next call.
    pub async fn request(
        &mut self,
        method: Method,
        query: &str,
        payload: Option<StackPayload>,
    ) -> Result<(EntityHandlerResult, Option<StackPayload>), ClientError> {
        let token = self.next_token;
        self.next_token += 1;

        self.writer
            .send_message(&WireMessage::Request {
                token,
                method,
                uri: self.uri.clone(),
                query: query.to_string(),
                payload,
            })
            .await?;

        let timeout = self.timeout;
        tokio::time::timeout(timeout, self.await_response(token))
            .await
            .map_err(|_| ClientError::Timeout(timeout))?
    }

    async fn await_response(
        &mut self,
        token: u64,
    ) -> Result<(EntityHandlerResult, Option<StackPayload>), ClientError> {
        loop {
            match self.reader.read_message().await? {
                None => return Err(ClientError::Closed),
                Some(WireMessage::Response {
                    token: t,
                    result,
                    payload,
                }) if t == token => return Ok((result, payload)),
                Some(WireMessage::Error {
                    token: t,
                    code,
                    message,
                }) if t.is_none() || t == Some(token) => {
                    return Err(ClientError::Server { code, message });
                }
                Some(other) => {
                    debug!("Skipping frame for token {:?}", other.token());
                }
            }
        }
    }

    /// Discover the directory: returns its discovery payload.
    pub async fn discover(&mut self, query: &str) -> Result<RdPayload, ClientError> {
        let (_, payload) = self.request(Method::Discover, query, None).await?;
        expect_rd(payload)
    }

    /// Publish `records` and return the directory's acknowledgement.
    pub async fn publish(&mut self, records: Vec<PublishRecord>) -> Result<RdPayload, ClientError> {
        let payload = StackPayload::Rd(RdPayload::publish(records));
        let (_, payload) = self.request(Method::Post, "", Some(payload)).await?;
        expect_rd(payload)
    }
}

fn expect_rd(payload: Option<StackPayload>) -> Result<RdPayload, ClientError> {
    match payload {
        Some(StackPayload::Rd(rd)) => Ok(rd),
        Some(other) => Err(ClientError::UnexpectedResponse(format!(
            "{:?} payload",
            other.kind()
        ))),
        None => Err(ClientError::UnexpectedResponse("missing payload".into())),
    }
}
