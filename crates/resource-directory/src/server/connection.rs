// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Framed reading and writing of wire messages.

use super::protocol::{encode_frame, WireMessage, LENGTH_PREFIX_LEN};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Reading half of a framed connection.
///
/// Bytes are accumulated across calls, so a `read_message` future dropped
/// mid-frame (e.g. by a timeout) loses nothing: the next call resumes the
/// same frame.
pub struct FrameReader<R> {
    reader: R,
    max_message_size: usize,
    read_buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap a byte stream.
    pub fn new(reader: R, max_message_size: usize) -> Self {
        Self {
            reader,
            max_message_size,
            read_buffer: Vec::with_capacity(4096),
        }
    }

    /// Read the next message.
    ///
    /// Returns `Ok(None)` if the peer closed the stream between frames.
    /// Cancel safe.
    pub async fn read_message(&mut self) -> Result<Option<WireMessage>, ConnectionError> {
        loop {
            if let Some(msg) = self.take_frame()? {
                return Ok(Some(msg));
            }

            let mut chunk = [0u8; 4096];
            let n = self.reader.read(&mut chunk).await?;
            if n == 0 {
                if self.read_buffer.is_empty() {
                    return Ok(None);
                }
                return Err(ConnectionError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed mid-frame",
                )));
            }
            self.read_buffer.extend_from_slice(&chunk[..n]);
        }
    }

    /// Bytes received but not yet consumed as a complete frame.
    pub fn buffered(&self) -> usize {
        self.read_buffer.len()
    }

    /// Decode one complete frame from the buffer, if present.
    fn take_frame(&mut self) -> Result<Option<WireMessage>, ConnectionError> {
        if self.read_buffer.len() < LENGTH_PREFIX_LEN {
            return Ok(None);
        }

        let mut len_buf = [0u8; LENGTH_PREFIX_LEN];
        len_buf.copy_from_slice(&self.read_buffer[..LENGTH_PREFIX_LEN]);
        let len = u32::from_be_bytes(len_buf) as usize;
        if len == 0 {
            return Err(ConnectionError::Protocol("Empty message".into()));
        }
        if len > self.max_message_size {
            return Err(ConnectionError::Protocol(format!(
                "Message too large: {} > {}",
                len, self.max_message_size
            )));
        }

        let frame_len = LENGTH_PREFIX_LEN + len;
        if self.read_buffer.len() < frame_len {
            return Ok(None);
        }

        let parsed = serde_json::from_slice(&self.read_buffer[LENGTH_PREFIX_LEN..frame_len]);
        self.read_buffer.drain(..frame_len);
        parsed
            .map(Some)
            .map_err(|e| ConnectionError::Protocol(format!("Invalid JSON: {}", e)))
    }
}

/// Writing half of a framed connection.
pub struct FrameWriter<W> {
    writer: W,
    max_message_size: usize,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Wrap a byte sink.
    pub fn new(writer: W, max_message_size: usize) -> Self {
        Self {
            writer,
            max_message_size,
        }
    }

    /// Write one message and flush.
    pub async fn send_message(&mut self, msg: &WireMessage) -> Result<(), ConnectionError> {
        let frame = encode_frame(msg)
            .map_err(|e| ConnectionError::Protocol(format!("Serialize error: {}", e)))?;

        let body_len = frame.len() - LENGTH_PREFIX_LEN;
        if body_len > self.max_message_size {
            return Err(ConnectionError::Protocol(format!(
                "Message too large: {} > {}",
                body_len, self.max_message_size
            )));
        }

        self.writer.write_all(&frame).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Shut the write side down.
    pub async fn shutdown(&mut self) -> Result<(), ConnectionError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// Connection error types.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),
}
