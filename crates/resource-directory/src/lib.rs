// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Resource Directory server
//!
//! Aggregation endpoint where constrained devices publish the resources they
//! host and where clients discover the directory itself:
//! - GET/DISCOVER on the directory uri returns a discovery payload with the
//!   configured selection bias
//! - POST stores the submitted publish records and acknowledges them
//! - every other method is accepted and left unanswered
//!
//! The core ([`ResourceDirectory`], [`RequestDispatcher`]) talks to a
//! [`TransportStack`]; [`TcpTransport`] serves it over length-prefixed JSON
//! frames and [`RdClient`] speaks the same protocol.
//!
//! # Usage
//!
//! ```bash
//! # Serve /oic/rd on the default port (5683)
//! resource-directory
//!
//! # Custom port and bias
//! resource-directory --port 5700 --bias 40
//!
//! # From a config file
//! resource-directory --config rd.json
//! ```

pub mod client;
pub mod config;
pub mod server;

pub use client::{ClientError, RdClient};
pub use config::{ConfigError, RdConfig};
pub use server::{
    run_expiry_sweeper, HeapPayloadFactory, InMemoryResourceStore, RequestDispatcher,
    ResourceDirectory, StackError, TcpTransport, TransportStack,
};
