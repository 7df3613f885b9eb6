// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TCP transport stack.
//!
//! Serves registered resources over length-prefixed JSON frames. Entity
//! handlers run inline on the connection task; responses are queued to the
//! connection's writer task through [`PendingResponses`].

use super::connection::{ConnectionError, FrameReader, FrameWriter};
use super::pending::{PendingResponses, ResponseStats};
use super::protocol::{WireMessage, ERROR_BAD_REQUEST, ERROR_NOT_FOUND};
use super::request::{EntityHandlerFlag, EntityHandlerRequest, ResourceHandle};
use super::transport::{
    lock, EntityHandler, ResourceSpec, ResponseSubmitter, StackError, StackMode, TransportStack,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// TCP transport settings.
#[derive(Debug, Clone)]
pub struct TcpTransportConfig {
    /// Listen address (port 0 picks a free port)
    pub bind_addr: SocketAddr,

    /// Maximum frame body size (bytes)
    pub max_message_size: usize,

    /// Responses buffered per connection
    pub outbound_queue_depth: usize,
}

#[derive(Clone)]
struct Route {
    handle: ResourceHandle,
    handler: Arc<dyn EntityHandler>,
}

type RouteTable = Arc<RwLock<HashMap<String, Route>>>;

fn read_routes(routes: &RwLock<HashMap<String, Route>>) -> RwLockReadGuard<'_, HashMap<String, Route>> {
    match routes.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_routes(
    routes: &RwLock<HashMap<String, Route>>,
) -> RwLockWriteGuard<'_, HashMap<String, Route>> {
    match routes.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

struct RunningStack {
    mode: StackMode,
    shutdown: watch::Sender<bool>,
    local_addr: Option<SocketAddr>,
}

/// Transport stack serving resources over TCP.
pub struct TcpTransport {
    config: TcpTransportConfig,
    runtime: Handle,
    state: Mutex<Option<RunningStack>>,
    routes: RouteTable,
    pending: Arc<PendingResponses>,
    next_resource: AtomicU64,
}

impl TcpTransport {
    /// Create a stopped transport that spawns its tasks on `runtime`.
    pub fn new(config: TcpTransportConfig, runtime: Handle) -> Self {
        Self {
            config,
            runtime,
            state: Mutex::new(None),
            routes: Arc::new(RwLock::new(HashMap::new())),
            pending: Arc::new(PendingResponses::new()),
            next_resource: AtomicU64::new(1),
        }
    }

    /// Bound listen address while serving.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        lock(&self.state).as_ref().and_then(|s| s.local_addr)
    }

    /// Mode the stack runs in, if initialised.
    pub fn mode(&self) -> Option<StackMode> {
        lock(&self.state).as_ref().map(|s| s.mode)
    }

    /// Registered resource uris.
    pub fn resource_uris(&self) -> Vec<String> {
        read_routes(&self.routes).keys().cloned().collect()
    }

    /// Response delivery statistics.
    pub fn response_stats(&self) -> ResponseStats {
        self.pending.stats()
    }

    fn bind(&self) -> Result<(TcpListener, SocketAddr), StackError> {
        let bind_err = |e: std::io::Error| StackError::Bind(e.to_string());

        let std_listener = std::net::TcpListener::bind(self.config.bind_addr).map_err(bind_err)?;
        std_listener.set_nonblocking(true).map_err(bind_err)?;
        let local_addr = std_listener.local_addr().map_err(bind_err)?;

        let _enter = self.runtime.enter();
        let listener = TcpListener::from_std(std_listener).map_err(bind_err)?;
        Ok((listener, local_addr))
    }
}

impl TransportStack for TcpTransport {
    fn init(&self, mode: StackMode) -> Result<(), StackError> {
        let mut state = lock(&self.state);
        if state.is_some() {
            return Err(StackError::AlreadyInitialized);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut running = RunningStack {
            mode,
            shutdown: shutdown_tx,
            local_addr: None,
        };

        if mode.serves() {
            let (listener, local_addr) = self.bind()?;
            let ctx = ConnectionContext {
                routes: self.routes.clone(),
                pending: self.pending.clone(),
                max_message_size: self.config.max_message_size,
                outbound_queue_depth: self.config.outbound_queue_depth,
            };
            self.runtime.spawn(accept_loop(listener, ctx, shutdown_rx));
            running.local_addr = Some(local_addr);
            info!("Transport listening on {}", local_addr);
        }

        *state = Some(running);
        Ok(())
    }

    fn stop(&self) -> Result<(), StackError> {
        let running = lock(&self.state).take().ok_or(StackError::NotInitialized)?;
        let _ = running.shutdown.send(true);

        write_routes(&self.routes).clear();
        self.pending.clear();
        info!("Transport stopped");
        Ok(())
    }

    fn create_resource(
        &self,
        spec: ResourceSpec,
        handler: Arc<dyn EntityHandler>,
    ) -> Result<ResourceHandle, StackError> {
        if lock(&self.state).is_none() {
            return Err(StackError::NotInitialized);
        }

        let mut routes = write_routes(&self.routes);
        if routes.contains_key(&spec.uri) {
            return Err(StackError::ResourceExists(spec.uri));
        }

        let handle = ResourceHandle(self.next_resource.fetch_add(1, Ordering::Relaxed));
        info!(
            "Registered resource {} (rt={}, if={}, p={:#04b})",
            spec.uri,
            spec.resource_type,
            spec.interface,
            spec.properties.bits()
        );
        routes.insert(spec.uri, Route { handle, handler });
        Ok(handle)
    }

    fn responder(&self) -> Arc<dyn ResponseSubmitter> {
        self.pending.clone()
    }
}

#[derive(Clone)]
struct ConnectionContext {
    routes: RouteTable,
    pending: Arc<PendingResponses>,
    max_message_size: usize,
    outbound_queue_depth: usize,
}

impl ConnectionContext {
    /// Process one frame read from a client.
    fn process_message(&self, msg: WireMessage, outbound: &mpsc::Sender<WireMessage>) {
        let (token, method, uri, query, payload) = match msg {
            WireMessage::Request {
                token,
                method,
                uri,
                query,
                payload,
            } => (token, method, uri, query, payload),
            other => {
                debug!("Ignoring unexpected frame (token {:?})", other.token());
                return;
            }
        };

        let route = read_routes(&self.routes).get(&uri).cloned();
        let Some(route) = route else {
            debug!("No resource at {}", uri);
            let _ = outbound.try_send(WireMessage::Error {
                token: Some(token),
                code: ERROR_NOT_FOUND,
                message: format!("No resource at {}", uri),
            });
            return;
        };

        let request_handle = self.pending.register(token, outbound.clone());
        let request = EntityHandlerRequest {
            method,
            query,
            payload,
            request_handle,
            resource_handle: route.handle,
        };

        let mut flag = EntityHandlerFlag::REQUEST;
        if method.is_observe() {
            flag = flag | EntityHandlerFlag::OBSERVE;
        }

        let result = route.handler.handle(flag, Some(&request));
        debug!("Handler for {} {} returned {:?}", method, uri, result);

        if self.pending.discard(request_handle) {
            debug!("{} {} left unanswered", method, uri);
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    ctx: ConnectionContext,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer_addr)) => {
                        info!("New connection from {}", peer_addr);
                        let ctx = ctx.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, peer_addr, ctx, shutdown).await {
                                warn!("Connection error from {}: {}", peer_addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                }
            }
            _ = shutdown.changed() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    ctx: ConnectionContext,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ConnectionError> {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Failed to set TCP_NODELAY for {}: {}", peer_addr, e);
    }

    let (read_half, write_half) = stream.into_split();
    let mut reader = FrameReader::new(read_half, ctx.max_message_size);
    let mut writer = FrameWriter::new(write_half, ctx.max_message_size);
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<WireMessage>(ctx.outbound_queue_depth);

    let writer_task = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if let Err(e) = writer.send_message(&msg).await {
                warn!("Failed to send message to {}: {}", peer_addr, e);
                break;
            }
        }
        let _ = writer.shutdown().await;
    });

    let result = loop {
        tokio::select! {
            result = reader.read_message() => {
                match result {
                    Ok(Some(msg)) => ctx.process_message(msg, &outbound_tx),
                    Ok(None) => {
                        info!("Connection closed: {}", peer_addr);
                        break Ok(());
                    }
                    Err(ConnectionError::Protocol(message)) => {
                        let _ = outbound_tx.try_send(WireMessage::Error {
                            token: None,
                            code: ERROR_BAD_REQUEST,
                            message: message.clone(),
                        });
                        break Err(ConnectionError::Protocol(message));
                    }
                    Err(e) => break Err(e),
                }
            }
            _ = shutdown.changed() => {
                debug!("Connection handler shutting down: {}", peer_addr);
                break Ok(());
            }
        }
    };

    drop(outbound_tx);
    let _ = writer_task.await;
    result
}
