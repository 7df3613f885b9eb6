// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Resource directory service core.

use crate::config::RdConfig;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info};

pub mod connection;
pub mod dispatcher;
pub mod payload;
pub mod pending;
pub mod protocol;
pub mod registry;
pub mod request;
pub mod tcp;
pub mod transport;

pub use dispatcher::{HandlerError, RequestDispatcher};
pub use payload::{
    HeapPayloadFactory, NoMemory, PayloadFactory, PublishRecord, PublishedLink, RdPayload,
    RdPayloadType, ResourceLink, ResourceProperties,
};
pub use registry::{InMemoryResourceStore, ResourceQuery, ResourceStore};
pub use request::{EntityHandlerFlag, EntityHandlerRequest, EntityHandlerResult, Method};
pub use tcp::{TcpTransport, TcpTransportConfig};
pub use transport::{
    EntityHandler, MockTransport, ResourceSpec, ResponseSubmitter, StackError, StackMode,
    TransportStack,
};

use request::ResourceHandle;
use transport::lock;

/// Resource type of the directory resource.
pub const RD_RESOURCE_TYPE: &str = "oic.wk.rd";

/// Interface of the directory resource.
pub const RD_INTERFACE: &str = "oic.if.baseline";

/// Registration of the directory resource with the transport stack.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRegistration {
    pub handle: ResourceHandle,
    pub spec: ResourceSpec,
}

/// Resource directory service bound to one transport stack.
pub struct ResourceDirectory<T: TransportStack> {
    rd_uri: String,
    transport: Arc<T>,
    dispatcher: Arc<RequestDispatcher>,
    registration: Mutex<Option<ServiceRegistration>>,
}

impl<T: TransportStack> ResourceDirectory<T> {
    /// Create a stopped service.
    pub fn new(
        config: &RdConfig,
        transport: Arc<T>,
        factory: Arc<dyn PayloadFactory>,
        store: Arc<dyn ResourceStore>,
    ) -> Self {
        let dispatcher = RequestDispatcher::new(
            config.discovery_bias,
            factory,
            store,
            transport.responder(),
        );
        Self {
            rd_uri: config.rd_uri.clone(),
            transport,
            dispatcher: Arc::new(dispatcher),
            registration: Mutex::new(None),
        }
    }

    /// Bring the stack up in client+server mode and register the directory resource.
    pub fn start(&self) -> Result<ResourceHandle, StackError> {
        let result = self.register();
        match &result {
            Ok(handle) => info!("Resource Directory started (handle {})", handle.0),
            Err(e) => error!("Failed starting Resource Directory: {}", e),
        }
        result
    }

    fn register(&self) -> Result<ResourceHandle, StackError> {
        self.transport.init(StackMode::ClientServer)?;

        let spec = ResourceSpec {
            resource_type: RD_RESOURCE_TYPE.to_string(),
            interface: RD_INTERFACE.to_string(),
            uri: self.rd_uri.clone(),
            properties: ResourceProperties::ACTIVE
                | ResourceProperties::DISCOVERABLE
                | ResourceProperties::OBSERVABLE,
        };
        let handler: Arc<dyn EntityHandler> = self.dispatcher.clone();
        let handle = self.transport.create_resource(spec.clone(), handler)?;

        *lock(&self.registration) = Some(ServiceRegistration { handle, spec });
        Ok(handle)
    }

    /// Stop the transport stack.
    pub fn stop(&self) -> Result<(), StackError> {
        let result = self.transport.stop();
        match &result {
            Ok(()) => {
                lock(&self.registration).take();
                info!("Resource Directory stopped");
            }
            Err(e) => error!("Failed stopping Resource Directory: {}", e),
        }
        result
    }

    /// Current registration, if started.
    pub fn registration(&self) -> Option<ServiceRegistration> {
        lock(&self.registration).clone()
    }

    /// Entity handler registered for the directory resource.
    pub fn dispatcher(&self) -> &Arc<RequestDispatcher> {
        &self.dispatcher
    }

    /// Underlying transport stack.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }
}

/// Periodically drop devices whose lease ran out, until `shutdown` is notified.
pub async fn run_expiry_sweeper(
    store: Arc<InMemoryResourceStore>,
    interval: Duration,
    shutdown: Arc<Notify>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let expired = store.remove_expired();
                if !expired.is_empty() {
                    info!("Removed {} expired devices", expired.len());
                    for device_id in &expired {
                        debug!("  - {}", device_id);
                    }
                }
            }
            _ = shutdown.notified() => {
                debug!("Expiry sweeper shutting down");
                break;
            }
        }
    }
}
