// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Resource directory payloads and the factory that owns their lifetime.
//!
//! Every RD payload a handler builds comes from a [`PayloadFactory`] and goes
//! back to it through [`PayloadFactory::destroy_payload`]. Handlers hold the
//! payload in a [`PayloadGuard`], so release happens on every exit path.

use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

/// Upper bound of the discovery selection (bias) value.
pub const MAX_DISCOVERY_BIAS: u8 = 100;

/// Resource properties advertised for a link or registered resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceProperties(u8);

impl ResourceProperties {
    /// No property set.
    pub const NONE: ResourceProperties = ResourceProperties(0);

    /// Resource accepts requests.
    pub const ACTIVE: ResourceProperties = ResourceProperties(1 << 0);

    /// Resource shows up in discovery.
    pub const DISCOVERABLE: ResourceProperties = ResourceProperties(1 << 1);

    /// Resource supports observers.
    pub const OBSERVABLE: ResourceProperties = ResourceProperties(1 << 2);

    /// Create from raw bits
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        ResourceProperties(bits)
    }

    /// Get the raw bits value
    #[must_use]
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Check if all bits of `other` are set
    #[must_use]
    pub const fn contains(&self, other: ResourceProperties) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for ResourceProperties {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        ResourceProperties(self.0 | rhs.0)
    }
}

/// Discriminant of an [`RdPayload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RdPayloadType {
    Discovery,
    Publish,
    Response,
}

/// Discovery descriptor advertised by the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryDescriptor {
    /// Selection bias clients use to rank directories (0..=100).
    pub bias: u8,
}

/// Body shared by discovery listings and publish acknowledgements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RdDiscoveryPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<DiscoveryDescriptor>,

    /// Published links matching the discovery query, filled in by storage.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<PublishedLink>,
}

/// One link published by a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLink {
    /// Resource URI on the publishing device
    pub href: String,

    #[serde(default, rename = "rt")]
    pub resource_types: Vec<String>,

    #[serde(default, rename = "if")]
    pub interfaces: Vec<String>,

    #[serde(default, rename = "p")]
    pub properties: ResourceProperties,
}

impl ResourceLink {
    /// Create a link with no types or interfaces.
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            resource_types: Vec::new(),
            interfaces: Vec::new(),
            properties: ResourceProperties::NONE,
        }
    }

    /// Add a resource type.
    pub fn with_type(mut self, rt: impl Into<String>) -> Self {
        self.resource_types.push(rt.into());
        self
    }

    /// Add an interface.
    pub fn with_interface(mut self, iface: impl Into<String>) -> Self {
        self.interfaces.push(iface.into());
        self
    }

    /// Set properties.
    pub fn with_properties(mut self, properties: ResourceProperties) -> Self {
        self.properties = properties;
        self
    }
}

/// A link together with the device that published it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedLink {
    pub device_id: String,
    pub link: ResourceLink,
}

/// A device's declaration of the resources it hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRecord {
    pub device_id: String,

    /// Lifetime of the published links; the directory default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,

    #[serde(default)]
    pub links: Vec<ResourceLink>,
}

impl PublishRecord {
    /// Create a record with no links.
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            ttl_secs: None,
            links: Vec::new(),
        }
    }

    /// Add a link.
    pub fn with_link(mut self, link: ResourceLink) -> Self {
        self.links.push(link);
        self
    }

    /// Set the lifetime.
    pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = Some(ttl_secs);
        self
    }
}

/// Body of a publish submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RdPublishPayload {
    #[serde(default)]
    pub records: Vec<PublishRecord>,
}

/// Resource directory payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rd_type", rename_all = "snake_case")]
pub enum RdPayload {
    Discovery(RdDiscoveryPayload),
    Publish(RdPublishPayload),
    Response(RdDiscoveryPayload),
}

impl RdPayload {
    /// Empty payload of the given type.
    pub fn empty(kind: RdPayloadType) -> Self {
        match kind {
            RdPayloadType::Discovery => Self::Discovery(RdDiscoveryPayload::default()),
            RdPayloadType::Publish => Self::Publish(RdPublishPayload::default()),
            RdPayloadType::Response => Self::Response(RdDiscoveryPayload::default()),
        }
    }

    /// Publish payload carrying `records`.
    pub fn publish(records: Vec<PublishRecord>) -> Self {
        Self::Publish(RdPublishPayload { records })
    }

    /// Discriminant of this payload.
    pub fn payload_type(&self) -> RdPayloadType {
        match self {
            Self::Discovery(_) => RdPayloadType::Discovery,
            Self::Publish(_) => RdPayloadType::Publish,
            Self::Response(_) => RdPayloadType::Response,
        }
    }

    /// Discovery descriptor, if this payload carries one.
    pub fn discovery_descriptor(&self) -> Option<&DiscoveryDescriptor> {
        match self {
            Self::Discovery(body) | Self::Response(body) => body.descriptor.as_ref(),
            Self::Publish(_) => None,
        }
    }

    /// Links listed by a discovery payload.
    pub fn discovery_links(&self) -> &[PublishedLink] {
        match self {
            Self::Discovery(body) | Self::Response(body) => &body.links,
            Self::Publish(_) => &[],
        }
    }

    /// Mutable discovery body (discovery listings and acknowledgements).
    pub fn as_discovery_mut(&mut self) -> Option<&mut RdDiscoveryPayload> {
        match self {
            Self::Discovery(body) | Self::Response(body) => Some(body),
            Self::Publish(_) => None,
        }
    }

    /// Published records, if this is a publish payload.
    pub fn publish_records(&self) -> Option<&[PublishRecord]> {
        match self {
            Self::Publish(body) => Some(body.records.as_slice()),
            _ => None,
        }
    }

    /// Re-tag a discovery payload as a response, keeping its body.
    pub fn mark_as_response(&mut self) {
        if let Self::Discovery(body) = self {
            let body = std::mem::take(body);
            *self = Self::Response(body);
        }
    }
}

/// Allocation failure reported by a [`PayloadFactory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no memory for {0}")]
pub struct NoMemory(pub &'static str);

/// Creates and releases RD payloads.
pub trait PayloadFactory: Send + Sync {
    /// Allocate an empty payload of the given type.
    fn create_payload(&self, kind: RdPayloadType) -> Result<RdPayload, NoMemory>;

    /// Allocate a discovery descriptor carrying `bias`.
    fn create_discovery_descriptor(&self, bias: u8) -> Result<DiscoveryDescriptor, NoMemory>;

    /// Release a payload obtained from [`PayloadFactory::create_payload`].
    fn destroy_payload(&self, payload: RdPayload);
}

/// Heap-backed payload factory with a budget of outstanding payloads.
#[derive(Debug)]
pub struct HeapPayloadFactory {
    max_outstanding: usize,
    outstanding: AtomicUsize,
}

impl HeapPayloadFactory {
    /// Create a factory allowing at most `max_outstanding` live payloads.
    pub fn new(max_outstanding: usize) -> Self {
        Self {
            max_outstanding,
            outstanding: AtomicUsize::new(0),
        }
    }

    /// Payloads created and not yet destroyed.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }
}

impl PayloadFactory for HeapPayloadFactory {
    fn create_payload(&self, kind: RdPayloadType) -> Result<RdPayload, NoMemory> {
        let max = self.max_outstanding;
        self.outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .map_err(|_| NoMemory("rd payload"))?;
        Ok(RdPayload::empty(kind))
    }

    fn create_discovery_descriptor(&self, bias: u8) -> Result<DiscoveryDescriptor, NoMemory> {
        Ok(DiscoveryDescriptor { bias })
    }

    fn destroy_payload(&self, payload: RdPayload) {
        drop(payload);
        let _ = self
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }
}

/// Scoped owner of a factory-allocated payload.
///
/// Dropping the guard hands the payload back to its factory.
pub struct PayloadGuard<'f> {
    factory: &'f dyn PayloadFactory,
    payload: RdPayload,
}

impl<'f> PayloadGuard<'f> {
    /// Allocate a payload of `kind` from `factory`.
    pub fn allocate(factory: &'f dyn PayloadFactory, kind: RdPayloadType) -> Result<Self, NoMemory> {
        let payload = factory.create_payload(kind)?;
        Ok(Self { factory, payload })
    }
}

impl Deref for PayloadGuard<'_> {
    type Target = RdPayload;

    fn deref(&self) -> &RdPayload {
        &self.payload
    }
}

impl DerefMut for PayloadGuard<'_> {
    fn deref_mut(&mut self) -> &mut RdPayload {
        &mut self.payload
    }
}

impl Drop for PayloadGuard<'_> {
    fn drop(&mut self) {
        let payload = std::mem::replace(
            &mut self.payload,
            RdPayload::Discovery(RdDiscoveryPayload::default()),
        );
        self.factory.destroy_payload(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> PublishRecord {
        PublishRecord::new("device-1").with_link(
            ResourceLink::new("/a/light")
                .with_type("core.light")
                .with_interface("oic.if.baseline")
                .with_properties(ResourceProperties::DISCOVERABLE),
        )
    }

    #[test]
    fn test_payload_type() {
        assert_eq!(
            RdPayload::empty(RdPayloadType::Discovery).payload_type(),
            RdPayloadType::Discovery
        );
        assert_eq!(
            RdPayload::publish(vec![sample_record()]).payload_type(),
            RdPayloadType::Publish
        );
    }

    #[test]
    fn test_mark_as_response_keeps_body() {
        let mut payload = RdPayload::Discovery(RdDiscoveryPayload {
            descriptor: Some(DiscoveryDescriptor { bias: 42 }),
            ..Default::default()
        });
        payload.mark_as_response();
        assert_eq!(payload.payload_type(), RdPayloadType::Response);
        assert_eq!(payload.discovery_descriptor().map(|d| d.bias), Some(42));
    }

    #[test]
    fn test_mark_as_response_ignores_publish() {
        let mut payload = RdPayload::publish(vec![sample_record()]);
        payload.mark_as_response();
        assert_eq!(payload.payload_type(), RdPayloadType::Publish);
    }

    #[test]
    fn test_publish_wire_format() {
        let payload = RdPayload::publish(vec![sample_record()]);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["rd_type"], "publish");
        assert_eq!(json["records"][0]["device_id"], "device-1");
        assert_eq!(json["records"][0]["links"][0]["rt"][0], "core.light");
        assert_eq!(json["records"][0]["links"][0]["p"], 2);

        let parsed: RdPayload = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, payload);
    }

    #[test]
    fn test_discovery_listing_wire_format() {
        let payload = RdPayload::Discovery(RdDiscoveryPayload {
            descriptor: Some(DiscoveryDescriptor { bias: 100 }),
            links: vec![PublishedLink {
                device_id: "device-1".into(),
                link: ResourceLink::new("/a/light").with_type("core.light"),
            }],
        });
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["rd_type"], "discovery");
        assert_eq!(json["descriptor"]["bias"], 100);
        assert_eq!(json["links"][0]["device_id"], "device-1");
        assert_eq!(json["links"][0]["link"]["href"], "/a/light");

        let parsed: RdPayload = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.discovery_links().len(), 1);
    }

    #[test]
    fn test_empty_listing_is_omitted() {
        let json = serde_json::to_value(RdPayload::empty(RdPayloadType::Response)).unwrap();
        assert!(json.get("links").is_none());
    }

    #[test]
    fn test_discovery_without_descriptor_parses() {
        let parsed: RdPayload = serde_json::from_str(r#"{"rd_type":"response"}"#).unwrap();
        assert_eq!(parsed.payload_type(), RdPayloadType::Response);
        assert!(parsed.discovery_descriptor().is_none());
    }

    #[test]
    fn test_heap_factory_budget() {
        let factory = HeapPayloadFactory::new(1);
        let first = factory.create_payload(RdPayloadType::Discovery).unwrap();
        assert_eq!(factory.outstanding(), 1);
        assert_eq!(
            factory.create_payload(RdPayloadType::Discovery),
            Err(NoMemory("rd payload"))
        );

        factory.destroy_payload(first);
        assert_eq!(factory.outstanding(), 0);
        assert!(factory.create_payload(RdPayloadType::Publish).is_ok());
    }

    #[test]
    fn test_destroy_never_underflows() {
        let factory = HeapPayloadFactory::new(4);
        factory.destroy_payload(RdPayload::empty(RdPayloadType::Response));
        assert_eq!(factory.outstanding(), 0);
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let factory = HeapPayloadFactory::new(8);
        {
            let mut guard = PayloadGuard::allocate(&factory, RdPayloadType::Discovery).unwrap();
            guard.mark_as_response();
            assert_eq!(guard.payload_type(), RdPayloadType::Response);
            assert_eq!(factory.outstanding(), 1);
        }
        assert_eq!(factory.outstanding(), 0);
    }

    #[test]
    fn test_properties_mask() {
        let props = ResourceProperties::ACTIVE
            | ResourceProperties::DISCOVERABLE
            | ResourceProperties::OBSERVABLE;
        assert_eq!(props.bits(), 0b111);
        assert!(props.contains(ResourceProperties::OBSERVABLE));
        assert!(!ResourceProperties::ACTIVE.contains(ResourceProperties::DISCOVERABLE));
    }
}
