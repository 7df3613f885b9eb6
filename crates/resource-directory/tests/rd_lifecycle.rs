// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic

//! Service lifecycle and request handling against the mock transport stack.

use resource_directory::server::payload::{PublishRecord, RdPayload, ResourceLink};
use resource_directory::server::request::{
    EntityHandlerFlag, EntityHandlerRequest, EntityHandlerResult, Method, PayloadKind,
    RequestHandle, ResourceHandle, StackPayload,
};
use resource_directory::server::{
    HeapPayloadFactory, InMemoryResourceStore, MockTransport, RdPayloadType, ResourceDirectory,
    ResourceProperties, StackError, StackMode,
};
use resource_directory::RdConfig;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    transport: Arc<MockTransport>,
    factory: Arc<HeapPayloadFactory>,
    store: Arc<InMemoryResourceStore>,
    rd: ResourceDirectory<MockTransport>,
}

fn harness(bias: u8) -> Harness {
    let config = RdConfig {
        discovery_bias: bias,
        ..Default::default()
    };
    let transport = Arc::new(MockTransport::new());
    let factory = Arc::new(HeapPayloadFactory::new(4));
    let store = Arc::new(InMemoryResourceStore::new(Duration::from_secs(60)));
    let rd = ResourceDirectory::new(&config, transport.clone(), factory.clone(), store.clone());
    Harness {
        transport,
        factory,
        store,
        rd,
    }
}

fn request(method: Method, id: u64) -> EntityHandlerRequest {
    EntityHandlerRequest::new(method, RequestHandle(id), ResourceHandle(1))
}

#[test]
fn start_registers_rd_resource_in_client_server_mode() {
    let h = harness(100);
    let handle = h.rd.start().expect("start");

    assert_eq!(h.transport.mode(), Some(StackMode::ClientServer));
    let resources = h.transport.resources();
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].0, handle);
    assert_eq!(resources[0].1.resource_type, "oic.wk.rd");
    assert_eq!(resources[0].1.interface, "oic.if.baseline");
    assert_eq!(resources[0].1.uri, "/oic/rd");
    assert_eq!(
        resources[0].1.properties,
        ResourceProperties::ACTIVE | ResourceProperties::DISCOVERABLE | ResourceProperties::OBSERVABLE
    );

    h.rd.stop().expect("stop");
    assert!(h.transport.resources().is_empty());
    assert!(h.transport.mode().is_none());
}

#[test]
fn stop_when_never_started_reports_stack_error() {
    let h = harness(100);
    assert_eq!(h.rd.stop(), Err(StackError::NotInitialized));
}

#[test]
fn repeated_discovery_returns_same_bias() {
    let h = harness(37);
    h.rd.start().expect("start");

    for id in 1..=2 {
        let req = request(Method::Get, id);
        let result = h
            .transport
            .deliver("/oic/rd", EntityHandlerFlag::REQUEST, Some(&req));
        assert_eq!(result, Some(EntityHandlerResult::Error));
    }

    let responses = h.transport.responses();
    assert_eq!(responses.len(), 2);
    for (i, response) in responses.iter().enumerate() {
        assert_eq!(response.request_handle, RequestHandle(i as u64 + 1));
        assert_eq!(response.result, EntityHandlerResult::Ok);
        assert_eq!(response.payload_kind, PayloadKind::Rd);
        assert_eq!(response.payload.payload_type(), RdPayloadType::Discovery);
        assert_eq!(
            response.payload.discovery_descriptor().map(|d| d.bias),
            Some(37)
        );
    }
    assert_eq!(h.factory.outstanding(), 0);
}

#[test]
fn discover_method_is_answered_like_get() {
    let h = harness(5);
    h.rd.start().expect("start");

    let req = request(Method::Discover, 9);
    h.transport
        .deliver("/oic/rd", EntityHandlerFlag::REQUEST, Some(&req));

    let responses = h.transport.responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(
        responses[0].payload.discovery_descriptor().map(|d| d.bias),
        Some(5)
    );
}

#[test]
fn publish_stores_records_and_acknowledges() {
    let h = harness(100);
    h.rd.start().expect("start");

    let records = vec![PublishRecord::new("dev-1")
        .with_link(ResourceLink::new("/a/light").with_type("core.light"))
        .with_link(ResourceLink::new("/a/fan").with_type("core.fan"))];
    let req = request(Method::Post, 1).with_payload(StackPayload::Rd(RdPayload::publish(records)));

    let result = h
        .transport
        .deliver("/oic/rd", EntityHandlerFlag::REQUEST, Some(&req));
    assert_eq!(result, Some(EntityHandlerResult::Error));

    assert_eq!(h.store.device_count(), 1);
    assert_eq!(h.store.link_count(), 2);
    assert_eq!(h.store.resources_of_type("core.light").len(), 1);

    let responses = h.transport.responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].payload.payload_type(), RdPayloadType::Response);
    assert_eq!(h.factory.outstanding(), 0);
}

#[test]
fn discovery_lists_published_links_by_type() {
    let h = harness(80);
    h.rd.start().expect("start");

    let records = vec![
        PublishRecord::new("dev-2").with_link(ResourceLink::new("/b/light").with_type("core.light")),
        PublishRecord::new("dev-1")
            .with_link(ResourceLink::new("/a/light").with_type("core.light"))
            .with_link(ResourceLink::new("/a/fan").with_type("core.fan")),
    ];
    let post = request(Method::Post, 1).with_payload(StackPayload::Rd(RdPayload::publish(records)));
    h.transport
        .deliver("/oic/rd", EntityHandlerFlag::REQUEST, Some(&post));

    let get = request(Method::Get, 2).with_query("rt=core.light");
    h.transport
        .deliver("/oic/rd", EntityHandlerFlag::REQUEST, Some(&get));

    let responses = h.transport.responses();
    assert_eq!(responses.len(), 2);
    let listing = &responses[1].payload;
    assert_eq!(listing.discovery_descriptor().map(|d| d.bias), Some(80));
    let found: Vec<_> = listing
        .discovery_links()
        .iter()
        .map(|l| (l.device_id.as_str(), l.link.href.as_str()))
        .collect();
    assert_eq!(found, vec![("dev-1", "/a/light"), ("dev-2", "/b/light")]);
    assert_eq!(h.factory.outstanding(), 0);
}

#[test]
fn unhandled_methods_produce_no_response() {
    let h = harness(100);
    h.rd.start().expect("start");

    for (id, method) in [
        Method::Put,
        Method::Delete,
        Method::Observe,
        Method::ObserveAll,
        Method::CancelObserve,
        Method::Presence,
        Method::NoMethod,
    ]
    .into_iter()
    .enumerate()
    {
        let req = request(method, id as u64);
        let result = h
            .transport
            .deliver("/oic/rd", EntityHandlerFlag::REQUEST, Some(&req));
        assert_eq!(result, Some(EntityHandlerResult::Error), "{}", method);
    }

    assert!(h.transport.responses().is_empty());
    assert_eq!(h.store.device_count(), 0);
}

#[test]
fn events_without_request_flag_are_ignored() {
    let h = harness(100);
    h.rd.start().expect("start");

    let req = request(Method::Get, 1);
    let result = h
        .transport
        .deliver("/oic/rd", EntityHandlerFlag::INIT, Some(&req));
    assert_eq!(result, Some(EntityHandlerResult::Error));

    let result = h
        .transport
        .deliver("/oic/rd", EntityHandlerFlag::REQUEST, None);
    assert_eq!(result, Some(EntityHandlerResult::Error));

    assert!(h.transport.responses().is_empty());
}

#[test]
fn failed_submission_releases_payloads() {
    let h = harness(100);
    h.rd.start().expect("start");
    h.transport.set_fail_responses(true);

    let get = request(Method::Get, 1);
    h.transport
        .deliver("/oic/rd", EntityHandlerFlag::REQUEST, Some(&get));
    let post = request(Method::Post, 2).with_payload(StackPayload::Rd(RdPayload::publish(vec![
        PublishRecord::new("dev-2").with_link(ResourceLink::new("/b")),
    ])));
    h.transport
        .deliver("/oic/rd", EntityHandlerFlag::REQUEST, Some(&post));

    assert!(h.transport.responses().is_empty());
    assert_eq!(h.store.device_count(), 1);
    assert_eq!(h.factory.outstanding(), 0);
}
