// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Storage of published resource links.

use super::payload::{PublishRecord, PublishedLink, ResourceLink};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Storage of published links.
///
/// Publishing is fire-and-forget: the publish flow never sees a storage outcome.
pub trait ResourceStore: Send + Sync {
    /// Store the links declared by `records`.
    fn store_published_resources(&self, records: &[PublishRecord]);

    /// Links answering a discovery `query` (`rt=<type>` filters by resource type).
    fn find_resources(&self, query: &str) -> Vec<PublishedLink>;
}

/// Filters understood by [`ResourceStore::find_resources`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceQuery {
    /// Resource type filter (`rt=`)
    pub resource_type: Option<String>,

    /// Interface filter (`if=`)
    pub interface: Option<String>,
}

impl ResourceQuery {
    /// Parse a `key=value` query joined by `&` or `;`. Unknown keys are ignored.
    pub fn parse(query: &str) -> Self {
        let mut parsed = Self::default();
        for pair in query.split(|c| c == '&' || c == ';') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            match key.trim() {
                "rt" => parsed.resource_type = Some(value.trim().to_string()),
                "if" => parsed.interface = Some(value.trim().to_string()),
                _ => {}
            }
        }
        parsed
    }

    fn matches(&self, link: &ResourceLink) -> bool {
        let rt_ok = self
            .resource_type
            .as_ref()
            .map_or(true, |rt| link.resource_types.iter().any(|t| t == rt));
        let if_ok = self
            .interface
            .as_ref()
            .map_or(true, |iface| link.interfaces.iter().any(|i| i == iface));
        rt_ok && if_ok
    }
}

#[derive(Debug)]
struct DeviceEntry {
    /// Links in order of first publication, unique by href
    links: Vec<ResourceLink>,

    /// Lifetime granted by the last publication
    ttl: Duration,

    /// Last publication timestamp
    last_seen: Instant,
}

impl DeviceEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_seen) > self.ttl
    }
}

#[derive(Debug, Default)]
struct Tables {
    /// Devices indexed by device id
    devices: HashMap<String, DeviceEntry>,

    /// Resource type -> (device id, href)
    type_index: HashMap<String, Vec<(String, String)>>,
}

impl Tables {
    fn unindex_device(&mut self, device_id: &str) {
        for entries in self.type_index.values_mut() {
            entries.retain(|(dev, _)| dev != device_id);
        }
        self.type_index.retain(|_, entries| !entries.is_empty());
    }

    fn index_device(&mut self, device_id: &str) {
        let Some(entry) = self.devices.get(device_id) else {
            return;
        };
        for link in &entry.links {
            for rt in &link.resource_types {
                self.type_index
                    .entry(rt.clone())
                    .or_default()
                    .push((device_id.to_string(), link.href.clone()));
            }
        }
    }
}

/// Published links held in memory, expiring per device lease.
#[derive(Debug)]
pub struct InMemoryResourceStore {
    default_ttl: Duration,
    tables: RwLock<Tables>,
}

impl InMemoryResourceStore {
    /// Create an empty store granting `default_ttl` to records without a ttl.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            tables: RwLock::new(Tables::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        match self.tables.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        match self.tables.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Add or refresh one device's links. Returns false if the record was rejected.
    pub fn upsert(&self, record: &PublishRecord) -> bool {
        if record.device_id.is_empty() {
            warn!("Rejecting publish record without device id");
            return false;
        }

        let valid: Vec<&ResourceLink> = record
            .links
            .iter()
            .filter(|link| {
                if link.href.is_empty() {
                    warn!("Dropping link without href from {}", record.device_id);
                }
                !link.href.is_empty()
            })
            .collect();
        if valid.is_empty() {
            warn!("Rejecting publish record without links from {}", record.device_id);
            return false;
        }

        let ttl = match record.ttl_secs {
            Some(secs) if secs > 0 => Duration::from_secs(secs),
            _ => self.default_ttl,
        };
        let now = Instant::now();

        let mut tables = self.write();
        let entry = tables
            .devices
            .entry(record.device_id.clone())
            .or_insert_with(|| DeviceEntry {
                links: Vec::new(),
                ttl,
                last_seen: now,
            });
        entry.ttl = ttl;
        entry.last_seen = now;

        for link in valid {
            match entry.links.iter_mut().find(|l| l.href == link.href) {
                Some(existing) => *existing = link.clone(),
                None => entry.links.push(link.clone()),
            }
        }

        tables.unindex_device(&record.device_id);
        tables.index_device(&record.device_id);
        true
    }

    /// Remove a device and return its links.
    pub fn remove_device(&self, device_id: &str) -> Option<Vec<ResourceLink>> {
        let mut tables = self.write();
        let entry = tables.devices.remove(device_id)?;
        tables.unindex_device(device_id);
        Some(entry.links)
    }

    /// Remove devices whose lease has run out and return their ids.
    pub fn remove_expired(&self) -> Vec<String> {
        self.remove_expired_at(Instant::now())
    }

    /// Remove devices whose lease has run out at `now`.
    pub fn remove_expired_at(&self, now: Instant) -> Vec<String> {
        let mut tables = self.write();
        let expired: Vec<String> = tables
            .devices
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            tables.devices.remove(id);
            tables.unindex_device(id);
        }
        expired
    }

    /// Links advertising resource type `rt`.
    pub fn resources_of_type(&self, rt: &str) -> Vec<PublishedLink> {
        let tables = self.read();
        let Some(entries) = tables.type_index.get(rt) else {
            return Vec::new();
        };
        entries
            .iter()
            .filter_map(|(device_id, href)| {
                let entry = tables.devices.get(device_id)?;
                let link = entry.links.iter().find(|l| &l.href == href)?;
                Some(PublishedLink {
                    device_id: device_id.clone(),
                    link: link.clone(),
                })
            })
            .collect()
    }

    /// Every stored link matching `query`, ordered by device id then publication order.
    pub fn lookup(&self, query: &ResourceQuery) -> Vec<PublishedLink> {
        let tables = self.read();
        let mut devices: Vec<_> = tables.devices.iter().collect();
        devices.sort_unstable_by(|a, b| a.0.cmp(b.0));

        let mut found = Vec::new();
        for (device_id, entry) in devices {
            for link in entry.links.iter().filter(|l| query.matches(l)) {
                found.push(PublishedLink {
                    device_id: device_id.clone(),
                    link: link.clone(),
                });
            }
        }
        found
    }

    /// Links published by one device.
    pub fn device_links(&self, device_id: &str) -> Option<Vec<ResourceLink>> {
        self.read().devices.get(device_id).map(|e| e.links.clone())
    }

    /// Number of devices with live links.
    pub fn device_count(&self) -> usize {
        self.read().devices.len()
    }

    /// Number of stored links across all devices.
    pub fn link_count(&self) -> usize {
        self.read().devices.values().map(|e| e.links.len()).sum()
    }
}

impl ResourceStore for InMemoryResourceStore {
    fn store_published_resources(&self, records: &[PublishRecord]) {
        let accepted = records.iter().filter(|r| self.upsert(r)).count();
        debug!(
            "Stored {} of {} publish records ({} devices)",
            accepted,
            records.len(),
            self.device_count()
        );
    }

    fn find_resources(&self, query: &str) -> Vec<PublishedLink> {
        let found = self.lookup(&ResourceQuery::parse(query));
        debug!("Query '{}' matched {} links", query, found.len());
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light(href: &str) -> ResourceLink {
        ResourceLink::new(href)
            .with_type("core.light")
            .with_interface("oic.if.baseline")
    }

    fn store() -> InMemoryResourceStore {
        InMemoryResourceStore::new(Duration::from_secs(60))
    }

    #[test]
    fn test_store_new() {
        let store = store();
        assert_eq!(store.device_count(), 0);
        assert_eq!(store.link_count(), 0);
    }

    #[test]
    fn test_store_published_resources() {
        let store = store();
        store.store_published_resources(&[
            PublishRecord::new("dev-1").with_link(light("/a/light")),
            PublishRecord::new("dev-2")
                .with_link(light("/a/light"))
                .with_link(ResourceLink::new("/a/fan").with_type("core.fan")),
        ]);

        assert_eq!(store.device_count(), 2);
        assert_eq!(store.link_count(), 3);
        assert_eq!(store.resources_of_type("core.light").len(), 2);
        assert_eq!(store.resources_of_type("core.fan").len(), 1);
        assert!(store.resources_of_type("core.door").is_empty());
    }

    #[test]
    fn test_republish_replaces_same_href() {
        let store = store();
        store.upsert(&PublishRecord::new("dev-1").with_link(light("/a/light")));
        store.upsert(
            &PublishRecord::new("dev-1")
                .with_link(ResourceLink::new("/a/light").with_type("core.dimmer")),
        );

        assert_eq!(store.link_count(), 1);
        assert!(store.resources_of_type("core.light").is_empty());
        let dimmers = store.resources_of_type("core.dimmer");
        assert_eq!(dimmers.len(), 1);
        assert_eq!(dimmers[0].device_id, "dev-1");
    }

    #[test]
    fn test_republish_adds_new_href() {
        let store = store();
        store.upsert(&PublishRecord::new("dev-1").with_link(light("/a/light")));
        store.upsert(&PublishRecord::new("dev-1").with_link(light("/b/light")));

        assert_eq!(store.device_count(), 1);
        assert_eq!(store.link_count(), 2);
        assert_eq!(store.resources_of_type("core.light").len(), 2);
    }

    #[test]
    fn test_rejects_empty_device_id() {
        let store = store();
        assert!(!store.upsert(&PublishRecord::new("").with_link(light("/a"))));
        assert_eq!(store.device_count(), 0);
    }

    #[test]
    fn test_drops_link_without_href() {
        let store = store();
        store.upsert(
            &PublishRecord::new("dev-1")
                .with_link(light(""))
                .with_link(light("/ok")),
        );
        assert_eq!(store.device_links("dev-1").unwrap().len(), 1);
    }

    #[test]
    fn test_record_without_valid_links_is_rejected() {
        let store = store();
        assert!(!store.upsert(&PublishRecord::new("dev-1").with_link(light(""))));
        assert!(!store.upsert(&PublishRecord::new("dev-2")));
        assert_eq!(store.device_count(), 0);
    }

    #[test]
    fn test_record_without_valid_links_keeps_existing_lease() {
        let store = store();
        store.upsert(&PublishRecord::new("dev-1").with_ttl(10).with_link(light("/a")));
        assert!(!store.upsert(&PublishRecord::new("dev-1").with_ttl(3600).with_link(light(""))));

        let later = Instant::now() + Duration::from_secs(30);
        assert_eq!(store.remove_expired_at(later), vec!["dev-1".to_string()]);
    }

    #[test]
    fn test_query_parse() {
        let q = ResourceQuery::parse("rt=core.light&if=oic.if.baseline");
        assert_eq!(q.resource_type.as_deref(), Some("core.light"));
        assert_eq!(q.interface.as_deref(), Some("oic.if.baseline"));

        let q = ResourceQuery::parse("rt=;foo=bar;novalue");
        assert_eq!(q, ResourceQuery::default());
        assert_eq!(ResourceQuery::parse(""), ResourceQuery::default());
    }

    #[test]
    fn test_find_resources() {
        let store = store();
        store.store_published_resources(&[
            PublishRecord::new("dev-2").with_link(light("/b/light")),
            PublishRecord::new("dev-1")
                .with_link(light("/a/light"))
                .with_link(ResourceLink::new("/a/fan").with_type("core.fan")),
        ]);

        let all = store.find_resources("");
        let hrefs: Vec<_> = all
            .iter()
            .map(|p| (p.device_id.as_str(), p.link.href.as_str()))
            .collect();
        assert_eq!(
            hrefs,
            vec![("dev-1", "/a/light"), ("dev-1", "/a/fan"), ("dev-2", "/b/light")]
        );

        assert_eq!(store.find_resources("rt=core.light").len(), 2);
        assert_eq!(store.find_resources("rt=core.fan&if=oic.if.baseline").len(), 0);
        assert!(store.find_resources("rt=core.door").is_empty());
    }

    #[test]
    fn test_remove_device() {
        let store = store();
        store.upsert(&PublishRecord::new("dev-1").with_link(light("/a/light")));

        let removed = store.remove_device("dev-1");
        assert_eq!(removed.map(|l| l.len()), Some(1));
        assert_eq!(store.device_count(), 0);
        assert!(store.resources_of_type("core.light").is_empty());
        assert!(store.remove_device("dev-1").is_none());
    }

    #[test]
    fn test_remove_expired() {
        let store = store();
        store.upsert(&PublishRecord::new("short").with_ttl(10).with_link(light("/a")));
        store.upsert(&PublishRecord::new("default").with_link(light("/b")));

        let later = Instant::now() + Duration::from_secs(30);
        let expired = store.remove_expired_at(later);

        assert_eq!(expired, vec!["short".to_string()]);
        assert_eq!(store.device_count(), 1);
        assert_eq!(store.resources_of_type("core.light").len(), 1);
    }

    #[test]
    fn test_zero_ttl_uses_default() {
        let store = store();
        store.upsert(&PublishRecord::new("dev").with_ttl(0).with_link(light("/a")));

        let later = Instant::now() + Duration::from_secs(30);
        assert!(store.remove_expired_at(later).is_empty());
    }

    #[test]
    fn test_fresh_devices_not_expired() {
        let store = store();
        store.upsert(&PublishRecord::new("dev").with_link(light("/a")));
        assert!(store.remove_expired().is_empty());
    }
}
