//! Discovery events and the catalog polling adapter
//!
//! The list controller only consumes [`DiscoveryEvent`]s: every event means
//! "something changed, re-pull the snapshot". [`CatalogPoller`] stands in for
//! the external discovery service by polling a catalog endpoint and emitting
//! events when the device set or the catalog's entries change.

use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::CatalogClient;
use crate::models::{CatalogDocument, Device};
use crate::sources::{Catalog, SourceManager};

/// Notification from the discovery service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// A device came into range
    DeviceDiscovered(Device),
    /// A device (by id) went away
    DeviceLost(String),
    /// The apps or media sources on offer changed
    SourcesChanged,
}

/// Command dispatched to the discovery service for a selected row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    Install {
        device: Option<Device>,
        identifier: String,
    },
    Launch {
        device: Option<Device>,
        identifier: String,
    },
}

impl DeviceCommand {
    pub fn identifier(&self) -> &str {
        match self {
            DeviceCommand::Install { identifier, .. } | DeviceCommand::Launch { identifier, .. } => {
                identifier
            }
        }
    }
}

/// Polls a catalog endpoint and turns changes into discovery events
pub struct CatalogPoller<C: Catalog> {
    client: CatalogClient,
    sources: Arc<SourceManager<C>>,
    interval: Duration,
    devices: BTreeMap<String, Device>,
    last_entries: Option<Vec<C::Entry>>,
}

impl<C: Catalog> CatalogPoller<C> {
    pub fn new(client: CatalogClient, sources: Arc<SourceManager<C>>, interval: Duration) -> Self {
        Self {
            client,
            sources,
            interval,
            devices: BTreeMap::new(),
            last_entries: None,
        }
    }

    /// Devices seen on the last successful poll
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    /// Fetch once, update the source manager and return the resulting events.
    ///
    /// The source manager is updated before any event is returned, so a
    /// listener re-pulling on `SourcesChanged` sees the new snapshot.
    pub async fn poll_once(&mut self) -> Result<Vec<DiscoveryEvent>> {
        let doc = self.client.fetch().await?;
        Ok(self.apply(&doc))
    }

    /// Diff a catalog document against the previous one
    pub fn apply(&mut self, doc: &CatalogDocument) -> Vec<DiscoveryEvent> {
        let mut events = Vec::new();

        let incoming: BTreeMap<String, Device> =
            doc.devices.iter().map(|d| (d.id.clone(), d.clone())).collect();

        let lost: Vec<String> = self
            .devices
            .keys()
            .filter(|id| !incoming.contains_key(*id))
            .cloned()
            .collect();
        for id in lost {
            if let Some(device) = self.devices.remove(&id) {
                info!(device = %device, "device lost");
            }
            events.push(DiscoveryEvent::DeviceLost(id));
        }

        for (id, device) in incoming {
            if self.devices.get(&id) != Some(&device) {
                info!(device = %device, "device discovered");
                events.push(DiscoveryEvent::DeviceDiscovered(device.clone()));
                self.devices.insert(id, device);
            }
        }

        let entries = C::entries(doc);
        if self.last_entries.as_deref() != Some(entries) {
            self.sources.replace(entries);
            self.last_entries = Some(entries.to_vec());
            events.push(DiscoveryEvent::SourcesChanged);
        }

        debug!(count = events.len(), "catalog poll applied");
        events
    }

    /// Poll until the receiving side goes away.
    ///
    /// Fetch failures are logged and retried on the next tick; discovery
    /// outages are not the listener's concern.
    pub async fn run(mut self, events: mpsc::Sender<DiscoveryEvent>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if events.is_closed() {
                break;
            }

            match self.poll_once().await {
                Ok(batch) => {
                    for event in batch {
                        if events.send(event).await.is_err() {
                            debug!("discovery listener gone, stopping poller");
                            return;
                        }
                    }
                }
                Err(e) => warn!(url = %self.client.url(), "catalog poll failed: {:#}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AppEntry;
    use crate::sources::{AppItemManager, Apps};

    fn poller() -> (CatalogPoller<Apps>, Arc<AppItemManager>) {
        let sources = Arc::new(AppItemManager::new());
        let poller = CatalogPoller::new(
            CatalogClient::new("http://127.0.0.1:9/catalog.json"),
            sources.clone(),
            Duration::from_secs(5),
        );
        (poller, sources)
    }

    fn device(id: &str, name: &str) -> Device {
        Device {
            id: id.into(),
            name: name.into(),
            address: "192.168.1.50".parse().unwrap(),
            port: 8009,
            model: None,
        }
    }

    fn doc(devices: Vec<Device>, apps: &[(&str, &str)]) -> CatalogDocument {
        CatalogDocument {
            devices,
            apps: apps
                .iter()
                .map(|(pkg, title)| AppEntry {
                    package_name: pkg.to_string(),
                    title: title.to_string(),
                    icon_url: String::new(),
                    asin: None,
                })
                .collect(),
            media: vec![],
        }
    }

    #[test]
    fn test_first_poll_reports_everything() {
        let (mut poller, sources) = poller();
        let events = poller.apply(&doc(vec![device("d1", "TV")], &[("pkg.a", "Alpha")]));

        assert_eq!(
            events,
            vec![
                DiscoveryEvent::DeviceDiscovered(device("d1", "TV")),
                DiscoveryEvent::SourcesChanged,
            ]
        );
        assert_eq!(sources.len(), 1);
    }

    #[test]
    fn test_unchanged_catalog_emits_nothing() {
        let (mut poller, sources) = poller();
        let d = doc(vec![device("d1", "TV")], &[("pkg.a", "Alpha")]);
        poller.apply(&d);
        let before = sources.get_all_sources();

        assert!(poller.apply(&d).is_empty());
        assert!(Arc::ptr_eq(&before, &sources.get_all_sources()));
    }

    #[test]
    fn test_device_lost_and_sources_changed() {
        let (mut poller, _) = poller();
        poller.apply(&doc(vec![device("d1", "TV"), device("d2", "Den")], &[("pkg.a", "Alpha")]));

        let events = poller.apply(&doc(vec![device("d2", "Den")], &[("pkg.a", "Alpha"), ("pkg.b", "Beta")]));
        assert_eq!(
            events,
            vec![
                DiscoveryEvent::DeviceLost("d1".into()),
                DiscoveryEvent::SourcesChanged,
            ]
        );
        assert_eq!(poller.devices().count(), 1);
    }

    #[test]
    fn test_other_catalog_changes_are_ignored() {
        let (mut poller, _) = poller();
        let mut d = doc(vec![], &[("pkg.a", "Alpha")]);
        poller.apply(&d);

        d.media.push(crate::models::MediaEntry {
            url: "http://x/m.mp4".into(),
            title: "Movie".into(),
            icon_url: String::new(),
            metadata: Default::default(),
        });
        assert!(poller.apply(&d).is_empty());
    }

    #[test]
    fn test_command_identifier() {
        let cmd = DeviceCommand::Launch {
            device: None,
            identifier: "pkg.a".into(),
        };
        assert_eq!(cmd.identifier(), "pkg.a");
    }
}
