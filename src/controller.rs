//! List controller
//!
//! Owns the rows shown by a table widget and the registry of in-flight icon
//! downloads. It is driven by three event streams, all handled on its own
//! sequence:
//!
//! - discovery events: re-pull the snapshot and reload the table
//! - row visibility events: start or cancel icon downloads
//! - download completions: unregister and redraw the affected row
//!
//! The registry is only ever touched here, never from download tasks.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::api::IconFetcher;
use crate::discovery::{DeviceCommand, DiscoveryEvent};
use crate::download::{DownloadId, IconDownloader};
use crate::models::{Device, Icon, Item, ItemKey};
use crate::sources::{ItemSource, Snapshot};

// =============================================================================
// Table Contract
// =============================================================================

/// What a row should show in its icon slot
#[derive(Debug, Clone)]
pub enum RowIcon {
    /// Decoded icon is available
    Resolved(Icon),
    /// A download is in flight
    Loading,
    /// No icon URL, or the last attempt failed or was cancelled
    Placeholder,
}

impl RowIcon {
    pub fn is_resolved(&self) -> bool {
        matches!(self, RowIcon::Resolved(_))
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, RowIcon::Placeholder)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, RowIcon::Loading)
    }
}

/// Table widget the controller renders into
pub trait TableView: Send {
    /// Replace every row
    fn reload_data(&mut self, rows: &[Arc<Item>]);

    /// Redraw a single row
    fn reload_row(&mut self, row: usize, item: &Arc<Item>, icon: RowIcon);
}

/// User action on a selected row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowAction {
    Install,
    Launch,
}

/// Row visibility and selection transitions reported by the table widget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowEvent {
    WillDisplay(usize),
    DidEndDisplay(usize),
    Selected(usize, RowAction),
}

/// Posted by a downloader's completion handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IconFinished {
    pub key: ItemKey,
    pub download: DownloadId,
}

// =============================================================================
// Controller
// =============================================================================

pub struct ListController<S: ItemSource, V: TableView> {
    sources: Arc<S>,
    fetcher: Arc<dyn IconFetcher>,
    view: V,
    rows: Snapshot,
    visible: BTreeSet<usize>,
    registry: HashMap<ItemKey, IconDownloader>,
    devices: BTreeMap<String, Device>,
    selected_device: Option<String>,
    finished_tx: mpsc::UnboundedSender<IconFinished>,
    finished_rx: Option<mpsc::UnboundedReceiver<IconFinished>>,
}

impl<S: ItemSource, V: TableView> ListController<S, V> {
    pub fn new(sources: Arc<S>, fetcher: Arc<dyn IconFetcher>, view: V) -> Self {
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        Self {
            sources,
            fetcher,
            view,
            rows: Arc::from(Vec::new()),
            visible: BTreeSet::new(),
            registry: HashMap::new(),
            devices: BTreeMap::new(),
            selected_device: None,
            finished_tx,
            finished_rx: Some(finished_rx),
        }
    }

    pub fn rows(&self) -> &[Arc<Item>] {
        &self.rows
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    pub fn into_view(mut self) -> V {
        self.teardown();
        let Self { view, .. } = self;
        view
    }

    /// Number of registered (in-flight) downloads
    pub fn active_downloads(&self) -> usize {
        self.registry.len()
    }

    pub fn is_downloading(&self, item: &Item) -> bool {
        self.registry.contains_key(&item.key())
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn selected_device(&self) -> Option<&Device> {
        self.selected_device.as_ref().and_then(|id| self.devices.get(id))
    }

    /// Target a device by id or name. Returns false if it is unknown.
    pub fn select_device(&mut self, id_or_name: &str) -> bool {
        let found = self
            .devices
            .values()
            .find(|d| d.id == id_or_name || d.name.eq_ignore_ascii_case(id_or_name))
            .map(|d| d.id.clone());
        match found {
            Some(id) => {
                self.selected_device = Some(id);
                true
            }
            None => false,
        }
    }

    /// Current icon state of a row
    pub fn row_icon(&self, row: usize) -> Option<RowIcon> {
        self.rows.get(row).map(|item| self.icon_for(item))
    }

    fn icon_for(&self, item: &Item) -> RowIcon {
        if let Some(icon) = item.icon() {
            RowIcon::Resolved(icon.clone())
        } else if self.registry.contains_key(&item.key()) {
            RowIcon::Loading
        } else {
            RowIcon::Placeholder
        }
    }

    // -- discovery -----------------------------------------------------------

    pub fn on_discovery_event(&mut self, event: DiscoveryEvent) {
        match &event {
            DiscoveryEvent::DeviceDiscovered(device) => {
                self.devices.insert(device.id.clone(), device.clone());
            }
            DiscoveryEvent::DeviceLost(id) => {
                self.devices.remove(id);
                if self.selected_device.as_deref() == Some(id.as_str()) {
                    self.selected_device = None;
                }
            }
            DiscoveryEvent::SourcesChanged => {}
        }
        debug!(?event, "discovery event");
        self.refresh();
    }

    /// Re-pull the snapshot, abandon the old rows and reload the table.
    ///
    /// Downloads for Items that left the snapshot are cancelled, not left to
    /// finish. An unchanged snapshot (device-only events) is a no-op.
    pub fn refresh(&mut self) {
        let snapshot = self.sources.snapshot();
        if Arc::ptr_eq(&snapshot, &self.rows) {
            trace!(active = self.registry.len(), "snapshot unchanged, keeping rows");
            return;
        }

        let live: HashSet<ItemKey> = snapshot.iter().map(|item| item.key()).collect();
        let before = self.registry.len();
        self.registry.retain(|key, downloader| {
            let keep = live.contains(key);
            if !keep {
                downloader.cancel_download();
            }
            keep
        });
        if self.registry.len() < before {
            debug!(count = before - self.registry.len(), "cancelled downloads for replaced items");
        }

        self.rows = snapshot;
        self.visible.retain(|row| *row < self.rows.len());
        info!(rows = self.rows.len(), "list refreshed");
        self.view.reload_data(&self.rows);

        let visible: Vec<usize> = self.visible.iter().copied().collect();
        for row in visible {
            self.display_row(row);
        }
    }

    // -- row visibility ------------------------------------------------------

    pub fn row_will_display(&mut self, row: usize) {
        if row >= self.rows.len() {
            trace!(row, "ignoring display of unknown row");
            return;
        }
        self.visible.insert(row);
        self.display_row(row);
    }

    pub fn row_did_end_display(&mut self, row: usize) {
        self.visible.remove(&row);
        let Some(item) = self.rows.get(row) else {
            return;
        };
        if let Some(downloader) = self.registry.remove(&item.key()) {
            downloader.cancel_download();
            debug!(row, item = %item, active = self.registry.len(), "row hidden, download cancelled");
        }
    }

    fn display_row(&mut self, row: usize) {
        let Some(item) = self.rows.get(row).cloned() else {
            return;
        };

        if item.icon().is_none() && item.has_icon_url() && !self.registry.contains_key(&item.key()) {
            self.start_icon_download(&item);
        }

        let icon = self.icon_for(&item);
        self.view.reload_row(row, &item, icon);
    }

    fn start_icon_download(&mut self, item: &Arc<Item>) {
        let key = item.key();
        let tx = self.finished_tx.clone();
        let downloader =
            IconDownloader::with_id_handler(item.clone(), self.fetcher.clone(), move |download| {
                let _ = tx.send(IconFinished { key, download });
            });

        debug!(item = %item, download = %downloader.id(), "registering icon download");
        downloader.start_download();
        self.registry.insert(key, downloader);
    }

    // -- completion ----------------------------------------------------------

    /// Unregister a finished download and redraw its row
    pub fn on_icon_finished(&mut self, finished: IconFinished) {
        let registered = self
            .registry
            .get(&finished.key)
            .map(|d| d.id() == finished.download)
            .unwrap_or(false);
        if !registered {
            trace!(download = %finished.download, "completion for unregistered download");
            return;
        }
        self.registry.remove(&finished.key);

        let Some(row) = self.rows.iter().position(|i| i.key() == finished.key) else {
            return;
        };
        if self.visible.contains(&row) {
            let item = self.rows[row].clone();
            let icon = self.icon_for(&item);
            self.view.reload_row(row, &item, icon);
        }
    }

    /// Handle every completion posted so far without waiting
    pub fn drain_finished(&mut self) -> usize {
        let mut pending = Vec::new();
        if let Some(rx) = self.finished_rx.as_mut() {
            while let Ok(finished) = rx.try_recv() {
                pending.push(finished);
            }
        }
        let count = pending.len();
        for finished in pending {
            self.on_icon_finished(finished);
        }
        count
    }

    /// Wait for the next completion and handle it.
    ///
    /// Returns false if no download is registered (nothing to wait for).
    pub async fn wait_for_icon(&mut self) -> bool {
        if self.registry.is_empty() {
            return false;
        }
        let next = match self.finished_rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        };
        match next {
            Some(finished) => {
                self.on_icon_finished(finished);
                true
            }
            None => false,
        }
    }

    // -- selection -----------------------------------------------------------

    /// Build the command for a selected row
    pub fn select_row(&self, row: usize, action: RowAction) -> Option<DeviceCommand> {
        let item = self.rows.get(row)?;
        let device = self.selected_device().cloned();
        let identifier = item.identifier.clone();
        Some(match action {
            RowAction::Install => DeviceCommand::Install { device, identifier },
            RowAction::Launch => DeviceCommand::Launch { device, identifier },
        })
    }

    // -- teardown ------------------------------------------------------------

    /// Cancel everything still in flight and forget visibility.
    ///
    /// Visible rows that were loading are redrawn, so the table never keeps
    /// a loading slot with no download behind it.
    pub fn teardown(&mut self) {
        let mut cancelled = HashSet::new();
        for (key, downloader) in self.registry.drain() {
            downloader.cancel_download();
            cancelled.insert(key);
        }
        if !cancelled.is_empty() {
            debug!(count = cancelled.len(), "cancelled in-flight downloads");
        }

        let visible = std::mem::take(&mut self.visible);
        for row in visible {
            let Some(item) = self.rows.get(row).cloned() else {
                continue;
            };
            if cancelled.contains(&item.key()) {
                let icon = self.icon_for(&item);
                self.view.reload_row(row, &item, icon);
            }
        }
    }

    /// Drive the controller from its event channels.
    ///
    /// Runs until both the discovery and row channels close, then tears down
    /// and hands the view back.
    pub async fn run(
        mut self,
        mut discovery: mpsc::Receiver<DiscoveryEvent>,
        mut row_events: mpsc::Receiver<RowEvent>,
        commands: mpsc::Sender<DeviceCommand>,
    ) -> V {
        let Some(mut finished) = self.finished_rx.take() else {
            return self.into_view();
        };
        let mut discovery_open = true;
        let mut rows_open = true;

        while discovery_open || rows_open {
            // Discovery first so row events never address a stale snapshot
            tokio::select! {
                biased;
                event = discovery.recv(), if discovery_open => match event {
                    Some(event) => self.on_discovery_event(event),
                    None => discovery_open = false,
                },
                event = row_events.recv(), if rows_open => match event {
                    Some(RowEvent::WillDisplay(row)) => self.row_will_display(row),
                    Some(RowEvent::DidEndDisplay(row)) => self.row_did_end_display(row),
                    Some(RowEvent::Selected(row, action)) => {
                        if let Some(command) = self.select_row(row, action) {
                            info!(?command, "dispatching device command");
                            if commands.send(command).await.is_err() {
                                debug!("command receiver gone");
                            }
                        }
                    }
                    None => rows_open = false,
                },
                Some(done) = finished.recv() => self.on_icon_finished(done),
            }
        }

        self.finished_rx = Some(finished);
        self.into_view()
    }
}
