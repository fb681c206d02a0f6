//! flingdeck - companion for cast-capable devices
//!
//! Lists the apps and media sources a discovery service reports for nearby
//! devices, and resolves each row's icon lazily over the network.
//!
//! # Modules
//!
//! - `models` - Items, icons, devices and catalog entries
//! - `sources` - Source managers producing ordered Item snapshots
//! - `api` - Catalog and icon HTTP clients
//! - `download` - Cancellable one-shot icon downloader
//! - `discovery` - Discovery events and the catalog poller
//! - `controller` - List controller wiring discovery, rows and downloads
//! - `table` - Headless table view
//! - `config` - Config file handling

pub mod api;
pub mod config;
pub mod controller;
pub mod discovery;
pub mod download;
pub mod error;
pub mod models;
pub mod sources;
pub mod table;

// Re-export commonly used types
pub use models::{AppEntry, CatalogDocument, Device, Icon, Item, ItemKey, ItemKind, MediaEntry};

pub use api::{CatalogClient, HttpFetcher, IconFetcher};
pub use controller::{ListController, RowAction, RowEvent, RowIcon, TableView};
pub use discovery::{CatalogPoller, DeviceCommand, DiscoveryEvent};
pub use download::{DownloadState, IconDownloader};
pub use error::{DecodeError, FetchError, IconError};
pub use sources::{AppItemManager, Apps, Catalog, ItemSource, MediaSourceManager, MediaSources, SourceManager};
pub use table::HeadlessTable;
