//! Network clients
//!
//! - Catalog: discovery catalog endpoint (devices, apps, media sources)
//! - Icons: raw icon bytes for the downloader

pub mod catalog;
pub mod icons;

pub use catalog::{CatalogClient, CatalogError};
pub use icons::{HttpFetcher, IconFetcher};
