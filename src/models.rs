//! Core data models for flingdeck
//!
//! Items (installable apps and media sources), their decoded icons,
//! and the cast-capable devices reported by discovery.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use crate::error::DecodeError;

// =============================================================================
// Item Identity
// =============================================================================

static NEXT_ITEM_KEY: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one Item instance.
///
/// Two Items materialized from different snapshots never share a key, even
/// when they describe the same package or URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemKey(u64);

impl ItemKey {
    fn next() -> Self {
        ItemKey(NEXT_ITEM_KEY.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// Icons
// =============================================================================

/// A fully decoded icon image
#[derive(Debug, Clone)]
pub struct Icon {
    image: Arc<image::RgbaImage>,
}

impl Icon {
    /// Decode raw bytes (PNG, JPEG, GIF, WebP) into an icon.
    ///
    /// Pure and synchronous; callers run it off the UI context.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }
        let image = image::load_from_memory(bytes)?.to_rgba8();
        Ok(Self {
            image: Arc::new(image),
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// RGBA8 pixel buffer
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }
}

// =============================================================================
// Items
// =============================================================================

/// Which catalogue an item came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// Installable app on a device
    App,
    /// Media or content source
    Media,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::App => write!(f, "app"),
            ItemKind::Media => write!(f, "media"),
        }
    }
}

/// One listable entity: an installable app or a media source.
///
/// Everything except `icon` is fixed at creation. The icon is written at most
/// once, by the downloader that owns the in-flight fetch, and only ever holds a
/// fully decoded image.
#[derive(Debug)]
pub struct Item {
    key: ItemKey,
    pub kind: ItemKind,
    pub title: String,
    /// Package name for apps, content URL for media
    pub identifier: String,
    /// Empty means "no icon"
    pub icon_url: String,
    /// Store catalogue id (ASIN) for apps
    pub secondary_id: Option<String>,
    /// Media only
    pub metadata: BTreeMap<String, String>,
    icon: OnceLock<Icon>,
}

impl Item {
    pub fn new(
        kind: ItemKind,
        identifier: impl Into<String>,
        title: impl Into<String>,
        icon_url: impl Into<String>,
    ) -> Self {
        Self {
            key: ItemKey::next(),
            kind,
            title: title.into(),
            identifier: identifier.into(),
            icon_url: icon_url.into(),
            secondary_id: None,
            metadata: BTreeMap::new(),
            icon: OnceLock::new(),
        }
    }

    /// Installable app
    pub fn app(
        package_name: impl Into<String>,
        title: impl Into<String>,
        icon_url: impl Into<String>,
    ) -> Self {
        Self::new(ItemKind::App, package_name, title, icon_url)
    }

    /// Media source
    pub fn media(
        url: impl Into<String>,
        title: impl Into<String>,
        icon_url: impl Into<String>,
    ) -> Self {
        Self::new(ItemKind::Media, url, title, icon_url)
    }

    pub fn with_secondary_id(mut self, id: impl Into<String>) -> Self {
        self.secondary_id = Some(id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn key(&self) -> ItemKey {
        self.key
    }

    pub fn has_icon_url(&self) -> bool {
        !self.icon_url.trim().is_empty()
    }

    pub fn icon(&self) -> Option<&Icon> {
        self.icon.get()
    }

    /// Store the decoded icon. Returns false if one was already set.
    pub(crate) fn set_icon(&self, icon: Icon) -> bool {
        self.icon.set(icon).is_ok()
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.title, self.identifier)
    }
}

// =============================================================================
// Catalog Entries
// =============================================================================

/// Raw app entry as reported by discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppEntry {
    pub package_name: String,
    pub title: String,
    #[serde(default, alias = "iconurl")]
    pub icon_url: String,
    #[serde(default)]
    pub asin: Option<String>,
}

/// Raw media source entry as reported by discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaEntry {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub icon_url: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Full catalog document published by the discovery endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub apps: Vec<AppEntry>,
    #[serde(default)]
    pub media: Vec<MediaEntry>,
}

// =============================================================================
// Devices
// =============================================================================

fn default_port() -> u16 {
    8009
}

/// Cast-capable device reported by discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub address: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub model: Option<String>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.model {
            Some(model) => write!(f, "{} ({}) - {}", self.name, model, self.address),
            None => write!(f, "{} - {}", self.name, self.address),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([255, 0, 128, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_item_keys_are_unique() {
        let a = Item::app("pkg.a", "Alpha", "");
        let b = Item::app("pkg.a", "Alpha", "");
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn test_empty_icon_url_means_no_icon() {
        assert!(!Item::app("pkg.b", "Beta", "").has_icon_url());
        assert!(!Item::app("pkg.b", "Beta", "   ").has_icon_url());
        assert!(Item::app("pkg.a", "Alpha", "http://x/a.png").has_icon_url());
    }

    #[test]
    fn test_icon_written_once() {
        let item = Item::app("pkg.a", "Alpha", "http://x/a.png");
        assert!(item.icon().is_none());

        let first = Icon::decode(&png_bytes(4, 4)).unwrap();
        let second = Icon::decode(&png_bytes(8, 8)).unwrap();
        assert!(item.set_icon(first));
        assert!(!item.set_icon(second));
        assert_eq!(item.icon().map(|i| i.width()), Some(4));
    }

    #[test]
    fn test_decode_png() {
        let icon = Icon::decode(&png_bytes(3, 2)).unwrap();
        assert_eq!(icon.width(), 3);
        assert_eq!(icon.height(), 2);
        assert_eq!(icon.pixels().len(), 3 * 2 * 4);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(Icon::decode(b""), Err(DecodeError::Empty)));
        assert!(matches!(
            Icon::decode(b"<html>not an image</html>"),
            Err(DecodeError::Image(_))
        ));
    }

    #[test]
    fn test_catalog_document_parses_original_field_names() {
        let json = r#"{
            "devices": [{"id": "d1", "name": "Living Room TV", "address": "192.168.1.50"}],
            "apps": [
                {"packageName": "pkg.a", "title": "Alpha", "iconurl": "http://x/a.png", "asin": "B00A"},
                {"packageName": "pkg.b", "title": "Beta"}
            ],
            "media": [
                {"url": "http://x/m.mp4", "title": "Movie", "iconUrl": "http://x/m.png",
                 "metadata": {"type": "video/mp4"}}
            ]
        }"#;

        let doc: CatalogDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.devices[0].port, 8009);
        assert_eq!(doc.apps[0].icon_url, "http://x/a.png");
        assert_eq!(doc.apps[0].asin.as_deref(), Some("B00A"));
        assert_eq!(doc.apps[1].icon_url, "");
        assert_eq!(doc.media[0].metadata.get("type").map(String::as_str), Some("video/mp4"));
    }

    #[test]
    fn test_device_display() {
        let device = Device {
            id: "d1".into(),
            name: "Bedroom".into(),
            address: "10.0.0.2".parse().unwrap(),
            port: 8009,
            model: Some("Fire TV Stick".into()),
        };
        assert_eq!(device.to_string(), "Bedroom (Fire TV Stick) - 10.0.0.2");
    }
}
