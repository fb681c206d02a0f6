//! Source managers
//!
//! Cache the latest collection of Items reported by discovery and hand out
//! ordered snapshots. Apps and media sources share one implementation,
//! parameterized over a [`Catalog`] that knows how to materialize its entries.

use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

use crate::models::{AppEntry, CatalogDocument, Item, ItemKind, MediaEntry};

/// Ordered, immutable snapshot of Items
pub type Snapshot = Arc<[Arc<Item>]>;

/// Capability that turns raw discovery entries into Items
pub trait Catalog: Send + Sync + 'static {
    type Entry: Clone + PartialEq + Send + Sync;

    const KIND: ItemKind;

    /// Build a fresh Item for one entry
    fn materialize(entry: &Self::Entry) -> Item;

    /// Pick this catalog's entries out of a full discovery document
    fn entries(doc: &CatalogDocument) -> &[Self::Entry];
}

/// Installable apps
#[derive(Debug, Clone, Copy, Default)]
pub struct Apps;

impl Catalog for Apps {
    type Entry = AppEntry;

    const KIND: ItemKind = ItemKind::App;

    fn materialize(entry: &AppEntry) -> Item {
        let item = Item::app(&entry.package_name, &entry.title, &entry.icon_url);
        match &entry.asin {
            Some(asin) => item.with_secondary_id(asin),
            None => item,
        }
    }

    fn entries(doc: &CatalogDocument) -> &[AppEntry] {
        &doc.apps
    }
}

/// Media and content sources
#[derive(Debug, Clone, Copy, Default)]
pub struct MediaSources;

impl Catalog for MediaSources {
    type Entry = MediaEntry;

    const KIND: ItemKind = ItemKind::Media;

    fn materialize(entry: &MediaEntry) -> Item {
        Item::media(&entry.url, &entry.title, &entry.icon_url).with_metadata(entry.metadata.clone())
    }

    fn entries(doc: &CatalogDocument) -> &[MediaEntry] {
        &doc.media
    }
}

/// Read side of a source manager, as the list controller sees it
pub trait ItemSource: Send + Sync {
    fn snapshot(&self) -> Snapshot;
}

/// Process-wide cache of the latest known Items for one catalog
pub struct SourceManager<C: Catalog> {
    current: RwLock<Snapshot>,
    _catalog: PhantomData<C>,
}

pub type AppItemManager = SourceManager<Apps>;
pub type MediaSourceManager = SourceManager<MediaSources>;

impl<C: Catalog> SourceManager<C> {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::from(Vec::new())),
            _catalog: PhantomData,
        }
    }

    pub fn kind(&self) -> ItemKind {
        C::KIND
    }

    /// Current ordered snapshot, in discovery order
    pub fn get_all_sources(&self) -> Snapshot {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Install a fresh collection built from `entries`.
    ///
    /// Previous Items are never mutated; holders of an older snapshot keep
    /// valid (but stale) Items.
    pub fn replace(&self, entries: &[C::Entry]) -> Snapshot {
        let items: Vec<Arc<Item>> = entries.iter().map(|e| Arc::new(C::materialize(e))).collect();
        let snapshot: Snapshot = Arc::from(items);

        match self.current.write() {
            Ok(mut guard) => *guard = snapshot.clone(),
            Err(poisoned) => *poisoned.into_inner() = snapshot.clone(),
        }

        tracing::debug!(kind = %C::KIND, count = snapshot.len(), "installed new snapshot");
        snapshot
    }

    /// Install the entries this catalog owns from a discovery document
    pub fn replace_from(&self, doc: &CatalogDocument) -> Snapshot {
        self.replace(C::entries(doc))
    }

    pub fn len(&self) -> usize {
        self.get_all_sources().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<C: Catalog> Default for SourceManager<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Catalog> ItemSource for SourceManager<C> {
    fn snapshot(&self) -> Snapshot {
        self.get_all_sources()
    }
}
