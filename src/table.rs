//! Headless table
//!
//! A [`TableView`] that keeps the rendered rows in memory instead of drawing
//! them. Used by the CLI to report what a real list widget would show.

use serde::Serialize;
use std::sync::Arc;

use crate::controller::{RowIcon, TableView};
use crate::models::{Item, ItemKind};

/// Serializable view of one row's icon slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum IconSlot {
    Resolved { width: u32, height: u32 },
    Loading,
    Placeholder,
}

impl From<&RowIcon> for IconSlot {
    fn from(icon: &RowIcon) -> Self {
        match icon {
            RowIcon::Resolved(icon) => IconSlot::Resolved {
                width: icon.width(),
                height: icon.height(),
            },
            RowIcon::Loading => IconSlot::Loading,
            RowIcon::Placeholder => IconSlot::Placeholder,
        }
    }
}

/// One rendered row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedRow {
    pub kind: ItemKind,
    pub identifier: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_id: Option<String>,
    pub icon: IconSlot,
}

impl RenderedRow {
    fn from_item(item: &Item, icon: IconSlot) -> Self {
        Self {
            kind: item.kind,
            identifier: item.identifier.clone(),
            title: item.title.clone(),
            secondary_id: item.secondary_id.clone(),
            icon,
        }
    }
}

#[derive(Debug, Default)]
pub struct HeadlessTable {
    rows: Vec<RenderedRow>,
    full_reloads: usize,
    row_reloads: Vec<usize>,
}

impl HeadlessTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[RenderedRow] {
        &self.rows
    }

    pub fn row(&self, row: usize) -> Option<&RenderedRow> {
        self.rows.get(row)
    }

    pub fn full_reloads(&self) -> usize {
        self.full_reloads
    }

    /// Every single-row redraw, in order
    pub fn row_reloads(&self) -> &[usize] {
        &self.row_reloads
    }
}

impl TableView for HeadlessTable {
    fn reload_data(&mut self, rows: &[Arc<Item>]) {
        self.full_reloads += 1;
        self.rows = rows
            .iter()
            .map(|item| {
                let icon = match item.icon() {
                    Some(icon) => IconSlot::Resolved {
                        width: icon.width(),
                        height: icon.height(),
                    },
                    None => IconSlot::Placeholder,
                };
                RenderedRow::from_item(item, icon)
            })
            .collect();
    }

    fn reload_row(&mut self, row: usize, item: &Arc<Item>, icon: RowIcon) {
        self.row_reloads.push(row);
        let rendered = RenderedRow::from_item(item, IconSlot::from(&icon));
        match self.rows.get_mut(row) {
            Some(slot) => *slot = rendered,
            None => tracing::trace!(row, "reload of row outside table"),
        }
    }
}
