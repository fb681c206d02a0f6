//! CLI Command Handlers
//!
//! Each handler takes its CLI args, the resolved settings and Output, and
//! returns an ExitCode.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use flingdeck::api::{CatalogClient, HttpFetcher, IconFetcher};
use flingdeck::config::Config;
use flingdeck::controller::{ListController, RowAction, RowEvent};
use flingdeck::discovery::{CatalogPoller, DeviceCommand, DiscoveryEvent};
use flingdeck::models::{CatalogDocument, Device, ItemKind};
use flingdeck::sources::{Apps, Catalog, MediaSources, SourceManager};
use flingdeck::table::{HeadlessTable, IconSlot, RenderedRow};

use crate::cli::{DevicesCmd, ExitCode, KindArg, ListCmd, Output, SelectCmd, WatchCmd};

/// Settings resolved from config file and global flags
pub struct Settings {
    pub config: Config,
    pub catalog_url: String,
    pub device: Option<String>,
}

impl Settings {
    pub fn kind(&self, arg: Option<KindArg>) -> ItemKind {
        arg.map(ItemKind::from).unwrap_or_else(|| self.config.kind())
    }

    fn client(&self) -> CatalogClient {
        CatalogClient::with_timeout(&self.catalog_url, self.config.fetch_timeout())
    }

    fn fetcher(&self) -> Arc<dyn IconFetcher> {
        Arc::new(HttpFetcher::with_timeout(self.config.fetch_timeout()))
    }
}

#[derive(Debug, Serialize)]
struct ListReport {
    kind: ItemKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    device: Option<Device>,
    rows: Vec<RenderedRow>,
}

fn print_rows(output: &Output, rows: &[RenderedRow]) {
    for (i, row) in rows.iter().enumerate() {
        let icon = match row.icon {
            IconSlot::Resolved { width, height } => format!("[{}x{}]", width, height),
            IconSlot::Loading => "[ .. ]".to_string(),
            IconSlot::Placeholder => "[ -- ]".to_string(),
        };
        output.line(format!("{:>3} {:<10} {} ({})", i, icon, row.title, row.identifier));
    }
}

/// Build a controller for one catalogue over a fetched document
fn controller_for<C: Catalog>(
    doc: &CatalogDocument,
    fetcher: Arc<dyn IconFetcher>,
) -> ListController<SourceManager<C>, HeadlessTable> {
    let sources = Arc::new(SourceManager::<C>::new());
    sources.replace_from(doc);

    let mut controller = ListController::new(sources, fetcher, HeadlessTable::new());
    for device in &doc.devices {
        controller.on_discovery_event(DiscoveryEvent::DeviceDiscovered(device.clone()));
    }
    controller.on_discovery_event(DiscoveryEvent::SourcesChanged);
    controller
}

/// Show the first `visible` rows and wait (bounded) for their icons
async fn render_visible<C: Catalog>(
    doc: &CatalogDocument,
    fetcher: Arc<dyn IconFetcher>,
    device: Option<&str>,
    visible: usize,
    timeout: Duration,
) -> Result<ListReport, ExitCode> {
    let mut controller = controller_for::<C>(doc, fetcher);

    if let Some(name) = device {
        if !controller.select_device(name) {
            return Err(ExitCode::DeviceNotFound);
        }
    }
    let device = controller.selected_device().cloned();

    for row in 0..visible.min(controller.rows().len()) {
        controller.row_will_display(row);
    }

    let waited = tokio::time::timeout(timeout, async {
        while controller.wait_for_icon().await {}
    })
    .await;
    if waited.is_err() {
        tracing::warn!(pending = controller.active_downloads(), "timed out waiting for icons");
    }

    let view = controller.into_view();
    Ok(ListReport {
        kind: C::KIND,
        device,
        rows: view.rows().to_vec(),
    })
}

// =============================================================================
// List Command
// =============================================================================

pub async fn list_cmd(cmd: ListCmd, settings: &Settings, output: &Output) -> ExitCode {
    let kind = settings.kind(cmd.kind);
    let client = settings.client();

    output.info(format!("Fetching catalog from {}", client.url()));

    let doc = match client.fetch().await {
        Ok(doc) => doc,
        Err(e) => return output.error(format!("Catalog fetch failed: {:#}", e), ExitCode::NetworkError),
    };

    let timeout = Duration::from_secs(cmd.timeout);
    let device = settings.device.as_deref();
    let report = match kind {
        ItemKind::App => {
            render_visible::<Apps>(&doc, settings.fetcher(), device, cmd.rows, timeout).await
        }
        ItemKind::Media => {
            render_visible::<MediaSources>(&doc, settings.fetcher(), device, cmd.rows, timeout).await
        }
    };

    let report = match report {
        Ok(report) => report,
        Err(code) => {
            return output.error(
                format!("Device not found: {}", device.unwrap_or_default()),
                code,
            )
        }
    };

    if report.rows.is_empty() {
        return output.error(format!("No {} entries in catalog", kind), ExitCode::NoItems);
    }

    output.emit(&report, |out| {
        if let Some(device) = &report.device {
            out.line(format!("Device: {}", device));
        }
        print_rows(out, &report.rows);
    })
}

// =============================================================================
// Devices Command
// =============================================================================

pub async fn devices_cmd(_cmd: DevicesCmd, settings: &Settings, output: &Output) -> ExitCode {
    let client = settings.client();
    output.info("Discovering devices...");

    match client.fetch().await {
        Ok(doc) => output.emit(&doc.devices, |out| {
            if doc.devices.is_empty() {
                out.line("No devices found");
            }
            for device in &doc.devices {
                out.line(format!("  {}", device));
            }
        }),
        Err(e) => output.error(format!("Discovery failed: {:#}", e), ExitCode::NetworkError),
    }
}

// =============================================================================
// Select Command
// =============================================================================

pub async fn select_cmd(cmd: SelectCmd, settings: &Settings, output: &Output) -> ExitCode {
    let client = settings.client();
    let doc = match client.fetch().await {
        Ok(doc) => doc,
        Err(e) => return output.error(format!("Catalog fetch failed: {:#}", e), ExitCode::NetworkError),
    };

    let action = cmd.action.into();
    let command = match settings.kind(cmd.kind) {
        ItemKind::App => build_command::<Apps>(&doc, settings, cmd.row, action),
        ItemKind::Media => build_command::<MediaSources>(&doc, settings, cmd.row, action),
    };

    match command {
        Ok(command) => {
            let report = CommandReport::from(&command);
            output.emit(&report, |out| {
                let target = report
                    .device
                    .as_ref()
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "no device selected".to_string());
                out.line(format!("{} {} -> {}", report.action, report.identifier, target));
            })
        }
        Err((msg, code)) => output.error(msg, code),
    }
}

fn build_command<C: Catalog>(
    doc: &CatalogDocument,
    settings: &Settings,
    row: usize,
    action: RowAction,
) -> Result<DeviceCommand, (String, ExitCode)> {
    let mut controller = controller_for::<C>(doc, settings.fetcher());

    if let Some(name) = &settings.device {
        if !controller.select_device(name) {
            return Err((format!("Device not found: {}", name), ExitCode::DeviceNotFound));
        }
    }

    controller.select_row(row, action).ok_or_else(|| {
        (
            format!("Row {} out of range ({} rows)", row, controller.rows().len()),
            ExitCode::InvalidArgs,
        )
    })
}

#[derive(Debug, Serialize)]
struct CommandReport {
    action: &'static str,
    identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    device: Option<Device>,
}

impl From<&DeviceCommand> for CommandReport {
    fn from(command: &DeviceCommand) -> Self {
        match command {
            DeviceCommand::Install { device, identifier } => Self {
                action: "install",
                identifier: identifier.clone(),
                device: device.clone(),
            },
            DeviceCommand::Launch { device, identifier } => Self {
                action: "launch",
                identifier: identifier.clone(),
                device: device.clone(),
            },
        }
    }
}

// =============================================================================
// Watch Command
// =============================================================================

pub async fn watch_cmd(cmd: WatchCmd, settings: &Settings, output: &Output) -> ExitCode {
    let interval = cmd
        .interval
        .map(|s| Duration::from_secs(s.max(1)))
        .unwrap_or_else(|| settings.config.poll_interval());

    let result = match settings.kind(cmd.kind) {
        ItemKind::App => watch::<Apps>(&cmd, settings, interval, output).await,
        ItemKind::Media => watch::<MediaSources>(&cmd, settings, interval, output).await,
    };

    match result {
        Ok(rows) => output.emit(&rows, |out| print_rows(out, &rows)),
        Err(e) => output.error(format!("Watch failed: {:#}", e), ExitCode::Error),
    }
}

async fn watch<C: Catalog>(
    cmd: &WatchCmd,
    settings: &Settings,
    interval: Duration,
    output: &Output,
) -> anyhow::Result<Vec<RenderedRow>> {
    let sources = Arc::new(SourceManager::<C>::new());
    let poller = CatalogPoller::new(settings.client(), sources.clone(), interval);
    let controller = ListController::new(sources, settings.fetcher(), HeadlessTable::new());

    let (poll_tx, mut poll_rx) = mpsc::channel(16);
    let (discovery_tx, discovery_rx) = mpsc::channel(16);
    let (row_tx, row_rx) = mpsc::channel(64);
    let (command_tx, _command_rx) = mpsc::channel(1);

    let poller_task = tokio::spawn(poller.run(poll_tx));
    let controller_task = tokio::spawn(controller.run(discovery_rx, row_rx, command_tx));

    output.info(format!("Watching {} every {}s (Ctrl-C to stop)", settings.catalog_url, interval.as_secs()));

    let mut seen = 0usize;
    loop {
        tokio::select! {
            event = poll_rx.recv() => {
                let Some(event) = event else { break };
                output.info(describe(&event));
                discovery_tx.send(event).await?;
                for row in 0..cmd.rows {
                    row_tx.send(RowEvent::WillDisplay(row)).await?;
                }
                seen += 1;
                if cmd.count.is_some_and(|n| seen >= n) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    poller_task.abort();
    drop(discovery_tx);
    drop(row_tx);

    let view = controller_task.await?;
    Ok(view.rows().to_vec())
}

fn describe(event: &DiscoveryEvent) -> String {
    match event {
        DiscoveryEvent::DeviceDiscovered(device) => format!("+ device {}", device),
        DiscoveryEvent::DeviceLost(id) => format!("- device {}", id),
        DiscoveryEvent::SourcesChanged => "* sources changed".to_string(),
    }
}
