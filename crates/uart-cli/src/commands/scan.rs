//! Scan command implementation.

use std::io::{self, Write};

use anyhow::{Context, Result};
use uart_core::{BtleTransport, DiscoveredPeer, ScanOptions, Transport};

use crate::cli::OutputFormat;
use crate::config::Config;
use crate::format::{format_scan_json, format_scan_text};

pub async fn cmd_scan(timeout: Option<u64>, format: Option<OutputFormat>, config: &Config) -> Result<()> {
    let options = config.scan_options(timeout);
    let format = config.resolve_format(format);

    let transport = BtleTransport::new()
        .await
        .context("Failed to initialize Bluetooth")?;
    let peers = scan_peers(&transport, &options)
        .await
        .context("Failed to scan for devices")?;

    let content = match format {
        OutputFormat::Text => format_scan_text(&peers),
        OutputFormat::Json => format_scan_json(&peers)?,
    };

    let mut stdout = io::stdout().lock();
    stdout.write_all(content.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

/// Run one scan window and return every peer seen, in discovery order.
pub async fn scan_peers<T: Transport + ?Sized>(
    transport: &T,
    options: &ScanOptions,
) -> uart_core::Result<Vec<DiscoveredPeer>> {
    options.validate()?;
    transport.discover(options.duration).await
}
