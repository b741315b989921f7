//! Stream command implementation.

use std::future::Future;
use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use uart_core::{BtleTransport, Error, StreamEnd, Supervisor, SupervisorOptions, Transport};
use uart_types::Microcontroller;

use crate::cli::{OutputFormat, StreamArgs};
use crate::config::Config;
use crate::format::{format_record_json, format_record_text, format_scan_text};

pub async fn cmd_stream(args: &StreamArgs, config: &Config, quiet: bool) -> Result<()> {
    let board = Microcontroller::from(args.microcontroller);
    let options = config.supervisor_options(args.timeout, args.reconnect);
    let format = config.resolve_format(args.format);

    let transport = Arc::new(
        BtleTransport::new()
            .await
            .context("Failed to initialize Bluetooth")?,
    );

    if !quiet {
        eprintln!(
            "Streaming from {} (scan {}s). Press Ctrl-C to stop.",
            board,
            options.scan.duration.as_secs()
        );
    }

    let ctrl_c = async {
        // If the handler cannot be installed, never resolve; cancellation
        // still happens through --count or link loss.
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    let mut stdout = io::stdout().lock();
    let result = stream_records(
        transport,
        board.name_token(),
        options,
        format,
        args.count,
        &mut stdout,
        ctrl_c,
    )
    .await;

    match result {
        Ok(end) => {
            info!(?end, "Stream closed");
            Ok(())
        }
        Err(Error::DeviceNotFound { target, discovered }) => {
            eprintln!("Device '{}' not found. Discovered devices:", target);
            eprint!("{}", format_scan_text(&discovered));
            anyhow::bail!("no advertised name contains '{}'", target)
        }
        Err(e) => Err(e).context("Streaming failed"),
    }
}

/// Print records from `target` until `shutdown` resolves, `count` records
/// have been printed (0 = unlimited), or the run ends on its own.
///
/// Returns once the session has finished its cleanup.
pub async fn stream_records<T, W, F>(
    transport: Arc<T>,
    target: &str,
    options: SupervisorOptions,
    format: OutputFormat,
    count: u64,
    out: &mut W,
    shutdown: F,
) -> uart_core::Result<StreamEnd>
where
    T: Transport + 'static,
    W: Write,
    F: Future<Output = ()>,
{
    let mut stream = Supervisor::new(transport, options).run(target);
    tokio::pin!(shutdown);

    let mut printed: u64 = 0;
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Interrupted, closing connection...");
                stream.cancel();
                break;
            }
            record = stream.await_latest() => {
                let Some(record) = record else {
                    break;
                };
                let line = match format {
                    OutputFormat::Text => format_record_text(&record),
                    OutputFormat::Json => format_record_json(&record)
                        .unwrap_or_else(|_| format_record_text(&record)),
                };
                // A closed stdout (e.g. `| head`) ends the run like Ctrl-C.
                if out.write_all(line.as_bytes()).and_then(|()| out.flush()).is_err() {
                    stream.cancel();
                    break;
                }

                printed += 1;
                if count > 0 && printed >= count {
                    stream.cancel();
                    break;
                }
            }
        }
    }

    stream.join().await
}
