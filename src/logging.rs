//! Log sink configuration for the one-shot run
//!
//! Destinations mirror the operational layout this repair has always used:
//! updated records land in one file, non-updates in another, everything is
//! mirrored to the console, and panics go to a dedicated exceptions file.
//! Library code logs through the `log` facade; the subscriber installed here
//! consumes those records via its log bridge.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::panic;
use std::sync::Mutex;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, Layer};

const LOG_DIR: &str = "live-logs";
const UPDATED_LOG: &str = "live-logs/updated.log";
const NOT_UPDATED_LOG: &str = "live-logs/not_updated.log";
const EXCEPTIONS_LOG: &str = "live-logs/exceptions.log";

/// Install the log destinations and the panic hook
pub fn init() -> Result<(), std::io::Error> {
    fs::create_dir_all(LOG_DIR)?;

    let updated = open_append(UPDATED_LOG)?;
    let not_updated = open_append(NOT_UPDATED_LOG)?;
    let exceptions = open_append(EXCEPTIONS_LOG)?;

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(updated))
                .with_filter(LevelFilter::INFO),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(not_updated))
                .with_filter(LevelFilter::ERROR),
        )
        .with(fmt::layer().with_filter(LevelFilter::INFO))
        .init();

    install_panic_hook(exceptions);

    Ok(())
}

fn open_append(path: &str) -> Result<File, std::io::Error> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn install_panic_hook(file: File) {
    let file = Mutex::new(file);
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        if let Ok(mut destination) = file.lock() {
            let _ = writeln!(destination, "{}", info);
        }

        default_hook(info);
    }));
}
