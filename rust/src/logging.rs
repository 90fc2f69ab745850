use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Mutex, Once};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

const LOG_FILE: &str = "toshi_core.log";

static INIT: Once = Once::new();

/// Install the process-wide subscriber: stderr plus `<data_dir>/toshi_core.log`.
///
/// Safe to call once per screen; only the first call does anything. A host that
/// already installed its own subscriber keeps it.
pub(crate) fn init_logging(data_dir: &str) {
    INIT.call_once(|| {
        let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

        let stderr_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(filter());

        let file_layer = OpenOptions::new()
            .create(true)
            .append(true)
            .open(Path::new(data_dir).join(LOG_FILE))
            .ok()
            .map(|file| {
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(filter())
            });

        let _ = tracing_subscriber::registry()
            .with(stderr_layer)
            .with(file_layer)
            .try_init();
    });
}
