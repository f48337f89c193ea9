use std::io::Write;
use std::sync::Mutex;

use log::debug;

use crate::error::{TelemetryError, TelemetryResult};

enum TelemetryStatus {
    Uninitialized,
    Initialized,
    Finalized,
}

static TELEMETRY_STATUS: Mutex<TelemetryStatus> = Mutex::new(TelemetryStatus::Uninitialized);

/// Installs the process-wide logger.
///
/// The log level defaults to `info` and can be changed via the `RUST_LOG` environment variable.
pub fn init_logging() -> TelemetryResult<()> {
    let mut status = TELEMETRY_STATUS
        .lock()
        .map_err(|e| TelemetryError::internal(e.to_string()))?;

    match *status {
        TelemetryStatus::Uninitialized => {
            let logger =
                env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
                    .format(move |buf, record| {
                        let level = record.level();
                        let target = record.target();
                        let style = buf.default_level_style(level);
                        let timestamp = buf.timestamp();
                        let args = record.args();
                        writeln!(buf, "[{timestamp} {style}{level}{style:#} {target}] {args}")
                    })
                    .build();
            let max_level = logger.filter();
            log::set_boxed_logger(Box::new(logger))?;
            log::set_max_level(max_level);
            debug!("logging initialized");
            *status = TelemetryStatus::Initialized;
            Ok(())
        }
        TelemetryStatus::Initialized => {
            Err(TelemetryError::internal("logging already initialized"))
        }
        TelemetryStatus::Finalized => Err(TelemetryError::internal(
            "logging has been finalized and cannot be re-initialized",
        )),
    }
}

/// Flushes buffered log records. This should be called before the process exits.
pub fn shutdown_logging() {
    let Ok(mut status) = TELEMETRY_STATUS.lock() else {
        return;
    };
    if let TelemetryStatus::Initialized = *status {
        log::logger().flush();
        *status = TelemetryStatus::Finalized;
    }
}
