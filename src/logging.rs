//! Tracing initialization for processes embedding the failover core.

use tracing_subscriber::EnvFilter;

/// Initialize tracing with an env-controlled filter and optional file output.
///
/// Uses `RUST_LOG` when set, otherwise a crate-scoped default. When
/// `KEEL_LOG_DIR` (or `LOG_DIR`) points at a writable directory, a daily
/// rotating file layer is added; `KEEL_LOG_JSON=1` switches console output
/// to JSON.
pub fn init() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,keel=debug"));

    let log_dir = std::env::var("KEEL_LOG_DIR")
        .or_else(|_| std::env::var("LOG_DIR"))
        .ok();

    // `tracing_appender::rolling::daily` panics if it cannot create the
    // initial log file, so writability is preflighted before wiring it in.
    let file_layer = log_dir.and_then(|dir| {
        if std::fs::create_dir_all(&dir).is_err() {
            eprintln!("keel: cannot create log directory {dir}, file logging disabled");
            return None;
        }
        let test_path = std::path::Path::new(&dir).join(".keel_write_test");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&test_path)
        {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);
                let appender = tracing_appender::rolling::daily(&dir, "keel.log");
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(appender)
                        .with_ansi(false),
                )
            }
            Err(_) => {
                eprintln!("keel: log directory {dir} not writable, file logging disabled");
                None
            }
        }
    });

    let json = std::env::var("KEEL_LOG_JSON").map(|v| v == "1").unwrap_or(false);

    if json {
        let console_layer = tracing_subscriber::fmt::layer().json();
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(console_layer)
            .try_init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer();
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(console_layer)
            .try_init();
    }
}
