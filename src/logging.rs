use crate::config::AppConfig;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the global subscriber. Keep the guard alive until exit or
/// buffered file output is lost.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let file_appender = match config.rotation.as_str() {
        "hourly" => tracing_appender::rolling::hourly(&config.log_dir, &config.log_file),
        "daily" => tracing_appender::rolling::daily(&config.log_dir, &config.log_file),
        _ => tracing_appender::rolling::never(&config.log_dir, &config.log_file),
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},sqlx=warn", config.log_level)));

    // stderr keeps stdout clean for the CLI's JSON output
    build_subscriber(config.use_json, filter, non_blocking, std::io::stderr).init();

    guard
}

/// JSON mode writes only to `file`. Text mode also echoes to `console` with ANSI colours.
fn build_subscriber<F, C>(
    use_json: bool,
    filter: EnvFilter,
    file: F,
    console: C,
) -> impl Subscriber + Send + Sync + 'static
where
    F: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    C: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let (json_file, text_file, console_layer) = if use_json {
        let file_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_writer(file)
            .with_ansi(false);
        (Some(file_layer), None, None)
    } else {
        let file_layer = fmt::layer()
            .with_target(false)
            .with_writer(file)
            .with_ansi(false);
        let console_layer = fmt::layer()
            .with_target(false)
            .with_ansi(true)
            .with_writer(console);
        (None, Some(file_layer), Some(console_layer))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_file)
        .with(text_file)
        .with(console_layer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture(use_json: bool) -> (String, String) {
        let (file, console) = (Captured::default(), Captured::default());
        let subscriber = build_subscriber(
            use_json,
            EnvFilter::new("info"),
            {
                let file = file.clone();
                move || file.clone()
            },
            {
                let console = console.clone();
                move || console.clone()
            },
        );
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(transfer_id = 7, "Transfer committed");
            tracing::debug!("filtered out");
        });
        (file.text(), console.text())
    }

    #[test]
    fn test_text_mode_echoes_to_console() {
        let (file, console) = capture(false);
        assert!(file.contains("Transfer committed"));
        assert!(console.contains("Transfer committed"));
        assert!(!file.contains("filtered out"));
        // Colours only on the console
        assert!(!file.contains('\u{1b}'));
    }

    #[test]
    fn test_json_mode_writes_only_the_file() {
        let (file, console) = capture(true);
        assert!(console.is_empty());

        let line: serde_json::Value = serde_json::from_str(file.lines().next().unwrap()).unwrap();
        assert_eq!(line["fields"]["message"], "Transfer committed");
        assert_eq!(line["fields"]["transfer_id"], 7);
    }
}
