use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing::Subscriber;
use tracing_subscriber::fmt::format::{Format, Json, JsonFields};
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_LOG_FILE: &str = "flowstate.logs.jsonl";

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

fn observability_enabled() -> bool {
    for key in ["FLOWSTATE_OBSERVABILITY_ENABLED", "FLOWSTATE_OBSERVABILITY"] {
        if let Ok(value) = std::env::var(key) {
            return parse_bool_env(&value).unwrap_or(true);
        }
    }
    true
}

fn resolve_env_filter() -> tracing_subscriber::EnvFilter {
    if let Ok(level) = std::env::var("FLOWSTATE_LOG_LEVEL")
        && let Ok(filter) = tracing_subscriber::EnvFilter::try_new(level)
    {
        return filter;
    }
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
}

fn split_log_path(path: &Path) -> (PathBuf, String) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_LOG_FILE);
    (dir.to_path_buf(), file_name.to_string())
}

/// One JSON object per event. Step fields (`seq`, `kind`, `agent`) sit at the
/// top level and the enclosing `chat_stream` span (`request_id`, `thread_id`)
/// is nested under `span`.
fn json_layer<S, W>(writer: W) -> fmt::Layer<S, JsonFields, Format<Json>, W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_span_list(false)
        .with_target(false)
        .with_writer(writer)
}

/// Initialize logging once per process.
///
/// Environment variables:
/// - `FLOWSTATE_OBSERVABILITY_ENABLED` / `FLOWSTATE_OBSERVABILITY`: optional enable/disable flag (default enabled).
/// - `FLOWSTATE_LOG_LEVEL`: optional level/filter override (`info`, `debug`, etc.).
/// - `FLOWSTATE_JSON_LOG_PATH`: optional log file path. If set, logs are JSONL in that file.
///   If unset, logs go to stderr so they never interleave with streamed chat output.
/// - `RUST_LOG`: optional filter override.
pub fn init_observability() {
    INIT.get_or_init(|| {
        if !observability_enabled() {
            return;
        }

        let env_filter = resolve_env_filter();
        if let Ok(path_raw) = std::env::var("FLOWSTATE_JSON_LOG_PATH") {
            let (dir, file_name) = split_log_path(Path::new(&path_raw));
            let _ = std::fs::create_dir_all(&dir);
            let writer = tracing_appender::rolling::never(dir, file_name);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(json_layer(writer))
                .try_init();
        } else {
            let console_layer = fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .try_init();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn parses_common_boolean_spellings() {
        assert_eq!(parse_bool_env(" Yes "), Some(true));
        assert_eq!(parse_bool_env("disabled"), Some(false));
        assert_eq!(parse_bool_env("maybe"), None);
    }

    #[test]
    fn log_path_splits_into_dir_and_file() {
        assert_eq!(
            split_log_path(Path::new("logs/chat.jsonl")),
            (PathBuf::from("logs"), "chat.jsonl".to_string())
        );
        assert_eq!(
            split_log_path(Path::new("chat.jsonl")),
            (PathBuf::from("."), "chat.jsonl".to_string())
        );
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn json_lines_carry_chat_stream_context() {
        let captured = Captured::default();
        let sink = captured.clone();
        let subscriber = tracing_subscriber::registry().with(json_layer(move || sink.clone()));
        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("chat_stream", request_id = "r-1", thread_id = "t-9");
            let _entered = span.enter();
            tracing::info!(seq = 0u64, kind = "routing", agent = "Main Agent", "stream step");
        });

        let raw = String::from_utf8(captured.0.lock().unwrap().clone()).expect("utf8");
        let line: serde_json::Value =
            serde_json::from_str(raw.lines().next().expect("one line")).expect("json");
        assert_eq!(line["span"]["name"], "chat_stream");
        assert_eq!(line["span"]["request_id"], "r-1");
        assert_eq!(line["span"]["thread_id"], "t-9");
        assert_eq!(line["kind"], "routing");
        assert_eq!(line["agent"], "Main Agent");
        assert!(line.get("spans").is_none());
    }

    #[test]
    fn init_is_idempotent() {
        init_observability();
        init_observability();
        assert!(INIT.get().is_some());
    }
}
