//! # Logging
//!
//! Installs the process-wide `tracing` subscriber: an [`EnvFilter`], one
//! `fmt` layer in the chosen [`LogFormat`] and, when the host supplies one, a
//! layer that mirrors each event into a [`LoggerSink`].
//!
//! ```ignore
//! use bridge_traits::logger::{ConsoleLogger, LogLevel};
//! use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
//! use std::sync::Arc;
//!
//! init_logging(
//!     LoggingConfig::default()
//!         .with_format(LogFormat::Compact)
//!         .with_level(LogLevel::Debug)
//!         .with_sink(Arc::new(ConsoleLogger::default())),
//! )?;
//! ```
//!
//! Entries handed to the sink have credential fields and e-mail addresses
//! masked by [`redact_field`] unless sink redaction is switched off. The
//! `fmt` output is not masked; code logging there never records tokens.

use crate::error::{Error, Result};

use bridge_traits::logger::{LogEntry, LogLevel, LoggerSink};

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Our crates log at the configured level; dependencies only at `warn`.
const OWN_TARGETS: &[&str] = &[
    "bridge_desktop",
    "core_auth",
    "core_runtime",
    "core_service",
    "provider_onedrive",
];

const MASK: &str = "[REDACTED]";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, coloured.
    #[default]
    Pretty,
    /// One line per event.
    Compact,
    /// One JSON object per event.
    Json,
}

#[derive(Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    /// A full `EnvFilter` directive string; replaces the level-derived one.
    pub filter: Option<String>,
    pub sink: Option<Arc<dyn LoggerSink>>,
    /// Mask credentials and e-mail addresses in entries sent to `sink`.
    pub redact_sink: bool,
    /// Log entering and leaving `#[instrument]` spans.
    pub span_events: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            filter: None,
            sink: None,
            redact_sink: true,
            span_events: false,
        }
    }
}

impl fmt::Debug for LoggingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingConfig")
            .field("format", &self.format)
            .field("level", &self.level)
            .field("filter", &self.filter)
            .field("has_sink", &self.sink.is_some())
            .field("redact_sink", &self.redact_sink)
            .field("span_events", &self.span_events)
            .finish()
    }
}

impl LoggingConfig {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_sink_redaction(mut self, redact: bool) -> Self {
        self.redact_sink = redact;
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// `Error::Config` for an invalid filter, or when a global subscriber is
/// already installed.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = build_filter(&config)?;

    let spans = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let output = match config.format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_span_events(spans)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_span_events(spans)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .with_span_events(spans)
            .boxed(),
    };

    let mirror = config
        .sink
        .map(|sink| SinkLayer::new(sink, config.redact_sink));

    tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .with(mirror)
        .try_init()
        .map_err(|e| Error::Config(format!("Logging already initialized: {}", e)))
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let directives = match &config.filter {
        Some(custom) => custom.clone(),
        None => {
            let level = config.level.as_str();
            std::iter::once("warn".to_string())
                .chain(OWN_TARGETS.iter().map(|t| format!("{}={}", t, level)))
                .collect::<Vec<_>>()
                .join(",")
        }
    };

    EnvFilter::try_new(&directives)
        .map_err(|e| Error::Config(format!("Invalid log filter '{}': {}", directives, e)))
}

/// Mask `value` if `field` names a credential or `value` is an e-mail address.
///
/// ```
/// use core_runtime::logging::redact_field;
///
/// assert_eq!(redact_field("refresh_token", "0.AAA"), "[REDACTED]");
/// assert_eq!(redact_field("username", "ada@contoso.com"), "a***@[REDACTED]");
/// assert_eq!(redact_field("status", "401"), "401");
/// ```
pub fn redact_field<'a>(field: &str, value: &'a str) -> Cow<'a, str> {
    if is_credential_field(field) {
        return Cow::Borrowed(MASK);
    }

    match value.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {
            let first: String = local.chars().take(1).collect();
            Cow::Owned(format!("{}***@{}", first, MASK))
        }
        _ => Cow::Borrowed(value),
    }
}

fn is_credential_field(field: &str) -> bool {
    let field = field.to_ascii_lowercase();
    field == "token"
        || field == "code"
        || field.ends_with("_token")
        || ["password", "secret", "authorization", "bearer", "verifier"]
            .iter()
            .any(|word| field.contains(word))
}

fn to_log_level(level: &tracing::Level) -> LogLevel {
    match *level {
        tracing::Level::ERROR => LogLevel::Error,
        tracing::Level::WARN => LogLevel::Warn,
        tracing::Level::INFO => LogLevel::Info,
        tracing::Level::DEBUG => LogLevel::Debug,
        tracing::Level::TRACE => LogLevel::Trace,
    }
}

/// Mirrors events into a [`LoggerSink`].
struct SinkLayer {
    sink: Arc<dyn LoggerSink>,
    redact: bool,
}

impl SinkLayer {
    fn new(sink: Arc<dyn LoggerSink>, redact: bool) -> Self {
        Self { sink, redact }
    }

    fn entry_for<S>(&self, event: &Event<'_>, ctx: &Context<'_, S>) -> Option<LogEntry>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let metadata = event.metadata();
        let level = to_log_level(metadata.level());
        if level < self.sink.min_level() {
            return None;
        }

        let mut fields = FieldCollector::default();
        event.record(&mut fields);

        let message = fields
            .message
            .unwrap_or_else(|| metadata.name().to_string());
        let mut entry = LogEntry::new(level, metadata.target(), message);

        for (name, value) in fields.values {
            let value = if self.redact {
                redact_field(&name, &value).into_owned()
            } else {
                value
            };
            entry.fields.insert(name, value);
        }

        entry.span = ctx.lookup_current().map(|span| span.name().to_string());
        Some(entry)
    }
}

impl<S> Layer<S> for SinkLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(entry) = self.entry_for(event, &ctx) else {
            return;
        };
        let sink = Arc::clone(&self.sink);

        // Inside a runtime the sink runs as its own task; elsewhere inline.
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = sink.log(entry).await {
                        eprintln!("log sink failed: {}", e);
                    }
                });
            }
            Err(_) => {
                if let Err(e) = futures::executor::block_on(sink.log(entry)) {
                    eprintln!("log sink failed: {}", e);
                }
            }
        }
    }
}

#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    values: BTreeMap<String, String>,
}

impl FieldCollector {
    fn put(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = Some(value),
            name => {
                self.values.insert(name.to_string(), value);
            }
        }
    }
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, format!("{:?}", value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Captured(Mutex<Vec<LogEntry>>);

    #[async_trait]
    impl LoggerSink for Captured {
        async fn log(&self, entry: LogEntry) -> bridge_traits::error::Result<()> {
            self.0.lock().unwrap().push(entry);
            Ok(())
        }

        fn min_level(&self) -> LogLevel {
            LogLevel::Debug
        }
    }

    fn capture(redact: bool, emit: impl FnOnce()) -> Vec<LogEntry> {
        let sink = Arc::new(Captured::default());
        let subscriber =
            tracing_subscriber::registry().with(SinkLayer::new(sink.clone(), redact));
        tracing::subscriber::with_default(subscriber, emit);
        let entries = sink.0.lock().unwrap().clone();
        entries
    }

    #[test]
    fn test_default_filter_scopes_own_crates() {
        let filter = build_filter(&LoggingConfig::default().with_level(LogLevel::Trace))
            .unwrap()
            .to_string();
        assert!(filter.contains("core_auth=trace"));
        assert!(filter.contains("provider_onedrive=trace"));
        assert!(filter.contains("warn"));
    }

    #[test]
    fn test_custom_filter_wins() {
        let config = LoggingConfig::default()
            .with_level(LogLevel::Error)
            .with_filter("core_service=debug");
        let filter = build_filter(&config).unwrap().to_string();
        assert!(filter.contains("core_service=debug"));
        assert!(!filter.contains("core_auth"));
    }

    #[test]
    fn test_bad_filter_is_config_error() {
        let config = LoggingConfig::default().with_filter("core_auth=loud");
        assert!(matches!(build_filter(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_credential_fields_masked() {
        for field in ["access_token", "id_token", "token", "code", "client_secret", "code_verifier"] {
            assert_eq!(redact_field(field, "value"), MASK, "{field}");
        }
        assert_eq!(redact_field("status_code", "200"), "200");
        assert_eq!(redact_field("endpoint", "me?$expand=drive"), "me?$expand=drive");
        assert_eq!(redact_field("note", "@here"), "@here");
    }

    #[test]
    fn test_sink_receives_message_fields_and_span() {
        let entries = capture(false, || {
            let span = tracing::info_span!("sign_in");
            let _entered = span.enter();
            tracing::warn!(target: "core_auth::client", account_id = "oid-1", attempts = 2u64, "Sign-in refused");
        });

        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.level, LogLevel::Warn);
        assert_eq!(entry.target, "core_auth::client");
        assert_eq!(entry.message, "Sign-in refused");
        assert_eq!(entry.field("account_id"), Some("oid-1"));
        assert_eq!(entry.field("attempts"), Some("2"));
        assert_eq!(entry.span.as_deref(), Some("sign_in"));
    }

    #[test]
    fn test_sink_level_floor() {
        let entries = capture(true, || {
            tracing::trace!("too chatty");
            tracing::debug!("kept");
        });
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "kept");
    }

    #[test]
    fn test_sink_redaction_toggle() {
        let emit = || tracing::info!(refresh_token = "0.AAA", username = "ada@contoso.com", "Signed in");

        let masked = capture(true, emit);
        assert_eq!(masked[0].field("refresh_token"), Some(MASK));
        assert_eq!(masked[0].field("username"), Some("a***@[REDACTED]"));

        let raw = capture(false, emit);
        assert_eq!(raw[0].field("refresh_token"), Some("0.AAA"));
    }
}
