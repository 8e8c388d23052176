//! Logging integration for liquid-report.
//!
//! Provides helpers for configuring [`tracing`]-based logging from
//! [`Settings`] and for creating per-render spans.

use crate::settings::Settings;

/// Sets up the global tracing subscriber based on the given settings.
///
/// The filter is read from `settings.log_level` (e.g. "debug", "info",
/// "liquid_report_template=trace"). In debug mode a pretty, human-readable
/// format is used; otherwise a structured JSON format is used. Logs go to
/// stderr so rendered output on stdout stays clean.
///
/// Installing a subscriber twice is not an error; the second call is ignored.
pub fn setup_logging(settings: &Settings) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if settings.debug {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init()
            .ok();
    } else {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .json()
            .try_init()
            .ok();
    }
}

/// Creates a tracing span for one render call.
///
/// Every log entry emitted while compiling and executing the entry template
/// (and the templates it includes) carries the entry template name.
///
/// # Examples
///
/// ```
/// use liquid_report_core::logging::render_span;
///
/// let span = render_span("ReportTemplate");
/// let _guard = span.enter();
/// tracing::info!("rendering");
/// ```
pub fn render_span(entry: &str) -> tracing::Span {
    tracing::info_span!("render", template = entry)
}
