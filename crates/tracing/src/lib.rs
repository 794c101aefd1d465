//!  Logging setup for the arb sync node.
//!
//!  The module's primary entry point is [`ArbTracer`], which installs a global subscriber made of
//!  a stdout layer and an optional rolling file layer, each with its own format and filter. Tests
//!  use [`init_test_tracing`] instead.
//!
//!  # Examples
//!
//!  ```
//!  use arb_tracing::{
//!      tracing::level_filters::LevelFilter, ArbTracer, LayerInfo, LogFormat, Tracer,
//!  };
//!
//!  fn main() -> eyre::Result<()> {
//!      let tracer = ArbTracer::new().with_stdout(LayerInfo::new(
//!          LogFormat::Json,
//!          LevelFilter::INFO.to_string(),
//!          "net::arb=debug".to_string(),
//!          None,
//!      ));
//!
//!      let _guard = tracer.init()?;
//!
//!      // Your application logic here
//!
//!      Ok(())
//!  }
//!  ```

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

// Re-export tracing crates
pub use tracing;
pub use tracing_appender;
pub use tracing_subscriber;

// Re-export our types
pub use formatter::LogFormat;
pub use layers::{FileInfo, FileWorkerGuard};
pub use test_tracer::TestTracer;

mod formatter;
mod layers;
mod test_tracer;
mod throttle;

#[doc(hidden)]
pub mod __private {
    pub use super::throttle::Throttle;
}

use crate::layers::Layers;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

///  Tracer for application logging.
///
///  Manages the configuration and initialization of logging layers,
///  standard output and optional file logging.
#[derive(Debug, Clone)]
pub struct ArbTracer {
    stdout: LayerInfo,
    file: Option<(LayerInfo, FileInfo)>,
}

impl ArbTracer {
    ///  Constructs a new `Tracer` with the default stdout layer and no file layer.
    pub fn new() -> Self {
        Self { stdout: LayerInfo::default(), file: None }
    }

    ///  Sets a custom configuration for the stdout layer.
    pub fn with_stdout(mut self, config: LayerInfo) -> Self {
        self.stdout = config;
        self
    }

    ///  Sets the file layer configuration and associated file info.
    pub fn with_file(mut self, config: LayerInfo, file_info: FileInfo) -> Self {
        self.file = Some((config, file_info));
        self
    }
}

impl Default for ArbTracer {
    fn default() -> Self {
        Self::new()
    }
}

///  Configuration for a logging layer.
///
///  This struct holds configuration parameters for a tracing layer, including
///  the format, filtering directives, optional coloring, and directive.
#[derive(Debug, Clone)]
pub struct LayerInfo {
    format: LogFormat,
    default_directive: String,
    filters: String,
    color: Option<String>,
}

impl LayerInfo {
    ///  Constructs a new `LayerInfo`.
    ///
    ///  # Arguments
    ///  * `format` - Specifies the format for log messages.
    ///  * `default_directive` - Directive applied when `RUST_LOG` is not set.
    ///  * `filters` - Additional comma separated filter directives.
    ///  * `color` - Optional color configuration for the log messages.
    pub const fn new(
        format: LogFormat,
        default_directive: String,
        filters: String,
        color: Option<String>,
    ) -> Self {
        Self { format, default_directive, filters, color }
    }
}

impl Default for LayerInfo {
    ///  Terminal format, INFO level, no additional filters, colors on.
    fn default() -> Self {
        Self {
            format: LogFormat::Terminal,
            default_directive: LevelFilter::INFO.to_string(),
            filters: String::new(),
            color: Some("always".to_string()),
        }
    }
}

/// Trait defining a general interface for logging configuration.
pub trait Tracer {
    /// Initialize the logging configuration.
    ///
    ///  Returns the [`WorkerGuard`] of the file layer if one is configured. Dropping it flushes
    ///  and stops the file writer.
    fn init(self) -> eyre::Result<Option<WorkerGuard>>;
}

impl Tracer for ArbTracer {
    fn init(self) -> eyre::Result<Option<WorkerGuard>> {
        let mut layers = Layers::new();

        layers.stdout(
            self.stdout.format,
            self.stdout.default_directive.parse()?,
            &self.stdout.filters,
            self.stdout.color,
        )?;

        let file_guard = match self.file {
            Some((config, file_info)) => Some(layers.file(config.format, &config.filters, file_info)?),
            None => None,
        };

        // fails only if a global subscriber is already installed
        let _ = tracing_subscriber::registry().with(layers.into_inner()).try_init().inspect_err(
            |err| tracing::warn!(%err, "Tracing subscriber could not be initialized"),
        );
        Ok(file_guard)
    }
}

///  Initializes a tracing subscriber for tests.
///
///  The filter is configurable via `RUST_LOG`.
///
///  # Note
///
///  The subscriber will silently fail if it could not be installed.
pub fn init_test_tracing() {
    let _ = TestTracer::default().init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_layer_receives_events() {
        let dir = tempfile::tempdir().unwrap();
        let file = LayerInfo::new(
            LogFormat::Json,
            LevelFilter::INFO.to_string(),
            "net::arb=debug".to_string(),
            None,
        );
        let tracer = ArbTracer::new()
            .with_stdout(LayerInfo::new(
                LogFormat::Terminal,
                LevelFilter::WARN.to_string(),
                String::new(),
                Some("never".to_string()),
            ))
            .with_file(file, FileInfo::new(dir.path().to_path_buf(), 1024 * 1024, 2));

        let guard = tracer.init().unwrap();
        assert!(guard.is_some());

        tracing::debug!(target: "net::arb", number = 42, "Advanced sync target");
        tracing::debug!(target: "net::eth", "filtered out");
        // flushes the non-blocking writer
        drop(guard);

        let logs = std::fs::read_to_string(dir.path().join("arb-sync.log")).unwrap();
        assert!(logs.contains("Advanced sync target"));
        assert!(logs.contains("42"));
        assert!(!logs.contains("filtered out"));
    }
}
