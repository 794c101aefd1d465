use crate::layers::BoxedLayer;
use clap::ValueEnum;
use std::{fmt, fmt::Display};
use tracing_appender::non_blocking::NonBlocking;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Represents the logging format.
///
/// This enum defines the supported formats for logging output.
/// It is used to configure the format layer of a tracing subscriber.
#[derive(Debug, Copy, Clone, ValueEnum, Eq, PartialEq)]
pub enum LogFormat {
    /// Structured JSON objects, one per line.
    Json,

    /// logfmt (key=value) formatting.
    LogFmt,

    /// Human-readable, terminal-friendly formatting.
    Terminal,
}

impl LogFormat {
    /// Creates the formatting layer for this format.
    ///
    /// * `filter` - decides which records reach the layer.
    /// * `color` - `Some("never")` or `RUST_LOG_STYLE=never` disable ANSI colors, `None` disables
    ///   them unconditionally (used for files).
    /// * `file_writer` - writes to the given file instead of stdout.
    pub fn apply(
        &self,
        filter: EnvFilter,
        color: Option<String>,
        file_writer: Option<NonBlocking>,
    ) -> BoxedLayer<Registry> {
        let ansi = color.is_some_and(|color| {
            std::env::var("RUST_LOG_STYLE").map(|val| val != "never").unwrap_or(color != "never")
        });
        // `RUST_LOG_TARGET` always wins, otherwise targets are only shown below INFO
        let target = std::env::var("RUST_LOG_TARGET").map(|val| val != "0").unwrap_or_else(|_| {
            filter.max_level_hint().is_none_or(|max_level| max_level > tracing::Level::INFO)
        });

        match self {
            Self::Json => {
                let layer =
                    tracing_subscriber::fmt::layer().json().with_ansi(ansi).with_target(target);
                match file_writer {
                    Some(writer) => layer.with_writer(writer).with_filter(filter).boxed(),
                    None => layer.with_filter(filter).boxed(),
                }
            }
            Self::LogFmt => tracing_logfmt::layer().with_filter(filter).boxed(),
            Self::Terminal => {
                let layer = tracing_subscriber::fmt::layer().with_ansi(ansi).with_target(target);
                match file_writer {
                    Some(writer) => layer.with_writer(writer).with_filter(filter).boxed(),
                    None => layer.with_filter(filter).boxed(),
                }
            }
        }
    }
}

impl Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::LogFmt => write!(f, "logfmt"),
            Self::Terminal => write!(f, "terminal"),
        }
    }
}
