use std::fmt;
use std::str::FromStr;

use anstream::ColorChoice;
use anyhow::Context;
use jiff::Timestamp;
use owo_colors::{OwoColorize, Style};
use tracing::{Event, Subscriber};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use devpi_static::EnvVars;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Show warnings by default (overridable by `RUST_LOG`).
    #[default]
    Default,
    /// Show debug messages from the devpi crates by default (overridable by `RUST_LOG`).
    Verbose,
}

impl Level {
    fn directive(self) -> Directive {
        match self {
            Self::Default => tracing::level_filters::LevelFilter::WARN.into(),
            Self::Verbose => Directive::from_str("devpi=debug").unwrap(),
        }
    }
}

/// The style of a devpi logging line.
pub struct DevpiFormat {
    pub display_timestamp: bool,
    pub display_level: bool,
    pub show_spans: bool,
}

impl Default for DevpiFormat {
    /// Regardless of the tracing level, show messages without any adornment.
    fn default() -> Self {
        Self {
            display_timestamp: false,
            display_level: true,
            show_spans: false,
        }
    }
}

impl DevpiFormat {
    /// The format for `level`: [`Level::Verbose`] adds timestamps and the enclosing spans.
    pub fn for_level(level: Level) -> Self {
        let verbose = level == Level::Verbose;
        Self {
            display_timestamp: verbose,
            show_spans: verbose,
            ..Self::default()
        }
    }
}

impl<S, N> FormatEvent<S, N> for DevpiFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let ansi = writer.has_ansi_escapes();

        if self.display_timestamp {
            let now = Timestamp::now();
            if ansi {
                write!(writer, "{} ", now.dimmed())?;
            } else {
                write!(writer, "{now} ")?;
            }
        }

        if self.display_level {
            let level = *event.metadata().level();
            if ansi {
                write!(writer, "{} ", level.style(level_style(level)))?;
            } else {
                write!(writer, "{level} ")?;
            }
        }

        if self.show_spans {
            // The spans enclosing the event, outermost first.
            let names = event
                .parent()
                .and_then(|id| ctx.span(id))
                .or_else(|| ctx.lookup_current())
                .into_iter()
                .flat_map(|span| span.scope().from_root())
                .map(|span| span.metadata().name())
                .collect::<Vec<_>>();
            for name in &names {
                if ansi {
                    write!(writer, "{}:", name.bold())?;
                } else {
                    write!(writer, "{name}:")?;
                }
            }
            if !names.is_empty() {
                writer.write_char(' ')?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn level_style(level: tracing::Level) -> Style {
    match level {
        tracing::Level::TRACE => Style::new().purple(),
        tracing::Level::DEBUG => Style::new().blue(),
        tracing::Level::INFO => Style::new().green(),
        tracing::Level::WARN => Style::new().yellow(),
        tracing::Level::ERROR => Style::new().red(),
    }
}

fn env_filter(level: Level) -> anyhow::Result<EnvFilter> {
    EnvFilter::builder()
        .with_default_directive(level.directive())
        .with_env_var(EnvVars::RUST_LOG)
        .from_env()
        .context("Invalid RUST_LOG directives")
}

/// Configure `tracing` for a binary, writing to stderr.
///
/// The [`Level`] dictates the default filters, which can be overridden by the `RUST_LOG`
/// environment variable. [`Level::Verbose`] additionally prefixes each line with a timestamp
/// and the names of the enclosing spans.
pub fn setup_logging(level: Level) -> anyhow::Result<()> {
    let filter = env_filter(level)?;
    let format = DevpiFormat::for_level(level);
    let ansi = match anstream::Stderr::choice(&std::io::stderr()) {
        ColorChoice::Always | ColorChoice::AlwaysAnsi => true,
        ColorChoice::Never => false,
        // We just asked anstream for a choice, that can't be auto
        ColorChoice::Auto => unreachable!(),
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .event_format(format)
                .with_writer(std::io::stderr)
                .with_ansi(ansi)
                .with_filter(filter),
        )
        .try_init()
        .context("Failed to install the tracing subscriber")?;
    Ok(())
}

/// Configure `tracing` for a test binary, writing through libtest's output capture.
///
/// Safe to call from every test: only the first call installs a subscriber.
pub fn setup_test_logging() {
    let Ok(filter) = env_filter(Level::Verbose) else {
        return;
    };
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .event_format(DevpiFormat {
                    show_spans: true,
                    ..DevpiFormat::default()
                })
                .with_test_writer()
                .with_ansi(false)
                .with_filter(filter),
        )
        .try_init();
}
