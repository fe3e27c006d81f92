//! Command-line plumbing shared by the simulator binaries.

use std::sync::Mutex;

pub use clap;

pub mod verbose {
    pub use clap_verbosity_flag::{Level, Verbosity};
}

/// Colored help output in the style of cargo.
pub fn get_styles() -> clap::builder::Styles {
    use clap::builder::styling::{AnsiColor, Effects, Styles};

    Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Cyan.on_default())
        .error(AnsiColor::Red.on_default() | Effects::BOLD)
        .valid(AnsiColor::Green.on_default())
        .invalid(AnsiColor::Red.on_default())
}

/// Map the `-v`/`-q` count onto a tracing level. Without any flag only errors
/// are shown; each `-v` unlocks one more level.
pub fn verbose_level_to_trace(level: Option<verbose::Level>) -> &'static tracing::Level {
    match level {
        Some(verbose::Level::Error) => &tracing::Level::WARN,
        Some(verbose::Level::Warn) => &tracing::Level::INFO,
        Some(verbose::Level::Info) => &tracing::Level::DEBUG,
        Some(verbose::Level::Debug) => &tracing::Level::TRACE,
        Some(verbose::Level::Trace) => &tracing::Level::TRACE,
        None => &tracing::Level::ERROR,
    }
}

/// Install the global subscriber. With a file the events are written as JSON
/// lines, otherwise as human readable text on stderr.
///
/// Only the first call installs a subscriber. Returns whether this call did.
pub fn logging_setup<W>(level: &tracing::Level, file: Option<W>) -> bool
where
    W: std::io::Write + Send + 'static,
{
    let builder = tracing_subscriber::fmt()
        .with_max_level(*level)
        .with_target(false);
    let installed = match file {
        Some(file) => builder
            .json()
            .with_writer(Mutex::new(file))
            .try_init(),
        None => builder
            .compact()
            .with_writer(std::io::stderr)
            .try_init(),
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_mapping() {
        assert_eq!(verbose_level_to_trace(None), &tracing::Level::ERROR);
        assert_eq!(
            verbose_level_to_trace(Some(verbose::Level::Info)),
            &tracing::Level::DEBUG
        );
        assert_eq!(
            verbose_level_to_trace(Some(verbose::Level::Trace)),
            &tracing::Level::TRACE
        );
    }

    #[test]
    fn test_json_logging() -> std::io::Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        assert!(logging_setup(&tracing::Level::INFO, Some(file.reopen()?)));

        // a second setup keeps the first subscriber
        assert!(!logging_setup(&tracing::Level::TRACE, None::<&std::fs::File>));

        tracing::info!(cycle = 42, "kernel done");
        tracing::debug!("filtered out");

        let content = std::fs::read_to_string(file.path())?;
        assert!(content.contains("kernel done"));
        assert!(content.contains("\"cycle\":42"));
        assert!(!content.contains("filtered out"));
        Ok(())
    }
}
