use lazy_static::lazy_static;

// re-export for convenience
pub use slog::{debug, error, info, trace, warn};
use slog::{o, Drain, Level, Logger};

lazy_static! {
    /// Global root logger. Note: reads SETTINGS on initialization, so the
    /// configuration should be in place before the first log call.
    pub static ref ROOT_LOGGER: Logger = {
        let decorator = slog_term::TermDecorator::new().stderr().build();
        let drain = slog_term::FullFormat::new(decorator).build();
        let filter_level = if crate::configuration::SETTINGS.read().unwrap().quiet {
            Level::Error
        } else {
            Level::Trace
        };
        let drain = drain.filter_level(filter_level).fuse();

        let drain = slog_async::Async::new(drain).build().fuse();

        slog::Logger::root(drain, o!())
    };
}

/// A handle to the root logger.
pub fn root() -> Logger {
    ROOT_LOGGER.clone()
}

/// A child of the root logger tagged with the given subsystem name.
pub fn new_sublogger<S: AsRef<str>>(name: S) -> Logger {
    ROOT_LOGGER.new(o!("subsystem" => name.as_ref().to_string()))
}
