//! Logger bootstrap, mirroring the split between "default terminal logger at a
//! configured level" and "caller supplied their own `slog::Logger`" (useful in
//! tests, where a `slog::Discard` drain is typically handed in instead).

use crate::config::LogLevel;
use slog::Drain as _;
use std::io::Write;

pub enum Logger {
    DefaultLogger(LogLevel),
    GivenLogger(slog::Logger),
}

impl Logger {
    pub fn build(&self, out: impl Write + Send + 'static) -> slog::Logger {
        match self {
            Self::DefaultLogger(level) => {
                let decorator = slog_term::PlainDecorator::new(out);
                let drain = slog_term::FullFormat::new(decorator).build().fuse();
                let drain = slog_async::Async::new(drain).build().fuse();
                let drain = slog::LevelFilter::new(drain, level.as_slog_level()).fuse();
                slog::Logger::root(drain, slog::o!())
            }
            Self::GivenLogger(logger) => logger.clone(),
        }
    }
}
