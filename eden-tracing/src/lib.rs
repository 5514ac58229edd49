//! Shared stderr tracing subscriber setup for eden-core embedders.
//!
//! This deliberately stays small: the mount core only needs a place to send
//! its `tracing` spans and events during tests and local runs. Exporting
//! those to a collector (otlp, tracy, ...) is an external concern and is not
//! provided here.
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

pub struct TracingBuilder {
    level: Level,
}

impl Default for TracingBuilder {
    fn default() -> Self {
        TracingBuilder {
            level: Level::INFO,
        }
    }
}

impl TracingBuilder {
    /// Sets the log level for the stderr layer. `RUST_LOG` still takes
    /// priority over this value.
    pub fn level(mut self, level: Level) -> TracingBuilder {
        self.level = level;
        self
    }

    /// Installs a stderr tracing subscriber filtered by `RUST_LOG`,
    /// defaulting to the configured level.
    pub fn build(self) -> Result<(), Error> {
        let subscriber = tracing_subscriber::registry().with(
            EnvFilter::builder()
                .with_default_directive(self.level.into())
                .from_env()
                .expect("invalid RUST_LOG")
                .and_then(tracing_subscriber::fmt::Layer::new().compact()),
        );

        subscriber.try_init()?;
        Ok(())
    }
}
