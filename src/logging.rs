//! Tracing setup for the daemon.
//!
//! stdout carries the line-delimited JSON protocol, so all diagnostics go to
//! stderr. `RUST_LOG` overrides the default filter.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("schoolbookd=info"));

    let subscriber = tracing_subscriber::registry().with(env_filter).with(
        fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_file(false)
            .with_line_number(false),
    );

    // Ignore the error if a subscriber is already installed (tests).
    let _ = subscriber.try_init();
}
