// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Tracing subscriber setup for the binary.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

/// Installs a fmt subscriber filtered at `default_level`.
///
/// `RUST_LOG` directives take precedence over the default. Calling this more
/// than once keeps the first subscriber.
pub fn init(default_level: Level) {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();

    let _ = Registry::default()
        .with(filter(default_level, &directives))
        .with(fmt::layer().with_target(true))
        .try_init();
}

/// Builds the level filter; `directives` use the `RUST_LOG` syntax.
fn filter(default_level: Level, directives: &str) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(default_level.into())
        .parse_lossy(directives)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn default_level_applies_without_directives() {
        assert_eq!(
            filter(Level::WARN, "").max_level_hint(),
            Some(LevelFilter::WARN)
        );
    }

    #[test]
    fn directives_override_the_default() {
        assert_eq!(
            filter(Level::WARN, "minerva=debug").max_level_hint(),
            Some(LevelFilter::DEBUG)
        );
    }

    #[test]
    fn malformed_directives_are_skipped() {
        assert_eq!(
            filter(Level::INFO, "minerva=loud").max_level_hint(),
            Some(LevelFilter::INFO)
        );
    }
}
