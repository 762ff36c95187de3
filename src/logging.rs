use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "info";

/// Installs the global `fmt` subscriber, filtered by `RUST_LOG` directives
/// such as `info,rumqttc=warn`. Calling it again is a no-op, so tests may
/// call it freely.
pub fn init() {
    let directives = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_string());
    let _ = FmtSubscriber::builder()
        .with_env_filter(filter_from(&directives))
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .try_init();
}

/// Parses filter directives, falling back to [`DEFAULT_FILTER`].
pub fn filter_from(directives: &str) -> EnvFilter {
    EnvFilter::try_new(directives.trim()).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::level_filters::LevelFilter;

    #[test]
    fn per_target_directives_are_kept() {
        let filter = filter_from("info,rumqttc=trace");
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
    }

    #[test]
    fn plain_level_names_work() {
        assert_eq!(filter_from(" warn ").max_level_hint(), Some(LevelFilter::WARN));
    }

    #[test]
    fn init_twice_does_not_panic() {
        init();
        init();
    }
}
