use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// `RUST_LOG` wins; otherwise planner logs at info (debug when verbose).
fn planner_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)))
}

fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "roi_planner=debug,info"
    } else {
        "roi_planner=info"
    }
}

pub fn init_cli_logger(verbose: bool) {
    tracing_subscriber::registry()
        .with(planner_filter(verbose))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

pub fn init_json_logger(verbose: bool) {
    tracing_subscriber::registry()
        .with(planner_filter(verbose))
        .with(
            tracing_subscriber::fmt::layer()
                .json() // JSON lines so consumer workers can be tailed by a log collector
                .with_target(true)
                .with_thread_ids(true)
                .with_current_span(false),
        )
        .init();
}

/// Picks the logger for the configured `logging.format`.
pub fn init_logger(json: bool, verbose: bool) {
    if json {
        init_json_logger(verbose);
    } else {
        init_cli_logger(verbose);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_follow_verbosity() {
        assert_eq!(default_directives(false), "roi_planner=info");
        assert_eq!(default_directives(true), "roi_planner=debug,info");
    }
}
