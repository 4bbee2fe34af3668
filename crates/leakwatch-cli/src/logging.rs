//! `tracing-subscriber` setup, tiered by `-v`/`-q`: quiet by default,
//! progressively more of the crawl's own internals surfaced as verbosity
//! climbs, always overridable via `RUST_LOG`.

use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

pub fn init_logging(verbosity: u8, quiet: bool) {
    let filter = if quiet {
        "error"
    } else {
        match verbosity {
            0 => "warn,leakwatch=info,leakwatch_cli=info",
            1 => "info,leakwatch=debug",
            _ => "debug",
        }
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(stderr)
        .with_target(true)
        .with_level(true)
        .compact()
        .init();
}
