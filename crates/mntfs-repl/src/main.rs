//! mntfs REPL entry point.
//!
//! Launch the interactive shell:
//! ```bash
//! cargo run -p mntfs-repl
//! ```

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    tracing::debug!("Starting mntfs REPL");
    mntfs_repl::run()
}
