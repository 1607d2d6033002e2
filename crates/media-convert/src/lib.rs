//! `heic2png` と `mp42gif` の共通処理。

pub mod config;
pub mod version;

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// ログを stderr に出力する。`RUST_LOG` が指定されていればそちらを優先する。
pub fn init_tracing(verbose: bool) {
    let level = if verbose { Level::INFO } else { Level::WARN };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .init();
}
