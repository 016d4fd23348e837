//! autocast.
//!
//! Watches the screen region where a rotation addon shows its suggested spell,
//! recognizes the icon and presses the key bound to it.

mod app;
mod assets;
mod automation;
mod capture;
mod config;
mod dispatch;
#[cfg(test)]
mod fakes;
mod input;
mod keybind;

use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Structured logging. Use `RUST_LOG=debug` etc.; `info` when unset.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    app::run()
}
