//! Serve a directory over HTTP.
//!
//! ```text
//! RUST_LOG=serve_static=debug cargo run --example disk -- ./public [options.toml]
//! ```

use serve_static::{ServeConfig, ServeDir, ServeOptions};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let root = args.next().unwrap_or_else(|| ".".to_owned());
    let options = match args.next() {
        Some(path) => toml::from_str::<ServeOptions>(&std::fs::read_to_string(path)?)?,
        None => ServeOptions::default(),
    };

    let service = ServeDir::with_config(ServeConfig::new(root, options)?);

    // Run our service using `hyper`
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], 3000));
    tracing::info!(%addr, "listening");
    hyper::Server::bind(&addr)
        .serve(tower::make::Shared::new(service))
        .await?;

    Ok(())
}
