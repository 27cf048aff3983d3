use std::time::Duration;

use anyhow::Context;
use log::info;
use reqwest::{Client, Proxy};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// Built exactly once at startup and shared by handle; reqwest clients are
// cheap to clone and safe to use from every request concurrently.
pub fn build_client(proxy_url: Option<&str>) -> anyhow::Result<Client> {
    let mut builder = Client::builder().connect_timeout(CONNECT_TIMEOUT);

    match proxy_url {
        Some(url) => {
            info!("Configuring proxy agent: {url}");
            let proxy = Proxy::all(url).with_context(|| format!("invalid proxy URL: {url}"))?;
            builder = builder.proxy(proxy);
        }
        None => info!("No HTTP_PROXY set, using direct connection."),
    }

    builder.build().context("failed to build HTTP client")
}
