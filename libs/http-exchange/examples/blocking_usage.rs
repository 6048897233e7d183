//! Blocking usage: one exchange driven from a plain thread.
//!
//! Run with `cargo run -p cf-http-exchange --example blocking_usage -- <url>`.

use std::time::Duration;

use http_exchange::{Dispatcher, DispatcherConfig, Request};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://httpbin.org/get".to_owned());

    let dispatcher = Dispatcher::new(DispatcherConfig::from_env()?)?;
    let request = Request::get(url)
        .param("source", "blocking example")
        .header("Accept", "application/json")?
        .connect_timeout(Duration::from_secs(5))
        .read_timeout(Duration::from_secs(10))
        .on_download_progress(|done, total| match total {
            Some(total) => println!("downloaded {done}/{total} bytes"),
            None => println!("downloaded {done} bytes"),
        });

    let mut response = dispatcher.send(request)?;
    println!("{} {}", response.code(), response.message());
    for (name, value) in response.headers() {
        println!("{name}: {}", value.to_str().unwrap_or("<binary>"));
    }
    println!();
    println!("{}", response.text_blocking()?);

    dispatcher.shutdown();
    Ok(())
}
