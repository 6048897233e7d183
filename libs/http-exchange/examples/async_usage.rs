//! Async usage: awaiting an exchange and streaming its body.
//!
//! Run with `cargo run -p cf-http-exchange --example async_usage -- <url>`.

use http_exchange::Request;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://httpbin.org/post".to_owned());

    let mut response = Request::post(url)
        .param("greeting", "hello world")
        .on_upload_progress(|done, total| println!("uploaded {done}/{total:?} bytes"))
        .send()
        .await?;

    println!("{} {}", response.code(), response.message());
    if let Some(location) = response.header("Location") {
        println!("redirected to {location} (not followed)");
    }

    let mut received = 0usize;
    while let Some(chunk) = response.chunk().await? {
        received += chunk.len();
        print!("{}", String::from_utf8_lossy(&chunk));
    }
    response.close();
    println!("\n{received} bytes received");

    Ok(())
}
