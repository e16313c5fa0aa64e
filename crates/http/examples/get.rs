use std::error::Error;
use std::time::Duration;

use bytes::Bytes;
use http::Request;
use http_body_util::{BodyExt, Empty};
use micro_h1::connection::{ClientConnection, RequestOptions};
use micro_h1::protocol::HeaderOrder;
use tokio::net::TcpStream;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let host = std::env::args().nth(1).unwrap_or_else(|| "example.com".to_string());

    let tcp_stream = match TcpStream::connect((host.as_str(), 80)).await {
        Ok(tcp_stream) => tcp_stream,
        Err(e) => {
            error!(cause = %e, host, "connect error");
            return Err(e.into());
        }
    };

    let (reader, writer) = tcp_stream.into_split();
    let connection = ClientConnection::builder()
        .on_close(|cause| match cause {
            Some(cause) => info!(%cause, "connection closed"),
            None => info!("connection closed"),
        })
        .build(reader, writer);

    let options = RequestOptions::new()
        .timeout(Duration::from_secs(10))
        .header_order(["host", "user-agent", "accept"].into_iter().collect::<HeaderOrder>());

    for path in ["/", "/index.html"] {
        let request = Request::get(format!("http://{host}{path}"))
            .header("user-agent", "micro-h1")
            .header("accept", "*/*")
            .body(Empty::<Bytes>::new())?;

        let response = connection.send_request(request, options.clone()).await?;
        info!(path, status = %response.status(), headers = ?response.headers(), "received response");

        let body = response.into_body().collect().await?.to_bytes();
        info!(path, size = body.len(), "received body");
    }

    connection.close(None);
    Ok(())
}
