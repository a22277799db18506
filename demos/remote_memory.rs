//! Allocate, write, read and free a remote block against an in-process
//! daemon on a free loopback port.
//!
//! ```text
//! cargo run --example remote_memory
//! ```

use ether::{Client, Server};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ether::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(std::io::stderr)
        .init();

    let mut server = Server::builder().bind("127.0.0.1:0").build().await?;
    let addr = server.local_addr()?;

    let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();
    let daemon = tokio::spawn(async move {
        server
            .run_until(async {
                let _ = done_rx.await;
            })
            .await?;
        Ok::<_, ether::EtherError>(server.shutdown())
    });

    let mut client = Client::connect(addr).await?;
    client.ping().await?;

    let token = client.alloc(100).await?;
    client.write(token, b"hello\0").await?;
    let data = client.read(token, 6).await?;
    println!("read back {:?} from {}", String::from_utf8_lossy(&data), token);

    if let Err(e) = client.write(token, &[0xAA; 200]).await {
        println!("oversized write refused: {}", e);
    }

    client.free(token).await?;
    drop(client);

    let _ = done_tx.send(());
    let stats = daemon
        .await
        .map_err(|e| ether::EtherError::Protocol(format!("daemon task failed: {}", e)))??;
    println!(
        "allocs={} frees={} peak={} bytes",
        stats.num_allocs, stats.num_frees, stats.peak_usage
    );
    Ok(())
}
