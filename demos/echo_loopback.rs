//! Echo server and client wired together over a loopback pair.
//!
//! Run with `RUST_LOG=debug cargo run --example echo_loopback` to see the
//! per-transport trace.

use loopback_transport::{connected_pair, LoopbackConfig, LoopbackTransport, Result, Transport};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum Message {
    Request { id: u64, text: String },
    Response { id: u64, text: String },
    Notification { text: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let (client, server): (LoopbackTransport<Message>, LoopbackTransport<Message>) =
        connected_pair(
            LoopbackConfig::client()
                .with_debug(true)
                .with_stringify_messages(true),
            LoopbackConfig::server().with_debug(true),
        )?;

    println!("session {}", client.session_id().map(|s| s.to_string()).unwrap_or_default());

    // Server: answer every request with its text upper-cased.
    let responder = server.clone();
    server.on_message(move |msg| {
        if let Message::Request { id, text } = msg {
            let responder = responder.clone();
            tokio::spawn(async move {
                let reply = Message::Response {
                    id,
                    text: text.to_uppercase(),
                };
                if let Err(err) = responder.send(reply).await {
                    eprintln!("server reply failed: {err}");
                }
            });
        }
    });
    server.on_close(|| println!("server closed"));

    // Client: forward everything received to main.
    let (tx, mut rx) = mpsc::unbounded_channel();
    client.on_message(move |msg| {
        let _ = tx.send(msg);
    });
    client.on_close(|| println!("client closed"));
    client.on_error(|err| eprintln!("client error: {err}"));

    client.start().await?;
    server.start().await?;

    client
        .send(Message::Notification {
            text: "hello from the client".into(),
        })
        .await?;

    for (id, text) in ["ping", "loopback", "done"].into_iter().enumerate() {
        client
            .send(Message::Request {
                id: id as u64,
                text: text.into(),
            })
            .await?;
    }

    for _ in 0..3 {
        if let Some(Message::Response { id, text }) = rx.recv().await {
            println!("response {id}: {text}");
        }
    }

    client.close().await?;
    Ok(())
}
