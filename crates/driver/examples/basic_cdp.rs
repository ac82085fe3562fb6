//! Basic CDP example - resolve a debugger address, list targets, evaluate JS

use std::sync::Arc;

use driver::cdp::{self, CdpConnection, CdpSession};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    // Chrome started with --remote-debugging-port=9222
    let ws_url = cdp::browser_websocket_url("localhost:9222").await?;
    println!("Connecting to Chrome at: {}", ws_url);

    let connection = CdpConnection::connect(ws_url).await?;
    println!("Connected!");

    let version = connection
        .send_request("Browser.getVersion", None, None)
        .await?;
    println!("Browser version: {}", version["product"]);

    for target in connection.get_targets().await? {
        println!("Target {} [{}] {}", target.target_id, target.target_type, target.url);
    }

    connection.subscribe(
        "Target.targetCreated",
        Arc::new(|event| println!("Target created: {:?}", event.params)),
    );

    let page = CdpSession::attach_first_page(connection.clone()).await?;
    let title = page.evaluate("document.title").await?;
    println!("Page title via JS: {}", title["result"]["value"]);

    connection.disconnect().await?;
    println!("Disconnected");

    Ok(())
}
