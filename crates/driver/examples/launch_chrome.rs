//! Launch chromedriver, open a session, click through a page, then quit

use driver::actions::keys;
use driver::{
    ActionSequence, Capabilities, Chromium, ChromiumDriver, ChromiumOptions, DevTools,
    ExecutorConfig, ServiceConfig,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let options = ChromiumOptions::chrome().with_args(["--headless=new", "--no-sandbox"]);
    let request = Capabilities::new()
        .with_accept_insecure_certs(true)
        .with_options(&options)?
        .into_session_request();

    let mut driver = ChromiumDriver::launch(
        Chromium::chrome(),
        ServiceConfig::default(),
        request,
        ExecutorConfig::default(),
    )
    .await?;
    println!("Session: {:?}", driver.session().map(|s| &s.id));

    driver.navigate("https://www.rust-lang.org").await?;
    println!("Title: {}", driver.title().await?);

    let search = driver.find_element("css selector", "a[href='/learn']").await?;
    let mut actions = ActionSequence::new();
    actions.click_on(&search).key_press(keys::END);
    actions.perform(&*driver).await?;
    actions.clear(&*driver).await?;

    let version = driver
        .execute_cdp_command("Browser.getVersion", serde_json::json!({}))
        .await?;
    println!("Browser via CDP: {}", version["product"]);

    let png = driver.screenshot().await?;
    println!("Screenshot: {} bytes", png.len());

    driver.quit().await?;
    println!("Stopped");

    Ok(())
}
