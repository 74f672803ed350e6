//! Logs in, lists failed tasks and waits for a task to finish.
//!
//! This example shows how to:
//! - Negotiate an API version and log in
//! - Walk a paginated query
//! - Wait for a task and inspect its outcome
//!
//! Run with:
//! `VCD_URL=https://vcd.example.com/api VCD_USER=admin VCD_ORG=System VCD_PASSWORD=... cargo run --example session_tasks`

use std::env;
use vcd_client::credentials::BasicCredentials;
use vcd_client::model::TaskRecord;
use vcd_client::query::QueryResultFormat;
use vcd_client::{Error, VcdClient};

fn var(name: &str) -> Result<String, Error> {
    env::var(name).map_err(|_| Error::ConfigurationError(format!("{name} is not set")))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("vcd_client=debug,session_tasks=info")
        .init();

    let client = VcdClient::builder()
        .endpoint(var("VCD_URL")?)?
        .accept_invalid_certs(true)
        .build_negotiated(&["37.0", "36.0", "35.0"])
        .await?;
    println!("Negotiated API version: {:?}", client.api_version());

    client
        .login(BasicCredentials::new(
            var("VCD_USER")?,
            var("VCD_ORG")?,
            var("VCD_PASSWORD")?,
        ))
        .await?;
    let session = client.session_info()?;
    println!("Logged in as {:?} in {:?}", session.user, session.org);

    println!("=== Failed tasks ===");
    let mut pages = client
        .query::<TaskRecord>("task", QueryResultFormat::Records)
        .equality_filter([("status", "error")])
        .page_size(25)
        .execute()
        .await?;
    let mut last = None;
    while let Some(page) = pages.next().await? {
        for record in page.record {
            println!("{} {:?}", record.href, record.name);
            last = Some(record.href);
        }
    }

    if let Some(href) = last {
        println!("=== Waiting for {href} ===");
        match client.task_monitor().wait_for_href(&href).await {
            Ok(task) => println!("Finished: {}", task.status),
            Err(Error::Task(e)) => println!("Task failed: {e}"),
            Err(e) => return Err(e),
        }
    }

    client.logout().await?;
    Ok(())
}
