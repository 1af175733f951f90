use anyhow::Context;
use mailarchive::{ArchiveStore, StoreConfig};
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <search_query> | --stats", args[0]);
        eprintln!("Search query matches against Subject or Body.");
        std::process::exit(1);
    }

    let config = StoreConfig::load();
    let mut store = ArchiveStore::with_config(config);

    if args[1] == "--stats" {
        let stats = store
            .statistics()
            .await
            .context("Failed to read archive statistics")?;
        println!("Total emails: {}", stats.total_emails);
        println!("Unread: {}", stats.unread);
        println!("Important: {}", stats.important);
        println!("By category:");
        for entry in &stats.per_category {
            println!("  {}: {}", entry.name, entry.count);
        }

        let categories = store
            .list_categories()
            .await
            .context("Failed to list categories")?;
        println!("Categories:");
        for category in &categories {
            println!(
                "  {} [{}] {}",
                category.display_name, category.color, category.description
            );
        }
        store.close().await?;
        return Ok(());
    }

    let query = &args[1];
    let found = store
        .search_emails(query, 1)
        .await
        .with_context(|| format!("Failed to search archive at {}", store.path().display()))?;

    if let Some(email) = found.first() {
        println!("Found Email:");
        println!("ID: {}", email.id);
        println!("From: {}", email.sender);
        println!("To: {}", email.recipient);
        println!("Subject: {}", email.subject);
        println!("Sent: {}", email.sent_at.to_rfc3339());
        println!(
            "Category: {}",
            email.category_name.as_deref().unwrap_or("(None)")
        );
        println!(
            "Flags: read={} important={} archived={}",
            email.is_read, email.is_important, email.is_archived
        );
        println!(
            "--------------------------------------------------------------------------------"
        );
        println!("BODY (Raw Debug):");
        println!("{:?}", email.body);
        println!(
            "--------------------------------------------------------------------------------"
        );
        println!("RECORD (JSON):");
        println!("{}", serde_json::to_string_pretty(email)?);
    } else {
        println!("No emails found matching '{}'", query);
    }

    store.close().await?;
    Ok(())
}
