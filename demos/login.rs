//! Example: log in, show the tree and quota, keep the session alive for a
//! while so remote changes show up in the debug log.
//!
//! Usage:
//!   cargo run --example login -- --email EMAIL --password PASSWORD [--mfa CODE] [--proxy PROXY] [--watch SECS]

mod cli;

use std::time::Duration;

use cli::{init_tracing, parse_credentials, usage_and_exit};
use megafs::{Mega, Node};

const USAGE: &str =
    "Usage: cargo run --example login -- --email EMAIL --password PASSWORD [--mfa CODE] [--proxy PROXY] [--watch SECS]";

async fn print_tree(mega: &Mega, node: &Node, depth: usize) -> megafs::Result<()> {
    for child in mega.children(node).await? {
        let marker = if child.is_folder() { "/" } else { "" };
        println!("{}{}{} ({} bytes)", "  ".repeat(depth), child.name, marker, child.size);
        if child.is_folder() {
            Box::pin(print_tree(mega, &child, depth + 1)).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let creds = parse_credentials(USAGE);
    let watch = match creds.positionals.as_slice() {
        [] => 0,
        [flag, secs] if flag == "--watch" => secs.parse().unwrap_or_else(|_| usage_and_exit(USAGE)),
        _ => usage_and_exit(USAGE),
    };

    println!("Logging in as: {}", creds.email);
    let mega = creds.login().await?;
    println!("Login successful!");
    println!();

    if let Some(root) = mega.root().await {
        println!("{}/", root.name);
        print_tree(&mega, &root, 1).await?;
    }

    let quota = mega.get_quota().await?;
    println!();
    println!("Used {} of {} bytes ({:.1}%)", quota.used, quota.total, quota.usage_percent());

    if let Some(session) = mega.dump_session().await {
        println!("Session: {}...", &session[..session.len().min(20)]);
    }

    if watch > 0 {
        println!("Watching for remote changes for {}s...", watch);
        tokio::time::sleep(Duration::from_secs(watch)).await;
    }

    mega.logout().await;
    Ok(())
}
