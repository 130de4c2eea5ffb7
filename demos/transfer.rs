//! Example: upload a local file to the Cloud Drive root and download it
//! back, showing a progress bar. Ctrl-C cancels the running transfer.
//!
//! Usage:
//!   cargo run --example transfer -- --email EMAIL --password PASSWORD [--proxy PROXY] <LOCAL_FILE> <DOWNLOAD_TO>

mod cli;

use std::path::Path;

use cli::{init_tracing, parse_credentials, usage_and_exit};
use indicatif::{ProgressBar, ProgressStyle};
use megafs::{CancellationToken, TransferProgress};

const USAGE: &str =
    "Usage: cargo run --example transfer -- --email EMAIL --password PASSWORD [--proxy PROXY] <LOCAL_FILE> <DOWNLOAD_TO>";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let creds = parse_credentials(USAGE);
    let [local, target] = creds.positionals.as_slice() else {
        usage_and_exit(USAGE);
    };

    let mega = creds.login().await?;
    let root = mega.root().await.ok_or("tree has no Cloud Drive root")?;

    let progress_bar = ProgressBar::new(0);
    progress_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-"),
    );
    let progress_bar_for_cb = progress_bar.clone();
    mega.watch_progress(Box::new(move |p: &TransferProgress| {
        progress_bar_for_cb.set_length(p.total);
        progress_bar_for_cb.set_message(p.filename.clone());
        progress_bar_for_cb.set_position(p.done.min(p.total));
        true
    }));

    let token = CancellationToken::new();
    let ctrl_c = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = ctrl_c.cancel();
        }
    });

    let name = Path::new(local)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or("local path has no file name")?;
    let mut input = tokio::fs::File::open(local).await?;
    let size = input.metadata().await?.len();

    let node = mega.upload_file(&root, name, size, &mut input, &token).await?;
    progress_bar.finish_and_clear();
    println!("Uploaded {} as {}", name, node.handle);

    let mut output = tokio::fs::File::create(target).await?;
    progress_bar.reset();
    mega.download_file(&node, &mut output, &token).await?;
    progress_bar.finish_and_clear();
    println!("Downloaded to {} (MAC verified)", target);

    token.close();
    mega.logout().await;
    Ok(())
}
