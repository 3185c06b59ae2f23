//! Sends a file (or stdin) to a running `revu` server and prints the review.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use tokio::io::AsyncReadExt;

use revu::client::{DEFAULT_API, ReviewClient, render};
use revu::review::FocusArea;

#[derive(Debug, Parser)]
#[command(name = "revu-client", version, about = "Review code with a local revu server")]
struct Args {
    /// File to review; reads stdin when omitted.
    file: Option<PathBuf>,

    /// Area to emphasize. Repeat for several; defaults to all.
    #[arg(short, long = "focus", value_name = "AREA")]
    focus: Vec<FocusArea>,

    /// Review endpoint.
    #[arg(long, env = "REVIEW_API", default_value = DEFAULT_API)]
    api: String,

    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,
}

async fn read_input(file: Option<&PathBuf>) -> anyhow::Result<String> {
    match file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display())),
        None => {
            let mut text = String::new();
            tokio::io::stdin()
                .read_to_string(&mut text)
                .await
                .context("reading stdin")?;
            Ok(text)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let focus: BTreeSet<FocusArea> = if args.focus.is_empty() {
        FocusArea::all()
    } else {
        args.focus.iter().copied().collect()
    };

    let text = read_input(args.file.as_ref()).await?;
    let client = ReviewClient::new(&args.api, Duration::from_secs(args.timeout_secs))?;
    let result = client.review(&text, &focus).await?;

    print!("{}", render(&result));
    Ok(())
}
