use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use vidsearch::{Heartbeat, SearchArgs};

#[derive(Parser, Debug)]
#[command(
    name = "vidsearch-cli",
    about = "Ask one question against the video index and print the answer"
)]
struct SearchCli {
    /// Question to search for
    #[arg(long)]
    query: String,

    /// Number of results for this query (defaults to --top-k)
    #[arg(long)]
    results: Option<usize>,

    /// Print ranked results as JSON instead of the formatted answer
    #[arg(long, default_value_t = false)]
    json: bool,

    #[command(flatten)]
    search: SearchArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    vidsearch::init_tracing();
    let cli = SearchCli::parse();
    let service = cli.search.build_service().await?;
    let top_k = cli.results.unwrap_or(service.settings().top_k).max(1);

    let progress = Heartbeat::start(Duration::from_secs(1), || async {
        eprint!(".");
        let _ = std::io::stderr().flush();
    });
    let outcome = service.search_ranked(&cli.query, top_k).await;
    progress.stop();
    eprintln!();

    let results = outcome.context("search failed")?;
    if cli.json {
        let rendered =
            serde_json::to_string_pretty(&results).context("failed to serialize results")?;
        println!("{rendered}");
    } else {
        println!("{}", service.format(&results, &cli.query));
    }
    Ok(())
}
