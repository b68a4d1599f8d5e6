// src/bin/resolve_urls.rs
//
// Reads URLs from stdin, one per line, and prints how each redirect chain
// ends using the diagnostic hop limit.

use anyhow::{Context, Result};
use log::info;
use mention_graph_lib::canonical::{Resolution, ResolverSettings, UrlCanonicalizer};
use mention_graph_lib::errors::PipelineError;
use mention_graph_lib::utils::env::load_env;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    load_env();

    let connect_timeout = std::env::var("CONNECT_TIMEOUT_SECS")
        .unwrap_or_else(|_| "10".to_string())
        .parse()
        .unwrap_or(10);
    let settings = ResolverSettings::diagnostic();
    info!(
        "Resolving URLs from stdin (max {} hops, {}s connect timeout)",
        settings.max_hops, connect_timeout
    );
    let canonicalizer =
        UrlCanonicalizer::with_http(settings, Duration::from_secs(connect_timeout))?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let url = line.trim();
        if url.is_empty() {
            continue;
        }
        match canonicalizer.resolve(url).await {
            Ok(Resolution::Resolved { url: target, hops }) => {
                println!("{}\tRESOLVED\t{}\t{}", url, hops, target);
            }
            Ok(Resolution::LoopDetected { original, hops }) => {
                let loop_err = PipelineError::RedirectLoop {
                    url: original.clone(),
                    max_hops: canonicalizer.settings().max_hops,
                };
                println!("{}\tLOOP\t{}\t{}\t{}", url, hops, original, loop_err);
            }
            Ok(Resolution::Unreachable {
                last_url,
                hops,
                reason,
            }) => {
                println!("{}\tUNREACHABLE\t{}\t{}\t{}", url, hops, last_url, reason);
            }
            Err(e) => println!("{}\tMALFORMED\t0\t{}\t{}", url, url, e),
        }
    }
    Ok(())
}
