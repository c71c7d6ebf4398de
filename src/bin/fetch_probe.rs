//! fetch-probe — 通过弹性客户端发起请求并打印结果与缓存统计
//!
//! Usage:
//!   fetch-probe <url> [--retries N] [--delay-ms N] [--cache-ttl-ms N] [--repeat N] [--config <path>]

use anyhow::{anyhow, bail, Context};
use resilient_fetch::client::{AttemptOutcome, RequestOptionsBuilder};
use resilient_fetch::config::ClientConfig;
use resilient_fetch::resilience::retry::RetryConfig;
use resilient_fetch::{CacheStore, ClientBuilder, FetchOutcome};
use serde_json::Value;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

struct Args {
    url: String,
    retries: Option<u32>,
    delay_ms: u64,
    cache_ttl_ms: Option<u64>,
    repeat: u32,
    config: Option<String>,
}

fn print_usage() {
    println!(
        r#"fetch-probe — resilient-fetch 诊断工具

USAGE:
    fetch-probe <url> [OPTIONS]

OPTIONS:
    --retries <N>        Retry retryable failures up to N times
    --delay-ms <N>       Pause between attempts (default 1000)
    --cache-ttl-ms <N>   Cache successful replies for N ms
    --repeat <N>         Issue the request N times (default 1)
    --config <path>      Load client defaults from a YAML/JSON file
    help                 Show this help message

ENVIRONMENT:
    FETCH_BASE_URL                 Base URL for relative request URLs
    FETCH_HTTP_TIMEOUT_SECS        Default per-request timeout
    FETCH_HTTP_LONG_TIMEOUT_SECS   Timeout for long-running endpoints
    FETCH_PROXY_URL                HTTP(S) proxy
    RUST_LOG                       Log filter (e.g. resilient_fetch=debug)"#
    );
}

fn parse_args(raw: &[String]) -> anyhow::Result<Args> {
    let mut args = Args {
        url: String::new(),
        retries: None,
        delay_ms: 1000,
        cache_ttl_ms: None,
        repeat: 1,
        config: None,
    };
    let mut iter = raw.iter();
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| anyhow!("{flag} requires a value"))
        };
        match arg.as_str() {
            "--retries" => args.retries = Some(value("--retries")?.parse()?),
            "--delay-ms" => args.delay_ms = value("--delay-ms")?.parse()?,
            "--cache-ttl-ms" => args.cache_ttl_ms = Some(value("--cache-ttl-ms")?.parse()?),
            "--repeat" => args.repeat = value("--repeat")?.parse()?,
            "--config" => args.config = Some(value("--config")?),
            other if other.starts_with("--") => bail!("unknown option: {other}"),
            other if args.url.is_empty() => args.url = other.to_string(),
            other => bail!("unexpected argument: {other}"),
        }
    }
    if args.url.is_empty() {
        bail!("missing <url>");
    }
    Ok(args)
}

fn request_options(args: &Args, config: &ClientConfig) -> RequestOptionsBuilder {
    let mut builder = config.request(args.url.clone());
    if let Some(retries) = args.retries {
        builder = builder.retry(RetryConfig::fixed(
            retries,
            Duration::from_millis(args.delay_ms),
        ));
    }
    if let Some(ttl) = args.cache_ttl_ms {
        builder = builder.cache_ttl(Duration::from_millis(ttl));
    }
    builder
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    if raw.is_empty() || matches!(raw[0].as_str(), "help" | "--help" | "-h") {
        print_usage();
        return Ok(());
    }
    let args = parse_args(&raw)?;

    let config = match &args.config {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("loading config from {path}"))?,
        None => ClientConfig::default(),
    }
    .with_env_overrides();

    let options = request_options(&args, &config).build()?;
    let client = ClientBuilder::<Value>::from_config(&config, args.url.clone())?
        .options(options)
        .build()?;

    for round in 1..=args.repeat {
        let outcome = client.execute().await?;
        let attempts = client.last_attempts();
        println!("── round {round}/{} ──", args.repeat);
        for record in &attempts {
            let result = match &record.outcome {
                AttemptOutcome::Success { status } => format!("HTTP {status}"),
                AttemptOutcome::Failed { class, status } => match status {
                    Some(status) => format!("{class} (HTTP {status})"),
                    None => class.to_string(),
                },
            };
            println!(
                "  attempt {} · {} ms · {}",
                record.attempt_number + 1,
                record.elapsed.as_millis(),
                result
            );
        }
        match outcome {
            FetchOutcome::Data(data) => {
                if attempts.is_empty() {
                    println!("  served from cache");
                }
                println!("{}", serde_json::to_string_pretty(&data)?);
            }
            FetchOutcome::Failed(err) => println!("  ✗ {err}"),
            FetchOutcome::Superseded => println!("  superseded"),
        }
    }

    print_stats(client.cache_store());
    Ok(())
}

fn print_stats(store: &CacheStore) {
    let stats = store.stats();
    println!(
        "cache: {} hit(s), {} miss(es), {} write(s), hit ratio {:.2}",
        stats.hits,
        stats.misses,
        stats.sets,
        stats.hit_ratio()
    );
}
