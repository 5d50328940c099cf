//! Run one request through a worker backed by the disk cache and the network.

use std::sync::Arc;

use anyhow::{anyhow, bail, Context as _, Result};
use edge_cache::DiskStore;
use edge_core::{Body, InterceptedRequest, WorkerConfig};
use edge_data::HttpFetcher;
use edge_observability::{LogConfig, LogFormat, LogLevel, LogSink};
use edge_worker::Worker;
use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::RenderArgs;
use crate::context::Context;
use crate::output::{format_bytes, phase_badge, status_badge};

/// Run the render command.
pub async fn run(args: RenderArgs, ctx: &Context) -> Result<()> {
    let config = ctx.worker_config()?;
    let request = build_request(&config, &args)?;

    let store = Arc::new(DiskStore::new(ctx.ensure_cache_dir()?));
    let fetcher = Arc::new(HttpFetcher::new().context("Failed to build HTTP client")?);
    let log = LogConfig {
        min_level: if ctx.output.is_verbose() {
            LogLevel::Debug
        } else {
            LogLevel::Warn
        },
        format: if ctx.output.is_json() {
            LogFormat::Json
        } else {
            LogFormat::Human
        },
        sink: LogSink::Stderr,
    };

    let worker = Worker::new(config, store, fetcher)
        .context("Failed to start worker")?
        .with_logging(log);
    worker.install().await.context("Install failed")?;
    worker.activate().await.context("Activation failed")?;
    ctx.output.debug(&format!(
        "Worker {} is {}",
        worker.generation(),
        phase_badge(&worker.phase())
    ));

    let outcome = worker.handle(request).await?;
    let Some(response) = outcome.into_response() else {
        ctx.output
            .warn("The worker does not override this request; it goes to the network unchanged.");
        worker.settle().await;
        return Ok(());
    };

    if args.include {
        println!("HTTP {}", response.status);
        for (name, value) in &response.headers {
            println!("{}: {}", name, value.to_str().unwrap_or("<binary>"));
        }
        println!();
    } else {
        ctx.output
            .debug(&format!("Status {}", status_badge(response.status.as_u16())));
    }

    let written = write_body(response.body, args.output.as_deref()).await?;
    let settled = worker.settle().await;
    ctx.output
        .debug(&format!("{} background task(s) settled", settled));

    if let Some(path) = &args.output {
        ctx.output
            .success(&format!("Wrote {} to {}", format_bytes(written), path));
    }
    Ok(())
}

fn build_request(config: &WorkerConfig, args: &RenderArgs) -> Result<InterceptedRequest> {
    let url = config.absolute_url(&args.url)?;
    let mut request = InterceptedRequest::get(url);
    if !args.no_navigate {
        request = request.navigate();
    }
    if let (Some(site), Some(locale)) = (&args.site, &args.locale) {
        request = request
            .with_header(&config.site_id_header, site)
            .with_header(&config.locale_header, locale);
    }
    for header in &args.headers {
        let (name, value) = parse_header(header)?;
        request = request.with_header(name, value);
    }
    Ok(request)
}

fn parse_header(header: &str) -> Result<(&str, &str)> {
    match header.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim(), value.trim())),
        _ => bail!("Header '{}' is not of the form 'name: value'", header),
    }
}

async fn write_body(mut body: Body, path: Option<&str>) -> Result<u64> {
    let mut out: Box<dyn AsyncWrite + Unpin + Send> = match path {
        Some(path) => Box::new(
            tokio::fs::File::create(path)
                .await
                .with_context(|| format!("Failed to create {}", path))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };

    let mut written = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk =
            chunk.map_err(|e| anyhow!("Response body failed after {} bytes: {}", written, e))?;
        out.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    out.flush().await?;
    Ok(written)
}
