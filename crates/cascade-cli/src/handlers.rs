//! Command handlers.

use cascade_core::change::Change;
use cascade_core::config::CascadeConfig;
use cascade_core::dispatch::DispatchRequest;
use cascade_core::events::FeedRecord;
use cascade_core::ports::RecordingSink;
use cascade_scheduler::{ChannelSink, SchedulerRegistry, SchedulerService, SchedulingEngine};
use console::style;
use std::future::Future;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};

type CliResult = Result<(), Box<dyn std::error::Error>>;

const REFERENCE_CONFIG: &str = include_str!("../../../config/llvm-project.yaml");

fn load_registry(path: &Path) -> Result<(CascadeConfig, SchedulerRegistry), cascade_core::Error> {
    let config = CascadeConfig::from_file(path)?;
    let registry = SchedulerRegistry::load(&config)?;
    Ok((config, registry))
}

/// Write the reference configuration.
pub fn init(path: &Path, force: bool) -> CliResult {
    if path.exists() && !force {
        println!(
            "{} {} already exists (use --force to overwrite)",
            style("!").yellow(),
            path.display()
        );
        return Ok(());
    }

    std::fs::write(path, REFERENCE_CONFIG)?;
    println!("{} Created {}", style("✓").green(), path.display());
    Ok(())
}

/// Validate a configuration and print the schedulers upstreams first.
pub fn validate(path: &Path) -> CliResult {
    let (_, registry) = load_registry(path)?;

    println!(
        "{} Configuration {} is valid",
        style("✓").green(),
        style(path.display()).bold()
    );
    println!("  Classifier rules: {}", registry.classifier().len());
    println!("  Schedulers: {}", registry.len());

    for entry in registry.entries() {
        let mut line = format!(
            "    - {} ({}s, {})",
            entry.name(),
            entry.window().as_secs(),
            entry.builders().join(", ")
        );
        let graph = registry.graph();
        let upstreams = graph.upstreams(entry.name());
        if !upstreams.is_empty() {
            line.push_str(&format!(" after {:?} of {}", entry.wait(), upstreams.join(", ")));
        }
        let downstreams = graph.downstreams(entry.name());
        if !downstreams.is_empty() {
            line.push_str(&format!(", feeds {}", downstreams.join(", ")));
        }
        if entry.enabled() {
            println!("{line}");
        } else {
            println!("{} {}", style(line).dim(), style("[disabled]").yellow());
        }
    }

    Ok(())
}

/// Schedulers a change made of `files` would arm.
fn matching_schedulers<'a>(registry: &'a SchedulerRegistry, change: &Change) -> Vec<&'a str> {
    let classified = registry.classifier().classify_change(change);
    registry
        .entries()
        .filter(|entry| entry.enabled() && entry.filter().matches(&classified))
        .map(|entry| entry.name())
        .collect()
}

/// Classify paths from stdin and show which schedulers they would arm.
pub fn classify(path: &Path, branch: Option<String>) -> CliResult {
    let (_, registry) = load_registry(path)?;

    let files: Vec<String> = std::io::stdin()
        .lock()
        .lines()
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect();

    for file in &files {
        let tags: Vec<String> = registry.classifier().classify(file).into_iter().collect();
        if tags.is_empty() {
            println!("{}  {}", file, style("(no tags)").dim());
        } else {
            println!("{}  {}", file, style(tags.join(", ")).cyan());
        }
    }

    let branch = branch.unwrap_or_else(|| registry.manual().default_branch.clone());
    let change = Change::new("classify", branch, files);
    let matched = matching_schedulers(&registry, &change);

    println!();
    if matched.is_empty() {
        println!("{} No scheduler matches", style("i").blue());
    } else {
        println!("{} Matching schedulers:", style("▶").cyan());
        for name in matched {
            println!("    - {}", name);
        }
    }
    Ok(())
}

fn to_json_lines(requests: &[DispatchRequest]) -> Result<Vec<String>, serde_json::Error> {
    requests.iter().map(serde_json::to_string).collect()
}

/// Force builders and print the emitted requests as JSON lines.
pub fn force(
    path: &Path,
    builders: Vec<String>,
    revision: String,
    branch: Option<String>,
    reason: Option<String>,
) -> CliResult {
    let config = CascadeConfig::from_file(path)?;
    let sink = Arc::new(RecordingSink::new());
    let engine = SchedulingEngine::from_config(&config, sink.clone())?;

    engine.force_dispatch(&builders, &revision, branch.as_deref(), reason.as_deref())?;
    for line in to_json_lines(&sink.take())? {
        println!("{line}");
    }
    Ok(())
}

/// Feed stdin into the scheduling loop and stream dispatch requests to
/// stdout.
pub async fn serve(path: &Path, exit_on_eof: bool) -> CliResult {
    let config = CascadeConfig::from_file(path)?;
    let input = BufReader::new(tokio::io::stdin());
    let interrupted = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    run_feed(&config, input, tokio::io::stdout(), interrupted, exit_on_eof).await?;
    Ok(())
}

/// Drive a scheduler service from `input` until `stop` resolves.
///
/// At end of input the service keeps running until `stop`, unless
/// `exit_on_eof` is set, in which case open windows drain and the call
/// returns. Returns the output writer once every request is written.
async fn run_feed<R, W, S>(
    config: &CascadeConfig,
    input: R,
    mut output: W,
    stop: S,
    exit_on_eof: bool,
) -> Result<W, Box<dyn std::error::Error>>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
    S: Future<Output = ()>,
{
    let (sink, mut requests) = ChannelSink::new();
    let engine = SchedulingEngine::from_config(config, Arc::new(sink))?;
    let (service, handle) = SchedulerService::new(engine);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let service_task = tokio::spawn(service.run(shutdown_rx));
    let writer_task = tokio::spawn(async move {
        while let Some(request) = requests.recv().await {
            let mut line = serde_json::to_vec(&request)?;
            line.push(b'\n');
            output.write_all(&line).await?;
            output.flush().await?;
        }
        Ok::<_, cascade_core::Error>(output)
    });

    tokio::pin!(stop);
    let mut lines = input.lines();
    let mut stopped = false;
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("Feed closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<FeedRecord>(&line) {
                    Ok(record) => handle.submit(record)?,
                    Err(e) => warn!(error = %e, "Skipping malformed feed record"),
                }
            }
            _ = &mut stop => {
                stopped = true;
                break;
            }
        }
    }

    if !stopped && !exit_on_eof {
        // Held triggers and open windows still need ticks.
        info!("Serving until interrupted");
        (&mut stop).await;
        stopped = true;
    }
    drop(handle);
    if stopped {
        let _ = shutdown_tx.send(true);
    }

    let engine = service_task.await?;
    drop(engine);
    Ok(writer_task.await??)
}

/// Print the configuration JSON Schema.
pub fn schema() -> CliResult {
    let schema = schemars::schema_for!(CascadeConfig);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
