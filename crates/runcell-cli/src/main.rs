use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use runcell_core::{Executor, ExecutorConfig};
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[clap(
    name = "runcell",
    version = "0.1.0",
    about = "Run untrusted code inside a resource-bounded container"
)]
struct Cli {
    #[clap(help = "Script file to execute; stdin is read when omitted and --code is unset")]
    script: Option<PathBuf>,

    #[clap(long, help = "Inline source code to execute")]
    code: Option<String>,

    #[clap(long, short, help = "YAML configuration file")]
    config: Option<PathBuf>,

    #[clap(long, help = "Runtime image name override")]
    image: Option<String>,

    #[clap(long, help = "Runtime image tag override")]
    tag: Option<String>,

    #[clap(long, help = "Wall-clock limit in seconds")]
    timeout: Option<u64>,

    #[clap(long, help = "Print the result as JSON")]
    json: bool,

    #[clap(long, short, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level_filter = cli.log_level.parse().unwrap_or(LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(log_level_filter)
        .init();

    if cli.script.is_some() && cli.code.is_some() {
        anyhow::bail!(
            "Conflicting input flags specified. Pass either a script file or --code, not both."
        );
    }

    let code = read_code(&cli).await?;

    let mut config = match &cli.config {
        Some(path) => ExecutorConfig::from_file(path).await?,
        None => ExecutorConfig::default(),
    };
    if let Some(image) = cli.image {
        config.runtime.image = image;
    }
    if let Some(tag) = cli.tag {
        config.runtime.tag = tag;
    }
    if let Some(timeout) = cli.timeout {
        config.timeout_secs = timeout;
    }

    let executor = Executor::new(config)?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received, stopping execution");
            interrupt.cancel();
        }
    });

    match executor.execute_with_cancellation(&code, cancel).await {
        Ok(execution) => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&execution)?);
            } else {
                print!("{}", execution.output);
            }
            log::info!(
                "Execution finished in {} ms (container {})",
                execution.elapsed_ms,
                execution.container
            );
            Ok(())
        }
        Err(e) => {
            if let Some(partial) = e.partial_output() {
                eprintln!("Partial output before failure:");
                eprintln!("{}", partial);
            }
            Err(anyhow::anyhow!("{} [{}]", e, e.kind()))
        }
    }
}

async fn read_code(cli: &Cli) -> Result<String> {
    if let Some(code) = &cli.code {
        return Ok(code.clone());
    }
    if let Some(path) = &cli.script {
        let code = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read script {}", path.display()))?;
        return Ok(code);
    }

    let mut code = String::new();
    tokio::io::stdin()
        .read_to_string(&mut code)
        .await
        .context("Failed to read code from stdin")?;
    Ok(code)
}
