//! Rewind CLI
//!
//! Replays a recorded agent trace, optionally with modified parameters,
//! and reports how the outcome changed.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod provider;
mod render;

use clap::Parser;
use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use provider::OpenAiProvider;
use rewind_core::Trace;
use rewind_replay::{ComparisonReporter, ReplayConfig, ReplayEngine, ReplayParams, TraceLoader};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rewind")]
#[command(about = "Replay recorded agent traces with modified parameters", long_about = None)]
struct Args {
    /// Trace file (JSON document, span array, or JSON lines)
    trace: PathBuf,

    /// Replacement model for LLM spans
    #[arg(long)]
    model: Option<String>,

    /// Replacement sampling temperature
    #[arg(long)]
    temperature: Option<f64>,

    /// Replacement system prompt
    #[arg(long)]
    system_prompt: Option<String>,

    /// Replacement output length limit
    #[arg(long)]
    max_tokens: Option<u64>,

    /// Diff the modified replay against an exact replay
    #[arg(long)]
    compare: bool,

    /// Print each span as it is replayed
    #[arg(long)]
    stream: bool,

    /// Allow live tool calls
    #[arg(long)]
    enable_tools: bool,

    /// Allow live retrieval queries
    #[arg(long)]
    enable_retrieval: bool,

    /// Only these tool or retrieval names may execute
    #[arg(long = "allow", value_name = "NAME")]
    allow: Vec<String>,

    /// Tool or retrieval names that never execute
    #[arg(long = "block", value_name = "NAME")]
    block: Vec<String>,

    /// Override the output of spans named NAME
    #[arg(long = "mock", value_name = "NAME=JSON", value_parser = parse_mock)]
    mocks: Vec<(String, Value)>,

    /// Replay configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the resolved action per span and exit
    #[arg(long)]
    plan: bool,

    /// Write the result as pretty JSON
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn params(&self) -> ReplayParams {
        let mut params = ReplayParams::new()
            .with_tools(self.enable_tools)
            .with_retrieval(self.enable_retrieval);
        params.model = self.model.clone();
        params.temperature = self.temperature;
        params.system_prompt = self.system_prompt.clone();
        params.max_tokens = self.max_tokens;
        for name in &self.allow {
            params = params.allow(name.clone());
        }
        for name in &self.block {
            params = params.block(name.clone());
        }
        for (name, output) in &self.mocks {
            params = params.with_mock(name.clone(), output.clone());
        }
        params
    }
}

/// Parse `NAME=JSON`. A value that is not valid JSON is taken as a string.
fn parse_mock(raw: &str) -> Result<(String, Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=JSON, got '{}'", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("mock name is empty in '{}'", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((name.to_string(), value))
}

fn log_filter(verbose: bool) -> EnvFilter {
    let level = if verbose { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "rewind_core={level},rewind_tool={level},rewind_replay={level},rewind_cli={level}"
        ))
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    std::fs::write(path, text).wrap_err_with(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "result written");
    Ok(())
}

fn build_engine(args: &Args, params: &ReplayParams) -> Result<ReplayEngine> {
    let config = match &args.config {
        Some(path) => ReplayConfig::from_file(path)?,
        None => ReplayConfig::default(),
    };
    let mut engine = ReplayEngine::new().with_config(config);
    if params.enable_llm && params.changes_llm_request() {
        let provider = OpenAiProvider::from_env()?;
        if !provider.has_api_key() {
            warn!("OPENAI_API_KEY is not set; requests are sent without authorization");
        }
        engine = engine.with_llm_provider(Arc::new(provider));
    }
    Ok(engine)
}

async fn run(args: Args) -> Result<()> {
    let trace: Trace = TraceLoader::from_file(&args.trace)?;
    let params = args.params();
    let engine = build_engine(&args, &params)?;

    if args.plan {
        let plan = engine.plan(&trace, &params)?;
        for planned in &plan {
            println!("{}", render::plan_line(planned));
        }
        if let Some(path) = &args.output {
            write_json(path, &plan)?;
        }
        return Ok(());
    }

    let stream = args.stream;
    let result = if params.is_exact() {
        engine.replay_exact(&trace)
    } else {
        engine
            .replay_with_callback(&trace, &params, |span| {
                if stream {
                    println!("{}", render::span_line(span));
                }
            })
            .await?
    };
    if stream && params.is_exact() {
        for span in &result.spans {
            println!("{}", render::span_line(span));
        }
    }

    if args.compare {
        let baseline = engine.replay_exact(&trace);
        let comparison = ComparisonReporter::new().compare(&baseline, &result).await;
        println!("{}", comparison.generate_summary());
        if let Some(path) = &args.output {
            write_json(path, &comparison)?;
        }
    } else {
        if !stream {
            for span in &result.spans {
                println!("{}", render::span_line(span));
            }
        }
        println!("{}", render::result_summary(&result));
        if let Some(path) = &args.output {
            write_json(path, &result)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(args.verbose))
        .with_writer(std::io::stderr)
        .init();

    run(args).await
}
