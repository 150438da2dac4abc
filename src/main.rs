mod logging;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde_json::json;
use tracing::{error, info, warn};

use tether_config::{load_config, Config};
use tether_dap::breakpoints::{
    check_breakpoint_lines, convert_breakpoints, AdapterLinePatterns, BreakpointSpec,
};
use tether_dap::{ClientOptions, DapClient, SessionRegistry, TcpTransport};

const USAGE: &str = "usage: tether --connect HOST:PORT [--adapter NAME] [--config DIR] \
[--project DIR] [--break FILE:LINE]...";

/// Parsed command line.
#[derive(Debug, Default)]
struct Args {
    connect: String,
    adapter: String,
    config_dir: Option<PathBuf>,
    project_dir: Option<PathBuf>,
    breakpoints: Vec<BreakpointSpec>,
}

fn parse_args(argv: &[String]) -> Result<Args> {
    let mut args = Args {
        adapter: "debugpy".to_string(),
        ..Default::default()
    };
    let mut it = argv.iter();
    while let Some(flag) = it.next() {
        let mut value = || it.next().with_context(|| format!("{flag} needs a value\n{USAGE}"));
        match flag.as_str() {
            "--connect" => args.connect = value()?.clone(),
            "--adapter" => args.adapter = value()?.clone(),
            "--config" => args.config_dir = Some(PathBuf::from(value()?)),
            "--project" => args.project_dir = Some(PathBuf::from(value()?)),
            "--break" => args.breakpoints.push(parse_location(value()?)?),
            other => bail!("unknown argument {other:?}\n{USAGE}"),
        }
    }
    if args.connect.is_empty() {
        bail!("--connect is required\n{USAGE}");
    }
    Ok(args)
}

fn parse_location(raw: &str) -> Result<BreakpointSpec> {
    let (file, line) = raw
        .rsplit_once(':')
        .with_context(|| format!("breakpoint {raw:?} is not FILE:LINE"))?;
    let line: i64 = line
        .parse()
        .with_context(|| format!("breakpoint {raw:?} has a bad line number"))?;
    let value = json!({ "file": file, "line": line });
    let spec = tether_dap::breakpoints::process_breakpoint_inputs(&value)?;
    spec.into_iter()
        .next()
        .with_context(|| format!("breakpoint {raw:?} produced no spec"))
}

fn config_dir(args: &Args) -> PathBuf {
    args.config_dir.clone().unwrap_or_else(|| {
        dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("tether")
    })
}

/// Connect, handshake, push breakpoints, report, and disconnect.
async fn run(args: Args, config: Config) -> Result<()> {
    let entry = config.adapters.get(&args.adapter);
    let adapter_id = entry
        .and_then(|e| e.adapter_id.clone())
        .unwrap_or_else(|| args.adapter.clone());

    let transport = TcpTransport::connect_tcp(args.connect.as_str())
        .await
        .with_context(|| format!("cannot connect to adapter at {}", args.connect))?;
    info!(addr = %args.connect, adapter = %adapter_id, "connected");

    let registry = SessionRegistry::new();
    let client = registry.create(
        "default",
        DapClient::new(Arc::new(transport), ClientOptions::from(&config)),
    )?;

    let result = drive(&client, &args, &config, &adapter_id).await;
    if client.is_terminated() {
        info!("adapter already ended the session; skipping disconnect");
    } else if let Err(e) = client.disconnect(false).await {
        warn!("disconnect failed: {e}");
    }
    registry.shutdown_all().await;
    result
}

async fn drive(client: &DapClient, args: &Args, config: &Config, adapter_id: &str) -> Result<()> {
    let init = client.initialize(adapter_id).await?;
    if !init.success {
        bail!(
            "adapter rejected initialize: {}",
            init.message.as_deref().unwrap_or("no message")
        );
    }

    let mut warnings = Vec::new();
    if !args.breakpoints.is_empty() {
        let patterns = AdapterLinePatterns::for_adapter(
            &args.adapter,
            config.adapters.get(&args.adapter),
        )?;
        let enabled = config.breakpoints.validate_lines;
        warnings = check_breakpoint_lines(&args.breakpoints, patterns.as_ref(), enabled);
        for request in convert_breakpoints(&args.breakpoints) {
            let resp = client.set_breakpoints(&request).await?;
            if !resp.success {
                warn!(
                    path = ?request.source.path,
                    "setBreakpoints failed: {}",
                    resp.message.as_deref().unwrap_or("no message")
                );
            }
        }
    }

    let report = json!({
        "capabilities": client.capabilities(),
        "breakpoint_warnings": warnings
            .iter()
            .map(|w| json!({ "file": w.file, "line": w.line, "reason": w.reason }))
            .collect::<Vec<_>>(),
        "diagnostics": client.get_diagnostics(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    let argv: Vec<String> = env::args().skip(1).collect();
    let args = match parse_args(&argv) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("{e:#}");
            std::process::exit(2);
        }
    };

    let config = match load_config(&config_dir(&args), args.project_dir.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("tether: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = logging::init(&config.log) {
        eprintln!("tether: logging disabled: {e:#}");
    }

    if let Err(e) = run(args, config).await {
        error!("fatal: {e:#}");
        eprintln!("tether: {e:#}");
        std::process::exit(1);
    }
}
