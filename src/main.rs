// src/main.rs
use chrono::{DateTime, Utc};
use clap::Parser;
use k8s_pki_hooks::app::{read_bundle, CertManager};
use k8s_pki_hooks::config::HookConfig;
use k8s_pki_hooks::error::{PkiError, Result};
use k8s_pki_hooks::kube::{filter_snapshot, parse_secrets, render_secrets, KubectlCsrClient, Secret};
use k8s_pki_hooks::utils::logging::{FileLogger, Logger, MultiLogger, TracingLogger};
use k8s_pki_hooks::values::ValuesTree;
use std::fs;
use std::process::ExitCode;

/// One reconciliation pass over every configured certificate request.
#[derive(Parser, Debug)]
#[command(name = "pki-hook", version, about)]
pub struct Args {
    /// Hook configuration, YAML or JSON.
    #[arg(short, long, default_value = "pki-hook.yaml")]
    pub config: String,
    /// Values document (JSON) read before the pass.
    #[arg(long)]
    pub values: String,
    /// Multi-document YAML with the Secrets currently in the cluster.
    #[arg(short, long)]
    pub snapshot: Option<String>,
    /// Where to write the updated values; defaults to `--values`.
    #[arg(short, long)]
    pub output: Option<String>,
    /// Also render the resulting Secret manifests to this file.
    #[arg(long)]
    pub secrets_output: Option<String>,
    /// Clock override, RFC 3339.
    #[arg(long)]
    pub now: Option<String>,
    #[arg(long)]
    pub log_file: Option<String>,
    #[arg(short, long)]
    pub debug: bool,
    #[arg(long, default_value = "kubectl")]
    pub kubectl: String,
    #[arg(long)]
    pub kubeconfig: Option<String>,
}

fn read_file(what: &str, path: &str) -> Result<String> {
    let path = shellexpand::tilde(path).to_string();
    fs::read_to_string(&path).map_err(|e| PkiError::Config(format!("cannot read {} {}: {}", what, path, e)))
}

fn write_file(path: &str, contents: &str) -> Result<()> {
    fs::write(shellexpand::tilde(path).to_string(), contents)?;
    Ok(())
}

fn parse_now(now: Option<&str>) -> Result<DateTime<Utc>> {
    match now {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| PkiError::Config(format!("invalid --now '{}': {}", raw, e))),
        None => Ok(Utc::now()),
    }
}

fn build_logger(args: &Args) -> Result<Box<dyn Logger>> {
    let mut logger = MultiLogger::default();
    logger.push(Box::new(TracingLogger));
    if let Some(path) = &args.log_file {
        logger.push(Box::new(FileLogger::new(path, args.debug)?));
    }
    Ok(Box::new(logger))
}

async fn run(args: Args) -> Result<()> {
    let config = HookConfig::load_from_file(&args.config)?;
    config.validate()?;
    let now = parse_now(args.now.as_deref())?;

    let mut values: ValuesTree = serde_json::from_str(&read_file("values", &args.values)?)?;
    let secrets = match &args.snapshot {
        Some(path) => parse_secrets(&read_file("snapshot", path)?)?,
        None => Vec::new(),
    };
    tracing::debug!(
        requests = config.requests.len(),
        secrets = secrets.len(),
        "starting pass at {}",
        now.to_rfc3339()
    );

    let mut manager = CertManager::from_config(&config, build_logger(&args)?);
    let client = KubectlCsrClient::new(&args.kubectl, args.kubeconfig.as_deref());

    for request in &config.requests {
        let snapshot = filter_snapshot(&secrets, &request.namespace, &request.secret_name);
        let outcome = manager
            .reconcile_request(request, &snapshot, &mut values, now, &client)
            .await?;
        tracing::info!(
            prefix = %request.values_prefix,
            "{}/{}: {:?}",
            request.namespace,
            request.secret_name,
            outcome
        );
    }

    let output = args.output.as_deref().unwrap_or(&args.values);
    write_file(output, &serde_json::to_string_pretty(&values)?)?;

    if let Some(path) = &args.secrets_output {
        let rendered: Vec<Secret> = config
            .requests
            .iter()
            .filter_map(|request| {
                read_bundle(&values, &request.values_prefix).map(|bundle| {
                    Secret::from_bundle(&request.namespace, &request.secret_name, &bundle)
                })
            })
            .collect();
        write_file(path, &render_secrets(&rendered)?)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(kind = e.kind(), "{}", e);
            ExitCode::FAILURE
        }
    }
}
