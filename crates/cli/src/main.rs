use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use k8s_openapi::api::core::v1::Pod;
use sidecar_core::policy::{DEFAULT_INJECT_ANNOTATION, DEFAULT_STATUS_ANNOTATION};
use sidecar_core::{decide, MutationPolicy, Outcome, PodSnapshot};
use sidecar_webhook::{ServerConfig, WebhookState};
use tokio::signal;
use tracing::{info, warn};

const LOG_ENV: &str = "SIDECAR_LOG";
const METRICS_ENV: &str = "SIDECAR_METRICS_ADDR";
const DEFAULT_LOG: &str = "info";

#[derive(Parser, Debug)]
#[command(
    name = "simple-sidecar",
    version,
    about = "Sidecar injection admission webhook",
    after_help = "Environment:\n  SIDECAR_LOG           log filter directives (default: info)\n  SIDECAR_METRICS_ADDR  host:port for the Prometheus exporter (disabled when unset)"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the mutating webhook over HTTPS
    Serve(ServeArgs),
    /// Load a profile file and print it back as YAML
    Render {
        /// Profile file (YAML mapping of profile name to profile)
        config: PathBuf,
    },
    /// Dry-run the injection for one pod manifest and print the patch
    Patch {
        /// Profile file
        #[arg(long = "config")]
        config: PathBuf,
        /// Pod manifest (YAML or JSON)
        #[arg(long = "pod")]
        pod: PathBuf,
        /// Namespace to assume when the manifest has none
        #[arg(long = "namespace", default_value = "default")]
        namespace: String,
        #[command(flatten)]
        annotations: AnnotationArgs,
        /// Output format
        #[arg(short = 'o', long = "output", value_enum, default_value_t = Output::Human)]
        output: Output,
    },
}

#[derive(clap::Args, Debug)]
struct ServeArgs {
    #[arg(long = "port", env = "PORT", default_value_t = 8443)]
    port: u16,
    #[arg(long = "config-file", env = "CONFIG_FILE", default_value = "/etc/webhook/config/sidecarconfig.yaml")]
    config_file: PathBuf,
    #[arg(long = "cert-file", env = "CERT_FILE", default_value = "/etc/webhook/certs/tls.crt")]
    cert_file: PathBuf,
    #[arg(long = "key-file", env = "KEY_FILE", default_value = "/etc/webhook/certs/tls.key")]
    key_file: PathBuf,
    /// Seconds between certificate reloads (0 disables)
    #[arg(long = "cert-reload-secs", env = "CERT_RELOAD_SECS", default_value_t = 60)]
    cert_reload_secs: u64,
    #[command(flatten)]
    annotations: AnnotationArgs,
}

#[derive(clap::Args, Debug)]
struct AnnotationArgs {
    /// Annotation naming the profile to inject
    #[arg(long = "inject-annotation", env = "INJECT_ANNOTATION", default_value = DEFAULT_INJECT_ANNOTATION)]
    inject_annotation: String,
    /// Annotation marking a pod as already injected
    #[arg(long = "status-annotation", env = "STATUS_ANNOTATION", default_value = DEFAULT_STATUS_ANNOTATION)]
    status_annotation: String,
    /// Extra namespaces to leave alone (kube-system and kube-public always are)
    #[arg(long = "ignore-namespace", env = "IGNORE_NAMESPACES", value_delimiter = ',')]
    ignore_namespaces: Vec<String>,
}

impl AnnotationArgs {
    fn policy(&self) -> MutationPolicy {
        let policy = MutationPolicy {
            inject_key: self.inject_annotation.clone(),
            status_key: self.status_annotation.clone(),
            ..MutationPolicy::default()
        };
        policy.with_ignored(clean_namespaces(&self.ignore_namespaces))
    }
}

fn clean_namespaces(raw: &[String]) -> Vec<String> {
    raw.iter().map(|s| s.trim()).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

/// Log filter from `SIDECAR_LOG`; an unparsable filter falls back to `info`.
fn init_tracing() {
    let env = std::env::var(LOG_ENV).unwrap_or_else(|_| DEFAULT_LOG.to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
    if env != DEFAULT_LOG {
        info!(filter = %env, "log filter from {}", LOG_ENV);
    }
}

/// Prometheus exporter for the admission counters, only when `SIDECAR_METRICS_ADDR` is set.
fn init_metrics() {
    let Ok(addr) = std::env::var(METRICS_ENV) else {
        return;
    };
    match addr.parse::<SocketAddr>() {
        Ok(sock) => match metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(sock).install() {
            Ok(()) => info!(addr = %sock, "Prometheus metrics exporter listening"),
            Err(e) => warn!(error = %e, addr = %sock, "failed to install metrics exporter"),
        },
        Err(e) => warn!(addr = %addr, error = %e, "invalid {}; expected host:port", METRICS_ENV),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let registry = sidecar_config::load_registry(&args.config_file)?;
    let policy = args.annotations.policy();
    info!(
        inject = %policy.inject_key,
        status = %policy.status_key,
        ignored = ?policy.ignored_namespaces,
        "mutation policy"
    );
    let config = ServerConfig {
        addr: SocketAddr::from(([0, 0, 0, 0], args.port)),
        cert_file: args.cert_file,
        key_file: args.key_file,
        cert_reload: (args.cert_reload_secs > 0).then(|| Duration::from_secs(args.cert_reload_secs)),
    };
    let state = Arc::new(WebhookState::new(registry, policy));
    sidecar_webhook::serve(config, state, shutdown_signal()).await.context("webhook server")?;
    info!("webhook server stopped");
    Ok(())
}

fn read_pod(path: &Path) -> Result<Pod> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading pod manifest {}", path.display()))?;
    // YAML parser also accepts JSON manifests
    serde_yaml::from_str(&text).with_context(|| format!("parsing pod manifest {}", path.display()))
}

fn print_outcome(outcome: &Outcome, output: Output) -> Result<()> {
    match output {
        Output::Human => match outcome {
            Outcome::Allow(reason) => println!("allow (no mutation): {}", reason.as_str()),
            Outcome::AllowWithPatch { profile, operations, patch } => {
                let doc: serde_json::Value = serde_json::from_slice(patch)?;
                println!("allow with patch: profile {} ({} operations)", profile, operations);
                println!("{}", serde_json::to_string_pretty(&doc)?);
            }
            Outcome::Deny(message) => println!("deny: {}", message),
        },
        Output::Json => {
            let allowed = outcome.is_allowed();
            let doc = match outcome {
                Outcome::Allow(reason) => serde_json::json!({"allowed": allowed, "skipped": reason.as_str()}),
                Outcome::AllowWithPatch { profile, patch, .. } => {
                    let ops: serde_json::Value = serde_json::from_slice(patch)?;
                    serde_json::json!({"allowed": allowed, "profile": profile, "patch": ops})
                }
                Outcome::Deny(message) => serde_json::json!({"allowed": allowed, "message": message}),
            };
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => serve(args).await?,
        Commands::Render { config } => {
            let registry = sidecar_config::load_registry(&config)?;
            print!("{}", sidecar_config::render_registry(&registry)?);
        }
        Commands::Patch { config, pod, namespace, annotations, output } => {
            let registry = sidecar_config::load_registry(&config)?;
            let pod = read_pod(&pod)?;
            let snapshot = PodSnapshot::from_pod(&pod, Some(namespace.as_str()));
            let outcome = decide(&snapshot, &registry, &annotations.policy());
            print_outcome(&outcome, output)?;
        }
    }
    Ok(())
}
