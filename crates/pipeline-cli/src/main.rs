//! `pipeline-sync` binary: wires the library crates into a runnable service.
//!
//! Two entrypoints share the same wiring (`Wiring::build`):
//! - `serve` runs the axum webhook dispatcher (C6) until terminated.
//! - `replicate` runs one full enumerate/render/deploy/cleanup pass (C5) and
//!   exits with a non-zero status if `ReplicationOrchestrator::replicate`
//!   reports unrecoverable notification failures.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pipeline_ci_backend::{
    CiBackendClient, CiBackendDeployer, CiBackendResolver, HttpCiBackendClient, NoOpDeployer,
    PipelineDeployer,
};
use pipeline_config::{CiTargetKey, RootConfig};
use pipeline_controller::{
    DefinitionEnumerator, GithubDefinitionEnumerator, HandlebarsPipelineRenderer, PipelineRenderer,
    ReplicationOrchestrator, TemplateRegistry, WebhookDispatcher,
};
use pipeline_notify::{MailChannel, MailChannelConfig, OwnerNotifier};
use pipeline_scm::{GithubClient, HttpGithubClient};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "pipeline-sync",
    version,
    about = "Replicates CI pipeline definitions from GitHub onto one or more CI backends"
)]
struct Cli {
    /// Path to the YAML config document (`RootConfig`).
    #[arg(long, env = "PIPELINE_SYNC_CONFIG", global = true)]
    config: PathBuf,

    /// Directory of top-level Handlebars pipeline templates (`<name>.hbs`).
    #[arg(long, env = "PIPELINE_SYNC_TEMPLATE_DIR", global = true)]
    template_dir: PathBuf,

    /// Directory of Handlebars partials importable from pipeline templates.
    #[arg(long, env = "PIPELINE_SYNC_INCLUDE_DIR", global = true)]
    include_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the GitHub webhook dispatcher HTTP server.
    Serve,
    /// Run one enumerate/render/deploy/cleanup replication pass and exit.
    Replicate {
        /// Render and log but never call `set_pipeline` or delete anything.
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .json()
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => serve(config, &cli.template_dir, cli.include_dir.as_deref()).await,
        Commands::Replicate { dry_run } => replicate(config, &cli.template_dir, cli.include_dir.as_deref(), dry_run).await,
    }
}

fn load_config(path: &Path) -> Result<RootConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let mut config = RootConfig::from_yaml(&raw).with_context(|| format!("parsing config file {}", path.display()))?;
    apply_env_secrets(&mut config);
    Ok(config)
}

/// Secrets are never read from the committed YAML document; they're layered
/// in from the environment at process startup, matching the teacher's split
/// between a config-factory document and env-sourced credentials.
fn apply_env_secrets(config: &mut RootConfig) {
    config.webhook_dispatcher.webhook_secret = std::env::var("PIPELINE_SYNC_WEBHOOK_SECRET").ok();

    if let Some(email) = config.email.as_mut() {
        email.smtp_password = std::env::var("PIPELINE_SYNC_SMTP_PASSWORD").ok();
    }

    for backend in &mut config.ci_backends {
        let var_name = format!(
            "PIPELINE_SYNC_CI_TOKEN_{}",
            backend.backend_name.to_uppercase().replace(['-', '.'], "_")
        );
        backend.auth_token = std::env::var(var_name).ok();
    }
}

fn build_github_client() -> Result<Arc<dyn GithubClient>> {
    let token = std::env::var("PIPELINE_SYNC_GITHUB_TOKEN").context(
        "PIPELINE_SYNC_GITHUB_TOKEN must be set (a GitHub token with repo + org read access)",
    )?;
    let api_base_url =
        std::env::var("PIPELINE_SYNC_GITHUB_API_BASE_URL").unwrap_or_else(|_| "https://api.github.com".to_string());
    Ok(Arc::new(HttpGithubClient::new(api_base_url, token)?))
}

/// Resolves a [`CiTargetKey`] against the statically configured backends.
/// `Clone` so the same client set can back both the deployer's `Box<dyn
/// CiBackendResolver>` and the orchestrator's `Arc<dyn CiBackendResolver>`.
#[derive(Clone)]
struct ConfiguredCiBackendResolver {
    clients: HashMap<(String, String), Arc<dyn CiBackendClient>>,
}

impl CiBackendResolver for ConfiguredCiBackendResolver {
    fn resolve(&self, target: &CiTargetKey) -> Option<Arc<dyn CiBackendClient>> {
        self.clients
            .get(&(target.backend_name.clone(), target.team_name.clone()))
            .cloned()
    }
}

fn build_ci_backends(config: &RootConfig) -> Result<(Vec<Arc<dyn CiBackendClient>>, ConfiguredCiBackendResolver)> {
    let mut clients = Vec::with_capacity(config.ci_backends.len());
    let mut by_target = HashMap::with_capacity(config.ci_backends.len());
    for backend in &config.ci_backends {
        let client: Arc<dyn CiBackendClient> = Arc::new(HttpCiBackendClient::new(
            backend.base_url.clone(),
            backend.team_name.clone(),
            backend.auth_token.as_deref(),
        )?);
        clients.push(Arc::clone(&client));
        by_target.insert((backend.backend_name.clone(), backend.team_name.clone()), client);
    }
    Ok((clients, ConfiguredCiBackendResolver { clients: by_target }))
}

fn build_renderer(template_dir: &Path, include_dir: Option<&Path>) -> Result<Arc<dyn PipelineRenderer>> {
    let mut registry = TemplateRegistry::new();
    for entry in std::fs::read_dir(template_dir)
        .with_context(|| format!("reading template directory {}", template_dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("hbs") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let source = std::fs::read_to_string(&path).with_context(|| format!("reading template {}", path.display()))?;
        registry
            .register_template(stem, &source)
            .with_context(|| format!("compiling template {}", path.display()))?;
    }
    if let Some(include_dir) = include_dir {
        registry
            .register_include_dir(include_dir)
            .with_context(|| format!("loading template partials from {}", include_dir.display()))?;
    }
    Ok(Arc::new(HandlebarsPipelineRenderer::new(registry)))
}

fn build_notifier(config: &RootConfig) -> Result<Arc<OwnerNotifier>> {
    let Some(email) = &config.email else {
        return Ok(Arc::new(OwnerNotifier::disabled()));
    };
    let channel = MailChannel::new(MailChannelConfig {
        smtp_host: email.smtp_host.clone(),
        smtp_port: email.smtp_port,
        sender_address: email.sender_address.clone(),
        smtp_password: email.smtp_password.clone(),
        smtp_username: std::env::var("PIPELINE_SYNC_SMTP_USERNAME").ok(),
    })
    .context("building SMTP notification channel")?;
    Ok(Arc::new(OwnerNotifier::new(Some(channel))))
}

/// Everything a replication pass or the webhook server needs, built once
/// from `RootConfig` plus process environment.
struct Wiring {
    github: Arc<dyn GithubClient>,
    ci_clients: Vec<Arc<dyn CiBackendClient>>,
    renderer: Arc<dyn PipelineRenderer>,
    orchestrator: Arc<ReplicationOrchestrator>,
}

impl Wiring {
    async fn build(config: &RootConfig, template_dir: &Path, include_dir: Option<&Path>, dry_run: bool) -> Result<Self> {
        let github = build_github_client()?;
        let (ci_clients, resolver) = build_ci_backends(config)?;
        let renderer = build_renderer(template_dir, include_dir)?;
        let notifier = build_notifier(config)?;

        let enumerators: Vec<Arc<dyn DefinitionEnumerator>> = vec![Arc::new(GithubDefinitionEnumerator::new(
            Arc::clone(&github),
            config.job_mappings.clone(),
            config.default_branch.clone(),
            config.default_hostname.clone(),
        ))];

        let deployer: Arc<dyn PipelineDeployer> = if dry_run {
            info!("dry-run requested, deploys will be no-ops");
            Arc::new(NoOpDeployer)
        } else {
            Arc::new(CiBackendDeployer::new(
                Box::new(resolver.clone()),
                config.deploy.unpause_pipelines,
                config.deploy.unpause_new_pipelines,
                config.deploy.expose_pipelines,
            ))
        };

        let orchestrator = Arc::new(
            ReplicationOrchestrator::new(
                enumerators,
                Arc::clone(&renderer),
                deployer,
                Arc::new(resolver),
                config.job_mappings.clone(),
                notifier,
                Arc::clone(&github),
            )
            .with_reorder_pipelines(false),
        );

        Ok(Self {
            github,
            ci_clients,
            renderer,
            orchestrator,
        })
    }
}

async fn replicate(config: RootConfig, template_dir: &Path, include_dir: Option<&Path>, dry_run: bool) -> Result<()> {
    let wiring = Wiring::build(&config, template_dir, include_dir, dry_run).await?;
    let ok = wiring.orchestrator.replicate().await;
    if !ok {
        anyhow::bail!("replication completed with unrecoverable owner-notification failures");
    }
    Ok(())
}

async fn serve(config: RootConfig, template_dir: &Path, include_dir: Option<&Path>) -> Result<()> {
    let bind_address = config.webhook_dispatcher.bind_address.clone();
    let webhook_secret = config.webhook_dispatcher.webhook_secret.clone();
    let job_mappings = config.job_mappings.clone();

    let wiring = Wiring::build(&config, template_dir, include_dir, false).await?;

    let dispatcher = Arc::new(WebhookDispatcher::new(
        wiring.github,
        wiring.ci_clients,
        wiring.renderer,
        wiring.orchestrator,
        job_mappings,
        webhook_secret,
    ));

    let app = axum::Router::new()
        .route("/healthz", axum::routing::get(|| async { "OK" }))
        .merge(dispatcher.router())
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("binding webhook listener to {bind_address}"))?;
    info!(address = %bind_address, "webhook dispatcher listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("webhook server failed")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
