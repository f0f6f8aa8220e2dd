//! Registration broker binary: loads configuration, wires the C1-C7 domain
//! services to their production adapters, self-registers, and serves the
//! `RegistrationBroker` gRPC API until shutdown.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use broker_archive::{ArchiveConfig, HttpSchemaArchiveClient};
use broker_callback::ModuleCallbackClient;
use broker_consul::{ConsulConfig, ConsulDiscoveryStore};
use broker_contracts::model::{Connectivity, RegisterRequest, RegistrantKind};
use broker_contracts::traits::{DiscoveryStore, EventPublisher, MetadataRepository, ModuleRegistrationProbe, SchemaArchiveClient};
use broker_core::api::grpc::BrokerGrpcService;
use broker_core::config::BrokerConfig;
use broker_core::domain::{DiscoveryQueryService, HealthGate, RegistrationCoordinator};
use broker_db::SeaOrmMetadataRepository;
use broker_events::{EventBusConfig, KafkaEventPublisher};
use broker_proto::v1::RegistrationBrokerServer;
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);
const SHUTDOWN_GRACE: std::time::Duration = std::time::Duration::from_secs(5);

/// Registration broker - gRPC front door over discovery, metadata, schema
/// archive and event-bus adapters.
#[derive(Parser)]
#[command(name = "broker-server")]
#[command(about = "Platform registration and discovery broker")]
struct Cli {
    /// Path to a YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `server.bind_addr` (e.g. `0.0.0.0:9090`).
    #[arg(long)]
    bind_addr: Option<String>,

    /// Print the effective configuration (JSON) and exit.
    #[arg(long)]
    print_config: bool,

    /// Log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server (default).
    Run,
    /// Load and validate configuration, then exit.
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        anyhow::ensure!(path.is_file(), "config file does not exist: {}", path.display());
    }

    let config = load_config(&cli)?;
    init_logging(cli.verbose);

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Check => {
            tracing::info!("configuration loaded successfully");
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Run => run_server(config).await,
    }
}

fn load_config(cli: &Cli) -> Result<BrokerConfig> {
    let mut overrides: figment::value::Dict = figment::value::Dict::new();
    if let Some(bind_addr) = &cli.bind_addr {
        let mut server = figment::value::Dict::new();
        server.insert("bind_addr".to_string(), bind_addr.clone().into());
        overrides.insert("server".to_string(), server.into());
    }
    let config_path = cli.config.as_ref().map(|p| p.to_string_lossy().into_owned());
    BrokerConfig::load(config_path.as_deref(), overrides).context("failed to load configuration")
}

fn init_logging(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).json().init();
}

async fn run_server(config: BrokerConfig) -> Result<()> {
    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let discovery: Arc<dyn DiscoveryStore> = Arc::new(
        ConsulDiscoveryStore::new(&ConsulConfig {
            host: config.discovery.host.clone(),
            port: config.discovery.port,
            token: config.discovery.token.clone(),
            datacenter: config.discovery.datacenter.clone(),
            tls_enabled: config.discovery.tls_enabled,
        })
        .context("failed to construct discovery store client")?,
    );

    let metadata: Arc<dyn MetadataRepository> =
        Arc::new(SeaOrmMetadataRepository::connect(&config.database.dsn).await.context("failed to connect to metadata store")?);

    let archive: Arc<dyn SchemaArchiveClient> = Arc::new(
        HttpSchemaArchiveClient::new(ArchiveConfig {
            base_url: config.archive.base_url.clone(),
            auth_token: config.archive.auth_token.clone(),
            request_timeout: config.archive.request_timeout,
        })
        .context("failed to construct schema archive client")?,
    );

    let events: Arc<dyn EventPublisher> = Arc::new(
        KafkaEventPublisher::new(EventBusConfig {
            bootstrap_servers: config.event_bus.bootstrap_servers.clone(),
            send_timeout: config.event_bus.send_timeout,
        })
        .context("failed to construct event bus producer")?,
    );

    let callback_client = Arc::new(ModuleCallbackClient::new(Arc::clone(&discovery)));
    let callback: Arc<dyn ModuleRegistrationProbe> = Arc::clone(&callback_client) as Arc<dyn ModuleRegistrationProbe>;

    let health_gate = HealthGate::new(Arc::clone(&discovery))
        .with_poll_interval(config.health_gate.poll_interval)
        .with_deadline(config.health_gate.deadline)
        .with_cancellation(cancel.clone());

    let coordinator = RegistrationCoordinator::new(
        Arc::clone(&discovery),
        Arc::clone(&metadata),
        Arc::clone(&archive),
        Arc::clone(&callback),
        Arc::clone(&events),
        health_gate,
    );
    let discovery_query =
        DiscoveryQueryService::new(Arc::clone(&discovery), Arc::clone(&metadata), Arc::clone(&archive), Arc::clone(&callback));

    self_register(&coordinator, &config).await;

    spawn_channel_sweep(Arc::clone(&callback_client), cancel.clone());

    let grpc_service = BrokerGrpcService::new(coordinator, discovery_query);
    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter.set_serving::<RegistrationBrokerServer<BrokerGrpcService>>().await;

    let bind_addr: SocketAddr = config.server.bind_addr.parse().context("invalid server.bind_addr")?;
    tracing::info!(%bind_addr, "registration broker listening");

    Server::builder()
        .add_service(health_service)
        .add_service(RegistrationBrokerServer::new(grpc_service))
        .serve_with_shutdown(bind_addr, cancel.cancelled())
        .await
        .context("gRPC server terminated unexpectedly")?;

    tracing::info!("shutdown signal received, draining module callback channels");
    tokio::time::timeout(SHUTDOWN_GRACE, callback_client.shutdown()).await.ok();

    Ok(())
}

/// Registers the broker itself as a `Service` instance through its own
/// coordinator pipeline, bypassing the gRPC front door. Best-effort: a
/// failure is logged but does not prevent the server from serving, since the
/// broker is otherwise fully usable by clients that already know its address.
async fn self_register(coordinator: &RegistrationCoordinator, config: &BrokerConfig) {
    let self_cfg = &config.self_registration;
    let request = RegisterRequest {
        name: self_cfg.service_name.clone(),
        kind: RegistrantKind::Service,
        connectivity: Connectivity {
            advertised_host: self_cfg.advertised_host.clone(),
            advertised_port: self_cfg.advertised_port,
            internal_host: self_cfg.internal_host.clone(),
            internal_port: self_cfg.internal_port,
            tls_enabled: false,
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        metadata: Default::default(),
        tags: Default::default(),
        capabilities: Default::default(),
        http_endpoints: vec![],
        http_schema: None,
        http_schema_artifact_id: None,
        http_schema_version: None,
    };

    let mut events = coordinator.register(request);
    while let Some(event) = tokio_stream::StreamExt::next(&mut events).await {
        match event.event_type {
            broker_contracts::model::EventType::Failed => {
                tracing::error!(message = %event.message, error = ?event.error_detail, "self-registration failed");
            }
            broker_contracts::model::EventType::Completed => {
                tracing::info!(service_id = ?event.service_id, "self-registration completed");
            }
            _ => tracing::debug!(event = ?event.event_type, "self-registration progress"),
        }
    }
}

fn spawn_channel_sweep(callback_client: Arc<ModuleCallbackClient>, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                _ = ticker.tick() => callback_client.sweep_idle_channels(),
            }
        }
    });
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to install ctrl-c handler");
        }
        tracing::info!("shutdown signal received");
        cancel.cancel();
    });
}
