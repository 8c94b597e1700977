mod discovery_service;

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use imcore_auth::JwtSigner;
use imcore_config::{DiscoveryConfig, ImGatewayConfig};
use imcore_discovery::DiscoveryService;
use imcore_gateway::{GatewayState, ImGatewayRpcService};
use imcore_rpc::pb::discovery_client::DiscoveryClient;
use imcore_rpc::pb::discovery_server::DiscoveryServer;
use imcore_rpc::{ApiGatewayRpcClient, DeregisterRequest, RegisterRequest};

use discovery_service::DiscoveryRpcService;

#[derive(Parser)]
#[command(name = "imcored", about = "IM core — realtime messaging fabric")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the service discovery control plane.
    Discovery {
        #[command(flatten)]
        config: DiscoveryConfig,
    },
    /// Run an IM Gateway replica.
    Imgateway {
        #[command(flatten)]
        config: ImGatewayConfig,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_thread_ids(false).with_ansi(true))
            .init();
    }
}

/// `addr` fields follow the Go convention of a bare `:port` meaning "bind on
/// all interfaces"; the gRPC/TCP stacks here want an explicit host.
fn normalize_bind_addr(addr: &str) -> String {
    if let Some(port) = addr.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        addr.to_string()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_telemetry(&cli);

    match cli.command {
        Commands::Discovery { config } => run_discovery(config).await,
        Commands::Imgateway { config } => run_imgateway(config).await,
    }
}

async fn run_discovery(config: DiscoveryConfig) -> anyhow::Result<()> {
    let redis_url = config.redis.url();
    let service = DiscoveryService::connect(
        &redis_url,
        Duration::from_secs(config.refresh_interval_secs),
        Duration::from_secs(config.refresh_timeout_secs),
    )
    .await?;

    let addr = normalize_bind_addr(&config.addr).parse()?;
    info!(%addr, "discovery service listening");

    let rpc = DiscoveryRpcService::new(service);
    tonic::transport::Server::builder()
        .add_service(DiscoveryServer::new(rpc))
        .serve_with_shutdown(addr, async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    Ok(())
}

async fn run_imgateway(config: ImGatewayConfig) -> anyhow::Result<()> {
    let jwt = JwtSigner::new(config.jwt_secret.as_bytes());
    let api = Arc::new(ApiGatewayRpcClient::connect(config.api_addr.clone()).await?);
    let state = GatewayState::new(api, jwt, config.max_frame_bytes);

    let tcp_addr = normalize_bind_addr(&config.addr);
    let listener = tokio::net::TcpListener::bind(&tcp_addr).await?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "imgateway message socket listening");

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);

    let registration = register_with_discovery(&config, local_addr.port()).await;

    let rpc_addr = normalize_bind_addr(&config.rpc_addr).parse()?;
    let rpc_service = ImGatewayRpcService::new(state.clone());
    let rpc_shutdown = shutdown_tx.subscribe();

    let serve_task = tokio::spawn(imcore_gateway::serve(listener, state, shutdown_rx));
    let rpc_task = tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(rpc_service.into_server())
            .serve_with_shutdown(rpc_addr, async move {
                let mut rx = rpc_shutdown;
                let _ = rx.recv().await;
            })
            .await
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, draining connections");
    let _ = shutdown_tx.send(());

    serve_task.await??;
    rpc_task.await??;

    if let Some((endpoint, host, port)) = registration {
        deregister_from_discovery(&endpoint, &host, &port).await;
    }

    Ok(())
}

/// Best-effort registration with the discovery service; a failure here does
/// not stop the gateway from serving traffic, since clients that already
/// know this replica's address can keep talking to it directly. Returns the
/// discovery endpoint, advertised host and registered port on success, so
/// the caller can deregister the exact same tuple on shutdown.
async fn register_with_discovery(config: &ImGatewayConfig, port: u16) -> Option<(String, String, String)> {
    let endpoint = if config.discovery_endpoint.starts_with("http") {
        config.discovery_endpoint.clone()
    } else {
        format!("http://{}", config.discovery_endpoint)
    };
    let advertise_host = config
        .addr
        .rsplit_once(':')
        .map(|(host, _)| host)
        .filter(|host| !host.is_empty())
        .unwrap_or("127.0.0.1");
    let port = port.to_string();

    match DiscoveryClient::connect(endpoint.clone()).await {
        Ok(mut client) => {
            match client
                .register(RegisterRequest {
                    service_name: "imgateway".to_string(),
                    address: advertise_host.to_string(),
                    port: port.clone(),
                })
                .await
            {
                Ok(_) => {
                    info!(%endpoint, %advertise_host, %port, "registered with discovery");
                    Some((endpoint, advertise_host.to_string(), port))
                }
                Err(err) => {
                    warn!(%err, "discovery registration rejected");
                    None
                }
            }
        }
        Err(err) => {
            warn!(%err, %endpoint, "could not reach discovery service, continuing unregistered");
            None
        }
    }
}

async fn deregister_from_discovery(endpoint: &str, host: &str, port: &str) {
    let Ok(mut client) = DiscoveryClient::connect(endpoint.to_string()).await else {
        return;
    };
    if let Err(err) = client
        .deregister(DeregisterRequest {
            service_name: "imgateway".to_string(),
            address: host.to_string(),
            port: port.to_string(),
        })
        .await
    {
        warn!(%err, "discovery deregistration failed");
    }
}
