//! `smarthub` -- runs the dispatcher, the scheduler and the HTTP API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use smarthub_core::AuthLevel;
use smarthub_server::dispatch::INFOS_ROUTE;
use smarthub_server::network::{NetworkConfig, NetworkModule};
use smarthub_server::scheduler::{ScheduleMode, Scheduler, TimeSpec};
use smarthub_server::service::{DispatcherConfig, HubConfig, SchedulerConfig, ServicesManager};
use smarthub_server::{Dispatcher, StaticAuthorization};
use tracing::{info, warn};

/// Local hub API server.
#[derive(Parser, Debug)]
#[command(name = "smarthub", about = "Local hub API server", version)]
struct Args {
    /// Bind address.
    #[arg(long, env = "SMARTHUB_HOST", default_value = "0.0.0.0")]
    host: String,

    /// HTTP port.
    #[arg(short, long, env = "SMARTHUB_PORT", default_value_t = 8080)]
    port: u16,

    /// Path prefix of the plugin API.
    #[arg(long, env = "SMARTHUB_API_PREFIX", default_value = "/api/")]
    api_prefix: String,

    /// Allowed CORS origins, comma separated.
    #[arg(long, env = "SMARTHUB_CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    cors_origins: Vec<String>,

    /// Request timeout in seconds.
    #[arg(long, env = "SMARTHUB_REQUEST_TIMEOUT", default_value_t = 30)]
    request_timeout_secs: u64,

    /// Authorization level granted to every caller (0, 80, 90 or 100).
    #[arg(long, env = "SMARTHUB_DEFAULT_LEVEL", default_value_t = 80)]
    default_level: u8,

    /// Caller addresses granted the Dev level, comma separated.
    #[arg(long, env = "SMARTHUB_TRUSTED_IPS", value_delimiter = ',')]
    trusted_ips: Vec<String>,

    /// Expose Prometheus metrics on this port.
    #[arg(long, env = "SMARTHUB_METRICS_PORT")]
    metrics_port: Option<u16>,

    /// Emit logs as JSON.
    #[arg(long, env = "SMARTHUB_LOG_JSON")]
    log_json: bool,

    /// Enable debug-level logging.
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn hub_config(&self) -> HubConfig {
        HubConfig {
            network: NetworkConfig {
                host: self.host.clone(),
                port: self.port,
                cors_origins: self.cors_origins.clone(),
                request_timeout: Duration::from_secs(self.request_timeout_secs),
                ..NetworkConfig::default()
            },
            dispatcher: DispatcherConfig {
                api_prefix: self.api_prefix.clone(),
                ..DispatcherConfig::default()
            },
            scheduler: SchedulerConfig::default(),
        }
    }
}

fn init_tracing(args: &Args) {
    let default_filter = if args.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if args.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args);
    let config = args.hub_config();

    if let Some(port) = args.metrics_port {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
            .install()?;
        info!(port, "Prometheus exporter listening");
    }

    let dispatcher = Arc::new(Dispatcher::new(config.dispatcher.clone()));
    let scheduler = Arc::new(Scheduler::new(config.scheduler.clone()));

    let authorization = StaticAuthorization::new(AuthLevel::from_value(args.default_level))
        .trust(args.trusted_ips.iter().cloned(), AuthLevel::Dev);
    dispatcher.register_handler(
        Arc::new(authorization),
        smarthub_server::RouteSpec::any().auth_level(AuthLevel::None),
    );

    let registrations = Arc::clone(&dispatcher);
    scheduler.register_keyed(
        "smarthub.registrations.hourly",
        |d: &Arc<Dispatcher>| {
            info!(registrations = d.registration_count(), "registered api handlers");
            Ok(())
        },
        registrations,
        ScheduleMode::EveryHour,
        TimeSpec::any(),
    )?;

    let services = ServicesManager::new();
    services.register(Arc::clone(&dispatcher));
    services.register(Arc::clone(&scheduler));
    services.start_all().await?;
    info!(
        services = services.len(),
        introspection = %format!("{}{INFOS_ROUTE}", config.dispatcher.api_prefix),
        "services started"
    );

    let mut network = NetworkModule::new(config.network.clone(), Arc::clone(&dispatcher));
    let port = network.start().await?;
    info!(port, "smarthub listening");

    let served = network
        .serve(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c, serving until killed");
                std::future::pending::<()>().await;
            }
            info!("shutdown requested");
        })
        .await;

    services.stop_all().await?;
    served
}
