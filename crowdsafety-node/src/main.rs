//! crowdsafety-node: headless runner for the crowd-safety live state
//!
//! Starts the simulation, attaches the remote mirrors and optionally polls the
//! crowd counter and weather API, logging what changes until interrupted.

mod config;

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use config::{Config, RemoteBackend};
use crowdsafety::{
    CrowdFeedClient, DocumentStore, FirestoreDocumentStore, MemoryDocumentStore, Services, StateStream,
    WeatherClient,
};

#[derive(Parser)]
#[command(name = "crowdsafety-node")]
#[command(about = "Headless runner for the crowd-safety live state")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "crowdsafety-node.toml")]
    config: String,

    /// Fixed simulation seed (overrides config file)
    #[arg(long, env = "CROWDSAFETY_SEED")]
    seed: Option<u64>,

    /// Simulation tick interval in milliseconds (overrides config file)
    #[arg(long, env = "CROWDSAFETY_TICK_MS")]
    tick_ms: Option<u64>,

    /// Crowd counter base URL; enables polling
    #[arg(long, env = "CROWDSAFETY_CROWD_FEED_URL")]
    crowd_feed_url: Option<String>,

    /// Weather API key; enables weather refresh
    #[arg(long, env = "CROWDSAFETY_WEATHER_KEY")]
    weather_key: Option<String>,

    /// Firestore API root, e.g. an emulator at http://127.0.0.1:8080
    #[arg(long, env = "CROWDSAFETY_REMOTE_URL")]
    remote_url: Option<String>,

    /// Firestore project id
    #[arg(long, env = "CROWDSAFETY_REMOTE_PROJECT")]
    remote_project: Option<String>,

    /// OAuth access token for the Firestore API
    #[arg(long, env = "CROWDSAFETY_REMOTE_TOKEN", hide_env_values = true)]
    remote_token: Option<String>,

    /// Run without the remote mirrors
    #[arg(long)]
    no_remote: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("crowdsafety=info".parse()?)
        .add_directive("crowdsafety_node=info".parse()?);
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loaded = Config::load(Path::new(&cli.config))?;
    let found = loaded.is_some();
    let mut config = loaded.unwrap_or_default();

    // Apply CLI overrides
    if cli.json_logs {
        config.node.json_logs = true;
    }
    if let Some(seed) = cli.seed {
        config.simulation.seed = Some(seed);
    }
    if let Some(tick_ms) = cli.tick_ms {
        config.simulation.tick_interval_ms = tick_ms;
    }
    if let Some(url) = cli.crowd_feed_url {
        config.crowd_feed.client.base_url = url;
        config.crowd_feed.enabled = true;
    }
    if let Some(key) = cli.weather_key {
        config.weather.client.api_key = key;
        config.weather.enabled = true;
    }
    if let Some(url) = cli.remote_url {
        config.remote.store.base_url = url;
    }
    if let Some(project) = cli.remote_project {
        config.remote.store.project_id = project;
    }
    if let Some(token) = cli.remote_token {
        config.remote.store.access_token = Some(token);
    }
    if cli.no_remote {
        config.remote.enabled = false;
    }
    config.validate()?;

    init_tracing(config.node.json_logs)?;

    info!(name = %config.node.name, "Starting crowdsafety-node");
    info!("Config file: {}", cli.config);
    if !found {
        info!("Config file not found, using defaults");
    }

    let remote = &config.remote;
    let store: Option<Arc<dyn DocumentStore>> = match (remote.enabled, remote.backend) {
        (false, _) => {
            info!("Remote mirrors disabled");
            None
        }
        (true, RemoteBackend::Firestore) => {
            info!(
                base_url = %remote.store.base_url,
                project_id = %remote.store.project_id,
                "Using Firestore document store"
            );
            Some(Arc::new(FirestoreDocumentStore::new(remote.store.clone())))
        }
        (true, RemoteBackend::Memory) => {
            warn!("Using in-memory document store; mirrored data is not shared or kept");
            Some(Arc::new(MemoryDocumentStore::new(remote.store.project_id.clone())))
        }
    };

    let services = Services::new(config.simulation.clone(), store);
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    if let Some(simulation) = services.crowd.start() {
        tasks.push(simulation);
    }

    // Publish the seeded visitors as online
    if services.remote_available() {
        for visitor in services.crowd.active_visitors().get() {
            if let Err(e) = services.presence.set_online(&visitor).await {
                warn!(visitor = %visitor.id, error = %e, "Presence update failed");
            }
        }
    }

    tasks.push(spawn_incident_log(services.clone()));
    tasks.push(spawn_stats(services.clone(), config.node.stats_interval_secs));

    if config.crowd_feed.enabled {
        let client = CrowdFeedClient::new(config.crowd_feed.client.clone());
        info!(feed = %client.video_feed_url(&config.crowd_feed.zone), "Crowd counter video feed");
        let counts = StateStream::new(0u32);
        tasks.push(client.poll(&config.crowd_feed.zone, counts.clone()));
        tasks.push(spawn_count_log(config.crowd_feed.zone.clone(), counts));
    } else {
        info!("Crowd counter polling is disabled");
    }

    if config.weather.enabled {
        let client = WeatherClient::new(config.weather.client.clone());
        tasks.push(spawn_weather(
            services.clone(),
            client,
            config.weather.refresh_interval_secs,
        ));
    } else {
        info!("Weather refresh is disabled");
    }

    info!(tasks = tasks.len(), "crowdsafety-node running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    for task in &tasks {
        task.abort();
    }
    Ok(())
}

/// Log incidents as they appear in the feed.
fn spawn_incident_log(services: Services) -> JoinHandle<()> {
    let mut incidents = services.crowd.incidents().subscribe();
    tokio::spawn(async move {
        let mut seen: HashSet<String> = incidents.current().into_iter().map(|i| i.id).collect();
        while let Some(list) = incidents.next().await {
            for incident in &list {
                if seen.insert(incident.id.clone()) {
                    info!(
                        id = %incident.id,
                        severity = ?incident.severity,
                        recipient = incident.recipient.as_deref().unwrap_or("-"),
                        "{}",
                        incident.message
                    );
                }
            }
            seen.retain(|id| list.iter().any(|i| &i.id == id));
        }
    })
}

/// Periodic summary of the live state.
fn spawn_stats(services: Services, interval_secs: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            ticker.tick().await;
            let crowd = &services.crowd;
            let peak = crowd.zone_risks().with(|zones| {
                zones
                    .iter()
                    .max_by(|a, b| a.risk.total_cmp(&b.risk))
                    .map(|z| format!("{} ({:.2})", z.display_name, z.risk))
            });
            let weather = crowd.weather().get();
            info!(
                peak_zone = peak.as_deref().unwrap_or("-"),
                visitors = ?crowd.visitor_counts(),
                active_sos = crowd.active_sos().len(),
                pending_timers = crowd.scheduler().pending_count(),
                temperature = weather.temperature,
                weather = ?weather.weather_type,
                remote_events = services.events.events().with(Vec::len),
                remote_lost = services.lost.reports().with(Vec::len),
                online = services.presence.online().with(Vec::len),
                "Live state"
            );
        }
    })
}

fn spawn_count_log(zone: String, counts: StateStream<u32>) -> JoinHandle<()> {
    let mut updates = counts.subscribe();
    tokio::spawn(async move {
        while let Some(count) = updates.next().await {
            info!(zone = %zone, count, "Crowd count");
        }
    })
}

/// Refresh observed weather into the repository.
fn spawn_weather(services: Services, client: WeatherClient, interval_secs: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            ticker.tick().await;
            if let Some(info) = client.current_at_site().await {
                services.crowd.observe_weather(info.temp, info.weather_type());
            }
        }
    })
}
