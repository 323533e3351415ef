use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use geotube_core::{
    classify_device, Clock, EventBus, FileTokenStorage, GeoPoint, IdentityResolver, MemoryStore,
    MonotonicClock, RemoteStore, RestStore, RestStoreConfig, StaticNetworkInfo, TrackedPlayer,
    TrackerConfig, TrackerDeps, VideoRef,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod report;
mod scenario;
mod shell;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) geotube-track/0.1";

#[derive(Debug, Parser)]
#[command(name = "geotube-track")]
#[command(about = "GeoTube viewing telemetry: identity, watch sessions, load metrics, connectivity issues")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, value_enum, default_value = "memory")]
    store: StoreKind,

    #[arg(long)]
    store_url: Option<String>,

    #[arg(long, env = "GEOTUBE_STORE_KEY", default_value = "", hide_env_values = true)]
    api_key: String,

    #[arg(long, default_value = "./data/session.json")]
    token_file: String,

    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    user_agent: String,

    /// Effective connection class to report with load metrics (4g, 3g, ...).
    #[arg(long)]
    connection_type: Option<String>,

    #[arg(long)]
    single_open_issue: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    Device,
    Identify,
    Simulate {
        #[command(flatten)]
        video: VideoArgs,
        #[command(flatten)]
        script: scenario::ScriptArgs,
        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormat,
    },
    Watch {
        #[command(flatten)]
        video: VideoArgs,
        #[arg(long)]
        completed: bool,
        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Args)]
struct VideoArgs {
    #[arg(long)]
    video_id: String,

    #[arg(long)]
    title: Option<String>,

    #[arg(long)]
    channel: Option<String>,

    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    lat: Option<f64>,

    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lon: Option<f64>,
}

impl VideoArgs {
    fn video_ref(&self) -> VideoRef {
        VideoRef {
            id: self.video_id.clone(),
            title: self.title.clone(),
            channel: self.channel.clone(),
            geo: self.lat.zip(self.lon).map(|(latitude, longitude)| GeoPoint {
                latitude,
                longitude,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    Memory,
    Rest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Human,
    Json,
    Ndjson,
}

impl Cli {
    fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            single_open_issue: self.single_open_issue,
            ..TrackerConfig::default()
        }
    }

    fn build_store(&self) -> Result<(Arc<dyn RemoteStore>, Option<MemoryStore>)> {
        match self.store {
            StoreKind::Memory => {
                let store = MemoryStore::new();
                Ok((Arc::new(store.clone()), Some(store)))
            }
            StoreKind::Rest => {
                let Some(base_url) = self.store_url.clone() else {
                    bail!("--store-url is required with --store rest");
                };
                let config = RestStoreConfig {
                    base_url,
                    api_key: self.api_key.clone(),
                };
                Ok((Arc::new(RestStore::new(config)), None))
            }
        }
    }

    fn deps(&self, store: Arc<dyn RemoteStore>) -> TrackerDeps {
        let config = self.tracker_config();
        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
        let identity = IdentityResolver::new(
            Arc::new(FileTokenStorage::new(&self.token_file)),
            clock.clone(),
            &config,
            self.user_agent.clone(),
        );

        TrackerDeps {
            store,
            identity: Arc::new(identity),
            clock,
            network: Arc::new(StaticNetworkInfo(self.connection_type.clone())),
            events: EventBus::default(),
            config,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Command::Device => {
            let device = classify_device(&cli.user_agent);
            println!("{}", serde_json::to_string_pretty(&device)?);
        }
        Command::Identify => {
            let (store, _) = cli.build_store()?;
            let deps = cli.deps(store);
            let user_id = deps.identity.resolve_user(deps.store.as_ref()).await;
            let out = serde_json::json!({
                "session_token": deps.identity.session_token(),
                "user_id": user_id,
                "device": deps.identity.device(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Command::Simulate {
            video,
            script,
            format,
        } => {
            let (store, memory) = cli.build_store()?;
            let deps = cli.deps(store);
            let outcome = scenario::run_scenario(&deps, video.video_ref(), script).await;
            report::print_outcome(&outcome, memory.as_ref(), *format)?;
        }
        Command::Watch {
            video,
            completed,
            format,
        } => {
            let (store, memory) = cli.build_store()?;
            let deps = cli.deps(store);
            let mut player = TrackedPlayer::mount(&deps, video.video_ref()).await;
            let outcome = scenario::Outcome::from_player(&player);
            info!(video_id = %video.video_id, tracked = outcome.user_id.is_some(), "player mounted");

            shell::run_shell(&mut player, &deps.events).await;
            player.unmount(*completed).await;
            scenario::settle().await;
            report::print_outcome(&outcome, memory.as_ref(), *format)?;
        }
    }

    Ok(())
}
