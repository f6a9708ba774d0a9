use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info};

use weathercast::config::Config;
use weathercast::gcs::GcsObjectStore;
use weathercast::genai::{GeminiImageGenerator, VeoVideoGenerator};
use weathercast::logging;
use weathercast::maps::GoogleMapsResolver;
use weathercast::orchestrator::{Orchestrator, PipelineConfig, PresetSpec};
use weathercast::server;
use weathercast::store::{MetadataStore, SqliteStore, TypeFilter};
use weathercast::tasks;
use weathercast::types::StyleMode;

#[derive(Parser)]
#[command(name = "weathercast")]
#[command(about = "Generative weather-postcard service and preset tooling")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (SSE generation endpoint + preset listing)
    Serve {
        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Generate presets from a CSV file or a single location via flags
    Generate {
        /// Path to CSV file (format: id,name,city,category,context)
        #[arg(long)]
        csv: Option<String>,
        /// Force overwrite existing preset media
        #[arg(long)]
        force: bool,
        /// Unique ID (e.g. 'my_preset')
        #[arg(long)]
        id: Option<String>,
        /// Display name (e.g. 'My Preset')
        #[arg(long)]
        name: Option<String>,
        /// City query or concept (e.g. 'Atlantis')
        #[arg(long)]
        city: Option<String>,
        /// Visual description for fictional places
        #[arg(long, default_value = "")]
        context: String,
        /// Grouping category
        #[arg(long, default_value = "General")]
        category: String,
        /// Prompt style: 0=Random, 1=Landmark, 2=Drink
        #[arg(long, default_value_t = 0)]
        style: i64,
    },
    /// Administrative tasks
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },
    /// Migrate a legacy presets.json flat file into the metadata store
    Migrate {
        /// Path to the legacy preset list
        #[arg(long, default_value = "presets.json")]
        file: String,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Show database statistics
    Stats,
    /// List locations
    List {
        /// Max number of results
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Filter by type: all, preset, user
        #[arg(long = "type", default_value = "all")]
        type_filter: String,
    },
    /// Refresh a location's media
    Refresh {
        /// Location ID to refresh
        #[arg(long)]
        id: String,
        /// Prompt style: 0=Random, 1=Landmark, 2=Drink
        #[arg(long, default_value_t = 0)]
        style: i64,
    },
}

/// Wires the live adapters into the orchestrator.
fn build_orchestrator(cfg: &Config, store: Arc<dyn MetadataStore>) -> Arc<Orchestrator> {
    let resolver = Arc::new(GoogleMapsResolver::new(cfg.maps_api_key.clone()));
    let images = Arc::new(GeminiImageGenerator::new(
        cfg.project_id.clone(),
        cfg.region.clone(),
        cfg.access_token.clone(),
    ));
    let videos = Arc::new(VeoVideoGenerator::new(
        cfg.project_id.clone(),
        cfg.region.clone(),
        cfg.access_token.clone(),
        cfg.bucket.clone(),
    ));
    let objects = Arc::new(GcsObjectStore::new(
        cfg.bucket.clone(),
        cfg.access_token.clone(),
        cfg.public_storage_base.clone(),
    ));

    let pipeline_cfg = PipelineConfig {
        cache_ttl: cfg.cache_ttl,
        poll_interval: cfg.poll_interval,
        video_deadline: cfg.video_deadline,
        public_storage_base: cfg.public_storage_base.clone(),
        ..PipelineConfig::default()
    };

    Arc::new(Orchestrator::new(
        resolver,
        images,
        videos,
        objects,
        store,
        pipeline_cfg,
    ))
}

/// Opens the local metadata store without requiring the full service config.
/// Admin queries and migration only need the database.
fn open_store() -> Result<Arc<dyn MetadataStore>, Box<dyn std::error::Error>> {
    let _ = dotenv::from_filename(".env");
    let db_path = std::env::var("WEATHERCAST_DB").unwrap_or_else(|_| "data/weathercast.db".into());
    Ok(Arc::new(SqliteStore::open(db_path)?))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    logging::init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port } => {
            let cfg = Config::load()?;
            let store: Arc<dyn MetadataStore> = Arc::new(SqliteStore::open(&cfg.db_path)?);
            let orchestrator = build_orchestrator(&cfg, store.clone());
            server::start_server(orchestrator, store, port.unwrap_or(cfg.port)).await?;
        }
        Commands::Generate {
            csv,
            force,
            id,
            name,
            city,
            context,
            category,
            style,
        } => {
            let cfg = Config::load()?;
            let store: Arc<dyn MetadataStore> = Arc::new(SqliteStore::open(&cfg.db_path)?);
            let orchestrator = build_orchestrator(&cfg, store);

            if let Some(csv_path) = csv {
                println!("🔄 Running batch preset generation...");
                // Batch rows always use the random style
                let result =
                    tasks::generate_batch(&orchestrator, &csv_path, force, StyleMode::Random)
                        .await?;
                println!("\n📊 Batch results:");
                println!("   Processed: {}", result.processed);
                println!("   Skipped rows: {}", result.skipped_rows);
                println!("   Errors: {}", result.errors.len());
                for e in &result.errors {
                    println!("   - {e}");
                }
            } else {
                let (id, name, city) = match (id, name, city) {
                    (Some(id), Some(name), Some(city)) => (id, name, city),
                    _ => {
                        eprintln!("Usage: weathercast generate [flags]");
                        eprintln!("\nRequired flags for single mode:");
                        eprintln!("  --id       Unique identifier (e.g. 'my_preset')");
                        eprintln!("  --name     Display name (e.g. 'My Preset')");
                        eprintln!("  --city     City query or concept (e.g. 'Atlantis')");
                        eprintln!("\nOr use batch mode:");
                        eprintln!("  --csv      Path to CSV file");
                        std::process::exit(1);
                    }
                };

                let spec = PresetSpec {
                    id,
                    name,
                    city,
                    category,
                    context,
                    style: StyleMode::from_wire(style),
                };
                match tasks::generate_single(&orchestrator, spec, force).await {
                    Ok(()) => println!("✅ Preset generation complete"),
                    Err(e) => {
                        error!("Preset generation failed: {}", e);
                        return Err(e.into());
                    }
                }
            }
            info!("Done.");
        }
        Commands::Admin { command } => match command {
            AdminCommands::Stats => {
                let store = open_store()?;
                println!("Fetching stats...");
                tasks::run_stats(store.as_ref()).await?;
            }
            AdminCommands::List { limit, type_filter } => {
                let store = open_store()?;
                println!("Listing top {limit} locations (type: {type_filter})...");
                tasks::run_list(store.as_ref(), limit, TypeFilter::parse(&type_filter)).await?;
            }
            AdminCommands::Refresh { id, style } => {
                let cfg = Config::load()?;
                let store: Arc<dyn MetadataStore> = Arc::new(SqliteStore::open(&cfg.db_path)?);
                let orchestrator = build_orchestrator(&cfg, store);
                tasks::run_refresh(&orchestrator, &id, StyleMode::from_wire(style)).await?;
            }
        },
        Commands::Migrate { file } => {
            let store = open_store()?;
            let migrated = tasks::run_migrate(store, &file).await?;
            println!("✅ Migration complete ({migrated} presets)");
        }
    }
    Ok(())
}
