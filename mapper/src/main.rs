use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use mapper::{
    AppState,
    config::{MapperConfig, parse_fixed_location},
    create_router,
    location::FixedLocation,
    shared_state,
    store::FileStore,
    transfer,
};
use shared::ImportMode;
use tokio::io::AsyncWriteExt;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(author, version, about = "Field site mapper: site registry, geodesic tools and HTTP API")]
struct Cli {
    /// Directory holding the persisted slots (overrides MAPPER_STORE_DIR)
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    /// Prefix for persisted slot names (overrides MAPPER_NAMESPACE)
    #[arg(long, global = true)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the JSON API
    Serve {
        /// Listen address (overrides MAPPER_ADDR)
        #[arg(long)]
        addr: Option<String>,
        /// Operator position as "lat,lng[,accuracy]" for fixed installations
        #[arg(long)]
        fixed_location: Option<String>,
    },
    /// Load sites from a JSON or CSV file into the store
    Import {
        file: PathBuf,
        #[arg(long, default_value = "append")]
        mode: ImportMode,
        /// Defaults to the file extension
        #[arg(long, value_enum)]
        format: Option<ImportFormat>,
    },
    /// Write the stored sites or a CSV template
    Export {
        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
        /// Defaults to stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ImportFormat {
    Json,
    Csv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ExportFormat {
    Json,
    Gpx,
    CsvTemplate,
    CsvSample,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mapper=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let addr_flag = match &cli.command {
        Command::Serve { addr, .. } => addr.clone(),
        _ => None,
    };
    let config = MapperConfig::from_env()?.with_overrides(
        addr_flag.as_deref(),
        cli.store_dir,
        cli.namespace,
    )?;

    let store = FileStore::open(&config.store_dir)?;
    tracing::info!("store directory: {}", store.root().display());
    let mut state = AppState::load(Box::new(store), config.namespace.clone());

    match cli.command {
        Command::Serve { fixed_location, .. } => {
            if let Some(text) = fixed_location {
                let provider = FixedLocation(parse_fixed_location(&text)?);
                state.refresh_user_location(&provider).await?;
            }

            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            let app = create_router(shared_state(state)).layer(cors);

            tracing::info!("starting mapper on http://{}", config.bind_addr);
            let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
            axum::serve(listener, app).await?;
        }
        Command::Import { file, mode, format } => {
            let text = tokio::fs::read_to_string(&file).await?;
            let format = format.unwrap_or_else(|| guess_format(&file));
            let summary = match format {
                ImportFormat::Json => state.import_json(&text, mode)?,
                ImportFormat::Csv => state.import_csv(&text, mode),
            };
            tracing::info!(
                "{}: imported {}, skipped {}, {} site(s) stored",
                file.display(),
                summary.imported,
                summary.skipped,
                summary.total
            );
        }
        Command::Export { format, output } => {
            let body = match format {
                ExportFormat::Json => transfer::export_json(state.sites())?,
                ExportFormat::Gpx => transfer::export_gpx(state.sites())?,
                ExportFormat::CsvTemplate => transfer::export_csv_template(false),
                ExportFormat::CsvSample => transfer::export_csv_template(true),
            };
            match output {
                Some(path) => {
                    tokio::fs::write(&path, body).await?;
                    tracing::info!("wrote {}", path.display());
                }
                None => {
                    let mut stdout = tokio::io::stdout();
                    stdout.write_all(body.as_bytes()).await?;
                    stdout.write_all(b"\n").await?;
                    stdout.flush().await?;
                }
            }
        }
    }

    Ok(())
}

fn guess_format(path: &std::path::Path) -> ImportFormat {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => ImportFormat::Csv,
        _ => ImportFormat::Json,
    }
}
