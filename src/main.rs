//! House Price Prediction CLI
//!
//! Serves a pre-trained price model over HTTP and inspects its prediction log.

use clap::{Parser, Subcommand};
use house_price::{Config, Result};

#[derive(Parser)]
#[command(name = "house-price")]
#[command(about = "House price prediction service", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Override the bind host
        #[arg(long)]
        host: Option<String>,
        /// Override the bind port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Show recent predictions
    History {
        /// Number of records to show
        #[arg(long, default_value = "20")]
        limit: usize,
        /// Output format
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },
    /// Show prediction log and model status
    Status,
    /// Model management commands
    Model {
        #[command(subcommand)]
        action: ModelCommands,
    },
    /// Initialize a new project with default config
    Init,
}

#[derive(Subcommand)]
enum ModelCommands {
    /// Show model information
    Info,
    /// Write artifacts from an exported linear model (JSON)
    Import {
        /// Path to the export file
        input: String,
    },
}

#[derive(Clone, Debug)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown format: {}. Use table, json, or csv.", s)),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load or create config
    let config = if std::path::Path::new(&cli.config).exists() {
        match Config::load(&cli.config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    // Run command
    let result = match cli.command {
        Commands::Serve { host, port } => commands::serve(config, host, port),
        Commands::History { limit, format } => commands::history(&config, limit, format),
        Commands::Status => commands::status(&config),
        Commands::Model { action } => match action {
            ModelCommands::Info => commands::model_info(&config),
            ModelCommands::Import { input } => commands::model_import(&config, &input),
        },
        Commands::Init => commands::init(&cli.config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

mod commands {
    use super::*;
    use house_price::data::RecordStore;
    use house_price::model::{Artifacts, FeatureScaler, LinearExport};
    use house_price::predict::Predictor;
    use house_price::{server, FEATURE_NAMES};
    use std::path::Path;
    use std::sync::Arc;

    pub fn init(config_path: &str) -> Result<()> {
        let config = Config::default();
        config.save(config_path)?;
        println!("Created default config at {}", config_path);

        std::fs::create_dir_all("model")?;
        std::fs::create_dir_all("db")?;
        println!("Created model/ and db/ directories");

        println!("\nNext steps:");
        println!("  1. Edit {} to customize settings", config_path);
        println!("  2. Run 'house-price model import <export.json>' to install a fitted model");
        println!("  3. Run 'house-price serve' and open http://{}", config.server.bind());

        Ok(())
    }

    pub fn serve(mut config: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
        if let Some(host) = host {
            config.server.host = host;
        }
        if let Some(port) = port {
            config.server.port = port;
        }

        let predictor = Predictor::load(&config)?;
        if !predictor.is_ready() {
            println!("No model loaded; prediction endpoints will answer with an error.");
        }

        let app = server::router(Arc::new(predictor), config.server.max_upload_bytes);
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(server::listen(app, config.server.bind()))
    }

    pub fn history(config: &Config, limit: usize, format: OutputFormat) -> Result<()> {
        let store = RecordStore::new(&config.storage.database_path);
        store.init()?;
        let records = store.recent(limit)?;

        match format {
            OutputFormat::Table => {
                if records.is_empty() {
                    println!("No predictions logged yet.");
                    return Ok(());
                }
                println!(
                    "{:>6}  {:<19}  {:>14}  {}",
                    "ID", "Timestamp", "Price", "Input"
                );
                println!("{}", "─".repeat(72));
                for record in &records {
                    println!(
                        "{:>6}  {:<19}  {:>14.2}  {}",
                        record.id, record.timestamp, record.predicted_price, record.input_data
                    );
                }
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&records)?);
            }
            OutputFormat::Csv => {
                let mut writer = csv::Writer::from_writer(std::io::stdout());
                let mut header = vec!["id", "timestamp", "predicted_price"];
                header.extend(FEATURE_NAMES);
                writer.write_record(&header)?;

                for record in &records {
                    let mut row = vec![
                        record.id.to_string(),
                        record.timestamp.to_string(),
                        format!("{:.2}", record.predicted_price),
                    ];
                    row.extend(FEATURE_NAMES.iter().map(|name| {
                        record
                            .input_data
                            .get(name)
                            .map(|v| v.to_string())
                            .unwrap_or_default()
                    }));
                    writer.write_record(&row)?;
                }
                writer.flush()?;
            }
        }

        Ok(())
    }

    pub fn status(config: &Config) -> Result<()> {
        let store = RecordStore::new(&config.storage.database_path);
        store.init()?;
        let stats = store.stats()?;

        println!("Prediction Log");
        println!("───────────────────────────────");
        println!("  Path:        {}", config.storage.database_path);
        println!("  Predictions: {}", stats.record_count);
        if let (Some(first), Some(last)) = (stats.first_prediction, stats.last_prediction) {
            println!("  Range:       {} to {}", first, last);
        }

        let model_file = Artifacts::model_file(&config.artifacts);
        let model_found = Path::new(&model_file).exists();
        let scaler_found = Path::new(&config.artifacts.scaler_path).exists();

        println!("\nModel");
        println!("───────────────────────────────");
        println!("  Model file:  {} ({})", model_file, found(model_found));
        println!(
            "  Scaler file: {} ({})",
            config.artifacts.scaler_path,
            found(scaler_found)
        );
        let state = match Artifacts::load(&config.artifacts) {
            Ok(Some(_)) => "ready".to_string(),
            Ok(None) => "not loaded".to_string(),
            Err(e) => format!("unloadable: {}", e),
        };
        println!("  State:       {}", state);

        Ok(())
    }

    fn found(exists: bool) -> &'static str {
        if exists {
            "found"
        } else {
            "missing"
        }
    }

    pub fn model_info(config: &Config) -> Result<()> {
        let model_file = Artifacts::model_file(&config.artifacts);
        if !Path::new(&model_file).exists() || !Path::new(&config.artifacts.scaler_path).exists()
        {
            return Err(house_price::PriceError::ModelUnavailable);
        }
        let scaler = FeatureScaler::load(&config.artifacts.scaler_path)?;

        let architecture = if config.artifacts.hidden_dims.is_empty() {
            "linear".to_string()
        } else {
            let dims: Vec<String> = config
                .artifacts
                .hidden_dims
                .iter()
                .map(|d| d.to_string())
                .collect();
            format!("{} → {} → 1 (ReLU)", FEATURE_NAMES.len(), dims.join(" → "))
        };

        println!("Model Information");
        println!("───────────────────────────────");
        println!("  Model:        {}", model_file);
        println!("  Scaler:       {}", config.artifacts.scaler_path);
        println!("  Architecture: {}", architecture);
        println!("\n  {:<12} {:>14} {:>14}", "Feature", "Mean", "Scale");
        for (i, name) in FEATURE_NAMES.iter().enumerate() {
            println!(
                "  {:<12} {:>14.3} {:>14.3}",
                name, scaler.mean[i], scaler.scale[i]
            );
        }

        Ok(())
    }

    pub fn model_import(config: &Config, input: &str) -> Result<()> {
        let export = LinearExport::load(input)?;
        export.write(&config.artifacts)?;
        println!(
            "Imported model from {} into {}",
            input,
            Artifacts::model_file(&config.artifacts)
        );
        Ok(())
    }
}
