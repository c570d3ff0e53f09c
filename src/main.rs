//! PlantVillage Inference Server
//!
//! Loads a model artifact and serves leaf disease predictions over HTTP.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use plantvillage_serve::server;
use plantvillage_serve::utils::logging::{init_logging, LogConfig, LogLevel};
use plantvillage_serve::ServerConfig;

/// PlantVillage Inference Server
#[derive(Parser, Debug)]
#[command(name = "plantvillage-serve")]
#[command(author = "Warre Snaet")]
#[command(version)]
#[command(about = "HTTP inference server for PlantVillage leaf disease classification")]
struct Cli {
    /// JSON configuration file; flags and environment override it
    #[arg(short, long, env = "PLANTVILLAGE_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long, env = "PLANTVILLAGE_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "PLANTVILLAGE_PORT")]
    port: Option<u16>,

    /// Path of the model manifest
    #[arg(short, long, env = "PLANTVILLAGE_MODEL_PATH")]
    model_path: Option<PathBuf>,

    /// Maximum upload size in bytes
    #[arg(long, env = "PLANTVILLAGE_MAX_UPLOAD_BYTES")]
    max_upload_bytes: Option<usize>,

    /// Directory where accepted uploads are archived
    #[arg(long, env = "PLANTVILLAGE_UPLOAD_DIR")]
    upload_dir: Option<PathBuf>,

    /// Inference worker threads
    #[arg(long, env = "PLANTVILLAGE_WORKERS")]
    workers: Option<usize>,

    /// Requests that may wait for an inference worker
    #[arg(long, env = "PLANTVILLAGE_QUEUE_CAPACITY")]
    queue_capacity: Option<usize>,

    /// Per-request timeout in milliseconds
    #[arg(long, env = "PLANTVILLAGE_REQUEST_TIMEOUT_MS")]
    request_timeout_ms: Option<u64>,

    /// Predictions per response (0 for all labels)
    #[arg(long, env = "PLANTVILLAGE_TOP_K")]
    top_k: Option<usize>,

    /// Route of the prediction endpoint
    #[arg(long, env = "PLANTVILLAGE_PREDICT_PATH")]
    predict_path: Option<String>,

    /// Multipart field carrying the image
    #[arg(long, env = "PLANTVILLAGE_FIELD_NAME")]
    field_name: Option<String>,

    /// Largest accepted decoded image width or height
    #[arg(long, env = "PLANTVILLAGE_MAX_IMAGE_DIMENSION")]
    max_image_dimension: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "PLANTVILLAGE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit JSON log lines
    #[arg(long, env = "PLANTVILLAGE_LOG_JSON", default_value = "false")]
    log_json: bool,

    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

impl Cli {
    fn log_config(&self) -> LogConfig {
        if self.verbose {
            LogConfig::verbose()
        } else if self.log_json {
            LogConfig::production().with_level(LogLevel::parse(&self.log_level))
        } else {
            LogConfig::default().with_level(LogLevel::parse(&self.log_level))
        }
    }

    /// Defaults, then the config file, then flags and environment
    fn server_config(self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };

        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(model_path) = self.model_path {
            config.model_path = model_path;
        }
        if let Some(max_upload_bytes) = self.max_upload_bytes {
            config.max_upload_bytes = max_upload_bytes;
        }
        if let Some(upload_dir) = self.upload_dir {
            config.upload_dir = Some(upload_dir);
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(queue_capacity) = self.queue_capacity {
            config.queue_capacity = queue_capacity;
        }
        if let Some(request_timeout_ms) = self.request_timeout_ms {
            config.request_timeout_ms = request_timeout_ms;
        }
        if let Some(top_k) = self.top_k {
            config.top_k = top_k;
        }
        if let Some(predict_path) = self.predict_path {
            config.predict_path = predict_path;
        }
        if let Some(field_name) = self.field_name {
            config.field_name = field_name;
        }
        if let Some(max_image_dimension) = self.max_image_dimension {
            config.max_image_dimension = max_image_dimension;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_config()).map_err(anyhow::Error::msg)?;

    info!("PlantVillage Inference Server v{}", env!("CARGO_PKG_VERSION"));

    let config = cli.server_config()?;
    server::run(config).await?;

    Ok(())
}
