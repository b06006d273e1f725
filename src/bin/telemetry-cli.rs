use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use telemetry_guard::config::load_config;
use telemetry_guard::observability::logging;
use telemetry_guard::resilience::{StateStore, StoreError};
use telemetry_guard::{Dsn, ErrorPayload, Level, TelemetryClient};

#[derive(Parser)]
#[command(name = "telemetry-cli")]
#[command(about = "Inspect and exercise a telemetry-guard configuration", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "telemetry.toml")]
    config: PathBuf,

    /// File holding breaker state between invocations
    #[arg(long, default_value = ".telemetry-breaker.json")]
    state_file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the parsed DSN and derived endpoints
    Dsn,
    /// Send test error events and report the breaker afterwards
    Test {
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,

        #[arg(short, long, default_value = "telemetry-cli test event")]
        message: String,
    },
    /// Print the circuit breaker state
    State,
    /// Close the circuit and zero its failure count
    Reset,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init(logging::DEFAULT_FILTER);
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;

    if let Commands::Dsn = cli.command {
        let dsn = Dsn::parse(&config.dsn)?;
        let endpoints = dsn.endpoints()?;
        println!("scheme:     {}", dsn.scheme());
        println!("host:       {}", dsn.host());
        if let Some(port) = dsn.port() {
            println!("port:       {}", port);
        }
        println!("project id: {}", dsn.project_id());
        println!("ingest:     {}", endpoints.ingest());
        println!("sessions:   {}", endpoints.sessions());
        return Ok(());
    }

    // The CLI reports what happened, so it always waits for responses.
    config.async_dispatch = false;
    let client = TelemetryClient::builder(config)
        .store(Arc::new(FileStore::new(cli.state_file)))
        .build()?;

    match cli.command {
        Commands::Dsn => {}
        Commands::Test { count, message } => {
            for n in 1..=count {
                let event_id = uuid::Uuid::new_v4();
                let payload = ErrorPayload::new("TelemetryCliTest", message.as_str(), file!(), line!())
                    .level(Level::Info)
                    .source("telemetry-cli")
                    .tag("event_id", event_id.to_string());
                client.send_error(&payload).await;
                println!("sent test event {} ({}/{})", event_id, n, count);
            }
            print_state(&client)?;
        }
        Commands::State => print_state(&client)?,
        Commands::Reset => {
            client.reset_breaker();
            print_state(&client)?;
        }
    }

    Ok(())
}

fn print_state(client: &TelemetryClient) -> Result<(), Box<dyn std::error::Error>> {
    let state = client.breaker_state();
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

#[derive(Serialize, Deserialize)]
struct FileEntry {
    value: String,
    expires_at: i64,
}

/// Breaker store persisted as a JSON file, so state survives between runs.
struct FileStore {
    path: PathBuf,
}

impl FileStore {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read(&self) -> Result<HashMap<String, FileEntry>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
                key: self.path.display().to_string(),
                reason: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(StoreError::Unavailable(e.to_string())),
        }
    }

    fn write(&self, entries: &HashMap<String, FileEntry>) -> Result<(), StoreError> {
        let raw = serde_json::to_string_pretty(entries)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        fs::write(&self.path, raw).map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

impl StateStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Utc::now().timestamp();
        Ok(self
            .read()?
            .remove(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value))
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut entries = self.read()?;
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        entries.insert(
            key.to_string(),
            FileEntry {
                value: value.to_string(),
                expires_at: Utc::now().timestamp().saturating_add(ttl),
            },
        );
        self.write(&entries)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.read()?;
        if entries.remove(key).is_some() {
            self.write(&entries)?;
        }
        Ok(())
    }
}
