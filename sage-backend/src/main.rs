use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;
use std::time::Duration;

mod agent;
mod ai;
mod config;
mod controllers;
mod error;
mod execution;
mod memory;
mod models;
mod pipeline;
mod storage;
mod tools;
mod vector;

use ai::{ClaudeClient, CompletionModel};
use config::Config;
use error::AgentError;
use execution::SessionLaneManager;
use storage::{FileStorageAdapter, SqliteStorageAdapter, StorageAdapter};
use vector::{HttpVectorRetriever, VectorRetriever};

pub struct AppState {
    pub config: Config,
    pub http: reqwest::Client,
    pub storage: Arc<dyn StorageAdapter>,
    pub lanes: Arc<SessionLaneManager>,
}

impl AppState {
    /// Build a completion model for one request, with optional sampling
    /// overrides on top of the process configuration.
    pub fn completion_model(
        &self,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> Result<Arc<dyn CompletionModel>, AgentError> {
        let client = ClaudeClient::from_config(self.http.clone(), &self.config, temperature, max_tokens)?;
        Ok(Arc::new(client))
    }

    /// Retriever scoped to the request's namespace, when a vector service is
    /// configured; absent configuration simply means no long-term memory and
    /// no retrieval tool.
    pub fn retriever(&self, namespace: Option<String>) -> Option<Arc<dyn VectorRetriever>> {
        self.config.vector_service_url.as_ref().map(|url| {
            Arc::new(HttpVectorRetriever::new(self.http.clone(), url.clone(), namespace))
                as Arc<dyn VectorRetriever>
        })
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env().unwrap_or_else(|e| {
        log::error!("{}", e);
        std::process::exit(1);
    });
    let port = config.port;

    // One shared HTTP connection pool, injected everywhere that talks to the
    // outside (model API, search, vector service)
    let http = reqwest::Client::builder()
        .pool_max_idle_per_host(5)
        .pool_idle_timeout(Duration::from_secs(90))
        .timeout(Duration::from_secs(120))
        .build()
        .expect("Failed to create HTTP client");

    let storage: Arc<dyn StorageAdapter> = match &config.database_url {
        Some(url) => {
            log::info!("Using SQLite conversation store at {}", url);
            Arc::new(SqliteStorageAdapter::new(url).unwrap_or_else(|e| {
                log::error!("{}", e);
                std::process::exit(1);
            }))
        }
        None => {
            log::info!("Using file conversation store at {}", config.chat_history_dir);
            Arc::new(FileStorageAdapter::new(&config.chat_history_dir).unwrap_or_else(|e| {
                log::error!("{}", e);
                std::process::exit(1);
            }))
        }
    };

    let lanes = SessionLaneManager::new();

    if config.vector_service_url.is_none() {
        log::warn!("VECTOR_SERVICE_URL not set; long-term memory and retrieval tool disabled");
    }

    log::info!("Starting sage-backend on port {}", port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(AppState {
                config: config.clone(),
                http: http.clone(),
                storage: Arc::clone(&storage),
                lanes: Arc::clone(&lanes),
            }))
            .wrap(Logger::default())
            .wrap(cors)
            .configure(controllers::health::config)
            .configure(controllers::chat::config)
            .configure(controllers::agent::config)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
