mod config;
mod gemini;
mod transport;
mod web;

use std::time::Instant;

use actix_files as fs;
use actix_web::http::StatusCode;
use actix_web::middleware::ErrorHandlers;
use actix_web::{web::Data, App, HttpServer};
use dotenv::dotenv;
use log::{error, info};

use config::AppConfig;
use gemini::GeminiService;
use web::{handlers, routes};

// App state structure
pub struct AppState {
    pub config: AppConfig,
    pub gemini: GeminiService,
    pub started: Instant,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting Arona dashboard server");

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };
    config.log_summary();

    let client = match transport::build_client(config.proxy_url.as_deref()) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to initialize HTTP client: {e}");
            std::process::exit(1);
        }
    };

    let port = config.port;
    let app_state = Data::new(AppState {
        gemini: GeminiService::new(config.clone(), client),
        config,
        started: Instant::now(),
    });

    info!("Listening on http://localhost:{port}");

    // Start web server
    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .app_data(handlers::json_config())
            .wrap(
                ErrorHandlers::new()
                    .handler(StatusCode::INTERNAL_SERVER_ERROR, handlers::render_uncaught_error),
            )
            .configure(routes::configure)
            .service(fs::Files::new("/", "./static").index_file("index.html"))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
