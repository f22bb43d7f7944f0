use std::sync::Arc;

use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use serde_json::Value;
use shared::blob::{BlobStore, FsBlobStore};
use shared::config::Settings;
use shared::edgar::{EdgarClient, FilingSource};
use shared::error::StageError;
use shared::http::json_config;
use shared::stages::fetch_facts;
use tracing::{error, info};

struct AppState {
    source: Arc<dyn FilingSource>,
    store: Arc<dyn BlobStore>,
}

async fn health() -> impl Responder {
    "OK"
}

async fn invoke(
    event: web::Json<Value>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, StageError> {
    let check = fetch_facts(&event, state.source.as_ref(), state.store.as_ref())
        .await
        .inspect_err(|e| error!(%e, "fetch stage failed"))?;
    Ok(HttpResponse::Ok().json(check))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();
    info!("starting fetch-facts service");

    let settings = match Settings::new() {
        Ok(s) => s,
        Err(e) => {
            error!(%e, "failed to load settings");
            std::process::exit(1);
        }
    };
    let source = match EdgarClient::new(&settings.edgar_base_url, &settings.edgar_user_agent) {
        Ok(c) => c,
        Err(e) => {
            error!(%e, "failed to build filing client");
            std::process::exit(1);
        }
    };
    let state = web::Data::new(AppState {
        source: Arc::new(source),
        store: Arc::new(FsBlobStore::new(&settings.blob_root)),
    });

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(json_config())
            .route("/invoke", web::post().to(invoke))
            .route("/health", web::get().to(health))
    })
    .bind((settings.http_bind.as_str(), settings.http_port))?
    .run()
    .await
}
