use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use chrono::Utc;
use serde_json::Value;
use shared::blob::{BlobStore, FsBlobStore};
use shared::config::Settings;
use shared::error::StageError;
use shared::http::json_config;
use shared::mailer::{HttpMailer, Mailer};
use shared::openai_client::{HttpTextGenerator, TextGenerator};
use shared::stages::generate_brief;
use tracing::{error, info};

const MODEL_TIMEOUT: Duration = Duration::from_secs(120);
const MAIL_TIMEOUT: Duration = Duration::from_secs(30);

struct AppState {
    generator: Arc<dyn TextGenerator>,
    store: Arc<dyn BlobStore>,
    mailer: Arc<dyn Mailer>,
    default_region: String,
}

async fn health() -> impl Responder {
    "OK"
}

async fn invoke(
    event: web::Json<Value>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, StageError> {
    let today = Utc::now().date_naive();
    let receipt = generate_brief(
        &event,
        state.generator.clone(),
        state.store.as_ref(),
        state.mailer.as_ref(),
        today,
        &state.default_region,
    )
    .await
    .inspect_err(|e| error!(%e, "brief stage failed"))?;
    Ok(HttpResponse::Ok().json(receipt))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();
    info!("starting generate-brief service");

    let settings = match Settings::new() {
        Ok(s) => s,
        Err(e) => {
            error!(%e, "failed to load settings");
            std::process::exit(1);
        }
    };
    let generator = match HttpTextGenerator::new(
        &settings.openai_api_base,
        &settings.openai_api_key,
        MODEL_TIMEOUT,
    ) {
        Ok(g) => g,
        Err(e) => {
            error!(%e, "failed to build model client");
            std::process::exit(1);
        }
    };
    let mailer = match HttpMailer::new(
        settings.mail_relay_url.clone(),
        settings.mail_relay_token.clone(),
        MAIL_TIMEOUT,
    ) {
        Ok(m) => m,
        Err(e) => {
            error!(%e, "failed to build mail client");
            std::process::exit(1);
        }
    };
    let state = web::Data::new(AppState {
        generator: Arc::new(generator),
        store: Arc::new(FsBlobStore::new(&settings.blob_root)),
        mailer: Arc::new(mailer),
        default_region: settings.model_region.clone(),
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
