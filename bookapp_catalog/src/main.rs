use std::sync::Arc;

use actix_web::middleware::from_fn;
use actix_web::web::{JsonConfig, PathConfig, QueryConfig};
use actix_web::{App, HttpServer};
use opentelemetry::global;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::runtime::TokioCurrentThread;
use paperclip::actix::OpenApiExt;
use tracing_actix_web::TracingLogger;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use bookapp_catalog::app_config::{config_app, CatalogServices};
use bookapp_catalog::auth::authentication_filter;
use bookapp_catalog::error::{json_error_handler, path_error_handler, query_error_handler};
use bookapp_catalog::repository::{
    InMemoryRepository, PostgresRepository, PostgresRepositoryConfig,
};
use bookapp_catalog::settings::Settings;

// Based on https://github.com/LukeMathWalker/tracing-actix-web/blob/main/examples/opentelemetry/src/main.rs#L15
fn init_telemetry() {
    let app_name = "bookapp_catalog";

    global::set_text_map_propagator(TraceContextPropagator::new());
    #[allow(deprecated)]
    let tracer = opentelemetry_jaeger::new_agent_pipeline()
        .with_service_name(app_name)
        .install_batch(TokioCurrentThread)
        .expect("Failed to install OpenTelemetry tracer.");

    // Tunable via `RUST_LOG` env variable
    let env_filter = EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new("info"));
    let telemetry = tracing_opentelemetry::layer().with_tracer(tracer);
    let formatting_layer = BunyanFormattingLayer::new(app_name.into(), std::io::stdout);
    let subscriber = Registry::default()
        .with(env_filter)
        .with(telemetry)
        .with(JsonStorageLayer)
        .with(formatting_layer);
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to install `tracing` subscriber.")
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();
    let settings = Settings::load().expect("Failed to load configuration");

    let services = if settings.database.use_in_memory {
        tracing::warn!("Using in memory repository, data is lost on restart");
        CatalogServices::new(
            &settings,
            Arc::new(InMemoryRepository::new(settings.catalog.isbn_scope)),
        )
    } else {
        let repository = PostgresRepository::init(PostgresRepositoryConfig {
            hostname: settings.database.host.clone(),
            username: settings.database.username.clone(),
            password: settings.database.password.clone(),
            isbn_scope: settings.catalog.isbn_scope,
        })
        .await
        .expect("Failed to init postgres");
        CatalogServices::new(&settings, Arc::new(repository))
    };

    tracing::info!(
        "starting HTTP server at http://{}:{}",
        settings.server.host,
        settings.server.port
    );

    HttpServer::new(move || {
        App::new()
            .wrap_api()
            .app_data(services.auth.clone())
            .app_data(services.users.clone())
            .app_data(services.genres.clone())
            .app_data(services.books.clone())
            .app_data(JsonConfig::default().error_handler(json_error_handler))
            .app_data(QueryConfig::default().error_handler(query_error_handler))
            .app_data(PathConfig::default().error_handler(path_error_handler))
            .wrap(from_fn(authentication_filter))
            .wrap(TracingLogger::default())
            .configure(config_app)
            .with_json_spec_at("/apispec/v2")
            .build()
    })
    .bind((settings.server.host.as_str(), settings.server.port))?
    .run()
    .await
}
