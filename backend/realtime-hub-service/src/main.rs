use actix_middleware::{JwtAuthMiddleware, Logging, RequestIdMiddleware};
use actix_web::{web, App, HttpServer};
use db_pool::{create_pool, DbConfig};
use realtime_hub_service::{
    config, error, logging, routes,
    state::AppState,
    store::{ChatStore, InMemoryStore, PgStore},
};
use std::sync::Arc;

#[actix_web::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    let cfg = config::Config::from_env()?;

    let store: Arc<dyn ChatStore> = match &cfg.database_url {
        Some(url) => {
            let mut db_cfg = DbConfig::from_env("realtime-hub-service").unwrap_or_default();
            db_cfg.service_name = "realtime-hub-service".to_string();
            db_cfg.database_url = url.clone();
            db_cfg.log_config();

            let pool = create_pool(db_cfg)
                .await
                .map_err(|e| error::AppError::StartServer(format!("db: {e}")))?;
            let store = PgStore::new(pool);
            store.migrate().await?;
            tracing::info!("using PostgreSQL store");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store; data is lost on restart");
            Arc::new(InMemoryStore::new())
        }
    };

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    let cors_origin = cfg.cors_allowed_origin.clone();
    let state = AppState::new(store, cfg);
    let validator = state.validator.clone();

    tracing::info!(%bind_addr, "starting realtime-hub-service");

    HttpServer::new(move || {
        let cors = match &cors_origin {
            Some(origin) => actix_cors::Cors::default()
                .allowed_origin(origin)
                .allow_any_method()
                .allow_any_header()
                .max_age(3600),
            None => actix_cors::Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .max_age(3600),
        };

        App::new()
            .wrap(Logging)
            .wrap(RequestIdMiddleware)
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure_public)
            .service(
                web::scope("")
                    .wrap(JwtAuthMiddleware::new(validator.clone()))
                    .configure(routes::configure),
            )
    })
    .bind(&bind_addr)
    .map_err(|e| error::AppError::StartServer(format!("bind REST: {e}")))?
    .run()
    .await
    .map_err(|e| error::AppError::StartServer(format!("REST server: {e}")))
}
