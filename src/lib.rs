pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod payments;
pub mod ports;
pub mod services;
pub mod startup;
pub mod utils;
pub mod validation;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::adapters::PostgresStore;
use crate::config::Config;
use crate::payments::PaymentProvider;
use crate::ports::Store;
use crate::services::{
    LedgerService, PricingSettings, PromoCodeService, SettlementService, WithdrawalService,
};

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Arc<Config>,
    pub settlement: Arc<SettlementService>,
    pub ledger: Arc<LedgerService>,
    pub withdrawals: Arc<WithdrawalService>,
    pub promo_codes: Arc<PromoCodeService>,
}

impl AppState {
    pub fn new(db: sqlx::PgPool, config: Config, provider: Arc<dyn PaymentProvider>) -> Self {
        let store: Arc<dyn Store> = Arc::new(PostgresStore::new(db.clone()));
        Self::with_store(db, config, store, provider)
    }

    /// Wires the services over an arbitrary store. The pool still backs the
    /// read-only listing endpoints and `/health`.
    pub fn with_store(
        db: sqlx::PgPool,
        config: Config,
        store: Arc<dyn Store>,
        provider: Arc<dyn PaymentProvider>,
    ) -> Self {
        let pricing = PricingSettings::from(&config);
        let currency = config.currency.clone();

        Self {
            db,
            settlement: Arc::new(SettlementService::new(store.clone(), provider, pricing)),
            ledger: Arc::new(LedgerService::new(store.clone())),
            withdrawals: Arc::new(WithdrawalService::new(store.clone(), currency)),
            promo_codes: Arc::new(PromoCodeService::new(store)),
            config: Arc::new(config),
        }
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins()
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(middleware::auth::USER_ID_HEADER),
        ])
}

pub fn create_app(state: AppState) -> Router {
    let admin = Router::new()
        .route("/transactions", get(handlers::transactions::list_transactions))
        .route("/transactions/export", get(handlers::export::export_transactions))
        .route("/transactions/:id", get(handlers::admin::get_transaction))
        .route("/transactions/:id/refund", post(handlers::admin::refund_transaction))
        .route(
            "/promo-codes",
            get(handlers::admin::list_promo_codes).post(handlers::admin::create_promo_code),
        )
        .route(
            "/promo-codes/:id",
            get(handlers::admin::get_promo_code).delete(handlers::admin::delete_promo_code),
        )
        .route("/promo-codes/:id/toggle", post(handlers::admin::toggle_promo_code))
        .route("/withdrawals", get(handlers::admin::list_withdrawals))
        .route("/withdrawals/:id/approve", post(handlers::admin::approve_withdrawal))
        .route("/withdrawals/:id/reject", post(handlers::admin::reject_withdrawal))
        .route("/withdrawals/:id/process", post(handlers::admin::process_withdrawal))
        .route("/audit-logs/:entity_id", get(handlers::admin::get_audit_logs))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::admin_auth,
        ));

    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api-docs/openapi.json", get(handlers::openapi::openapi_json))
        .route("/promo-codes/validate", post(handlers::promo::validate_promo_code))
        .route("/checkout", post(handlers::checkout::create_checkout))
        .route("/payments/callback", post(handlers::webhook::payment_callback))
        .route("/me/transactions", get(handlers::transactions::list_my_transactions))
        .route("/me/withdrawals", post(handlers::withdrawals::request_withdrawal))
        .nest("/admin", admin)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::request_logger_middleware,
        ))
        .layer(cors)
        .with_state(state)
}
