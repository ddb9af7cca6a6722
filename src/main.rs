use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tokio::sync::watch;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{fmt, EnvFilter};

use school_ops::config::{self, Environment};
use school_ops::database::DatabaseManager;
use school_ops::handlers;
use school_ops::middleware::pin_gate;
use school_ops::services::{spawn_maintenance_task, Report};
use school_ops::types::PinScope;

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up DATABASE_URL, SESSION_SECRET, etc.
    let _ = dotenvy::dotenv();

    init_tracing();

    let config = config::config();
    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {}", e);
        std::process::exit(2);
    }
    tracing::info!("Starting school-ops in {:?} mode", config.environment);

    if config.database.run_migrations {
        if let Err(e) = DatabaseManager::migrate().await {
            // Outside development a half-migrated schema is worse than not starting
            if config.environment != Environment::Development {
                tracing::error!("Migrations failed: {}", e);
                std::process::exit(1);
            }
            tracing::warn!("Migrations skipped: {}", e);
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let maintenance = config
        .attendance
        .enable_background_reconcile
        .then(|| spawn_maintenance_task(shutdown_rx));

    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("failed to bind {}: {}", bind_addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("school-ops listening on http://{}", bind_addr);

    let served = axum::serve(listener, app().into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await;
    if let Err(e) = served {
        tracing::error!("server error: {}", e);
    }

    let _ = shutdown_tx.send(true);
    if let Some(handle) = maintenance {
        let _ = handle.await;
    }
    DatabaseManager::close_all().await;
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    let result = match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => subscriber.json().try_init(),
        _ => subscriber.try_init(),
    };
    if let Err(e) = result {
        eprintln!("failed to init tracing: {}", e);
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }

    tracing::info!("shutdown signal received");
}

fn app() -> Router {
    let mut router = Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        .merge(pin_routes())
        .merge(kiosk_routes())
        // Staff PIN
        .merge(staff_routes())
        // Manager PIN
        .merge(manager_routes());

    if config::config().api.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }
    router.layer(cors_layer())
}

fn cors_layer() -> CorsLayer {
    let origins: Vec<_> = config::config()
        .security
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE, axum::http::header::AUTHORIZATION])
        .allow_credentials(true)
}

fn pin_routes() -> Router {
    use handlers::public::pin;

    Router::new()
        .route("/pin/:scope/unlock", post(pin::unlock))
        .route("/pin/:scope/status", get(pin::status))
        .route("/pin/:scope/session", delete(pin::lock))
}

fn kiosk_routes() -> Router {
    use handlers::public::kiosk;

    Router::new()
        .route("/kiosk/check-in", post(kiosk::check_in))
        .route("/kiosk/check-out", post(kiosk::check_out))
        .route("/kiosk/status/:kind/:person_id", get(kiosk::status))
}

fn staff_routes() -> Router {
    use handlers::protected::{attendance, reports};

    Router::new()
        .route("/api/attendance/open", get(attendance::open_sessions))
        .route("/api/attendance/reconcile", post(attendance::reconcile_now))
        .route("/api/attendance/:kind/:person_id/history", get(attendance::history))
        .route("/api/reports/freshness", get(reports::freshness))
        .route("/api/reports/:report", get(reports::report_get))
        .route_layer(from_fn_with_state(PinScope::Staff, pin_gate))
}

fn manager_routes() -> Router {
    use handlers::elevated::{payroll, pin};
    use handlers::protected::reports;

    Router::new()
        .route("/api/manage/reports/:report", get(reports::report_get))
        .route("/api/manage/payroll/approve", post(payroll::approve_day))
        .route("/api/manage/pin/:scope", put(pin::rotate))
        .route_layer(from_fn_with_state(PinScope::Manager, pin_gate))
}

async fn root() -> axum::response::Json<Value> {
    let version = env!("CARGO_PKG_VERSION");
    let reports: serde_json::Map<String, Value> = PinScope::ALL
        .into_iter()
        .map(|scope| (scope.to_string(), json!(Report::for_scope(scope).collect::<Vec<_>>())))
        .collect();

    axum::response::Json(json!({
        "success": true,
        "data": {
            "name": "school-ops",
            "version": version,
            "description": "Language-school operations backend: kiosks, attendance and PIN-gated dashboards",
            "endpoints": {
                "pin": "/pin/:scope/unlock, /pin/:scope/status, /pin/:scope/session (public - session acquisition)",
                "kiosk": "/kiosk/check-in, /kiosk/check-out, /kiosk/status/:kind/:person_id (public)",
                "attendance": "/api/attendance/* (staff PIN)",
                "reports": "/api/reports/:report, /api/reports/freshness (staff PIN)",
                "manage": "/api/manage/* (manager PIN)",
            },
            "scopes": PinScope::ALL,
            "reports": reports,
        }
    }))
}

async fn health() -> impl axum::response::IntoResponse {
    let now = chrono::Utc::now();

    match DatabaseManager::health_check().await {
        Ok(_) => (
            axum::http::StatusCode::OK,
            axum::response::Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => {
            tracing::warn!("health check failed: {}", e);
            (
                axum::http::StatusCode::SERVICE_UNAVAILABLE,
                axum::response::Json(json!({
                    "success": false,
                    "error": "database unavailable",
                    "data": {
                        "status": "degraded",
                        "timestamp": now,
                        "database": "unavailable"
                    }
                })),
            )
        }
    }
}
