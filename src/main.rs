use {
    axum::{
        Router,
        extract::DefaultBodyLimit,
        routing::{get, post},
    },
    sqlx::postgres::PgPoolOptions,
    std::{env, sync::Arc, time::Duration},
    sub_sync::{
        AppState,
        adapters::{signature::SignatureVerifier, stripe::StripeProvider, webhook},
        services::janitor,
    },
    tokio::{signal, sync::watch},
    tower_http::timeout::TimeoutLayer,
};

fn env_i64(name: &str, default: i64) -> i64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    dotenvy::dotenv().ok();
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let webhook_secret =
        env::var("STRIPE_WEBHOOK_SECRET").expect("STRIPE_WEBHOOK_SECRET must be set");
    let stripe_secret_key = env::var("STRIPE_SECRET_KEY").expect("STRIPE_SECRET_KEY must be set");

    let signature_tolerance_secs = env_i64("SIGNATURE_TOLERANCE_SECS", 300);
    let max_event_age_secs = env_i64("MAX_EVENT_AGE_SECS", 600);
    let ledger_stale_secs = env_i64("LEDGER_STALE_SECS", 120);
    let ledger_retention_days = env_i64("LEDGER_RETENTION_DAYS", 30) as i32;
    let port = env_i64("PORT", 3000);

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(3))
        .connect(&database_url)
        .await
        .expect("failed to connect to database");

    let state = AppState {
        pool: pool.clone(),
        verifier: Arc::new(SignatureVerifier::new(
            webhook_secret,
            signature_tolerance_secs,
        )),
        provider: Arc::new(StripeProvider::new(&stripe_secret_key)),
        max_event_age_secs,
        ledger_stale_secs,
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let janitor_handle = tokio::spawn(janitor::run_janitor(
        pool.clone(),
        ledger_retention_days,
        shutdown_rx,
    ));

    let app = Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/webhooks/stripe", post(webhook::ingress_handler))
        .route(
            "/webhooks/stripe/replay/{event_id}",
            post(webhook::replay_handler),
        )
        .layer(DefaultBodyLimit::max(64 * 1024)) // 64 KB — Stripe events are typically <20 KB
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .unwrap();
    tracing::info!("listening on 0.0.0.0:{port}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    shutdown_tx.send(true).ok();
    janitor_handle.await.ok();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl+c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
