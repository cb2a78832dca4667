use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use toloni_backend::{
    AppState, Backends,
    auth::{HttpMailer, LogMailer, Mailer},
    cache::{RedisAttemptStore, RedisSessionStore},
    clock::SystemClock,
    config::Config,
    database::{PgReportStore, PgTrophyStore, PgUserStore},
    routes,
    trophy::{events::run_worker, run_monthly_reset},
};
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!("Starting in {:?} mode", config.environment);

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'toloni_backend';")
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");

    let redis = Arc::new(
        redis::Client::open(config.redis_url.clone()).expect("Failed to create Redis client"),
    );

    let mailer: Arc<dyn Mailer> = match &config.mail_api_url {
        Some(url) => Arc::new(
            HttpMailer::new(url.clone(), config.mail_api_key.clone(), config.mail_from.clone())
                .expect("Failed to build mail client"),
        ),
        None => {
            tracing::warn!("MAIL_API_URL is not set, emails will only be logged");
            Arc::new(LogMailer)
        }
    };

    let backends = Backends {
        users: Arc::new(PgUserStore::new(pool.clone())),
        sessions: Arc::new(RedisSessionStore::new(redis.clone())),
        attempts: Arc::new(RedisAttemptStore::new(redis)),
        reports: Arc::new(PgReportStore::new(pool.clone())),
        trophies: Arc::new(PgTrophyStore::new(pool)),
        mailer,
        clock: Arc::new(SystemClock),
    };
    let (state, events_rx) = AppState::new(config.clone(), backends);

    tokio::spawn(run_worker(state.trophies.clone(), events_rx));
    if config.trophy_cron_enabled {
        tokio::spawn(run_monthly_reset(state.trophies.clone()));
    } else {
        tracing::info!("Monthly trophy reset scheduler disabled");
    }

    let router = routes::router(state);

    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding permissive CORS layer for debug build");
        router.layer(CorsLayer::permissive())
    };
    #[cfg(not(debug_assertions))]
    let router = router.layer(
        CorsLayer::new()
            .allow_origin(
                config
                    .app_base_url
                    .parse::<axum::http::HeaderValue>()
                    .expect("APP_BASE_URL is not a valid origin"),
            )
            .allow_credentials(true)
            .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
            .allow_headers([axum::http::header::CONTENT_TYPE]),
    );

    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
