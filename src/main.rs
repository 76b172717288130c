use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use armory::config::Config;
use armory::db::{create_pool, seed::seed_catalogs, AppState};
use armory::email::{DisabledMailer, Mailer, ResendMailer};
use armory::handlers;
use armory::metrics::{ErrorMetrics, WebhookStats};
use armory::payments::StripeClient;
use armory::rate_limit::RateLimiter;
use armory::render::Renderer;

#[derive(Parser, Debug)]
#[command(name = "armory")]
#[command(about = "Personal firearm inventory with subscription billing")]
struct Cli {
    /// Seed the reference catalogs (weapon types, calibers, manufacturers)
    #[arg(long)]
    seed: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "armory=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let pool = create_pool(&config.database_path).expect("Failed to open database");

    if cli.seed {
        let conn = pool.get().expect("Failed to get db connection for seeding");
        seed_catalogs(&conn).expect("Failed to seed catalogs");
    }

    let mailer: Arc<dyn Mailer> = match ResendMailer::from_config(&config) {
        Some(mailer) => Arc::new(mailer),
        None => {
            tracing::warn!("RESEND_API_KEY not set, email delivery disabled");
            Arc::new(DisabledMailer)
        }
    };
    let stripe = config.stripe.as_ref().map(|c| Arc::new(StripeClient::new(c)));
    if stripe.is_none() {
        tracing::warn!("Stripe keys not set, running in test-mode checkout");
    }

    let addr = config.addr();
    let state = AppState {
        db: pool,
        config: Arc::new(config),
        mailer,
        renderer: Arc::new(Renderer),
        stripe,
        webhook_stats: Arc::new(WebhookStats::default()),
        error_metrics: Arc::new(ErrorMetrics::default()),
        login_limiter: Arc::new(RateLimiter::login()),
        recover_limiter: Arc::new(RateLimiter::recover()),
        webhook_limiter: Arc::new(RateLimiter::webhook()),
    };

    let app = handlers::router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind address");
    tracing::info!("Armory server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install ctrl-c handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
