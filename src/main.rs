use std::sync::Arc;

use meetfinder_server::auth::Sessions;
use meetfinder_server::config::Config;
use meetfinder_server::notify::MailApiNotifier;
use meetfinder_server::store::postgres::PgStore;
use meetfinder_server::web::{self, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Arc::new(Config::from_env()?);
    let state = AppState {
        store: Arc::new(PgStore::new(config.database_url.clone())),
        notifier: Arc::new(MailApiNotifier::new(
            config.mail_api_url.clone(),
            config.mail_from.clone(),
        )),
        sessions: Sessions::new(config.session_ttl),
        config: config.clone(),
    };

    tracing::info!(addr = %config.bind_addr, "listening");
    warp::serve(web::routes(state)).run(config.bind_addr).await;
    Ok(())
}
