use std::sync::Arc;

use clinic_booking::booking::{BookingService, FixedOffsetClock};
use clinic_booking::config::Config;
use clinic_booking::db;
use clinic_booking::models::AppState;
use clinic_booking::notify::{
    ChangeNotifier, DisabledGateway, DisabledPush, FcmPushClient, HttpMessageGateway, LiveRegistry,
    MessageGateway, PushSender,
};
use clinic_booking::reminder::ReminderScheduler;
use clinic_booking::routes;
use clinic_booking::store::{BookingStore, PgStore};

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use axum::http::header;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = Config::from_env()?;
    let pool = db::connect_pg(&cfg.database_url).await?;

    let store: Arc<dyn BookingStore> = Arc::new(PgStore::new(pool.clone()));
    let clock = Arc::new(FixedOffsetClock::new(cfg.clinic_utc_offset_minutes));
    let live = Arc::new(LiveRegistry::new(cfg.live_send_timeout));

    let push: Arc<dyn PushSender> = match (&cfg.fcm_project_id, &cfg.fcm_access_token) {
        (Some(project), Some(token)) => Arc::new(FcmPushClient::new(project, token)),
        _ => Arc::new(DisabledPush),
    };
    let messages: Arc<dyn MessageGateway> = match &cfg.messaging_gateway_url {
        Some(url) => Arc::new(HttpMessageGateway::new(url)),
        None => Arc::new(DisabledGateway),
    };
    let notifier = ChangeNotifier::new(live.clone(), push, messages);

    let booking = Arc::new(BookingService::new(
        store.clone(),
        notifier.clone(),
        clock.clone(),
        cfg.booking_horizon_days,
    ));

    let reminders = Arc::new(ReminderScheduler::new(store, notifier, clock));
    reminders.spawn(cfg.reminder_interval);

    let state = AppState {
        db: pool,
        booking,
        live,
    };

    // Staff dashboards and the patient booking page are served from other origins.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
        ]);

    let app = routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on http://{}", cfg.bind_addr);
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
