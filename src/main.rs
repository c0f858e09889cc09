use std::{net::{IpAddr, SocketAddr}, sync::Arc, time::Duration};

use anyhow::Context;
use tokio::signal;
use tracing::{error, info};

use fieldops_api as api;
use api::clock::{SharedClock, SystemClock};
use api::notifications::{LoggingGateway, Notifier};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);
    api::handlers::health::init_start_time();

    let db_pool = api::db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to database")?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db = Arc::new(db_pool);

    let clock: SharedClock = Arc::new(SystemClock);
    let notifier = Notifier::spawn(
        Arc::new(LoggingGateway),
        cfg.notifications.channel_capacity,
    );
    let state = api::AppState::new(db, cfg.clone(), clock, notifier);

    // Rebuilds deadline timers from the database before traffic arrives.
    if cfg.dispatch.reconcile_interval_secs > 0 {
        let _reconcile = state
            .services
            .deadlines
            .spawn_reconcile_loop(Duration::from_secs(cfg.dispatch.reconcile_interval_secs));
    } else if let Err(e) = state.services.deadlines.reconcile().await {
        error!("Initial deadline reconcile failed: {}", e);
    }

    if cfg.compensation.weekly_cycle_enabled {
        info!(
            interval_secs = cfg.compensation.weekly_cycle_interval_secs,
            "weekly payout cycle enabled"
        );
        let processor = state.services.payouts.as_ref().clone();
        let _weekly = processor.spawn_weekly_cycle(Duration::from_secs(
            cfg.compensation.weekly_cycle_interval_secs.max(60),
        ));
    }

    let app = api::build_router(state);

    let ip: IpAddr = cfg
        .host
        .parse()
        .with_context(|| format!("invalid host address {}", cfg.host))?;
    let addr = SocketAddr::new(ip, cfg.port);
    info!("fieldops-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
