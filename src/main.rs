use async_trait::async_trait;
use futures::StreamExt;
use mimalloc::MiMalloc;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use vigil::auth::{
    DefaultExpiryPolicy, HttpExecutor, HttpRefreshCall, MemoryTokenStore, RefreshCoordinator,
    SessionListener, TokenStore, build_http_client,
};
use vigil::error::{AuthError, VigilError};
use vigil::progress::{HttpStatusQuery, MonitorOptions, TaskProgressMonitor};
use vigil::{TaskStatus, TokenPair};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Drops the session once refreshing is no longer possible.
struct ClearSessionOnExpiry {
    store: Arc<MemoryTokenStore>,
}

#[async_trait]
impl SessionListener for ClearSessionOnExpiry {
    async fn on_session_expired(&self, error: &AuthError) {
        warn!(error = %error, "Session expired; clearing stored tokens");
        self.store.clear().await;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = &vigil::config::CONFIG;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.basic.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_level(true)
                .with_target(false),
        )
        .init();

    let Some(task_id) = std::env::args().nth(1) else {
        error!("usage: vigil <task-id>");
        return Err(VigilError::UnexpectedError("missing task id argument".to_string()).into());
    };

    info!(
        api_url = %cfg.basic.api_url,
        proxy = %cfg.basic.proxy.as_ref().map(|u| u.as_str()).unwrap_or("<none>"),
        loglevel = %cfg.basic.loglevel,
        refresh_path = %cfg.auth.refresh_path,
        progress_path = %cfg.monitor.progress_path,
        has_access_token = cfg.auth.access_token.is_some(),
        has_refresh_token = cfg.auth.refresh_token.is_some(),
    );

    let seed = match (&cfg.auth.access_token, &cfg.auth.refresh_token) {
        (None, None) => None,
        (access, refresh) => Some(TokenPair::new(
            access.clone().unwrap_or_default(),
            refresh.clone().unwrap_or_default(),
        )),
    };
    let store = Arc::new(MemoryTokenStore::new(seed));

    let client = build_http_client(&cfg.basic)?;
    let coordinator = RefreshCoordinator::builder(
        cfg.basic.api_url.clone(),
        store.clone(),
        Arc::new(HttpExecutor::new(client.clone())),
        Arc::new(HttpRefreshCall::from_config(client, cfg)?),
    )
    .policy(Arc::new(DefaultExpiryPolicy::from_config(&cfg.auth)))
    .session_listener(Arc::new(ClearSessionOnExpiry {
        store: store.clone(),
    }))
    .build();

    let query = HttpStatusQuery::from_config(coordinator, &cfg.monitor);
    let monitor = TaskProgressMonitor::new(Arc::new(query));
    let mut progress = monitor.start(task_id.clone(), MonitorOptions::from_config(&cfg.monitor));

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let result = loop {
        let item = tokio::select! {
            _ = &mut shutdown => {
                info!(task_id = %task_id, "Shutdown requested; stopping monitor");
                progress.stop();
                break Ok(());
            }
            item = progress.next() => item,
        };

        match item {
            Some(Ok(update)) => {
                info!(
                    task_id = %update.task_id,
                    status = ?update.status,
                    stage = ?update.stage,
                    percentage = update.percentage,
                    eta = ?update.eta,
                    message = %update.message,
                    "Progress"
                );
                match update.status {
                    TaskStatus::Completed => {
                        if let Some(doc) = update.result.as_ref() {
                            info!(document_id = %doc.id, title = %doc.title, "Generation completed");
                        }
                        break Ok(());
                    }
                    TaskStatus::Failed => {
                        break Err(VigilError::UnexpectedError(format!(
                            "task {task_id} failed: {}",
                            update.error.as_deref().unwrap_or("no reason given")
                        )));
                    }
                    TaskStatus::Queued | TaskStatus::Processing => {}
                }
            }
            Some(Err(e)) => {
                error!(task_id = %task_id, error = %e, "Monitoring stopped with an error");
                break Err(VigilError::Task(e));
            }
            None => break Ok(()),
        }
    };

    Ok(result?)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
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
}
