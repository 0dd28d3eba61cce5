//! Startup Wiring
//!
//! Every fallible startup step lives here and returns a typed error, so a
//! half-initialized process never starts serving.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use auth::{AeadTokenMaker, AuthAppState, PgUserDirectory, TokenError, auth_router};
use auth::domain::repository::UserDirectory;
use axum::Router;
use axum::http::{HeaderValue, Method, header};
use sqlx::postgres::PgPoolOptions;
use tasks::handlers::{LogMailer, MailError, Mailer, SendVerifyEmailHandler, SmtpMailer};
use tasks::{QueueError, RedisBroker, TaskDistributor, TaskMux, TaskProcessor, TaskQueue};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::lifecycle::{Coordinator, LifecycleError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Token key rejected: {0}")]
    Token(#[from] TokenError),

    #[error("Database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Task broker unavailable: {0}")]
    Broker(#[from] QueueError),

    #[error("Mailer misconfigured: {0}")]
    Mailer(#[from] MailError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// A fully initialized process, ready to serve
pub struct Application {
    listener: TcpListener,
    router: Router,
    processor: TaskProcessor<RedisBroker>,
    shutdown_grace: Duration,
}

pub async fn bootstrap(config: &AppConfig) -> Result<Application, StartupError> {
    // Key length and sender address are checked before any connection is opened
    let tokens = Arc::new(AeadTokenMaker::new(&config.token_symmetric_key)?);
    let smtp_mailer = match &config.smtp {
        Some(smtp) => Some(SmtpMailer::new(smtp, &config.mailer_from)?),
        None => None,
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    tracing::info!("Connected to database");

    sqlx::migrate!("../../../database/migrations")
        .run(&pool)
        .await?;
    tracing::info!("Migrations completed");

    let directory = Arc::new(PgUserDirectory::new(pool));

    // Producer and consumer each get their own connection
    let producer = Arc::new(RedisBroker::connect(&config.redis_address).await?);
    let consumer = Arc::new(RedisBroker::connect(&config.redis_address).await?);
    tracing::info!(address = %config.redis_address, "Connected to task broker");

    let mux = match smtp_mailer {
        Some(mailer) => {
            tracing::info!("Verification emails go out over SMTP");
            task_mux(directory.clone(), mailer, config)
        }
        None => {
            tracing::warn!("SMTP_HOST not set, verification emails are only logged");
            task_mux(directory.clone(), LogMailer::new(config.mailer_from.clone()), config)
        }
    };
    let processor = TaskProcessor::new(consumer, mux, config.processor_config());
    processor.start().await?;

    let state = AuthAppState {
        directory,
        queue: Arc::new(TaskDistributor::new(producer)),
        issuer: tokens.clone(),
        verifier: tokens,
        config: Arc::new(config.auth_config()),
    };
    let router = build_router(state, &config.frontend_origins);

    let listener = TcpListener::bind(config.http_addr)
        .await
        .map_err(|source| StartupError::Bind {
            addr: config.http_addr,
            source,
        })?;

    Ok(Application {
        listener,
        router,
        processor,
        shutdown_grace: config.shutdown_grace,
    })
}

fn task_mux<M>(directory: Arc<PgUserDirectory>, mailer: M, config: &AppConfig) -> TaskMux
where
    M: Mailer + Send + Sync + 'static,
{
    TaskMux::new().handle(SendVerifyEmailHandler::new(
        directory,
        Arc::new(mailer),
        config.verify_email_url.clone(),
        config.app_name.clone(),
    ))
}

/// Versioned routes plus tracing and CORS
pub fn build_router<D, Q>(state: AuthAppState<D, Q>, frontend_origins: &[String]) -> Router
where
    D: UserDirectory + Send + Sync + 'static,
    Q: TaskQueue + Send + Sync + 'static,
{
    let allowed_origins: Vec<HeaderValue> = frontend_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
        ]));

    Router::new()
        .nest("/v1/auth", auth_router(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

impl Application {
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve HTTP and the task processor until `signal` fires or either fails
    pub async fn run_until<S>(self, signal: S) -> Result<(), LifecycleError>
    where
        S: Future<Output = ()>,
    {
        let Application {
            listener,
            router,
            processor,
            shutdown_grace,
        } = self;

        let mut coordinator = Coordinator::new(shutdown_grace);

        let http_shutdown = coordinator.token();
        coordinator.spawn("http", async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(http_shutdown.cancelled_owned())
                .await
        });

        let worker_shutdown = coordinator.token();
        coordinator.spawn("task-processor", async move {
            processor.serve(worker_shutdown).await
        });

        coordinator.run(signal).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_short_key_fails_before_any_connection() {
        // Unroutable addresses: reaching them would hang or fail differently
        let config = AppConfig::from_lookup(|key| {
            match key {
                "DATABASE_URL" => Some("postgres://user@192.0.2.1:5432/none".to_string()),
                "REDIS_ADDRESS" => Some("192.0.2.1:6379".to_string()),
                "TOKEN_SYMMETRIC_KEY" => Some("too-short".to_string()),
                _ => None,
            }
        })
        .unwrap();

        let err = match bootstrap(&config).await {
            Ok(_) => panic!("bootstrap accepted a 9-byte key"),
            Err(e) => e,
        };
        assert!(matches!(
            err,
            StartupError::Token(TokenError::KeyMisconfigured {
                expected: 32,
                actual: 9
            })
        ));
    }

    #[tokio::test]
    async fn test_bad_sender_fails_before_any_connection() {
        let config = AppConfig::from_lookup(|key| {
            match key {
                "DATABASE_URL" => Some("postgres://user@192.0.2.1:5432/none".to_string()),
                "REDIS_ADDRESS" => Some("192.0.2.1:6379".to_string()),
                "TOKEN_SYMMETRIC_KEY" => Some("12345678901234567890123456789012".to_string()),
                "SMTP_HOST" => Some("192.0.2.1".to_string()),
                "MAILER_FROM" => Some("not an address".to_string()),
                _ => None,
            }
        })
        .unwrap();

        let err = match bootstrap(&config).await {
            Ok(_) => panic!("bootstrap accepted an invalid sender"),
            Err(e) => e,
        };
        assert!(matches!(
            err,
            StartupError::Mailer(MailError::InvalidAddress { .. })
        ));
    }
}
