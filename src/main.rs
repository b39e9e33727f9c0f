use mail_relay::known_servers;
use mail_relay::webhook::{self, UppercaseReply, WebhookState};
use mail_relay::{
    spawn_poller, Error, ImapSessionFactory, MailboxRelay, PhoneMatcher, RelayConfig,
    RelaySettings, WhatsAppClient,
};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mail_relay=info")),
        )
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, category = %e.category(), "mail-relay failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> mail_relay::Result<()> {
    let config = RelayConfig::from_env()?;
    info!(
        email = %config.imap.email(),
        imap_host = %config.imap.effective_imap_host(),
        known_provider = known_servers::is_known_provider(config.imap.email()),
        mailbox = %config.imap.mailbox,
        interval_secs = config.polling.interval.as_secs(),
        "Configuration loaded"
    );

    let notifier = Arc::new(WhatsAppClient::new(config.whatsapp.clone())?);
    let settings = RelaySettings {
        mailbox: config.imap.mailbox.clone(),
        recent_subjects: config.polling.recent_subjects,
    };
    let relay = Arc::new(MailboxRelay::new(
        Arc::new(ImapSessionFactory::new(config.imap.clone())),
        notifier.clone(),
        PhoneMatcher::new(),
        settings,
    ));

    let app = webhook::router(WebhookState::new(
        notifier,
        Arc::new(UppercaseReply),
        config.webhook.verify_token(),
    ));

    let bind_address = &config.webhook.bind_address;
    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(|source| Error::Server {
            addr: bind_address.clone(),
            source,
        })?;
    info!(addr = %bind_address, "Webhook listening");

    let poller = spawn_poller(
        relay,
        config.polling.trigger_token.clone(),
        config.polling.interval,
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            // if the handler cannot be installed, run until killed
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
            info!("Shutdown requested");
        })
        .await
        .map_err(|source| Error::Server {
            addr: bind_address.clone(),
            source,
        });

    poller.shutdown().await;
    info!("mail-relay stopped");
    served
}
