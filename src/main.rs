use std::process::ExitCode;
use std::sync::Arc;

use tokio::sync::watch;

use crate::commands::CommandContext;
use crate::config::MonitorConfig;
use crate::confirm::Confirmations;
use crate::llm::LlmClient;
use crate::monitor::dispatcher::{Dispatcher, NotificationSink};
use crate::monitor::scheduler::PollingScheduler;
use crate::monitor::store::FleetStore;
use crate::runtime::ContainerRuntime;
use crate::runtime::docker::DockerRuntime;
use crate::webhook::WebhookSink;

mod api;
mod cli;
mod commands;
mod config;
mod confirm;
mod llm;
mod monitor;
mod render;
mod runtime;
mod signals;
mod webhook;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    // Initialize the logger
    env_logger::init();

    let args = cli::get_cli_args();
    let config = match MonitorConfig::try_init(&args.config) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Unable to load config {:?}: {e}", args.config);
            return ExitCode::FAILURE;
        }
    };

    if args.check_config {
        println!("{}", config.summary());
        return ExitCode::SUCCESS;
    }

    let runtime: Arc<dyn ContainerRuntime> = match DockerRuntime::connect() {
        Ok(runtime) => Arc::new(runtime),
        Err(e) => {
            log::error!("Unable to create a Docker client: {e}");
            return ExitCode::FAILURE;
        }
    };

    let http = match reqwest::Client::builder()
        .user_agent(concat!("homelab-monitor/", env!("CARGO_PKG_VERSION")))
        .build()
    {
        Ok(http) => http,
        Err(e) => {
            log::error!("Unable to create an HTTP client: {e}");
            return ExitCode::FAILURE;
        }
    };

    let sink = config.notifications.webhook_url().map(|url| {
        Arc::new(WebhookSink::new(
            http.clone(),
            url,
            config.notifications.timeout(),
        )) as Arc<dyn NotificationSink>
    });
    let dispatcher = Dispatcher::new(sink);
    let store = Arc::new(FleetStore::new());

    let scheduler = Arc::new(PollingScheduler::new(
        Arc::clone(&runtime),
        Arc::clone(&store),
        dispatcher.clone(),
        config.poll_interval(),
    ));
    let scheduler = match scheduler.start().await {
        Ok(handle) => handle,
        Err(e) => {
            log::error!("Unable to start polling: {e}");
            return ExitCode::FAILURE;
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    if let Err(e) = signals::handle_shutdown(shutdown_tx) {
        log::error!("Unable to register signal handlers: {e}");
        scheduler.stop().await;
        return ExitCode::FAILURE;
    }

    let commands = CommandContext {
        store: Arc::clone(&store),
        runtime,
        confirmations: Confirmations::new(config.confirm.timeout()),
        llm: config
            .llm
            .as_ref()
            .and_then(|llm| LlmClient::from_config(http.clone(), llm)),
        prefix: config.api.prefix.clone(),
    };

    let _ = sd_notify::notify(false, &[sd_notify::NotifyState::Ready]);
    if dispatcher.is_configured() {
        dispatcher
            .announce(&format!(
                "🟢 **Homelab monitor online**, watching {} containers",
                store.current().containers.len()
            ))
            .await;
    }

    let exit = match api::serve(
        commands,
        config.api.token().map(str::to_string),
        config.api.listen,
        shutdown_rx,
    )
    .await
    {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Command API failed: {e}");
            ExitCode::FAILURE
        }
    };

    log::info!("Stopping scheduler ({:?})", scheduler.status());
    scheduler.stop().await;
    exit
}
