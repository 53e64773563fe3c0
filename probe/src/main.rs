#![deny(unused_must_use)]

mod alt_ip;
mod config;
mod connection;
mod dispatcher;
mod error;
mod executors;
mod http_engine;
mod identity;
mod jobs;
mod logs_transport;
mod parsers;
mod private_ip;
mod progress_buffer;
mod resolver;
mod restart;
mod status;
mod stats;
mod update;

use connection::Incoming;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() {
    let config = config::Config::load_or_default();
    let identity = identity::Identity::load();

    let logs_transport = logs_transport::LogsTransport::new();
    init_tracing(logs_transport.clone());

    tracing::info!(uuid = %identity.uuid, version = identity::VERSION, "probe starting");

    let (status_manager, mut status_updates) = status::StatusManager::new();
    tokio::spawn(status_manager.clone().run());

    let development = std::env::var("NODE_ENV").map(|v| v == "development").unwrap_or(false);
    tokio::spawn(update::run(
        config.update.release_url.clone(),
        Duration::from_secs(config.update.interval_secs),
        Duration::from_secs(config.update.max_deviation_secs),
        development,
    ));
    tokio::spawn(restart::run(
        Duration::from_secs(config.uptime.interval_secs),
        Duration::from_secs(config.uptime.max_deviation_secs),
        Duration::from_secs(config.uptime.max_uptime_secs),
        development,
    ));

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("failed to install SIGTERM handler");

    loop {
        let handshake_query = identity.handshake_query();
        let connect_result = connection::connect_once(&config.api.host, &handshake_query).await;

        let (handle, mut incoming) = match connect_result {
            Ok(v) => v,
            Err(e) => {
                let class = connection::classify_connect_error(&e);
                tracing::warn!(error = %e, "connect failed");
                match connection::reconnect_delay(class) {
                    Some(delay) => {
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    None => {
                        tracing::error!("invalid probe version, exiting for supervisor restart");
                        return;
                    }
                }
            }
        };

        logs_transport.set_connected(true);
        let jobs = jobs::JobTable::new();
        tokio::spawn(jobs.clone().run_sweep());
        tokio::spawn(stats::run(
            handle.clone(),
            jobs.clone(),
            Duration::from_secs(config.stats.interval_secs),
        ));
        tokio::spawn(run_logs_flush(handle.clone(), logs_transport.clone()));

        let alt_ip_client = Arc::new(alt_ip::AltIpClient::new(
            config.api.http_host.clone(),
            handshake_query.fake_ip.clone().unwrap_or_default(),
        ));
        tokio::spawn(run_alt_ip_loop(handle.clone(), alt_ip_client));

        let mut disconnect_reason: Option<String> = None;

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    status_manager.stop_sigterm();
                    drain_and_exit(jobs.clone()).await;
                    return;
                }
                Some(status) = status_updates.recv() => {
                    handle.emit("probe:status:update", serde_json::to_value(status).unwrap_or_default());
                }
                event = incoming.recv() => {
                    match event {
                        Some(Incoming::Connect) => {
                            handle.emit("probe:status:update", serde_json::to_value(status_manager.current()).unwrap_or_default());
                            if let Ok(token) = std::env::var("ADOPTION_TOKEN") {
                                handle.emit("probe:adoption:token", serde_json::json!(token));
                            }
                            tracing::info!("connected to control plane");
                        }
                        Some(Incoming::Disconnect { reason }) => {
                            tracing::warn!(%reason, "disconnected");
                            disconnect_reason = Some(reason);
                            break;
                        }
                        Some(Incoming::ConnectError { message }) => {
                            tracing::warn!(%message, "connect error");
                            disconnect_reason = Some(message);
                            break;
                        }
                        Some(Incoming::Location(data)) => tracing::info!(?data, "geoip info"),
                        Some(Incoming::Adoption(data)) => tracing::info!(?data, "adoption hint"),
                        Some(Incoming::AltIpsToken(_data)) => {
                            // delegated to the alt-ip loop (spec §4.G)
                        }
                        Some(Incoming::MeasurementRequest(data)) => {
                            dispatcher::handle_measurement_request(
                                data,
                                handle.clone(),
                                jobs.clone(),
                                status_manager.clone(),
                            ).await;
                        }
                        Some(Incoming::Sigkill) => {
                            tracing::warn!("probe:sigkill received, exiting immediately");
                            return;
                        }
                        Some(Incoming::AdoptionCode(data)) => {
                            tracing::info!(?data, "adoption code");
                        }
                        Some(Incoming::Ack { .. }) | Some(Incoming::Unknown) => {}
                        None => {
                            disconnect_reason = Some("channel closed".to_string());
                            break;
                        }
                    }
                }
            }
        }

        logs_transport.set_connected(false);
        let class = disconnect_reason
            .as_deref()
            .map(connection::classify_connect_error)
            .unwrap_or(connection::ErrorClass::Default);
        match connection::reconnect_delay(class) {
            Some(delay) => tokio::time::sleep(delay).await,
            None => return,
        }
    }
}

async fn run_logs_flush(handle: Arc<connection::ConnectionHandle>, transport: Arc<logs_transport::LogsTransport>) {
    loop {
        tokio::time::sleep(transport.send_interval()).await;
        let Some((payload, dropped_at_send)) = transport.snapshot() else {
            continue;
        };
        let present_in_payload = payload.logs.len();
        let ack = handle.emit_with_ack("probe:logs", serde_json::to_value(&payload).unwrap_or_default()).await;
        if let Ok(value) = ack {
            if value.as_str() == Some("success") {
                transport.reconcile_ack(present_in_payload, dropped_at_send);
            }
        }
    }
}

async fn run_alt_ip_loop(handle: Arc<connection::ConnectionHandle>, client: Arc<alt_ip::AltIpClient>) {
    let mut previous: Option<alt_ip::AltIpReport> = None;
    let mut ticker = tokio::time::interval(client.tick_interval());
    loop {
        ticker.tick().await;
        let (accepted, failed) = client.attest_all().await;
        let entries: Vec<common::AltIpEntry> = accepted
            .iter()
            .map(|(ip, token)| common::AltIpEntry(ip.clone(), token.clone()))
            .collect();

        let ack = handle
            .emit_with_ack("probe:alt-ips", serde_json::to_value(&entries).unwrap_or_default())
            .await;
        let server_ack: common::AltIpsAck = ack
            .ok()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        let report = client.reconcile(&accepted, failed, server_ack);
        if previous.as_ref() != Some(&report) {
            tracing::info!(ips = ?report.current_ips, "alt-ip set changed");
            previous = Some(report);
        }
    }
}

async fn drain_and_exit(jobs: Arc<jobs::JobTable>) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(60);
    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    loop {
        ticker.tick().await;
        if jobs.is_empty().await || tokio::time::Instant::now() >= deadline {
            return;
        }
    }
}

fn init_tracing(logs_transport: Arc<logs_transport::LogsTransport>) {
    let level = std::env::var("GP_LOG_LEVEL")
        .or_else(|_| std::env::var("LOG_LEVEL"))
        .unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_new(&level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let logs_layer = logs_transport::LogsLayer::new(logs_transport);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(logs_layer)
        .init();
}
