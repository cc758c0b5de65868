use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use authns::cache::{spawn_invalidation_subscriber, RrCache};
use authns::cli::{Cli, Commands, SharedOpts};
use authns::config::ConfigFile;
use authns::dnssec::{spawn_key_automation, DnssecEngine};
use authns::query::QueryEngine;
use authns::ratelimit::{spawn_eviction_task, RateLimiter};
use authns::servers::{spawn_workers, tcp_server, tls_server, udp_server, Servers};
use authns::store::{MemoryZoneStore, ZoneStore};
use authns::transfer::TransferEngine;
use authns::update::UpdateEngine;
use authns::web::doh_server;
use authns::wire::BufferPool;
use authns::zonefile::load_into_store;

/// How many UDP receive loops share the socket via SO_REUSEPORT.
const UDP_LISTENERS: usize = 4;
/// WireBuffers preallocated in the pool.
const BUFFER_POOL_SIZE: usize = 64;

fn init_logging(config: &ConfigFile, debug: bool) {
    let level = if debug {
        "debug".to_string()
    } else {
        config.log_level.to_ascii_lowercase()
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("authns={level},info")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(sopt: &SharedOpts) -> Result<ConfigFile, ExitCode> {
    match ConfigFile::try_from_path(sopt.config.as_ref()) {
        Ok(config) => Ok(config),
        Err(error) => {
            eprintln!("Failed to load configuration: {error}");
            Err(ExitCode::from(1))
        }
    }
}

async fn run_server(sopt: SharedOpts) -> ExitCode {
    let config = match load_config(&sopt) {
        Ok(config) => config,
        Err(code) => return code,
    };
    init_logging(&config, sopt.debug);

    if let Err(errors) = config.check_config() {
        for line in errors {
            error!("config check: {line}");
        }
        return ExitCode::from(1);
    }

    let config_cell = match ConfigFile::try_as_cowcell(sopt.config.as_ref()) {
        Ok(cell) => cell,
        Err(error) => {
            error!("Failed to load configuration: {error}");
            return ExitCode::from(1);
        }
    };

    let store: Arc<dyn ZoneStore> = Arc::new(MemoryZoneStore::new());

    if let Some(zone_file) = &config.zone_file {
        match std::fs::read_to_string(zone_file) {
            Ok(contents) => {
                match load_into_store(store.as_ref(), &contents, None, &config.tenant_id).await {
                    Ok(zone) => info!("imported zone {} from {zone_file}", zone.name),
                    Err(error) => {
                        error!("failed to import {zone_file}: {error}");
                        return ExitCode::from(1);
                    }
                }
            }
            Err(error) => {
                error!("failed to read {zone_file}: {error}");
                return ExitCode::from(1);
            }
        }
    }

    // the remote cache is optional and the server degrades to L1-only when
    // it is down
    let mut l2 = None;
    if let Some(addr) = &config.remote_cache_addr {
        match redis::Client::open(addr.as_str()) {
            Ok(client) => match client.get_connection_manager().await {
                Ok(manager) => l2 = Some((client, manager)),
                Err(error) => warn!("remote cache unavailable, L1 only: {error}"),
            },
            Err(error) => warn!("bad remote_cache_addr, L1 only: {error}"),
        }
    }

    let cache = Arc::new(RrCache::new(
        Duration::from_secs(config.cache_l1_default_ttl),
        l2.as_ref().map(|(_, manager)| manager.clone()),
    ));
    if let Some((client, _)) = l2 {
        spawn_invalidation_subscriber(cache.clone(), client);
    }

    let limiter = Arc::new(RateLimiter::new(
        config.rate_limiter_burst,
        config.rate_limiter_sustain,
    ));
    spawn_eviction_task(limiter.clone());

    let dnssec = Arc::new(DnssecEngine::new(store.clone()));
    spawn_key_automation(dnssec.clone(), store.clone());

    let keyring = match config.tsig_keyring() {
        Ok(keyring) => Arc::new(keyring),
        Err(error) => {
            error!("TSIG keyring: {error}");
            return ExitCode::from(1);
        }
    };

    let transfer = TransferEngine::new(
        store.clone(),
        config.hostname.clone(),
        config.notify_port_override,
    );
    let update = UpdateEngine::new(store.clone(), cache.clone(), keyring, transfer.clone());
    let engine = Arc::new(QueryEngine::new(
        store,
        cache,
        limiter,
        BufferPool::new(BUFFER_POOL_SIZE),
        dnssec,
        update,
        transfer,
    ));

    let (queue_tx, queue_rx) = mpsc::channel(config.udp_queue_depth);
    let workers = spawn_workers(config.effective_worker_count(), queue_rx, engine.clone());

    let mut udpservers = vec![];
    for _ in 0..UDP_LISTENERS {
        let read_txn = config_cell.read().await;
        udpservers.push(tokio::spawn(udp_server(read_txn, queue_tx.clone())));
    }

    let mut servers = Servers::default()
        .with_udpservers(udpservers)
        .with_workers(workers)
        .with_tcpserver(tokio::spawn(tcp_server(
            config_cell.read().await,
            engine.clone(),
        )));

    if config.enable_tls {
        servers = servers.with_tlsserver(tokio::spawn(tls_server(
            config_cell.read().await,
            engine.clone(),
        )));
    }
    if config.enable_doh {
        servers = servers.with_dohserver(tokio::spawn(doh_server(
            config_cell.read().await,
            engine.clone(),
        )));
    }

    info!(
        "authns serving on {} with {} workers",
        config.listen_addr,
        config.effective_worker_count()
    );

    // a listener falling over is fatal; the orchestrator restarts us
    loop {
        tokio::time::sleep(Duration::from_secs(1)).await;
        if servers.any_finished() {
            error!("a listener stopped, shutting down");
            return ExitCode::from(1);
        }
    }
}

async fn run_config_check(sopt: SharedOpts) -> ExitCode {
    let config = match load_config(&sopt) {
        Ok(config) => config,
        Err(code) => return code,
    };
    match config.check_config() {
        Ok(()) => {
            match config.as_json_pretty() {
                Ok(json) => println!("{json}"),
                Err(error) => eprintln!("config loaded but failed to serialize: {error}"),
            }
            ExitCode::SUCCESS
        }
        Err(errors) => {
            for line in errors {
                eprintln!("config check: {line}");
            }
            ExitCode::from(1)
        }
    }
}

async fn run_import_zones(sopt: SharedOpts, filename: String, zone: Option<String>) -> ExitCode {
    let config = match load_config(&sopt) {
        Ok(config) => config,
        Err(code) => return code,
    };
    init_logging(&config, sopt.debug);

    let contents = match std::fs::read_to_string(&filename) {
        Ok(value) => value,
        Err(error) => {
            eprintln!("failed to read {filename}: {error}");
            return ExitCode::from(1);
        }
    };
    let store = MemoryZoneStore::new();
    match load_into_store(&store, &contents, zone.as_deref(), &config.tenant_id).await {
        Ok(imported) => {
            let records = store
                .list_records_for_zone(imported.id)
                .await
                .map(|r| r.len())
                .unwrap_or_default();
            println!("parsed zone {} with {records} records", imported.name);
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("failed to import {filename}: {error}");
            ExitCode::from(1)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command.unwrap_or_default() {
        Commands::Server { sopt } => run_server(sopt).await,
        Commands::ConfigCheck { sopt } => run_config_check(sopt).await,
        Commands::ImportZones {
            sopt,
            filename,
            zone,
        } => run_import_zones(sopt, filename, zone).await,
    }
}
