use ap_admission::{AccessPoint, ApEvent, AuditLogger, Config, dry_run};
use clap::Parser;
use std::process;
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Station admission engine for an 802.11 access point
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "ap-admissiond")]
struct Cli {
    /// Path to configuration file
    #[arg(value_name = "CONFIG", default_value = "ap-admission.json")]
    config_path: String,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

/// How long to sleep when no timer is pending
const IDLE_WAIT: Duration = Duration::from_secs(3600);

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::from_file(&cli.config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing_subscriber::registry()
                .with(EnvFilter::new("info"))
                .with(tracing_subscriber::fmt::layer())
                .init();

            if cli.validate {
                eprintln!("Configuration validation failed!");
                eprintln!("   Error: {}", e);
                process::exit(1);
            }

            warn!("Could not load config file from {}: {}", cli.config_path, e);
            info!("Creating example configuration at: {}", cli.config_path);

            if let Err(e) = Config::example().to_file(&cli.config_path) {
                error!("Error creating example config: {}", e);
                process::exit(1);
            }

            info!("Please edit {} and restart", cli.config_path);
            process::exit(0);
        }
    };

    if cli.validate {
        println!("Configuration validated successfully!");
        println!();
        println!("Configuration summary:");
        println!("  Interface: {}", config.interface);
        println!("  SSID: {}", config.ssid);
        println!("  MAC ACL policy: {:?}", config.macaddr_acl);
        println!("  Accept list: {}", config.accept_mac.len());
        println!("  Deny list: {}", config.deny_mac.len());
        println!("  Max stations: {}", config.max_num_sta);
        println!("  Dynamic VLAN: {:?}", config.dynamic_vlan);
        println!("  VLANs: {}", config.vlans.len());
        if let Some(ref radius) = config.radius {
            println!("  RADIUS server: {}", radius.server);
        }
        if let Some(ref path) = config.audit_log_path {
            println!("  Audit log: {}", path);
        }
        process::exit(0);
    }

    let log_level = config.log_level.as_deref().unwrap_or("info");
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("AP admission engine v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded configuration from: {}", cli.config_path);

    let audit = match AuditLogger::new(config.audit_log_path.clone()) {
        Ok(logger) => logger,
        Err(e) => {
            error!("Failed to open audit log: {}", e);
            process::exit(1);
        }
    };
    if let Some(path) = audit.file_path() {
        info!("Audit logging enabled: {}", path);
    }

    let secret = config.radius.as_ref().map(|r| r.secret.clone());
    let sweep_interval = Duration::from_secs(config.acl_sweep_interval);
    let mut ap = AccessPoint::new(config, dry_run::backends(secret.as_deref())).with_audit(audit);

    let mut sweep = time::interval(sweep_interval);
    sweep.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("Engine running, press Ctrl+C to stop");
    loop {
        let wake = ap
            .next_deadline()
            .map(Instant::from_std)
            .unwrap_or_else(|| Instant::now() + IDLE_WAIT);

        tokio::select! {
            _ = sweep.tick() => {
                ap.sweep_expired(Instant::now().into_std());
            }
            _ = time::sleep_until(wake) => {
                ap.handle_timers(Instant::now().into_std());
            }
            result = &mut shutdown => {
                if let Err(e) = result {
                    error!("Failed to listen for shutdown signal: {}", e);
                }
                break;
            }
        }

        log_events(ap.take_events());
    }

    info!("Shutting down");
    ap.shutdown(Instant::now().into_std());
    log_events(ap.take_events());
}

fn log_events(events: Vec<ApEvent>) {
    for event in events {
        match event {
            ApEvent::DisassociateIndication { addr, reason } => {
                info!(addr = %addr, reason = %reason, "MLME-DISASSOCIATE.indication");
            }
            ApEvent::DeauthenticateIndication { addr, reason } => {
                info!(addr = %addr, reason = %reason, "MLME-DEAUTHENTICATE.indication");
            }
            ApEvent::ReplayAuthFrame { addr, frame } => {
                info!(addr = %addr, length = frame.len(), "Authentication frame ready for replay");
            }
            ApEvent::SaQueryTimedOut { addr } => info!(addr = %addr, "SA Query timed out"),
            ApEvent::StationRemoved { addr } => info!(addr = %addr, "Station removed"),
        }
    }
}
