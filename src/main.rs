use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tapstack::capture::TapDevice;
use tapstack::config::{self, StackConfig};
use tapstack::dataplane::Stack;
use tapstack::netns;
use tapstack::telemetry::{init_logging, MetricsRegistry};
use tokio::runtime::Runtime;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "tun")]
#[command(about = "User-space TCP/IP stack on a TAP device inside a network namespace")]
struct Cli {
    /// Named network namespace, resolved under the namespace directory
    namespace: Option<String>,

    /// Path to a TOML config file (built-in defaults otherwise)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// TAP interface name
    #[arg(long)]
    interface: Option<String>,

    /// Directory holding named namespaces
    #[arg(long)]
    netns_dir: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let Some(namespace) = cli.namespace.as_deref() else {
        println!("usage: tun <namespace>");
        return;
    };

    if let Err(e) = cmd_run(&cli, namespace) {
        error!("{}", e);
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    }
}

fn cmd_run(cli: &Cli, namespace: &str) -> Result<(), String> {
    let mut config = match &cli.config {
        Some(path) => config::load(path)
            .map_err(|e| format!("Failed to load {}: {}", path.display(), e))?,
        None => StackConfig::default(),
    };
    if let Some(interface) = &cli.interface {
        config.interface = interface.clone();
    }
    if let Some(dir) = &cli.netns_dir {
        config.netns_dir = dir.clone();
    }

    init_logging(Some(&config.log));

    let validation = config::validate(&config);
    validation.log_diagnostics();
    if validation.has_errors() {
        return Err(format!(
            "configuration has {} error(s)",
            validation.errors.len()
        ));
    }

    let ns_path = config.netns_path(namespace);
    info!(
        namespace,
        path = %ns_path.display(),
        interface = %config.interface,
        "opening TAP device in namespace"
    );

    let ifname = config.interface.clone();
    let tap = netns::open_in_namespace(&ns_path, move || TapDevice::open(&ifname))
        .map_err(|e| format!("Failed to open {}: {}", config.interface, e))?;

    let rt = Runtime::new().map_err(|e| format!("Failed to create runtime: {}", e))?;

    rt.block_on(async move {
        let device = Arc::new(
            tap.register()
                .map_err(|e| format!("Failed to register TAP device: {}", e))?,
        );
        let metrics = Arc::new(MetricsRegistry::new());
        let mut stack = Stack::new(device, &config, Arc::clone(&metrics))
            .map_err(|e| format!("Failed to start stack: {}", e))?;

        let result = tokio::select! {
            res = stack.run() => res.map_err(|e| format!("Receive error: {}", e)),
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                Ok(())
            }
        };

        let summary = metrics.summary();
        info!(
            frames_received = summary.frames_received,
            frames_sent = summary.frames_sent,
            parse_errors = summary.parse_errors,
            arp_replies_sent = summary.arp_replies_sent,
            sessions_created = summary.sessions_created,
            sessions_closed = summary.sessions_closed,
            protocol_violations = summary.protocol_violations,
            segments_dropped = summary.segments_dropped,
            tx_errors = summary.tx_errors,
            "stack stopped"
        );

        result
    })
}
