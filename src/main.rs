use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use std::fs::File;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap_verbosity_flag::{InfoLevel, Verbosity};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use edicloud_lib::actions::{self, Action, ActionOptions};
use edicloud_lib::constants::{DEFAULT_CLOUD_HOST, DEFAULT_CLOUD_PORT};
use edicloud_lib::{ClientConfig, DeviceClient, DeviceResult, DiscoveryClient};

const WIRE_TEXT_TARGET: &str = "edicloud::wire::text";
const WIRE_HEX_TARGET: &str = "edicloud::wire::hex";

/// Control Edimax smart plugs and IP cameras through the Edimax cloud relay.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Device id, the MAC address printed on the device label.
    device_id: String,
    /// probe, pluginfo, on, off, toggle, getschedule, power, history, image or web.
    #[arg(default_value_t = Action::Probe)]
    action: Action,
    /// Device password; prompted for when omitted.
    #[arg(short, long)]
    password: Option<String>,
    /// File to save the camera snapshot to (image only).
    #[arg(short = 'm', long = "imagefile")]
    image_file: Option<String>,
    /// Local port for the web proxy (web only).
    #[arg(short = 'w', long = "webport", value_parser = numeric_option())]
    web_port: Option<u32>,
    /// Trace decrypted messages.
    #[arg(short = 'c', long)]
    cleartext: bool,
    /// Trace raw bytes as hex.
    #[arg(short = 'x', long)]
    hexadecimal: bool,
    /// Relay receive timeout in milliseconds.
    #[arg(short = 't', long = "tcptimeout", value_parser = numeric_option())]
    tcp_timeout: Option<u32>,
    /// Discovery reply timeout in milliseconds.
    #[arg(short = 'u', long = "udptimeout", value_parser = numeric_option())]
    udp_timeout: Option<u32>,
    /// Relay reconnection attempts before giving up.
    #[arg(short = 'r', long = "tcpretries", value_parser = numeric_option())]
    tcp_retries: Option<u32>,
    /// Discovery attempts before giving up.
    #[arg(short = 'R', long = "udpretries", value_parser = numeric_option())]
    udp_retries: Option<u32>,
    /// Pause between retries in milliseconds.
    #[arg(short = 'i', long = "interval", value_parser = numeric_option())]
    interval: Option<u32>,
    /// Cloud discovery endpoint as host[:port].
    #[arg(short = 'e', long)]
    endpoint: Option<String>,
    /// Optional path to a file to write logs to, in addition to the console.
    #[arg(short, long)]
    log_file: Option<PathBuf>,
    /// Print the result as JSON.
    #[arg(long)]
    json: bool,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

fn numeric_option() -> clap::builder::RangedI64ValueParser<u32> {
    clap::value_parser!(u32).range(0..=65536)
}

fn setup_logging(cli: &Cli) -> Result<Option<WorkerGuard>> {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .without_time();

    let (file_layer, guard) = if let Some(ref path) = cli.log_file {
        let log_file = File::create(path).with_context(|| format!("Failed to create log file at: {:?}", path))?;
        let (non_blocking_writer, guard) = tracing_appender::non_blocking(log_file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_ansi(false)
            .with_target(false);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    // Wire dumps only appear when asked for, whatever the verbosity
    let wire = |target: &str, enabled: bool| format!("{}={}", target, if enabled { "trace" } else { "off" });
    let filter = EnvFilter::builder()
        .with_default_directive(cli.verbose.tracing_level_filter().into())
        .from_env_lossy()
        .add_directive(wire(WIRE_TEXT_TARGET, cli.cleartext).parse()?)
        .add_directive(wire(WIRE_HEX_TARGET, cli.hexadecimal).parse()?);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if let Some(path) = &cli.log_file {
        info!("Logging to file: {:?}", path);
    }

    Ok(guard)
}

fn build_config(cli: &Cli) -> Result<ClientConfig> {
    let millis = |v: u32| Duration::from_millis(u64::from(v));
    let mut config = ClientConfig::default();
    if let Some(v) = cli.tcp_timeout {
        config = config.with_tcp_timeout(millis(v));
    }
    if let Some(v) = cli.udp_timeout {
        config = config.with_udp_timeout(millis(v));
    }
    if let Some(v) = cli.tcp_retries {
        config = config.with_tcp_max_retries(v);
    }
    if let Some(v) = cli.udp_retries {
        config = config.with_udp_max_retries(v);
    }
    if let Some(v) = cli.interval {
        config = config.with_retry_interval(millis(v));
    }
    if let Some(v) = cli.web_port {
        let port = u16::try_from(v).map_err(|_| anyhow!("Invalid web port: {}", v))?;
        config = config.with_web_port(port);
    }
    Ok(config)
}

/// Resolve `host[:port]` to an IPv4 socket address.
async fn resolve_endpoint(endpoint: Option<&str>) -> Result<SocketAddr> {
    let endpoint = endpoint.unwrap_or(DEFAULT_CLOUD_HOST);
    if let Ok(addr) = endpoint.parse::<SocketAddr>() {
        return Ok(addr);
    }
    let (host, port) = match endpoint.rsplit_once(':') {
        Some((host, port)) => (
            host,
            port.parse::<u16>()
                .with_context(|| format!("Invalid endpoint port in {:?}", endpoint))?,
        ),
        None => (endpoint, DEFAULT_CLOUD_PORT),
    };
    tokio::net::lookup_host((host, port))
        .await
        .with_context(|| format!("Failed to resolve {}", host))?
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| anyhow!("No IPv4 address found for {}", host))
}

fn print_result(result: &DeviceResult, json: bool) -> Result<()> {
    if json {
        println!("{}", result.to_json().context("Failed to serialize result")?);
        return Ok(());
    }
    let d = &result.discovery;
    info!("Device {}: {}", result.device_id, d.status_description());
    if d.is_reachable() {
        info!("    Alias     : {}", d.alias.as_deref().unwrap_or_default());
        info!("    Type      : {}", d.device_type.as_deref().unwrap_or_default());
        info!("    Model     : {}", d.model.as_deref().unwrap_or_default());
        info!("    Ip        : {}", d.device_ip.as_deref().unwrap_or_default());
        info!(
            "    Relay     : {}:{}",
            d.relay_ip.as_deref().unwrap_or_default(),
            d.relay_port
        );
    }
    if let Some(state) = &result.state {
        info!("    State     : {}", state);
    }
    if let Some(explanation) = &result.schedule_explanation {
        for day in explanation.split('/') {
            info!("    {}", day);
        }
    }
    for (i, day) in result.energy_history.iter().enumerate() {
        info!("    History {:>2}: {}", i, day);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let device_id = cli.device_id.trim().to_uppercase();
    if device_id.is_empty() {
        bail!("Device id must not be empty");
    }
    if cli.image_file.is_some() && cli.action != Action::Image {
        warn!("--imagefile is only used by the image action");
    }
    if cli.web_port.is_some() && cli.action != Action::Web {
        warn!("--webport is only used by the web action");
    }

    let config = build_config(&cli)?;
    let password = match &cli.password {
        Some(password) => password.clone(),
        None => rpassword::prompt_password(format!("Password for {}: ", device_id))
            .context("Failed to read password")?,
    };
    let endpoint = resolve_endpoint(cli.endpoint.as_deref()).await?;
    info!("Using cloud endpoint {}", endpoint);

    let discovery = DiscoveryClient::new(endpoint, config.clone());
    let client = DeviceClient::new(discovery, &device_id, &password, config);
    let options = ActionOptions {
        image_file: cli.image_file.clone(),
    };
    let result = actions::execute(client, cli.action, options)
        .await
        .with_context(|| format!("{} failed for {}", cli.action, device_id))?;

    if let (Some(file), Some(image)) = (&result.file_generated, &result.image) {
        std::fs::write(file, image).with_context(|| format!("Failed to write image file {}", file))?;
        info!("{}b saved to image file {}", image.len(), file);
    }
    print_result(&result, cli.json)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = setup_logging(&cli)?;

    if let Err(e) = run(cli).await {
        error!("{:?}", e);
        process::exit(1);
    }

    Ok(())
}
