//! What one invocation does with a device, end to end.

use crate::client::DeviceClient;
use crate::commands::{self, PowerState};
use crate::error::Error;
use crate::proxy;
use crate::result::DeviceResult;
use chrono::Local;
use strum_macros::{Display, EnumString};
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Action {
    /// Discovery only
    #[default]
    Probe,
    PlugInfo,
    On,
    Off,
    Toggle,
    GetSchedule,
    Power,
    History,
    /// Camera snapshot
    Image,
    /// Local proxy to the device's web interface
    Web,
}

impl Action {
    /// Smart plug commands sent as Pnv device commands.
    pub fn is_plug_command(&self) -> bool {
        !matches!(self, Action::Probe | Action::Image | Action::Web)
    }

    /// Actions that ride the HTTP tunnel.
    pub fn uses_tunnel(&self) -> bool {
        matches!(self, Action::Image | Action::Web)
    }
}

/// Caller-supplied options that only some actions use.
#[derive(Debug, Clone, Default)]
pub struct ActionOptions {
    /// File name for `image`; a timestamped default is suggested otherwise
    pub image_file: Option<String>,
}

/// Run `action` against the client's device.
///
/// Expected outcomes (offline, bad password, no relay, missing image) are
/// reported in the returned [`DeviceResult`] and the log. Errors are reserved
/// for exhausted retry budgets, denied tunnel access and local failures.
/// `web` only returns once the proxy stops.
pub async fn execute(mut client: DeviceClient, action: Action, options: ActionOptions) -> Result<DeviceResult, Error> {
    let mut result = DeviceResult::new(client.device_id());
    let descriptor = client.discover().await.clone();
    result.discovery = descriptor;

    if action == Action::Probe {
        return Ok(result);
    }
    if !result.discovery.is_reachable() {
        error!(
            "Unable to connect to device: {} - {}",
            result.device_id,
            result.discovery.status_description()
        );
        return Ok(result);
    }

    let outcome = match client.open().await {
        Ok(()) if action.is_plug_command() => run_plug_command(&mut client, action, &mut result).await,
        Ok(()) => return run_tunnel_action(client, action, options, result).await,
        Err(e) => Err(e),
    };
    // Sync with the latest descriptor when a reconnect refreshed it
    result.discovery = client.descriptor().clone();
    let _ = client.close().await;

    match outcome {
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            error!("TCP communication error: {}", e);
            Ok(result)
        }
        Ok(()) => Ok(result),
    }
}

async fn run_plug_command(client: &mut DeviceClient, action: Action, result: &mut DeviceResult) -> Result<(), Error> {
    let reply = client.send_command(&commands::plug_info()).await?;
    result.relay_success = true;
    commands::apply_plug_info(result, &reply)?;
    info!(
        state = result.state.as_deref().unwrap_or_default(),
        next_toggle = result.next_toggle.as_deref().unwrap_or_default(),
        model = result.run_model.as_deref().unwrap_or_default(),
        firmware = result.run_fw.as_deref().unwrap_or_default(),
        "Info received from device {}",
        result.device_id
    );

    match action {
        Action::On | Action::Off | Action::Toggle => {
            let state = match action {
                Action::On => PowerState::On,
                Action::Off => PowerState::Off,
                _ => PowerState::toggled(result.state.as_deref()),
            };
            info!("Sending command Device.System.Power.State={}", state);
            let reply = client.send_command(&commands::set_power(state)).await?;
            commands::apply_set_power(result, &reply)?;
            info!(
                "Command {} returned status {}",
                action,
                result.command_status.as_deref().unwrap_or("<none>")
            );
        }
        Action::GetSchedule => {
            let reply = client.send_command(&commands::get_schedule()).await?;
            commands::apply_schedule(result, &reply)?;
            info!(
                "Schedule for {}: {}",
                result.device_id,
                result.schedule_explanation.as_deref().unwrap_or_default()
            );
        }
        Action::Power => {
            let reply = client.send_command(&commands::get_power()).await?;
            commands::apply_power(result, &reply)?;
            log_telemetry(result);
        }
        Action::History => {
            let (from, to) = commands::history_range(Local::now());
            info!("Sending GetPowerHistory command for {}-{}", from, to);
            let reply = client.send_command(&commands::get_history(&from, &to)).await?;
            commands::apply_history(result, &reply)?;
            log_telemetry(result);
            info!("Power history from {} to {}: {} days", from, to, result.energy_history.len());
        }
        _ => {}
    }
    Ok(())
}

fn log_telemetry(result: &DeviceResult) {
    info!(
        power_w = result.power,
        current_a = result.current,
        energy_day_wh = result.energy_day,
        energy_week_wh = result.energy_week,
        energy_month_wh = result.energy_month,
        "Power of device {}",
        result.device_id
    );
}

async fn run_tunnel_action(
    mut client: DeviceClient,
    action: Action,
    options: ActionOptions,
    mut result: DeviceResult,
) -> Result<DeviceResult, Error> {
    let access = client.authenticate_http().await;
    result.discovery = client.descriptor().clone();
    if let Err(e) = access {
        error!("Access to {} is forbidden: {}", result.device_id, e);
        let _ = client.close().await;
        return Err(e);
    }
    result.relay_success = true;

    if action == Action::Web {
        let config = client.config().clone();
        let listener = TcpListener::bind((config.web_bind, config.web_port)).await?;
        info!("Waiting for connection on {}:{}", config.web_bind, config.web_port);
        proxy::serve(listener, client).await?;
        return Ok(result);
    }

    info!("Sending image request to {}", result.device_id);
    let fetched = client.fetch_http(crate::constants::SNAPSHOT_PATH).await;
    result.discovery = client.descriptor().clone();
    let _ = client.close().await;
    let response = fetched?;
    let content_type = response.content_type.clone().unwrap_or_default();
    if response.is_ok() && content_type.contains("image/") {
        let file = options.image_file.filter(|f| !f.trim().is_empty()).unwrap_or_else(|| {
            format!(
                "{}_{}.jpg",
                result.device_id,
                Local::now().format("%Y-%m-%d-%H-%M-%S")
            )
        });
        info!("Received {}b image for {}", response.body.len(), file);
        result.file_generated = Some(file);
        result.image = Some(response.body);
        Ok(result)
    } else {
        Err(Error::UnexpectedContent {
            status: response.status.clone(),
            content_type,
            body: response.body_text(),
        })
    }
}
