//! Smart plug commands carried over the relay and the parsing of their replies.

use crate::constants::{HISTORY_DAYS, WEEKDAYS};
use crate::error::Error;
use crate::markup::Markup;
use crate::result::{DeviceResult, chunk_history};
use crate::schedule::explain_week;
use chrono::{DateTime, Duration, Local};
use strum_macros::Display;

const PROLOG: &str = "<?xml version=\"1.0\" encoding=\"UTF8\"?>";

const STATE: &str = "Device.System.Power.State";
const NEXT_TOGGLE: &str = "Device.System.Power.NextToggle";
const MAIL_SENDER: &str = "Device.System.SMTP.0.Mail.Sender";
const MAIL_RECIPIENT: &str = "Device.System.SMTP.0.Mail.Recipient";
const NOW_POWER: &str = "Device.System.Power.NowPower";
const NOW_CURRENT: &str = "Device.System.Power.NowCurrent";
const ENERGY_DAY: &str = "Device.System.Power.NowEnergy.Day";
const ENERGY_WEEK: &str = "Device.System.Power.NowEnergy.Week";
const ENERGY_MONTH: &str = "Device.System.Power.NowEnergy.Month";
const HISTORY_ENERGY: &str = "Device.System.Power.History.Energy";

/// Relay state of a smart plug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PowerState {
    #[strum(to_string = "ON")]
    On,
    #[strum(to_string = "OFF")]
    Off,
}

impl PowerState {
    /// State that flips the last reported one. Anything but `ON` counts as off.
    pub fn toggled(current: Option<&str>) -> Self {
        if current == Some("ON") { Self::Off } else { Self::On }
    }
}

fn smartplug(kind: &str, body: &str) -> String {
    format!("{PROLOG}<SMARTPLUG id=\"edimax\"><CMD id=\"{kind}\">{body}</CMD></SMARTPLUG>")
}

/// System info plus current power state and next scheduled toggle.
pub fn plug_info() -> String {
    smartplug(
        "get",
        &format!("<SYSTEM_INFO></SYSTEM_INFO><{STATE}></{STATE}><{NEXT_TOGGLE}></{NEXT_TOGGLE}>"),
    )
}

pub fn set_power(state: PowerState) -> String {
    smartplug("setup", &format!("<{STATE}>{state}</{STATE}>"))
}

pub fn get_schedule() -> String {
    smartplug("get", "<SCHEDULE></SCHEDULE>")
}

pub fn get_power() -> String {
    smartplug("get", "<NOW_POWER></NOW_POWER>")
}

/// Hourly energy history between two `YYYYMMDDHH` stamps, plus current telemetry.
pub fn get_history(from: &str, to: &str) -> String {
    smartplug(
        "get",
        &format!(
            "<NOW_POWER></NOW_POWER><POWER_HISTORY><{HISTORY_ENERGY} unit=\"HOUR\" date=\"{from}-{to}\"></{HISTORY_ENERGY}></POWER_HISTORY>"
        ),
    )
}

/// History window ending at `now`: midnight [`HISTORY_DAYS`] days ago up to the current hour.
pub fn history_range(now: DateTime<Local>) -> (String, String) {
    let from = now - Duration::days(HISTORY_DAYS);
    (from.format("%Y%m%d00").to_string(), now.format("%Y%m%d%H").to_string())
}

fn parse_reply(reply: &str) -> Result<Markup, Error> {
    Markup::from_http_like(reply)?
        .ok_or_else(|| Error::Protocol("Device reply carries no SMARTPLUG document".to_string()))
}

fn text(doc: &Markup, name: &str) -> Option<String> {
    doc.descendant_text(name).map(str::to_string)
}

fn number(doc: &Markup, name: &str) -> Result<f64, Error> {
    match doc.descendant_text(name).map(str::trim) {
        Some(value) if !value.is_empty() => value
            .parse()
            .map_err(|_| Error::Protocol(format!("{} is not a number: {:?}", name, value))),
        _ => Ok(0.0),
    }
}

/// Fill state, next toggle, mail and firmware fields from a `plug_info` reply.
pub fn apply_plug_info(result: &mut DeviceResult, reply: &str) -> Result<(), Error> {
    let doc = parse_reply(reply)?;
    result.state = text(&doc, STATE);
    result.next_toggle = text(&doc, NEXT_TOGGLE);
    result.email_sender = text(&doc, MAIL_SENDER);
    result.email_recipient = text(&doc, MAIL_RECIPIENT);
    result.run_cus = text(&doc, "Run.Cus");
    result.run_model = text(&doc, "Run.Model");
    result.run_fw = text(&doc, "Run.FW.Version");
    Ok(())
}

/// Record the `CMD` status text of a `set_power` reply.
pub fn apply_set_power(result: &mut DeviceResult, reply: &str) -> Result<(), Error> {
    let doc = parse_reply(reply)?;
    result.command_status = text(&doc, "CMD");
    Ok(())
}

pub fn apply_schedule(result: &mut DeviceResult, reply: &str) -> Result<(), Error> {
    let doc = parse_reply(reply)?;
    result.schedule = (0..WEEKDAYS.len())
        .map(|day| text(&doc, &format!("Device.System.Power.Schedule.{day}")))
        .collect();
    result.schedule_explanation = Some(explain_week(&result.schedule)?);
    Ok(())
}

/// Instant power, current and cumulative energy. Missing values read as zero.
pub fn apply_power(result: &mut DeviceResult, reply: &str) -> Result<(), Error> {
    let doc = parse_reply(reply)?;
    apply_telemetry(result, &doc)
}

pub fn apply_history(result: &mut DeviceResult, reply: &str) -> Result<(), Error> {
    let doc = parse_reply(reply)?;
    result.energy_history = doc
        .descendant_text(HISTORY_ENERGY)
        .map(chunk_history)
        .unwrap_or_default();
    apply_telemetry(result, &doc)
}

fn apply_telemetry(result: &mut DeviceResult, doc: &Markup) -> Result<(), Error> {
    result.power = number(doc, NOW_POWER)?;
    result.current = number(doc, NOW_CURRENT)?;
    result.energy_day = number(doc, ENERGY_DAY)?;
    result.energy_week = number(doc, ENERGY_WEEK)?;
    result.energy_month = number(doc, ENERGY_MONTH)?;
    Ok(())
}
