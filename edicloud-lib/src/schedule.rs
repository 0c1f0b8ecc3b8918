//! Weekly schedule decoding.
//!
//! Each weekday slot is a hex string; every nibble expands MSB-first into
//! four minute flags (`1` = on). The explanation lists only the minutes at
//! which the state changes.

use crate::constants::WEEKDAYS;
use crate::error::Error;

/// Decoded form of an unset slot.
pub const NOT_SET: &str = "notset";

/// Expand a hex slot into one `bool` per minute.
pub fn expand_minutes(slot: &str) -> Result<Vec<bool>, Error> {
    let mut minutes = Vec::with_capacity(slot.len() * 4);
    for c in slot.chars() {
        let nibble = c
            .to_digit(16)
            .ok_or_else(|| Error::Protocol(format!("Invalid schedule digit {:?}", c)))?;
        minutes.extend((0..4).rev().map(|bit| nibble & (1 << bit) != 0));
    }
    Ok(minutes)
}

/// Describe one slot as `HH:MM=ON;HH:MM=OFF;...` transitions.
pub fn explain_schedule(slot: Option<&str>) -> Result<String, Error> {
    let slot = match slot {
        Some(s) if !s.is_empty() => s,
        _ => return Ok(NOT_SET.to_string()),
    };

    let mut changes = Vec::new();
    let mut state = None;
    for (minute, on) in expand_minutes(slot)?.into_iter().enumerate() {
        if state != Some(on) {
            state = Some(on);
            changes.push(format!(
                "{:02}:{:02}={}",
                minute / 60,
                minute % 60,
                if on { "ON" } else { "OFF" }
            ));
        }
    }
    Ok(changes.join(";"))
}

/// Describe all seven slots as `SUN:...` entries joined by `/`.
pub fn explain_week<S: AsRef<str>>(slots: &[Option<S>]) -> Result<String, Error> {
    let days = WEEKDAYS
        .iter()
        .enumerate()
        .map(|(i, day)| {
            let slot = slots.get(i).and_then(Option::as_ref).map(|s: &S| -> &str { s.as_ref() });
            explain_schedule(slot).map(|text| format!("{day}:{text}"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(days.join("/"))
}
