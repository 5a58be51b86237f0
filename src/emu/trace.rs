use std::time::{SystemTime, UNIX_EPOCH};

use super::Opcode;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Formats `message` as `HH:MM:SS - message` using the UTC wall clock at `now`.
///
/// The stamp is UTC, not local time: there is no timezone lookup.
pub fn format_line(now: SystemTime, message: &str) -> String {
    let secs = now
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
        % SECONDS_PER_DAY;

    format!(
        "{:02}:{:02}:{:02} - {message}",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60
    )
}

/// The message traced for one instruction about to execute at `pc`.
pub fn instruction_message(pc: u16, opcode: &Opcode) -> String {
    match opcode {
        Opcode::Unknown(raw) => format!("{pc:#05X} -> unknown instruction {raw:#06X}"),
        _ => format!("{pc:#05X} -> {opcode}"),
    }
}
