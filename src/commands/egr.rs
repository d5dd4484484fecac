//! Exhaust gas recirculation commands.

use crate::command::{bytes_to_int_n, calculate_percentage_n, ObdCommand};

pub fn commanded_egr() -> ObdCommand {
    ObdCommand::new("COMMANDED_EGR", "Commanded EGR", "01", "2C", "%", |raw| {
        let percentage = calculate_percentage_n(&raw.buffered_value()?, 1)?;
        Ok(format!("{percentage:.1}").into())
    })
}

/// Deviation from the commanded EGR position, -100% to just under +100%.
pub fn egr_error() -> ObdCommand {
    ObdCommand::new("EGR_ERROR", "EGR Error", "01", "2D", "%", |raw| {
        let value = bytes_to_int_n(&raw.buffered_value()?, 2, 1)? as f32;
        let normalized = value * (100.0 / 128.0) - 100.0;
        Ok(format!("{normalized:.1}").into())
    })
}
