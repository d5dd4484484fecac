//! Temperature commands. All share the single-byte minus-forty encoding.

use crate::command::{bytes_to_int_n, Decoded, ObdCommand};
use crate::error::Result;
use crate::response::ObdRawResponse;

fn temperature_decoder(raw: &ObdRawResponse) -> Result<Decoded> {
    let degrees = bytes_to_int_n(&raw.buffered_value()?, 2, 1)? as f32 - 40.0;
    Ok(format!("{degrees:.1}").into())
}

pub fn air_intake_temperature() -> ObdCommand {
    ObdCommand::new(
        "AIR_INTAKE_TEMPERATURE",
        "Air Intake Temperature",
        "01",
        "0F",
        "°C",
        temperature_decoder,
    )
}

pub fn ambient_air_temperature() -> ObdCommand {
    ObdCommand::new(
        "AMBIENT_AIR_TEMPERATURE",
        "Ambient Air Temperature",
        "01",
        "46",
        "°C",
        temperature_decoder,
    )
}

pub fn engine_coolant_temperature() -> ObdCommand {
    ObdCommand::new(
        "ENGINE_COOLANT_TEMPERATURE",
        "Engine Coolant Temperature",
        "01",
        "05",
        "°C",
        temperature_decoder,
    )
}

pub fn engine_oil_temperature() -> ObdCommand {
    ObdCommand::new(
        "ENGINE_OIL_TEMPERATURE",
        "Engine Oil Temperature",
        "01",
        "5C",
        "°C",
        temperature_decoder,
    )
}
