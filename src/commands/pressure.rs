//! Pressure commands: barometric, intake manifold and the fuel rail family.

use crate::command::{bytes_to_int, bytes_to_int_n, ObdCommand};

pub fn barometric_pressure() -> ObdCommand {
    ObdCommand::new(
        "BAROMETRIC_PRESSURE",
        "Barometric Pressure",
        "01",
        "33",
        "kPa",
        |raw| {
            Ok(bytes_to_int_n(&raw.buffered_value()?, 2, 1)?
                .to_string()
                .into())
        },
    )
}

pub fn intake_manifold_pressure() -> ObdCommand {
    ObdCommand::new(
        "INTAKE_MANIFOLD_PRESSURE",
        "Intake Manifold Pressure",
        "01",
        "0B",
        "kPa",
        |raw| {
            Ok(bytes_to_int_n(&raw.buffered_value()?, 2, 1)?
                .to_string()
                .into())
        },
    )
}

pub fn fuel_pressure() -> ObdCommand {
    ObdCommand::new("FUEL_PRESSURE", "Fuel Pressure", "01", "0A", "kPa", |raw| {
        Ok((bytes_to_int_n(&raw.buffered_value()?, 2, 1)? * 3)
            .to_string()
            .into())
    })
}

pub fn fuel_rail_pressure() -> ObdCommand {
    ObdCommand::new(
        "FUEL_RAIL_PRESSURE",
        "Fuel Rail Pressure",
        "01",
        "22",
        "kPa",
        |raw| {
            let pressure = bytes_to_int(&raw.buffered_value()?, 2)? as f64 * 0.079;
            Ok(format!("{pressure:.3}").into())
        },
    )
}

pub fn fuel_rail_gauge_pressure() -> ObdCommand {
    ObdCommand::new(
        "FUEL_RAIL_GAUGE_PRESSURE",
        "Fuel Rail Gauge Pressure",
        "01",
        "23",
        "kPa",
        |raw| {
            Ok((bytes_to_int(&raw.buffered_value()?, 2)? * 10)
                .to_string()
                .into())
        },
    )
}
