//! Fuel system commands: consumption, type, levels, trim and equivalence
//! ratios.

use crate::command::{bytes_to_int, bytes_to_int_n, calculate_percentage_n, Decoded, ObdCommand};
use crate::error::Result;
use crate::response::ObdRawResponse;

pub fn consumption_rate() -> ObdCommand {
    ObdCommand::new(
        "FUEL_CONSUMPTION_RATE",
        "Fuel Consumption Rate",
        "01",
        "5E",
        "L/h",
        |raw| {
            let rate = bytes_to_int(&raw.buffered_value()?, 2)? as f64 * 0.05;
            Ok(format!("{rate:.1}").into())
        },
    )
}

pub fn fuel_type() -> ObdCommand {
    ObdCommand::new("FUEL_TYPE", "Fuel Type", "01", "51", "", |raw| {
        let code = bytes_to_int_n(&raw.buffered_value()?, 2, 1)?;
        Ok(fuel_type_name(code).into())
    })
}

fn fuel_type_name(code: u64) -> &'static str {
    match code {
        0x00 => "Not Available",
        0x01 => "Gasoline",
        0x02 => "Methanol",
        0x03 => "Ethanol",
        0x04 => "Diesel",
        0x05 => "GPL/LGP",
        0x06 => "Natural Gas",
        0x07 => "Propane",
        0x08 => "Electric",
        0x09 => "Biodiesel + Gasoline",
        0x0A => "Biodiesel + Methanol",
        0x0B => "Biodiesel + Ethanol",
        0x0C => "Biodiesel + GPL/LGP",
        0x0D => "Biodiesel + Natural Gas",
        0x0E => "Biodiesel + Propane",
        0x0F => "Biodiesel + Electric",
        0x10 => "Biodiesel + Gasoline/Electric",
        0x11 => "Hybrid Gasoline",
        0x12 => "Hybrid Ethanol",
        0x13 => "Hybrid Diesel",
        0x14 => "Hybrid Electric",
        0x15 => "Hybrid Mixed",
        0x16 => "Hybrid Regenerative",
        _ => "Unknown",
    }
}

pub fn fuel_level() -> ObdCommand {
    ObdCommand::new("FUEL_LEVEL", "Fuel Level", "01", "2F", "%", |raw| {
        let percentage = calculate_percentage_n(&raw.buffered_value()?, 1)?;
        Ok(format!("{percentage:.1}").into())
    })
}

pub fn ethanol_level() -> ObdCommand {
    ObdCommand::new("ETHANOL_LEVEL", "Ethanol Level", "01", "52", "%", |raw| {
        let percentage = calculate_percentage_n(&raw.buffered_value()?, 1)?;
        Ok(format!("{percentage:.1}").into())
    })
}

/// The four fuel trim registers, short and long term per bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuelTrimBank {
    ShortTermBank1,
    ShortTermBank2,
    LongTermBank1,
    LongTermBank2,
}

impl FuelTrimBank {
    fn parts(self) -> (&'static str, &'static str, &'static str) {
        match self {
            Self::ShortTermBank1 => ("SHORT_TERM_BANK_1", "Short Term Fuel Trim Bank 1", "06"),
            Self::ShortTermBank2 => ("SHORT_TERM_BANK_2", "Short Term Fuel Trim Bank 2", "07"),
            Self::LongTermBank1 => ("LONG_TERM_BANK_1", "Long Term Fuel Trim Bank 1", "08"),
            Self::LongTermBank2 => ("LONG_TERM_BANK_2", "Long Term Fuel Trim Bank 2", "09"),
        }
    }
}

/// Signed percentage around zero: 0x80 is no correction, 0x00 is -100%.
pub fn fuel_trim(bank: FuelTrimBank) -> ObdCommand {
    let (tag, name, pid) = bank.parts();
    ObdCommand::new(tag, name, "01", pid, "%", |raw| {
        let value = bytes_to_int_n(&raw.buffered_value()?, 2, 1)? as f32;
        let normalized = value * (100.0 / 128.0) - 100.0;
        Ok(format!("{normalized:.1}").into())
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OxygenSensor {
    Sensor1,
    Sensor2,
    Sensor3,
    Sensor4,
    Sensor5,
    Sensor6,
    Sensor7,
    Sensor8,
}

impl OxygenSensor {
    fn parts(self) -> (&'static str, &'static str, &'static str) {
        match self {
            Self::Sensor1 => (
                "FUEL_AIR_EQUIVALENCE_RATIO_OXYGEN_SENSOR_1",
                "Fuel-Air Equivalence Ratio - Oxygen Sensor 1",
                "34",
            ),
            Self::Sensor2 => (
                "FUEL_AIR_EQUIVALENCE_RATIO_OXYGEN_SENSOR_2",
                "Fuel-Air Equivalence Ratio - Oxygen Sensor 2",
                "35",
            ),
            Self::Sensor3 => (
                "FUEL_AIR_EQUIVALENCE_RATIO_OXYGEN_SENSOR_3",
                "Fuel-Air Equivalence Ratio - Oxygen Sensor 3",
                "36",
            ),
            Self::Sensor4 => (
                "FUEL_AIR_EQUIVALENCE_RATIO_OXYGEN_SENSOR_4",
                "Fuel-Air Equivalence Ratio - Oxygen Sensor 4",
                "37",
            ),
            Self::Sensor5 => (
                "FUEL_AIR_EQUIVALENCE_RATIO_OXYGEN_SENSOR_5",
                "Fuel-Air Equivalence Ratio - Oxygen Sensor 5",
                "38",
            ),
            Self::Sensor6 => (
                "FUEL_AIR_EQUIVALENCE_RATIO_OXYGEN_SENSOR_6",
                "Fuel-Air Equivalence Ratio - Oxygen Sensor 6",
                "39",
            ),
            Self::Sensor7 => (
                "FUEL_AIR_EQUIVALENCE_RATIO_OXYGEN_SENSOR_7",
                "Fuel-Air Equivalence Ratio - Oxygen Sensor 7",
                "3A",
            ),
            Self::Sensor8 => (
                "FUEL_AIR_EQUIVALENCE_RATIO_OXYGEN_SENSOR_8",
                "Fuel-Air Equivalence Ratio - Oxygen Sensor 8",
                "3B",
            ),
        }
    }
}

fn equivalence_ratio_decoder(raw: &ObdRawResponse) -> Result<Decoded> {
    let ratio = bytes_to_int_n(&raw.buffered_value()?, 2, 2)? as f32 * (2.0 / 65536.0);
    Ok(format!("{ratio:.2}").into())
}

pub fn commanded_equivalence_ratio() -> ObdCommand {
    ObdCommand::new(
        "COMMANDED_EQUIVALENCE_RATIO",
        "Fuel-Air Commanded Equivalence Ratio",
        "01",
        "44",
        "F/A",
        equivalence_ratio_decoder,
    )
}

pub fn equivalence_ratio(sensor: OxygenSensor) -> ObdCommand {
    let (tag, name, pid) = sensor.parts();
    ObdCommand::new(tag, name, "01", pid, "F/A", equivalence_ratio_decoder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn decode(command: &ObdCommand, raw: &str) -> String {
        command
            .handle_response(&ObdRawResponse::new(raw, Duration::ZERO))
            .unwrap()
            .formatted_value()
    }

    #[test]
    fn consumption_rate_scales_by_five_hundredths() {
        let command = consumption_rate();
        assert_eq!(decode(&command, "415E10E3"), "216.2L/h");
        assert_eq!(decode(&command, "415E1234"), "233.0L/h");
        assert_eq!(decode(&command, "415EFFFF"), "3276.8L/h");
    }

    #[test]
    fn fuel_type_is_a_lookup() {
        let command = fuel_type();
        assert_eq!(decode(&command, "415100"), "Not Available");
        assert_eq!(decode(&command, "415101"), "Gasoline");
        assert_eq!(decode(&command, "415104"), "Diesel");
        assert_eq!(decode(&command, "415116"), "Hybrid Regenerative");
        assert_eq!(decode(&command, "4151EE"), "Unknown");
    }

    #[test]
    fn levels_are_single_byte_percentages() {
        assert_eq!(decode(&fuel_level(), "412FFF"), "100.0%");
        assert_eq!(decode(&fuel_level(), "412F80"), "50.2%");
        assert_eq!(decode(&ethanol_level(), "415200"), "0.0%");
    }

    #[test]
    fn fuel_trim_is_centered_on_eighty_hex() {
        let command = fuel_trim(FuelTrimBank::ShortTermBank1);
        assert_eq!(decode(&command, "410610"), "-87.5%");
        assert_eq!(decode(&command, "410643"), "-47.7%");
        assert_eq!(decode(&command, "410680"), "0.0%");
        assert_eq!(decode(&command, "410600"), "-100.0%");
        assert_eq!(decode(&command, "4106FF"), "99.2%");
    }

    #[test]
    fn fuel_trim_banks_carry_their_pids() {
        assert_eq!(fuel_trim(FuelTrimBank::ShortTermBank1).pid, "06");
        assert_eq!(fuel_trim(FuelTrimBank::ShortTermBank2).pid, "07");
        assert_eq!(fuel_trim(FuelTrimBank::LongTermBank1).pid, "08");
        assert_eq!(fuel_trim(FuelTrimBank::LongTermBank2).pid, "09");
        assert_eq!(
            fuel_trim(FuelTrimBank::LongTermBank2).tag,
            "LONG_TERM_BANK_2"
        );
    }

    #[test]
    fn equivalence_ratio_spans_zero_to_two() {
        let command = commanded_equivalence_ratio();
        assert_eq!(decode(&command, "41441234"), "0.14F/A");
        assert_eq!(decode(&command, "41444040"), "0.50F/A");
        assert_eq!(decode(&command, "41448080"), "1.00F/A");
        assert_eq!(decode(&command, "4144FFFF"), "2.00F/A");
    }

    #[test]
    fn oxygen_sensor_commands_share_the_ratio_decoder() {
        let command = equivalence_ratio(OxygenSensor::Sensor3);
        assert_eq!(command.pid, "36");
        assert_eq!(command.tag, "FUEL_AIR_EQUIVALENCE_RATIO_OXYGEN_SENSOR_3");
        assert_eq!(decode(&command, "41368080"), "1.00F/A");
    }
}
