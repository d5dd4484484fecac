//! Engine commands: speed, RPM, air flow, runtime, load and throttle.

use crate::command::{
    bytes_to_int, bytes_to_int_n, calculate_percentage, calculate_percentage_n, ObdCommand,
};

pub fn speed() -> ObdCommand {
    ObdCommand::new("SPEED", "Vehicle Speed", "01", "0D", "Km/h", |raw| {
        Ok(bytes_to_int_n(&raw.buffered_value()?, 2, 1)?
            .to_string()
            .into())
    })
}

pub fn rpm() -> ObdCommand {
    ObdCommand::new("ENGINE_RPM", "Engine RPM", "01", "0C", "RPM", |raw| {
        Ok((bytes_to_int(&raw.buffered_value()?, 2)? / 4)
            .to_string()
            .into())
    })
}

pub fn mass_air_flow() -> ObdCommand {
    ObdCommand::new("MAF", "Mass Air Flow", "01", "10", "g/s", |raw| {
        let value = bytes_to_int(&raw.buffered_value()?, 2)? as f32 / 100.0;
        Ok(format!("{value:.2}").into())
    })
}

/// Seconds since engine start, rendered as zero-padded `HH:MM:SS`.
pub fn runtime() -> ObdCommand {
    ObdCommand::new("ENGINE_RUNTIME", "Engine Runtime", "01", "1F", "", |raw| {
        let seconds = bytes_to_int(&raw.buffered_value()?, 2)?;
        let (hh, mm, ss) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
        Ok(format!("{hh:02}:{mm:02}:{ss:02}").into())
    })
}

pub fn load() -> ObdCommand {
    ObdCommand::new("ENGINE_LOAD", "Engine Load", "01", "04", "%", |raw| {
        let percentage = calculate_percentage_n(&raw.buffered_value()?, 1)?;
        Ok(format!("{percentage:.1}").into())
    })
}

pub fn absolute_load() -> ObdCommand {
    ObdCommand::new(
        "ENGINE_ABSOLUTE_LOAD",
        "Engine Absolute Load",
        "01",
        "43",
        "%",
        |raw| {
            let percentage = calculate_percentage(&raw.buffered_value()?)?;
            Ok(format!("{percentage:.1}").into())
        },
    )
}

pub fn throttle_position() -> ObdCommand {
    ObdCommand::new(
        "THROTTLE_POSITION",
        "Throttle Position",
        "01",
        "11",
        "%",
        |raw| {
            let percentage = calculate_percentage_n(&raw.buffered_value()?, 1)?;
            Ok(format!("{percentage:.1}").into())
        },
    )
}

pub fn relative_throttle_position() -> ObdCommand {
    ObdCommand::new(
        "RELATIVE_THROTTLE_POSITION",
        "Relative Throttle Position",
        "01",
        "45",
        "%",
        |raw| {
            let percentage = calculate_percentage_n(&raw.buffered_value()?, 1)?;
            Ok(format!("{percentage:.1}").into())
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::ObdRawResponse;
    use std::time::Duration;

    fn decode(command: &ObdCommand, raw: &str) -> String {
        command
            .handle_response(&ObdRawResponse::new(raw, Duration::ZERO))
            .unwrap()
            .formatted_value()
    }

    #[test]
    fn speed_takes_the_first_data_byte() {
        let command = speed();
        assert_eq!(decode(&command, "410D15"), "21Km/h");
        assert_eq!(decode(&command, "410D40"), "64Km/h");
        assert_eq!(decode(&command, "410DFF"), "255Km/h");
        assert_eq!(decode(&command, "410DFFFF"), "255Km/h");
    }

    #[test]
    fn rpm_divides_the_data_window_by_four() {
        let command = rpm();
        assert_eq!(decode(&command, "410C200D"), "2051RPM");
        assert_eq!(decode(&command, "410C283C"), "2575RPM");
        assert_eq!(decode(&command, "410C0A00"), "640RPM");
        assert_eq!(decode(&command, "410C1AF8"), "1726RPM");
        assert_eq!(decode(&command, "410CFFFF"), "16383RPM");
    }

    #[test]
    fn mass_air_flow_scales_to_grams_per_second() {
        let command = mass_air_flow();
        assert_eq!(decode(&command, "41109511"), "381.61g/s");
        assert_eq!(decode(&command, "41101234"), "46.60g/s");
        assert_eq!(decode(&command, "4110FFFF"), "655.35g/s");
    }

    #[test]
    fn runtime_renders_hours_minutes_seconds() {
        let command = runtime();
        assert_eq!(decode(&command, "411F4543"), "04:55:31");
        assert_eq!(decode(&command, "411F1234"), "01:17:40");
        assert_eq!(decode(&command, "411FFFFF"), "18:12:15");
    }

    #[test]
    fn load_is_a_single_byte_percentage() {
        let command = load();
        assert_eq!(decode(&command, "410410"), "6.3%");
        assert_eq!(decode(&command, "4104FF"), "100.0%");
        assert_eq!(decode(&command, "410400"), "0.0%");
    }

    #[test]
    fn absolute_load_uses_the_whole_data_window() {
        let command = absolute_load();
        assert_eq!(decode(&command, "41434143"), "6551.8%");
        assert_eq!(decode(&command, "41431234"), "1827.5%");
        assert_eq!(decode(&command, "4143FFFF"), "25700.0%");
    }

    #[test]
    fn throttle_positions_are_single_byte_percentages() {
        assert_eq!(decode(&throttle_position(), "411111"), "6.7%");
        assert_eq!(decode(&relative_throttle_position(), "414545"), "27.1%");
    }

    #[test]
    fn truncated_response_reports_the_missing_window() {
        let command = rpm();
        let raw = ObdRawResponse::new("410C", Duration::ZERO);
        assert!(command.handle_response(&raw).is_err());
    }
}
