//! Diagnostic state commands: trouble codes, monitor status, MIL counters,
//! the VIN and the supported-PID bitmasks.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::command::{
    bytes_to_int, bytes_to_int_n, default_formatter, passthrough_decoder, DecodeFn, Decoded,
    ObdCommand, ObdData,
};
use crate::error::{Error, Result};
use crate::response::{ObdRawResponse, BUS_INIT_PATTERN, WHITESPACE_PATTERN};

static FRAME_MARKER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r".:").expect("Invalid frame marker regex"));
static CARRIAGE_COLON_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\r\n].:").expect("Invalid carriage colon regex"));
static MODE_03_ECHO_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^43|[\r\n]43|[\r\n]").expect("Invalid mode 03 echo regex"));
static MODE_07_ECHO_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^47|[\r\n]47|[\r\n]").expect("Invalid mode 07 echo regex"));
static MODE_0A_ECHO_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^4A|[\r\n]4A|[\r\n]").expect("Invalid mode 0A echo regex"));
static VIN_ECHO_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"49020.").expect("Invalid VIN echo regex"));

// CAN multi-frame VIN answers open with `xxx490201`, xxx being the announced
// byte count.
const VIN_CAN_PREFIX_LENGTH: usize = 9;

const DTC_LETTERS: [char; 4] = ['P', 'C', 'B', 'U'];

/// On-board emission monitors reported by the monitor status PIDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Monitor {
    // Reported for every engine.
    Misfire,
    FuelSystem,
    ComprehensiveComponent,
    // Spark ignition engines only.
    Catalyst,
    HeatedCatalyst,
    EvaporativeSystem,
    SecondaryAirSystem,
    AcRefrigerant,
    OxygenSensor,
    OxygenSensorHeater,
    EgrSystem,
    // Compression ignition engines only.
    NmhcCatalyst,
    NoxScrMonitor,
    BoostPressure,
    ExhaustGasSensor,
    PmFilter,
    EgrVvtSystem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ignition {
    Spark,
    Compression,
}

impl Monitor {
    /// Every monitor, continuous ones first.
    pub const ALL: [Monitor; 17] = [
        Monitor::Misfire,
        Monitor::FuelSystem,
        Monitor::ComprehensiveComponent,
        Monitor::Catalyst,
        Monitor::HeatedCatalyst,
        Monitor::EvaporativeSystem,
        Monitor::SecondaryAirSystem,
        Monitor::AcRefrigerant,
        Monitor::OxygenSensor,
        Monitor::OxygenSensorHeater,
        Monitor::EgrSystem,
        Monitor::NmhcCatalyst,
        Monitor::NoxScrMonitor,
        Monitor::BoostPressure,
        Monitor::ExhaustGasSensor,
        Monitor::PmFilter,
        Monitor::EgrVvtSystem,
    ];

    /// `None` for the continuous monitors reported by both ignition types.
    fn ignition(self) -> Option<Ignition> {
        match self {
            Monitor::Misfire | Monitor::FuelSystem | Monitor::ComprehensiveComponent => None,
            Monitor::Catalyst
            | Monitor::HeatedCatalyst
            | Monitor::EvaporativeSystem
            | Monitor::SecondaryAirSystem
            | Monitor::AcRefrigerant
            | Monitor::OxygenSensor
            | Monitor::OxygenSensorHeater
            | Monitor::EgrSystem => Some(Ignition::Spark),
            Monitor::NmhcCatalyst
            | Monitor::NoxScrMonitor
            | Monitor::BoostPressure
            | Monitor::ExhaustGasSensor
            | Monitor::PmFilter
            | Monitor::EgrVvtSystem => Some(Ignition::Compression),
        }
    }

    /// Bit position from the least significant bit, within the byte the
    /// monitor is reported in.
    fn bit(self) -> u32 {
        match self {
            Monitor::Misfire | Monitor::Catalyst | Monitor::NmhcCatalyst => 0,
            Monitor::FuelSystem | Monitor::HeatedCatalyst | Monitor::NoxScrMonitor => 1,
            Monitor::ComprehensiveComponent | Monitor::EvaporativeSystem => 2,
            Monitor::SecondaryAirSystem | Monitor::BoostPressure => 3,
            Monitor::AcRefrigerant => 4,
            Monitor::OxygenSensor | Monitor::ExhaustGasSensor => 5,
            Monitor::OxygenSensorHeater | Monitor::PmFilter => 6,
            Monitor::EgrSystem | Monitor::EgrVvtSystem => 7,
        }
    }
}

/// Result of one monitor's self test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorTest {
    pub available: bool,
    pub complete: bool,
}

/// Decoded monitor status answer (mode 01, PID 01 or 41).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorStatusData {
    /// Malfunction indicator lamp state.
    pub mil_on: bool,
    /// Number of confirmed trouble codes.
    pub dtc_count: u8,
    /// `true` for spark ignition (gasoline), `false` for compression
    /// ignition (diesel).
    pub spark_ignition: bool,
    /// Per-monitor test status, continuous monitors plus the set matching
    /// the reported ignition type.
    pub tests: BTreeMap<Monitor, MonitorTest>,
}

/// One of the five 32-PID windows of the mode 01 availability map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailablePidRange {
    Pids01To20,
    Pids21To40,
    Pids41To60,
    Pids61To80,
    Pids81ToA0,
}

impl AvailablePidRange {
    pub const ALL: [AvailablePidRange; 5] = [
        AvailablePidRange::Pids01To20,
        AvailablePidRange::Pids21To40,
        AvailablePidRange::Pids41To60,
        AvailablePidRange::Pids61To80,
        AvailablePidRange::Pids81ToA0,
    ];
}

pub fn module_voltage() -> ObdCommand {
    ObdCommand::new(
        "CONTROL_MODULE_VOLTAGE",
        "Control Module Power Supply",
        "01",
        "42",
        "V",
        |raw| {
            let millivolts = bytes_to_int(&raw.buffered_value()?, 2)? as f32;
            Ok(format!("{:.2}", millivolts / 1000.0).into())
        },
    )
}

pub fn timing_advance() -> ObdCommand {
    ObdCommand::new("TIMING_ADVANCE", "Timing Advance", "01", "0E", "°", |raw| {
        let value = bytes_to_int_n(&raw.buffered_value()?, 2, 1)? as f32;
        Ok(format!("{:.2}", value / 2.0 - 64.0).into())
    })
}

/// Vehicle identification number, mode 09 PID 02.
///
/// The answer arrives as ASCII encoded in hex, split over several frames
/// whose markers depend on the bus protocol, so byte validation is skipped
/// and the decoder works from the unprocessed response text.
pub fn vin() -> ObdCommand {
    ObdCommand {
        tag: "VIN".into(),
        name: "Vehicle Identification Number (VIN)".into(),
        mode: "09".into(),
        pid: "02".into(),
        default_unit: "".into(),
        skip_byte_validation: true,
        decoder: vin_decoder,
        formatter: default_formatter,
    }
}

/// Malfunction indicator lamp state, decoded from the first status byte.
pub fn mil_on() -> ObdCommand {
    ObdCommand {
        tag: "MIL_ON".into(),
        name: "MIL on".into(),
        mode: "01".into(),
        pid: "01".into(),
        default_unit: "".into(),
        skip_byte_validation: false,
        decoder: |raw| {
            let status = bytes_to_int_n(&raw.buffered_value()?, 2, 1)?;
            Ok((status & 0x80 != 0).to_string().into())
        },
        formatter: |response| {
            let state = if response.value == "true" { "ON" } else { "OFF" };
            format!("MIL is {state}")
        },
    }
}

pub fn dtc_number() -> ObdCommand {
    ObdCommand::new(
        "DTC_NUMBER",
        "Diagnostic Trouble Codes Number",
        "01",
        "01",
        " codes",
        |raw| {
            let status = bytes_to_int_n(&raw.buffered_value()?, 2, 1)?;
            Ok((status & 0x7F).to_string().into())
        },
    )
}

pub fn distance_traveled_mil_on() -> ObdCommand {
    ObdCommand::new(
        "DISTANCE_TRAVELED_MIL_ON",
        "Distance traveled with MIL on",
        "01",
        "21",
        "Km",
        |raw| Ok(bytes_to_int(&raw.buffered_value()?, 2)?.to_string().into()),
    )
}

pub fn time_traveled_mil_on() -> ObdCommand {
    ObdCommand::new(
        "TIME_TRAVELED_MIL_ON",
        "Time run with MIL on",
        "01",
        "4D",
        "min",
        |raw| Ok(bytes_to_int(&raw.buffered_value()?, 2)?.to_string().into()),
    )
}

pub fn distance_since_codes_cleared() -> ObdCommand {
    ObdCommand::new(
        "DISTANCE_TRAVELED_AFTER_CODES_CLEARED",
        "Distance traveled since codes cleared",
        "01",
        "31",
        "Km",
        |raw| Ok(bytes_to_int(&raw.buffered_value()?, 2)?.to_string().into()),
    )
}

pub fn time_since_codes_cleared() -> ObdCommand {
    ObdCommand::new(
        "TIME_SINCE_CODES_CLEARED",
        "Time since codes cleared",
        "01",
        "4E",
        "min",
        |raw| Ok(bytes_to_int(&raw.buffered_value()?, 2)?.to_string().into()),
    )
}

/// Monitor status since the codes were last cleared. The decoded bitfields
/// are returned as [`ObdData::MonitorStatus`]; the display value is empty.
pub fn monitor_status_since_codes_cleared() -> ObdCommand {
    ObdCommand::new(
        "MONITOR_STATUS_SINCE_CODES_CLEARED",
        "Monitor Status Since Codes Cleared",
        "01",
        "01",
        "",
        monitor_status_decoder,
    )
}

pub fn monitor_status_current_drive_cycle() -> ObdCommand {
    ObdCommand::new(
        "MONITOR_STATUS_CURRENT_DRIVE_CYCLE",
        "Monitor Status Current Drive Cycle",
        "01",
        "41",
        "",
        monitor_status_decoder,
    )
}

/// Stored trouble codes, mode 03. The codes are also returned as
/// [`ObdData::TroubleCodes`].
pub fn trouble_codes() -> ObdCommand {
    ObdCommand::new("TROUBLE_CODES", "Trouble Codes", "03", "", "", |raw| {
        decode_trouble_codes(raw, &MODE_03_ECHO_PATTERN)
    })
}

pub fn pending_trouble_codes() -> ObdCommand {
    ObdCommand::new(
        "PENDING_TROUBLE_CODES",
        "Pending Trouble Codes",
        "07",
        "",
        "",
        |raw| decode_trouble_codes(raw, &MODE_07_ECHO_PATTERN),
    )
}

pub fn permanent_trouble_codes() -> ObdCommand {
    ObdCommand::new(
        "PERMANENT_TROUBLE_CODES",
        "Permanent Trouble Codes",
        "0A",
        "",
        "",
        |raw| decode_trouble_codes(raw, &MODE_0A_ECHO_PATTERN),
    )
}

/// Clears stored trouble codes and turns the MIL off, mode 04. Sent as the
/// bare mode with no PID.
pub fn reset_trouble_codes() -> ObdCommand {
    ObdCommand::new(
        "RESET_TROUBLE_CODES",
        "Reset Trouble Codes",
        "04",
        "",
        "",
        passthrough_decoder,
    )
}

/// PIDs the vehicle reports as supported within the given range. The PID
/// numbers are also returned as [`ObdData::SupportedPids`].
pub fn available_pids(range: AvailablePidRange) -> ObdCommand {
    let (suffix, display, pid, decoder): (&str, &str, &str, DecodeFn) = match range {
        AvailablePidRange::Pids01To20 => {
            ("PIDS_01_TO_20", "PIDs from 01 to 20", "00", |raw| {
                supported_pids(raw, 0x00)
            })
        }
        AvailablePidRange::Pids21To40 => {
            ("PIDS_21_TO_40", "PIDs from 21 to 40", "20", |raw| {
                supported_pids(raw, 0x20)
            })
        }
        AvailablePidRange::Pids41To60 => {
            ("PIDS_41_TO_60", "PIDs from 41 to 60", "40", |raw| {
                supported_pids(raw, 0x40)
            })
        }
        AvailablePidRange::Pids61To80 => {
            ("PIDS_61_TO_80", "PIDs from 61 to 80", "60", |raw| {
                supported_pids(raw, 0x60)
            })
        }
        AvailablePidRange::Pids81ToA0 => {
            ("PIDS_81_TO_A0", "PIDs from 81 to A0", "80", |raw| {
                supported_pids(raw, 0x80)
            })
        }
    };
    ObdCommand::new(
        format!("AVAILABLE_COMMANDS_{suffix}"),
        format!("Available Commands - {display}"),
        "01",
        pid,
        "",
        decoder,
    )
}

fn vin_decoder(raw: &ObdRawResponse) -> Result<Decoded> {
    let cleaned = WHITESPACE_PATTERN.replace_all(&raw.value, "");
    let cleaned = BUS_INIT_PATTERN.replace_all(&cleaned, "");
    let payload = if cleaned.contains(':') {
        // CAN (ISO 15765-4): collapse the `n:` frame markers, then skip the
        // byte count and service echo.
        let candidate = FRAME_MARKER_PATTERN.replace_all(&cleaned, "");
        let trimmed = candidate
            .get(VIN_CAN_PREFIX_LENGTH..)
            .ok_or(Error::IndexOutOfRange {
                needed: VIN_CAN_PREFIX_LENGTH,
                available: candidate.len(),
            })?;
        if hex_to_ascii(trimmed)?
            .chars()
            .any(|c| !c.is_ascii_alphanumeric() && c != ' ')
        {
            // Some adapters put the service echo on the first frame only;
            // dropping it realigns the payload.
            FRAME_MARKER_PATTERN
                .replace_all(&cleaned.replace("0:49", ""), "")
                .into_owned()
        } else {
            trimmed.to_string()
        }
    } else {
        // ISO 9141-2 and KWP2000 echo `49 02 0n` at the start of every line.
        VIN_ECHO_PATTERN.replace_all(&cleaned, "").into_owned()
    };
    let vin: String = hex_to_ascii(&payload)?
        .chars()
        .filter(|c| *c > '\u{1f}')
        .collect();
    Ok(vin.into())
}

fn hex_to_ascii(hex: &str) -> Result<String> {
    let digits: Vec<char> = hex.chars().collect();
    digits
        .chunks(2)
        .map(|pair| {
            let text: String = pair.iter().collect();
            u32::from_str_radix(&text, 16)
                .ok()
                .and_then(char::from_u32)
                .ok_or(Error::MalformedHex { text })
        })
        .collect()
}

fn monitor_status_decoder(raw: &ObdRawResponse) -> Result<Decoded> {
    let buffer = raw.buffered_value()?;
    let window = &buffer[buffer.len().saturating_sub(4)..];
    match <&[u8; 4]>::try_from(window) {
        Ok(bytes) => Ok(Decoded::with_data(
            String::new(),
            ObdData::MonitorStatus(parse_monitor_status(bytes)),
        )),
        // Shorter answers carry no status bytes.
        Err(_) => Ok("".into()),
    }
}

/// Decodes the four status bytes `A B C D`:
///
/// ```text
/// A: MIL in bit 7, DTC count in bits 6-0
/// B: continuous monitors, availability in bits 2-0, incomplete in bits 6-4,
///    ignition type in bit 3 (0 = spark, 1 = compression)
/// C: ignition-specific availability bits
/// D: ignition-specific incomplete bits
/// ```
fn parse_monitor_status(bytes: &[u8; 4]) -> MonitorStatusData {
    let spark_ignition = (bytes[1] >> 3) & 1 == 0;
    let reported = if spark_ignition {
        Ignition::Spark
    } else {
        Ignition::Compression
    };

    let mut tests = BTreeMap::new();
    for monitor in Monitor::ALL {
        let bit = monitor.bit();
        let test = match monitor.ignition() {
            None => MonitorTest {
                available: (bytes[1] >> bit) & 1 == 1,
                complete: (bytes[1] >> (bit + 4)) & 1 == 0,
            },
            Some(ignition) if ignition == reported => MonitorTest {
                available: (bytes[2] >> bit) & 1 == 1,
                complete: (bytes[3] >> bit) & 1 == 0,
            },
            Some(_) => continue,
        };
        tests.insert(monitor, test);
    }

    MonitorStatusData {
        mil_on: bytes[0] & 0x80 != 0,
        dtc_count: bytes[0] & 0x7F,
        spark_ignition,
        tests,
    }
}

fn decode_trouble_codes(raw: &ObdRawResponse, mode_echo: &Regex) -> Result<Decoded> {
    let codes = parse_trouble_codes(&raw.value, mode_echo)?;
    Ok(Decoded::with_data(
        codes.join(","),
        ObdData::TroubleCodes(codes),
    ))
}

fn parse_trouble_codes(raw_text: &str, mode_echo: &Regex) -> Result<Vec<String>> {
    let stripped = WHITESPACE_PATTERN.replace_all(raw_text, "");
    let working = if stripped.len() <= 16 && stripped.len() % 4 == 0 {
        // CAN single frame `43yy[codes]`, yy being the number of codes.
        stripped.get(4..).unwrap_or_default().to_string()
    } else if raw_text.contains(':') {
        // CAN multi frame `xxx43yy[codes]` with `n:` line markers.
        let collapsed = CARRIAGE_COLON_PATTERN.replace_all(raw_text, "");
        collapsed.get(7..).unwrap_or_default().to_string()
    } else {
        // ISO 9141-2 and KWP2000 echo the mode on every line.
        let without_echo = mode_echo.replace_all(raw_text, "");
        WHITESPACE_PATTERN.replace_all(&without_echo, "").into_owned()
    };

    // Each code is four hex digits; the top two bits of the first digit pick
    // the system letter, the next two the first digit of the code.
    let digits: Vec<char> = working.chars().collect();
    let mut codes = Vec::with_capacity(digits.len() / 4 + 1);
    for chunk in digits.chunks(4) {
        let first = chunk[0].to_digit(16).ok_or_else(|| Error::MalformedHex {
            text: working.clone(),
        })?;
        let letter = DTC_LETTERS[((first >> 2) & 0b11) as usize];
        let digit = char::from(b'0' + (first & 0b11) as u8);
        let tail: String = chunk[1..].iter().collect();
        codes.push(format!("{:0<5}", format!("{letter}{digit}{tail}")));
    }

    // A P0000 entry is filler, everything after it is padding.
    if let Some(idx) = codes.iter().position(|code| code == "P0000") {
        codes.truncate(idx);
    }
    Ok(codes)
}

fn supported_pids(raw: &ObdRawResponse, base: u8) -> Result<Decoded> {
    let buffer = raw.buffered_value()?;
    let mask = bytes_to_int(&buffer, buffer.len().saturating_sub(4))? as u32;
    let pids: Vec<u8> = (1..=32u8)
        .filter(|&i| (mask >> (32 - u32::from(i))) & 1 == 1)
        .map(|i| base + i)
        .collect();
    let value = pids
        .iter()
        .map(|pid| format!("{pid:02X}"))
        .collect::<Vec<_>>()
        .join(",");
    Ok(Decoded::with_data(value, ObdData::SupportedPids(pids)))
}
