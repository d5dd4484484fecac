//! ELM327 adapter commands (`AT` prefix): resets, protocol selection and
//! interface switches.
//!
//! Adapter answers are free text (`OK`, `ELM327 v1.5`, protocol names), so
//! every command here skips the hex-digit check and passes the response
//! through unless noted otherwise.

use std::borrow::Cow;

use crate::command::{default_formatter, passthrough_decoder, Decoded, ObdCommand};
use crate::error::Result;
use crate::response::ObdRawResponse;

/// Bus protocols selectable via `AT SP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObdProtocol {
    Unknown,
    /// Search and remember.
    Auto,
    /// 41.6 kbaud.
    SaeJ1850Pwm,
    /// 10.4 kbaud.
    SaeJ1850Vpw,
    /// 5 baud init.
    Iso9141_2,
    /// 5 baud init.
    Iso14230_4Kwp,
    /// Fast init.
    Iso14230_4KwpFast,
    /// 11 bit ID, 500 kbaud.
    Iso15765_4Can,
    /// 29 bit ID, 500 kbaud.
    Iso15765_4CanB,
    /// 11 bit ID, 250 kbaud.
    Iso15765_4CanC,
    /// 29 bit ID, 250 kbaud.
    Iso15765_4CanD,
    /// 29 bit ID, 250 kbaud, user adjustable.
    SaeJ1939Can,
}

impl ObdProtocol {
    pub fn display_name(self) -> &'static str {
        match self {
            ObdProtocol::Unknown => "Unknown Protocol",
            ObdProtocol::Auto => "Auto",
            ObdProtocol::SaeJ1850Pwm => "SAE J1850 PWM",
            ObdProtocol::SaeJ1850Vpw => "SAE J1850 VPW",
            ObdProtocol::Iso9141_2 => "ISO 9141-2",
            ObdProtocol::Iso14230_4Kwp => "ISO 14230-4 (KWP 5BAUD)",
            ObdProtocol::Iso14230_4KwpFast => "ISO 14230-4 (KWP FAST)",
            ObdProtocol::Iso15765_4Can => "ISO 15765-4 (CAN 11/500)",
            ObdProtocol::Iso15765_4CanB => "ISO 15765-4 (CAN 29/500)",
            ObdProtocol::Iso15765_4CanC => "ISO 15765-4 (CAN 11/250)",
            ObdProtocol::Iso15765_4CanD => "ISO 15765-4 (CAN 29/250)",
            ObdProtocol::SaeJ1939Can => "SAE J1939 (CAN 29/250)",
        }
    }

    /// The `AT SP` selector digit; empty for [`ObdProtocol::Unknown`].
    fn command(self) -> &'static str {
        match self {
            ObdProtocol::Unknown => "",
            ObdProtocol::Auto => "0",
            ObdProtocol::SaeJ1850Pwm => "1",
            ObdProtocol::SaeJ1850Vpw => "2",
            ObdProtocol::Iso9141_2 => "3",
            ObdProtocol::Iso14230_4Kwp => "4",
            ObdProtocol::Iso14230_4KwpFast => "5",
            ObdProtocol::Iso15765_4Can => "6",
            ObdProtocol::Iso15765_4CanB => "7",
            ObdProtocol::Iso15765_4CanC => "8",
            ObdProtocol::Iso15765_4CanD => "9",
            ObdProtocol::SaeJ1939Can => "A",
        }
    }

    fn tag_name(self) -> &'static str {
        match self {
            ObdProtocol::Unknown => "UNKNOWN",
            ObdProtocol::Auto => "AUTO",
            ObdProtocol::SaeJ1850Pwm => "SAE_J1850_PWM",
            ObdProtocol::SaeJ1850Vpw => "SAE_J1850_VPW",
            ObdProtocol::Iso9141_2 => "ISO_9141_2",
            ObdProtocol::Iso14230_4Kwp => "ISO_14230_4_KWP",
            ObdProtocol::Iso14230_4KwpFast => "ISO_14230_4_KWP_FAST",
            ObdProtocol::Iso15765_4Can => "ISO_15765_4_CAN",
            ObdProtocol::Iso15765_4CanB => "ISO_15765_4_CAN_B",
            ObdProtocol::Iso15765_4CanC => "ISO_15765_4_CAN_C",
            ObdProtocol::Iso15765_4CanD => "ISO_15765_4_CAN_D",
            ObdProtocol::SaeJ1939Can => "SAE_J1939_CAN",
        }
    }

    fn from_selector(selector: char) -> ObdProtocol {
        match selector {
            '0' => ObdProtocol::Auto,
            '1' => ObdProtocol::SaeJ1850Pwm,
            '2' => ObdProtocol::SaeJ1850Vpw,
            '3' => ObdProtocol::Iso9141_2,
            '4' => ObdProtocol::Iso14230_4Kwp,
            '5' => ObdProtocol::Iso14230_4KwpFast,
            '6' => ObdProtocol::Iso15765_4Can,
            '7' => ObdProtocol::Iso15765_4CanB,
            '8' => ObdProtocol::Iso15765_4CanC,
            '9' => ObdProtocol::Iso15765_4CanD,
            'A' => ObdProtocol::SaeJ1939Can,
            _ => ObdProtocol::Unknown,
        }
    }
}

/// `AT AT` adaptive timing control modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptiveTimingMode {
    Off,
    Auto1,
    Auto2,
}

impl AdaptiveTimingMode {
    fn display_name(self) -> &'static str {
        match self {
            AdaptiveTimingMode::Off => "Off",
            AdaptiveTimingMode::Auto1 => "Auto 1",
            AdaptiveTimingMode::Auto2 => "Auto 2",
        }
    }

    fn command(self) -> &'static str {
        match self {
            AdaptiveTimingMode::Off => "0",
            AdaptiveTimingMode::Auto1 => "1",
            AdaptiveTimingMode::Auto2 => "2",
        }
    }

    fn tag_name(self) -> &'static str {
        match self {
            AdaptiveTimingMode::Off => "OFF",
            AdaptiveTimingMode::Auto1 => "AUTO_1",
            AdaptiveTimingMode::Auto2 => "AUTO_2",
        }
    }
}

/// On/off argument for the interface switches (echo, headers, line feed,
/// spaces).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Switcher {
    On,
    Off,
}

impl Switcher {
    fn command(self) -> &'static str {
        match self {
            Switcher::On => "1",
            Switcher::Off => "0",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Switcher::On => "ON",
            Switcher::Off => "OFF",
        }
    }
}

fn at_command(
    tag: impl Into<Cow<'static, str>>,
    name: impl Into<Cow<'static, str>>,
    pid: impl Into<Cow<'static, str>>,
) -> ObdCommand {
    ObdCommand {
        tag: tag.into(),
        name: name.into(),
        mode: "AT".into(),
        pid: pid.into(),
        default_unit: "".into(),
        skip_byte_validation: true,
        decoder: passthrough_decoder,
        formatter: default_formatter,
    }
}

pub fn reset_adapter() -> ObdCommand {
    at_command("RESET_ADAPTER", "Reset OBD Adapter", "Z")
}

pub fn warm_start() -> ObdCommand {
    at_command("WARM_START", "OBD Warm Start", "WS")
}

pub fn slow_initiation() -> ObdCommand {
    at_command("SLOW_INITIATION", "OBD Slow Initiation", "SI")
}

pub fn low_power_mode() -> ObdCommand {
    at_command("LOW_POWER_MODE", "OBD Low Power Mode", "LP")
}

pub fn buffer_dump() -> ObdCommand {
    at_command("BUFFER_DUMP", "OBD Buffer Dump", "BD")
}

pub fn bypass_initialization() -> ObdCommand {
    at_command(
        "BYPASS_INITIALIZATION",
        "OBD Bypass Initialization Sequence",
        "BI",
    )
}

pub fn protocol_close() -> ObdCommand {
    at_command("PROTOCOL_CLOSE", "OBD Protocol Close", "PC")
}

/// The bus protocol in use, as free text from the adapter.
pub fn describe_protocol() -> ObdCommand {
    at_command("DESCRIBE_PROTOCOL", "Describe Protocol", "DP")
}

/// The bus protocol in use as a selector digit, decoded to its display
/// name. An `A` prefix (`A6`) marks an auto-selected protocol.
pub fn describe_protocol_number() -> ObdCommand {
    ObdCommand {
        decoder: describe_protocol_number_decoder,
        ..at_command("DESCRIBE_PROTOCOL_NUMBER", "Describe Protocol Number", "DPN")
    }
}

/// Whether the adapter sees the ignition line high, normalized to
/// `ON`/`OFF`.
pub fn ignition_monitor() -> ObdCommand {
    ObdCommand {
        decoder: |raw| Ok(raw.value.trim().to_uppercase().into()),
        ..at_command("IGNITION_MONITOR", "Ignition Monitor", "IGN")
    }
}

pub fn adapter_voltage() -> ObdCommand {
    at_command("ADAPTER_VOLTAGE", "OBD Adapter Voltage", "RV")
}

/// Selects the bus protocol. [`ObdProtocol::Unknown`] has no selector and
/// falls back to [`ObdProtocol::Auto`].
pub fn select_protocol(protocol: ObdProtocol) -> ObdCommand {
    let protocol = if protocol == ObdProtocol::Unknown {
        ObdProtocol::Auto
    } else {
        protocol
    };
    at_command(
        format!("SELECT_PROTOCOL_{}", protocol.tag_name()),
        format!("Select Protocol - {}", protocol.display_name()),
        format!("SP {}", protocol.command()),
    )
}

pub fn set_adaptive_timing(mode: AdaptiveTimingMode) -> ObdCommand {
    at_command(
        format!("SET_ADAPTIVE_TIMING_{}", mode.tag_name()),
        format!("Set Adaptive Timing Control {}", mode.display_name()),
        format!("AT {}", mode.command()),
    )
}

pub fn set_echo(state: Switcher) -> ObdCommand {
    at_command(
        format!("SET_ECHO_{}", state.label()),
        format!("Set Echo {}", state.label()),
        format!("E{}", state.command()),
    )
}

pub fn set_headers(state: Switcher) -> ObdCommand {
    at_command(
        format!("SET_HEADERS_{}", state.label()),
        format!("Set Headers {}", state.label()),
        format!("H{}", state.command()),
    )
}

pub fn set_line_feed(state: Switcher) -> ObdCommand {
    at_command(
        format!("SET_LINE_FEED_{}", state.label()),
        format!("Set Line Feed {}", state.label()),
        format!("L{}", state.command()),
    )
}

pub fn set_spaces(state: Switcher) -> ObdCommand {
    at_command(
        format!("SET_SPACES_{}", state.label()),
        format!("Set Spaces {}", state.label()),
        format!("S{}", state.command()),
    )
}

/// Adapter answer timeout in units of 4 ms, sent as unpadded hex.
pub fn set_timeout(timeout: u8) -> ObdCommand {
    at_command(
        "SET_TIMEOUT",
        format!("Set Timeout - {timeout}"),
        format!("ST {timeout:x}"),
    )
}

fn describe_protocol_number_decoder(raw: &ObdRawResponse) -> Result<Decoded> {
    // A two character answer is `A` plus the digit, anything else starts
    // with the digit itself.
    let index = usize::from(raw.value.len() == 2);
    let protocol = raw
        .value
        .chars()
        .nth(index)
        .map_or(ObdProtocol::Unknown, ObdProtocol::from_selector);
    Ok(protocol.display_name().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::response::ObdRawResponse;
    use std::time::Duration;

    fn decode(command: &ObdCommand, raw: &str) -> String {
        command
            .handle_response(&ObdRawResponse::new(raw, Duration::ZERO))
            .unwrap()
            .formatted_value()
    }

    #[test]
    fn adapter_commands_use_the_at_mode() {
        assert_eq!(reset_adapter().raw_command(), "AT Z");
        assert_eq!(warm_start().raw_command(), "AT WS");
        assert_eq!(buffer_dump().raw_command(), "AT BD");
        assert_eq!(adapter_voltage().raw_command(), "AT RV");
        assert_eq!(describe_protocol().raw_command(), "AT DP");
    }

    #[test]
    fn switches_encode_their_state() {
        assert_eq!(set_echo(Switcher::Off).raw_command(), "AT E0");
        assert_eq!(set_echo(Switcher::On).raw_command(), "AT E1");
        assert_eq!(set_line_feed(Switcher::Off).raw_command(), "AT L0");
        assert_eq!(set_headers(Switcher::On).raw_command(), "AT H1");
        assert_eq!(set_spaces(Switcher::Off).raw_command(), "AT S0");
        assert_eq!(set_echo(Switcher::Off).tag, "SET_ECHO_OFF");
        assert_eq!(set_echo(Switcher::Off).name, "Set Echo OFF");
    }

    #[test]
    fn protocol_selection() {
        assert_eq!(select_protocol(ObdProtocol::Auto).raw_command(), "AT SP 0");
        assert_eq!(
            select_protocol(ObdProtocol::Iso15765_4Can).raw_command(),
            "AT SP 6"
        );
        assert_eq!(
            select_protocol(ObdProtocol::SaeJ1939Can).raw_command(),
            "AT SP A"
        );

        // There is no selector for an unknown protocol.
        let command = select_protocol(ObdProtocol::Unknown);
        assert_eq!(command.raw_command(), "AT SP 0");
        assert_eq!(command.tag, "SELECT_PROTOCOL_AUTO");
        assert_eq!(command.name, "Select Protocol - Auto");
    }

    #[test]
    fn adaptive_timing_modes() {
        assert_eq!(
            set_adaptive_timing(AdaptiveTimingMode::Off).raw_command(),
            "AT AT 0"
        );
        let command = set_adaptive_timing(AdaptiveTimingMode::Auto1);
        assert_eq!(command.raw_command(), "AT AT 1");
        assert_eq!(command.tag, "SET_ADAPTIVE_TIMING_AUTO_1");
        assert_eq!(command.name, "Set Adaptive Timing Control Auto 1");
    }

    #[test]
    fn timeout_is_sent_as_unpadded_hex() {
        assert_eq!(set_timeout(100).raw_command(), "AT ST 64");
        assert_eq!(set_timeout(255).raw_command(), "AT ST ff");
        assert_eq!(set_timeout(5).raw_command(), "AT ST 5");
        assert_eq!(set_timeout(100).name, "Set Timeout - 100");
    }

    #[test]
    fn adapter_text_passes_validation() {
        assert_eq!(decode(&reset_adapter(), "ELM327 v1.5"), "ELM327 v1.5");
        assert_eq!(decode(&set_echo(Switcher::Off), "OK"), "OK");
    }

    #[test]
    fn adapter_errors_are_still_classified() {
        let command = reset_adapter();
        let raw = ObdRawResponse::new("?", Duration::ZERO);
        assert!(matches!(
            command.handle_response(&raw),
            Err(Error::MisunderstoodCommand { .. })
        ));
    }

    #[test]
    fn protocol_number_decodes_to_a_display_name() {
        let command = describe_protocol_number();
        assert_eq!(decode(&command, "6"), "ISO 15765-4 (CAN 11/500)");
        assert_eq!(decode(&command, "A6"), "ISO 15765-4 (CAN 11/500)");
        assert_eq!(decode(&command, "3"), "ISO 9141-2");
        assert_eq!(decode(&command, "0"), "Auto");
        assert_eq!(decode(&command, "A0"), "Auto");
        assert_eq!(decode(&command, "X"), "Unknown Protocol");
    }

    #[test]
    fn ignition_monitor_normalizes_case() {
        let command = ignition_monitor();
        assert_eq!(decode(&command, "on"), "ON");
        assert_eq!(decode(&command, " Off \r"), "OFF");
        assert_eq!(decode(&command, "OFF"), "OFF");
    }
}
