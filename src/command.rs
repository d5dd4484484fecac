use std::borrow::Cow;

use crate::commands::control::MonitorStatusData;
use crate::error::{check_response, Error, Result};
use crate::response::{ObdRawResponse, ObdResponse};

/// Decoder signature: pure function from a raw response to a decoded value.
pub type DecodeFn = fn(&ObdRawResponse) -> Result<Decoded>;
/// Formatter signature: renders a decoded response for display.
pub type FormatFn = fn(&ObdResponse) -> String;

/// A declarative OBD command: what to send and how to read the answer.
///
/// Commands are plain values produced by the factory functions in
/// [`crate::commands`]; custom commands can be built the same way.
#[derive(Debug, Clone)]
pub struct ObdCommand {
    /// Stable machine key, e.g. `ENGINE_RPM`.
    pub tag: Cow<'static, str>,
    /// Human readable name, e.g. `Engine RPM`.
    pub name: Cow<'static, str>,
    /// Service/mode code, e.g. `01`, or `AT` for adapter commands.
    pub mode: Cow<'static, str>,
    /// Parameter id within the mode; empty for mode-only commands.
    pub pid: Cow<'static, str>,
    /// Unit appended to the decoded value, possibly empty.
    pub default_unit: Cow<'static, str>,
    /// Skips the hex-digit sanity check for text-valued answers (VIN,
    /// adapter info).
    pub skip_byte_validation: bool,
    pub decoder: DecodeFn,
    pub formatter: FormatFn,
}

impl ObdCommand {
    /// A command with the default formatter and the hex-digit check enabled.
    /// The special cases (VIN, AT commands, MIL) spell out the struct
    /// literal instead.
    pub fn new(
        tag: impl Into<Cow<'static, str>>,
        name: impl Into<Cow<'static, str>>,
        mode: impl Into<Cow<'static, str>>,
        pid: impl Into<Cow<'static, str>>,
        default_unit: impl Into<Cow<'static, str>>,
        decoder: DecodeFn,
    ) -> Self {
        Self {
            tag: tag.into(),
            name: name.into(),
            mode: mode.into(),
            pid: pid.into(),
            default_unit: default_unit.into(),
            skip_byte_validation: false,
            decoder,
            formatter: default_formatter,
        }
    }

    /// The request line as written to the transport, without the trailing
    /// carriage return. The pid is omitted entirely when empty: clearing
    /// trouble codes sends `04`, not `04 `.
    pub fn raw_command(&self) -> String {
        if self.pid.is_empty() {
            self.mode.to_string()
        } else {
            format!("{} {}", self.mode, self.pid)
        }
    }

    /// Validates the raw response and runs this command's decoder on it.
    pub fn handle_response(&self, raw_response: &ObdRawResponse) -> Result<ObdResponse> {
        check_response(self, raw_response)?;
        let decoded = (self.decoder)(raw_response)?;
        Ok(ObdResponse {
            command: self.clone(),
            raw_response: raw_response.clone(),
            value: decoded.value,
            unit: self.default_unit.to_string(),
            data: decoded.data,
        })
    }
}

/// Output of a decoder: display text plus optional structured data.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub value: String,
    pub data: Option<ObdData>,
}

impl Decoded {
    pub fn with_data(value: impl Into<String>, data: ObdData) -> Self {
        Self {
            value: value.into(),
            data: Some(data),
        }
    }
}

impl From<String> for Decoded {
    fn from(value: String) -> Self {
        Self { value, data: None }
    }
}

impl From<&str> for Decoded {
    fn from(value: &str) -> Self {
        Self {
            value: value.to_owned(),
            data: None,
        }
    }
}

/// Structured decoder output, for commands whose answer is more than one
/// scalar.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ObdData {
    /// Parsed 5-character trouble codes, e.g. `P0103`.
    TroubleCodes(Vec<String>),
    /// Decoded monitor status bitfields.
    MonitorStatus(MonitorStatusData),
    /// PIDs reported as supported by an availability bitmask.
    SupportedPids(Vec<u8>),
}

/// Default decoder: the raw response text, unchanged.
pub fn passthrough_decoder(raw_response: &ObdRawResponse) -> Result<Decoded> {
    Ok(raw_response.value.clone().into())
}

/// Default formatter: value directly followed by the unit.
pub fn default_formatter(response: &ObdResponse) -> String {
    format!("{}{}", response.value, response.unit)
}

/// Interprets every byte from `start` as one big-endian unsigned integer.
///
/// An empty window means the adapter delivered fewer bytes than the command's
/// formula needs and is reported as [`Error::IndexOutOfRange`].
pub fn bytes_to_int(buffer: &[u8], start: usize) -> Result<u64> {
    match buffer.get(start..) {
        Some(window) if !window.is_empty() => Ok(fold_bytes(window)),
        _ => Err(Error::IndexOutOfRange {
            needed: start + 1,
            available: buffer.len(),
        }),
    }
}

/// Interprets the first `count` bytes from `start` as one big-endian
/// unsigned integer.
pub fn bytes_to_int_n(buffer: &[u8], start: usize, count: usize) -> Result<u64> {
    match buffer.get(start..start + count) {
        Some(window) if !window.is_empty() => Ok(fold_bytes(window)),
        _ => Err(Error::IndexOutOfRange {
            needed: start + count,
            available: buffer.len(),
        }),
    }
}

fn fold_bytes(window: &[u8]) -> u64 {
    window
        .iter()
        .fold(0u64, |total, byte| (total << 8) | u64::from(*byte))
}

/// Percentage helper for mode 01 answers: the data window scaled to 0-100.
pub fn calculate_percentage(buffer: &[u8]) -> Result<f32> {
    Ok(bytes_to_int(buffer, 2)? as f32 * 100.0 / 255.0)
}

/// Like [`calculate_percentage`] but over the first `count` data bytes only.
pub fn calculate_percentage_n(buffer: &[u8], count: usize) -> Result<f32> {
    Ok(bytes_to_int_n(buffer, 2, count)? as f32 * 100.0 / 255.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{control, engine};
    use std::time::Duration;

    #[test]
    fn bytes_to_int_whole_window() {
        assert_eq!(bytes_to_int(&[0x00], 0).unwrap(), 0);
        assert_eq!(bytes_to_int(&[0x01], 0).unwrap(), 1);
        assert_eq!(bytes_to_int(&[0x10], 0).unwrap(), 16);
        assert_eq!(bytes_to_int(&[0x11], 0).unwrap(), 17);
        assert_eq!(bytes_to_int(&[0xFF], 0).unwrap(), 255);
        assert_eq!(bytes_to_int(&[0xFF, 0xFF], 0).unwrap(), 65_535);
        assert_eq!(bytes_to_int(&[0xFF, 0x00], 0).unwrap(), 65_280);
        assert_eq!(bytes_to_int(&[0x41, 0x0D, 0x40], 2).unwrap(), 64);
    }

    #[test]
    fn bytes_to_int_limited_window() {
        assert_eq!(bytes_to_int_n(&[0x01], 0, 1).unwrap(), 1);
        assert_eq!(bytes_to_int_n(&[0xFF, 0xFF], 0, 1).unwrap(), 255);
        assert_eq!(bytes_to_int_n(&[0xFF, 0x00], 0, 1).unwrap(), 255);
        assert_eq!(bytes_to_int_n(&[0x41, 0x0D, 0x40, 0xFF], 2, 1).unwrap(), 64);
    }

    #[test]
    fn bytes_to_int_short_window_is_an_error() {
        assert!(matches!(
            bytes_to_int(&[0x41, 0x0D], 2),
            Err(Error::IndexOutOfRange {
                needed: 3,
                available: 2
            })
        ));
        assert!(matches!(
            bytes_to_int_n(&[0x41, 0x0D, 0x40], 2, 2),
            Err(Error::IndexOutOfRange {
                needed: 4,
                available: 3
            })
        ));
    }

    #[test]
    fn percentage_scales_the_data_window() {
        assert_eq!(calculate_percentage(&[0x41, 0x04, 0xFF]).unwrap(), 100.0);
        assert_eq!(calculate_percentage(&[0x41, 0x04, 0x00]).unwrap(), 0.0);
    }

    #[test]
    fn raw_command_joins_mode_and_pid() {
        assert_eq!(engine::speed().raw_command(), "01 0D");
        assert_eq!(engine::rpm().raw_command(), "01 0C");
    }

    #[test]
    fn raw_command_omits_empty_pid() {
        assert_eq!(control::reset_trouble_codes().raw_command(), "04");
        assert_eq!(control::trouble_codes().raw_command(), "03");
    }

    #[test]
    fn handle_response_validates_before_decoding() {
        let command = engine::speed();
        let raw = ObdRawResponse::new("NO DATA", Duration::ZERO);
        assert!(matches!(
            command.handle_response(&raw),
            Err(Error::NoData { .. })
        ));
    }

    #[test]
    fn handle_response_attaches_unit_and_raw() {
        let command = engine::speed();
        let raw = ObdRawResponse::new("41 0D 15", Duration::from_millis(7));
        let response = command.handle_response(&raw).unwrap();
        assert_eq!(response.value, "21");
        assert_eq!(response.unit, "Km/h");
        assert_eq!(response.formatted_value(), "21Km/h");
        assert_eq!(response.raw_response.elapsed_time, Duration::from_millis(7));
    }

    #[test]
    fn decoding_is_pure() {
        let command = engine::rpm();
        let raw = ObdRawResponse::new("41 0C 1A F8", Duration::ZERO);
        let first = command.handle_response(&raw).unwrap();
        let second = command.handle_response(&raw).unwrap();
        assert_eq!(first.value, second.value);
        assert_eq!(first.value, "1726");
    }
}
