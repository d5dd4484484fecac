use std::sync::LazyLock;

use regex::Regex;

use crate::command::ObdCommand;
use crate::response::ObdRawResponse;

static NEGATIVE_RESPONSE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^7F0[0-9A]1[12]$").expect("Invalid negative response regex"));
static HEX_DIGITS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9A-F:]+$").expect("Invalid hex digits regex"));

/// Errors reported by the protocol engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The adapter answered with text that does not look like hex data and
    /// the command did not opt out of the check.
    #[error("non-numeric response while executing command [{tag}], response [{response}]")]
    NonNumericResponse { tag: String, response: String },
    /// The adapter reported a bus initialization failure.
    #[error("bus init error while executing command [{tag}], response [{response}]")]
    BusInit { tag: String, response: String },
    /// The adapter answered with its `?` marker.
    #[error("adapter did not understand command [{tag}], response [{response}]")]
    MisunderstoodCommand { tag: String, response: String },
    /// The vehicle had no data for the requested parameter.
    #[error("no data from vehicle while executing command [{tag}], response [{response}]")]
    NoData { tag: String, response: String },
    /// The adapter aborted the operation (`STOPPED`).
    #[error("operation stopped while executing command [{tag}], response [{response}]")]
    Stopped { tag: String, response: String },
    /// The adapter could not reach the vehicle.
    #[error("unable to connect to the vehicle while executing command [{tag}], response [{response}]")]
    UnableToConnect { tag: String, response: String },
    /// A generic `ERROR` answer with no more specific marker.
    #[error("unknown error while executing command [{tag}], response [{response}]")]
    Unknown { tag: String, response: String },
    /// The ECU sent a negative response code for this service.
    #[error("unsupported command [{tag}], response [{response}]")]
    UnsupportedCommand { tag: String, response: String },
    /// Response text claiming to be hex is not parseable pairwise.
    #[error("malformed hex response [{text}]")]
    MalformedHex { text: String },
    /// A decoder needed more bytes than the response buffer holds.
    #[error("response too short, needed {needed} bytes but got {available}")]
    IndexOutOfRange { needed: usize, available: usize },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(any(feature = "serialport", feature = "tokio-serial-async"))]
    #[error("serial port error: {0}")]
    SerialPort(#[from] serialport::Error),
}

/// A specialized `Result` type for this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

macro_rules! classified {
    ($variant:ident, $command:expr, $response:expr) => {
        Error::$variant {
            tag: $command.tag.to_string(),
            response: $response.value.clone(),
        }
    };
}

/// Inspects a raw response for the known adapter error markers before any
/// decoding takes place. The first matching marker wins; the order below is
/// fixed, so a response containing both `NO DATA` and `ERROR` classifies as
/// [`Error::NoData`].
pub fn check_response(command: &ObdCommand, response: &ObdRawResponse) -> Result<()> {
    let sanitized = response
        .value
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();

    if sanitized.contains("BUSINIT...ERROR") {
        return Err(classified!(BusInit, command, response));
    }
    if sanitized.contains('?') {
        return Err(classified!(MisunderstoodCommand, command, response));
    }
    if sanitized.contains("NODATA") {
        return Err(classified!(NoData, command, response));
    }
    if sanitized.contains("STOPPED") {
        return Err(classified!(Stopped, command, response));
    }
    if sanitized.contains("UNABLETOCONNECT") {
        return Err(classified!(UnableToConnect, command, response));
    }
    if sanitized.contains("ERROR") {
        return Err(classified!(Unknown, command, response));
    }
    if NEGATIVE_RESPONSE_PATTERN.is_match(&sanitized) {
        return Err(classified!(UnsupportedCommand, command, response));
    }
    if !command.skip_byte_validation && !HEX_DIGITS_PATTERN.is_match(&sanitized) {
        return Err(classified!(NonNumericResponse, command, response));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{at, control, engine};
    use std::time::Duration;

    fn raw(value: &str) -> ObdRawResponse {
        ObdRawResponse::new(value, Duration::ZERO)
    }

    #[test]
    fn classifies_known_markers() {
        let command = engine::speed();
        assert!(matches!(
            check_response(&command, &raw("BUS INIT... ERROR")),
            Err(Error::BusInit { .. })
        ));
        assert!(matches!(
            check_response(&command, &raw("41 0D ?")),
            Err(Error::MisunderstoodCommand { .. })
        ));
        assert!(matches!(
            check_response(&command, &raw("NO DATA")),
            Err(Error::NoData { .. })
        ));
        assert!(matches!(
            check_response(&command, &raw("STOPPED")),
            Err(Error::Stopped { .. })
        ));
        assert!(matches!(
            check_response(&command, &raw("UNABLE TO CONNECT")),
            Err(Error::UnableToConnect { .. })
        ));
        assert!(matches!(
            check_response(&command, &raw("DATA ERROR")),
            Err(Error::Unknown { .. })
        ));
    }

    #[test]
    fn no_data_wins_over_generic_error() {
        let command = engine::speed();
        assert!(matches!(
            check_response(&command, &raw("NO DATA ERROR")),
            Err(Error::NoData { .. })
        ));
    }

    #[test]
    fn negative_response_code_is_unsupported_command() {
        let command = engine::speed();
        assert!(matches!(
            check_response(&command, &raw("7F 01 12")),
            Err(Error::UnsupportedCommand { .. })
        ));
        assert!(matches!(
            check_response(&command, &raw("7F0A11")),
            Err(Error::UnsupportedCommand { .. })
        ));
        // Prefixed or suffixed text is not a bare negative response.
        assert!(check_response(&command, &raw("41 7F 01 12 00")).is_ok());
    }

    #[test]
    fn non_hex_text_is_rejected_unless_skipped() {
        let command = engine::speed();
        assert!(matches!(
            check_response(&command, &raw("OK")),
            Err(Error::NonNumericResponse { .. })
        ));
        assert!(matches!(
            check_response(&command, &raw("")),
            Err(Error::NonNumericResponse { .. })
        ));

        let command = at::reset_adapter();
        assert!(check_response(&command, &raw("ELM327 v1.5")).is_ok());
        let command = control::vin();
        assert!(check_response(&command, &raw("0: 49 02 01 57 50 30")).is_ok());
    }

    #[test]
    fn clean_hex_passes() {
        let command = engine::speed();
        assert!(check_response(&command, &raw("41 0D 15")).is_ok());
        assert!(check_response(&command, &raw("410D15\r\n")).is_ok());
    }

    #[test]
    fn classified_errors_carry_tag_and_raw_text() {
        let command = engine::speed();
        match check_response(&command, &raw("NO DATA")) {
            Err(Error::NoData { tag, response }) => {
                assert_eq!(tag, "SPEED");
                assert_eq!(response, "NO DATA");
            }
            other => panic!("unexpected classification: {other:?}"),
        }
    }
}
