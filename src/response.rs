use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::command::{ObdCommand, ObdData};
use crate::error::{Error, Result};

pub(crate) static WHITESPACE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s").expect("Invalid whitespace regex"));
pub(crate) static BUS_INIT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(BUS INIT)|(BUSINIT)|(\.)").expect("Invalid bus init regex"));
pub(crate) static SEARCHING_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("SEARCHING").expect("Invalid searching regex"));

/// One raw line as received from the adapter, before any decoding.
///
/// The value keeps every byte the transport delivered (whitespace, carriage
/// returns, multi-frame colon prefixes included); decoders that depend on the
/// original framing read it directly, everything else goes through
/// [`processed_value`](Self::processed_value).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObdRawResponse {
    /// The as-received response text.
    pub value: String,
    /// Wall-clock time spent sending the request and reading the answer.
    pub elapsed_time: Duration,
}

impl ObdRawResponse {
    pub fn new(value: impl Into<String>, elapsed_time: Duration) -> Self {
        Self {
            value: value.into(),
            elapsed_time,
        }
    }

    /// The response text with whitespace, bus-init chatter and frame colons
    /// stripped. The adapter talks in ASCII with decorative spacing, so `41 0C
    /// 1A F8` and `410C1AF8` normalize to the same text.
    pub fn processed_value(&self) -> String {
        let stripped = WHITESPACE_PATTERN.replace_all(&self.value, "");
        let stripped = BUS_INIT_PATTERN.replace_all(&stripped, "");
        stripped.replace(':', "")
    }

    /// The processed text parsed as hex pairs, most significant byte first.
    ///
    /// Odd-length or non-hex text is a protocol mismatch and reported as
    /// [`Error::MalformedHex`], never silently truncated.
    pub fn buffered_value(&self) -> Result<Vec<u8>> {
        let processed = self.processed_value();
        if processed.len() % 2 != 0 {
            return Err(Error::MalformedHex { text: processed });
        }
        (0..processed.len())
            .step_by(2)
            .map(|i| {
                u8::from_str_radix(&processed[i..i + 2], 16).map_err(|_| Error::MalformedHex {
                    text: processed.clone(),
                })
            })
            .collect()
    }
}

/// A decoded command response.
#[derive(Debug, Clone)]
pub struct ObdResponse {
    /// The command this response answers.
    pub command: ObdCommand,
    /// The raw line the value was decoded from.
    pub raw_response: ObdRawResponse,
    /// The decoded value as display text.
    pub value: String,
    /// Unit for the value, possibly empty.
    pub unit: String,
    /// Structured side output for the decoders that produce one.
    pub data: Option<ObdData>,
}

impl ObdResponse {
    /// Value and unit rendered through the command's formatter.
    pub fn formatted_value(&self) -> String {
        (self.command.formatter)(self)
    }
}
