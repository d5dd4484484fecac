use crate::mqtt;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::time::Duration;

fn default_device_name() -> String {
    if cfg!(target_os = "windows") {
        String::from("COM1")
    } else {
        String::from("/dev/ttyUSB0")
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Show the monitor status: MIL state, trouble code count, readiness tests
    Status,
    /// Show the common sensor readings: speed, RPM, temperatures, pressures
    Sensors,
    /// Show the vehicle identification number
    Vin,
    /// Show stored diagnostic trouble codes
    TroubleCodes,
    /// Show pending diagnostic trouble codes
    PendingTroubleCodes,
    /// Show permanent diagnostic trouble codes
    PermanentTroubleCodes,
    /// Clear stored trouble codes and turn off the MIL (Use with caution!)
    ClearTroubleCodes,
    /// Show which PIDs the vehicle reports as supported
    AvailablePids,
    /// Show adapter protocol, supply voltage and ignition state
    AdapterInfo,
    /// Show all available vehicle information by running most read commands
    All,
    /// Run in daemon mode, periodically fetching and outputting metrics
    Daemon {
        /// Output destination for metrics
        #[command(subcommand)]
        output: DaemonOutput,
        /// Interval for fetching metrics (e.g., "10s", "1m")
        #[clap(long, short, value_parser = humantime::parse_duration, default_value = "10s")]
        interval: Duration,
        /// Comma-separated list of metrics to fetch (e.g., speed,rpm,coolant-temperature or all)
        #[clap(long, short, use_value_delimiter = true, default_value = "speed,rpm")]
        metrics: Vec<String>,
    },
}

#[derive(clap::ValueEnum, Debug, Clone, PartialEq)]
pub enum MqttFormat {
    Simple,
    Json,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum DaemonOutput {
    /// Continuously read metrics and print them to the standard output (console).
    Console,
    /// Continuously read metrics and publish them to an MQTT broker.
    Mqtt {
        /// The configuration file for the MQTT broker
        #[arg(long, default_value_t = mqtt::MqttConfig::DEFAULT_CONFIG_FILE.to_string())]
        config_file: String,
        /// Output format for MQTT messages
        #[arg(long, value_enum, default_value_t = MqttFormat::Simple)]
        format: MqttFormat,
    },
}

const fn about_text() -> &'static str {
    "ELM327 OBD-II command line tool"
}

#[derive(Parser, Debug)]
#[command(version, about=about_text(), long_about = None)]
pub struct CliArgs {
    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,

    /// Serial port device path (e.g., /dev/ttyUSB0 on Linux, COM1 on Windows)
    #[arg(short, long, default_value_t = default_device_name())]
    pub device: String,

    /// Serial port baud rate (ELM327 clones commonly use 38400 or 115200)
    #[arg(short, long, default_value = "38400")]
    pub baud_rate: u32,

    #[command(subcommand)]
    pub command: CliCommands,

    /// Length of one read window while waiting for the adapter to answer
    /// (e.g., "500ms", "1s")
    #[arg(value_parser = humantime::parse_duration, long, default_value = "500ms")]
    pub timeout: Duration,

    // Cheap ELM327 clones drop request characters when polled back to back.
    /// Delay between writing a request and reading the answer (e.g., "0ms", "100ms")
    #[arg(value_parser = humantime::parse_duration, long, default_value = "0ms")]
    pub delay: Duration,

    /// Number of additional read windows granted when the adapter stays silent
    #[arg(long, default_value = "5")]
    pub retries: u32,
}
