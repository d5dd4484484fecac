use anyhow::{Context, Result};
use clap::Parser;
use elm327_lib::blocking::ObdConnection;
use elm327_lib::command::{ObdCommand, ObdData};
use elm327_lib::commands::at::{self, ObdProtocol, Switcher};
use elm327_lib::commands::control::{self, AvailablePidRange};
use elm327_lib::commands::fuel::FuelTrimBank;
use elm327_lib::commands::{egr, engine, fuel, pressure, temperature};
use flexi_logger::{Logger, LoggerHandle};
use log::*;
use std::{ops::Deref, panic, time::Duration};

mod commandline;
mod daemon;
mod mqtt;

use commandline::{CliArgs, CliCommands};

type Connection = ObdConnection<Box<dyn serialport::SerialPort>>;

fn logging_init(loglevel: LevelFilter) -> LoggerHandle {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown>", 0, 0));
        let cause = panic_info
            .payload()
            .downcast_ref::<String>()
            .map(String::deref);
        let cause = cause.unwrap_or_else(|| {
            panic_info
                .payload()
                .downcast_ref::<&str>()
                .copied()
                .unwrap_or("<cause unknown>")
        });

        error!(
            "Thread '{}' panicked at {}:{}:{}: {}",
            std::thread::current().name().unwrap_or("<unknown>"),
            filename,
            line,
            column,
            cause
        );
    }));
    log_handle
}

/// Puts the adapter into a known state: no echo, no line feeds, automatic
/// protocol selection.
fn init_adapter(connection: &mut Connection, delay: Duration, retries: u32) -> Result<()> {
    for command in [
        at::reset_adapter(),
        at::set_echo(Switcher::Off),
        at::set_line_feed(Switcher::Off),
        at::select_protocol(ObdProtocol::Auto),
    ] {
        connection
            .run(&command, false, delay, retries)
            .with_context(|| format!("Cannot run '{}'", command.name))?;
    }
    Ok(())
}

fn sensor_commands() -> Vec<ObdCommand> {
    vec![
        engine::speed(),
        engine::rpm(),
        engine::load(),
        engine::absolute_load(),
        engine::throttle_position(),
        engine::relative_throttle_position(),
        engine::mass_air_flow(),
        engine::runtime(),
        temperature::engine_coolant_temperature(),
        temperature::air_intake_temperature(),
        temperature::ambient_air_temperature(),
        temperature::engine_oil_temperature(),
        pressure::barometric_pressure(),
        pressure::intake_manifold_pressure(),
        pressure::fuel_pressure(),
        pressure::fuel_rail_pressure(),
        pressure::fuel_rail_gauge_pressure(),
        fuel::fuel_level(),
        fuel::consumption_rate(),
        fuel::fuel_type(),
        fuel::ethanol_level(),
        fuel::fuel_trim(FuelTrimBank::ShortTermBank1),
        fuel::fuel_trim(FuelTrimBank::LongTermBank1),
        fuel::commanded_equivalence_ratio(),
        egr::commanded_egr(),
        egr::egr_error(),
        control::timing_advance(),
        control::module_voltage(),
    ]
}

/// Polls the whole sensor catalog once. Vehicles support different PID
/// subsets, so unsupported answers are logged and skipped instead of
/// aborting the sweep.
fn print_sensors(connection: &mut Connection, delay: Duration, retries: u32) -> Result<()> {
    for command in sensor_commands() {
        match connection.run(&command, false, delay, retries) {
            Ok(response) => println!("{}: {}", command.name, response.formatted_value()),
            Err(e) => warn!("Cannot read '{}': {e}", command.name),
        }
    }
    Ok(())
}

fn print_status(connection: &mut Connection, delay: Duration, retries: u32) -> Result<()> {
    let response = connection
        .run(
            &control::monitor_status_since_codes_cleared(),
            false,
            delay,
            retries,
        )
        .with_context(|| "Cannot get monitor status")?;
    match response.data {
        Some(ObdData::MonitorStatus(status)) => {
            println!("MIL: {}", if status.mil_on { "ON" } else { "OFF" });
            println!("Stored trouble codes: {}", status.dtc_count);
            println!(
                "Ignition: {}",
                if status.spark_ignition {
                    "spark"
                } else {
                    "compression"
                }
            );
            for (monitor, test) in &status.tests {
                let state = if !test.available {
                    "not available"
                } else if test.complete {
                    "complete"
                } else {
                    "incomplete"
                };
                println!("  {monitor:?}: {state}");
            }
        }
        _ => println!("Monitor status: {}", response.value),
    }
    Ok(())
}

fn print_vin(connection: &mut Connection, delay: Duration, retries: u32) -> Result<()> {
    let response = connection
        .run(&control::vin(), true, delay, retries)
        .with_context(|| "Cannot get VIN")?;
    println!("VIN: {}", response.value);
    Ok(())
}

fn print_trouble_codes(
    connection: &mut Connection,
    command: &ObdCommand,
    delay: Duration,
    retries: u32,
) -> Result<()> {
    match connection.run(command, false, delay, retries) {
        Ok(response) => match response.data {
            Some(ObdData::TroubleCodes(codes)) if !codes.is_empty() => {
                println!("{}:", command.name);
                for code in codes {
                    println!("  {code}");
                }
            }
            _ => println!("{}: none", command.name),
        },
        // Some adapters answer a code-less mode 03 with NO DATA.
        Err(elm327_lib::Error::NoData { .. }) => println!("{}: none", command.name),
        Err(e) => {
            return Err(e).with_context(|| format!("Cannot get {}", command.name.to_lowercase()))
        }
    }
    Ok(())
}

fn clear_trouble_codes(connection: &mut Connection, delay: Duration, retries: u32) -> Result<()> {
    connection
        .run(&control::reset_trouble_codes(), false, delay, retries)
        .with_context(|| "Cannot clear trouble codes")?;
    println!("Trouble codes cleared, MIL reset.");
    Ok(())
}

fn print_available_pids(connection: &mut Connection, delay: Duration, retries: u32) -> Result<()> {
    for range in AvailablePidRange::ALL {
        let command = control::available_pids(range);
        match connection.run(&command, true, delay, retries) {
            Ok(response) => println!("{}: {}", command.name, response.value),
            // The ranges chain, an unsupported window ends the map.
            Err(elm327_lib::Error::NoData { .. }) => {
                println!("{}: none", command.name);
                break;
            }
            Err(e) => warn!("Cannot read '{}': {e}", command.name),
        }
    }
    Ok(())
}

fn print_adapter_info(connection: &mut Connection, delay: Duration, retries: u32) -> Result<()> {
    for command in [
        at::describe_protocol(),
        at::describe_protocol_number(),
        at::adapter_voltage(),
        at::ignition_monitor(),
    ] {
        let response = connection
            .run(&command, false, delay, retries)
            .with_context(|| format!("Cannot run '{}'", command.name))?;
        println!("{}: {}", command.name, response.value);
    }
    Ok(())
}

fn main() -> Result<()> {
    let CliArgs {
        verbose,
        device,
        baud_rate,
        command,
        timeout,
        delay,
        retries,
    } = CliArgs::parse();

    let _log_handle = logging_init(verbose.log_level_filter());

    let mut connection = ObdConnection::open(&device, baud_rate)
        .with_context(|| format!("Cannot open serial port '{device}'"))?;
    connection.set_timeout(timeout)?;

    init_adapter(&mut connection, delay, retries)?;

    match command {
        CliCommands::Status => print_status(&mut connection, delay, retries)?,
        CliCommands::Sensors => print_sensors(&mut connection, delay, retries)?,
        CliCommands::Vin => print_vin(&mut connection, delay, retries)?,
        CliCommands::TroubleCodes => {
            print_trouble_codes(&mut connection, &control::trouble_codes(), delay, retries)?
        }
        CliCommands::PendingTroubleCodes => print_trouble_codes(
            &mut connection,
            &control::pending_trouble_codes(),
            delay,
            retries,
        )?,
        CliCommands::PermanentTroubleCodes => print_trouble_codes(
            &mut connection,
            &control::permanent_trouble_codes(),
            delay,
            retries,
        )?,
        CliCommands::ClearTroubleCodes => clear_trouble_codes(&mut connection, delay, retries)?,
        CliCommands::AvailablePids => print_available_pids(&mut connection, delay, retries)?,
        CliCommands::AdapterInfo => print_adapter_info(&mut connection, delay, retries)?,
        CliCommands::All => {
            print_adapter_info(&mut connection, delay, retries)?;
            print_vin(&mut connection, delay, retries)?;
            print_status(&mut connection, delay, retries)?;
            print_available_pids(&mut connection, delay, retries)?;
            print_sensors(&mut connection, delay, retries)?;
            print_trouble_codes(&mut connection, &control::trouble_codes(), delay, retries)?;
            print_trouble_codes(
                &mut connection,
                &control::pending_trouble_codes(),
                delay,
                retries,
            )?;
        }
        CliCommands::Daemon {
            output,
            interval,
            metrics,
        } => daemon::run(connection, delay, retries, output, interval, metrics)?,
    }

    Ok(())
}
