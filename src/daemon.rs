use anyhow::{bail, Context, Result};
use elm327_lib::blocking::ObdConnection;
use elm327_lib::command::{ObdCommand, ObdData};
use elm327_lib::commands::{control, engine, fuel, pressure, temperature};
use elm327_lib::response::ObdResponse;
use log::{error, info, warn};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

use crate::{commandline, mqtt};

type Connection = ObdConnection<Box<dyn serialport::SerialPort>>;

/// The wire shape of one published metric.
#[derive(Debug, serde::Serialize)]
struct MetricReading {
    value: String,
    unit: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<ObdData>,
}

fn reading_to_json(response: &ObdResponse) -> Result<serde_json::Value> {
    serde_json::to_value(MetricReading {
        value: response.value.clone(),
        unit: response.unit.clone(),
        data: response.data.clone(),
    })
    .map_err(Into::into)
}

struct Metric {
    command: fn() -> ObdCommand,
    /// Whether the answer can be served from the connection cache. Only
    /// values that cannot change while the ignition is on qualify.
    cacheable: bool,
}

fn get_metrics() -> HashMap<&'static str, Metric> {
    let mut metrics: HashMap<&'static str, Metric> = HashMap::new();
    metrics.insert(
        "speed",
        Metric {
            command: engine::speed,
            cacheable: false,
        },
    );
    metrics.insert(
        "rpm",
        Metric {
            command: engine::rpm,
            cacheable: false,
        },
    );
    metrics.insert(
        "engine-load",
        Metric {
            command: engine::load,
            cacheable: false,
        },
    );
    metrics.insert(
        "throttle",
        Metric {
            command: engine::throttle_position,
            cacheable: false,
        },
    );
    metrics.insert(
        "mass-air-flow",
        Metric {
            command: engine::mass_air_flow,
            cacheable: false,
        },
    );
    metrics.insert(
        "runtime",
        Metric {
            command: engine::runtime,
            cacheable: false,
        },
    );
    metrics.insert(
        "coolant-temperature",
        Metric {
            command: temperature::engine_coolant_temperature,
            cacheable: false,
        },
    );
    metrics.insert(
        "intake-temperature",
        Metric {
            command: temperature::air_intake_temperature,
            cacheable: false,
        },
    );
    metrics.insert(
        "intake-pressure",
        Metric {
            command: pressure::intake_manifold_pressure,
            cacheable: false,
        },
    );
    metrics.insert(
        "fuel-level",
        Metric {
            command: fuel::fuel_level,
            cacheable: false,
        },
    );
    metrics.insert(
        "consumption-rate",
        Metric {
            command: fuel::consumption_rate,
            cacheable: false,
        },
    );
    metrics.insert(
        "voltage",
        Metric {
            command: control::module_voltage,
            cacheable: false,
        },
    );
    metrics.insert(
        "status",
        Metric {
            command: control::monitor_status_since_codes_cleared,
            cacheable: false,
        },
    );
    metrics.insert(
        "trouble-codes",
        Metric {
            command: control::trouble_codes,
            cacheable: false,
        },
    );
    metrics.insert(
        "vin",
        Metric {
            command: control::vin,
            cacheable: true,
        },
    );
    metrics
}

fn publish_simple_format(
    publisher: &mqtt::MqttPublisher,
    base_topic: &str,
    metric_name: &str,
    value: &serde_json::Value,
) {
    fn publish_recursive(publisher: &mqtt::MqttPublisher, topic: &str, val: &serde_json::Value) {
        match val {
            serde_json::Value::Object(map) => {
                for (k, v) in map {
                    let sub_topic = format!("{topic}/{k}");
                    publish_recursive(publisher, &sub_topic, v);
                }
            }
            serde_json::Value::Array(arr) => {
                for (i, v) in arr.iter().enumerate() {
                    let sub_topic = format!("{topic}/{i}");
                    publish_recursive(publisher, &sub_topic, v);
                }
            }
            serde_json::Value::String(s) => {
                if let Err(e) = publisher.publish(topic, s) {
                    error!("Failed to publish message to topic {topic}: {e}");
                }
            }
            serde_json::Value::Number(n) => {
                if let Err(e) = publisher.publish(topic, &n.to_string()) {
                    error!("Failed to publish message to topic {topic}: {e}");
                }
            }
            serde_json::Value::Bool(b) => {
                if let Err(e) = publisher.publish(topic, &b.to_string()) {
                    error!("Failed to publish message to topic {topic}: {e}");
                }
            }
            serde_json::Value::Null => {
                // Do not publish null values
            }
        }
    }
    let root_topic = format!("{base_topic}/{metric_name}");
    publish_recursive(publisher, &root_topic, value);
}

pub fn run(
    mut connection: Connection,
    delay: Duration,
    retries: u32,
    output: commandline::DaemonOutput,
    interval: Duration,
    metrics_to_fetch: Vec<String>,
) -> Result<()> {
    info!(
        "Starting daemon mode: output={output:?}, interval={interval:?}, metrics={metrics_to_fetch:?}"
    );
    let available_metrics = get_metrics();

    let mut mqtt_publisher: Option<mqtt::MqttPublisher> = None;

    if let commandline::DaemonOutput::Mqtt { config_file, .. } = &output {
        let config = mqtt::MqttConfig::load(config_file)
            .with_context(|| format!("Failed to open MQTT config file at '{config_file}'"))?;
        info!("Successfully loaded MQTT config from {config_file}: {config:?}");
        let publisher =
            mqtt::MqttPublisher::new(config).with_context(|| "Failed to create MQTT publisher")?;
        info!("MQTT Publisher created successfully.");
        mqtt_publisher = Some(publisher);
    }

    loop {
        let mut fetched_data: HashMap<String, ObdResponse> = HashMap::new();
        let mut metrics_to_process = metrics_to_fetch.clone();

        if metrics_to_process.iter().any(|m| m == "all") {
            info!("Fetching all metrics due to 'all' flag.");
            metrics_to_process = available_metrics.keys().map(|s| s.to_string()).collect();
        }

        for metric_name in &metrics_to_process {
            if let Some(metric) = available_metrics.get(metric_name.as_str()) {
                let command = (metric.command)();
                info!("Fetching metric: {metric_name}");
                match connection.run(&command, metric.cacheable, delay, retries) {
                    Ok(response) => {
                        fetched_data.insert(metric_name.to_string(), response);
                    }
                    Err(e) => error!("Error fetching metric '{metric_name}': {e}"),
                }
            } else {
                bail!("Unknown metric name '{}'", metric_name);
            }
        }

        match &output {
            commandline::DaemonOutput::Console => {
                println!("--- Data at {} ---", chrono::Local::now().to_rfc3339());
                for (name, response) in &fetched_data {
                    println!("{}: {}", name, response.formatted_value());
                }
                println!("--------------------------");
            }
            commandline::DaemonOutput::Mqtt { format, .. } => {
                if let Some(publisher) = &mqtt_publisher {
                    match format {
                        commandline::MqttFormat::Json => {
                            let mut data_to_publish = serde_json::Map::new();
                            data_to_publish.insert(
                                "timestamp".to_string(),
                                json!(chrono::Utc::now().to_rfc3339()),
                            );

                            for (name, response) in &fetched_data {
                                match reading_to_json(response) {
                                    Ok(val) => {
                                        data_to_publish.insert(name.clone(), val);
                                    }
                                    Err(e) => error!("Failed to serialize '{name}': {e}"),
                                }
                            }

                            if data_to_publish.len() > 1 {
                                match serde_json::to_string(&data_to_publish) {
                                    Ok(json_payload) => {
                                        info!(
                                            "MQTT output: Attempting to publish data: {json_payload}"
                                        );
                                        if let Err(e) =
                                            publisher.publish(publisher.topic(), &json_payload)
                                        {
                                            error!("Failed to publish data to MQTT: {e:?}");
                                        } else {
                                            info!("Successfully published data to MQTT.");
                                        }
                                    }
                                    Err(e) => {
                                        error!("Failed to serialize data to JSON string: {e}");
                                    }
                                }
                            } else {
                                info!("No data fetched in this cycle to publish via MQTT.");
                            }
                        }
                        commandline::MqttFormat::Simple => {
                            let base_topic = publisher.topic();
                            for (name, response) in &fetched_data {
                                match reading_to_json(response) {
                                    Ok(value) => {
                                        publish_simple_format(publisher, base_topic, name, &value);
                                    }
                                    Err(e) => error!("Failed to serialize '{name}': {e}"),
                                }
                            }
                        }
                    }
                } else {
                    warn!(
                        "MQTT output selected, but publisher is not initialized. Skipping publish."
                    );
                }
            }
        }
        std::thread::sleep(interval);
    }
}
