use anyhow::{Context, Result};
use rumqttc::{Client, MqttOptions, QoS};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct MqttConfig {
    uri: String,
    username: Option<String>,
    password: Option<String>,
    #[serde(default = "MqttConfig::default_topic")]
    topic: String,
    #[serde(default = "MqttConfig::default_qos")]
    qos: u8,
    #[serde(default = "MqttConfig::default_client_id")]
    client_id: String,
    #[serde(
        default = "MqttConfig::default_keep_alive_interval",
        with = "humantime_serde"
    )]
    keep_alive_interval: Duration,
}

impl MqttConfig {
    fn default_topic() -> String {
        "elm327".into()
    }

    fn default_qos() -> u8 {
        0
    }

    fn generate_random_string(len: usize) -> String {
        use rand::distributions::Alphanumeric;
        use rand::Rng;

        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }

    fn default_client_id() -> String {
        format!("elm327-{}", Self::generate_random_string(8))
    }

    fn default_keep_alive_interval() -> Duration {
        Duration::from_secs(30)
    }

    pub const DEFAULT_CONFIG_FILE: &str = "mqtt.yaml";

    pub fn load(config_file_path: &str) -> Result<Self> {
        log::debug!("Loading config file from {config_file_path:?}");
        let config_file = std::fs::File::open(config_file_path)
            .with_context(|| format!("Cannot open MQTT config file {config_file_path:?}"))?;
        let config: Self = serde_yaml::from_reader(&config_file)
            .with_context(|| format!("Cannot read MQTT config from file: {config_file_path:?}"))?;
        Ok(config)
    }

    fn host_and_port(&self) -> Result<(String, u16)> {
        let address = self
            .uri
            .strip_prefix("tcp://")
            .or_else(|| self.uri.strip_prefix("mqtt://"))
            .unwrap_or(&self.uri);
        let (host, port) = address
            .rsplit_once(':')
            .with_context(|| format!("MQTT URI '{}' has no port", self.uri))?;
        let port = port
            .parse()
            .with_context(|| format!("MQTT URI '{}' has an invalid port", self.uri))?;
        Ok((host.to_string(), port))
    }

    fn qos(&self) -> QoS {
        match self.qos {
            1 => QoS::AtLeastOnce,
            2 => QoS::ExactlyOnce,
            _ => QoS::AtMostOnce,
        }
    }
}

pub struct MqttPublisher {
    client: Client,
    config: MqttConfig,
}

impl MqttPublisher {
    pub fn new(config: MqttConfig) -> Result<Self> {
        let (host, port) = config.host_and_port()?;
        let mut options = MqttOptions::new(config.client_id.clone(), host, port);
        options.set_keep_alive(config.keep_alive_interval);
        if let Some(username) = &config.username {
            options.set_credentials(
                username.clone(),
                config.password.clone().unwrap_or_default(),
            );
        }

        log::info!(
            "Attempting to connect to MQTT broker: {} with client_id: {}",
            config.uri,
            config.client_id
        );

        let (client, mut connection) = Client::new(options, 10);

        // The connection iterator drives the network traffic and the
        // automatic reconnect, so it gets a thread for the life of the
        // process.
        std::thread::spawn(move || {
            for event in connection.iter() {
                match event {
                    Ok(event) => log::trace!("MQTT event: {event:?}"),
                    Err(err) => {
                        log::error!("MQTT connection error: {err}");
                        std::thread::sleep(Duration::from_secs(1));
                    }
                }
            }
        });

        Ok(Self { client, config })
    }

    pub fn topic(&self) -> &str {
        &self.config.topic
    }

    pub fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        log::debug!(
            "Publishing to MQTT: Topic='{}', Payload='{payload}', QoS={:?}",
            topic,
            self.config.qos()
        );

        self.client
            .publish(topic, self.config.qos(), false, payload)
            .with_context(|| format!("Failed to publish message to MQTT topic: {topic}"))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_config_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "uri: \"tcp://broker.local:1883\"").unwrap();

        let config = MqttConfig::load(file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.uri, "tcp://broker.local:1883");
        assert_eq!(config.topic, "elm327");
        assert_eq!(config.qos, 0);
        assert_eq!(config.keep_alive_interval, Duration::from_secs(30));
        assert!(config.client_id.starts_with("elm327-"));
        assert_eq!(config.client_id.len(), "elm327-".len() + 8);
    }

    #[test]
    fn loads_config_with_explicit_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "uri: \"tcp://broker.local:1883\"").unwrap();
        writeln!(file, "username: \"obd\"").unwrap();
        writeln!(file, "password: \"secret\"").unwrap();
        writeln!(file, "topic: \"garage/car\"").unwrap();
        writeln!(file, "qos: 1").unwrap();
        writeln!(file, "client_id: \"reader-1\"").unwrap();
        writeln!(file, "keep_alive_interval: 45s").unwrap();

        let config = MqttConfig::load(file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.username.as_deref(), Some("obd"));
        assert_eq!(config.topic, "garage/car");
        assert_eq!(config.qos(), QoS::AtLeastOnce);
        assert_eq!(config.client_id, "reader-1");
        assert_eq!(config.keep_alive_interval, Duration::from_secs(45));
    }

    fn config_with_uri(uri: &str) -> MqttConfig {
        MqttConfig {
            uri: uri.to_string(),
            username: None,
            password: None,
            topic: MqttConfig::default_topic(),
            qos: MqttConfig::default_qos(),
            client_id: MqttConfig::default_client_id(),
            keep_alive_interval: MqttConfig::default_keep_alive_interval(),
        }
    }

    #[test]
    fn splits_the_uri_into_host_and_port() {
        let (host, port) = config_with_uri("tcp://broker.local:1883")
            .host_and_port()
            .unwrap();
        assert_eq!(host, "broker.local");
        assert_eq!(port, 1883);

        let (host, port) = config_with_uri("broker.local:8883").host_and_port().unwrap();
        assert_eq!(host, "broker.local");
        assert_eq!(port, 8883);
    }

    #[test]
    fn rejects_a_uri_without_a_port() {
        assert!(config_with_uri("tcp://broker.local").host_and_port().is_err());
    }
}
