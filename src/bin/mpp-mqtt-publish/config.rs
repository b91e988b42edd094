use std::{env, fs, path::PathBuf};

use anyhow::Context;
use mpp2mqtt::{mqtt_config::MqttConfig, poller::PollerConfig, transaction::TransactionConfig};
use serde_derive::Deserialize;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub device: PathBuf,
    pub mqtt_topic: String,
    pub debug: bool,
    pub poller: PollerConfig,
    pub transaction: TransactionConfig,
    pub home_assistant: Option<MqttConfig>,
    pub simple_mqtt: Option<MqttConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/hidraw0"),
            mqtt_topic: "mpp_solar".to_string(),
            debug: false,
            poller: PollerConfig::default(),
            transaction: TransactionConfig::default(),
            home_assistant: None,
            simple_mqtt: None,
        }
    }
}

// config.toml in the working dir, or next to the executable
fn config_path() -> Option<PathBuf> {
    let cwd = env::current_dir().ok().map(|dir| dir.join("config.toml"));
    if let Some(path) = cwd.filter(|path| path.exists()) {
        return Some(path);
    }
    let mut path = env::current_exe().ok()?;
    path.pop();
    path.push("config.toml");
    path.exists().then_some(path)
}

impl Config {
    pub fn is_valid(&self) -> bool {
        !self.device.as_os_str().is_empty()
            && !self.mqtt_topic.is_empty()
            && (self.home_assistant.as_ref().is_some_and(|x| x.is_valid())
                || self.simple_mqtt.as_ref().is_some_and(|x| x.is_valid()))
    }

    pub fn load() -> anyhow::Result<Config> {
        let mut config = match config_path() {
            Some(path) => {
                let contents = fs::read_to_string(&path)
                    .with_context(|| format!("could not read {}", path.display()))?;
                Self::parse(&contents)
                    .with_context(|| format!("toml config {} unparsable", path.display()))?
            }
            None => Config::default(),
        };
        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn parse(contents: &str) -> anyhow::Result<Config> {
        Ok(toml::from_str(contents)?)
    }

    /// Environment variables take precedence over the file.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        // $DEVICE
        if let Some(device) = var("DEVICE") {
            self.device = device.into();
        }
        // $INTERVAL (seconds)
        if let Some(interval) = var("INTERVAL") {
            self.poller.interval_secs = interval
                .parse()
                .with_context(|| format!("INTERVAL={interval} is not a number of seconds"))?;
        }
        // $MQTT_TOPIC
        if let Some(topic) = var("MQTT_TOPIC") {
            self.mqtt_topic = topic;
        }
        // $DEBUG
        if let Some(debug) = var("DEBUG") {
            self.debug = debug.eq_ignore_ascii_case("true");
        }

        // $MQTT_HOST, $MQTT_PORT, $MQTT_USERNAME, $MQTT_PASSWORD apply to every broker
        let host = var("MQTT_HOST");
        let port = match var("MQTT_PORT") {
            Some(port) => Some(
                port.parse::<u16>()
                    .with_context(|| format!("MQTT_PORT={port} is not a port"))?,
            ),
            None => None,
        };
        let username = var("MQTT_USERNAME").filter(|u| !u.is_empty());
        let password = var("MQTT_PASSWORD").filter(|p| !p.is_empty());

        if host.is_some() {
            self.home_assistant.get_or_insert_with(MqttConfig::default);
        }
        for broker in [&mut self.home_assistant, &mut self.simple_mqtt]
            .into_iter()
            .flatten()
        {
            if let Some(host) = &host {
                broker.host = host.clone();
            }
            if port.is_some() {
                broker.port = port;
            }
            if username.is_some() {
                broker.username = username.clone();
            }
            if password.is_some() {
                broker.password = password.clone();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_file_or_env() {
        let mut config = Config::default();
        config.apply_env(env_of(&[])).unwrap();
        assert_eq!(config.device, PathBuf::from("/dev/hidraw0"));
        assert_eq!(config.mqtt_topic, "mpp_solar");
        assert_eq!(config.poller.interval_secs, 30);
        assert!(!config.debug);
        assert!(!config.is_valid());
    }

    #[test]
    fn parses_toml_with_nested_tables() {
        let config = Config::parse(
            r#"
            device = "/dev/hidraw1"
            mqtt_topic = "garage"

            [poller]
            interval_secs = 10

            [transaction]
            complete_len = 120
            max_attempts = 5

            [home_assistant]
            host = "broker.local"
            port = 1884
            "#,
        )
        .unwrap();
        assert_eq!(config.device, PathBuf::from("/dev/hidraw1"));
        assert_eq!(config.mqtt_topic, "garage");
        assert_eq!(config.poller.interval_secs, 10);
        assert_eq!(config.poller.failure_threshold, 5);
        assert_eq!(config.transaction.complete_len, 120);
        assert_eq!(config.transaction.max_attempts, 5);
        assert_eq!(config.transaction.response_timeout_ms, 3_000);
        let ha = config.home_assistant.as_ref().unwrap();
        assert_eq!(ha.host, "broker.local");
        assert_eq!(ha.port, Some(1884));
        assert!(config.simple_mqtt.is_none());
        assert!(config.is_valid());
    }

    #[test]
    fn unparsable_toml_is_an_error() {
        assert!(Config::parse("device = [").is_err());
    }

    #[test]
    fn environment_overrides_file() {
        let mut config = Config::parse(
            r#"
            [simple_mqtt]
            host = "file-host"
            "#,
        )
        .unwrap();
        config
            .apply_env(env_of(&[
                ("DEVICE", "/dev/hidraw3"),
                ("INTERVAL", "15"),
                ("MQTT_HOST", "env-host"),
                ("MQTT_PORT", "8883"),
                ("MQTT_USERNAME", "solar"),
                ("MQTT_PASSWORD", "secret"),
                ("MQTT_TOPIC", "roof"),
                ("DEBUG", "TRUE"),
            ]))
            .unwrap();

        assert_eq!(config.device, PathBuf::from("/dev/hidraw3"));
        assert_eq!(config.poller.interval_secs, 15);
        assert_eq!(config.mqtt_topic, "roof");
        assert!(config.debug);
        for broker in [&config.home_assistant, &config.simple_mqtt] {
            let broker = broker.as_ref().unwrap();
            assert_eq!(broker.host, "env-host");
            assert_eq!(broker.port, Some(8883));
            assert_eq!(broker.username.as_deref(), Some("solar"));
            assert_eq!(broker.password.as_deref(), Some("secret"));
        }
    }

    #[test]
    fn empty_credentials_mean_anonymous() {
        let mut config = Config::default();
        config
            .apply_env(env_of(&[
                ("MQTT_HOST", "localhost"),
                ("MQTT_USERNAME", ""),
                ("MQTT_PASSWORD", ""),
            ]))
            .unwrap();
        let ha = config.home_assistant.unwrap();
        assert_eq!(ha.username, None);
        assert_eq!(ha.password, None);
    }

    #[test]
    fn bad_numbers_are_rejected() {
        assert!(Config::default()
            .apply_env(env_of(&[("INTERVAL", "soon")]))
            .is_err());
        assert!(Config::default()
            .apply_env(env_of(&[("MQTT_PORT", "99999")]))
            .is_err());
    }
}
