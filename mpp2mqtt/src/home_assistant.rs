use chrono::{DateTime, Local};
use log::{debug, error, info};

use crate::home_assistant_config::{DeviceConfig, SENSORS};
use crate::metric_collector::{availability_topic, state_topic, Availability, MetricCollector};
use crate::mqtt_config::MqttConfig;
use crate::mqtt_wrapper::{LastWill, MqttWrapper, QoS};
use crate::telemetry::Telemetry;

/// Publishes discovery records once and the JSON state on every reading.
pub struct HomeAssistant<MQTT: MqttWrapper> {
    client: MQTT,
    state_topic: String,
    availability_topic: String,
    discovery_published: bool,
}

impl<MQTT: MqttWrapper> HomeAssistant<MQTT> {
    pub fn new(config: &MqttConfig, topic_prefix: &str) -> Self {
        let availability_topic = availability_topic(topic_prefix);
        let last_will = LastWill {
            topic: availability_topic.clone(),
            payload: Availability::Offline.as_payload().to_string(),
            retain: true,
        };
        let client = MQTT::new(config, "-ha", Some(last_will));
        Self {
            client,
            state_topic: state_topic(topic_prefix),
            availability_topic,
            discovery_published: false,
        }
    }

    pub fn client(&self) -> &MQTT {
        &self.client
    }

    fn publish_json(&mut self, topic: &str, payload: serde_json::Value, retain: bool) {
        debug!("Publishing to {topic} with payload {payload}");

        if let Err(e) = self
            .client
            .publish(topic, QoS::AtMostOnce, retain, payload.to_string())
        {
            error!("Failed to publish message: {e:?}");
        }
    }

    fn publish_configs(&mut self) {
        // configs let home assistant know what sensors are available and where to find them
        let device = DeviceConfig::default();
        for sensor in SENSORS {
            let config = sensor.to_config(&self.state_topic, &self.availability_topic, &device);
            match serde_json::to_value(&config) {
                Ok(payload) => self.publish_json(&sensor.config_topic(), payload, true),
                Err(e) => error!("Failed to serialize discovery for {}: {e}", sensor.key),
            }
        }
        info!("Published MQTT discovery messages");
        self.discovery_published = true;
    }
}

impl<MQTT: MqttWrapper> MetricCollector for HomeAssistant<MQTT> {
    fn publish(&mut self, telemetry: &Telemetry, captured_at: &DateTime<Local>) {
        let state_topic = self.state_topic.clone();
        self.publish_json(&state_topic, telemetry.to_json_payload(captured_at), false);
    }

    fn set_availability(&mut self, availability: Availability) {
        let topic = self.availability_topic.clone();
        if let Err(e) =
            self.client
                .publish(topic, QoS::AtLeastOnce, true, availability.as_payload())
        {
            error!("Failed to publish availability: {e:?}");
        }
        if availability == Availability::Online && !self.discovery_published {
            self.publish_configs();
        }
    }
}
