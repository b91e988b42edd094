use crate::{
    metric_collector::{availability_topic, Availability, MetricCollector},
    mqtt_config::MqttConfig,
    mqtt_wrapper::{LastWill, MqttWrapper, QoS},
    telemetry::Telemetry,
};

use chrono::{DateTime, Local};
use log::{debug, warn};

/// One retained topic per telemetry field, `<prefix>/<field>`.
pub struct SimpleMqtt<MQTT: MqttWrapper> {
    client: MQTT,
    topic_prefix: String,
}

impl<MQTT: MqttWrapper> SimpleMqtt<MQTT> {
    pub fn new(config: &MqttConfig, topic_prefix: &str) -> Self {
        let last_will = LastWill {
            topic: availability_topic(topic_prefix),
            payload: Availability::Offline.as_payload().to_string(),
            retain: true,
        };
        let client = MQTT::new(config, "-sm", Some(last_will));
        Self {
            client,
            topic_prefix: topic_prefix.to_string(),
        }
    }

    pub fn client(&self) -> &MQTT {
        &self.client
    }
}

impl<MQTT: MqttWrapper> MetricCollector for SimpleMqtt<MQTT> {
    fn publish(&mut self, telemetry: &Telemetry, captured_at: &DateTime<Local>) {
        debug!("{telemetry:?}");

        let serde_json::Value::Object(fields) = telemetry.to_json_payload(captured_at) else {
            return;
        };
        fields.into_iter().for_each(|(key, value)| {
            let topic = format!("{}/{key}", self.topic_prefix);
            let payload = match value {
                serde_json::Value::String(text) => text,
                other => other.to_string(),
            };
            if let Err(e) = self.client.publish(topic, QoS::AtMostOnce, true, payload) {
                warn!("mqtt error: {e:?}")
            }
        });
    }

    fn set_availability(&mut self, availability: Availability) {
        let topic = availability_topic(&self.topic_prefix);
        if let Err(e) = self
            .client
            .publish(topic, QoS::AtLeastOnce, true, availability.as_payload())
        {
            warn!("mqtt error: {e:?}")
        }
    }
}
