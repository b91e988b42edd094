use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Component {
    Sensor,
    BinarySensor,
}

impl Component {
    fn as_str(&self) -> &'static str {
        match self {
            Component::Sensor => "sensor",
            Component::BinarySensor => "binary_sensor",
        }
    }
}

/// Static description of one entity announced through MQTT discovery.
#[derive(Clone, Copy, Debug)]
pub struct SensorDescriptor {
    pub key: &'static str,
    pub name: &'static str,
    pub component: Component,
    pub unit: Option<&'static str>,
    pub icon: &'static str,
    pub device_class: Option<&'static str>,
    pub state_class: Option<&'static str>,
}

const fn measurement(
    key: &'static str,
    name: &'static str,
    unit: &'static str,
    icon: &'static str,
    device_class: Option<&'static str>,
) -> SensorDescriptor {
    SensorDescriptor {
        key,
        name,
        component: Component::Sensor,
        unit: Some(unit),
        icon,
        device_class,
        state_class: Some("measurement"),
    }
}

const fn binary(
    key: &'static str,
    name: &'static str,
    icon: &'static str,
    device_class: &'static str,
) -> SensorDescriptor {
    SensorDescriptor {
        key,
        name,
        component: Component::BinarySensor,
        unit: None,
        icon,
        device_class: Some(device_class),
        state_class: None,
    }
}

pub static SENSORS: &[SensorDescriptor] = &[
    measurement("pv_input_power", "PV Input Power", "W", "mdi:solar-power", Some("power")),
    measurement("ac_output_power", "AC Output Power", "W", "mdi:flash", Some("power")),
    measurement("battery_power", "Battery Power", "W", "mdi:battery-charging", Some("power")),
    measurement("pv_input_voltage", "PV Input Voltage", "V", "mdi:flash", Some("voltage")),
    measurement("battery_voltage", "Battery Voltage", "V", "mdi:battery", Some("voltage")),
    measurement("ac_output_voltage", "AC Output Voltage", "V", "mdi:power-socket", Some("voltage")),
    measurement("battery_capacity", "Battery Capacity", "%", "mdi:battery-50", Some("battery")),
    measurement("ac_output_load", "AC Output Load", "%", "mdi:gauge", None),
    measurement("inverter_temperature", "Inverter Temperature", "°C", "mdi:thermometer", Some("temperature")),
    binary("load_on", "Load On", "mdi:power", "power"),
    binary("scc_charging", "Solar Charging", "mdi:solar-power", "battery_charging"),
    binary("ac_charging", "AC Charging", "mdi:power-plug", "battery_charging"),
];

const NODE_ID: &str = "mpp_solar";

/// `DeviceConfig` is used to define the configuration for a Home Assistant device
/// in the MQTT discovery protocol and is used to group entities together.
#[derive(Clone, Debug, Serialize)]
pub struct DeviceConfig {
    identifiers: Vec<String>,
    name: String,
    model: String,
    manufacturer: String,
    sw_version: String, // Software version of the application that supplies the discovered MQTT item.
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            identifiers: vec!["mpp_solar_pip5048mg".to_string()],
            name: "MPP Solar PIP5048MG".to_string(),
            model: "PIP5048MG".to_string(),
            manufacturer: "MPP Solar".to_string(),
            sw_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// `SensorConfig` is the discovery payload of a single (binary) sensor entity.
///
/// More information about the MQTT discovery protocol can be found here:
/// https://www.home-assistant.io/docs/mqtt/discovery/
#[derive(Debug, Serialize)]
pub struct SensorConfig {
    pub unique_id: String,
    name: String,
    state_topic: String,
    value_template: String,
    device: DeviceConfig,
    icon: String,
    availability_topic: String,
    // exclude fields if they are empty
    #[serde(skip_serializing_if = "Option::is_none")]
    unit_of_measurement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state_class: Option<String>,
}

impl SensorDescriptor {
    pub fn config_topic(&self) -> String {
        format!(
            "homeassistant/{}/{NODE_ID}/{}/config",
            self.component.as_str(),
            self.key
        )
    }

    pub fn to_config(
        &self,
        state_topic: &str,
        availability_topic: &str,
        device: &DeviceConfig,
    ) -> SensorConfig {
        let value_template = match self.component {
            Component::Sensor => format!("{{{{ value_json.{} }}}}", self.key),
            Component::BinarySensor => {
                format!("{{{{ 'ON' if value_json.{} else 'OFF' }}}}", self.key)
            }
        };
        SensorConfig {
            unique_id: format!("{NODE_ID}_{}", self.key),
            name: self.name.to_string(),
            state_topic: state_topic.to_string(),
            value_template,
            device: device.clone(),
            icon: self.icon.to_string(),
            availability_topic: availability_topic.to_string(),
            unit_of_measurement: self.unit.map(str::to_string),
            device_class: self.device_class.map(str::to_string),
            state_class: self.state_class.map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_config_topic_and_payload() {
        let power = &SENSORS[0];
        assert_eq!(
            power.config_topic(),
            "homeassistant/sensor/mpp_solar/pv_input_power/config"
        );

        let config = power.to_config(
            "mpp_solar/state",
            "mpp_solar/availability",
            &DeviceConfig::default(),
        );
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["unique_id"], "mpp_solar_pv_input_power");
        assert_eq!(json["value_template"], "{{ value_json.pv_input_power }}");
        assert_eq!(json["unit_of_measurement"], "W");
        assert_eq!(json["state_class"], "measurement");
        assert_eq!(json["device"]["manufacturer"], "MPP Solar");
    }

    #[test]
    fn binary_sensor_omits_unit() {
        let load_on = SENSORS.iter().find(|s| s.key == "load_on").unwrap();
        assert_eq!(
            load_on.config_topic(),
            "homeassistant/binary_sensor/mpp_solar/load_on/config"
        );
        let json = serde_json::to_value(load_on.to_config("s", "a", &DeviceConfig::default()))
            .unwrap();
        assert!(json.get("unit_of_measurement").is_none());
        assert!(json.get("state_class").is_none());
        assert_eq!(
            json["value_template"],
            "{{ 'ON' if value_json.load_on else 'OFF' }}"
        );
    }

    #[test]
    fn every_descriptor_names_a_telemetry_field() {
        let fields = vec!["0".to_string(); 21];
        let payload = serde_json::to_value(crate::telemetry::parse(&fields).unwrap()).unwrap();
        for sensor in SENSORS {
            assert!(payload.get(sensor.key).is_some(), "{}", sensor.key);
        }
    }
}
