// externally visible interfaces
pub mod clock;
pub mod device;
pub mod error;
pub mod frame;
pub mod home_assistant;
pub mod inverter;
pub mod metric_collector;
pub mod mqtt_config;
pub mod mqtt_wrapper;
pub mod poller;
pub mod protocol;
pub mod simple_mqtt;
pub mod telemetry;
pub mod transaction;

// internal interfaces
mod home_assistant_config;
