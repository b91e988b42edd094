use chrono::{DateTime, Local};

use crate::telemetry::Telemetry;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Availability {
    Online,
    Offline,
}

impl Availability {
    pub fn as_payload(&self) -> &'static str {
        match self {
            Availability::Online => "online",
            Availability::Offline => "offline",
        }
    }
}

pub trait MetricCollector {
    fn publish(&mut self, telemetry: &Telemetry, captured_at: &DateTime<Local>);

    fn set_availability(&mut self, availability: Availability);
}

pub fn availability_topic(topic_prefix: &str) -> String {
    format!("{topic_prefix}/availability")
}

pub fn state_topic(topic_prefix: &str) -> String {
    format!("{topic_prefix}/state")
}
