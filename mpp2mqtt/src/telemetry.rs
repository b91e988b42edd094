use std::str::FromStr;

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::json;

use crate::error::ProtocolError;

/// Records shorter than this are padded with `"0"` before fields are mapped.
pub const RECORD_FIELDS: usize = 21;

const STATUS_FIELD: usize = 20;
const STATUS_DEFAULT: &str = "00000000";

const LOAD_ON_BIT: usize = 4;
const SCC_CHARGING_BIT: usize = 6;
const AC_CHARGING_BIT: usize = 7;

/// One general status reading of the inverter.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Telemetry {
    pub ac_input_voltage: f64,
    pub ac_input_frequency: f64,
    pub ac_output_voltage: f64,
    pub ac_output_frequency: f64,
    pub ac_output_power: i32,
    pub ac_output_apparent_power: i32,
    pub ac_output_load: i32,
    pub bus_voltage: f64,
    pub battery_voltage: f64,
    pub battery_charging_current: f64,
    pub battery_capacity: i32,
    pub battery_discharge_current: f64,
    pub inverter_temperature: i32,
    pub pv_input_current: f64,
    pub pv_input_voltage: f64,
    pub battery_scc_voltage: f64,
    pub device_status: String,
    /// Empirical fit against the front panel reading, see [`pv_input_power`].
    pub pv_input_power: i32,
    /// Positive while charging, negative while discharging.
    pub battery_power: f64,
    pub load_on: bool,
    pub scc_charging: bool,
    pub ac_charging: bool,
}

fn field<T: FromStr>(
    fields: &[String],
    index: usize,
    name: &'static str,
) -> Result<T, ProtocolError> {
    let value = fields.get(index).map(String::as_str).unwrap_or("0");
    value.parse().map_err(|_| ProtocolError::FieldParseFailure {
        field: name,
        value: value.to_string(),
    })
}

/// PV input power is not reported by this firmware. `(bus + pv voltage) * 2`
/// tracked the panel display within ~7% on the reference unit, treat it as a
/// calibration that may not hold for other firmware revisions.
pub fn pv_input_power(bus_voltage: f64, pv_input_voltage: f64) -> i32 {
    ((bus_voltage + pv_input_voltage) * 2.0).round() as i32
}

/// Net battery power rounded to one decimal.
pub fn battery_power(voltage: f64, charging_current: f64, discharge_current: f64) -> f64 {
    (voltage * (charging_current - discharge_current) * 10.0).round() / 10.0
}

/// `(load_on, scc_charging, ac_charging)`; all false for a short status word.
pub fn status_flags(status: &str) -> (bool, bool, bool) {
    let bits = status.as_bytes();
    if bits.len() < 8 {
        return (false, false, false);
    }
    (
        bits[LOAD_ON_BIT] == b'1',
        bits[SCC_CHARGING_BIT] == b'1',
        bits[AC_CHARGING_BIT] == b'1',
    )
}

/// Maps a decoded general status record onto [`Telemetry`]. Any unparsable
/// token rejects the whole record.
pub fn parse(fields: &[String]) -> Result<Telemetry, ProtocolError> {
    let device_status = if fields.len() > STATUS_FIELD {
        fields[STATUS_FIELD].clone()
    } else {
        STATUS_DEFAULT.to_string()
    };

    let mut fields = fields.to_vec();
    if fields.len() < RECORD_FIELDS {
        fields.resize(RECORD_FIELDS, "0".to_string());
    }
    let f = fields.as_slice();

    let bus_voltage: f64 = field(f, 7, "bus_voltage")?;
    let battery_voltage: f64 = field(f, 8, "battery_voltage")?;
    let battery_charging_current: f64 = field(f, 9, "battery_charging_current")?;
    let battery_discharge_current: f64 = field(f, 16, "battery_discharge_current")?;
    let pv_input_voltage: f64 = field(f, 13, "pv_input_voltage")?;
    let (load_on, scc_charging, ac_charging) = status_flags(&device_status);

    Ok(Telemetry {
        ac_input_voltage: field(f, 0, "ac_input_voltage")?,
        ac_input_frequency: field(f, 1, "ac_input_frequency")?,
        ac_output_voltage: field(f, 2, "ac_output_voltage")?,
        ac_output_frequency: field(f, 3, "ac_output_frequency")?,
        ac_output_power: field(f, 4, "ac_output_power")?,
        ac_output_apparent_power: field(f, 5, "ac_output_apparent_power")?,
        ac_output_load: field(f, 6, "ac_output_load")?,
        bus_voltage,
        battery_voltage,
        battery_charging_current,
        battery_capacity: field(f, 10, "battery_capacity")?,
        battery_discharge_current,
        inverter_temperature: field(f, 11, "inverter_temperature")?,
        pv_input_current: field(f, 12, "pv_input_current")?,
        pv_input_voltage,
        battery_scc_voltage: field(f, 14, "battery_scc_voltage")?,
        device_status,
        pv_input_power: pv_input_power(bus_voltage, pv_input_voltage),
        battery_power: battery_power(
            battery_voltage,
            battery_charging_current,
            battery_discharge_current,
        ),
        load_on,
        scc_charging,
        ac_charging,
    })
}

impl Telemetry {
    /// State payload: every field plus the capture time.
    pub fn to_json_payload(&self, captured_at: &DateTime<Local>) -> serde_json::Value {
        let mut payload = json!(self);
        payload["timestamp"] = captured_at.to_rfc3339().into();
        payload
    }

    pub fn summary(&self) -> String {
        format!(
            "PV={}W, Battery={:.1}V/{}%, Load={}W, Temp={}°C",
            self.pv_input_power,
            self.battery_voltage,
            self.battery_capacity,
            self.ac_output_power,
            self.inverter_temperature
        )
    }
}
