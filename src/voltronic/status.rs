use crate::error::DecodeError;
use crate::voltronic::frame::{self, STATUS_FIELD_COUNT};

use serde::Serialize;
use std::str::FromStr;

/// One decoded QPIGS reply. Either every field parsed or there is no record.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatusRecord {
    pub utility_voltage: f64,   // V
    pub utility_frequency: f64, // Hz
    pub output_voltage: f64,    // V
    pub output_frequency: f64,  // Hz
    pub load_va: u32,
    pub load_w: u32,
    pub load_percent: u32,
    pub bus_voltage: f64,     // V
    pub battery_voltage: f64, // V
    pub battery_charge_current: i32, // A
    pub battery_capacity: u32,       // %
    pub heatsink_temperature: i32,   // C
    pub solar_current: f64,       // A
    pub solar_voltage: f64,       // V
    pub battery_voltage_scc: f64, // V
    pub battery_discharge_current: i32, // A
    pub device_status: String,
    // firmware variants disagree on these three, kept as sent
    pub battery_voltage_offset: String,
    pub eeprom_version: String,
    pub pv_charging_power: String,
    pub device_status_2: String,

    pub solar_power: f64,
    pub battery_current: i32,
}

impl StatusRecord {
    /// Decodes a complete reply frame, `(` through `\r`.
    pub fn from_frame(frame: &str) -> Result<Self, DecodeError> {
        Self::decode(&frame::split_fields(frame)?)
    }

    pub fn decode(fields: &[String]) -> Result<Self, DecodeError> {
        frame::validate_field_count(fields, STATUS_FIELD_COUNT)?;
        let f = Fields(fields);

        let solar_current = f.float(12)?;
        let solar_voltage = f.float(13)?;
        let battery_charge_current = f.int(9)?;
        let battery_discharge_current = f.int(15)?;

        Ok(Self {
            utility_voltage: f.float(0)?,
            utility_frequency: f.float(1)?,
            output_voltage: f.float(2)?,
            output_frequency: f.float(3)?,
            load_va: f.int(4)?,
            load_w: f.int(5)?,
            load_percent: f.int(6)?,
            bus_voltage: f.float(7)?,
            battery_voltage: f.float(8)?,
            battery_charge_current,
            battery_capacity: f.int(10)?,
            heatsink_temperature: f.int(11)?,
            solar_current,
            solar_voltage,
            battery_voltage_scc: f.float(14)?,
            battery_discharge_current,
            device_status: f.text(16),
            battery_voltage_offset: f.text(17),
            eeprom_version: f.text(18),
            pv_charging_power: f.text(19),
            device_status_2: f.text(20),

            solar_power: round2(solar_voltage * solar_current),
            battery_current: battery_charge_current - battery_discharge_current,
        })
    }

    /// (topic suffix, payload) for every value published on its own topic.
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        use serde_json::to_string as json;

        // serializing plain numbers cannot fail
        let n = |v: Result<String, serde_json::Error>| v.unwrap_or_default();

        vec![
            ("utility_voltage", n(json(&self.utility_voltage))),
            ("utility_frequency", n(json(&self.utility_frequency))),
            ("output_voltage", n(json(&self.output_voltage))),
            ("output_frequency", n(json(&self.output_frequency))),
            ("load_va", n(json(&self.load_va))),
            ("load_w", n(json(&self.load_w))),
            ("load_percent", n(json(&self.load_percent))),
            ("bus_voltage", n(json(&self.bus_voltage))),
            ("battery_voltage", n(json(&self.battery_voltage))),
            ("battery_charge_current", n(json(&self.battery_charge_current))),
            ("battery_capacity", n(json(&self.battery_capacity))),
            ("heatsink_temperature", n(json(&self.heatsink_temperature))),
            ("solar_current", n(json(&self.solar_current))),
            ("solar_voltage", n(json(&self.solar_voltage))),
            ("battery_voltage_scc", n(json(&self.battery_voltage_scc))),
            ("battery_discharge_current", n(json(&self.battery_discharge_current))),
            ("device_status", self.device_status.clone()),
            ("device_status_2", self.device_status_2.clone()),
            ("solar_power", n(json(&self.solar_power))),
            ("battery_current", n(json(&self.battery_current))),
        ]
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

struct Fields<'a>(&'a [String]);

impl Fields<'_> {
    fn raw(&self, index: usize) -> &str {
        self.0[index].as_str()
    }

    fn parse_error(&self, index: usize) -> DecodeError {
        DecodeError::FieldParse {
            index,
            raw_value: self.raw(index).to_owned(),
        }
    }

    fn float(&self, index: usize) -> Result<f64, DecodeError> {
        match self.raw(index).parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(round2(v)),
            _ => Err(self.parse_error(index)),
        }
    }

    fn int<T: FromStr>(&self, index: usize) -> Result<T, DecodeError> {
        self.raw(index).parse().map_err(|_| self.parse_error(index))
    }

    fn text(&self, index: usize) -> String {
        self.raw(index).to_owned()
    }
}
