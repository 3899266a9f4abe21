use chrono::{Local, NaiveDateTime, TimeZone};
use std::collections::HashMap;
use thiserror::Error;

use crate::model::{PanelSnapshot, PlantSnapshot};

//Inverters report their sample time in the controller's local time
const DEVICE_TIME_FORMAT: &str = "%d-%m-%y %H:%M:%S";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FieldError {
    #[error("attribute {field} is missing")]
    Missing { field: &'static str },

    #[error("attribute {field}=\"{value}\" is not a number")]
    NotANumber { field: &'static str, value: String },

    #[error("attribute {field}=\"{value}\" is not an integer")]
    NotAnInteger { field: &'static str, value: String },

    #[error("attribute {field}=\"{value}\" is not a dd-mm-yy HH:MM:SS timestamp")]
    BadTimestamp { field: &'static str, value: String },

    #[error("attribute {field}=\"{value}\" does not exist in the local time zone")]
    NonExistentLocalTime { field: &'static str, value: String },
}

/// Raw attributes of one element, already unescaped.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Attributes {
    values: HashMap<String, String>,
}

impl Attributes {
    pub fn insert(&mut self, key: String, value: String) {
        self.values.insert(key, value);
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.values.get(field).map(String::as_str)
    }

    fn text(&self, field: &'static str) -> Result<String, FieldError> {
        self.get(field)
            .map(str::to_string)
            .ok_or(FieldError::Missing { field })
    }

    fn real(&self, field: &'static str) -> Result<f64, FieldError> {
        let raw = self.get(field).ok_or(FieldError::Missing { field })?;
        raw.trim().parse().map_err(|_| FieldError::NotANumber {
            field,
            value: raw.to_string(),
        })
    }

    fn integer(&self, field: &'static str) -> Result<i64, FieldError> {
        let raw = self.get(field).ok_or(FieldError::Missing { field })?;
        raw.trim().parse().map_err(|_| FieldError::NotAnInteger {
            field,
            value: raw.to_string(),
        })
    }

    fn local_timestamp(&self, field: &'static str) -> Result<i64, FieldError> {
        self.timestamp_in(field, &Local)
    }

    fn timestamp_in<Tz: TimeZone>(
        &self,
        field: &'static str,
        zone: &Tz,
    ) -> Result<i64, FieldError> {
        let raw = self.get(field).ok_or(FieldError::Missing { field })?;
        epoch_in(raw, zone).map_err(|err| match err {
            LocalTimeError::Unparsable => FieldError::BadTimestamp {
                field,
                value: raw.to_string(),
            },
            LocalTimeError::NonExistent => FieldError::NonExistentLocalTime {
                field,
                value: raw.to_string(),
            },
        })
    }
}

enum LocalTimeError {
    Unparsable,
    NonExistent,
}

/// Seconds since the epoch of a device `dd-mm-yy HH:MM:SS` wall time in `zone`.
///
/// A time repeated by a DST fall-back resolves to its first occurrence.
fn epoch_in<Tz: TimeZone>(raw: &str, zone: &Tz) -> Result<i64, LocalTimeError> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), DEVICE_TIME_FORMAT)
        .map_err(|_| LocalTimeError::Unparsable)?;

    zone.from_local_datetime(&naive)
        .earliest()
        .map(|local| local.timestamp())
        .ok_or(LocalTimeError::NonExistent)
}

pub fn plant_snapshot(
    attributes: &Attributes,
    captured_at: i64,
) -> Result<PlantSnapshot, FieldError> {
    Ok(PlantSnapshot {
        captured_at,
        instant_power_w: attributes.real("pout_W")?,
        cumulative_energy_wh: attributes.real("etot_Wh")?,
        status: attributes.text("status")?,
    })
}

pub fn panel_snapshot(attributes: &Attributes) -> Result<PanelSnapshot, FieldError> {
    Ok(PanelSnapshot {
        device_timestamp: attributes.local_timestamp("ts")?,
        device_id: attributes.text("macrf")?,

        firmware_micro: attributes.text("fwmicro")?,
        protocol_ids: attributes.text("p1_ids")?,
        protocol_idi: attributes.text("p1_idi")?,
        firmware_dsp: attributes.text("fwdsp")?,
        firmware_rf: attributes.text("fwrf")?,

        cumulative_energy_wh: attributes.real("Etot_Wh")?,
        output_voltage_v: attributes.real("Vout_V")?,
        output_power_w: attributes.real("Pout_W")?,
        frequency_hz: attributes.real("Freq_Hz")?,
        input_voltage_v: attributes.real("Vin_V")?,
        dsp_temperature_c: attributes.real("Tdsp_degC")?,
        mosfet_temperature_c: attributes.real("Tmos_degC")?,

        inverter_status: attributes.text("invstat")?,
        boost_status: attributes.text("booststat")?,
        alarm_status: attributes.text("alarmstat")?,

        rssi: attributes.integer("rssi")?,
        rssi_count: attributes.integer("rssicnt")?,
        rssi_average: attributes.integer("rssiavg")?,
        message_count: attributes.integer("msgcnt")?,
        samples: attributes.integer("samples")?,

        dsp_alarm: attributes.text("dspalarm")?,
        mcu_alarm: attributes.text("mcualarm")?,
        mcu_warning: attributes.text("mcuwarning")?,
    })
}
