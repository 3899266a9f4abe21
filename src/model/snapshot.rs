/// Plant-level reading taken from one controller element.
///
/// Keyed by `captured_at`, the collector's own clock at the time of the poll.
#[derive(Clone, Debug, PartialEq)]
pub struct PlantSnapshot {
    pub captured_at: i64,
    pub instant_power_w: f64,
    pub cumulative_energy_wh: f64,
    pub status: String,
}

/// One micro-inverter reading.
///
/// Keyed by `(device_timestamp, device_id)`. `device_timestamp` is the
/// inverter's own sample time, so an inverter that hasn't sampled since the
/// last poll reports the same key again.
#[derive(Clone, Debug, PartialEq)]
pub struct PanelSnapshot {
    pub device_timestamp: i64,
    pub device_id: String,

    pub firmware_micro: String,
    pub protocol_ids: String,
    pub protocol_idi: String,
    pub firmware_dsp: String,
    pub firmware_rf: String,

    pub cumulative_energy_wh: f64,
    pub output_voltage_v: f64,
    pub output_power_w: f64,
    pub frequency_hz: f64,
    pub input_voltage_v: f64,
    pub dsp_temperature_c: f64,
    pub mosfet_temperature_c: f64,

    pub inverter_status: String,
    pub boost_status: String,
    pub alarm_status: String,

    pub rssi: i64,
    pub rssi_count: i64,
    pub rssi_average: i64,
    pub message_count: i64,
    pub samples: i64,

    pub dsp_alarm: String,
    pub mcu_alarm: String,
    pub mcu_warning: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Record {
    Plant(PlantSnapshot),
    Panel(PanelSnapshot),
}
