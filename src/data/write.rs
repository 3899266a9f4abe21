use rusqlite::{ffi, params, Connection, ErrorCode};

use crate::model::{PanelSnapshot, PlantSnapshot};

pub fn insert_plant_snapshot(conn: &Connection, snapshot: &PlantSnapshot) -> rusqlite::Result<()> {
    let query = "INSERT INTO system (timestamp, pout_W, etot_Wh, status) VALUES (?, ?, ?, ?)";

    let mut stmt = conn.prepare_cached(query)?;
    let _rows = stmt.execute(params![
        snapshot.captured_at,
        snapshot.instant_power_w,
        snapshot.cumulative_energy_wh,
        snapshot.status
    ])?;

    Ok(())
}

pub fn insert_panel_snapshot(conn: &Connection, snapshot: &PanelSnapshot) -> rusqlite::Result<()> {
    let query = "INSERT INTO panels (
            timestamp, macrf,
            fwmicro, p1_ids, p1_idi, fwdsp, fwrf,
            Etot_Wh, Vout_V, Pout_W, Freq_Hz, Vin_V, Tdsp_degC, Tmos_degC,
            invstat, booststat, alarmstat,
            rssi, rssicnt, rssiavg, msgcnt, samples,
            dspalarm, mcualarm, mcuwarning
        ) VALUES (
            ?, ?,
            ?, ?, ?, ?, ?,
            ?, ?, ?, ?, ?, ?, ?,
            ?, ?, ?,
            ?, ?, ?, ?, ?,
            ?, ?, ?
        )";

    let mut stmt = conn.prepare_cached(query)?;
    let _rows = stmt.execute(params![
        snapshot.device_timestamp,
        snapshot.device_id,
        snapshot.firmware_micro,
        snapshot.protocol_ids,
        snapshot.protocol_idi,
        snapshot.firmware_dsp,
        snapshot.firmware_rf,
        snapshot.cumulative_energy_wh,
        snapshot.output_voltage_v,
        snapshot.output_power_w,
        snapshot.frequency_hz,
        snapshot.input_voltage_v,
        snapshot.dsp_temperature_c,
        snapshot.mosfet_temperature_c,
        snapshot.inverter_status,
        snapshot.boost_status,
        snapshot.alarm_status,
        snapshot.rssi,
        snapshot.rssi_count,
        snapshot.rssi_average,
        snapshot.message_count,
        snapshot.samples,
        snapshot.dsp_alarm,
        snapshot.mcu_alarm,
        snapshot.mcu_warning
    ])?;

    Ok(())
}

pub fn is_primary_key_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation
                && failure.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}
