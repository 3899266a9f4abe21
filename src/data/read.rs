use rusqlite::{Connection, OptionalExtension};

use crate::model::{PanelSnapshot, PlantSnapshot};

pub fn last_plant_snapshot(conn: &Connection) -> rusqlite::Result<Option<PlantSnapshot>> {
    conn.query_row(
        "SELECT timestamp, pout_W, etot_Wh, status
         FROM system
         ORDER BY timestamp DESC
         LIMIT 1;",
        [],
        |row| {
            Ok(PlantSnapshot {
                captured_at: row.get(0)?,
                instant_power_w: row.get(1)?,
                cumulative_energy_wh: row.get(2)?,
                status: row.get(3)?,
            })
        },
    )
    .optional()
}

#[cfg(test)]
pub fn find_panel_snapshot(
    conn: &Connection,
    device_timestamp: i64,
    device_id: &str,
) -> rusqlite::Result<Option<PanelSnapshot>> {
    conn.query_row(
        "SELECT timestamp, macrf,
                fwmicro, p1_ids, p1_idi, fwdsp, fwrf,
                Etot_Wh, Vout_V, Pout_W, Freq_Hz, Vin_V, Tdsp_degC, Tmos_degC,
                invstat, booststat, alarmstat,
                rssi, rssicnt, rssiavg, msgcnt, samples,
                dspalarm, mcualarm, mcuwarning
         FROM panels
         WHERE timestamp = ? AND macrf = ?",
        rusqlite::params![device_timestamp, device_id],
        |row| {
            Ok(PanelSnapshot {
                device_timestamp: row.get(0)?,
                device_id: row.get(1)?,
                firmware_micro: row.get(2)?,
                protocol_ids: row.get(3)?,
                protocol_idi: row.get(4)?,
                firmware_dsp: row.get(5)?,
                firmware_rf: row.get(6)?,
                cumulative_energy_wh: row.get(7)?,
                output_voltage_v: row.get(8)?,
                output_power_w: row.get(9)?,
                frequency_hz: row.get(10)?,
                input_voltage_v: row.get(11)?,
                dsp_temperature_c: row.get(12)?,
                mosfet_temperature_c: row.get(13)?,
                inverter_status: row.get(14)?,
                boost_status: row.get(15)?,
                alarm_status: row.get(16)?,
                rssi: row.get(17)?,
                rssi_count: row.get(18)?,
                rssi_average: row.get(19)?,
                message_count: row.get(20)?,
                samples: row.get(21)?,
                dsp_alarm: row.get(22)?,
                mcu_alarm: row.get(23)?,
                mcu_warning: row.get(24)?,
            })
        },
    )
    .optional()
}

pub fn plant_snapshot_count(conn: &Connection) -> rusqlite::Result<u64> {
    conn.query_row("SELECT COUNT(*) FROM system", [], |row| row.get(0))
}

pub fn panel_snapshot_count(conn: &Connection) -> rusqlite::Result<u64> {
    conn.query_row("SELECT COUNT(*) FROM panels", [], |row| row.get(0))
}

pub fn missing_tables(conn: &Connection, expected: &[&'static str]) -> rusqlite::Result<Vec<&'static str>> {
    let mut stmt = conn.prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?")?;

    let mut missing = vec![];
    for table in expected {
        if !stmt.exists([table])? {
            missing.push(*table);
        }
    }

    Ok(missing)
}
