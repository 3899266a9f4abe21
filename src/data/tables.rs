pub const SYSTEM_TABLE: &str = "CREATE TABLE IF NOT EXISTS system (
                                timestamp INTEGER PRIMARY KEY,
                                pout_W REAL,
                                etot_Wh REAL,
                                status TEXT
                            );";

pub const PANELS_TABLE: &str = "CREATE TABLE IF NOT EXISTS panels (
                                timestamp INTEGER NOT NULL,
                                macrf TEXT NOT NULL,
                                fwmicro TEXT,
                                p1_ids TEXT,
                                p1_idi TEXT,
                                fwdsp TEXT,
                                fwrf TEXT,
                                Etot_Wh REAL,
                                Vout_V REAL,
                                Pout_W REAL,
                                Freq_Hz REAL,
                                Vin_V REAL,
                                Tdsp_degC REAL,
                                Tmos_degC REAL,
                                invstat TEXT,
                                booststat TEXT,
                                alarmstat TEXT,
                                rssi INTEGER,
                                rssicnt INTEGER,
                                rssiavg INTEGER,
                                msgcnt INTEGER,
                                samples INTEGER,
                                dspalarm TEXT,
                                mcualarm TEXT,
                                mcuwarning TEXT,
                                PRIMARY KEY (timestamp, macrf)
                            );";

pub const TABLE_NAMES: [&str; 2] = ["system", "panels"];
