use chrono::Utc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::comm::DocumentSource;
use crate::data::{PanelInsert, PlantStore, StoreError};
use crate::document;
use crate::model::{PanelSnapshot, PlantSnapshot, Record};
use crate::scheduler::{Scheduler, Tick};

/// What happened to the records of one successfully parsed document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub plant_stored: usize,
    pub plant_failed: usize,
    pub panels_stored: usize,
    pub panels_duplicate: usize,
    pub panels_failed: usize,
    pub records_dropped: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(CycleReport),
    FetchFailed,
    DocumentRejected,
}

fn wall_clock_seconds() -> i64 {
    Utc::now().timestamp()
}

/// Runs the fetch, parse and store cycle once per tick until shut down.
///
/// Owns the store for its whole life; nothing else writes to it.
pub struct PlantWatcher<S: DocumentSource> {
    source: S,
    store: PlantStore,
    scheduler: Scheduler,
    clock: Box<dyn Fn() -> i64 + Send>,
}

impl<S: DocumentSource> PlantWatcher<S> {
    pub fn new(source: S, store: PlantStore, period: Duration) -> Self {
        PlantWatcher {
            source,
            store,
            scheduler: Scheduler::new(period),
            clock: Box::new(wall_clock_seconds),
        }
    }

    /// Replaces the clock that stamps controller records, in epoch seconds.
    #[cfg(test)]
    pub fn with_clock(mut self, clock: impl Fn() -> i64 + Send + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    #[cfg(test)]
    pub fn store(&self) -> &PlantStore {
        &self.store
    }

    /// Loops until `shutdown` is cancelled, then closes the store.
    ///
    /// A cycle that is already running when shutdown arrives is finished first.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), StoreError> {
        let span = info_span!("plant", origin = %self.source.origin());

        async move {
            match self.store.last_plant_snapshot() {
                Ok(Some(last)) => info!(
                    "Resuming, last plant snapshot was captured at {}",
                    last.captured_at
                ),
                Ok(None) => info!("Store holds no plant snapshot yet"),
                Err(err) => warn!("Couldn't read the last plant snapshot: {}", err),
            }

            info!(
                "Polling every {}",
                humantime::format_duration(self.scheduler.period())
            );

            while let Tick::Fire(_) = self.scheduler.wait_for_tick(&shutdown).await {
                let captured_at = (self.clock)();
                self.run_cycle(captured_at).await;
            }

            info!("Polling interrupted, closing store");
            self.store.close()
        }
        .instrument(span)
        .await
    }

    pub async fn run_cycle(&mut self, captured_at: i64) -> CycleOutcome {
        let raw = match self.source.fetch().await {
            Ok(raw) => raw,
            Err(err) => {
                warn!("Fetch failed, skipping cycle: {}", err);
                return CycleOutcome::FetchFailed;
            }
        };

        let parsed = match document::parse(&raw, captured_at) {
            Ok(parsed) => parsed,
            Err(err) => {
                error!("Discarding plant document: {}", err);
                return CycleOutcome::DocumentRejected;
            }
        };

        let mut report = CycleReport {
            records_dropped: parsed.dropped,
            ..CycleReport::default()
        };

        for record in parsed.records {
            match record {
                Record::Plant(plant) => self.persist_plant(&plant, &mut report),
                Record::Panel(panel) => self.persist_panel(&panel, &mut report),
            }
        }

        info!(
            "Cycle done: plant {} stored/{} failed, panels {} stored/{} duplicate/{} failed, {} dropped",
            report.plant_stored,
            report.plant_failed,
            report.panels_stored,
            report.panels_duplicate,
            report.panels_failed,
            report.records_dropped
        );

        CycleOutcome::Completed(report)
    }

    fn persist_plant(&mut self, plant: &PlantSnapshot, report: &mut CycleReport) {
        match self.store.insert_plant_snapshot(plant) {
            Ok(()) => {
                info!(
                    "Power (instant): {:.1}W; Energy (total) {:.0}Wh; Status: {}",
                    plant.instant_power_w, plant.cumulative_energy_wh, plant.status
                );
                report.plant_stored += 1;
            }
            Err(err) => {
                error!(
                    "Dropping plant snapshot captured at {}: {}",
                    plant.captured_at, err
                );
                report.plant_failed += 1;
            }
        }
    }

    fn persist_panel(&mut self, panel: &PanelSnapshot, report: &mut CycleReport) {
        match self.store.insert_panel_snapshot(panel) {
            Ok(PanelInsert::Stored) => {
                debug!(
                    "Panel {} - Power: {:.2}W; Energy: {:.0}Wh; Voltage In: {:.1}VDC; Voltage Out: {:.0}VAC; DSP Temp: {:.0}C; MOSFET Temp: {:.0}C",
                    panel.device_id,
                    panel.output_power_w,
                    panel.cumulative_energy_wh,
                    panel.input_voltage_v,
                    panel.output_voltage_v,
                    panel.dsp_temperature_c,
                    panel.mosfet_temperature_c
                );
                report.panels_stored += 1;
            }
            Ok(PanelInsert::Duplicate) => {
                debug!(
                    "Entry for panel {} already exists at {}",
                    panel.device_id, panel.device_timestamp
                );
                report.panels_duplicate += 1;
            }
            Err(err) => {
                error!(
                    "Dropping snapshot of panel {} at {}: {}",
                    panel.device_id, panel.device_timestamp, err
                );
                report.panels_failed += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::FetchError;
    use bytes::Bytes;
    use chrono::{Local, TimeZone};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    const PERIOD: Duration = Duration::from_secs(60);

    fn inverter(macrf: &str, ts: &str) -> String {
        format!(
            r#"<edd ts="{ts}" macrf="{macrf}" Pout_W="60.1" Etot_Wh="1700" Vin_V="400" Vout_V="230" Freq_Hz="50" Tdsp_degC="35" Tmos_degC="40" invstat="ok" booststat="ok" alarmstat="none" rssi="-60" rssicnt="1" rssiavg="-61" msgcnt="5" samples="5" dspalarm="" mcualarm="" mcuwarning="" fwmicro="1" p1_ids="x" p1_idi="y" fwdsp="1" fwrf="1"/>"#
        )
    }

    fn plant_document(inverters: &[String]) -> Bytes {
        Bytes::from(format!(
            r#"<root><cdd pout_W="120.5" etot_Wh="3400" status="Run">{}</cdd></root>"#,
            inverters.concat()
        ))
    }

    fn timeout() -> FetchError {
        FetchError::Timeout {
            url: "http://ccd/plant.xml".to_string(),
            timeout: PERIOD.mul_f64(0.75),
        }
    }

    /// Hands out queued answers, then repeats the last document forever.
    struct ScriptedSource {
        answers: Mutex<VecDeque<Result<Bytes, FetchError>>>,
        repeat: Bytes,
    }

    impl ScriptedSource {
        fn repeating(document: Bytes) -> Self {
            ScriptedSource {
                answers: Mutex::new(VecDeque::new()),
                repeat: document,
            }
        }

        fn then(self, answer: Result<Bytes, FetchError>) -> Self {
            self.answers.lock().unwrap().push_back(answer);
            self
        }
    }

    impl DocumentSource for ScriptedSource {
        fn origin(&self) -> &str {
            "scripted"
        }

        async fn fetch(&self) -> Result<Bytes, FetchError> {
            let next = self.answers.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(self.repeat.clone()))
        }
    }

    /// Takes `delay` per fetch and records when each fetch started.
    struct SlowSource {
        delay: Duration,
        document: Bytes,
        in_flight: AtomicBool,
        starts: Arc<Mutex<Vec<Instant>>>,
    }

    impl DocumentSource for SlowSource {
        fn origin(&self) -> &str {
            "slow"
        }

        async fn fetch(&self) -> Result<Bytes, FetchError> {
            assert!(
                !self.in_flight.swap(true, Ordering::SeqCst),
                "two fetches overlapped"
            );
            self.starts.lock().unwrap().push(Instant::now());
            tokio::time::sleep(self.delay).await;
            self.in_flight.store(false, Ordering::SeqCst);
            Ok(self.document.clone())
        }
    }

    fn watcher<S: DocumentSource>(source: S) -> PlantWatcher<S> {
        PlantWatcher::new(source, PlantStore::open_in_memory().unwrap(), PERIOD)
    }

    #[tokio::test]
    async fn one_controller_and_n_inverters_make_n_plus_one_rows() {
        let document = plant_document(&[
            inverter("01", "01-05-24 10:00:00"),
            inverter("02", "01-05-24 10:00:00"),
            inverter("03", "01-05-24 10:00:01"),
        ]);
        let mut watcher = watcher(ScriptedSource::repeating(document));

        let outcome = watcher.run_cycle(1_714_557_600).await;

        assert_eq!(
            outcome,
            CycleOutcome::Completed(CycleReport {
                plant_stored: 1,
                panels_stored: 3,
                ..CycleReport::default()
            })
        );
        assert_eq!(watcher.store().plant_snapshot_count().unwrap(), 1);
        assert_eq!(watcher.store().panel_snapshot_count().unwrap(), 3);
    }

    #[tokio::test]
    async fn refetching_the_same_document_only_adds_a_plant_row() {
        let document = plant_document(&[inverter("01", "01-05-24 10:00:00")]);
        let mut watcher = watcher(ScriptedSource::repeating(document));

        watcher.run_cycle(1_000).await;
        let outcome = watcher.run_cycle(1_060).await;

        assert_eq!(
            outcome,
            CycleOutcome::Completed(CycleReport {
                plant_stored: 1,
                panels_duplicate: 1,
                ..CycleReport::default()
            })
        );
        assert_eq!(watcher.store().plant_snapshot_count().unwrap(), 2);
        assert_eq!(watcher.store().panel_snapshot_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn broken_inverter_does_not_block_its_siblings() {
        let broken = inverter("02", "01-05-24 10:00:00").replace(r#" Tmos_degC="40""#, "");
        let document = plant_document(&[
            inverter("01", "01-05-24 10:00:00"),
            broken,
            inverter("03", "01-05-24 10:00:00"),
        ]);
        let mut watcher = watcher(ScriptedSource::repeating(document));

        let outcome = watcher.run_cycle(1_000).await;

        assert_eq!(
            outcome,
            CycleOutcome::Completed(CycleReport {
                plant_stored: 1,
                panels_stored: 2,
                records_dropped: 1,
                ..CycleReport::default()
            })
        );
        let sampled_at = Local
            .with_ymd_and_hms(2024, 5, 1, 10, 0, 0)
            .earliest()
            .unwrap()
            .timestamp();
        let store = watcher.store();
        assert!(store.find_panel_snapshot(sampled_at, "01").unwrap().is_some());
        assert!(store.find_panel_snapshot(sampled_at, "02").unwrap().is_none());
        assert!(store.find_panel_snapshot(sampled_at, "03").unwrap().is_some());
    }

    #[tokio::test]
    async fn fetch_timeout_writes_nothing() {
        let source = ScriptedSource::repeating(Bytes::new()).then(Err(timeout()));
        let mut watcher = watcher(source);

        assert_eq!(watcher.run_cycle(1_000).await, CycleOutcome::FetchFailed);
        assert_eq!(watcher.store().plant_snapshot_count().unwrap(), 0);
        assert_eq!(watcher.store().panel_snapshot_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn malformed_document_writes_nothing() {
        let source = ScriptedSource::repeating(Bytes::from_static(
            b"<root><cdd pout_W=\"1\" etot_Wh=\"2\" status=\"Run\">",
        ));
        let mut watcher = watcher(source);

        assert_eq!(watcher.run_cycle(1_000).await, CycleOutcome::DocumentRejected);
        assert_eq!(watcher.store().plant_snapshot_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn plant_clash_is_dropped_and_the_cycle_goes_on() {
        //Two controllers in one document share the capture second
        let document = Bytes::from(format!(
            r#"<root><cdd pout_W="1" etot_Wh="2" status="A"/><cdd pout_W="3" etot_Wh="4" status="B">{}</cdd></root>"#,
            inverter("01", "01-05-24 10:00:00")
        ));
        let mut watcher = watcher(ScriptedSource::repeating(document));

        let outcome = watcher.run_cycle(1_000).await;

        assert_eq!(
            outcome,
            CycleOutcome::Completed(CycleReport {
                plant_stored: 1,
                plant_failed: 1,
                panels_stored: 1,
                ..CycleReport::default()
            })
        );
        let kept = watcher.store().last_plant_snapshot().unwrap().unwrap();
        assert_eq!(kept.status, "A");
    }

    #[tokio::test(start_paused = true)]
    async fn loop_recovers_after_a_failed_fetch_and_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plant.db3");
        PlantStore::initialise(&path).unwrap();

        let document = plant_document(&[inverter("01", "01-05-24 10:00:00")]);
        let source = ScriptedSource::repeating(document).then(Err(timeout()));
        let start = Instant::now();
        let watcher = PlantWatcher::new(source, PlantStore::open(&path).unwrap(), PERIOD)
            .with_clock(move || 1_700_000_000 + start.elapsed().as_secs() as i64);

        let shutdown = CancellationToken::new();
        let canceller = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(150)).await;
            canceller.cancel();
        });

        //Ticks at 0s (timeout), 60s and 120s
        watcher.run(shutdown).await.unwrap();

        let store = PlantStore::open(&path).unwrap();
        assert_eq!(store.plant_snapshot_count().unwrap(), 2);
        assert_eq!(store.panel_snapshot_count().unwrap(), 1);
        assert_eq!(
            store.last_plant_snapshot().unwrap().unwrap().captured_at,
            1_700_000_120
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_cycles_never_overlap() {
        let starts = Arc::new(Mutex::new(vec![]));
        let source = SlowSource {
            delay: Duration::from_secs(90),
            document: plant_document(&[]),
            in_flight: AtomicBool::new(false),
            starts: starts.clone(),
        };
        let start = Instant::now();
        let watcher = watcher(source).with_clock(move || start.elapsed().as_secs() as i64);

        let shutdown = CancellationToken::new();
        let canceller = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(200)).await;
            canceller.cancel();
        });

        watcher.run(shutdown).await.unwrap();

        let starts = starts.lock().unwrap();
        let offsets: Vec<u64> = starts
            .iter()
            .map(|at| (*at - start).as_secs())
            .collect();
        //Each cycle starts when the previous one returns, never before
        assert_eq!(offsets, vec![0, 90, 180]);
    }

    #[tokio::test]
    async fn cancelled_before_start_closes_without_polling() {
        let source = ScriptedSource::repeating(Bytes::new()).then(Err(timeout()));
        let watcher = watcher(source);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        watcher.run(shutdown).await.unwrap();
    }
}
