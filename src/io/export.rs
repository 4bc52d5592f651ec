//! CSV export for simulation snapshots.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::sim::types::GridSnapshot;

/// Column header: one row per substation per tick.
const HEADER: &str = "tick,time_s,hour,temperature_f,active_scenario,\
                       substation_id,status,load_mw,capacity_mw,utilization,\
                       countdown_s,v2g_enabled,v2g_delivered_kwh";

/// Exports snapshots to a CSV file at the given path.
///
/// Produces deterministic output for identical inputs.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(snapshots: &[GridSnapshot], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(snapshots, buf)
}

/// Writes snapshots as CSV to any writer.
///
/// Empty cells mean "none": no countdown running, no scenario holding the
/// lock, or no active V2G session at that substation.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(snapshots: &[GridSnapshot], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(HEADER.split(',').map(str::trim))?;

    for snap in snapshots {
        let tick = snap.tick.to_string();
        let time_s = format!("{:.3}", snap.time_s);
        let hour = snap.hour.to_string();
        let temperature = format!("{:.1}", snap.temperature_f);
        let scenario = snap
            .active_scenario
            .as_ref()
            .map(|lock| lock.owner.as_str())
            .unwrap_or("");
        for s in &snap.substations {
            let delivered = snap
                .sessions
                .iter()
                .find(|session| session.substation_id == s.id)
                .map(|session| format!("{:.4}", session.delivered_kwh))
                .unwrap_or_default();
            let load = format!("{:.4}", s.load_mw);
            let capacity = format!("{:.4}", s.capacity_mw);
            let utilization = format!("{:.6}", s.utilization);
            let countdown = s
                .countdown_remaining_s
                .map(|c| format!("{c:.3}"))
                .unwrap_or_default();
            wtr.write_record([
                tick.as_str(),
                time_s.as_str(),
                hour.as_str(),
                temperature.as_str(),
                scenario,
                s.id.as_str(),
                s.status.as_str(),
                load.as_str(),
                capacity.as_str(),
                utilization.as_str(),
                countdown.as_str(),
                if s.v2g_enabled { "true" } else { "false" },
                delivered.as_str(),
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}
