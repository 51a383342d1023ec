use std::error::Error;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use nwn_combat_stats::CombatSession;
use nwn_combat_stats::utils::{format_duration, get_settings_file_path, load_app_settings};
use tracing::info;
use tracing_subscriber::filter::EnvFilter;

const REPORT_INTERVAL: Duration = Duration::from_secs(10);

fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<(), Box<dyn Error>> {
    init_logging();

    let settings_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(get_settings_file_path);
    let session = CombatSession::new(load_app_settings(&settings_path));

    // Spawn the background thread for log watching.
    let ingestion = session.spawn_ingestion();

    let (stop_tx, stop_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })?;

    loop {
        match stop_rx.recv_timeout(REPORT_INTERVAL) {
            Err(RecvTimeoutError::Timeout) => report(&session),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    info!("shutting down");
    ingestion.stop();
    report(&session);
    Ok(())
}

fn report(session: &CombatSession) {
    if session.store().is_empty() {
        return;
    }

    for row in session.dps_table() {
        info!(
            actor = %row.actor,
            dps = %format!("{:.1}", row.dps),
            total = row.total_damage,
            window = %format_duration(row.elapsed_secs),
            hit_rate = ?row.hit_rate.map(|r| format!("{:.0}%", r)),
            "dps"
        );
    }

    for snapshot in session.target_snapshots() {
        let immunities: Vec<String> = snapshot
            .damage_types
            .iter()
            .filter_map(|t| t.immunity_pct.map(|pct| format!("{} {}%", t.damage_type, pct)))
            .collect();
        info!(
            name = %snapshot.target,
            ac = %snapshot.ac_display,
            ab = %snapshot.ab_display,
            fort = ?snapshot.saves.fortitude,
            reflex = ?snapshot.saves.reflex,
            will = ?snapshot.saves.will,
            immunities = %immunities.join(", "),
            "target"
        );
    }
}
