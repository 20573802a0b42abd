//! gaze-bridge - eye-tracker data acquisition bridge
//!
//! Bridges an eye-tracking engine that pushes gaze samples asynchronously
//! with a host that pulls them on its own cadence.
//!
//! The host talks to the bridge over stdin/stdout, one verb per line:
//! `connect`, `getdata`, `disconnect`. Each command answers with one line
//! of JSON. End of input disconnects and exits.

use std::io::{self, BufRead, Write};

mod bridge;
mod error;
mod settings;

use bridge::{Command, CommandDispatcher};
use settings::BridgeSettings;

fn main() -> io::Result<()> {
    env_logger::init();
    log::info!("Starting gaze-bridge");

    let settings = BridgeSettings::load();
    let mut dispatcher = CommandDispatcher::new(settings.build_engine());

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let reply = match dispatcher.dispatch(&line) {
            Ok(response) => serde_json::to_string(&response),
            Err(e) => {
                log::warn!("Command failed: {} (state {:?})", e, dispatcher.state());
                serde_json::to_string(&serde_json::json!({ "ok": false, "error": e.to_string() }))
            }
        }
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        writeln!(stdout, "{}", reply)?;
        stdout.flush()?;
    }

    let manager = dispatcher.manager();
    if manager.is_connected() {
        log::info!("Input closed while connected [{}]", manager.status);
    }
    log::info!(
        "{} samples received, {} undrained, {} malformed events dropped",
        manager.samples_received(),
        manager.pending_samples(),
        manager.dropped_events()
    );
    if let Err(e) = dispatcher.execute(Command::Disconnect) {
        log::warn!("Disconnect failed: {}", e);
    }
    settings.save();
    Ok(())
}
