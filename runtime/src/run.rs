use std::sync::atomic::{AtomicBool, Ordering};

use utils::error::Result;

static EXIT: AtomicBool = AtomicBool::new(false);

/// Install a Ctrl+C handler and repeatedly call `tick` — one iteration of socket I/O plus timer
/// work — until either a signal arrives or `tick` reports it's done.
pub fn run_until_signal(mut tick: impl FnMut() -> bool) -> Result {
	ctrlc::set_handler(|| EXIT.store(true, Ordering::Relaxed)).map_err(|err| log::error!("Error occurred while setting Ctrl+C handler: {err}"))?;

	while !EXIT.load(Ordering::Relaxed) {
		if !tick() {
			break;
		}
	}

	Ok(())
}
