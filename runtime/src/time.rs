use std::time::{Instant, SystemTime};

use pgm::port::Clock as ClockPort;

/// A clock anchored to the wall-clock time at construction, so elapsed monotonic time can be
/// projected back onto `SystemTime` for the timestamps PGM's SPM option carries.
#[derive(Clone, Copy)]
pub struct Clock {
	start: Instant,
	start_sys: SystemTime,
}

impl Clock {
	pub fn new() -> Self {
		Self { start: Instant::now(), start_sys: SystemTime::now() }
	}
}

impl Default for Clock {
	fn default() -> Self {
		Self::new()
	}
}

impl ClockPort for Clock {
	fn now(&self) -> Instant {
		Instant::now()
	}

	fn system_now(&self) -> SystemTime {
		self.start_sys + self.now().saturating_duration_since(self.start)
	}
}
