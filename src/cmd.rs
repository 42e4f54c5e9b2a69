// Load in the commands
pub(crate) mod check;
pub(crate) mod run;
pub(crate) mod clean;


use std::thread::sleep;
use std::time::Duration;

use indicatif::ProgressBar;

use crate::controller::{Controller, Progress, UpdateState};


/// How often the CLI harness polls the controller's observable state
/// (§6: "polls `state` at ~10 Hz").
const POLL_INTERVAL: Duration = Duration::from_millis(100);


/// Drive a [`Controller`] to a terminal state, printing progress as it
/// goes. `auto_proceed` mirrors the teacher's unattended-vs-interactive
/// split: `run` proceeds past `UPDATE_AVAILABLE` on its own, `check`
/// stops there and never calls `proceed()`.
pub(crate) fn poll_to_terminal(ctl: &Controller, auto_proceed: bool) -> Progress
{
	let mut bar: Option<ProgressBar> = None;
	let mut last_state: Option<UpdateState> = None;

	loop
	{
		let snap = ctl.snapshot();

		if last_state != Some(snap.state)
		{
			if let Some(b) = bar.take() { b.finish_and_clear(); }
			println!("{}: {}", snap.state, snap.message);
			last_state = Some(snap.state);
		}

		if let Some(frac) = snap.progress
		{
			let b = bar.get_or_insert_with(|| ProgressBar::new(1000));
			b.set_position((frac * 1000.0).round() as u64);
		}

		if snap.state == UpdateState::UpdateAvailable
		{
			if auto_proceed { ctl.proceed(); }
			else
			{
				// `check` never proceeds past here; reporting the
				// stale set is the whole point of the call.
				if let Some(b) = bar.take() { b.finish_and_clear(); }
				return snap;
			}
		}

		if is_terminal(snap.state)
		{
			if let Some(b) = bar.take() { b.finish_and_clear(); }
			return snap;
		}

		sleep(POLL_INTERVAL);
	}
}


fn is_terminal(state: UpdateState) -> bool
{
	use UpdateState as S;
	matches!(state, S::UpdateNotAvailable | S::Done | S::Error | S::Cancelled)
}
