//! `check`: report whether an update is available, without installing.

use crate::command::CmdArg;
use crate::controller::{Controller, UpdateState};


pub(crate) fn run(carg: CmdArg) -> Result<u8, anyhow::Error>
{
	let config = &carg.config;
	let ctl = Controller::new(config.manifest_url.clone(), config.base_dir.clone(), config.force,
			config.jobs)?;

	let snap = crate::cmd::poll_to_terminal(&ctl, false);

	match snap.state {
		UpdateState::UpdateNotAvailable => { println!("Up to date."); Ok(0) },
		UpdateState::UpdateAvailable    => { println!("{}", snap.message); Ok(2) },
		UpdateState::Error              => { println!("Error: {}", snap.message); Ok(1) },
		other => anyhow::bail!("Unexpected state after check: {other}"),
	}
}
