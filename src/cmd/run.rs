//! `run`: check for an update and, if one exists, install it.

use crate::command::CmdArg;
use crate::controller::{Controller, UpdateState};


pub(crate) fn run(carg: CmdArg) -> Result<u8, anyhow::Error>
{
	let config = &carg.config;
	let ctl = Controller::new(config.manifest_url.clone(), config.base_dir.clone(), config.force,
			config.jobs)?;

	let snap = crate::cmd::poll_to_terminal(&ctl, true);

	match snap.state {
		UpdateState::UpdateNotAvailable => { println!("Up to date."); Ok(0) },
		UpdateState::Done               => { println!("Update installed. Restart to apply it."); Ok(0) },
		UpdateState::Cancelled          => { println!("Cancelled."); Ok(1) },
		UpdateState::Error              => { println!("Error: {}", snap.message); Ok(1) },
		other => anyhow::bail!("Unexpected state after run: {other}"),
	}
}
