//! Top-level command dispatch.

/// Command-line parsing and handling
pub(crate) mod line;
pub(crate) use line::Args;
pub use line::parse;



// Handle exiting with a code in special cases
use std::process::ExitCode;

#[derive(Debug)]
enum MyExit
{
	Ok,
	Code(u8),
}

impl From<()> for MyExit { fn from(_x: ()) -> Self { Self::Ok } }
impl From<u8> for MyExit { fn from(c: u8)  -> Self { Self::Code(c) } }

impl From<MyExit> for ExitCode
{
	fn from(my: MyExit) -> Self
	{
		use MyExit as M;
		match my {
			M::Ok      => Self::SUCCESS,
			M::Code(c) => c.into(),
		}
	}
}


/// Pass a bunch of info to the individual command runners as a block
#[derive(Debug)]
pub(crate) struct CmdArg
{
	/// The command-line args
	pub(crate) clargs: Args,

	/// The working config
	pub(crate) config: crate::config::Config,
}


/// Dispatch a command
pub fn run(clargs: Args) -> Result<ExitCode, anyhow::Error>
{
	use crate::*;

	let config = config::load_config_file(&clargs.config, &clargs)
		.or_else(|e| {
			// No config file is fine; CLI args alone may be enough.
			use config::ConfigErr as CE;
			match e {
				CE::IO(ref ioe) if ioe.kind() == std::io::ErrorKind::NotFound => {
					config::load_config(b"", &clargs)
						.map_err(anyhow::Error::from)
				},
				_ => Err(e.into()),
			}
		})?;

	let carg = CmdArg { clargs, config };

	use line::Cmds as C;
	let myex: MyExit = match carg.clargs.command {
		C::Check{..} => cmd::check::run(carg)?.into(),
		C::Run{..}   => cmd::run::run(carg)?.into(),
		C::Clean{..} => cmd::clean::run(carg)?.into(),

		#[cfg(test)]
		C::Dummy => unreachable!("Not a real thing"),
	};
	Ok(myex.into())
}
