//! Command line handling
//!
//! General invocation:
//! $0 [options] <command> [command-opts]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

// Add extra default'ing to make config tests easier

/// Main arg entry point
#[cfg_attr(test, derive(Default))]
#[derive(Debug)]
#[derive(Parser)]
#[command(about = "Update an installed application tree from a server manifest.")]
#[command(version)]
pub struct Args
{
	#[command(subcommand)]
	pub(crate) command: Cmds,

	/// Config file
	#[arg(short, long, default_value="update.conf")]
	pub(crate) config: PathBuf,

	/// Manifest URL to fetch updates from.
	#[arg(short, long)]
	pub(crate) manifest_url: Option<String>,

	/// The installed application tree to update.
	#[arg(short, long)]
	pub(crate) base_dir: Option<PathBuf>,

	/// Where update scratch state lives (defaults to `<base-dir>/update`).
	#[arg(short, long)]
	pub(crate) work_dir: Option<PathBuf>,

	/// Update even if the installed and server versions already match.
	#[arg(short, long)]
	pub(crate) force: bool,

	/// Parallelism for the archive builder's file-scanning pass.
	#[arg(short, long)]
	pub(crate) jobs: Option<u32>,
}


/// Individual subcommands and their args
#[cfg_attr(test, derive(Default))]
#[derive(Debug)]
#[derive(Subcommand)]
pub(crate) enum Cmds
{
	/// Dummy value (mostly to make derive(Default) happy...)
	#[cfg(test)]
	#[cfg_attr(test, default)]
	#[command(skip)]
	Dummy,

	/// Check whether an update is available, without installing it.
	///
	/// Loads the installed snapshot, fetches the server manifest, and
	/// reports the stale module set. Never proceeds past
	/// `UPDATE_AVAILABLE` on its own.
	Check(CmdCheck),

	/// Check for, and if available, install an update.
	///
	/// Runs the full pipeline: fetch manifest, build seed archives,
	/// download deltas, unpack, and finalize. Automatically proceeds
	/// past `UPDATE_AVAILABLE` once it's reached.
	Run(CmdRun),

	/// Remove transient update-directory state.
	///
	/// Deletes per-module scratch artifacts (`<module>.update`,
	/// `<module>.update.new`, `<module>.zsync`) without touching the
	/// installed snapshot.
	Clean(CmdClean),
}


/// Check args
#[derive(Debug, Default)]
#[derive(Parser)]
pub(crate) struct CmdCheck {}


/// Run args
#[derive(Debug, Default)]
#[derive(Parser)]
pub(crate) struct CmdRun {}


/// Clean args
#[derive(Debug, Default)]
#[derive(Parser)]
pub(crate) struct CmdClean {}



impl std::fmt::Display for Cmds
{
	fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error>
	{
		match self
		{
			Self::Check{..} => f.write_str("check"),
			Self::Run{..}   => f.write_str("run"),
			Self::Clean{..} => f.write_str("clean"),

			#[cfg(test)]
			Self::Dummy => f.write_str("dummy"),
		}
	}
}


pub fn parse() -> Args
{
	Args::parse()
}
