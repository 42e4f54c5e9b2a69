//! Domain error kinds (see README §7 equivalent: one kind per terminal
//! failure the controller can land in).
//!
//! Every kind but [`UpdateError::Cancelled`] drives the state machine to
//! `ERROR`; `Cancelled` drives it to `CANCELLED`.  Both are terminal.

use std::path::PathBuf;

#[derive(Debug)]
#[derive(thiserror::Error)]
pub enum UpdateError
{
	/// Installed snapshot absent or unreadable.
	#[error("This install does not support updating (no snapshot at {0})")]
	MissingSnapshot(PathBuf),

	/// Can't write to the update directory or its log.
	#[error("No permission to write to the update directory: {0}")]
	PermissionDenied(String),

	/// Can't fetch or parse the server manifest.
	#[error("Could not fetch update manifest: {0}")]
	ManifestUnavailable(String),

	/// The delta tool produced no output file.
	#[error("The update file for module '{0}' was not downloaded")]
	DownloadFailed(String),

	/// Downloaded archive's digest didn't match the manifest's.
	#[error("The update file for module '{0}' does not have the correct \
			digest - it may have been corrupted")]
	DigestMismatch(String),

	/// Unknown tar entry type during unpack.
	#[error("While unpacking module '{module}', unknown entry type for \
			'{entry}'")]
	ArchiveMalformed
	{
		module: String,
		entry: String,
	},

	/// User requested abort at a suspension point.
	#[error("Update cancelled")]
	Cancelled,

	/// `run.sh` (or equivalent source-checkout marker) present at base.
	#[error("Refusing to update a source checkout")]
	RefusedSourceCheckout,

	/// Catch-all for I/O failures that aren't one of the above.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON (de)serialization failure for manifest/snapshot payloads.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl UpdateError
{
	/// Is this the one kind that maps to `CANCELLED` rather than `ERROR`?
	pub(crate) fn is_cancel(&self) -> bool
	{
		matches!(self, UpdateError::Cancelled)
	}
}

impl From<crate::state::StateErr> for UpdateError
{
	fn from(e: crate::state::StateErr) -> Self
	{
		use crate::state::StateErr as SE;
		match e {
			SE::Missing(p) => Self::MissingSnapshot(p),
			SE::Io(e)      => Self::Io(e),
			SE::Parse(e)   => Self::Json(e),
		}
	}
}

impl From<crate::manifest::ManifestErr> for UpdateError
{
	fn from(e: crate::manifest::ManifestErr) -> Self
	{
		Self::ManifestUnavailable(e.to_string())
	}
}
