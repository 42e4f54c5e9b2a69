//! The installed-manifest snapshot: what versions/files/directories are
//! actually on disk right now, as of the last successful update.

use std::path::Path;

use thiserror::Error;

use crate::manifest::ModuleMap;


/// The statefile we load/save the installed snapshot from, relative to
/// the update directory.
const STATEFILE: &str = "current.json";


/// Mapping from module name to its installed entry. Same shape as the
/// server manifest, but `digest`/`url` are always `None` here.
pub(crate) type Snapshot = ModuleMap;


/// Errors loading or saving the installed snapshot.
#[derive(Debug)]
#[derive(Error)]
pub(crate) enum StateErr
{
	/// No state to load; this project doesn't support updating (or
	/// hasn't had an initial install that wrote one).
	#[error("No installed snapshot at {0}")]
	Missing(std::path::PathBuf),

	/// Some IO error (open, read, write, rename, etc)
	#[error("Snapshot I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// Some sort of parsing error of the JSON
	#[error("Snapshot parse error: {0}")]
	Parse(#[from] serde_json::Error),
}


/// Load the installed snapshot from `<updatedir>/current.json`.
pub(crate) fn load(updatedir: &Path) -> Result<Snapshot, StateErr>
{
	let statefile = updatedir.join(STATEFILE);
	if !statefile.is_file() { Err(StateErr::Missing(statefile))? }

	let sfstr = std::fs::read_to_string(&statefile)?;
	let snap: Snapshot = serde_json::from_str(&sfstr)?;
	Ok(snap)
}


/// Write the installed snapshot out to `<updatedir>/current.json`,
/// atomically: write to a tempfile in the same directory, fsync, then
/// rename onto `current.json`. Unlike a plain `File::create` + write, a
/// crash mid-write can't leave a truncated or half-written snapshot
/// behind.
pub(crate) fn save(updatedir: &Path, snap: &Snapshot) -> Result<(), StateErr>
{
	let statefile = updatedir.join(STATEFILE);
	let stjson = serde_json::to_string(snap)?;

	crate::util::fs::write_atomic(&statefile, stjson.as_bytes(), false)?;
	Ok(())
}



#[cfg(test)]
mod tests
{
	use super::*;
	use crate::manifest::ModuleEntry;

	fn fixture_snap() -> Snapshot
	{
		let mut snap = Snapshot::new();
		snap.insert("core".to_string(), ModuleEntry {
			version: "1".to_string(),
			files: vec!["a.txt".to_string()],
			directories: vec![],
			xbit: vec![],
			digest: None,
			url: None,
		});
		snap
	}

	#[test]
	fn missing_is_missing()
	{
		let dir = tempfile::tempdir().unwrap();
		let err = load(dir.path()).expect_err("should be missing");
		assert!(matches!(err, StateErr::Missing(_)));
	}

	#[test]
	fn roundtrip()
	{
		let dir = tempfile::tempdir().unwrap();
		let snap = fixture_snap();
		save(dir.path(), &snap).unwrap();

		let loaded = load(dir.path()).unwrap();
		assert_eq!(loaded.get("core").unwrap().version, "1");

		// No stray .new left behind.
		assert!(!dir.path().join("current.json.new").exists());
	}

	#[test]
	fn save_is_atomic_rename()
	{
		let dir = tempfile::tempdir().unwrap();
		let snap = fixture_snap();
		save(dir.path(), &snap).unwrap();

		// Overwrite with a second snapshot; the old file should never
		// be observably half-written since save() only ever renames a
		// fully-written tempfile onto it.
		let mut snap2 = fixture_snap();
		snap2.get_mut("core").unwrap().version = "2".to_string();
		save(dir.path(), &snap2).unwrap();

		let loaded = load(dir.path()).unwrap();
		assert_eq!(loaded.get("core").unwrap().version, "2");
	}
}
