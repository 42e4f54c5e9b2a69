//! Streams a downloaded module archive onto disk as `.new` sidecars,
//! deferring the atomic swap to the finalizer (§4.7).
//!
//! Two-pass (count, then stream) so progress can be reported as a
//! fraction of total entries, the way `core/install/install.rs` counts
//! its file list up front before walking it.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use crate::core::PathResolver;
use crate::error::UpdateError;
use crate::manifest::{ModuleEntry, ModuleMap};


/// What unpacking a module leaves behind for the finalizer to act on.
pub(crate) struct Unpacked
{
	/// Final (non-`.new`) destination paths whose `.new` sidecar is
	/// ready to be swapped in.
	pub(crate) pending_moves: Vec<PathBuf>,

	/// This module's entry as recorded in the archive's embedded
	/// `update/current.json`, if present.
	pub(crate) new_entry: Option<ModuleEntry>,
}


/// Unpack `archive_path` (a module's downloaded delta result) under
/// `resolver`'s base, for `module`.
pub(crate) fn unpack_module(
	module: &str,
	archive_path: &Path,
	resolver: &PathResolver,
	mut progress: impl FnMut(f64),
	mut cancel_check: impl FnMut() -> Result<(), UpdateError>,
) -> Result<Unpacked, UpdateError>
{
	let total = {
		let fh = File::open(archive_path)?;
		let mut ar = tar::Archive::new(fh);
		ar.entries()?.count()
	};

	let fh = File::open(archive_path)?;
	let mut ar = tar::Archive::new(fh);

	let mut pending_moves = Vec::new();
	let mut new_entry = None;
	let mut done = 0usize;

	for entry in ar.entries()?
	{
		cancel_check()?;

		let mut entry = entry?;
		let path = entry.path()?.to_string_lossy().into_owned();
		let kind = entry.header().entry_type();

		if path == "update"
		{
			// Bookkeeping-only directory; nothing to do.
		}
		else if path == "update/current.json"
		{
			let mut buf = Vec::new();
			io::copy(&mut entry, &mut buf)?;
			let snap: ModuleMap = serde_json::from_slice(&buf)?;
			new_entry = snap.get(module).cloned();
		}
		else if kind.is_dir()
		{
			let dest = resolver.resolve(&path);
			match std::fs::create_dir_all(&dest) {
				Ok(()) => {},
				Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {},
				Err(e) => return Err(e.into()),
			}
		}
		else if kind.is_file()
		{
			let dest = resolver.resolve(&path);
			let sidecar = sidecar_path(&dest);

			let xbit = crate::util::fs::want_xbit(entry.header().mode()?);
			crate::util::fs::copy_atomic(&mut entry, &sidecar, xbit)?;

			pending_moves.push(dest);
		}
		else
		{
			return Err(UpdateError::ArchiveMalformed {
				module: module.to_string(),
				entry: path,
			});
		}

		done += 1;
		progress(done as f64 / total.max(1) as f64);
	}

	Ok(Unpacked { pending_moves, new_entry })
}


fn sidecar_path(dest: &Path) -> PathBuf
{
	let mut name = dest.file_name().expect("resolved path has a filename")
			.to_os_string();
	name.push(".new");
	dest.with_file_name(name)
}



#[cfg(test)]
mod tests
{
	use super::*;

	fn build_test_archive(dest: &Path)
	{
		let fh = File::create(dest).unwrap();
		let mut b = tar::Builder::new(fh);

		let mut h = tar::Header::new_ustar();
		h.set_entry_type(tar::EntryType::Directory);
		h.set_size(0);
		h.set_mode(0o755);
		h.set_cksum();
		b.append_data(&mut h, "dir", io::empty()).unwrap();

		let data = b"hello world";
		let mut h = tar::Header::new_ustar();
		h.set_entry_type(tar::EntryType::Regular);
		h.set_size(data.len() as u64);
		h.set_mode(0o755);
		h.set_cksum();
		b.append_data(&mut h, "dir/a.txt", &data[..]).unwrap();

		let snap = serde_json::json!({
			"core": { "version": "2", "files": ["dir/a.txt"], "directories": ["dir"], "xbit": ["dir/a.txt"] }
		});
		let payload = serde_json::to_vec(&snap).unwrap();
		let mut h = tar::Header::new_ustar();
		h.set_entry_type(tar::EntryType::Regular);
		h.set_size(payload.len() as u64);
		h.set_mode(0o644);
		h.set_cksum();
		b.append_data(&mut h, "update/current.json", &payload[..]).unwrap();

		b.into_inner().unwrap();
	}

	#[test]
	fn unpacks_to_sidecars_and_extracts_snapshot()
	{
		let tmp = tempfile::tempdir().unwrap();
		let archive = tmp.path().join("core.update.new");
		build_test_archive(&archive);

		let base = tmp.path().join("install");
		std::fs::create_dir(&base).unwrap();
		let resolver = PathResolver::new(&base);

		let result = unpack_module("core", &archive, &resolver, |_| {}, || Ok(())).unwrap();

		assert_eq!(result.pending_moves.len(), 1);
		assert!(result.pending_moves[0].ends_with("dir/a.txt"));

		let sidecar = sidecar_path(&result.pending_moves[0]);
		assert_eq!(std::fs::read(&sidecar).unwrap(), b"hello world");

		assert!(result.new_entry.is_some());
	}

	#[test]
	fn cancellation_aborts_before_any_entry_is_applied() {
		let tmp = tempfile::tempdir().unwrap();
		let archive = tmp.path().join("core.update.new");
		build_test_archive(&archive);
		let resolver = PathResolver::new(tmp.path());

		let err = unpack_module("core", &archive, &resolver, |_| {}, || Err(UpdateError::Cancelled))
				.unwrap_err();
		assert!(err.is_cancel());
	}
}
