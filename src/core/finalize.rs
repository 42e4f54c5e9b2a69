//! Commits unpacked sidecars into place, prunes files the new manifest
//! no longer lists, and cleans up scratch state (§4.8).
//!
//! The unlink-then-rename swap mirrors
//! `core/install/bits.rs::file()`'s own atomic-replace idiom, just
//! applied to a sidecar that's already sitting next to its destination
//! instead of a freshly-written tempfile.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::core::{PathResolver, RtDirs};
use crate::error::UpdateError;
use crate::manifest::ModuleMap;


/// Swap every `<path>.new` sidecar onto its final `<path>`, in the order
/// the unpacker enqueued them.
pub(crate) fn move_files(pending_moves: &[PathBuf]) -> Result<(), UpdateError>
{
	for dest in pending_moves
	{
		let sidecar = sidecar_path(dest);

		if crate::util::fs::exists_no_follow(dest)
		{
			std::fs::remove_file(dest)?;
		}
		std::fs::rename(&sidecar, dest)?;
	}
	Ok(())
}


fn sidecar_path(dest: &Path) -> PathBuf
{
	let mut name = dest.file_name().expect("resolved path has a filename")
			.to_os_string();
	name.push(".new");
	dest.with_file_name(name)
}


/// Delete whatever files and directories `old` lists but `new` no
/// longer does, across every module.
///
/// Best-effort: a failure to remove any one obsolete entry is ignored,
/// since leaving a stray file behind is harmless and aborting partway
/// through would leave the install in a worse, half-pruned state.
pub(crate) fn delete_obsolete(old: &ModuleMap, new: &ModuleMap, resolver: &PathResolver)
{
	let old_files: HashSet<&str> = old.values()
			.flat_map(|e| e.files.iter().map(String::as_str)).collect();
	let new_files: HashSet<&str> = new.values()
			.flat_map(|e| e.files.iter().map(String::as_str)).collect();

	let old_dirs: HashSet<&str> = old.values()
			.flat_map(|e| e.directories.iter().map(String::as_str)).collect();
	let new_dirs: HashSet<&str> = new.values()
			.flat_map(|e| e.directories.iter().map(String::as_str)).collect();

	for logical in old_files.difference(&new_files)
	{
		let path = resolver.resolve(logical);
		let _ = std::fs::remove_file(path);
	}

	let mut obsolete_dirs: Vec<&&str> = old_dirs.difference(&new_dirs).collect();
	obsolete_dirs.sort_unstable_by(|a, b| b.cmp(a));
	for logical in obsolete_dirs
	{
		let path = resolver.resolve(logical);
		let _ = std::fs::remove_dir(path);
	}
}


/// Remove the per-module scratch files that only matter mid-update: the
/// downloaded archive and the zsync control file.
pub(crate) fn clean_transient(rt: &RtDirs, module: &str)
{
	let _ = std::fs::remove_file(rt.module_download(module));
	let _ = std::fs::remove_file(rt.module_zsync(module));
}


/// Remove the canonical seed archive built for a module, once it's no
/// longer needed as a seed.
pub(crate) fn clean_archives(rt: &RtDirs, module: &str)
{
	let _ = std::fs::remove_file(rt.module_archive(module));
}



#[cfg(test)]
mod tests
{
	use super::*;
	use crate::manifest::ModuleEntry;

	fn entry(files: &[&str], dirs: &[&str]) -> ModuleEntry
	{
		ModuleEntry {
			version: "1".into(),
			files: files.iter().map(|s| s.to_string()).collect(),
			directories: dirs.iter().map(|s| s.to_string()).collect(),
			xbit: vec![],
			digest: None,
			url: None,
		}
	}

	#[test]
	fn move_files_replaces_existing_destination()
	{
		let tmp = tempfile::tempdir().unwrap();
		let dest = tmp.path().join("a.txt");
		let sidecar = tmp.path().join("a.txt.new");
		std::fs::write(&dest, b"old").unwrap();
		std::fs::write(&sidecar, b"new").unwrap();

		move_files(&[dest.clone()]).unwrap();

		assert_eq!(std::fs::read(&dest).unwrap(), b"new");
		assert!(!sidecar.exists());
	}

	#[test]
	fn delete_obsolete_removes_dropped_files_and_empty_dirs()
	{
		let tmp = tempfile::tempdir().unwrap();
		std::fs::create_dir_all(tmp.path().join("olddir")).unwrap();
		std::fs::write(tmp.path().join("olddir/gone.txt"), b"x").unwrap();

		let mut old = ModuleMap::new();
		old.insert("core".into(), entry(&["olddir/gone.txt"], &["olddir"]));
		let new = ModuleMap::new();

		let resolver = PathResolver::new(tmp.path());
		delete_obsolete(&old, &new, &resolver);

		assert!(!tmp.path().join("olddir/gone.txt").exists());
		assert!(!tmp.path().join("olddir").exists());
	}

	#[test]
	fn delete_obsolete_keeps_files_still_listed()
	{
		let tmp = tempfile::tempdir().unwrap();
		std::fs::write(tmp.path().join("kept.txt"), b"x").unwrap();

		let mut old = ModuleMap::new();
		old.insert("core".into(), entry(&["kept.txt"], &[]));
		let mut new = ModuleMap::new();
		new.insert("core".into(), entry(&["kept.txt"], &[]));

		let resolver = PathResolver::new(tmp.path());
		delete_obsolete(&old, &new, &resolver);

		assert!(tmp.path().join("kept.txt").exists());
	}
}
