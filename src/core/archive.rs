//! Rebuilds a canonical archive of a module's currently-installed files,
//! to hand to the delta tool as a seed (§4.5).
//!
//! No teacher module builds tar archives (its "files" are individually
//! gzipped blobs, not an archive format), so the tar-writing idiom here
//! is new; the dirs-then-files iteration order follows
//! `core/install/install.rs::split`'s dispatch-by-entry-kind shape. The
//! file-scanning pre-pass (`scan_files`) parallelizes `stat`-ing the
//! module's files across `--jobs` worker threads using the same
//! request/response `crossbeam::channel` pair `core/pool.rs::Pool::run`
//! spins up, simplified down to this module's single work shape instead
//! of the teacher's generic trait; the tar itself is still written by
//! one thread afterward, since `tar::Builder` owns a single `Write`
//! sink and can't be fed from multiple threads at once.

use std::fs::File;
use std::path::{Path, PathBuf};

use crossbeam::channel;

use crate::error::UpdateError;
use crate::core::PathResolver;
use crate::manifest::ModuleEntry;


/// Fixed owner identity every canonicalized entry gets, so the delta
/// tool's block-matching isn't defeated by uid/gid/timestamp drift
/// between builds. Values and names are arbitrary so long as they match
/// the server's own canonicalization.
const CANON_UID: u64 = 1000;
const CANON_GID: u64 = 1000;
const CANON_MTIME: u64 = 0;
const CANON_UNAME: &str = "renpy";
const CANON_GNAME: &str = "renpy";

const MODE_XBIT: u32 = 0o777;
const MODE_PLAIN: u32 = 0o666;


/// Build the canonical seed archive for `module` at `dest`.
///
/// `cancel_check` is called at the start of each entry's iteration; if
/// it returns `Err`, the archive is abandoned (the caller is expected to
/// clean up `dest`).
pub(crate) fn build_seed(
	module: &str,
	entry: &ModuleEntry,
	resolver: &PathResolver,
	snapshot_json: &[u8],
	dest: &Path,
	jobs: u32,
	mut progress: impl FnMut(f64),
	mut cancel_check: impl FnMut() -> Result<(), UpdateError>,
) -> Result<(), UpdateError>
{
	let mut dirs: Vec<&str> = entry.directories.iter().map(String::as_str).collect();
	dirs.sort_unstable();

	let mut files: Vec<&str> = entry.files.iter().map(String::as_str).collect();
	files.sort_unstable();

	let total = dirs.len() + files.len() + 2; // + "update" dir + current.json
	let mut done = 0usize;

	let stats = scan_files(resolver, &files, jobs);

	let out = File::create(dest)?;
	let mut builder = tar::Builder::new(out);

	for d in &dirs
	{
		cancel_check()?;
		append_dir(&mut builder, d)?;
		done += 1;
		progress(done as f64 / total as f64);
	}

	for (f, md) in files.iter().zip(stats)
	{
		cancel_check()?;
		let xbit = entry.xbit.iter().any(|x| x == f);
		append_file_with_metadata(&mut builder, resolver, f, xbit, md)?;
		done += 1;
		progress(done as f64 / total as f64);
	}

	cancel_check()?;
	append_dir(&mut builder, "update")?;
	done += 1;
	progress(done as f64 / total as f64);

	cancel_check()?;
	append_bytes(&mut builder, "update/current.json", snapshot_json, false)?;
	done += 1;
	progress(done as f64 / total as f64);

	builder.into_inner()?.sync_all()?;

	let _ = module; // module name isn't embedded in the archive itself
	Ok(())
}


fn canon_header(entry_type: tar::EntryType, size: u64, mode: u32) -> tar::Header
{
	let mut h = tar::Header::new_ustar();
	h.set_entry_type(entry_type);
	h.set_size(size);
	h.set_mode(mode);
	h.set_uid(CANON_UID);
	h.set_gid(CANON_GID);
	h.set_mtime(CANON_MTIME);
	h.set_username(CANON_UNAME).expect("ascii username");
	h.set_groupname(CANON_GNAME).expect("ascii groupname");
	h
}


fn append_dir<W: std::io::Write>(builder: &mut tar::Builder<W>, logical: &str)
		-> Result<(), UpdateError>
{
	let mut h = canon_header(tar::EntryType::Directory, 0, MODE_XBIT);
	builder.append_data(&mut h, logical, std::io::empty())?;
	Ok(())
}


fn append_bytes<W: std::io::Write>(builder: &mut tar::Builder<W>, logical: &str,
		data: &[u8], xbit: bool) -> Result<(), UpdateError>
{
	let mode = if xbit { MODE_XBIT } else { MODE_PLAIN };
	let mut h = canon_header(tar::EntryType::Regular, data.len() as u64, mode);
	builder.append_data(&mut h, logical, data)?;
	Ok(())
}


/// Appends `logical`'s on-disk content using a metadata result already
/// fetched by [`scan_files`], skipping it quietly if it was missing (a
/// partial install is tolerated) or wasn't a regular file (a symlink or
/// device has no sensible archived representation here).
fn append_file_with_metadata<W: std::io::Write>(builder: &mut tar::Builder<W>,
		resolver: &PathResolver, logical: &str, xbit: bool, md: Option<std::fs::Metadata>)
		-> Result<(), UpdateError>
{
	let md = match md {
		Some(md) if md.file_type().is_file() => md,
		_ => return Ok(()),
	};

	let onpath = resolver.resolve(logical);
	let mode = if xbit { MODE_XBIT } else { MODE_PLAIN };
	let mut h = canon_header(tar::EntryType::Regular, md.len(), mode);
	let mut fh = File::open(&onpath)?;
	builder.append_data(&mut h, logical, &mut fh)?;
	Ok(())
}


/// `stat` every file in `files` (in resolver-space), in parallel across
/// up to `jobs` worker threads, preserving `files`' order in the
/// returned `Vec`. `None` means the entry doesn't exist or couldn't be
/// stat'd; the caller treats that the same as "missing" (a partial
/// install is tolerated, not an error).
///
/// With one job (or fewer than two files, not worth spinning up
/// threads for), this just stats sequentially.
fn scan_files(resolver: &PathResolver, files: &[&str], jobs: u32) -> Vec<Option<std::fs::Metadata>>
{
	if jobs <= 1 || files.len() < 2
	{
		return files.iter()
				.map(|f| std::fs::symlink_metadata(resolver.resolve(f)).ok())
				.collect();
	}

	std::thread::scope(|scope| {
		let (req_snd, req_rcv) = channel::unbounded::<(usize, PathBuf)>();
		let (res_snd, res_rcv) = channel::unbounded::<(usize, Option<std::fs::Metadata>)>();

		for _ in 0..jobs
		{
			let reqs = req_rcv.clone();
			let ress = res_snd.clone();
			scope.spawn(move || {
				while let Ok((i, path)) = reqs.recv()
				{
					let md = std::fs::symlink_metadata(&path).ok();
					ress.send((i, md)).expect("result channel outlives every worker");
				}
			});
		}
		drop(req_rcv);
		drop(res_snd);

		for (i, f) in files.iter().enumerate()
		{
			req_snd.send((i, resolver.resolve(f))).expect("workers outlive the request sender");
		}
		drop(req_snd);

		let mut out: Vec<Option<std::fs::Metadata>> = (0..files.len()).map(|_| None).collect();
		while let Ok((i, md)) = res_rcv.recv()
		{
			out[i] = md;
		}
		out
	})
}



#[cfg(test)]
mod tests
{
	use super::*;

	fn entry() -> ModuleEntry
	{
		ModuleEntry {
			version: "1".into(),
			files: vec!["a.txt".into(), "missing.txt".into()],
			directories: vec!["dir".into()],
			xbit: vec!["a.txt".into()],
			digest: None,
			url: None,
		}
	}

	#[test]
	fn builds_canonical_archive_skipping_missing_files()
	{
		let base = tempfile::tempdir().unwrap();
		std::fs::create_dir(base.path().join("dir")).unwrap();
		std::fs::write(base.path().join("a.txt"), b"hello").unwrap();

		let resolver = PathResolver::new(base.path());
		let dest = base.path().join("out.update");

		build_seed("core", &entry(), &resolver, b"{}", &dest, 1,
				|_| {}, || Ok(())).unwrap();

		let mut ar = tar::Archive::new(std::fs::File::open(&dest).unwrap());
		let names: Vec<String> = ar.entries().unwrap()
				.map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
				.collect();

		assert!(names.contains(&"dir".to_string()));
		assert!(names.contains(&"a.txt".to_string()));
		assert!(names.contains(&"update".to_string()));
		assert!(names.contains(&"update/current.json".to_string()));
		assert!(!names.contains(&"missing.txt".to_string()));
	}

	#[test]
	fn cancellation_stops_the_build()
	{
		let base = tempfile::tempdir().unwrap();
		let resolver = PathResolver::new(base.path());
		let dest = base.path().join("out.update");

		let err = build_seed("core", &entry(), &resolver, b"{}", &dest, 1,
				|_| {}, || Err(UpdateError::Cancelled)).unwrap_err();
		assert!(err.is_cancel());
	}

	#[test]
	fn parallel_scan_matches_sequential_scan()
	{
		let base = tempfile::tempdir().unwrap();
		for name in ["a.txt", "b.txt", "c.txt", "d.txt"]
		{
			std::fs::write(base.path().join(name), name.as_bytes()).unwrap();
		}
		let resolver = PathResolver::new(base.path());
		let files = ["a.txt", "b.txt", "c.txt", "d.txt", "missing.txt"];

		let seq = scan_files(&resolver, &files, 1);
		let par = scan_files(&resolver, &files, 4);

		assert_eq!(seq.len(), par.len());
		for (s, p) in seq.iter().zip(par.iter())
		{
			assert_eq!(s.is_some(), p.is_some());
			if let (Some(s), Some(p)) = (s, p)
			{
				assert_eq!(s.len(), p.len());
			}
		}
	}
}
