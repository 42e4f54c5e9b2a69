//! The update session's state machine: sequences the pipeline stages,
//! publishes observable progress, and synchronizes cancel/proceed with
//! whatever UI is polling it (§4.4, §5).
//!
//! The teacher has no equivalent long-running worker (its commands run
//! to completion synchronously); the shared-snapshot-behind-a-mutex plus
//! condvar-gated suspension here is new machinery, grounded directly on
//! spec §5's explicit guidance and modeled after `core/pool.rs`'s
//! channel-based thread orchestration for the producer/consumer shape.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use strum::{Display, EnumString};

use crate::config::Config;
use crate::core::{self, PathResolver, RtDirs};
use crate::error::UpdateError;
use crate::manifest::{self, ModuleMap};
use crate::state;


/// Marker file that, if present at the base directory, means this is a
/// source checkout and must never be touched by the updater.
const SOURCE_CHECKOUT_GUARD: &str = "run.sh";

/// Default name of the external delta tool, looked up on `PATH`.
const DEFAULT_TOOL: &str = "zsync";


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateState
{
	Checking,
	UpdateNotAvailable,
	UpdateAvailable,
	Preparing,
	Downloading,
	Unpacking,
	Finishing,
	Done,
	Error,
	Cancelled,
}


/// The single, cheaply-clonable snapshot of everything a UI needs to
/// poll and render (§5: published as one value behind a mutex so reads
/// never tear across fields).
#[derive(Debug, Clone)]
pub struct Progress
{
	pub state: UpdateState,
	pub message: String,
	pub progress: Option<f64>,
	pub can_cancel: bool,
	pub can_proceed: bool,
}

impl Progress
{
	fn new(state: UpdateState, message: impl Into<String>) -> Self
	{
		Self {
			state,
			message: message.into(),
			progress: None,
			can_cancel: false,
			can_proceed: false,
		}
	}
}


/// The cancel/proceed handshake. Guarded by the accompanying `Condvar`
/// in [`Controller`], separate from `Progress` since the worker only
/// ever *reads* these, while the UI only ever *writes* them.
#[derive(Default)]
struct Flags
{
	cancelled: bool,
	proceeded: bool,
}


pub struct Controller
{
	progress: Arc<Mutex<Progress>>,
	flags: Arc<(Mutex<Flags>, Condvar)>,
	worker: Option<JoinHandle<()>>,
}

impl Controller
{
	/// Construct and immediately start the background worker at
	/// `CHECKING`.
	pub fn new(manifest_url: impl Into<String>, base_dir: impl Into<PathBuf>, force: bool,
			jobs: u32) -> Result<Self, UpdateError>
	{
		let base_dir = base_dir.into();
		if base_dir.join(SOURCE_CHECKOUT_GUARD).exists()
		{
			return Err(UpdateError::RefusedSourceCheckout);
		}

		let config = Config {
			manifest_url: manifest_url.into(),
			base_dir,
			work_dir: None,
			force,
			jobs,
		};

		let progress = Arc::new(Mutex::new(Progress::new(UpdateState::Checking, "Checking for updates...")));
		let flags = Arc::new((Mutex::new(Flags::default()), Condvar::new()));

		let worker = {
			let progress = Arc::clone(&progress);
			let flags = Arc::clone(&flags);
			std::thread::spawn(move || run_worker(config, progress, flags))
		};

		Ok(Self { progress, flags, worker: Some(worker) })
	}


	/// A cheap clone of the current observable state.
	pub fn snapshot(&self) -> Progress
	{
		self.progress.lock().expect("progress mutex poisoned").clone()
	}


	/// Advance from `UPDATE_AVAILABLE`, or acknowledge a terminal state.
	pub fn proceed(&self)
	{
		let (lock, cvar) = &*self.flags;
		let mut flags = lock.lock().expect("flags mutex poisoned");
		flags.proceeded = true;
		cvar.notify_all();
	}


	/// Request cancellation, if the current stage allows it.
	pub fn cancel(&self)
	{
		if !self.snapshot().can_cancel { return; }

		let (lock, cvar) = &*self.flags;
		let mut flags = lock.lock().expect("flags mutex poisoned");
		flags.cancelled = true;
		cvar.notify_all();
	}
}

impl Drop for Controller
{
	fn drop(&mut self)
	{
		if let Some(h) = self.worker.take() { let _ = h.join(); }
	}
}


fn publish(progress: &Mutex<Progress>, p: Progress)
{
	*progress.lock().expect("progress mutex poisoned") = p;
}


/// The worker thread body: runs the whole state machine to a terminal
/// state, then returns (the thread exits; `Controller::drop` joins it).
fn run_worker(config: Config, progress: Arc<Mutex<Progress>>, flags: Arc<(Mutex<Flags>, Condvar)>)
{
	if let Err(e) = try_run(&config, &progress, &flags)
	{
		let state = if e.is_cancel() { UpdateState::Cancelled } else { UpdateState::Error };
		let mut p = Progress::new(state, e.to_string());
		p.can_proceed = true;
		publish(&progress, p);
	}
}


fn try_run(config: &Config, progress: &Arc<Mutex<Progress>>, flags: &Arc<(Mutex<Flags>, Condvar)>)
		-> Result<(), UpdateError>
{
	let updatedir = config.update_dir();
	let rt = RtDirs::init(&updatedir)?;
	let resolver = PathResolver::new(&config.base_dir);

	// CHECKING
	let old_state = state::load(&updatedir)?;
	test_write(&rt)?;
	let mut log = open_log(&rt)?;
	let server_manifest = manifest::fetch(&config.manifest_url, &updatedir)?;
	let modules_to_update = stale_set(&old_state, &server_manifest, config.force);

	run_pipeline(config, &updatedir, &rt, &resolver, progress, flags, &mut log,
			old_state, server_manifest, modules_to_update)
}


fn run_pipeline(
	config: &Config,
	updatedir: &Path,
	rt: &RtDirs,
	resolver: &PathResolver,
	progress: &Arc<Mutex<Progress>>,
	flags: &Arc<(Mutex<Flags>, Condvar)>,
	log: &mut std::fs::File,
	old_state: ModuleMap,
	server_manifest: ModuleMap,
	modules_to_update: Vec<String>,
) -> Result<(), UpdateError>
{
	if modules_to_update.is_empty()
	{
		let mut p = Progress::new(UpdateState::UpdateNotAvailable, "No updates available.");
		p.can_proceed = true;
		publish(progress, p);
		return Ok(());
	}

	// UPDATE_AVAILABLE: suspend until the UI proceeds or cancels.
	{
		let msg = format!("Update available: {} module{}",
				modules_to_update.len(), crate::util::plural(modules_to_update.len()));
		let mut p = Progress::new(UpdateState::UpdateAvailable, msg);
		p.can_proceed = true;
		p.can_cancel = true;
		publish(progress, p);
	}

	let (lock, cvar) = &**flags;
	{
		let mut f = lock.lock().expect("flags mutex poisoned");
		while !f.proceeded && !f.cancelled
		{
			f = cvar.wait(f).expect("flags mutex poisoned");
		}
		if f.cancelled
		{
			return Err(UpdateError::Cancelled);
		}
	}

	let cancel_check = || -> Result<(), UpdateError> {
		let f = lock.lock().expect("flags mutex poisoned");
		if f.cancelled { Err(UpdateError::Cancelled) } else { Ok(()) }
	};

	// PREPARING
	{
		let mut p = Progress::new(UpdateState::Preparing, "Preparing update archives...");
		p.can_cancel = true;
		publish(progress, p);
	}

	let snapshot_json = serde_json::to_vec(&old_state)?;
	let mut seeds = Vec::new();
	let total_mods = modules_to_update.len();

	for (i, module) in modules_to_update.iter().enumerate()
	{
		let entry = old_state.get(module).cloned().unwrap_or_default();
		let dest = rt.module_archive(module);

		core::build_seed(module, &entry, resolver, &snapshot_json, &dest, config.jobs,
				|frac| {
					let overall = (i as f64 + frac) / total_mods as f64;
					let mut p = Progress::new(UpdateState::Preparing,
							format!("Preparing {module}..."));
					p.can_cancel = true;
					p.progress = Some(overall);
					publish(progress, p);
				},
				cancel_check)?;

		seeds.push(dest);
	}

	// DOWNLOADING
	let mut new_state = old_state.clone();

	for (i, module) in modules_to_update.iter().enumerate()
	{
		let entry = server_manifest.get(module).ok_or_else(||
				UpdateError::ManifestUnavailable(format!("module '{module}' vanished from manifest")))?;
		let expect_hash = entry.digest.clone().unwrap_or_default();
		let target_url = resolve_url(&config.manifest_url, entry.url.as_deref().unwrap_or_default());

		let zsync_path = rt.module_zsync(module);
		let output = rt.module_download(module);

		core::download_module(Path::new(DEFAULT_TOOL), &zsync_path, &seeds, &target_url, &output,
				&expect_hash,
				|frac| {
					let overall = (i as f64 + frac) / total_mods as f64;
					let mut p = Progress::new(UpdateState::Downloading,
							format!("Downloading {module}..."));
					p.can_cancel = true;
					p.progress = Some(overall);
					publish(progress, p);
				},
				cancel_check,
				|line| { let _ = writeln!(log, "{line}"); })?;
	}

	// UNPACKING: cancellation is no longer honored once entries start
	// landing as `.new` sidecars (`Progress::new` defaults `can_cancel`
	// to `false`).
	publish(progress, Progress::new(UpdateState::Unpacking, "Unpacking update..."));

	let mut all_pending_moves = Vec::new();

	for (i, module) in modules_to_update.iter().enumerate()
	{
		let archive = rt.module_download(module);

		let unpacked = core::unpack_module(module, &archive, resolver,
				|frac| {
					let overall = (i as f64 + frac) / total_mods as f64;
					let p = Progress { progress: Some(overall), ..Progress::new(UpdateState::Unpacking, format!("Unpacking {module}...")) };
					publish(progress, p);
				},
				|| Ok(()))?;

		if let Some(entry) = unpacked.new_entry
		{
			new_state.insert(module.clone(), entry);
		}
		all_pending_moves.extend(unpacked.pending_moves);
	}

	// FINISHING
	{
		let p = Progress::new(UpdateState::Finishing, "Finishing update...");
		publish(progress, p);
	}

	core::move_files(&all_pending_moves)?;
	core::delete_obsolete(&old_state, &new_state, resolver);
	state::save(updatedir, &new_state)?;

	for module in &modules_to_update
	{
		core::clean_transient(rt, module);
	}
	for module in &modules_to_update
	{
		core::clean_archives(rt, module);
	}

	let mut p = Progress::new(UpdateState::Done, "Update complete.");
	p.can_proceed = true;
	publish(progress, p);

	Ok(())
}


/// Probe that the update directory is actually writable, the way the
/// Python original's `test_write` does: write a small file, then remove
/// it. A failure here means the account running the updater doesn't
/// have permission to install anything, which is a clearer diagnosis
/// than letting the first write of the pipeline proper fail with a
/// generic I/O error.
fn test_write(rt: &RtDirs) -> Result<(), UpdateError>
{
	let probe = rt.dir().join("test.txt");
	std::fs::write(&probe, b"Hello, World.")
			.map_err(|_| UpdateError::PermissionDenied(rt.dir().display().to_string()))?;
	let _ = std::fs::remove_file(&probe);
	Ok(())
}


/// Opening the session log is itself part of the write-probe: the
/// original raises the same permission error if the log can't be
/// opened, not just if the scratch-file write fails.
fn open_log(rt: &RtDirs) -> Result<std::fs::File, UpdateError>
{
	use std::fs::OpenOptions;
	OpenOptions::new().create(true).append(true).open(rt.log_path())
			.map_err(|_| UpdateError::PermissionDenied(rt.log_path().display().to_string()))
}


/// Join a manifest-relative module URL against the manifest's own URL.
fn resolve_url(manifest_url: &str, rel: &str) -> String
{
	match url::Url::parse(manifest_url).and_then(|base| base.join(rel))
	{
		Ok(u) => u.into(),
		Err(_) => rel.to_string(),
	}
}


/// Modules present in both the installed snapshot and the server
/// manifest whose versions differ, or (with `force`) every module
/// present in both regardless of version.
fn stale_set(installed: &ModuleMap, server: &ModuleMap, force: bool) -> Vec<String>
{
	let mut stale: Vec<String> = installed.iter()
		.filter_map(|(name, local)| {
			let remote = server.get(name)?;
			if force || local.version != remote.version { Some(name.clone()) } else { None }
		})
		.collect();
	stale.sort();
	stale
}



#[cfg(test)]
mod tests
{
	use super::*;
	use crate::manifest::ModuleEntry;

	fn entry(version: &str) -> ModuleEntry
	{
		ModuleEntry { version: version.into(), files: vec![], directories: vec![], xbit: vec![],
				digest: None, url: None }
	}

	#[test]
	fn stale_set_picks_version_mismatches_only()
	{
		let mut installed = ModuleMap::new();
		installed.insert("a".into(), entry("1"));
		installed.insert("b".into(), entry("1"));

		let mut server = ModuleMap::new();
		server.insert("a".into(), entry("2"));
		server.insert("b".into(), entry("1"));

		let stale = stale_set(&installed, &server, false);
		assert_eq!(stale, vec!["a".to_string()]);
	}

	#[test]
	fn force_includes_every_shared_module()
	{
		let mut installed = ModuleMap::new();
		installed.insert("a".into(), entry("1"));

		let mut server = ModuleMap::new();
		server.insert("a".into(), entry("1"));

		let stale = stale_set(&installed, &server, true);
		assert_eq!(stale, vec!["a".to_string()]);
	}

	#[test]
	fn modules_only_on_one_side_are_never_stale()
	{
		let mut installed = ModuleMap::new();
		installed.insert("a".into(), entry("1"));

		let mut server = ModuleMap::new();
		server.insert("b".into(), entry("1"));

		assert!(stale_set(&installed, &server, false).is_empty());
		assert!(stale_set(&installed, &server, true).is_empty());
	}

	#[test]
	fn write_probe_leaves_no_trace_on_success()
	{
		let dir = tempfile::tempdir().unwrap();
		let rt = RtDirs::init(dir.path()).unwrap();

		test_write(&rt).unwrap();
		assert!(!dir.path().join("test.txt").exists());
	}

	#[test]
	fn refuses_source_checkout()
	{
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("run.sh"), b"#!/bin/sh\n").unwrap();

		let err = Controller::new("http://example.invalid/updates.json", dir.path(), false, 1)
				.unwrap_err();
		assert!(matches!(err, UpdateError::RefusedSourceCheckout));
	}
}
