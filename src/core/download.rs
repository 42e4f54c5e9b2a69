//! Runs the external delta tool against one module's zsync control file,
//! merging its stdout/stderr progress protocol and verifying the result
//! (§4.6).
//!
//! The two-reader-threads-into-one-channel shape is the same one the
//! teacher's `core/pool.rs` uses to fan results back to a single
//! consumer; here it's repurposed to merge two streams instead of
//! collecting a worker pool's output.

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::UpdateError;
use crate::util::hash::check_sha256_file;


/// A line of output from either of the child's streams.
enum Line
{
	Progress(f64),
	EndProgress,
	Other(String),
	Eof,
}


/// Normalizes the delta tool's raw `PROGRESS <pct>` stream into a
/// monotonic 0.0..=1.0 range.
///
/// The tool reports `100` once just to mark "seed applied, starting
/// network fetch", then resumes from some lower raw percentage; naively
/// forwarding the raw values would make the bar jump to 100% and then
/// back down.  Instead, the first non-100 raw value seen after a
/// `(re)start` is taken as a baseline and subsequent values are rescaled
/// so 100 (raw) always lands on 1.0.  `ENDPROGRESS` clears the baseline,
/// so a following `PROGRESS` block establishes its own.
#[derive(Default)]
struct ProgressNormalizer
{
	start: Option<f64>,
}

impl ProgressNormalizer
{
	fn normalize(&mut self, raw: f64) -> f64
	{
		if raw >= 100.0
		{
			return 1.0;
		}

		let start = *self.start.get_or_insert(raw);
		if (1.0 - start).abs() < f64::EPSILON
		{
			return 1.0;
		}
		((raw - start) / (1.0 - start)).clamp(0.0, 1.0)
	}

	fn end(&mut self)
	{
		self.start = None;
	}
}


/// Run the delta tool to materialize `output` for `module`, seeded by
/// every archive in `seeds`, verifying the digest against `expect_hash`
/// (lowercase hex).
///
/// `progress` receives normalized 0.0..=1.0 values; `cancel_check` is
/// polled once per output line and, if it returns `Err`, the child is
/// killed and that error is propagated.
///
/// If `tool` can't be found on `PATH` at all, that's folded into the
/// same `DownloadFailed` outcome as "the tool ran but produced no
/// output file" — from the caller's perspective both mean "no update
/// file materialized for this module".
pub(crate) fn download_module(
	tool: &Path,
	zsync_path: &Path,
	seeds: &[std::path::PathBuf],
	target_url: &str,
	output: &Path,
	expect_hash: &str,
	mut progress: impl FnMut(f64),
	mut cancel_check: impl FnMut() -> Result<(), UpdateError>,
	mut log_line: impl FnMut(&str),
) -> Result<(), UpdateError>
{
	let mut cmd = Command::new(tool);
	cmd.arg("-o").arg(output);
	cmd.arg("-k").arg(zsync_path);
	for seed in seeds
	{
		cmd.arg("-i").arg(seed);
	}
	cmd.arg(target_url);
	cmd.stdout(Stdio::piped());
	cmd.stderr(Stdio::piped());

	let mut child = cmd.spawn().map_err(|_| {
		let module = zsync_path.file_stem()
				.map(|s| s.to_string_lossy().into_owned())
				.unwrap_or_default();
		UpdateError::DownloadFailed(module)
	})?;
	let stdout = child.stdout.take().expect("piped stdout");
	let stderr = child.stderr.take().expect("piped stderr");

	let (tx, rx) = crossbeam::channel::unbounded();

	let tx_out = tx.clone();
	let h_out = std::thread::spawn(move || pump(stdout, tx_out));
	let h_err = std::thread::spawn(move || pump(stderr, tx));

	let mut norm = ProgressNormalizer::default();
	let mut cancelled = false;

	for line in rx
	{
		if cancel_check().is_err()
		{
			cancelled = true;
			break;
		}

		match line {
			Line::Progress(raw) => progress(norm.normalize(raw)),
			Line::EndProgress    => norm.end(),
			Line::Other(l)       => log_line(&l),
			Line::Eof             => {},
		}
	}

	let _ = h_out.join();
	let _ = h_err.join();

	if cancelled
	{
		let _ = child.kill();
		let _ = child.wait();
		return Err(UpdateError::Cancelled);
	}

	let _status = child.wait()?;

	if !output.exists()
	{
		let module = zsync_path.file_stem()
				.map(|s| s.to_string_lossy().into_owned())
				.unwrap_or_default();
		return Err(UpdateError::DownloadFailed(module));
	}

	check_sha256_file(output, expect_hash)
			.map_err(|_| {
				let module = zsync_path.file_stem()
						.map(|s| s.to_string_lossy().into_owned())
						.unwrap_or_default();
				UpdateError::DigestMismatch(module)
			})?;

	Ok(())
}


fn pump<R: std::io::Read>(reader: R, tx: crossbeam::channel::Sender<Line>)
{
	let buf = BufReader::new(reader);
	for line in buf.lines()
	{
		let Ok(line) = line else { break };

		let parsed = if let Some(rest) = line.strip_prefix("PROGRESS ")
		{
			rest.trim().parse::<f64>().map(Line::Progress)
					.unwrap_or(Line::Other(line))
		}
		else if line.trim() == "ENDPROGRESS"
		{
			Line::EndProgress
		}
		else
		{
			Line::Other(line)
		};

		if tx.send(parsed).is_err() { break }
	}
	let _ = tx.send(Line::Eof);
}



#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn normalizer_maps_start_to_zero_and_raw100_to_one()
	{
		let mut n = ProgressNormalizer::default();
		assert_eq!(n.normalize(10.0), 0.0);
		assert!((n.normalize(55.0) - 0.5).abs() < 1e-9);
		assert_eq!(n.normalize(100.0), 1.0);
	}

	#[test]
	fn normalizer_resets_baseline_after_endprogress()
	{
		let mut n = ProgressNormalizer::default();
		assert_eq!(n.normalize(50.0), 0.0);
		n.end();
		assert_eq!(n.normalize(20.0), 0.0);
	}

	#[test]
	fn missing_output_is_download_failed()
	{
		let dir = tempfile::tempdir().unwrap();
		let zsync = dir.path().join("core.zsync");
		std::fs::write(&zsync, b"").unwrap();
		let output = dir.path().join("core.update.new");

		// `true` exits 0 immediately without writing anything.
		let err = download_module(Path::new("true"), &zsync, &[], "http://example.invalid/x",
				&output, "deadbeef", |_| {}, || Ok(()), |_| {}).unwrap_err();
		assert!(matches!(err, UpdateError::DownloadFailed(m) if m == "core"));
	}

	#[test]
	fn missing_tool_is_download_failed()
	{
		let dir = tempfile::tempdir().unwrap();
		let zsync = dir.path().join("core.zsync");
		std::fs::write(&zsync, b"").unwrap();
		let output = dir.path().join("core.update.new");

		// No such binary on PATH; spawn() itself fails with ENOENT.
		let err = download_module(Path::new("deltaboot-tool-that-does-not-exist"), &zsync, &[],
				"http://example.invalid/x", &output, "deadbeef", |_| {}, || Ok(()), |_| {})
				.unwrap_err();
		assert!(matches!(err, UpdateError::DownloadFailed(m) if m == "core"));
	}

	#[test]
	fn cancellation_kills_child()
	{
		let dir = tempfile::tempdir().unwrap();
		let zsync = dir.path().join("core.zsync");
		std::fs::write(&zsync, b"").unwrap();
		let output = dir.path().join("core.update.new");

		// `yes` runs forever and writes lines forever, giving the
		// cancel check a chance to fire before it would ever finish.
		let err = download_module(Path::new("yes"), &zsync, &[], "http://example.invalid/x",
				&output, "deadbeef", |_| {}, || Err(UpdateError::Cancelled), |_| {}).unwrap_err();
		assert!(err.is_cancel());
	}
}
