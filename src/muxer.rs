//! Concrete realization of the §6.2 muxer contract on top of WAV/PCM, since
//! this crate ships a runnable, testable engine rather than assuming an
//! external platform codec. A production build can swap this module for a
//! platform muxer without touching any other component — every caller only
//! depends on the three functions below.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use hound::{WavReader, WavSpec, WavWriter};

use crate::error::{EngineError, EngineResult};

/// Microseconds per sample at a given sample rate.
fn us_per_sample(sample_rate: u32) -> f64 {
    1_000_000.0 / sample_rate as f64
}

/// Best-effort duration probe (§6.2 `duration_us`). Reads only the WAV
/// header plus the `data` chunk length — O(1), no sample decoding.
pub fn duration_us(path: &Path) -> EngineResult<u64> {
    let reader = WavReader::open(path)
        .map_err(|e| EngineError::SegmentInvalid {
            path: path.to_path_buf(),
            reason: format!("could not open as WAV: {e}"),
        })?;
    let spec = reader.spec();
    let frames = reader.duration() as u64;
    if spec.sample_rate == 0 {
        return Err(EngineError::SegmentInvalid {
            path: path.to_path_buf(),
            reason: "zero sample rate".into(),
        });
    }
    Ok((frames as f64 * us_per_sample(spec.sample_rate)) as u64)
}

fn open_reader(path: &Path) -> EngineResult<WavReader<BufReader<File>>> {
    WavReader::open(path).map_err(|e| EngineError::SegmentInvalid {
        path: path.to_path_buf(),
        reason: format!("could not open as WAV: {e}"),
    })
}

fn specs_compatible(a: WavSpec, b: WavSpec) -> bool {
    a.sample_rate == b.sample_rate
        && a.channels == b.channels
        && a.bits_per_sample == b.bits_per_sample
        && a.sample_format == b.sample_format
}

/// Concatenates the PCM samples of `paths` (in order) into a single WAV at
/// `out_path`. Returns the resulting duration in microseconds.
///
/// WAV carries no internal per-frame timestamps, so "rebasing presentation
/// timestamps" degenerates to appending samples in sequence — the file's
/// fixed sample rate implies monotonically increasing presentation time for
/// every sample written (§8 P3).
pub fn merge_segments(paths: &[&Path], out_path: &Path) -> EngineResult<u64> {
    if paths.is_empty() {
        return Err(EngineError::MergeFailure("no segments to merge".into()));
    }

    let first = open_reader(paths[0])?;
    let spec = first.spec();
    drop(first);

    let mut writer = WavWriter::create(out_path, spec)
        .map_err(|e| EngineError::MergeFailure(format!("could not create {out_path:?}: {e}")))?;

    let mut total_frames: u64 = 0;
    for path in paths {
        total_frames += append_samples(&mut writer, path, spec)?;
    }

    writer
        .finalize()
        .map_err(|e| EngineError::MergeFailure(format!("finalize failed: {e}")))?;

    Ok((total_frames as f64 * us_per_sample(spec.sample_rate)) as u64)
}

/// Appends one segment's samples onto an already-open writer, used by both
/// `merge_segments` (rebuild) and the background merger's append strategy.
pub fn append_samples(
    writer: &mut WavWriter<std::io::BufWriter<File>>,
    path: &Path,
    expected_spec: WavSpec,
) -> EngineResult<u64> {
    let mut reader = open_reader(path)?;
    if !specs_compatible(reader.spec(), expected_spec) {
        return Err(EngineError::MergeFailure(format!(
            "segment {path:?} format does not match the merge target"
        )));
    }
    let frames = reader.duration() as u64;

    match expected_spec.sample_format {
        hound::SampleFormat::Int => {
            for sample in reader.samples::<i32>() {
                let sample = sample.map_err(|e| {
                    EngineError::MergeFailure(format!("read sample from {path:?}: {e}"))
                })?;
                writer
                    .write_sample(sample)
                    .map_err(|e| EngineError::MergeFailure(format!("write sample: {e}")))?;
            }
        }
        hound::SampleFormat::Float => {
            for sample in reader.samples::<f32>() {
                let sample = sample.map_err(|e| {
                    EngineError::MergeFailure(format!("read sample from {path:?}: {e}"))
                })?;
                writer
                    .write_sample(sample)
                    .map_err(|e| EngineError::MergeFailure(format!("write sample: {e}")))?;
            }
        }
    }
    Ok(frames)
}

/// Appends `new_paths`' samples onto a copy of the already-published
/// `existing_path` artifact instead of re-decoding everything that was
/// already merged (§4.5 append strategy). Returns the resulting duration in
/// microseconds.
pub fn append_segments(
    existing_path: &Path,
    new_paths: &[&Path],
    work_path: &Path,
) -> EngineResult<u64> {
    std::fs::copy(existing_path, work_path).map_err(|e| EngineError::io(work_path, e))?;

    let mut writer = WavWriter::append(work_path).map_err(|e| {
        EngineError::MergeFailure(format!("could not reopen {work_path:?} for append: {e}"))
    })?;
    let spec = writer.spec();

    for path in new_paths {
        append_samples(&mut writer, path, spec)?;
    }

    writer
        .finalize()
        .map_err(|e| EngineError::MergeFailure(format!("finalize failed: {e}")))?;

    duration_us(work_path)
}

/// Copies the sample range `[start_s, end_s)` of `in_path` into a fresh WAV
/// at `out_path`, rebasing to start at time zero (§4.6/§6.2 `fast_trim`).
/// For PCM every sample is a valid cut point, so there is no sync-sample
/// search — we just compute sample indices directly from the sample rate.
pub fn fast_trim(in_path: &Path, out_path: &Path, start_s: f64, end_s: f64) -> EngineResult<()> {
    let mut reader = open_reader(in_path)?;
    let spec = reader.spec();
    let total_frames = reader.duration() as u64;
    let start_frame = ((start_s.max(0.0)) * spec.sample_rate as f64) as u64;
    let end_frame = ((end_s.max(0.0)) * spec.sample_rate as f64)
        .min(total_frames as f64) as u64;
    if start_frame >= end_frame {
        return Err(EngineError::MergeFailure(format!(
            "fast_trim requested empty or inverted range [{start_s}, {end_s})"
        )));
    }

    let channels = spec.channels as u64;
    let start_sample_index = start_frame * channels;
    let end_sample_index = end_frame * channels;

    let mut writer = WavWriter::create(out_path, spec)
        .map_err(|e| EngineError::MergeFailure(format!("could not create {out_path:?}: {e}")))?;

    match spec.sample_format {
        hound::SampleFormat::Int => {
            for (i, sample) in reader.samples::<i32>().enumerate() {
                let i = i as u64;
                if i < start_sample_index {
                    continue;
                }
                if i >= end_sample_index {
                    break;
                }
                let sample = sample
                    .map_err(|e| EngineError::MergeFailure(format!("read sample: {e}")))?;
                writer
                    .write_sample(sample)
                    .map_err(|e| EngineError::MergeFailure(format!("write sample: {e}")))?;
            }
        }
        hound::SampleFormat::Float => {
            for (i, sample) in reader.samples::<f32>().enumerate() {
                let i = i as u64;
                if i < start_sample_index {
                    continue;
                }
                if i >= end_sample_index {
                    break;
                }
                let sample = sample
                    .map_err(|e| EngineError::MergeFailure(format!("read sample: {e}")))?;
                writer
                    .write_sample(sample)
                    .map_err(|e| EngineError::MergeFailure(format!("write sample: {e}")))?;
            }
        }
    }

    writer
        .finalize()
        .map_err(|e| EngineError::MergeFailure(format!("finalize failed: {e}")))?;
    Ok(())
}

/// Writes a zero-length but valid WAV container (§4.6 empty fallback).
pub fn write_empty(path: &Path, spec: WavSpec) -> EngineResult<()> {
    let writer = WavWriter::create(path, spec)
        .map_err(|e| EngineError::MergeFailure(format!("could not create {path:?}: {e}")))?;
    writer
        .finalize()
        .map_err(|e| EngineError::MergeFailure(format!("finalize failed: {e}")))
}
