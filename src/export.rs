//! Reconstructs the visible text of a document without one read per line.
//!
//! Visible lines that are contiguous in the original file form runs, and each
//! run is one byte range. Runs separated by less than the merge gap are then
//! fetched with a single physical read and copied out piecewise into the
//! output buffer at precomputed offsets.

use crate::index::LineOffsetIndex;
use crate::projection::FilteredProjection;
use crate::source::{trim_terminator, FileBackedSource, LineSource, StreamBackedSource};
use std::ops::Range;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubCopy {
    /// Original lines covered by this copy.
    pub lines: Range<usize>,
    pub src_offset: usize,
    pub dst_offset: usize,
    pub len: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalRead {
    pub range: Range<u64>,
    pub copies: Vec<SubCopy>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadPlan {
    pub reads: Vec<PhysicalRead>,
    pub total_len: usize,
}

/// Maximal runs of consecutive original line numbers, as half-open ranges.
pub fn contiguous_runs(projection: &FilteredProjection) -> Vec<Range<usize>> {
    let mut runs: Vec<Range<usize>> = Vec::new();
    for &original in projection.as_slice() {
        match runs.last_mut() {
            Some(run) if run.end == original => run.end += 1,
            _ => runs.push(original..original + 1),
        }
    }
    runs
}

pub fn plan(index: &LineOffsetIndex, projection: &FilteredProjection, merge_gap: u64) -> ReadPlan {
    let mut plan = ReadPlan::default();
    for run in contiguous_runs(projection) {
        let (Some(start), Some(end)) = (index.boundary(run.start), index.boundary(run.end)) else {
            continue;
        };
        let len = (end - start) as usize;
        let dst_offset = plan.total_len;
        plan.total_len += len;

        if let Some(read) = plan.reads.last_mut() {
            if start.saturating_sub(read.range.end) < merge_gap {
                read.copies.push(SubCopy {
                    lines: run,
                    src_offset: (start - read.range.start) as usize,
                    dst_offset,
                    len,
                });
                read.range.end = end;
                continue;
            }
        }
        plan.reads.push(PhysicalRead {
            range: start..end,
            copies: vec![SubCopy {
                lines: run,
                src_offset: 0,
                dst_offset,
                len,
            }],
        });
    }
    plan
}

/// Visible lines of a file, newline-joined, with their exact bytes.
pub fn export_file(
    source: &mut FileBackedSource,
    projection: &FilteredProjection,
    merge_gap: u64,
    error_marker: &str,
) -> Vec<u8> {
    let plan = plan(source.index(), projection, merge_gap);
    let last_line = source.index().line_count().saturating_sub(1);
    debug!(
        reads = plan.reads.len(),
        bytes = plan.total_len,
        "executing export plan"
    );

    let mut out = vec![0u8; plan.total_len];
    let mut failed: Vec<&SubCopy> = Vec::new();
    for read in &plan.reads {
        match source.read_bytes(read.range.clone()) {
            Ok(bytes) => {
                for copy in &read.copies {
                    out[copy.dst_offset..copy.dst_offset + copy.len]
                        .copy_from_slice(&bytes[copy.src_offset..copy.src_offset + copy.len]);
                }
            }
            Err(e) => {
                warn!(range = ?read.range, error = %e, "export read failed");
                failed.extend(&read.copies);
            }
        }
    }

    if !failed.is_empty() {
        out = splice_markers(out, &plan, &failed, error_marker, last_line);
    }

    if projection.as_slice().last().is_some_and(|&l| l != last_line) {
        let keep = trim_terminator(&out).len();
        out.truncate(keep);
    }
    out
}

/// Rebuilds the output with a marker line for every line of a failed copy.
fn splice_markers(
    out: Vec<u8>,
    plan: &ReadPlan,
    failed: &[&SubCopy],
    error_marker: &str,
    last_line: usize,
) -> Vec<u8> {
    let mut spliced = Vec::with_capacity(out.len());
    for copy in plan.reads.iter().flat_map(|r| &r.copies) {
        if failed.contains(&copy) {
            for line in copy.lines.clone() {
                spliced.extend_from_slice(error_marker.as_bytes());
                if line != last_line {
                    spliced.push(b'\n');
                }
            }
        } else {
            spliced.extend_from_slice(&out[copy.dst_offset..copy.dst_offset + copy.len]);
        }
    }
    spliced
}

pub fn export_stream(source: &StreamBackedSource, projection: &FilteredProjection) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, &original) in projection.as_slice().iter().enumerate() {
        if i > 0 {
            out.push(b'\n');
        }
        if let Some(text) = source.line(original) {
            out.extend_from_slice(text.as_bytes());
        }
    }
    out
}
