//! Maps renderer log lines to coarse progress.
//!
//! The renderer prints free text, not structured progress. Known phase markers
//! are mapped to a progress floor; the supervisor only ever raises progress to a
//! floor, so markers printed out of order or repeated cannot move it backwards.

/// Phase markers and the floor each one implies.
const PHASES: &[(&str, f32)] = &[
    ("Loading", 40.0),
    ("Generating", 60.0),
    ("Stage 1", 60.0),
    ("Stage 2", 80.0),
    ("Upscaling", 80.0),
];

/// Progress reported as soon as the supervisor starts preparing a job.
pub const ACCEPTED: f32 = 10.0;

/// Progress floor signalled by `line`, if it marks a known phase.
///
/// When a line carries more than one marker, the highest floor wins.
pub fn milestone(line: &str) -> Option<f32> {
    PHASES
        .iter()
        .filter(|(marker, _)| line.contains(marker))
        .map(|(_, floor)| *floor)
        .reduce(f32::max)
}

/// Raise `current` to the floor in `line`. Returns the new value only when it
/// actually moved.
pub fn advance(current: f32, line: &str) -> Option<f32> {
    milestone(line).filter(|floor| *floor > current)
}
