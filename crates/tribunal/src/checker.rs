//! Token-level output comparison with float tolerance.
//!
//! Both files are streamed line by line. Lines are split on whitespace runs;
//! token counts must match, and tokens compare either as floats within an
//! epsilon or byte-for-byte. Structural mismatches (one file ending early, a
//! differing token count) are presentation errors; value mismatches are wrong
//! answers.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::Error;
use crate::model::{TestError, Verdict};

/// Absolute tolerance used when both tokens parse as floating point.
pub const DEFAULT_EPSILON: f64 = 1e-6;

/// Compare a reference output against an actual output file.
///
/// Returns `Ok(())` when the outputs match, `TestError::Verdict` for a
/// presentation error or wrong answer, and `TestError::Internal` when either
/// file cannot be read.
pub fn compare_files(
    expected: &Path,
    actual: &Path,
    epsilon: f64,
) -> Result<(), TestError> {
    let expected_file = File::open(expected)
        .map_err(|e| Error::wrap("checker.compare", "cannot open expected file", e))?;
    let actual_file = File::open(actual)
        .map_err(|e| Error::wrap("checker.compare", "cannot open actual file", e))?;

    compare_readers(BufReader::new(expected_file), BufReader::new(actual_file), epsilon)
}

/// Compare two line streams; see [`compare_files`].
pub fn compare_readers<E: BufRead, A: BufRead>(
    expected: E,
    actual: A,
    epsilon: f64,
) -> Result<(), TestError> {
    let mut expected_lines = expected.lines();
    let mut actual_lines = actual.lines();
    let mut line_number = 0usize;

    loop {
        let expected_line = expected_lines
            .next()
            .transpose()
            .map_err(|e| Error::wrap("checker.compare", "error reading expected file", e))?;
        let actual_line = actual_lines
            .next()
            .transpose()
            .map_err(|e| Error::wrap("checker.compare", "error reading actual file", e))?;
        line_number += 1;

        let (expected_line, actual_line) = match (expected_line, actual_line) {
            (None, None) => return Ok(()),
            (Some(e), Some(a)) => (e, a),
            _ => {
                return Err(Verdict::PresentationError {
                    message: format!(
                        "different number of lines: file ended at line {line_number}"
                    ),
                }
                .into());
            }
        };

        let expected_tokens: Vec<&str> = expected_line.split_whitespace().collect();
        let actual_tokens: Vec<&str> = actual_line.split_whitespace().collect();

        if expected_tokens.len() != actual_tokens.len() {
            return Err(Verdict::PresentationError {
                message: format!(
                    "different number of tokens in line {line_number}: expected {}, got {}",
                    expected_tokens.len(),
                    actual_tokens.len()
                ),
            }
            .into());
        }

        for (position, (exp, act)) in expected_tokens.iter().zip(&actual_tokens).enumerate() {
            if !tokens_match(exp, act, epsilon) {
                return Err(Verdict::WrongAnswer {
                    message: format!(
                        "different values in line {line_number}, position {}: expected {exp}, got {act}",
                        position + 1
                    ),
                }
                .into());
            }
        }
    }
}

fn tokens_match(expected: &str, actual: &str, epsilon: f64) -> bool {
    match (expected.parse::<f64>(), actual.parse::<f64>()) {
        (Ok(a), Ok(b)) => (a - b).abs() <= epsilon,
        _ => expected == actual,
    }
}
