// SPDX-License-Identifier: MIT OR Apache-2.0
//! Multi-pass OCR: preprocessing, `tesseract` invocation, and text quality
//! scoring.
//!
//! [`run_multi_pass`] drives the escalation ladder a single scanned page
//! goes through: a standard pass at a handful of page-segmentation modes,
//! an advanced-preprocessing retry if that pass reads as low confidence,
//! a high-contrast retry if it's still weak, and finally a combination
//! step that stitches unique lines out of weaker attempts into the best
//! one when nothing cleared a comfortable bar.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod preprocess;
mod quality;
mod tesseract;

pub use preprocess::{PreprocessError, Preprocessing};
pub use quality::{is_meaningful_line, score_text_quality};

use iv_error::IvResult;
use iv_proc::ProcRunner;
use std::time::Duration;
use tracing::{debug, info};

/// One OCR attempt: the preprocessing used, the page-segmentation mode, the
/// recognized text, and the confidence `tesseract` itself reported for it
/// (mean word confidence, `0.0..=1.0`).
#[derive(Debug, Clone)]
pub struct OcrAttempt {
    /// Preprocessing variant this attempt ran against.
    pub preprocessing: Preprocessing,
    /// `tesseract --psm` value used for this attempt.
    pub psm: u8,
    /// Recognized text.
    pub text: String,
    /// Mean word confidence tesseract reported, `0.0..=1.0`.
    pub confidence: f64,
}

/// Final result of [`run_multi_pass`]: the winning (or combined) text, its
/// confidence, and every attempt made along the way for diagnostics/tracing.
#[derive(Debug, Clone)]
pub struct OcrResult {
    /// Final recognized text, possibly a combination of several attempts.
    pub text: String,
    /// Confidence associated with `text`, `0.0..=1.0`.
    pub confidence: f64,
    /// `true` if `text` is a stitched combination of more than one attempt.
    pub combined: bool,
    /// Every attempt made, in order, for tracing.
    pub attempts: Vec<OcrAttempt>,
}

const STANDARD_PSMS: &[u8] = &[6, 3, 4];
const ADVANCED_PSMS: &[u8] = &[6, 3];
const HIGH_CONTRAST_PSM: u8 = 11;
const ADVANCED_RETRY_THRESHOLD: f64 = 0.6;
const HIGH_CONTRAST_RETRY_THRESHOLD: f64 = 0.5;
const COMBINE_THRESHOLD: f64 = 0.65;
const DEFAULT_PASS_TIMEOUT: Duration = Duration::from_secs(30);

/// Run the full multi-pass OCR ladder against one page image (already
/// decoded, e.g. a rasterized PDF page or a photographed receipt).
///
/// Stages:
/// 1. Standard preprocessing, PSM `{6, 3, 4}`.
/// 2. If the best confidence from stage 1 is `< 0.6`: advanced
///    preprocessing, PSM `{6, 3}`.
/// 3. If still `< 0.5`: high-contrast preprocessing, PSM `11`.
/// 4. If still `< 0.65` and at least two attempts were made: combine —
///    append lines from weaker attempts not already present in the best
///    attempt's text.
pub async fn run_multi_pass(runner: &ProcRunner, image_bytes: &[u8]) -> IvResult<OcrResult> {
    let mut attempts = Vec::new();

    let standard = preprocess::apply(image_bytes, Preprocessing::Standard)?;
    for &psm in STANDARD_PSMS {
        attempts.push(run_pass(runner, &standard, Preprocessing::Standard, psm).await?);
    }

    let mut best = best_attempt(&attempts).expect("at least one standard pass ran");
    debug!(confidence = best.confidence, psm = best.psm, "standard OCR pass complete");

    if best.confidence < ADVANCED_RETRY_THRESHOLD {
        let advanced = preprocess::apply(image_bytes, Preprocessing::Advanced)?;
        for &psm in ADVANCED_PSMS {
            attempts.push(run_pass(runner, &advanced, Preprocessing::Advanced, psm).await?);
        }
        best = best_attempt(&attempts).expect("attempts is non-empty");
    }

    if best.confidence < HIGH_CONTRAST_RETRY_THRESHOLD {
        let high_contrast = preprocess::apply(image_bytes, Preprocessing::HighContrast)?;
        attempts.push(
            run_pass(runner, &high_contrast, Preprocessing::HighContrast, HIGH_CONTRAST_PSM)
                .await?,
        );
        best = best_attempt(&attempts).expect("attempts is non-empty");
    }

    if best.confidence < COMBINE_THRESHOLD && attempts.len() >= 2 {
        let combined_text = combine(&attempts, &best);
        info!(
            attempts = attempts.len(),
            best_confidence = best.confidence,
            "OCR confidence below combine threshold, stitching attempts"
        );
        return Ok(OcrResult {
            text: combined_text,
            confidence: best.confidence,
            combined: true,
            attempts,
        });
    }

    Ok(OcrResult {
        text: best.text.clone(),
        confidence: best.confidence,
        combined: false,
        attempts,
    })
}

fn best_attempt(attempts: &[OcrAttempt]) -> Option<OcrAttempt> {
    attempts
        .iter()
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        .cloned()
}

/// Append unique meaningful lines from weaker attempts onto the winning
/// attempt's text: normalized lower-cased trimmed, longer than 5
/// characters, and carrying a currency or invoice-keyword signal — a plain
/// short fragment ("OK", "---") isn't worth stitching in.
fn combine(attempts: &[OcrAttempt], best: &OcrAttempt) -> String {
    let mut text = best.text.clone();
    let mut existing: std::collections::HashSet<String> =
        best.text.lines().map(|l| l.trim().to_lowercase()).collect();

    for attempt in attempts {
        if attempt.preprocessing == best.preprocessing && attempt.psm == best.psm {
            continue;
        }
        for line in attempt.text.lines() {
            let trimmed = line.trim();
            let normalized = trimmed.to_lowercase();
            if !existing.contains(&normalized) && quality::is_meaningful_line(trimmed) {
                text.push('\n');
                text.push_str(trimmed);
                existing.insert(normalized);
            }
        }
    }
    text
}

async fn run_pass(
    runner: &ProcRunner,
    png: &[u8],
    preprocessing: Preprocessing,
    psm: u8,
) -> IvResult<OcrAttempt> {
    let psm_str = psm.to_string();
    let (_, tsv) = runner
        .run_with_file_io(
            "tesseract",
            &["input.png", "output", "--psm", &psm_str, "tsv"],
            png,
            "input.png",
            "output.tsv",
            Some(DEFAULT_PASS_TIMEOUT),
        )
        .await?;

    let (text, confidence) = tesseract::parse_tsv(&tsv);
    Ok(OcrAttempt {
        preprocessing,
        psm,
        text,
        confidence,
    })
}
