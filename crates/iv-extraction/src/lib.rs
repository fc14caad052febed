// SPDX-License-Identifier: MIT OR Apache-2.0
//! Invoice extraction pipeline: file-type detection, PDF-text or OCR text
//! recovery, vendor-aware parsing, UOM continuation-line repair, ROI
//! fallback for missing totals, and canonical-invoice assembly.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod file_type;
mod parse;
mod pdf;
mod roi;
mod uom;

pub use file_type::{detect as detect_file_type, FileType};
pub use parse::{parse as parse_text, ParseOutput};

use image::GenericImageView;
use iv_canonical::{build, BuildInput, BuildOutput};
use iv_core::{SourceRef, SourceType};
use iv_error::{ErrorCode, IvError, IvResult};
use iv_proc::ProcRunner;
use tracing::{info, warn};

const PARSER_NAME: &str = "iv-extraction";
const PARSER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Below this combined confidence, a "manual review recommended" warning
/// is attached to the build output rather than silently trusting the
/// result.
const MANUAL_REVIEW_THRESHOLD: f64 = 0.5;

/// Everything [`extract`] needs to turn one attachment/upload into a
/// canonical invoice.
#[derive(Debug, Clone)]
pub struct ExtractionInput {
    /// Raw file bytes, as received (email attachment or direct upload).
    pub bytes: Vec<u8>,
    /// Email attachment or direct upload.
    pub source_type: SourceType,
    /// Reference back to the original artifact.
    pub source_ref: SourceRef,
    /// Vendor already known from context (e.g. sender domain), if any —
    /// takes priority over text-based vendor detection.
    pub vendor_hint: Option<String>,
}

/// Result of running the full extraction pipeline on one document.
#[derive(Debug, Clone)]
pub struct ExtractionOutput {
    /// The assembled canonical invoice and its build-time warnings.
    pub build: BuildOutput,
    /// `0.3 * extraction_confidence + 0.7 * parsing.overall` — the
    /// pipeline's own estimate of how trustworthy this result is,
    /// independent of (and folded on top of) the canonical builder's own
    /// per-field confidence.
    pub combined_confidence: f64,
    /// Extraction- and parsing-stage warnings, plus the builder's own.
    pub warnings: Vec<String>,
}

/// Run the extraction pipeline end to end.
pub async fn extract(runner: &ProcRunner, input: ExtractionInput) -> IvResult<ExtractionOutput> {
    let kind = file_type::detect(&input.bytes);
    info!(?kind, "detected file type");

    let mut warnings = Vec::new();
    let (text, extraction_confidence, page_image) = match kind {
        FileType::Pdf => extract_pdf(runner, &input.bytes, &mut warnings).await?,
        FileType::Text => {
            let text = String::from_utf8_lossy(&input.bytes).to_string();
            let confidence = iv_ocr::score_text_quality(&text);
            (text, confidence, None)
        }
        k if k.is_image() => {
            let img = image::load_from_memory(&input.bytes).map_err(|e| {
                IvError::new(ErrorCode::InvalidInput, "failed to decode image attachment")
                    .with_context("reason", e.to_string())
            })?;
            let result = iv_ocr::run_multi_pass(runner, &input.bytes).await?;
            if result.combined {
                warnings.push("OCR result is a stitched combination of multiple passes".to_string());
            }
            (result.text, result.confidence, Some(img))
        }
        FileType::Unknown => {
            return Err(IvError::new(
                ErrorCode::InvalidInput,
                "attachment is neither a recognized image format nor plausible text",
            ))
        }
    };

    let parsed = parse::parse(&text, input.vendor_hint.as_deref());
    warnings.extend(parsed.warnings.clone());

    let mut payload = parsed.payload;
    if payload.get("totals").and_then(|t| t.get("total")).is_none() {
        if let Some(img) = &page_image {
            if let Some((amount, roi_confidence)) = roi_fallback(runner, img).await {
                payload["totals"] = serde_json::json!({ "total": amount });
                warnings.push(format!(
                    "invoice total recovered via ROI fallback at confidence {roi_confidence:.2}"
                ));
            }
        }
    }

    let combined_confidence =
        (0.3 * extraction_confidence + 0.7 * parsed.overall).clamp(0.0, 1.0);

    if combined_confidence < MANUAL_REVIEW_THRESHOLD {
        warnings.push("combined extraction confidence is low, manual review recommended".to_string());
    }

    let build_output = build(BuildInput {
        payload,
        source_type: input.source_type,
        parser_name: PARSER_NAME.to_string(),
        parser_version: PARSER_VERSION.to_string(),
        source_ref: input.source_ref,
    });
    warnings.extend(build_output.warnings.clone());

    Ok(ExtractionOutput {
        build: build_output,
        combined_confidence,
        warnings,
    })
}

/// One candidate result produced while working through the PDF extraction
/// ladder — kept around so step 4 can combine across strategies instead of
/// just returning whichever one happened to run last.
struct PdfCandidate {
    text: String,
    score: f64,
}

/// A PDF document longer than this is still rasterized and OCR'd in full
/// for the "OCR the full document" step, but capped so a malformed or
/// absurdly long scan can't blow up the pipeline's latency budget.
const MAX_FULL_DOCUMENT_PAGES: usize = 20;

/// Extract text from a PDF, trying strategies in order and accepting the
/// first one that clears [`pdf::TEXT_LAYER_QUALITY_GATE`]: the embedded
/// text layer, then OCR of the whole rasterized document, then OCR of
/// page one alone. If none clears the gate, combine unique meaningful
/// lines from the weaker attempts into the best-scoring one.
async fn extract_pdf(
    runner: &ProcRunner,
    bytes: &[u8],
    warnings: &mut Vec<String>,
) -> IvResult<(String, f64, Option<image::DynamicImage>)> {
    let mut candidates = Vec::new();
    let mut page_image: Option<image::DynamicImage> = None;

    if let Ok(text) = pdf::extract_text(bytes) {
        let score = iv_ocr::score_text_quality(&text);
        if score >= pdf::TEXT_LAYER_QUALITY_GATE && pdf::has_prices(&text) {
            return Ok((text, score, None));
        }
        warnings.push(format!(
            "PDF text layer quality {score:.2} below gate {:.2}, falling back to OCR",
            pdf::TEXT_LAYER_QUALITY_GATE
        ));
        candidates.push(PdfCandidate { text, score });
    } else {
        warnings.push("PDF has no usable text layer, falling back to OCR".to_string());
    }

    let pages = rasterize_all_pages(runner, bytes).await.unwrap_or_default();
    if !pages.is_empty() {
        let mut texts = Vec::with_capacity(pages.len());
        let mut confidences = Vec::with_capacity(pages.len());
        for page in &pages {
            let result = iv_ocr::run_multi_pass(runner, page).await?;
            texts.push(result.text);
            confidences.push(result.confidence);
        }
        let full_text = texts.join("\n");
        let full_confidence = confidences.iter().sum::<f64>() / confidences.len() as f64;
        page_image = image::load_from_memory(&pages[0]).ok();

        if full_confidence >= pdf::TEXT_LAYER_QUALITY_GATE {
            return Ok((full_text, full_confidence, page_image));
        }
        warnings.push(format!(
            "full-document OCR confidence {full_confidence:.2} below gate {:.2}, falling back to page-1 rasterization",
            pdf::TEXT_LAYER_QUALITY_GATE
        ));
        candidates.push(PdfCandidate {
            text: full_text,
            score: full_confidence,
        });
    }

    let png = rasterize_first_page(runner, bytes).await?;
    let result = iv_ocr::run_multi_pass(runner, &png).await?;
    if result.combined {
        warnings.push("OCR result is a stitched combination of multiple passes".to_string());
    }
    let img = image::load_from_memory(&png).ok().or(page_image);

    if result.confidence >= pdf::TEXT_LAYER_QUALITY_GATE {
        return Ok((result.text, result.confidence, img));
    }
    candidates.push(PdfCandidate {
        text: result.text,
        score: result.confidence,
    });

    let best_idx = candidates
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.score.total_cmp(&b.1.score))
        .map(|(i, _)| i)
        .expect("page-1 OCR always pushes at least one candidate");

    if candidates.len() >= 2 {
        warnings.push("PDF extraction result is a stitched combination of multiple strategies".to_string());
        let best_score = candidates[best_idx].score;
        let combined = combine_candidates(&candidates, best_idx);
        return Ok((combined, best_score, img));
    }

    let best = candidates.swap_remove(best_idx);
    Ok((best.text, best.score, img))
}

/// Append unique meaningful lines from other candidates onto the
/// best-scoring one's text, mirroring [`iv_ocr::run_multi_pass`]'s own
/// within-ladder combine step but across PDF extraction strategies.
fn combine_candidates(candidates: &[PdfCandidate], best_idx: usize) -> String {
    let best = &candidates[best_idx];
    let mut text = best.text.clone();
    let mut existing: std::collections::HashSet<String> =
        best.text.lines().map(|l| l.trim().to_lowercase()).collect();

    for (i, candidate) in candidates.iter().enumerate() {
        if i == best_idx {
            continue;
        }
        for line in candidate.text.lines() {
            let trimmed = line.trim();
            let normalized = trimmed.to_lowercase();
            if !existing.contains(&normalized) && iv_ocr::is_meaningful_line(trimmed) {
                text.push('\n');
                text.push_str(trimmed);
                existing.insert(normalized);
            }
        }
    }
    text
}

/// Rasterize a PDF's first page to PNG at 300 DPI via `pdftoppm`.
async fn rasterize_first_page(runner: &ProcRunner, bytes: &[u8]) -> IvResult<Vec<u8>> {
    let (_, png) = runner
        .run_with_file_io(
            "pdftoppm",
            &["-png", "-r", "300", "-f", "1", "-l", "1", "input.pdf", "page"],
            bytes,
            "input.pdf",
            "page-1.png",
            None,
        )
        .await?;
    if png.is_empty() {
        return Err(IvError::new(
            ErrorCode::ProcessingError,
            "pdftoppm produced no rasterized page",
        ));
    }
    Ok(png)
}

/// Rasterize every page of a PDF (up to [`MAX_FULL_DOCUMENT_PAGES`]) to PNG
/// via `pdftoppm`, for the "OCR the full document" step of the extraction
/// ladder. Returns an empty `Vec` rather than an error on failure — this
/// step is a best-effort middle rung between the text layer and the
/// page-1-only fallback, not a hard requirement.
async fn rasterize_all_pages(runner: &ProcRunner, bytes: &[u8]) -> IvResult<Vec<Vec<u8>>> {
    let last = MAX_FULL_DOCUMENT_PAGES.to_string();
    let (_, pages) = runner
        .run_with_page_outputs(
            "pdftoppm",
            &["-png", "-r", "300", "-l", &last, "input.pdf", "page"],
            bytes,
            "input.pdf",
            "page-",
            ".png",
            None,
        )
        .await?;
    Ok(pages)
}

/// OCR just the bottom strip of a page image to recover a missing total,
/// at the capped confidence [`roi::field_confidence`] describes.
async fn roi_fallback(runner: &ProcRunner, page: &image::DynamicImage) -> Option<(f64, f64)> {
    let (w, h) = page.dimensions();
    if w == 0 || h == 0 {
        return None;
    }
    let crop = roi::crop_totals_region(page);
    let mut png = Vec::new();
    crop.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .ok()?;

    let result = iv_ocr::run_multi_pass(runner, &png).await.ok()?;
    let amount = extract_first_amount(&result.text)?;
    Some((amount, roi::field_confidence(result.confidence)))
}

fn extract_first_amount(text: &str) -> Option<f64> {
    static RE: std::sync::LazyLock<regex::Regex> =
        std::sync::LazyLock::new(|| regex::Regex::new(r"([\d,]+\.\d{2})").unwrap());
    RE.captures(text)
        .and_then(|c| c[1].replace(',', "").parse::<f64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_type_reexport_detects_pdf() {
        assert_eq!(detect_file_type(b"%PDF-1.4"), FileType::Pdf);
    }

    #[test]
    fn extract_first_amount_strips_thousands_separators() {
        assert_eq!(extract_first_amount("INVOICE TOTAL 1,748.85"), Some(1748.85));
        assert_eq!(extract_first_amount("no amount here"), None);
    }
}
