// SPDX-License-Identifier: MIT OR Apache-2.0
//! Parsing of `tesseract --psm N tsv` output.

/// Parse a `tesseract` TSV report into reconstructed line text and a mean
/// word-confidence score on `0.0..=1.0`.
///
/// TSV columns (tab-separated, one header row):
/// `level page_num block_num par_num line_num word_num left top width
/// height conf text`. Word-level rows (`level == 5`) carry both a `conf`
/// in `0..=100` (or `-1` for non-word rows) and the recognized token.
pub fn parse_tsv(bytes: &[u8]) -> (String, f64) {
    let text = String::from_utf8_lossy(bytes);
    let mut lines_by_key: Vec<(u32, u32, u32, Vec<String>)> = Vec::new();
    let mut confidences = Vec::new();

    for row in text.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 {
            continue;
        }
        let level = cols[0].parse::<u32>().unwrap_or(0);
        if level != 5 {
            continue;
        }
        let (block, line, word) = (
            cols[2].parse::<u32>().unwrap_or(0),
            cols[4].parse::<u32>().unwrap_or(0),
            cols[5].parse::<u32>().unwrap_or(0),
        );
        let conf: f64 = cols[10].parse().unwrap_or(-1.0);
        let word_text = cols[11].trim();
        if word_text.is_empty() {
            continue;
        }
        if conf >= 0.0 {
            confidences.push(conf / 100.0);
        }

        match lines_by_key
            .iter_mut()
            .find(|(b, l, _, _)| *b == block && *l == line)
        {
            Some((_, _, _, words)) => words.push(word_text.to_string()),
            None => lines_by_key.push((block, line, word, vec![word_text.to_string()])),
        }
    }

    let reconstructed = lines_by_key
        .into_iter()
        .map(|(_, _, _, words)| words.join(" "))
        .collect::<Vec<_>>()
        .join("\n");

    let confidence = if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f64>() / confidences.len() as f64
    };

    (reconstructed, confidence)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
        5\t1\t1\t1\t1\t1\t0\t0\t10\t10\t95.5\tINVOICE\n\
        5\t1\t1\t1\t1\t2\t11\t0\t10\t10\t88.0\t#1042\n\
        5\t1\t1\t1\t2\t1\t0\t12\t10\t10\t-1\t\n";

    #[test]
    fn reconstructs_lines_and_averages_confidence() {
        let (text, confidence) = parse_tsv(SAMPLE.as_bytes());
        assert_eq!(text, "INVOICE #1042");
        assert!((confidence - 0.9175).abs() < 1e-6);
    }

    #[test]
    fn no_word_rows_yields_zero_confidence() {
        let (text, confidence) = parse_tsv(b"level\ttext\n1\tsomething\n");
        assert_eq!(text, "");
        assert_eq!(confidence, 0.0);
    }
}
