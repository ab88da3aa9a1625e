//! Text extraction through the Tesseract command line.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use super::{OcrError, TextExtractor};
use crate::config::OcrConfig;

/// Word rows in tesseract's TSV output.
const WORD_LEVEL: &str = "5";

/// Columns: level page block par line word left top width height conf text.
const TSV_COLUMNS: usize = 12;

/// Runs `tesseract <image> stdout -l <language> tsv`.
///
/// Words under `min_confidence` are dropped before lines are rebuilt.
/// The child is killed if the caller stops waiting, so a stage timeout
/// does not leave a stray process behind.
#[derive(Debug, Clone)]
pub struct TesseractExtractor {
    config: OcrConfig,
}

impl TesseractExtractor {
    pub fn new(config: OcrConfig) -> Self {
        Self { config }
    }

    /// Rebuild text lines from confident word rows.
    fn lines_from_tsv(&self, tsv: &str) -> String {
        let rows: Vec<Vec<&str>> = tsv
            .lines()
            .map(|row| row.splitn(TSV_COLUMNS, '\t').collect::<Vec<_>>())
            .filter(|cols| cols.len() == TSV_COLUMNS && cols[0] == WORD_LEVEL)
            .collect();

        let mut lines: Vec<(&[&str], Vec<&str>)> = Vec::new();

        for cols in &rows {
            let text = cols[11].trim();
            let confidence = cols[10].trim().parse::<f32>().unwrap_or(-1.0);
            if text.is_empty() || confidence < 0.0 || confidence < self.config.min_confidence {
                continue;
            }
            // page, block, paragraph, line
            let key = &cols[1..5];
            match lines.last_mut() {
                Some((last, words)) if *last == key => words.push(text),
                _ => lines.push((key, vec![text])),
            }
        }

        let joined = lines
            .iter()
            .map(|(_, words)| words.join(" "))
            .collect::<Vec<_>>()
            .join("\n");
        self.clean_output(&joined)
    }

    /// Keep trimmed lines that meet the minimum length, one per line.
    fn clean_output(&self, raw: &str) -> String {
        let min_chars = self.config.min_line_chars.max(1);
        raw.lines()
            .map(str::trim)
            .filter(|line| line.chars().count() >= min_chars)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for TesseractExtractor {
    fn default() -> Self {
        Self::new(OcrConfig::default())
    }
}

#[async_trait]
impl TextExtractor for TesseractExtractor {
    async fn extract_text(&self, image_path: &Path) -> Result<String, OcrError> {
        if !image_path.is_file() {
            return Err(OcrError::OcrFailed(format!(
                "image not found: {}",
                image_path.display()
            )));
        }

        let output = Command::new(&self.config.binary)
            .arg(image_path)
            .arg("stdout")
            .args(["-l", self.config.language.as_str(), "tsv"])
            .kill_on_drop(true)
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(OcrError::BackendNotAvailable(format!(
                    "{} not found (install tesseract-ocr)",
                    self.config.binary
                )));
            }
            Err(e) => return Err(OcrError::Io(e)),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::OcrFailed(format!(
                "tesseract failed: {}",
                stderr.trim()
            )));
        }

        let text = self.lines_from_tsv(&String::from_utf8_lossy(&output.stdout));
        tracing::debug!(
            image = %image_path.display(),
            chars = text.len(),
            "OCR complete"
        );
        Ok(text)
    }

    fn name(&self) -> &str {
        "tesseract"
    }
}
