//! QR presence through the zbar command-line scanner.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use super::{MarkerDetector, MarkerResult, IMAGE_READ_FAILED};
use crate::config::QrConfig;

// zbarimg exit statuses
const EXIT_FOUND: i32 = 0;
const EXIT_IMAGE_ERROR: i32 = 2;
const EXIT_NOT_FOUND: i32 = 4;

const METHOD: &str = "zbarimg";

/// Turns off every symbology, then re-enables QR only.
const QR_ONLY: [&str; 2] = ["-Sdisable", "-Sqrcode.enable"];

/// Runs the scanner quietly and reads only its exit status.
///
/// Only QR codes count as a marker. Barcodes on the card do not.
/// Decoded symbol content goes to a null sink and is never inspected.
#[derive(Debug, Clone)]
pub struct BinaryMarkerDetector {
    config: QrConfig,
}

impl BinaryMarkerDetector {
    pub fn new(config: QrConfig) -> Self {
        Self { config }
    }

    fn scan_args(image_path: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["--quiet".into()];
        args.extend(QR_ONLY.iter().map(OsString::from));
        args.push(image_path.as_os_str().to_owned());
        args
    }

    fn interpret(&self, code: Option<i32>, stderr: &str) -> MarkerResult {
        match code {
            Some(EXIT_FOUND) => MarkerResult::scanned(METHOD, true),
            Some(EXIT_NOT_FOUND) => MarkerResult::scanned(METHOD, false),
            Some(EXIT_IMAGE_ERROR) => MarkerResult::failed(METHOD, IMAGE_READ_FAILED),
            Some(code) => MarkerResult::failed(
                METHOD,
                format!("{} exited with status {}: {}", self.config.binary, code, stderr.trim()),
            ),
            None => MarkerResult::failed(METHOD, format!("{} terminated by signal", self.config.binary)),
        }
    }
}

impl Default for BinaryMarkerDetector {
    fn default() -> Self {
        Self::new(QrConfig::default())
    }
}

#[async_trait]
impl MarkerDetector for BinaryMarkerDetector {
    async fn detect_presence(&self, image_path: &Path) -> MarkerResult {
        if !image_path.is_file() {
            return MarkerResult::failed(METHOD, IMAGE_READ_FAILED);
        }

        let output = Command::new(&self.config.binary)
            .args(Self::scan_args(image_path))
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;

        match output {
            Ok(output) => {
                let result =
                    self.interpret(output.status.code(), &String::from_utf8_lossy(&output.stderr));
                tracing::debug!(
                    image = %image_path.display(),
                    qr_present = result.qr_present,
                    "Marker scan complete"
                );
                result
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => MarkerResult::failed(
                METHOD,
                format!("{} not found (install zbar-tools)", self.config.binary),
            ),
            Err(e) => MarkerResult::failed(METHOD, e.to_string()),
        }
    }

    fn method(&self) -> &str {
        METHOD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let detector = BinaryMarkerDetector::default();

        let found = detector.interpret(Some(0), "");
        assert!(found.qr_present);
        assert_eq!(found.confidence, 0.9);

        let absent = detector.interpret(Some(4), "");
        assert!(!absent.qr_present);
        assert!(!absent.is_failure());

        let unreadable = detector.interpret(Some(2), "cannot read");
        assert_eq!(unreadable.error.as_deref(), Some(IMAGE_READ_FAILED));

        let other = detector.interpret(Some(1), "bad option");
        assert!(other.error.unwrap().contains("bad option"));
    }

    #[test]
    fn test_scan_restricted_to_qr_symbology() {
        let args = BinaryMarkerDetector::scan_args(Path::new("/tmp/card.png"));
        assert_eq!(
            args,
            ["--quiet", "-Sdisable", "-Sqrcode.enable", "/tmp/card.png"]
                .map(OsString::from)
                .to_vec()
        );
    }

    #[tokio::test]
    async fn test_missing_image_is_read_failure() {
        let detector = BinaryMarkerDetector::default();
        let result = detector
            .detect_presence(Path::new("/nonexistent/card.png"))
            .await;

        assert!(!result.qr_present);
        assert_eq!(result.error.as_deref(), Some(IMAGE_READ_FAILED));
        assert!(!result.authoritative);
    }

    #[tokio::test]
    async fn test_missing_binary_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("card.png");
        std::fs::write(&image, b"png").unwrap();

        let detector = BinaryMarkerDetector::new(QrConfig {
            binary: "docverify-no-such-qr-binary".to_string(),
        });
        let result = detector.detect_presence(&image).await;

        assert!(!result.qr_present);
        assert!(result.error.unwrap().contains("not found"));
    }
}
