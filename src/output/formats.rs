//! Output format implementations

use serde::Serialize;

use super::format_timestamp;
use crate::analysis::{AnalysisResult, Pitch};
use crate::error::CaptureError;

/// JSON output structure for one frame
#[derive(Debug, Serialize)]
struct JsonFrame<'a> {
    session: u64,
    sequence: u64,
    timestamp_ms: u64,
    config_version: u64,
    pitch_algorithm: &'static str,
    pitch_hz: Option<f64>,
    pitch_confidence: f64,
    formants: Vec<JsonFormant>,
    spectrum_peak_hz: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    spectrum: Option<&'a [f32]>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    degenerate: Vec<String>,
}

#[derive(Debug, Serialize)]
struct JsonFormant {
    frequency: f64,
    bandwidth: f64,
}

#[derive(Debug, Serialize)]
struct JsonFailure<'a> {
    session: u64,
    error: &'a str,
}

fn timestamp_ms(result: &AnalysisResult) -> u64 {
    result.timestamp.as_millis() as u64
}

/// Frequency of the strongest non-DC bin; none for an all-zero spectrum
fn peak_frequency(result: &AnalysisResult) -> Option<f64> {
    let spectrum = &result.spectrum;
    spectrum
        .peak_bin()
        .filter(|&k| spectrum.magnitudes[k] > 0.0)
        .map(|k| spectrum.bin_frequency(k))
}

/// Format one frame as a single text line
pub fn format_text(result: &AnalysisResult, with_timestamp: bool) -> String {
    let pitch = match result.pitch.pitch {
        Pitch::Voiced(hz) => format!("{:6.1} Hz ({:.2})", hz, result.pitch.confidence),
        Pitch::Unvoiced => "     -   ".to_string(),
    };
    let formants = if result.formants.is_empty() {
        "-".to_string()
    } else {
        result
            .formants
            .formants
            .iter()
            .map(|f| format!("{:.0}", f.frequency))
            .collect::<Vec<_>>()
            .join(" ")
    };
    let peak = peak_frequency(result)
        .map(|hz| format!("{:.0} Hz", hz))
        .unwrap_or_else(|| "-".to_string());

    let line = format!(
        "#{:<5} pitch {} | formants {} | peak {}",
        result.sequence, pitch, formants, peak
    );
    if with_timestamp {
        format!("[{}] {}", format_timestamp(timestamp_ms(result) as i64), line)
    } else {
        line
    }
}

/// Format one frame as a JSON object; the full spectrum only when asked for
pub fn format_json(result: &AnalysisResult, with_spectrum: bool) -> String {
    let degenerate = result
        .formants
        .degeneracy
        .map(|d| format!("formants: {}", d))
        .into_iter()
        .chain(result.pitch.degeneracy.map(|d| format!("pitch: {}", d)))
        .collect();

    let output = JsonFrame {
        session: result.session,
        sequence: result.sequence,
        timestamp_ms: timestamp_ms(result),
        config_version: result.config_version,
        pitch_algorithm: result.pitch.algorithm.name(),
        pitch_hz: result.pitch.frequency(),
        pitch_confidence: result.pitch.confidence,
        formants: result
            .formants
            .formants
            .iter()
            .map(|f| JsonFormant {
                frequency: f.frequency,
                bandwidth: f.bandwidth,
            })
            .collect(),
        spectrum_peak_hz: peak_frequency(result),
        spectrum: with_spectrum.then_some(result.spectrum.magnitudes.as_slice()),
        degenerate,
    };

    serde_json::to_string(&output)
        .unwrap_or_else(|_| format!("{{\"sequence\": {}}}", result.sequence))
}

/// Format a session failure notice as text
pub fn format_failure_text(session: u64, error: &CaptureError) -> String {
    format!("session {} failed: {}", session, error)
}

/// Format a session failure notice as JSON
pub fn format_failure_json(session: u64, error: &CaptureError) -> String {
    let message = error.to_string();
    let output = JsonFailure {
        session,
        error: &message,
    };
    serde_json::to_string(&output).unwrap_or_else(|_| format!("{{\"session\": {}}}", session))
}
