//! Output formatting and writing modules

pub mod formats;

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use crate::config::{OutputConfig, OutputFormat};
use crate::engine::AnalysisEvent;

pub use formats::{format_failure_json, format_failure_text, format_json, format_text};

/// Output writer that handles multiple destinations
pub struct OutputWriter {
    config: OutputConfig,
    file: Option<File>,
    frames_written: u64,
}

impl OutputWriter {
    /// Create a new output writer
    pub fn new(config: OutputConfig) -> io::Result<Self> {
        let file = if let Some(ref path) = config.output_path {
            // Ensure parent directory exists
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            Some(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?,
            )
        } else {
            None
        };

        Ok(Self {
            config,
            file,
            frames_written: 0,
        })
    }

    /// Write one engine event
    pub fn write(&mut self, event: &AnalysisEvent) -> io::Result<()> {
        if let AnalysisEvent::Frame(_) = event {
            self.frames_written += 1;
        }

        let formatted = self.format(event);

        if self.config.enable_console {
            self.write_console(&formatted)?;
        }

        if let Some(ref mut file) = self.file {
            writeln!(file, "{}", formatted)?;
            file.flush()?;
        }

        Ok(())
    }

    /// Format the event according to configured format
    fn format(&self, event: &AnalysisEvent) -> String {
        match (self.config.format, event) {
            (OutputFormat::Text, AnalysisEvent::Frame(result)) => {
                format_text(result, self.config.enable_timestamps)
            }
            (OutputFormat::Json, AnalysisEvent::Frame(result)) => {
                format_json(result, self.config.include_spectrum)
            }
            (OutputFormat::Text, AnalysisEvent::SessionFailed { session, error }) => {
                format_failure_text(*session, error)
            }
            (OutputFormat::Json, AnalysisEvent::SessionFailed { session, error }) => {
                format_failure_json(*session, error)
            }
        }
    }

    fn write_console(&self, text: &str) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{}", text)?;
        stdout.flush()
    }

    /// Flush any buffered output
    pub fn flush(&mut self) -> io::Result<()> {
        if let Some(ref mut file) = self.file {
            file.flush()?;
        }
        Ok(())
    }

    /// Number of frames written so far
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Get the output file path if configured
    pub fn output_path(&self) -> Option<&PathBuf> {
        self.config.output_path.as_ref()
    }
}

/// Format milliseconds as HH:MM:SS.mmm
pub fn format_timestamp(ms: i64) -> String {
    let total_seconds = ms / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    let millis = ms % 1000;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
    } else {
        format!("{:02}:{:02}.{:03}", minutes, seconds, millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CaptureError;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "00:00.000");
        assert_eq!(format_timestamp(1515), "00:01.515");
        assert_eq!(format_timestamp(61000), "01:01.000");
        assert_eq!(format_timestamp(3661500), "01:01:01.500");
    }

    #[test]
    fn test_writes_to_file() {
        let path = std::env::temp_dir().join(format!(
            "speech-analysis-output-{}.jsonl",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        let config = OutputConfig {
            format: OutputFormat::Json,
            output_path: Some(path.clone()),
            enable_console: false,
            ..OutputConfig::default()
        };
        let mut writer = OutputWriter::new(config).unwrap();
        writer
            .write(&AnalysisEvent::SessionFailed {
                session: 4,
                error: CaptureError::Disconnected,
            })
            .unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.frames_written(), 0);
        assert_eq!(writer.output_path(), Some(&path));

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"session\":4"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_file_is_current_after_each_write() {
        let path = std::env::temp_dir().join(format!(
            "speech-analysis-live-{}.txt",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        let config = OutputConfig {
            format: OutputFormat::Text,
            output_path: Some(path.clone()),
            enable_console: false,
            ..OutputConfig::default()
        };
        let mut writer = OutputWriter::new(config).unwrap();
        for session in [7, 8] {
            writer
                .write(&AnalysisEvent::SessionFailed {
                    session,
                    error: CaptureError::Disconnected,
                })
                .unwrap();
            // No flush: a reader tailing the file sees every event so far
            let lines = std::fs::read_to_string(&path).unwrap().lines().count();
            assert_eq!(lines, (session - 6) as usize);
        }
        let _ = std::fs::remove_file(&path);
    }
}
