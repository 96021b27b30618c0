use crate::collectors::EventSource;
use crate::error::CollectorError;
use crate::events::Event;
use log::{debug, warn};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Follows a file of newline-delimited event documents
///
/// Each poll returns the events on lines completed since the previous poll. A
/// trailing line without a newline is left for the next poll. Lines that do not
/// decode into an event are logged and skipped.
pub struct JsonLinesSource {
    path: PathBuf,
    offset: u64,
    line: usize,
}

impl JsonLinesSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            offset: 0,
            line: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes of the lines completed since the previous read
    fn read_new(&mut self) -> Result<Vec<u8>, CollectorError> {
        let mut file = File::open(&self.path)?;
        let len = file.metadata()?.len();
        if len < self.offset {
            warn!(
                "{} shrank from {} to {} bytes, reading from the start",
                self.path.display(),
                self.offset,
                len
            );
            self.offset = 0;
            self.line = 0;
        }

        file.seek(SeekFrom::Start(self.offset))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;

        let complete = buf
            .iter()
            .rposition(|byte| *byte == b'\n')
            .map(|pos| pos + 1)
            .unwrap_or(0);
        buf.truncate(complete);
        self.offset += complete as u64;
        Ok(buf)
    }
}

impl EventSource for JsonLinesSource {
    fn poll(&mut self) -> Result<Vec<Event>, CollectorError> {
        let bytes = self.read_new()?;
        let mut events = Vec::new();
        if bytes.is_empty() {
            return Ok(events);
        }

        let body = bytes.strip_suffix(b"\n").unwrap_or(&bytes);
        for raw in body.split(|byte| *byte == b'\n') {
            self.line += 1;
            let raw = match std::str::from_utf8(raw) {
                Ok(text) => text.trim(),
                Err(e) => {
                    warn!("{}:{}: skipping line: {}", self.path.display(), self.line, e);
                    continue;
                }
            };
            if raw.is_empty() {
                continue;
            }
            match Event::from_json(raw) {
                Ok(event) => events.push(event),
                Err(e) => warn!("{}:{}: skipping line: {}", self.path.display(), self.line, e),
            }
        }

        if !events.is_empty() {
            debug!("Read {} events from {}", events.len(), self.path.display());
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{process_event, EventType, SourceInfo};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn line(pid: u32) -> String {
        let event = process_event(
            SourceInfo::new("process-collector", "1.0.0", "sensor-1"),
            "ws-1",
            EventType::ProcessCreated,
            pid,
            1,
            "bash",
            "bash -i",
        )
        .unwrap();
        format!("{}\n", event.to_json().unwrap())
    }

    #[test]
    fn test_reads_only_new_complete_lines() {
        let mut file = NamedTempFile::new().unwrap();
        let mut source = JsonLinesSource::new(file.path());

        file.write_all(line(100).as_bytes()).unwrap();
        file.write_all(line(101).trim_end().as_bytes()).unwrap();
        file.flush().unwrap();

        let first = source.poll().unwrap();
        assert_eq!(first.len(), 1);

        file.write_all(b"\n").unwrap();
        file.write_all(line(102).as_bytes()).unwrap();
        file.flush().unwrap();

        let second = source.poll().unwrap();
        assert_eq!(second.len(), 2);
        assert!(source.poll().unwrap().is_empty());
    }

    #[test]
    fn test_skips_invalid_lines() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(line(1).as_bytes()).unwrap();
        file.write_all(b"not json\n\n").unwrap();
        file.write_all(b"{\"event_type\": \"process.exploded\"}\n").unwrap();
        file.write_all(line(2).as_bytes()).unwrap();
        file.flush().unwrap();

        let events = JsonLinesSource::new(file.path()).poll().unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_non_utf8_line_does_not_block_later_lines() {
        let mut file = NamedTempFile::new().unwrap();
        let mut source = JsonLinesSource::new(file.path());

        file.write_all(b"\xff\xfe garbage\n").unwrap();
        file.write_all(line(7).as_bytes()).unwrap();
        file.flush().unwrap();

        let events = source.poll().unwrap();
        assert_eq!(events.len(), 1);

        file.write_all(line(8).as_bytes()).unwrap();
        file.flush().unwrap();
        assert_eq!(source.poll().unwrap().len(), 1);
    }

    #[test]
    fn test_partial_multibyte_character_waits_for_newline() {
        let mut file = NamedTempFile::new().unwrap();
        let mut source = JsonLinesSource::new(file.path());

        let text = line(9).replace("bash -i", "bash -c 'echo \u{e9}t\u{e9}'");
        let bytes = text.as_bytes();
        let split = text.find('\u{e9}').unwrap() + 1;

        file.write_all(&bytes[..split]).unwrap();
        file.flush().unwrap();
        assert!(source.poll().unwrap().is_empty());

        file.write_all(&bytes[split..]).unwrap();
        file.flush().unwrap();
        let events = source.poll().unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = JsonLinesSource::new(dir.path().join("absent.jsonl"));
        assert!(matches!(source.poll(), Err(CollectorError::IoError(_))));
    }
}
