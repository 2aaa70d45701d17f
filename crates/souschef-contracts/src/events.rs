use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Session activity log, one compact JSON object per line.
///
/// Every record starts with `type`, `session_id`, `seq` and `ts`; payload keys
/// are merged afterwards and win on conflict. `seq` counts from 1 per writer
/// and is shared by clones, so lines from media worker threads still sort.
#[derive(Debug, Clone)]
pub struct EventWriter {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    path: PathBuf,
    session_id: String,
    sink: Mutex<Sink>,
}

#[derive(Debug, Default)]
struct Sink {
    file: Option<File>,
    seq: u64,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                path: path.into(),
                session_id: session_id.into(),
                sink: Mutex::new(Sink::default()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    /// Appends one record and returns it as written.
    pub fn emit(&self, event_type: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut guard = self
            .shared
            .sink
            .lock()
            .map_err(|_| anyhow::anyhow!("event log lock poisoned"))?;
        let sink = &mut *guard;

        let mut record: EventPayload = [
            ("type", Value::from(event_type)),
            ("session_id", Value::from(self.shared.session_id.as_str())),
            ("seq", Value::from(sink.seq + 1)),
            ("ts", Value::from(timestamp())),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect();
        record.extend(payload);

        let file = match sink.file.as_mut() {
            Some(file) => file,
            None => sink.file.insert(open_log(&self.shared.path)?),
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        file.write_all(&line)?;
        sink.seq += 1;

        Ok(Value::Object(record))
    }

    /// Like [`EventWriter::emit`], for call sites where a lost log line must
    /// not interrupt the flow.
    pub fn note(&self, event_type: &str, payload: EventPayload) {
        let _ = self.emit(event_type, payload);
    }
}

fn open_log(path: &Path) -> anyhow::Result<File> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;
    use serde_json::json;

    use super::*;

    fn read_lines(path: &Path) -> anyhow::Result<Vec<Value>> {
        fs::read_to_string(path)?
            .lines()
            .map(|line| Ok(serde_json::from_str(line)?))
            .collect()
    }

    #[test]
    fn records_carry_session_and_sequence() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("logs").join("events.jsonl");
        let writer = EventWriter::new(&path, "kitchen-7");

        let mut payload = EventPayload::new();
        payload.insert("flow".to_string(), json!("recipe"));
        let first = writer.emit("stage1_attempt", payload)?;
        writer.emit("candidate_selected", EventPayload::new())?;

        let lines = read_lines(&path)?;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], first);
        assert_eq!(lines[0]["session_id"], json!("kitchen-7"));
        assert_eq!(lines[0]["flow"], json!("recipe"));
        assert_eq!(lines[0]["seq"], json!(1));
        assert_eq!(lines[1]["type"], json!("candidate_selected"));
        assert_eq!(lines[1]["seq"], json!(2));
        DateTime::parse_from_rfc3339(lines[1]["ts"].as_str().unwrap_or(""))?;
        Ok(())
    }

    #[test]
    fn payload_wins_over_envelope_fields() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = EventWriter::new(temp.path().join("events.jsonl"), "kitchen-7");

        let mut payload = EventPayload::new();
        payload.insert("session_id".to_string(), json!("replayed"));
        let record = writer.emit("session_started", payload)?;

        assert_eq!(record["type"], json!("session_started"));
        assert_eq!(record["session_id"], json!("replayed"));
        Ok(())
    }

    #[test]
    fn clones_share_file_and_counter() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "kitchen-7");
        let worker = writer.clone();

        std::thread::scope(|scope| {
            scope.spawn(|| worker.note("media_ready", EventPayload::new()));
        });
        writer.note("history_recorded", EventPayload::new());

        let lines = read_lines(&path)?;
        let mut seqs: Vec<u64> = lines.iter().filter_map(|line| line["seq"].as_u64()).collect();
        seqs.sort_unstable();
        assert_eq!(seqs, vec![1, 2]);
        Ok(())
    }
}
