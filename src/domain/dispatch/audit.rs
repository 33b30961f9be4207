use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Write};
use std::sync::{OnceLock, mpsc};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

/// Log target for the structured mirror of audit events. Events emitted
/// under this target also reach the regular log sinks.
pub const AUDIT_TARGET: &str = "audit";

/// Each audit event is a set of key-value pairs describing one dispatched
/// command. This enum fixes the allowed keys and thus the columns of the
/// audit file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AuditParameter {
    /// Seconds since the audit trail was opened.
    Time,

    /// Why this entry was made.
    LogDescription,

    /// Target host of the command.
    Host,

    /// Dispatcher-assigned command id.
    CommandId,

    /// Command verb, e.g. "create-resource".
    Command,

    /// Primary identifier the command acted on.
    Subject,

    /// Full rendered command line.
    CommandLine,

    /// Attempts used, including the final one.
    Attempts,

    /// Remote exit code, when the command ran at all.
    ExitCode,

    /// Final outcome: "acknowledged", "remote-error", "timeout" or
    /// "connection-error".
    Outcome,

    /// Wall-clock processing time in ms, including retries.
    ProcessingTime,
}

/// Column layout of the audit file.
const COLUMNS: [AuditParameter; 11] = [
    AuditParameter::Time,
    AuditParameter::LogDescription,
    AuditParameter::Host,
    AuditParameter::CommandId,
    AuditParameter::Command,
    AuditParameter::Subject,
    AuditParameter::CommandLine,
    AuditParameter::Attempts,
    AuditParameter::ExitCode,
    AuditParameter::Outcome,
    AuditParameter::ProcessingTime,
];

impl AuditParameter {
    fn label(&self) -> &'static str {
        match self {
            AuditParameter::Time => "Time",
            AuditParameter::LogDescription => "LogDescription",
            AuditParameter::Host => "Host",
            AuditParameter::CommandId => "CommandId",
            AuditParameter::Command => "Command",
            AuditParameter::Subject => "Subject",
            AuditParameter::CommandLine => "CommandLine",
            AuditParameter::Attempts => "Attempts",
            AuditParameter::ExitCode => "ExitCode",
            AuditParameter::Outcome => "Outcome",
            AuditParameter::ProcessingTime => "ProcessingTime",
        }
    }
}

/// Store values in their native format, only format them when writing.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AuditValue {
    Integer(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

impl From<i32> for AuditValue {
    fn from(v: i32) -> Self {
        AuditValue::Integer(v as i64)
    }
}

impl From<u32> for AuditValue {
    fn from(v: u32) -> Self {
        AuditValue::Integer(v as i64)
    }
}

impl From<i64> for AuditValue {
    fn from(v: i64) -> Self {
        AuditValue::Integer(v)
    }
}

impl From<f64> for AuditValue {
    fn from(v: f64) -> Self {
        AuditValue::Float(v)
    }
}

impl From<String> for AuditValue {
    fn from(v: String) -> Self {
        AuditValue::Text(v)
    }
}

impl From<&str> for AuditValue {
    fn from(v: &str) -> Self {
        AuditValue::Text(v.to_string())
    }
}

impl From<bool> for AuditValue {
    fn from(v: bool) -> Self {
        AuditValue::Bool(v)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuditEvent {
    data: HashMap<AuditParameter, AuditValue>,
}

impl AuditEvent {
    pub fn new() -> Self {
        Self { data: HashMap::new() }
    }

    pub fn set<V: Into<AuditValue>>(&mut self, param: AuditParameter, value: V) -> &mut Self {
        self.data.insert(param, value.into());
        self
    }

    pub fn get(&self, param: AuditParameter) -> Option<&AuditValue> {
        self.data.get(&param)
    }
}

/// Messages sent from dispatcher workers to the writer thread.
enum AuditMessage {
    Log(AuditEvent),
    Flush,
    Shutdown,
}

/// Handle that lets dispatcher workers append audit entries. Holds the
/// sender side of the writer channel.
pub struct AuditTrail {
    sender: mpsc::Sender<AuditMessage>,
    start_time: u64,
}

impl AuditTrail {
    /// Opens the audit trail and spawns the background writer thread.
    /// Without a filename, entries go to stdout.
    pub fn init(filename: Option<String>) -> Self {
        let (tx, rx) = mpsc::channel();

        let start_time = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();

        thread::spawn(move || {
            Self::worker_loop(rx, filename);
        });

        AuditTrail { sender: tx, start_time }
    }

    fn worker_loop(rx: mpsc::Receiver<AuditMessage>, filename: Option<String>) {
        let writer: Box<dyn Write> = match filename {
            Some(f) => match File::create(&f) {
                Ok(file) => Box::new(file),
                Err(e) => {
                    log::error!("Audit Error: Could not create '{}', falling back to stdout: {}", f, e);
                    Box::new(io::stdout())
                }
            },
            None => Box::new(io::stdout()),
        };

        let mut csv_wtr = csv::WriterBuilder::new().delimiter(b';').from_writer(writer);

        let headers: Vec<&str> = COLUMNS.iter().map(|column| column.label()).collect();
        if let Err(e) = csv_wtr.write_record(&headers) {
            log::error!("Audit Error: Failed to write headers: {}", e);
        }

        for msg in rx {
            match msg {
                AuditMessage::Log(event) => {
                    let row: Vec<String> = COLUMNS
                        .iter()
                        .map(|column| match event.data.get(column) {
                            Some(AuditValue::Text(t)) => t.clone(),
                            Some(AuditValue::Integer(i)) => i.to_string(),
                            Some(AuditValue::Float(f)) => f.to_string(),
                            Some(AuditValue::Bool(b)) => b.to_string(),
                            None => "NA".to_string(),
                        })
                        .collect();

                    if let Err(e) = csv_wtr.write_record(&row) {
                        log::error!("Audit Error: Failed to write record: {}", e);
                    }
                }
                AuditMessage::Flush => {
                    let _ = csv_wtr.flush();
                }
                AuditMessage::Shutdown => {
                    let _ = csv_wtr.flush();
                    break;
                }
            }
        }
    }

    /// Appends one event. Non-blocking, just sends a message.
    pub fn add_event(&self, mut event: AuditEvent) {
        // Inject the relative timestamp if the caller left it out
        if event.get(AuditParameter::Time).is_none() {
            let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
            let relative = now.saturating_sub(self.start_time);
            event.set(AuditParameter::Time, relative as i64);
        }

        // A dead writer thread must not take the dispatcher down with it
        let _ = self.sender.send(AuditMessage::Log(event));
    }

    pub fn flush(&self) {
        let _ = self.sender.send(AuditMessage::Flush);
    }

    pub fn shutdown(&self) {
        let _ = self.sender.send(AuditMessage::Shutdown);
    }
}

static GLOBAL_AUDIT: OnceLock<AuditTrail> = OnceLock::new();

/// Opens the global audit trail. Later calls are ignored.
pub fn init_global(filename: Option<String>) {
    let trail = AuditTrail::init(filename);
    let _ = GLOBAL_AUDIT.set(trail);
}

/// Appends an event to the global trail. Safe to call from any thread;
/// without an initialized trail the event is dropped.
pub fn record(event: AuditEvent) {
    if let Some(trail) = GLOBAL_AUDIT.get() {
        trail.add_event(event);
    } else {
        log::debug!("Audit event dropped, no audit trail configured.");
    }
}

/// Asks the global writer to flush and stop. Events recorded afterwards
/// are dropped.
pub fn shutdown_global() {
    if let Some(trail) = GLOBAL_AUDIT.get() {
        trail.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use std::time::Duration;

    fn temp_audit_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("crm-audit-{}-{}.csv", tag, std::process::id()))
    }

    /// The writer runs on its own thread, so the file content trails the
    /// sent messages slightly.
    fn read_when_complete(path: &PathBuf, lines: usize) -> String {
        for _ in 0..200 {
            if let Ok(content) = fs::read_to_string(path) {
                if content.lines().count() >= lines {
                    return content;
                }
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("Audit file '{}' did not reach {} line(s) in time", path.display(), lines);
    }

    #[test]
    fn trail_writes_header_and_semicolon_rows() {
        let path = temp_audit_path("rows");
        let trail = AuditTrail::init(Some(path.to_string_lossy().into_owned()));

        let mut event = AuditEvent::new();
        event
            .set(AuditParameter::Time, 7)
            .set(AuditParameter::LogDescription, "Command dispatch finished")
            .set(AuditParameter::Host, "node-1")
            .set(AuditParameter::Command, "delete-resource")
            .set(AuditParameter::CommandLine, "crm configure delete web")
            .set(AuditParameter::Attempts, 2u32)
            .set(AuditParameter::ExitCode, 0)
            .set(AuditParameter::Outcome, "acknowledged")
            .set(AuditParameter::ProcessingTime, 15i64);
        trail.add_event(event);
        trail.flush();

        let content = read_when_complete(&path, 2);
        let mut file_lines = content.lines();

        assert_eq!(
            file_lines.next(),
            Some("Time;LogDescription;Host;CommandId;Command;Subject;CommandLine;Attempts;ExitCode;Outcome;ProcessingTime")
        );
        // Columns the event left unset are filled with NA
        assert_eq!(
            file_lines.next(),
            Some("7;Command dispatch finished;node-1;NA;delete-resource;NA;crm configure delete web;2;0;acknowledged;15")
        );

        trail.shutdown();
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn trail_injects_relative_timestamp() {
        let path = temp_audit_path("time");
        let trail = AuditTrail::init(Some(path.to_string_lossy().into_owned()));

        let mut event = AuditEvent::new();
        event
            .set(AuditParameter::Host, "node-2")
            .set(AuditParameter::Outcome, "timeout");
        trail.add_event(event);
        trail.shutdown();

        let content = read_when_complete(&path, 2);
        let row = content.lines().nth(1).expect("row should be written");
        let fields: Vec<&str> = row.split(';').collect();

        assert_eq!(fields.len(), 11);
        // Seconds since the trail was opened, injected by add_event
        assert!(fields[0].parse::<i64>().expect("Time column should be numeric") >= 0);
        assert_eq!(fields[2], "node-2");
        assert_eq!(fields[9], "timeout");

        let _ = fs::remove_file(&path);
    }
}
