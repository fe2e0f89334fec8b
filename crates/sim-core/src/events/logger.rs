//! Event Logger
//!
//! Append-only JSONL event logging, and the per-tick event sink phases
//! and background tasks push into.

use bevy_ecs::prelude::*;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use sim_events::Event;

/// Writes events to a JSONL file, one object per line
pub struct EventLogger {
    writer: Option<BufWriter<File>>,
    event_count: u64,
}

impl EventLogger {
    /// Create a new event logger writing to the specified path
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            writer: Some(BufWriter::new(file)),
            event_count: 0,
        })
    }

    /// Create a logger that discards events
    pub fn null() -> Self {
        Self {
            writer: None,
            event_count: 0,
        }
    }

    /// Get the current event count
    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    /// Log an event to the file
    pub fn log(&mut self, event: &Event) -> std::io::Result<()> {
        self.event_count += 1;
        if let Some(ref mut writer) = self.writer {
            let json = event.to_jsonl()?;
            writeln!(writer, "{}", json)?;
        }
        Ok(())
    }

    /// Log multiple events
    pub fn log_batch(&mut self, events: &[Event]) -> std::io::Result<()> {
        for event in events {
            self.log(event)?;
        }
        Ok(())
    }

    /// Flush the buffer to disk
    pub fn flush(&mut self) -> std::io::Result<()> {
        if let Some(ref mut writer) = self.writer {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Drop for EventLogger {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!(error = %e, "failed to flush event logger");
        }
    }
}

/// Events produced during the current tick, in emission order.
///
/// Clones share the same buffer, so a handle can be moved into a spawned
/// task and pushed to while the phase awaits it.
#[derive(Resource, Debug, Clone, Default)]
pub struct TickEvents {
    events: Arc<Mutex<Vec<Event>>>,
}

impl TickEvents {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Event>> {
        // A panicking pusher cannot leave a half-written Vec behind
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, event: Event) {
        self.lock().push(event);
    }

    pub fn extend<I: IntoIterator<Item = Event>>(&self, events: I) {
        self.lock().extend(events);
    }

    pub fn drain(&self) -> Vec<Event> {
        std::mem::take(&mut *self.lock())
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_events::MonthStamp;
    use std::io::BufRead;

    #[test]
    fn test_event_logging() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        let mut logger = EventLogger::new(&path).unwrap();
        let event = Event::new(MonthStamp(1200), "Lin Chen sets off").with_agents(["avatar_0001"]);
        logger.log(&event).unwrap();
        logger.log_batch(&[Event::new(MonthStamp(1200), "quiet month")]).unwrap();
        logger.flush().unwrap();

        let file = File::open(&path).unwrap();
        let lines: Vec<String> = std::io::BufReader::new(file).lines().map(|l| l.unwrap()).collect();
        assert_eq!(lines.len(), 2);

        let parsed = Event::from_jsonl(&lines[0]).unwrap();
        assert_eq!(parsed.id, event.id);
        assert_eq!(parsed.related_agents, vec!["avatar_0001".to_string()]);
        assert_eq!(logger.event_count(), 2);
    }

    #[test]
    fn test_null_logger() {
        let mut logger = EventLogger::null();
        logger.log(&Event::new(MonthStamp(1), "nothing")).unwrap();
        assert_eq!(logger.event_count(), 1);
    }

    #[test]
    fn test_tick_events_shared_between_clones() {
        let events = TickEvents::new();
        assert!(events.is_empty());

        let handle = events.clone();
        let pusher = std::thread::spawn(move || {
            handle.push(Event::new(MonthStamp(1), "from a task"));
        });
        events.push(Event::new(MonthStamp(1), "from the phase"));
        pusher.join().unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events.drain().len(), 2);
        assert!(events.is_empty());
    }
}
