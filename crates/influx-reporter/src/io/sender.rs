//! Bounded retry queue in front of an [`InfluxDbWriter`].

use std::collections::VecDeque;

use crate::measurement::Measurement;

use super::InfluxDbWriter;

pub const DEFAULT_QUEUE_SIZE: usize = 5000;

/// Queues measurements and delivers them in one payload per flush.
///
/// Undelivered measurements stay queued for the next flush; once the queue is
/// full the oldest ones are evicted first.
#[derive(Debug)]
pub struct Sender<W> {
    writer: W,
    queue: VecDeque<Measurement>,
    capacity: usize,
}

impl<W: InfluxDbWriter> Sender<W> {
    pub fn new(writer: W, capacity: usize) -> Self {
        Self {
            writer,
            queue: VecDeque::with_capacity(capacity.min(DEFAULT_QUEUE_SIZE)),
            capacity,
        }
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Number of measurements waiting for delivery.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Queues `measurements` and tries to deliver everything queued.
    ///
    /// Returns whether the queue was flushed; failures are logged, never raised.
    pub fn send(&mut self, measurements: impl IntoIterator<Item = Measurement>) -> bool {
        for measurement in measurements {
            self.queue.push_back(measurement);
            if self.queue.len() > self.capacity {
                self.queue.pop_front();
            }
        }
        self.flush()
    }

    /// Delivers the queued measurements as one newline-terminated payload.
    pub fn flush(&mut self) -> bool {
        if self.queue.is_empty() {
            return true;
        }

        let payload = self.payload();
        match self.writer.write_bytes(payload.as_bytes()) {
            Ok(()) => {
                tracing::debug!(
                    measurements = self.queue.len(),
                    bytes = payload.len(),
                    "Sent measurements to InfluxDB"
                );
                self.queue.clear();
                true
            }
            Err(report) => {
                tracing::warn!(
                    queued = self.queue.len(),
                    error = ?report,
                    "Failed to send measurements to InfluxDB"
                );
                if let Err(report) = self.writer.close() {
                    tracing::warn!(error = ?report, "Failed to close InfluxDB writer");
                }
                if self.queue.len() >= self.capacity {
                    tracing::warn!(
                        capacity = self.capacity,
                        "Measurement queue is full, oldest measurements are being dropped"
                    );
                }
                false
            }
        }
    }

    fn payload(&self) -> String {
        let mut payload = String::new();
        for measurement in &self.queue {
            payload.push_str(&measurement.to_line());
            payload.push('\n');
        }
        payload
    }
}

#[cfg(test)]
mod tests {
    use error_stack::Report;
    use indexmap::IndexMap;
    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;
    use crate::io::WriterError;

    #[derive(Debug, Default)]
    struct RecordingWriter {
        fail: bool,
        fail_close: bool,
        writes: Vec<String>,
        closes: usize,
    }

    impl InfluxDbWriter for RecordingWriter {
        fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Report<WriterError>> {
            if self.fail {
                return Err(Report::new(WriterError::Write {
                    endpoint: "test".to_string(),
                }));
            }
            self.writes.push(String::from_utf8_lossy(bytes).into_owned());
            Ok(())
        }

        fn close(&mut self) -> Result<(), Report<WriterError>> {
            self.closes += 1;
            if self.fail_close {
                return Err(Report::new(WriterError::Close));
            }
            Ok(())
        }
    }

    fn measurement(value: i64) -> Measurement {
        Measurement::new(
            "Measurement",
            IndexMap::new(),
            IndexMap::from([("val".to_string(), format!("{value}i"))]),
            1,
        )
        .unwrap()
    }

    fn failing() -> RecordingWriter {
        RecordingWriter {
            fail: true,
            ..Default::default()
        }
    }

    #[test]
    fn successful_send_clears_queue() {
        let mut sender = Sender::new(RecordingWriter::default(), DEFAULT_QUEUE_SIZE);

        assert!(sender.send([measurement(1), measurement(2)]));
        assert_eq!(sender.queued(), 0);
        assert_eq!(
            sender.writer().writes,
            vec!["Measurement val=1i 1000000\nMeasurement val=2i 1000000\n".to_string()]
        );
    }

    #[test]
    fn failed_send_keeps_records_and_closes_writer() {
        let mut sender = Sender::new(failing(), DEFAULT_QUEUE_SIZE);

        assert!(!sender.send([measurement(1), measurement(2)]));
        assert_eq!(sender.queued(), 2);
        assert_eq!(sender.writer().closes, 1);
    }

    #[test]
    fn failed_close_is_tolerated() {
        let writer = RecordingWriter {
            fail: true,
            fail_close: true,
            ..Default::default()
        };
        let mut sender = Sender::new(writer, DEFAULT_QUEUE_SIZE);

        assert!(!sender.send([measurement(1)]));
        assert_eq!(sender.queued(), 1);
    }

    #[test]
    fn queued_records_are_retried_first() {
        let mut sender = Sender::new(failing(), DEFAULT_QUEUE_SIZE);
        assert!(!sender.send([measurement(1)]));

        sender.writer.fail = false;
        assert!(sender.send([measurement(2)]));

        assert_eq!(
            sender.writer().writes,
            vec!["Measurement val=1i 1000000\nMeasurement val=2i 1000000\n".to_string()]
        );
        assert_eq!(sender.queued(), 0);
    }

    #[test]
    fn full_queue_evicts_oldest() {
        let mut sender = Sender::new(failing(), 2);

        assert!(!sender.send([measurement(1), measurement(2), measurement(3)]));
        assert_eq!(sender.queued(), 2);

        sender.writer.fail = false;
        assert!(sender.flush());
        assert_eq!(
            sender.writer().writes,
            vec!["Measurement val=2i 1000000\nMeasurement val=3i 1000000\n".to_string()]
        );
    }

    #[test]
    fn zero_capacity_discards_everything() {
        let mut sender = Sender::new(RecordingWriter::default(), 0);

        assert!(sender.send([measurement(1)]));
        assert_eq!(sender.queued(), 0);
        assert!(sender.writer().writes.is_empty());
    }

    #[test]
    fn empty_flush_succeeds_without_writing() {
        let mut sender = Sender::new(failing(), DEFAULT_QUEUE_SIZE);

        assert!(sender.send([]));
        assert_eq!(sender.writer().closes, 0);
    }
}
