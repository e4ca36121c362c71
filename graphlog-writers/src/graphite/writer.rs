use super::factory::GraphiteLog;
use graphlog_core::{ErrorKind, LogRecord};
use graphlog_module::LogWriter;
use graphlog_observability::{CarbonClient, Outcome};
use std::io;
use tracing::info;

/// HTTP status a record must carry to produce a data point.
const FORWARDED_STATUS: u16 = 200;

/// One open connection to carbon, fed one serialized record per write.
///
/// `write` never fails: every problem is sent to the reporter and the whole
/// buffer is reported as consumed, so a bad record cannot stall the log
/// stream.
#[derive(Debug)]
pub struct GraphiteWriter {
    log: GraphiteLog,
    client: CarbonClient,
}

impl GraphiteWriter {
    pub(crate) fn new(log: GraphiteLog, client: CarbonClient) -> Self {
        Self { log, client }
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    /// Decode, filter, enrich, render and send one record.
    pub fn process(&mut self, buf: &[u8]) -> Outcome {
        let mut record = match LogRecord::from_slice(buf) {
            Ok(record) => record,
            Err(e) => {
                self.log.reporter().report(ErrorKind::Decode, &e.to_string());
                self.log.metrics().record(Outcome::DecodeError, 0);
                return Outcome::DecodeError;
            }
        };

        if record.status != FORWARDED_STATUS {
            self.log.metrics().record(Outcome::SkippedStatus, record.status);
            return Outcome::SkippedStatus;
        }
        if !self.log.allows_method(&record.request.method) {
            self.log.metrics().record(Outcome::SkippedMethod, record.status);
            return Outcome::SkippedMethod;
        }

        record.derive_names();
        let path = self.log.render_path(&record);
        let value = self.log.render_value(&record);

        info!(path = %path, value = %value, "Writing value to carbon");
        self.send(&path, &value);
        self.log.metrics().record(Outcome::Emitted, record.status);
        Outcome::Emitted
    }

    /// Send one data point; failures are reported and dropped.
    pub fn send(&mut self, path: &str, value: &str) {
        if let Err(e) = self.client.send(path, value) {
            self.log.reporter().report(ErrorKind::Transport, &e.to_string());
            self.log.metrics().transport_error();
        }
    }
}

impl io::Write for GraphiteWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.process(buf);
        Ok(buf.len())
    }

    // Every point is flushed as it is sent.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogWriter for GraphiteWriter {
    fn close(&mut self) -> io::Result<()> {
        if let Err(e) = self.client.close() {
            self.log.reporter().report(ErrorKind::Transport, &e.to_string());
        }
        Ok(())
    }
}
