use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use tracing::{debug, warn};

use crate::access::{Interrupt, SharedLog};
use crate::log::{LogError, Record};

const TIMESTAMP_FORMAT: &str = "timestamp:%Y %b %d %H:%M:%S\n";

/// Command recording the given wall-clock time.
pub fn timestamp_record<Tz: TimeZone>(now: &DateTime<Tz>) -> Record
where
    Tz::Offset: std::fmt::Display,
{
    Record::from(now.format(TIMESTAMP_FORMAT).to_string().as_str())
}

/// Append a timestamp now and then once per `interval` until `shutdown` fires.
pub(crate) fn spawn(
    log: Arc<SharedLog>,
    interval: Duration,
    shutdown: Interrupt,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("timestamp".into())
        .spawn(move || loop {
            match log.append(timestamp_record(&Local::now()), &shutdown) {
                Ok(_) => debug!("appended timestamp"),
                Err(LogError::Interrupted) => break,
                Err(e) => warn!(error = %e, "failed to append timestamp"),
            }

            if shutdown.wait_timeout(interval) {
                break;
            }
        })
}
