use std::fmt;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};

use tracing::{debug, info, info_span};
use uuid::Uuid;

use super::ServerError;
use crate::access::{Interrupt, SharedLog};
use crate::assembly::RecordAssembler;
use crate::config::ServerConfig;
use crate::log::LogError;

/// Identifier attached to every log line of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Serve one client until it hangs up.
///
/// Every completed command is appended, then the whole log is sent back.
pub(crate) fn serve(
    mut stream: TcpStream,
    peer: SocketAddr,
    log: &SharedLog,
    config: &ServerConfig,
    shutdown: &Interrupt,
) -> Result<(), ServerError> {
    let id = ConnectionId::new();
    let span = info_span!("connection", %id, %peer);
    let _entered = span.enter();

    info!("Accepted connection from {peer}");

    let mut assembler = RecordAssembler::new(config.carry_over_remainder);
    let mut buf = recv_buffer(config.recv_buffer_size)?;

    loop {
        let received = match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };

        let records = assembler.push(&buf[..received])?;
        if records.is_empty() {
            debug!(buffered = assembler.pending(), "waiting for terminator");
            continue;
        }

        for record in records {
            if let Some(evicted) = log.append(record, shutdown)? {
                debug!(bytes = evicted.len(), "evicted oldest command");
            }
        }

        let contents = log.snapshot(shutdown)?;
        stream.write_all(&contents)?;
        debug!(bytes = contents.len(), "sent log");
    }

    info!("Closed connection from {peer}");
    Ok(())
}

/// Zeroed receive buffer, reported as exhaustion instead of aborting.
fn recv_buffer(size: usize) -> Result<Vec<u8>, LogError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(size)
        .map_err(|_| LogError::ResourceExhausted { requested: size })?;
    buf.resize(size, 0);
    Ok(buf)
}
