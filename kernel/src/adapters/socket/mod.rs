// Socket Server Adapter
//
// TCP front end over the shared command log. One thread per connection;
// each completed command is appended and the whole log echoed back.

mod connection;
mod timestamp;

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{info, warn};

use crate::access::{Interrupt, SharedLog};
use crate::config::ServerConfig;
use crate::log::LogError;

pub use connection::ConnectionId;
pub use timestamp::timestamp_record;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("socket error: {0}")]
    Io(#[from] io::Error),

    #[error("log error: {0}")]
    Log(#[from] LogError),
}

/// Bound listener plus everything its connections share.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    log: Arc<SharedLog>,
    shutdown: Interrupt,
}

/// Stops a running `Server` from another thread.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    shutdown: Interrupt,
    wake_addr: SocketAddr,
}

struct Worker {
    thread: JoinHandle<()>,
    stream: TcpStream,
}

impl Server {
    pub fn bind(config: ServerConfig, log: Arc<SharedLog>) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.socket_addr())?;
        info!(addr = %listener.local_addr()?, "listening");

        Ok(Self {
            listener,
            config,
            log,
            shutdown: Interrupt::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn shutdown_handle(&self) -> Result<ShutdownHandle, ServerError> {
        let mut wake_addr = self.local_addr()?;
        match wake_addr.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => wake_addr.set_ip(Ipv4Addr::LOCALHOST.into()),
            IpAddr::V6(ip) if ip.is_unspecified() => wake_addr.set_ip(Ipv6Addr::LOCALHOST.into()),
            _ => {}
        }

        Ok(ShutdownHandle {
            shutdown: self.shutdown.clone(),
            wake_addr,
        })
    }

    /// Accept connections until shut down, then close every client and
    /// wait for its thread.
    pub fn run(self) -> Result<(), ServerError> {
        let stamper = match self.config.timestamp_interval_secs {
            Some(secs) => Some(timestamp::spawn(
                Arc::clone(&self.log),
                Duration::from_secs(secs),
                self.shutdown.clone(),
            )?),
            None => None,
        };

        let mut workers: Vec<Worker> = Vec::new();

        for incoming in self.listener.incoming() {
            if self.shutdown.is_fired() {
                break;
            }

            let stream = match incoming {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            };

            match self.spawn_worker(stream) {
                Ok(worker) => workers.push(worker),
                Err(e) => warn!(error = %e, "failed to start connection thread"),
            }

            workers = reap_finished(workers);
        }

        info!(open = workers.len(), "shutting down");
        for worker in workers {
            let _ = worker.stream.shutdown(Shutdown::Both);
            if worker.thread.join().is_err() {
                warn!("connection thread panicked");
            }
        }

        if let Some(stamper) = stamper {
            if stamper.join().is_err() {
                warn!("timestamp thread panicked");
            }
        }

        Ok(())
    }

    fn spawn_worker(&self, stream: TcpStream) -> Result<Worker, ServerError> {
        let peer = stream.peer_addr()?;
        let control = stream.try_clone()?;

        let log = Arc::clone(&self.log);
        let config = self.config.clone();
        let shutdown = self.shutdown.clone();

        let thread = thread::Builder::new()
            .name(format!("conn-{peer}"))
            .spawn(move || {
                if let Err(e) = connection::serve(stream, peer, &log, &config, &shutdown) {
                    warn!(%peer, error = %e, "connection ended with error");
                }
            })?;

        Ok(Worker {
            thread,
            stream: control,
        })
    }
}

fn reap_finished(workers: Vec<Worker>) -> Vec<Worker> {
    let (finished, running): (Vec<_>, Vec<_>) =
        workers.into_iter().partition(|w| w.thread.is_finished());

    for worker in finished {
        if worker.thread.join().is_err() {
            warn!("connection thread panicked");
        }
    }
    running
}

impl ShutdownHandle {
    /// Abort lock waits, stop accepting, and close open connections.
    pub fn shutdown(&self) {
        self.shutdown.fire();
        // Unblock `accept`.
        let _ = TcpStream::connect_timeout(&self.wake_addr, Duration::from_secs(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    fn start(
        config: ServerConfig,
        capacity: usize,
    ) -> (Arc<SharedLog>, SocketAddr, ShutdownHandle, JoinHandle<()>) {
        let log = Arc::new(SharedLog::with_capacity(capacity).unwrap());
        let config = ServerConfig {
            bind_address: "127.0.0.1".into(),
            port: 0,
            ..config
        };

        let server = Server::bind(config, Arc::clone(&log)).unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.shutdown_handle().unwrap();
        let thread = thread::spawn(move || server.run().unwrap());

        (log, addr, handle, thread)
    }

    fn expect_reply(stream: &mut TcpStream, expected: &[u8]) {
        let mut buf = vec![0u8; expected.len()];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(buf, expected);
    }

    #[test]
    fn echoes_whole_log_after_each_command() {
        let (_log, addr, handle, server) = start(ServerConfig::default(), 10);

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(b"abcdefg\n").unwrap();
        expect_reply(&mut client, b"abcdefg\n");

        client.write_all(b"hij").unwrap();
        client.write_all(b"klm\n").unwrap();
        expect_reply(&mut client, b"abcdefg\nhijklm\n");
        drop(client);

        let mut second = TcpStream::connect(addr).unwrap();
        second.write_all(b"nop\n").unwrap();
        expect_reply(&mut second, b"abcdefg\nhijklm\nnop\n");
        drop(second);

        handle.shutdown();
        server.join().unwrap();
    }

    #[test]
    fn eviction_is_visible_to_clients() {
        let (log, addr, handle, server) = start(ServerConfig::default(), 2);

        let mut client = TcpStream::connect(addr).unwrap();
        let exchanges: [(&[u8], &[u8]); 3] = [
            (b"1\n", b"1\n"),
            (b"2\n", b"1\n2\n"),
            (b"3\n", b"2\n3\n"),
        ];
        for (cmd, expected) in exchanges {
            client.write_all(cmd).unwrap();
            expect_reply(&mut client, expected);
        }
        drop(client);

        handle.shutdown();
        server.join().unwrap();
        assert_eq!(log.snapshot(&Interrupt::new()).unwrap(), b"2\n3\n");
    }

    #[test]
    fn remainder_dropped_when_carry_over_disabled() {
        let config = ServerConfig {
            carry_over_remainder: false,
            ..ServerConfig::default()
        };
        let (log, addr, handle, server) = start(config, 10);

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(b"kept\ndropped").unwrap();
        expect_reply(&mut client, b"kept\n");
        drop(client);

        handle.shutdown();
        server.join().unwrap();
        assert_eq!(log.snapshot(&Interrupt::new()).unwrap(), b"kept\n");
    }

    #[test]
    fn shutdown_closes_idle_connections() {
        let (_log, addr, handle, server) = start(ServerConfig::default(), 10);

        let mut idle = TcpStream::connect(addr).unwrap();
        idle.write_all(b"ping\n").unwrap();
        expect_reply(&mut idle, b"ping\n");

        handle.shutdown();
        server.join().unwrap();

        let mut rest = Vec::new();
        assert_eq!(idle.read_to_end(&mut rest).unwrap_or(0), 0);
    }
}
