//! TCP client for cooperating applications.
//!
//! Applications that opt in expose a fixed-record request/reply endpoint:
//! a 2-byte command selects PERF (report request count and tail latency
//! since the last reset) or RESET (zero the statistics). The wire format
//! is little-endian. Connections outlive ticks; an application that is
//! down is retried once per tick and merely logged.

mod wire;

pub use wire::{AppReply, Command, ReplyCode, REPLY_BYTES, REQUEST_BYTES};

use std::io::{Read, Write};
use std::net::TcpStream;
use tracing::{info, warn};

/// Error type for application sampling. Once a connection is established,
/// I/O failures and a rejected RESET are fatal; failure to connect is not.
#[derive(Debug)]
pub enum AppError {
    Io {
        endpoint: String,
        source: std::io::Error,
    },
    /// The application answered a RESET with an ERROR code.
    ResetRejected { endpoint: String },
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Io { endpoint, source } => {
                write!(f, "application {endpoint}: {source}")
            }
            AppError::ResetRejected { endpoint } => {
                write!(f, "application {endpoint} rejected a reset")
            }
        }
    }
}

impl std::error::Error for AppError {}

/// One sample reported by an application over a window.
#[derive(Debug, Clone, PartialEq)]
pub struct AppSample {
    pub label: String,
    pub num_requests: u64,
    pub tail_latency_us: f64,
}

struct Application {
    label: String,
    hostname: String,
    port: u16,
    stream: Option<TcpStream>,
}

impl Application {
    fn endpoint(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

/// Client for every configured application.
pub struct AppClient {
    applications: Vec<Application>,
}

impl AppClient {
    /// Connects to each endpoint and sends the initial RESET so the first
    /// window starts from zero. Unreachable endpoints are logged and
    /// retried each tick; a rejected RESET is fatal.
    pub fn connect(endpoints: &[(String, String, u16)]) -> Result<Self, AppError> {
        let mut applications = Vec::with_capacity(endpoints.len());
        for (label, hostname, port) in endpoints {
            let mut application = Application {
                label: label.clone(),
                hostname: hostname.clone(),
                port: *port,
                stream: None,
            };
            Self::try_connect(&mut application)?;
            applications.push(application);
        }
        Ok(Self { applications })
    }

    /// Number of configured applications.
    pub fn len(&self) -> usize {
        self.applications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applications.is_empty()
    }

    fn try_connect(application: &mut Application) -> Result<(), AppError> {
        let endpoint = application.endpoint();
        match TcpStream::connect((application.hostname.as_str(), application.port)) {
            Ok(mut stream) => {
                info!("connected to application {endpoint}");
                // Zero the statistics so the first PERF covers one window.
                let reply = Self::exchange(&mut stream, &endpoint, Command::Reset)?;
                if reply.code == ReplyCode::Error {
                    return Err(AppError::ResetRejected { endpoint });
                }
                application.stream = Some(stream);
                Ok(())
            }
            Err(e) => {
                warn!("cannot connect to application {endpoint}: {e}");
                application.stream = None;
                Ok(())
            }
        }
    }

    /// One request/reply round trip on an established connection.
    fn exchange(
        stream: &mut TcpStream,
        endpoint: &str,
        command: Command,
    ) -> Result<AppReply, AppError> {
        let io_err = |source| AppError::Io {
            endpoint: endpoint.to_string(),
            source,
        };

        stream.write_all(&command.encode()).map_err(io_err)?;
        let mut buf = [0u8; REPLY_BYTES];
        stream.read_exact(&mut buf).map_err(io_err)?;
        Ok(AppReply::decode(&buf))
    }

    /// Per-tick sampling: each connected application is asked for its
    /// window statistics and then reset; disconnected ones get a single
    /// reconnect attempt. Returns one sample per application that
    /// answered.
    pub fn sample(&mut self) -> Result<Vec<AppSample>, AppError> {
        let mut samples = Vec::new();

        for application in &mut self.applications {
            if application.stream.is_none() {
                Self::try_connect(application)?;
            }

            let endpoint = application.endpoint();
            let Some(stream) = application.stream.as_mut() else {
                continue;
            };

            let perf = Self::exchange(stream, &endpoint, Command::Perf)?;
            if perf.code == ReplyCode::Error {
                warn!("application {endpoint} reported an error for this window");
            } else {
                samples.push(AppSample {
                    label: application.label.clone(),
                    num_requests: perf.num_requests,
                    tail_latency_us: perf.tail_latency_us,
                });
            }

            let reset = Self::exchange(stream, &endpoint, Command::Reset)?;
            if reset.code == ReplyCode::Error {
                return Err(AppError::ResetRejected { endpoint });
            }
        }

        Ok(samples)
    }

    /// Closes every live connection.
    pub fn shutdown(&mut self) {
        for application in &mut self.applications {
            if application.stream.take().is_some() {
                info!("disconnected from application {}", application.endpoint());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    /// Minimal cooperating application: answers `replies` requests with a
    /// SUCCESS reply carrying fixed statistics, then exits.
    fn spawn_app(replies: u64, num_requests: u64, tail_latency_us: f64) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            for _ in 0..replies {
                let mut request = [0u8; REQUEST_BYTES];
                if stream.read_exact(&mut request).is_err() {
                    return;
                }
                let reply = AppReply {
                    code: ReplyCode::Success,
                    num_requests,
                    tail_latency_us,
                };
                stream.write_all(&reply.encode()).unwrap();
            }
        });

        port
    }

    #[test]
    fn connect_sample_and_reset() {
        // Initial RESET plus PERF+RESET per tick: 3 exchanges.
        let port = spawn_app(3, 1234, 870.5);

        let endpoints = vec![("web".to_string(), "127.0.0.1".to_string(), port)];
        let mut client = AppClient::connect(&endpoints).unwrap();

        let samples = client.sample().unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].label, "web");
        assert_eq!(samples[0].num_requests, 1234);
        assert!((samples[0].tail_latency_us - 870.5).abs() < 1e-9);

        client.shutdown();
    }

    #[test]
    fn unreachable_application_is_tolerated() {
        // Bind then drop to get a port nothing listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let endpoints = vec![("down".to_string(), "127.0.0.1".to_string(), port)];
        let mut client = AppClient::connect(&endpoints).unwrap();

        // Reconnect fails again; the tick continues with no sample.
        let samples = client.sample().unwrap();
        assert!(samples.is_empty());
    }
}
