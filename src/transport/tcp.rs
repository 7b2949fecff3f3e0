use super::{ConnectionConfig, Connector, Session};
use crate::error::TransportError;
use log::{debug, warn};
use std::io::{BufRead, BufReader, Write};
use std::net::{IpAddr, Shutdown, SocketAddr, TcpStream, ToSocketAddrs};

/// Default raw SCPI socket port.
pub const DEFAULT_PORT: u16 = 5025;

/// Opens newline-terminated SCPI sessions over a raw TCP socket.
///
/// Addresses are either a bare host (`192.168.1.50`), which uses the
/// connector's default port, or `host:port`.
///
/// # Examples
/// ```no_run
/// use vna_driver::{Connector, Session, TcpConnector};
///
/// let connector = TcpConnector::default().with_default_port(9001);
/// let mut session = connector.open("192.168.1.50")?;
/// let idn = session.query("*IDN?")?;
/// println!("{idn}");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct TcpConnector {
    config: ConnectionConfig,
    default_port: u16,
    terminator: String,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(ConnectionConfig::default())
    }
}

impl TcpConnector {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            default_port: DEFAULT_PORT,
            terminator: "\n".to_string(),
        }
    }

    /// Port used when an address carries no explicit port
    pub fn with_default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }

    /// Terminator appended to every outgoing command
    pub fn with_terminator(mut self, terminator: &str) -> Self {
        self.terminator = terminator.to_string();
        self
    }

    fn resolve(&self, address: &str) -> Result<SocketAddr, TransportError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(TransportError::InvalidAddress(address.to_string()));
        }

        if let Ok(ip) = address.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, self.default_port));
        }

        let has_port = address
            .rsplit_once(':')
            .is_some_and(|(_, port)| port.parse::<u16>().is_ok());
        let candidate = if has_port {
            address.to_string()
        } else {
            format!("{address}:{}", self.default_port)
        };

        candidate
            .to_socket_addrs()
            .map_err(|_| TransportError::InvalidAddress(address.to_string()))?
            .next()
            .ok_or_else(|| TransportError::InvalidAddress(address.to_string()))
    }
}

impl Connector for TcpConnector {
    type Session = TcpSession;

    fn open(&self, address: &str) -> Result<TcpSession, TransportError> {
        let socket_addr = self.resolve(address)?;

        debug!("Connecting to instrument at {socket_addr}");

        let stream = TcpStream::connect_timeout(&socket_addr, self.config.connect_timeout)
            .map_err(|e| {
                warn!("Failed to connect to {socket_addr}: {e}");
                match e.kind() {
                    std::io::ErrorKind::TimedOut => TransportError::Timeout,
                    std::io::ErrorKind::ConnectionRefused => {
                        TransportError::Unreachable(socket_addr.to_string())
                    }
                    _ => TransportError::io(e, format!("Failed to connect to {socket_addr}")),
                }
            })?;

        stream
            .set_read_timeout(Some(self.config.read_timeout))
            .map_err(|e| TransportError::io(e, "Setting read timeout"))?;
        stream
            .set_write_timeout(Some(self.config.write_timeout))
            .map_err(|e| TransportError::io(e, "Setting write timeout"))?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Could not disable Nagle on {socket_addr}: {e}");
        }

        let reader = stream
            .try_clone()
            .map_err(|e| TransportError::io(e, "Cloning socket for reading"))?;

        debug!("Connected to instrument at {socket_addr}");

        Ok(TcpSession {
            writer: stream,
            reader: BufReader::new(reader),
            terminator: self.terminator.clone(),
            closed: false,
        })
    }
}

/// A live SCPI socket session.
pub struct TcpSession {
    writer: TcpStream,
    reader: BufReader<TcpStream>,
    terminator: String,
    closed: bool,
}

impl TcpSession {
    fn send(&mut self, command: &str) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        debug!(">> {command}");
        let line = format!("{command}{}", self.terminator);
        let result = self
            .writer
            .write_all(line.as_bytes())
            .and_then(|_| self.writer.flush());
        if let Err(e) = result {
            self.poison(command);
            return Err(TransportError::io(e, format!("Writing command {command}")));
        }
        Ok(())
    }

    /// A failed exchange may leave a late reply in flight; close the socket so
    /// it can never be read as the answer to a later query.
    fn poison(&mut self, command: &str) {
        warn!("Exchange for {command} failed, closing instrument socket");
        self.close();
    }
}

impl Session for TcpSession {
    fn query(&mut self, command: &str) -> Result<String, TransportError> {
        self.send(command)?;

        let mut response = String::new();
        match self.reader.read_line(&mut response) {
            Ok(0) => {
                self.close();
                return Err(TransportError::Closed);
            }
            Ok(_) => {}
            Err(e) => {
                self.poison(command);
                return Err(TransportError::io(e, format!("Reading response to {command}")));
            }
        }

        let response = response.trim_end_matches(['\r', '\n']).to_string();
        debug!(
            "<< {} ({} bytes)",
            response.get(..100).unwrap_or(&response),
            response.len()
        );
        Ok(response)
    }

    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        self.send(command)
    }

    fn close(&mut self) {
        if !self.closed {
            let _ = self.writer.shutdown(Shutdown::Both);
            self.closed = true;
            debug!("Instrument socket closed");
        }
    }
}

impl Drop for TcpSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    /// Accepts one client and answers every line with `reply(line)`.
    fn fake_instrument<F>(reply: F) -> (u16, thread::JoinHandle<Vec<String>>)
    where
        F: Fn(&str) -> Option<String> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let mut received = Vec::new();
            for line in BufReader::new(stream).lines() {
                let Ok(line) = line else { break };
                if let Some(answer) = reply(&line) {
                    if writer.write_all(format!("{answer}\r\n").as_bytes()).is_err() {
                        break;
                    }
                }
                received.push(line);
            }
            received
        });
        (port, handle)
    }

    #[test]
    fn test_query_and_write_round_trip() {
        let (port, handle) = fake_instrument(|line| {
            line.ends_with('?')
                .then(|| "\"Anritsu,MS2026C/2,1,V1\"".to_string())
        });

        let connector = TcpConnector::default();
        let mut session = connector.open(&format!("127.0.0.1:{port}")).unwrap();
        session.write(":SENS:FREQ:STAR 1000").unwrap();
        let idn = session.query("*IDN?").unwrap();
        assert_eq!(idn, "\"Anritsu,MS2026C/2,1,V1\"");
        session.close();

        let received = handle.join().unwrap();
        assert_eq!(received, vec![":SENS:FREQ:STAR 1000", "*IDN?"]);
    }

    #[test]
    fn test_bare_host_uses_default_port() {
        let (port, handle) = fake_instrument(|_| Some("1".to_string()));

        let connector = TcpConnector::default().with_default_port(port);
        let mut session = connector.open("127.0.0.1").unwrap();
        assert_eq!(session.query(":SENS:CORR:COLL:STAT:ACC?").unwrap(), "1");
        drop(session);

        handle.join().unwrap();
    }

    #[test]
    fn test_refused_connection_is_an_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let connector = TcpConnector::new(ConnectionConfig {
            connect_timeout: Duration::from_millis(500),
            ..ConnectionConfig::default()
        });
        assert!(connector.open(&format!("127.0.0.1:{port}")).is_err());
    }

    #[test]
    fn test_empty_address_is_invalid() {
        let connector = TcpConnector::default();
        assert!(matches!(
            connector.open("  "),
            Err(TransportError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_closed_session_rejects_commands() {
        let (port, handle) = fake_instrument(|_| None);
        let mut session = TcpConnector::default()
            .open(&format!("127.0.0.1:{port}"))
            .unwrap();
        session.close();
        session.close();
        assert!(matches!(
            session.write("*CLS"),
            Err(TransportError::Closed)
        ));
        handle.join().unwrap();
    }

    #[test]
    fn test_silent_instrument_times_out() {
        let (port, _handle) = fake_instrument(|_| None);
        let connector = TcpConnector::new(ConnectionConfig {
            read_timeout: Duration::from_millis(100),
            ..ConnectionConfig::default()
        });
        let mut session = connector.open(&format!("127.0.0.1:{port}")).unwrap();
        assert!(matches!(
            session.query("*IDN?"),
            Err(TransportError::Timeout)
        ));
    }

    #[test]
    fn test_late_reply_is_never_read_as_next_answer() {
        let (port, handle) = fake_instrument(|line| match line {
            "*IDN?" => {
                thread::sleep(Duration::from_millis(300));
                Some("\"Anritsu,MS2026C/2,1,V1\"".to_string())
            }
            ":SENS:CORR:COLL:STAT:ACC?" => Some("4".to_string()),
            _ => None,
        });
        let connector = TcpConnector::new(ConnectionConfig {
            read_timeout: Duration::from_millis(100),
            ..ConnectionConfig::default()
        });
        let mut session = connector.open(&format!("127.0.0.1:{port}")).unwrap();

        assert!(matches!(
            session.query("*IDN?"),
            Err(TransportError::Timeout)
        ));
        assert!(matches!(
            session.query(":SENS:CORR:COLL:STAT:ACC?"),
            Err(TransportError::Closed)
        ));
        assert!(matches!(
            session.write(":SENS:SWE:POIN 10"),
            Err(TransportError::Closed)
        ));

        let received = handle.join().unwrap();
        assert_eq!(received, vec!["*IDN?"]);
    }

    #[test]
    fn test_custom_terminator_is_appended() {
        let (port, handle) = fake_instrument(|_| None);
        let mut session = TcpConnector::default()
            .with_terminator(";\n")
            .open(&format!("127.0.0.1:{port}"))
            .unwrap();
        session.write("*CLS").unwrap();
        session.close();

        assert_eq!(handle.join().unwrap(), vec!["*CLS;"]);
    }

    #[test]
    fn test_instrument_hangup_closes_session() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut line = String::new();
            BufReader::new(stream).read_line(&mut line).unwrap();
        });

        let mut session = TcpConnector::default()
            .open(&format!("127.0.0.1:{port}"))
            .unwrap();
        assert!(matches!(
            session.query("*IDN?"),
            Err(TransportError::Closed)
        ));
        assert!(matches!(
            session.query("*IDN?"),
            Err(TransportError::Closed)
        ));
        handle.join().unwrap();
    }
}
