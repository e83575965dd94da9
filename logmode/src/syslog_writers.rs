use std::{
    fmt, io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs},
    sync::{Mutex, PoisonError},
};

use logmode_core::{Writer, WriterFactory, writer_factory};
use syslog::{Facility, Formatter3164, Logger, LoggerBackend};

/// Facility of every message sent by [`SyslogWriter`]. The severity is
/// always `info`, giving priority `LOG_INFO | LOG_LOCAL2` (150).
pub const SYSLOG_FACILITY: Facility = Facility::LOG_LOCAL2;

type SyslogLogger = Logger<LoggerBackend, Formatter3164>;

/// Sends each record as one RFC 3164 message to a local or remote syslog
/// daemon. One write at a time goes through the connection. A trailing
/// newline in the record is dropped, syslog frames messages itself.
pub struct SyslogWriter {
    tag: String,
    logger: Mutex<Option<SyslogLogger>>,
}

fn formatter(tag: &str) -> Formatter3164 {
    Formatter3164 {
        facility: SYSLOG_FACILITY,
        hostname: None,
        process: tag.into(),
        pid: std::process::id(),
    }
}

fn syslog_error(err: impl fmt::Display) -> io::Error {
    io::Error::other(err.to_string())
}

fn resolve<A: ToSocketAddrs>(addr: A) -> io::Result<SocketAddr> {
    addr.to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "syslog address resolved to nothing",
        )
    })
}

impl SyslogWriter {
    /// Connects to the local daemon through its unix socket.
    #[cfg(unix)]
    pub fn local(tag: &str) -> io::Result<Self> {
        let logger = syslog::unix(formatter(tag)).map_err(syslog_error)?;
        Ok(Self::with_logger(tag, logger))
    }

    pub fn udp<A: ToSocketAddrs>(tag: &str, server: A) -> io::Result<Self> {
        let server = resolve(server)?;
        let local = if server.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let logger = syslog::udp(formatter(tag), local, server).map_err(syslog_error)?;
        Ok(Self::with_logger(tag, logger))
    }

    pub fn tcp<A: ToSocketAddrs>(tag: &str, server: A) -> io::Result<Self> {
        let server = resolve(server)?;
        let logger = syslog::tcp(formatter(tag), server).map_err(syslog_error)?;
        Ok(Self::with_logger(tag, logger))
    }

    fn with_logger(tag: &str, logger: SyslogLogger) -> Self {
        Self {
            tag: tag.into(),
            logger: Mutex::new(Some(logger)),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl Writer for SyslogWriter {
    fn write_record(&self, buf: &[u8]) -> io::Result<()> {
        let message = String::from_utf8_lossy(buf);
        let message = message.trim_end_matches('\n');
        let mut logger = self.logger.lock().unwrap_or_else(PoisonError::into_inner);
        match logger.as_mut() {
            Some(logger) => logger.info(message).map_err(syslog_error),
            None => Err(io::Error::other(format!(
                "syslog writer {} is closed",
                self.tag
            ))),
        }
    }

    fn release(&self) -> io::Result<()> {
        self.logger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }
}

impl fmt::Debug for SyslogWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyslogWriter")
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

/// Tag of the messages sent by the factories: the executable name.
fn process_tag() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "logmode".into())
}

/// Connects to the local syslog daemon each time the factory runs.
#[cfg(unix)]
pub fn syslog_writer() -> WriterFactory {
    writer_factory(|| Ok(SyslogWriter::local(&process_tag())?))
}

/// Sends to `addr` (`host:port`) over UDP.
pub fn udp_syslog_writer<S: Into<String>>(addr: S) -> WriterFactory {
    let addr = addr.into();
    writer_factory(move || Ok(SyslogWriter::udp(&process_tag(), addr.as_str())?))
}

/// Sends to `addr` (`host:port`) over TCP. A new connection is opened each
/// time the factory runs, so a reload reconnects.
pub fn tcp_syslog_writer<S: Into<String>>(addr: S) -> WriterFactory {
    let addr = addr.into();
    writer_factory(move || Ok(SyslogWriter::tcp(&process_tag(), addr.as_str())?))
}

#[cfg(test)]
mod tests {
    use std::{
        io::Read,
        net::{TcpListener, UdpSocket},
        time::Duration,
    };

    use super::*;

    fn udp_server() -> UdpSocket {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        server
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        server
    }

    fn receive(server: &UdpSocket) -> String {
        let mut buf = [0u8; 2048];
        let (n, _) = server.recv_from(&mut buf).unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    #[test]
    fn test_udp_syslog_sends_rfc3164_message() {
        let server = udp_server();
        let writer = SyslogWriter::udp("logmode-test", server.local_addr().unwrap()).unwrap();
        writer.write_record(b"level=AUDIT msg=login\n").unwrap();
        let message = receive(&server);
        assert!(message.starts_with("<150>"), "{message}");
        let body = format!("logmode-test[{}]: level=AUDIT msg=login", std::process::id());
        assert!(message.trim_end().ends_with(&body), "{message}");
    }

    #[test]
    fn test_udp_syslog_one_message_per_record() {
        let server = udp_server();
        let writer = SyslogWriter::udp("logmode-test", server.local_addr().unwrap()).unwrap();
        writer.write_record(b"first\n").unwrap();
        writer.write_record(b"second\n").unwrap();
        assert!(receive(&server).trim_end().ends_with(": first"));
        assert!(receive(&server).trim_end().ends_with(": second"));
    }

    #[test]
    fn test_syslog_writer_closed_after_release() {
        let server = udp_server();
        let writer = SyslogWriter::udp("logmode-test", server.local_addr().unwrap()).unwrap();
        writer.release().unwrap();
        assert!(writer.write_record(b"late\n").is_err());
    }

    #[test]
    fn test_udp_syslog_factory() {
        let server = udp_server();
        let factory = udp_syslog_writer(server.local_addr().unwrap().to_string());
        let writer = factory().unwrap();
        writer.write_record(b"from factory\n").unwrap();
        let message = receive(&server);
        assert!(message.starts_with("<150>"), "{message}");
        assert!(message.contains(": from factory"), "{message}");
    }

    #[test]
    fn test_tcp_syslog_sends_rfc3164_message() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let writer = SyslogWriter::tcp("logmode-test", listener.local_addr().unwrap()).unwrap();
        writer.write_record(b"msg=over tcp\n").unwrap();
        let (mut stream, _) = listener.accept().unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut received = String::new();
        let mut buf = [0u8; 2048];
        while !received.contains("msg=over tcp") {
            let n = stream.read(&mut buf).unwrap();
            assert!(n > 0, "connection closed after {received:?}");
            received.push_str(&String::from_utf8_lossy(&buf[..n]));
        }
        assert!(received.starts_with("<150>"), "{received}");
        assert!(received.contains("logmode-test["), "{received}");
    }

    #[test]
    fn test_unresolvable_address_fails_factory() {
        assert!(udp_syslog_writer("not an address")().is_err());
        assert!(tcp_syslog_writer("")().is_err());
    }
}
