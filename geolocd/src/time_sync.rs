//! Network time acquisition for GNSS time injection.
//!
//! [`NtpClient::request_time`] performs a single SNTP (RFC 4330) exchange on
//! a dedicated worker thread and reports the result through a callback
//! invoked from that thread. Callers must not assume the callback runs on
//! their own thread.

use std::io;
use std::net::{ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use crate::error::ErrorCode;

/// Default NTP port.
pub const NTP_PORT: u16 = 123;

/// Default exchange timeout.
pub const DEFAULT_NTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970).
const NTP_UNIX_OFFSET_SECS: u64 = 2_208_988_800;

/// Size of an SNTP packet without extensions.
const PACKET_LEN: usize = 48;

/// LI = 0, VN = 3, Mode = 3 (client).
const CLIENT_HEADER: u8 = 0x1B;

/// Time obtained from an NTP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NtpTime {
    /// Server transmit time, milliseconds since the Unix epoch.
    pub unix_ms: i64,
    /// Half the round-trip time, milliseconds.
    pub uncertainty_ms: u32,
}

/// SNTP client that runs each exchange on its own thread.
#[derive(Debug, Clone)]
pub struct NtpClient {
    timeout: Duration,
}

impl Default for NtpClient {
    fn default() -> Self {
        Self::new(DEFAULT_NTP_TIMEOUT)
    }
}

impl NtpClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Query `server` (`host` or `host:port`) and invoke `callback` with the
    /// outcome from the worker thread.
    ///
    /// Fails immediately with `Multithread` if the worker cannot be spawned.
    pub fn request_time<F>(&self, server: &str, callback: F) -> Result<(), ErrorCode>
    where
        F: FnOnce(Result<NtpTime, ErrorCode>) + Send + 'static,
    {
        let server = if server.contains(':') {
            server.to_string()
        } else {
            format!("{}:{}", server, NTP_PORT)
        };
        let timeout = self.timeout;

        std::thread::Builder::new()
            .name("ntp-worker".to_string())
            .spawn(move || {
                let result = query(&server, timeout);
                match &result {
                    Ok(time) => tracing::debug!(
                        server = %server,
                        unix_ms = time.unix_ms,
                        uncertainty_ms = time.uncertainty_ms,
                        "NTP time acquired"
                    ),
                    Err(e) => tracing::warn!(server = %server, error = %e, "NTP request failed"),
                }
                callback(result);
            })
            .map(|_| ())
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to spawn NTP worker");
                ErrorCode::Multithread
            })
    }
}

fn query(server: &str, timeout: Duration) -> Result<NtpTime, ErrorCode> {
    let addr = server
        .to_socket_addrs()
        .map_err(|_| ErrorCode::NetworkError)?
        .next()
        .ok_or(ErrorCode::NetworkError)?;

    let bind = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(bind).map_err(io_error)?;
    socket.set_read_timeout(Some(timeout)).map_err(io_error)?;

    let mut request = [0u8; PACKET_LEN];
    request[0] = CLIENT_HEADER;

    let sent_at = Instant::now();
    socket.send_to(&request, addr).map_err(io_error)?;

    let mut response = [0u8; PACKET_LEN];
    let (len, _) = socket.recv_from(&mut response).map_err(io_error)?;
    let round_trip = sent_at.elapsed();

    let unix_ms = parse_transmit_time(&response[..len])?;
    Ok(NtpTime {
        unix_ms,
        uncertainty_ms: (round_trip.as_millis() / 2).min(u32::MAX as u128) as u32,
    })
}

fn io_error(e: io::Error) -> ErrorCode {
    match e.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => ErrorCode::Timeout,
        _ => ErrorCode::NetworkError,
    }
}

/// Extract the transmit timestamp of an SNTP server reply as Unix milliseconds.
pub fn parse_transmit_time(packet: &[u8]) -> Result<i64, ErrorCode> {
    if packet.len() < PACKET_LEN {
        return Err(ErrorCode::NetworkError);
    }

    // Mode 4 (server) or 5 (broadcast); stratum 0 is a kiss-o'-death.
    let mode = packet[0] & 0x07;
    if !(mode == 4 || mode == 5) || packet[1] == 0 {
        return Err(ErrorCode::NetworkError);
    }

    let seconds = u32::from_be_bytes([packet[40], packet[41], packet[42], packet[43]]) as u64;
    let fraction = u32::from_be_bytes([packet[44], packet[45], packet[46], packet[47]]) as u64;

    let unix_secs = seconds
        .checked_sub(NTP_UNIX_OFFSET_SECS)
        .ok_or(ErrorCode::NetworkError)?;
    let millis = (fraction * 1000) >> 32;

    Ok((unix_secs * 1000 + millis) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn server_packet(unix_secs: u64, fraction: u32) -> [u8; PACKET_LEN] {
        let mut p = [0u8; PACKET_LEN];
        p[0] = 0x24; // LI 0, VN 4, mode 4
        p[1] = 2;
        let ntp_secs = (unix_secs + NTP_UNIX_OFFSET_SECS) as u32;
        p[40..44].copy_from_slice(&ntp_secs.to_be_bytes());
        p[44..48].copy_from_slice(&fraction.to_be_bytes());
        p
    }

    #[test]
    fn test_parse_transmit_time() {
        let packet = server_packet(1_700_000_000, 1 << 31);
        assert_eq!(parse_transmit_time(&packet), Ok(1_700_000_000_500));
    }

    #[test]
    fn test_parse_rejects_short_packet() {
        assert_eq!(parse_transmit_time(&[0u8; 12]), Err(ErrorCode::NetworkError));
    }

    #[test]
    fn test_parse_rejects_client_mode() {
        let mut packet = server_packet(1_700_000_000, 0);
        packet[0] = CLIENT_HEADER;
        assert_eq!(parse_transmit_time(&packet), Err(ErrorCode::NetworkError));
    }

    #[test]
    fn test_parse_rejects_kiss_of_death() {
        let mut packet = server_packet(1_700_000_000, 0);
        packet[1] = 0;
        assert_eq!(parse_transmit_time(&packet), Err(ErrorCode::NetworkError));
    }

    #[test]
    fn test_request_time_against_local_server() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = server.local_addr().unwrap();

        let responder = std::thread::spawn(move || {
            let mut buf = [0u8; PACKET_LEN];
            let (_, peer) = server.recv_from(&mut buf).unwrap();
            assert_eq!(buf[0], CLIENT_HEADER);
            server.send_to(&server_packet(1_700_000_000, 0), peer).unwrap();
        });

        let (tx, rx) = mpsc::channel();
        let caller = std::thread::current().id();
        NtpClient::default()
            .request_time(&addr.to_string(), move |result| {
                tx.send((result, std::thread::current().id())).unwrap();
            })
            .unwrap();

        let (result, callback_thread) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        responder.join().unwrap();

        assert_eq!(result.unwrap().unix_ms, 1_700_000_000_000);
        assert_ne!(callback_thread, caller);
    }

    #[test]
    fn test_request_time_times_out() {
        // Bound but never answers.
        let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = silent.local_addr().unwrap();

        let (tx, rx) = mpsc::channel();
        NtpClient::new(Duration::from_millis(50))
            .request_time(&addr.to_string(), move |result| {
                tx.send(result).unwrap();
            })
            .unwrap();

        let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(result, Err(ErrorCode::Timeout));
    }
}
