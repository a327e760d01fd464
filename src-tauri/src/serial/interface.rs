use std::io::{self, BufRead, BufReader, Read, Write};
use std::time::Duration;
use serialport::{ClearBuffer, SerialPort, SerialPortType};

use super::{Result, SerialError, SerialDeviceInfo};

pub const BAUD_RATE: u32 = 115200;
pub const READ_TIMEOUT: Duration = Duration::from_secs(2);
/// The dongle resets when the port is opened and needs this long to boot.
pub const BOOT_SETTLE: Duration = Duration::from_secs(2);

/// Parameters used when opening the physical link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    pub baud_rate: u32,
    pub read_timeout: Duration,
    pub boot_settle: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baud_rate: BAUD_RATE,
            read_timeout: READ_TIMEOUT,
            boot_settle: BOOT_SETTLE,
        }
    }
}

/// Line-oriented transport underneath the dongle protocol.
///
/// `read_line` blocks for at most the configured read timeout and reports
/// a timeout as `io::ErrorKind::TimedOut`.
pub trait SerialPortIO: Send {
    fn write_line(&mut self, line: &str) -> io::Result<()>;
    fn read_line(&mut self) -> io::Result<String>;
    fn clear_input(&mut self) -> io::Result<()>;
}

/// Ports that can throw away bytes already received but not yet read.
pub trait DiscardInput {
    fn discard_input(&self) -> io::Result<()>;
}

impl DiscardInput for Box<dyn SerialPort> {
    fn discard_input(&self) -> io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}

/// Newline framing over any byte port.
pub struct SerialLink<T: Read> {
    reader: BufReader<T>,
}

impl<T: Read + Write> SerialLink<T> {
    pub fn new(port: T) -> Self {
        Self { reader: BufReader::new(port) }
    }
}

impl<T> SerialPortIO for SerialLink<T>
where
    T: Read + Write + DiscardInput + Send,
{
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let port = self.reader.get_mut();
        port.write_all(format!("{}\n", line).as_bytes())?;
        port.flush()
    }

    fn read_line(&mut self) -> io::Result<String> {
        let mut raw = Vec::new();
        if self.reader.read_until(b'\n', &mut raw)? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "port closed"));
        }
        Ok(decode_line(&raw))
    }

    fn clear_input(&mut self) -> io::Result<()> {
        let buffered = self.reader.buffer().len();
        self.reader.consume(buffered);
        self.reader.get_ref().discard_input()
    }
}

/// Lossy ASCII decode: invalid bytes are dropped, surrounding whitespace trimmed.
fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .replace(char::REPLACEMENT_CHARACTER, "")
        .trim()
        .to_string()
}

pub struct SerialInterface {
    link: Option<Box<dyn SerialPortIO>>,
    port_name: Option<String>,
}

impl SerialInterface {
    pub fn new() -> Self {
        Self {
            link: None,
            port_name: None,
        }
    }

    /// List every serial port the OS reports
    pub fn discover_ports() -> Result<Vec<SerialDeviceInfo>> {
        let ports = serialport::available_ports()?;
        let devices = ports
            .into_iter()
            .map(|port| match port.port_type {
                SerialPortType::UsbPort(usb_info) => SerialDeviceInfo {
                    port_name: port.port_name,
                    port_type: "USB".to_string(),
                    vid: Some(usb_info.vid),
                    pid: Some(usb_info.pid),
                    serial_number: usb_info.serial_number,
                    manufacturer: usb_info.manufacturer,
                    product: usb_info.product,
                },
                SerialPortType::PciPort => SerialDeviceInfo::named(port.port_name, "PCI"),
                SerialPortType::BluetoothPort => SerialDeviceInfo::named(port.port_name, "Bluetooth"),
                SerialPortType::Unknown => SerialDeviceInfo::named(port.port_name, "Unknown"),
            })
            .collect();

        Ok(devices)
    }

    /// Open a physical port
    pub fn open(&mut self, port_name: &str, config: &LinkConfig) -> Result<()> {
        let port = serialport::new(port_name, config.baud_rate)
            .timeout(config.read_timeout)
            .open()
            .map_err(|e| SerialError::PortUnavailable(format!("{}: {}", port_name, e)))?;

        self.attach(port_name, Box::new(SerialLink::new(port)));
        Ok(())
    }

    /// Adopt an already open transport
    pub fn attach(&mut self, port_name: &str, link: Box<dyn SerialPortIO>) {
        self.link = Some(link);
        self.port_name = Some(port_name.to_string());
        log::info!("Opened serial link on {}", port_name);
    }

    /// Drop the transport, closing the underlying handle
    pub fn close(&mut self) {
        if let Some(port_name) = self.port_name.take() {
            log::info!("Closing serial link on {}", port_name);
        }
        self.link = None;
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    /// Throw away anything the device sent before we asked
    pub fn clear_input(&mut self) -> Result<()> {
        let link = self.link.as_mut()
            .ok_or_else(|| SerialError::ProtocolError("Not connected".to_string()))?;
        link.clear_input().map_err(SerialError::IoError)
    }

    /// Write one line. A failed write is reported as `false`, never raised.
    pub fn send(&mut self, line: &str) -> bool {
        let Some(link) = self.link.as_mut() else {
            return false;
        };

        match link.write_line(line) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Write to {} failed: {}", self.port_name.as_deref().unwrap_or("?"), e);
                false
            }
        }
    }

    /// Read one line. Timeouts and I/O failures yield an empty string.
    pub fn receive(&mut self) -> String {
        let Some(link) = self.link.as_mut() else {
            return String::new();
        };

        match link.read_line() {
            Ok(line) => line,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                log::debug!("Read timed out on {}", self.port_name.as_deref().unwrap_or("?"));
                String::new()
            }
            Err(e) => {
                log::warn!("Read from {} failed: {}", self.port_name.as_deref().unwrap_or("?"), e);
                String::new()
            }
        }
    }
}

impl Default for SerialInterface {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    /// Byte port with canned input that times out once drained
    struct MemoryPort {
        input: Cursor<Vec<u8>>,
        written: Arc<Mutex<Vec<u8>>>,
        fail_writes: bool,
    }

    impl MemoryPort {
        fn new(input: &[u8]) -> (Self, Arc<Mutex<Vec<u8>>>) {
            let written = Arc::new(Mutex::new(Vec::new()));
            let port = Self {
                input: Cursor::new(input.to_vec()),
                written: written.clone(),
                fail_writes: false,
            };
            (port, written)
        }
    }

    impl Read for MemoryPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.input.read(buf)? {
                0 => Err(io::Error::new(io::ErrorKind::TimedOut, "timed out")),
                n => Ok(n),
            }
        }
    }

    impl Write for MemoryPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.fail_writes {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"));
            }
            self.written.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl DiscardInput for MemoryPort {
        fn discard_input(&self) -> io::Result<()> {
            Ok(())
        }
    }

    fn interface_over(port: MemoryPort) -> SerialInterface {
        let mut interface = SerialInterface::new();
        interface.attach("mem0", Box::new(SerialLink::new(port)));
        interface
    }

    #[test]
    fn send_appends_newline() {
        let (port, written) = MemoryPort::new(b"");
        let mut interface = interface_over(port);
        assert!(interface.send("GET_CODE_2"));
        assert_eq!(written.lock().unwrap().as_slice(), b"GET_CODE_2\n");
    }

    #[test]
    fn failed_write_reports_false() {
        let (mut port, _) = MemoryPort::new(b"");
        port.fail_writes = true;
        let mut interface = interface_over(port);
        assert!(!interface.send("CONNECT"));
    }

    #[test]
    fn receive_strips_line_endings() {
        let (port, _) = MemoryPort::new(b"OK\r\nCODE:abc\n");
        let mut interface = interface_over(port);
        assert_eq!(interface.receive(), "OK");
        assert_eq!(interface.receive(), "CODE:abc");
    }

    #[test]
    fn receive_returns_empty_on_timeout() {
        let (port, _) = MemoryPort::new(b"");
        let mut interface = interface_over(port);
        assert_eq!(interface.receive(), "");
    }

    #[test]
    fn invalid_utf8_is_dropped() {
        let (port, _) = MemoryPort::new(b"SA\xffVED\n");
        let mut interface = interface_over(port);
        assert_eq!(interface.receive(), "SAVED");
    }

    #[test]
    fn clear_input_discards_buffered_banner() {
        let (port, _) = MemoryPort::new(b"Dongle Lock Ready\r\nOK\n");
        let mut interface = interface_over(port);
        // Pull the first chunk into the BufReader, then drop what is left of it
        assert_eq!(interface.receive(), "Dongle Lock Ready");
        interface.clear_input().unwrap();
        assert_eq!(interface.receive(), "");
    }

    #[test]
    fn closed_interface_is_inert() {
        let (port, _) = MemoryPort::new(b"OK\n");
        let mut interface = interface_over(port);
        interface.close();
        assert!(!interface.is_connected());
        assert!(!interface.send("CONNECT"));
        assert_eq!(interface.receive(), "");
    }
}
