use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::{Result, SerialError, SerialInterface, SerialPortIO, LinkConfig};

/// Number of code slots on the dongle
pub const MAX_SLOTS: u8 = 3;
/// Firmware keeps 50-byte NUL terminated strings per slot
pub const MAX_CODE_LENGTH: usize = 49;

/// A code slot, numbered from 1 as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Slot(u8);

impl Slot {
    pub fn new(number: u8) -> Result<Self> {
        if (1..=MAX_SLOTS).contains(&number) {
            Ok(Self(number))
        } else {
            Err(SerialError::InvalidSlot(number))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn all() -> impl Iterator<Item = Slot> {
        (1..=MAX_SLOTS).map(Slot)
    }

    pub(crate) fn index(self) -> usize {
        usize::from(self.0 - 1)
    }
}

impl TryFrom<u8> for Slot {
    type Error = SerialError;

    fn try_from(number: u8) -> Result<Self> {
        Slot::new(number)
    }
}

impl From<Slot> for u8 {
    fn from(slot: Slot) -> u8 {
        slot.0
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Secret code text. Wiped on drop and never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct CodeValue(Zeroizing<String>);

impl CodeValue {
    /// Validate a code typed by the user before it is sent to the dongle
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = Zeroizing::new(value.into());

        if value.is_empty() {
            return Err(SerialError::InvalidCode("code is empty".to_string()));
        }
        if value.len() > MAX_CODE_LENGTH {
            return Err(SerialError::InvalidCode(format!(
                "code is longer than {} characters",
                MAX_CODE_LENGTH
            )));
        }
        if !value.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(SerialError::InvalidCode(
                "code may only contain printable characters without spaces".to_string(),
            ));
        }

        Ok(Self(value))
    }

    /// Take a value as received from the device, without validation
    pub(crate) fn from_wire(value: &str) -> Self {
        Self(Zeroizing::new(value.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for CodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CodeValue(<redacted>)")
    }
}

/// Host to dongle requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect,
    Disconnect,
    GetCode(Slot),
    SetCode(Slot, CodeValue),
    ClearAll,
}

impl Command {
    /// Wire form, without the trailing newline. Contains the secret for `SetCode`.
    pub fn encode(&self) -> Zeroizing<String> {
        let line = match self {
            Command::Connect => "CONNECT".to_string(),
            Command::Disconnect => "DISCONNECT".to_string(),
            Command::GetCode(slot) => format!("GET_CODE_{}", slot),
            Command::SetCode(slot, code) => format!("SET_CODE_{}:{}", slot, code.expose()),
            Command::ClearAll => "CLEAR_ALL".to_string(),
        };
        Zeroizing::new(line)
    }
}

/// Log-safe rendering; the value of `SET_CODE` is masked.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SetCode(slot, _) => write!(f, "SET_CODE_{}:<hidden>", slot),
            other => f.write_str(&other.encode()),
        }
    }
}

impl FromStr for Command {
    type Err = SerialError;

    fn from_str(line: &str) -> Result<Self> {
        match line {
            "CONNECT" => return Ok(Command::Connect),
            "DISCONNECT" => return Ok(Command::Disconnect),
            "CLEAR_ALL" => return Ok(Command::ClearAll),
            _ => {}
        }

        if let Some(number) = line.strip_prefix("GET_CODE_") {
            return Ok(Command::GetCode(parse_slot(number)?));
        }

        if let Some(rest) = line.strip_prefix("SET_CODE_") {
            let (number, value) = rest
                .split_once(':')
                .ok_or_else(|| SerialError::ProtocolError("SET_CODE without value".to_string()))?;
            return Ok(Command::SetCode(parse_slot(number)?, CodeValue::from_wire(value)));
        }

        Err(SerialError::ProtocolError(format!("Unknown command: {}", line)))
    }
}

fn parse_slot(number: &str) -> Result<Slot> {
    let number: u8 = number
        .parse()
        .map_err(|_| SerialError::ProtocolError(format!("Invalid slot number: {}", number)))?;
    Slot::new(number)
}

/// Dongle to host replies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Code(CodeValue),
    NoCode,
    Saved,
    Cleared,
    Timeout,
    Bye,
    Error,
    /// Nothing arrived before the read timeout, or the link failed
    Empty,
    Unrecognized(String),
}

impl Reply {
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "" => Reply::Empty,
            "OK" => Reply::Ok,
            "NO_CODE" => Reply::NoCode,
            "SAVED" => Reply::Saved,
            "CLEARED" => Reply::Cleared,
            "TIMEOUT" => Reply::Timeout,
            "BYE" => Reply::Bye,
            "ERROR" => Reply::Error,
            other => match other.strip_prefix("CODE:") {
                Some(value) => Reply::Code(CodeValue::from_wire(value)),
                None => Reply::Unrecognized(other.to_string()),
            },
        }
    }

    /// Empty and `TIMEOUT` replies mean the dongle is gone
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Reply::Empty | Reply::Timeout)
    }
}

/// User-facing rendering; a code value is never shown.
impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ok => f.write_str("OK"),
            Reply::Code(_) => f.write_str("CODE:<hidden>"),
            Reply::NoCode => f.write_str("NO_CODE"),
            Reply::Saved => f.write_str("SAVED"),
            Reply::Cleared => f.write_str("CLEARED"),
            Reply::Timeout => f.write_str("TIMEOUT"),
            Reply::Bye => f.write_str("BYE"),
            Reply::Error => f.write_str("ERROR"),
            Reply::Empty => Ok(()),
            Reply::Unrecognized(line) => f.write_str(line),
        }
    }
}

/// Dongle Lock line protocol client.
///
/// Owns the serial interface for the lifetime of a session. Every request
/// is one line out and one line back; nothing is retried.
pub struct DongleProtocol {
    interface: SerialInterface,
}

impl DongleProtocol {
    /// Open a physical port and perform the CONNECT handshake
    pub fn connect(port_name: &str, config: &LinkConfig) -> Result<Self> {
        let mut interface = SerialInterface::new();
        interface.open(port_name, config)?;
        Self { interface }.handshake(config.boot_settle)
    }

    /// Run the handshake over an already open transport
    pub fn connect_with(port_name: &str, link: Box<dyn SerialPortIO>, boot_settle: Duration) -> Result<Self> {
        let mut interface = SerialInterface::new();
        interface.attach(port_name, link);
        Self { interface }.handshake(boot_settle)
    }

    fn handshake(mut self, boot_settle: Duration) -> Result<Self> {
        let port = self.port_name().to_string();

        if !boot_settle.is_zero() {
            log::debug!("Waiting {:?} for dongle on {} to boot", boot_settle, port);
            std::thread::sleep(boot_settle);
        }

        // The firmware prints a banner on boot that must not be read as the handshake reply
        if let Err(e) = self.interface.clear_input() {
            log::debug!("Could not clear input on {}: {}", port, e);
        }

        if !self.interface.send(&Command::Connect.encode()) {
            self.interface.close();
            return Err(SerialError::WriteFailed(format!("CONNECT to {}", port)));
        }

        match Reply::parse(&self.interface.receive()) {
            Reply::Ok => {
                log::info!("Handshake with dongle on {} succeeded", port);
                Ok(self)
            }
            reply => {
                log::warn!("Handshake with {} failed, reply {:?}", port, reply.to_string());
                self.interface.close();
                Err(SerialError::HandshakeFailed { port, reply: reply.to_string() })
            }
        }
    }

    /// Send one command and wait for one reply.
    /// A failed write is reported as `Reply::Empty`.
    pub fn request(&mut self, command: &Command) -> Reply {
        log::debug!("-> {}", command);

        if !self.interface.send(&command.encode()) {
            log::warn!("Could not send {} to {}", command, self.port_name());
            return Reply::Empty;
        }

        let reply = Reply::parse(&self.interface.receive());
        log::debug!("<- {}", reply);
        reply
    }

    pub fn get_code(&mut self, slot: Slot) -> Reply {
        self.request(&Command::GetCode(slot))
    }

    pub fn set_code(&mut self, slot: Slot, code: &CodeValue) -> Reply {
        self.request(&Command::SetCode(slot, code.clone()))
    }

    pub fn clear_all(&mut self) -> Reply {
        self.request(&Command::ClearAll)
    }

    /// Say goodbye and close. Failures along the way are ignored.
    pub fn disconnect(mut self) {
        if self.interface.send(&Command::Disconnect.encode()) {
            let reply = Reply::parse(&self.interface.receive());
            log::debug!("DISCONNECT answered with {:?}", reply.to_string());
        }
        self.interface.close();
    }

    pub fn port_name(&self) -> &str {
        self.interface.port_name().unwrap_or_default()
    }

    pub fn is_connected(&self) -> bool {
        self.interface.is_connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_one_based() {
        assert!(Slot::new(0).is_err());
        assert_eq!(Slot::new(1).unwrap().get(), 1);
        assert_eq!(Slot::new(3).unwrap().index(), 2);
        assert!(matches!(Slot::new(4), Err(SerialError::InvalidSlot(4))));
        assert_eq!(Slot::all().map(Slot::get).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn command_wire_forms() {
        let slot = Slot::new(2).unwrap();
        assert_eq!(Command::Connect.encode().as_str(), "CONNECT");
        assert_eq!(Command::GetCode(slot).encode().as_str(), "GET_CODE_2");
        assert_eq!(Command::ClearAll.encode().as_str(), "CLEAR_ALL");

        let code = CodeValue::new("hunter2").unwrap();
        assert_eq!(Command::SetCode(slot, code).encode().as_str(), "SET_CODE_2:hunter2");
    }

    #[test]
    fn set_code_is_masked_in_logs() {
        let command = Command::SetCode(Slot::new(1).unwrap(), CodeValue::new("s3cret").unwrap());
        assert_eq!(command.to_string(), "SET_CODE_1:<hidden>");
        assert!(!format!("{:?}", command).contains("s3cret"));
    }

    #[test]
    fn commands_parse_back() {
        assert_eq!("CONNECT".parse::<Command>().unwrap(), Command::Connect);
        assert_eq!(
            "GET_CODE_3".parse::<Command>().unwrap(),
            Command::GetCode(Slot::new(3).unwrap())
        );
        match "SET_CODE_1:a:b".parse::<Command>().unwrap() {
            Command::SetCode(slot, code) => {
                assert_eq!(slot.get(), 1);
                assert_eq!(code.expose(), "a:b");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!("GET_CODE_4".parse::<Command>().is_err());
        assert!("SET_CODE_1".parse::<Command>().is_err());
        assert!("HELLO".parse::<Command>().is_err());
    }

    #[test]
    fn replies_parse() {
        assert_eq!(Reply::parse("OK"), Reply::Ok);
        assert_eq!(Reply::parse(" SAVED \r"), Reply::Saved);
        assert_eq!(Reply::parse(""), Reply::Empty);
        assert_eq!(Reply::parse("BYE"), Reply::Bye);
        assert_eq!(Reply::parse("weird"), Reply::Unrecognized("weird".to_string()));
        match Reply::parse("CODE:pa:ss") {
            Reply::Code(code) => assert_eq!(code.expose(), "pa:ss"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn only_empty_and_timeout_mean_disconnect() {
        assert!(Reply::Empty.is_disconnect());
        assert!(Reply::Timeout.is_disconnect());
        assert!(!Reply::Error.is_disconnect());
        assert!(!Reply::NoCode.is_disconnect());
    }

    #[test]
    fn code_reply_hides_value() {
        let reply = Reply::parse("CODE:topsecret");
        assert_eq!(reply.to_string(), "CODE:<hidden>");
        assert!(!format!("{:?}", reply).contains("topsecret"));
    }

    #[test]
    fn code_validation() {
        assert!(CodeValue::new("").is_err());
        assert!(CodeValue::new("two words").is_err());
        assert!(CodeValue::new("tab\there").is_err());
        assert!(CodeValue::new("x".repeat(MAX_CODE_LENGTH)).is_ok());
        assert!(CodeValue::new("x".repeat(MAX_CODE_LENGTH + 1)).is_err());
        assert_eq!(CodeValue::new("Abc!123:z").unwrap().expose(), "Abc!123:z");
    }
}
