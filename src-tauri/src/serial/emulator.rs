//! In-memory Dongle Lock.
//!
//! Answers commands the way the firmware does, so the whole connect/get/set
//! flow can run without hardware. A cloned [`EmulatorHandle`] stays with the
//! caller to script failures and inspect what the device saw.
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::protocol::{Command, MAX_CODE_LENGTH, MAX_SLOTS};
use super::SerialPortIO;

pub const BOOT_BANNER: &str = "Dongle Lock Ready (EEPROM Storage)";
pub const SIMULATED_PORT: &str = "simulated://dongle";

#[derive(Debug, Default)]
struct EmulatorState {
    codes: [Option<String>; MAX_SLOTS as usize],
    outbox: VecDeque<String>,
    overrides: VecDeque<String>,
    received: Vec<String>,
    silent: bool,
    unplugged: bool,
    open: bool,
}

impl EmulatorState {
    fn process(&mut self, line: &str) -> String {
        // Firmware terminates the command at the first space, CR or LF
        let command = line
            .split(|c| c == ' ' || c == '\r' || c == '\n')
            .next()
            .unwrap_or_default();

        let reply = match command.parse::<Command>() {
            Ok(Command::Connect) => "OK".to_string(),
            Ok(Command::Disconnect) => "BYE".to_string(),
            Ok(Command::GetCode(slot)) => match &self.codes[slot.index()] {
                Some(code) => format!("CODE:{}", code),
                None => "NO_CODE".to_string(),
            },
            Ok(Command::SetCode(slot, code)) => {
                let mut stored = code.expose().to_string();
                truncate_to_boundary(&mut stored, MAX_CODE_LENGTH);
                self.codes[slot.index()] = Some(stored);
                "SAVED".to_string()
            }
            Ok(Command::ClearAll) => {
                self.codes = Default::default();
                "CLEARED".to_string()
            }
            Err(_) => "ERROR".to_string(),
        };

        self.overrides.pop_front().unwrap_or(reply)
    }
}

fn truncate_to_boundary(value: &mut String, max: usize) {
    if value.len() > max {
        let mut cut = max;
        while !value.is_char_boundary(cut) {
            cut -= 1;
        }
        value.truncate(cut);
    }
}

fn lock(state: &Mutex<EmulatorState>) -> MutexGuard<'_, EmulatorState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Serial transport backed by the emulated firmware
pub struct DongleEmulator {
    state: Arc<Mutex<EmulatorState>>,
}

impl DongleEmulator {
    /// A freshly booted dongle with empty slots; the boot banner is pending
    pub fn new() -> (Self, EmulatorHandle) {
        let mut state = EmulatorState {
            open: true,
            ..Default::default()
        };
        state.outbox.push_back(BOOT_BANNER.to_string());

        let state = Arc::new(Mutex::new(state));
        (Self { state: state.clone() }, EmulatorHandle { state })
    }
}

impl SerialPortIO for DongleEmulator {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut state = lock(&self.state);
        if state.unplugged {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }

        let command = line.trim_end_matches(['\r', '\n']);
        state.received.push(command.to_string());
        if !state.silent {
            let reply = state.process(command);
            state.outbox.push_back(reply);
        }
        Ok(())
    }

    fn read_line(&mut self) -> io::Result<String> {
        let mut state = lock(&self.state);
        if state.unplugged {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        state
            .outbox
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::TimedOut, "no reply"))
    }

    fn clear_input(&mut self) -> io::Result<()> {
        lock(&self.state).outbox.clear();
        Ok(())
    }
}

impl Drop for DongleEmulator {
    fn drop(&mut self) {
        lock(&self.state).open = false;
    }
}

/// Remote control for a [`DongleEmulator`] that has been handed off
#[derive(Clone)]
pub struct EmulatorHandle {
    state: Arc<Mutex<EmulatorState>>,
}

impl EmulatorHandle {
    /// Answer the next command with `reply` instead of the firmware's answer
    pub fn queue_reply(&self, reply: impl Into<String>) {
        lock(&self.state).overrides.push_back(reply.into());
    }

    /// Stop answering; reads time out
    pub fn set_silent(&self, silent: bool) {
        lock(&self.state).silent = silent;
    }

    /// Make every read and write fail
    pub fn unplug(&self) {
        lock(&self.state).unplugged = true;
    }

    /// Preload a slot (1-based)
    pub fn store(&self, slot: u8, code: impl Into<String>) {
        if let Some(entry) = lock(&self.state).codes.get_mut(usize::from(slot).wrapping_sub(1)) {
            *entry = Some(code.into());
        }
    }

    pub fn stored(&self, slot: u8) -> Option<String> {
        lock(&self.state)
            .codes
            .get(usize::from(slot).wrapping_sub(1))
            .cloned()
            .flatten()
    }

    /// Every line the device received, in order
    pub fn received(&self) -> Vec<String> {
        lock(&self.state).received.clone()
    }

    /// False once the transport has been dropped
    pub fn is_open(&self) -> bool {
        lock(&self.state).open
    }
}
