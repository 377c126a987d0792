//! A simulated open-drain line with one slave on it. The delay advances a
//! shared clock, so the slave sees the master's waveform with its real timing.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;

use ds18b20_onewire::iopin::IoPin;
use ds18b20_onewire::OneWirePort;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

const US: u64 = 1_000;
/// a reset is any low pulse at least this long
const RESET_MIN_NS: u64 = 480 * US;
/// the slave samples a write slot this long after the falling edge
const SAMPLE_NS: u64 = 30 * US;
/// the slave answers a 0 by holding the line this long after the falling edge
const HOLD_NS: u64 = 30 * US;
/// gap between the end of the reset pulse and the presence pulse
const PRESENCE_DELAY_NS: u64 = 15 * US;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slave {
    /// receives a byte, then sends it back
    Loopback,
    /// a DS18B20 answering skip ROM and the scratchpad/conversion commands
    Sensor,
}

#[derive(Debug)]
enum Mode {
    Idle,
    Rom,
    Function,
    WriteScratchpad(Vec<u8>),
    Converting(u32),
    Transmit(VecDeque<bool>),
    Loopback,
}

pub struct Line {
    now_ns: u64,
    master_low: bool,
    fall_ns: u64,
    falling_edges: usize,

    slave: Slave,
    mode: Mode,
    rx_byte: u8,
    rx_bits: u8,
    hold_until_ns: u64,
    presence: Option<(u64, u64)>,

    /// the slave answers reset pulses
    pub present: bool,
    /// length of the presence pulse
    pub presence_us: u64,
    /// the line is shorted to ground
    pub shorted: bool,
    /// read slots answered with 0 after a convert command, `None` never ends
    pub conversion_polls: Option<u32>,
    pub scratchpad: [u8; 9],
    /// payloads of every write scratchpad command
    pub writes: Vec<[u8; 3]>,
    pub conversions: usize,
}

impl Line {
    fn new(slave: Slave) -> Self {
        Line {
            now_ns: 0,
            master_low: false,
            fall_ns: 0,
            falling_edges: 0,
            slave,
            mode: match slave {
                Slave::Loopback => Mode::Loopback,
                Slave::Sensor => Mode::Idle,
            },
            rx_byte: 0,
            rx_bits: 0,
            hold_until_ns: 0,
            presence: None,
            present: true,
            presence_us: 120,
            shorted: false,
            conversion_polls: Some(10),
            // 85.0 degrees power on value, alarms 75/70, 12 bit
            scratchpad: [0x50, 0x05, 0x4B, 0x46, 0x7F, 0xFF, 0x0C, 0x10, 0x1C],
            writes: Vec::new(),
            conversions: 0,
        }
    }

    pub fn falling_edges(&self) -> usize {
        self.falling_edges
    }

    pub fn now_us(&self) -> u64 {
        self.now_ns / US
    }

    pub fn set_temperature(&mut self, temp1: u8, temp2: u8) {
        self.scratchpad[0] = temp1;
        self.scratchpad[1] = temp2;
    }

    fn slave_pulls_low(&self) -> bool {
        let now = self.now_ns;
        self.shorted
            || now < self.hold_until_ns
            || self
                .presence
                .map_or(false, |(start, end)| now >= start && now < end)
    }

    fn drive_low(&mut self) {
        if self.master_low {
            return;
        }
        self.master_low = true;
        self.fall_ns = self.now_ns;
        self.falling_edges += 1;
        self.on_falling_edge();
    }

    fn release(&mut self) {
        if !self.master_low {
            return;
        }
        self.master_low = false;
        let low_ns = self.now_ns - self.fall_ns;
        self.on_rising_edge(low_ns);
    }

    fn on_falling_edge(&mut self) {
        let send_zero = match &mut self.mode {
            Mode::Converting(remaining) => {
                if *remaining > 0 {
                    *remaining -= 1;
                    true
                } else {
                    false
                }
            }
            Mode::Transmit(bits) => !bits.pop_front().unwrap_or(true),
            _ => false,
        };
        if send_zero {
            self.hold_until_ns = self.now_ns + HOLD_NS;
        }
    }

    fn on_rising_edge(&mut self, low_ns: u64) {
        if low_ns >= RESET_MIN_NS {
            self.on_reset();
            return;
        }
        if let Mode::Transmit(bits) = &self.mode {
            if bits.is_empty() {
                self.mode = self.idle_mode();
            }
            return;
        }
        let receiving = matches!(
            self.mode,
            Mode::Rom | Mode::Function | Mode::WriteScratchpad(_) | Mode::Loopback
        );
        if !receiving {
            return;
        }
        if low_ns < SAMPLE_NS {
            self.rx_byte |= 1 << self.rx_bits;
        }
        self.rx_bits += 1;
        if self.rx_bits == 8 {
            let byte = self.rx_byte;
            self.rx_byte = 0;
            self.rx_bits = 0;
            self.on_byte(byte);
        }
    }

    fn on_reset(&mut self) {
        self.rx_byte = 0;
        self.rx_bits = 0;
        self.hold_until_ns = 0;
        self.presence = None;
        if !self.present {
            self.mode = Mode::Idle;
            return;
        }
        let start = self.now_ns + PRESENCE_DELAY_NS;
        self.presence = Some((start, start + self.presence_us * US));
        self.mode = match self.slave {
            Slave::Loopback => Mode::Loopback,
            Slave::Sensor => Mode::Rom,
        };
    }

    fn idle_mode(&self) -> Mode {
        match self.slave {
            Slave::Loopback => Mode::Loopback,
            Slave::Sensor => Mode::Idle,
        }
    }

    fn on_byte(&mut self, byte: u8) {
        let mode = std::mem::replace(&mut self.mode, Mode::Idle);
        self.mode = match mode {
            Mode::Loopback => Mode::Transmit((0..8).map(|i| byte & (1 << i) != 0).collect()),
            Mode::Rom if byte == 0xCC => Mode::Function,
            Mode::Function if byte == 0x44 => {
                self.conversions += 1;
                Mode::Converting(self.conversion_polls.unwrap_or(u32::MAX))
            }
            Mode::Function if byte == 0xBE => Mode::Transmit(
                self.scratchpad
                    .iter()
                    .flat_map(|b| (0..8).map(move |i| b & (1 << i) != 0))
                    .collect(),
            ),
            Mode::Function if byte == 0x4E => Mode::WriteScratchpad(Vec::new()),
            Mode::WriteScratchpad(mut payload) => {
                payload.push(byte);
                if payload.len() == 3 {
                    self.scratchpad[2..5].copy_from_slice(&payload);
                    self.writes.push([payload[0], payload[1], payload[2]]);
                    Mode::Idle
                } else {
                    Mode::WriteScratchpad(payload)
                }
            }
            _ => Mode::Idle,
        };
    }
}

pub type SharedLine = Rc<RefCell<Line>>;

pub struct Drive(SharedLine);
pub struct Sense(SharedLine);
pub struct Clock(SharedLine);

impl ErrorType for Drive {
    type Error = Infallible;
}

impl OutputPin for Drive {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.0.borrow_mut().drive_low();
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.0.borrow_mut().release();
        Ok(())
    }
}

impl ErrorType for Sense {
    type Error = Infallible;
}

impl InputPin for Sense {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        let line = self.0.borrow();
        Ok(!line.master_low && !line.slave_pulls_low())
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        self.is_high().map(|high| !high)
    }
}

impl DelayNs for Clock {
    fn delay_ns(&mut self, ns: u32) {
        self.0.borrow_mut().now_ns += u64::from(ns);
    }
}

pub type SimPort = OneWirePort<IoPin<Drive, Sense>, Clock>;

/// Builds a bus port on a fresh simulated line.
pub fn bus(slave: Slave) -> (SimPort, SharedLine) {
    let line = Rc::new(RefCell::new(Line::new(slave)));
    let pin = IoPin::new(Drive(line.clone()), Sense(line.clone()));
    let port = OneWirePort::new(pin, Clock(line.clone())).unwrap();
    (port, line)
}
