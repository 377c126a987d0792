//! Bit-banged 1-wire bus over a single GPIO line, with just enough of the
//! DS18B20 command set to configure the sensor and read its temperature.
//!
//! The line is an `embedded_hal` pin in open drain mode (see [`iopin`] to build
//! one from two pins) with an external 4.7k pull-up, and timing comes from a
//! `DelayNs` busy-wait. Every time slot runs inside a critical section, so the
//! final binary must provide a `critical-section` implementation.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

#[macro_use]
mod fmt;

pub mod ds18b20;
pub mod error;
pub mod iopin;
pub mod temperature;

pub use ds18b20::{Ds18b20, Resolution};
pub use error::Error;
pub use temperature::Temperature;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

/// time the line needs to settle after the pin was configured
pub const SETTLE_US: u32 = 50;

/// a write slot, not counting the recovery time
pub const WRITE_SLOT_US: u32 = 60;
/// low time of a write 1 slot
pub const WRITE_1_LOW_US: u32 = 6;
/// low time of a write 0 slot
pub const WRITE_0_LOW_US: u32 = 61;
/// recovery between two slots
pub const RECOVERY_US: u32 = 1;

/// low pulse initiating a read slot
pub const READ_INIT_LOW_US: u32 = 2;
/// a device driven low shorter than this is read as 1
pub const READ_THRESHOLD_US: u32 = 15;
/// slot padding after a 1, minus the measured low time
pub const READ_1_PAD_US: u32 = 56;
/// slot padding after a 0, minus the measured low time
pub const READ_0_PAD_US: u32 = 51;

/// reset low pulse, all devices on the bus reset
pub const RESET_LOW_US: u32 = 480;
/// presence sampling window after the reset pulse
pub const PRESENCE_WINDOW_US: u32 = 500;
/// shortest acceptable presence pulse
pub const PRESENCE_MIN_US: u32 = 60;
/// longest acceptable presence pulse
pub const PRESENCE_MAX_US: u32 = 240;

/// Skip ROM: addresses every device, there must be only one on the bus.
pub const SKIP_ROM: u8 = 0xCC;

/// Generic 1-wire bus API the device transactions are written against.
pub trait OneWire {
    type PinError;

    /// Sends a reset pulse, returns whether a valid presence pulse followed.
    fn reset_pulse(&mut self) -> Result<bool, Error<Self::PinError>>;
    fn send_bit(&mut self, data: bool) -> Result<(), Error<Self::PinError>>;
    fn request_bit(&mut self) -> Result<bool, Error<Self::PinError>>;
    fn send_byte(&mut self, data: u8) -> Result<(), Error<Self::PinError>>;
    fn request_byte(&mut self) -> Result<u8, Error<Self::PinError>>;

    /// Same as [`OneWire::reset_pulse`] but a missing device is an error.
    fn reset(&mut self) -> Result<(), Error<Self::PinError>> {
        if self.reset_pulse()? {
            Ok(())
        } else {
            Err(Error::NoPresence)
        }
    }

    fn send_many(&mut self, data: &[u8]) -> Result<(), Error<Self::PinError>> {
        for d in data {
            self.send_byte(*d)?;
        }
        Ok(())
    }

    /// fills the buffer with bytes coming on the 1 wire bus
    fn request_many(&mut self, buffer: &mut [u8]) -> Result<(), Error<Self::PinError>> {
        for d in buffer.iter_mut() {
            *d = self.request_byte()?;
        }
        Ok(())
    }

    /// Do a ROM skip
    fn skip(&mut self) -> Result<(), Error<Self::PinError>> {
        self.send_byte(SKIP_ROM)
    }
}

/// A 1-wire bus bit-banged on one GPIO line.
pub struct OneWirePort<IOPIN, DELAY>
where
    IOPIN: InputPin + OutputPin, //in opendrain mode the pin also acts as input
    DELAY: DelayNs,
{
    /// an external 4.7k pullup resistor is needed on this pin
    io: IOPIN,
    delay: DELAY,
}

/// Executes the closure `f` in a preemption free context.
/// During the execution of the closure no task or interrupt can preempt the
/// current one, use this only around a single time slot.
fn atomic<R, F>(f: F) -> R
where
    F: FnOnce() -> R,
{
    critical_section::with(|_| f())
}

impl<IOPIN, DELAY> OneWirePort<IOPIN, DELAY>
where
    IOPIN: InputPin + OutputPin,
    DELAY: DelayNs,
{
    /// Takes over the line: releases it (idle high) and lets it settle.
    pub fn new(mut io: IOPIN, mut delay: DELAY) -> Result<Self, Error<IOPIN::Error>> {
        io.set_high().map_err(Error::Pin)?;
        delay.delay_us(SETTLE_US);
        Ok(OneWirePort { io, delay })
    }

    /// Gives back the pin and the delay.
    pub fn into_inner(self) -> (IOPIN, DELAY) {
        (self.io, self.delay)
    }

    /// Emits one write slot: short low pulse = 1, long low pulse = 0.
    pub fn write_bit(&mut self, bit: bool) -> Result<(), Error<IOPIN::Error>> {
        //the slave will sample the line 15..60us from the initial falling edge
        let low = if bit { WRITE_1_LOW_US } else { WRITE_0_LOW_US };
        let io = &mut self.io;
        let delay = &mut self.delay;
        atomic(|| -> Result<(), Error<IOPIN::Error>> {
            io.set_low().map_err(Error::Pin)?;
            delay.delay_us(low);
            io.set_high().map_err(Error::Pin)?;
            delay.delay_us(WRITE_SLOT_US.saturating_sub(low) + RECOVERY_US);
            Ok(())
        })
    }

    /// Runs one read slot and classifies the bit by how long the device kept
    /// the line low after the initiating pulse.
    pub fn read_bit(&mut self) -> Result<bool, Error<IOPIN::Error>> {
        let io = &mut self.io;
        let delay = &mut self.delay;
        atomic(|| -> Result<bool, Error<IOPIN::Error>> {
            io.set_low().map_err(Error::Pin)?;
            delay.delay_us(READ_INIT_LOW_US);
            io.set_high().map_err(Error::Pin)?;

            let mut low_us = 0;
            while low_us < WRITE_SLOT_US && io.is_low().map_err(Error::Pin)? {
                delay.delay_us(1);
                low_us += 1;
            }

            // pad so 0 and 1 slots take about the same time
            if low_us < READ_THRESHOLD_US {
                delay.delay_us(READ_1_PAD_US.saturating_sub(low_us));
                Ok(true)
            } else {
                delay.delay_us(READ_0_PAD_US.saturating_sub(low_us));
                Ok(false)
            }
        })
    }

    /// Sends 8 bits, LSB first.
    pub fn write_byte(&mut self, data: u8) -> Result<(), Error<IOPIN::Error>> {
        for i in 0..8 {
            self.write_bit(data & (1 << i) != 0)?;
        }
        Ok(())
    }

    /// Receives 8 bits, LSB first.
    pub fn read_byte(&mut self) -> Result<u8, Error<IOPIN::Error>> {
        let mut result: u8 = 0u8;
        for i in 0..8 {
            if self.read_bit()? {
                result |= 1 << i;
            }
        }
        Ok(result)
    }

    /// Pulls the line low long enough to reset every device, then measures
    /// how long a device holds it low in answer.
    ///
    /// Returns `true` only for a presence pulse of 60..=240us: shorter is
    /// noise, longer is a stuck (shorted) bus.
    pub fn reset_pulse(&mut self) -> Result<bool, Error<IOPIN::Error>> {
        //long low reset pulse, a slot may be preempted here
        self.io.set_low().map_err(Error::Pin)?;
        self.delay.delay_us(RESET_LOW_US);

        let io = &mut self.io;
        let delay = &mut self.delay;
        let low_us = atomic(|| -> Result<u32, Error<IOPIN::Error>> {
            io.set_high().map_err(Error::Pin)?;
            let mut low_us = 0u32;
            for _ in 0..PRESENCE_WINDOW_US {
                if io.is_low().map_err(Error::Pin)? {
                    low_us += 1;
                }
                delay.delay_us(1);
            }
            Ok(low_us)
        })?;

        let device_present = (PRESENCE_MIN_US..=PRESENCE_MAX_US).contains(&low_us);
        if device_present {
            trace!("presence pulse {=u32}us", low_us);
        } else if low_us > PRESENCE_MAX_US {
            warn!("line held low {=u32}us after reset, bus shorted?", low_us);
        } else {
            debug!("no presence pulse ({=u32}us low)", low_us);
        }
        Ok(device_present)
    }
}

impl<IOPIN, DELAY> OneWire for OneWirePort<IOPIN, DELAY>
where
    IOPIN: InputPin + OutputPin,
    DELAY: DelayNs,
{
    type PinError = IOPIN::Error;

    fn reset_pulse(&mut self) -> Result<bool, Error<IOPIN::Error>> {
        OneWirePort::reset_pulse(self)
    }

    fn send_bit(&mut self, data: bool) -> Result<(), Error<IOPIN::Error>> {
        self.write_bit(data)
    }

    fn request_bit(&mut self) -> Result<bool, Error<IOPIN::Error>> {
        self.read_bit()
    }

    fn send_byte(&mut self, data: u8) -> Result<(), Error<IOPIN::Error>> {
        self.write_byte(data)
    }

    fn request_byte(&mut self) -> Result<u8, Error<IOPIN::Error>> {
        self.read_byte()
    }
}
