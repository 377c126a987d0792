//! Configure a single DS18B20 and read its temperature, addressed with
//! skip ROM so the sensor must be alone on the bus.

#![deny(unsafe_code)]

use core::convert::{Infallible, TryFrom};

use crate::{Error, OneWire, Temperature};

pub const SEARCH_ROM: u8 = 0xF0;
pub const READ_ROM: u8 = 0x33;
pub const MATCH_ROM: u8 = 0x55;
pub const SKIP_ROM: u8 = crate::SKIP_ROM;
pub const ALARM_SEARCH: u8 = 0xEC;
pub const CONVERT_T: u8 = 0x44;
pub const WRITE_SCRATCHPAD: u8 = 0x4E;
pub const READ_SCRATCHPAD: u8 = 0xBE;
pub const COPY_SCRATCHPAD: u8 = 0x48;
pub const RECALL_E2: u8 = 0xB8;
pub const READ_POWER_SUPPLY: u8 = 0xB4;

/// A conversion poll is one read slot, which never takes less than this.
const MIN_POLL_SLOT_US: u32 = 50;

/// Conversion bit depth, as written in the configuration register.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Resolution {
    Bits9 = 0x1F,
    Bits10 = 0x3F,
    Bits11 = 0x5F,
    #[default]
    Bits12 = 0x7F,
}

impl Resolution {
    pub const fn register_value(self) -> u8 {
        self as u8
    }

    /// Maximal conversion time given by the datasheet, in microseconds.
    pub const fn conversion_time_us(self) -> u32 {
        match self {
            Resolution::Bits9 => 93_750,
            Resolution::Bits10 => 187_500,
            Resolution::Bits11 => 375_000,
            Resolution::Bits12 => 750_000,
        }
    }

    /// Decodes a configuration register value.
    pub fn from_register_value<E>(value: u8) -> Result<Self, Error<E>> {
        match value {
            0x1F => Ok(Resolution::Bits9),
            0x3F => Ok(Resolution::Bits10),
            0x5F => Ok(Resolution::Bits11),
            0x7F => Ok(Resolution::Bits12),
            _ => Err(Error::InvalidResolution(value)),
        }
    }

    /// How many read slots may be spent waiting for a conversion.
    pub const fn max_conversion_polls(self) -> u32 {
        self.conversion_time_us() / MIN_POLL_SLOT_US
    }
}

impl TryFrom<u8> for Resolution {
    type Error = Error<Infallible>;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Resolution::from_register_value(value)
    }
}

/// Handle of the sensor on a bus, returned by [`Ds18b20::initialize`].
///
/// It holds no reference to the bus: every transaction takes the bus as an
/// argument, so the caller keeps exclusive ownership of the line.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Ds18b20 {
    initialized: bool,
    resolution: Resolution,
}

impl Ds18b20 {
    /// Looks for the sensor and writes `resolution` into its configuration
    /// register, keeping the alarm thresholds it already has.
    ///
    /// The scratchpad round trip runs even if nobody answered the reset, it
    /// just has no effect then. Check [`Ds18b20::is_initialized`] before
    /// trusting the handle.
    pub fn initialize<W: OneWire>(
        bus: &mut W,
        resolution: Resolution,
    ) -> Result<Self, Error<W::PinError>> {
        let initialized = bus.reset_pulse()?;

        bus.skip()?;
        bus.send_byte(READ_SCRATCHPAD)?;
        let mut scratchpad = [0u8; 4];
        bus.request_many(&mut scratchpad)?;
        let [_, _, alarm_h, alarm_l] = scratchpad;

        bus.reset_pulse()?;
        bus.skip()?;
        bus.send_many(&[
            WRITE_SCRATCHPAD,
            alarm_h,
            alarm_l,
            resolution.register_value(),
        ])?;

        if initialized {
            debug!(
                "ds18b20 configured: {}, alarms {=u8:#x}/{=u8:#x}",
                resolution,
                alarm_h,
                alarm_l
            );
        } else {
            warn!("ds18b20 did not answer the reset");
        }

        Ok(Ds18b20 {
            initialized,
            resolution,
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Runs a full conversion and reads the result back.
    ///
    /// Blocks for the conversion, at most the maximal conversion time of the
    /// configured resolution.
    pub fn read_temperature<W: OneWire>(
        &self,
        bus: &mut W,
    ) -> Result<Temperature, Error<W::PinError>> {
        if !self.initialized {
            return Err(Error::NotInitialized);
        }

        bus.reset()?;
        bus.skip()?;
        bus.send_byte(CONVERT_T)?;
        self.wait_for_conversion(bus)?;

        bus.reset()?;
        bus.skip()?;
        bus.send_byte(READ_SCRATCHPAD)?;
        let temp1 = bus.request_byte()?;
        let temp2 = bus.request_byte()?;
        // the rest of the scratchpad is not needed, stop the transfer
        bus.reset_pulse()?;

        trace!("scratchpad temperature {=u8:#x} {=u8:#x}", temp1, temp2);
        Ok(Temperature::from_scratchpad(temp1, temp2))
    }

    /// The sensor answers read slots with 0 while converting and with 1 once
    /// the result is in the scratchpad.
    fn wait_for_conversion<W: OneWire>(&self, bus: &mut W) -> Result<(), Error<W::PinError>> {
        let max_polls = self.resolution.max_conversion_polls();
        for poll in 0..max_polls {
            if bus.request_bit()? {
                trace!("conversion done after {=u32} polls", poll);
                return Ok(());
            }
        }
        warn!("conversion not done after {=u32} polls", max_polls);
        Err(Error::ConversionTimeout)
    }
}
