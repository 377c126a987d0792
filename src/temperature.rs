use core::convert::From;
use core::ops::Add;
use core::ops::Sub;

/// temperature in 1/16 Celsius, as stored in the scratchpad
#[derive(Copy, Clone, Debug, PartialOrd, PartialEq, Eq, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Temperature(i16);

impl Temperature {
    /// Builds the reading from the two scratchpad temperature bytes.
    ///
    /// The register is a 16 bit two's complement value, so `temp2` carries the
    /// sign and is sign extended before any scaling.
    pub fn from_scratchpad(temp1: u8, temp2: u8) -> Self {
        Temperature(i16::from_le_bytes([temp1, temp2]))
    }

    /// `degrees_div_16` takes the sign of `degrees`, so `(-10, 2)` is -10.125.
    /// With zero whole degrees the fraction carries its own sign.
    pub fn from_celsius(degrees: i16, degrees_div_16: i16) -> Self {
        let whole = degrees.saturating_mul(16);
        if degrees < 0 {
            Temperature(whole.saturating_sub(degrees_div_16))
        } else {
            Temperature(whole.saturating_add(degrees_div_16))
        }
    }

    pub fn raw(&self) -> i16 {
        self.0
    }

    pub fn celsius(&self) -> f32 {
        f32::from(self.0) / 16.0
    }

    /// whole degrees, truncated toward zero
    pub fn whole_degrees(&self) -> i16 {
        self.0 / 16
    }

    /// sixteenths left after [`Temperature::whole_degrees`], always positive;
    /// between 0 and -1 degree only [`Temperature::raw`] keeps the sign
    pub fn fraction_degrees(&self) -> i16 {
        (self.0 % 16).unsigned_abs() as i16
    }
}

impl Add for Temperature {
    type Output = Temperature;
    fn add(self, rhs: Self) -> Self::Output {
        Temperature(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Temperature {
    type Output = Temperature;
    fn sub(self, rhs: Self) -> Self::Output {
        Temperature(self.0.saturating_sub(rhs.0))
    }
}

impl From<i16> for Temperature {
    fn from(original: i16) -> Temperature {
        Temperature(original)
    }
}
