//! This helper turns two 'one directional' pins into one 'bidirectional' line,
//! which is what the bus port drives.
//!
//! Writing high releases the line: the output must be configured as open drain
//! (or as an input with pull-up when released) so the external pull-up can
//! raise it and a device can still pull it low. Pin muxing and pull-up
//! selection belong to the HAL that builds the two pins.

use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

pub struct IoPin<O, I>
where
    O: OutputPin,                   // in opendrain mode
    I: InputPin<Error = O::Error>, // in floating or pull-up input mode
{
    output: O,
    input: I,
}

impl<O, I> IoPin<O, I>
where
    O: OutputPin,
    I: InputPin<Error = O::Error>,
{
    pub fn new(output: O, input: I) -> Self {
        IoPin { output, input }
    }

    pub fn split(self) -> (O, I) {
        (self.output, self.input)
    }
}

impl<O, I> ErrorType for IoPin<O, I>
where
    O: OutputPin,
    I: InputPin<Error = O::Error>,
{
    type Error = O::Error;
}

impl<O, I> InputPin for IoPin<O, I>
where
    O: OutputPin,
    I: InputPin<Error = O::Error>,
{
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.input.is_high()
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.input.is_low()
    }
}

impl<O, I> OutputPin for IoPin<O, I>
where
    O: OutputPin,
    I: InputPin<Error = O::Error>,
{
    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.output.set_high()
    }

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.output.set_low()
    }
}
