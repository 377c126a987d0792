use thiserror::Error;

/// Errors reported by the bus port and the DS18B20 transactions.
///
/// `E` is the error type of the GPIO pin driving the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// The GPIO collaborator failed to drive or sample the line.
    #[error("gpio pin error")]
    Pin(E),

    /// No device answered the reset pulse with a valid presence pulse.
    #[error("no presence pulse detected after reset")]
    NoPresence,

    /// The handle was created against a silent bus.
    #[error("sensor was not initialized")]
    NotInitialized,

    /// The sensor kept the line low longer than its maximal conversion time.
    #[error("temperature conversion did not complete in time")]
    ConversionTimeout,

    /// The byte is not one of the four configuration register values.
    #[error("invalid resolution register value {0:#04x}")]
    InvalidResolution(u8),
}
