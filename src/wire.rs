use embedded_hal::digital::{Error, ErrorType, InputPin, OutputPin};

/// Access to the single open-drain bus line.
///
/// The master only ever drives the line low or lets it float; the
/// external pull-up resistor is what takes it back high.
pub trait OpenDrainWire {
    type Error: Error;

    /// Actively drive the line low
    fn pull_low(&mut self) -> Result<(), Self::Error>;

    /// Stop driving the line (high impedance, pull-up takes over)
    ///
    /// *NOTE* the line may still read low afterwards while a device
    /// holds it down
    fn release(&mut self) -> Result<(), Self::Error>;

    /// Sample the current line level
    fn is_high(&mut self) -> Result<bool, Self::Error>;

    /// Sample the current line level
    fn is_low(&mut self) -> Result<bool, Self::Error>;
}

/// Single pin config wrapper. The pin must be configured as open-drain
/// (or input-with-pullup on release) by the HAL.
impl<IO> OpenDrainWire for (IO,)
where
    IO: ErrorType + OutputPin + InputPin,
{
    type Error = IO::Error;

    fn pull_low(&mut self) -> Result<(), Self::Error> {
        self.0.set_low()
    }

    fn release(&mut self) -> Result<(), Self::Error> {
        self.0.set_high()
    }

    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.0.is_high()
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.0.is_low()
    }
}

/// Split line config wrapper: sample on one pin, drive with another
/// (e.g. behind a level shifter)
impl<E, I, O> OpenDrainWire for (I, O)
where
    E: Error,
    I: ErrorType<Error = E> + InputPin,
    O: ErrorType<Error = E> + OutputPin,
{
    type Error = E;

    fn pull_low(&mut self) -> Result<(), Self::Error> {
        self.1.set_low()
    }

    fn release(&mut self) -> Result<(), Self::Error> {
        self.1.set_high()
    }

    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.0.is_high()
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.0.is_low()
    }
}

/// Wrapper for lines driven through an inverting stage
pub struct Inverted<P>(pub P);

impl<I: ErrorType> ErrorType for Inverted<I> {
    type Error = I::Error;
}

impl<I> InputPin for Inverted<I>
where
    I: InputPin,
{
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.0.is_low()
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.0.is_high()
    }
}

impl<O> OutputPin for Inverted<O>
where
    O: OutputPin,
{
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.set_high()
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.set_low()
    }
}
