use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusError {
    Spi,
    ChipSelect,
}

/// Pulls `cs` low, runs `f` on the bus and raises `cs` again.
///
/// The line is released even when the transfer fails; a transfer error is
/// reported ahead of a release error.
pub fn transaction<SPI, CS, T, F>(spi: &mut SPI, cs: &mut CS, f: F) -> Result<T, BusError>
where
    SPI: SpiBus,
    CS: OutputPin,
    F: FnOnce(&mut SPI) -> Result<T, SPI::Error>,
{
    cs.set_low().map_err(|_| BusError::ChipSelect)?;
    let result = f(spi).and_then(|value| spi.flush().map(|_| value));
    let released = cs.set_high();

    let value = result.map_err(|_| BusError::Spi)?;
    released.map_err(|_| BusError::ChipSelect)?;
    Ok(value)
}

pub fn write<SPI: SpiBus, CS: OutputPin>(spi: &mut SPI, cs: &mut CS, data: &[u8]) -> Result<(), BusError> {
    transaction(spi, cs, |spi| spi.write(data))
}

/// Sends `cmd`, then clocks `buffer.len()` bytes back under the same select.
pub fn cmd_read<SPI: SpiBus, CS: OutputPin>(
    spi: &mut SPI,
    cs: &mut CS,
    cmd: &[u8],
    buffer: &mut [u8],
) -> Result<(), BusError> {
    transaction(spi, cs, |spi| {
        spi.write(cmd)?;
        spi.read(buffer)
    })
}

/// Full-duplex exchange of one frame.
pub fn transfer<SPI: SpiBus, CS: OutputPin>(
    spi: &mut SPI,
    cs: &mut CS,
    rx_buffer: &mut [u8],
    tx_buffer: &[u8],
) -> Result<(), BusError> {
    transaction(spi, cs, |spi| spi.transfer(rx_buffer, tx_buffer))
}

#[cfg(test)]
pub(crate) mod fakes {
    //! Bus, pin and delay doubles that record traffic into a shared log.
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::vec::Vec;

    use embedded_hal::delay::DelayNs;
    use embedded_hal::digital::{self, OutputPin};
    use embedded_hal::spi::{self, SpiBus};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Event {
        Select(&'static str),
        Release(&'static str),
        Write(Vec<u8>),
        Read(usize),
    }

    pub type Log = Rc<RefCell<Vec<Event>>>;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FakeError;

    impl spi::Error for FakeError {
        fn kind(&self) -> spi::ErrorKind {
            spi::ErrorKind::Other
        }
    }

    impl digital::Error for FakeError {
        fn kind(&self) -> digital::ErrorKind {
            digital::ErrorKind::Other
        }
    }

    /// Answers reads from a queue of canned responses, or from `respond` when set.
    pub struct FakeSpi {
        pub log: Log,
        pub responses: VecDeque<Vec<u8>>,
        pub respond: Option<Box<dyn FnMut(&[u8]) -> Vec<u8>>>,
        pub fail_writes: bool,
    }

    impl FakeSpi {
        pub fn new(log: &Log) -> Self {
            FakeSpi {
                log: log.clone(),
                responses: VecDeque::new(),
                respond: None,
                fail_writes: false,
            }
        }

        fn next_response(&mut self, len: usize) -> Vec<u8> {
            let mut bytes = self.responses.pop_front().unwrap_or_default();
            bytes.resize(len, 0);
            bytes
        }
    }

    impl spi::ErrorType for FakeSpi {
        type Error = FakeError;
    }

    impl SpiBus for FakeSpi {
        fn read(&mut self, words: &mut [u8]) -> Result<(), FakeError> {
            self.log.borrow_mut().push(Event::Read(words.len()));
            let bytes = self.next_response(words.len());
            words.copy_from_slice(&bytes);
            Ok(())
        }

        fn write(&mut self, words: &[u8]) -> Result<(), FakeError> {
            if self.fail_writes {
                return Err(FakeError);
            }
            self.log.borrow_mut().push(Event::Write(words.to_vec()));
            Ok(())
        }

        fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), FakeError> {
            self.write(write)?;
            let bytes = match self.respond.as_mut() {
                Some(respond) => respond(write),
                None => self.next_response(read.len()),
            };
            read.copy_from_slice(&bytes[..read.len()]);
            Ok(())
        }

        fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), FakeError> {
            let sent = words.to_vec();
            self.transfer(words, &sent)
        }

        fn flush(&mut self) -> Result<(), FakeError> {
            Ok(())
        }
    }

    pub struct FakePin {
        pub name: &'static str,
        pub log: Log,
    }

    impl FakePin {
        pub fn new(name: &'static str, log: &Log) -> Self {
            FakePin { name, log: log.clone() }
        }
    }

    impl digital::ErrorType for FakePin {
        type Error = FakeError;
    }

    impl OutputPin for FakePin {
        fn set_low(&mut self) -> Result<(), FakeError> {
            self.log.borrow_mut().push(Event::Select(self.name));
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), FakeError> {
            self.log.borrow_mut().push(Event::Release(self.name));
            Ok(())
        }
    }

    pub struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::*;
    use super::*;

    #[test]
    fn select_wraps_the_transfer() {
        let log = Log::default();
        let mut spi = FakeSpi::new(&log);
        let mut cs = FakePin::new("cs", &log);

        write(&mut spi, &mut cs, &[0xAA, 0x55]).unwrap();
        assert_eq!(
            *log.borrow(),
            vec![Event::Select("cs"), Event::Write(vec![0xAA, 0x55]), Event::Release("cs")]
        );
    }

    #[test]
    fn select_is_released_after_a_failed_write() {
        let log = Log::default();
        let mut spi = FakeSpi::new(&log);
        spi.fail_writes = true;
        let mut cs = FakePin::new("cs", &log);

        assert_eq!(write(&mut spi, &mut cs, &[0x01]), Err(BusError::Spi));
        assert_eq!(*log.borrow(), vec![Event::Select("cs"), Event::Release("cs")]);
    }

    #[test]
    fn cmd_read_keeps_select_low_across_both_phases() {
        let log = Log::default();
        let mut spi = FakeSpi::new(&log);
        spi.responses.push_back(vec![1, 2, 3]);
        let mut cs = FakePin::new("cs", &log);

        let mut buf = [0u8; 3];
        cmd_read(&mut spi, &mut cs, &[0x00, 0x04], &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(
            *log.borrow(),
            vec![
                Event::Select("cs"),
                Event::Write(vec![0x00, 0x04]),
                Event::Read(3),
                Event::Release("cs"),
            ]
        );
    }
}
