use crate::types::N_SAMPLES;

/// Fixed-length FIFO of raw readings with its integer mean.
///
/// The window starts zero-filled, so until `N_SAMPLES` readings have been
/// pushed the mean is pulled towards zero.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SampleWindow {
    samples: [u16; N_SAMPLES],
    index: usize,
    filled: usize,
    average: u16,
}

impl Default for SampleWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleWindow {
    pub const fn new() -> Self {
        SampleWindow {
            samples: [0; N_SAMPLES],
            index: 0,
            filled: 0,
            average: 0,
        }
    }

    /// Evicts the oldest reading, stores `value` and returns the new mean.
    pub fn push(&mut self, value: u16) -> u16 {
        self.samples[self.index] = value;
        self.index += 1;
        if self.index >= N_SAMPLES {
            self.index = 0;
        }
        if self.filled < N_SAMPLES {
            self.filled += 1;
        }

        let mut sum: u32 = 0;
        for &sample in self.samples.iter() {
            sum += sample as u32;
        }
        self.average = (sum / N_SAMPLES as u32) as u16;
        self.average
    }

    pub fn average(&self) -> u16 {
        self.average
    }

    pub fn is_full(&self) -> bool {
        self.filled == N_SAMPLES
    }

    /// Readings in arrival order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        let (newer, older) = self.samples.split_at(self.index);
        older.iter().chain(newer.iter()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_covers_only_the_last_window() {
        let mut window = SampleWindow::new();
        let readings: Vec<u16> = (0..(N_SAMPLES as u16 * 3)).map(|i| 36_000 + i * 7).collect();
        for &r in &readings {
            window.push(r);
        }
        let tail = &readings[readings.len() - N_SAMPLES..];
        let expected = tail.iter().map(|&v| v as u32).sum::<u32>() / N_SAMPLES as u32;
        assert!(window.is_full());
        assert_eq!(window.average() as u32, expected);
        assert_eq!(window.iter().collect::<Vec<_>>(), tail.to_vec());
    }

    #[test]
    fn partial_window_is_seeded_from_zero() {
        let mut window = SampleWindow::new();
        let avg = window.push(1000);
        assert!(!window.is_full());
        assert_eq!(avg, 1000 / N_SAMPLES as u16);
    }

    #[test]
    fn empty_window_averages_to_zero() {
        let window = SampleWindow::new();
        assert_eq!(window.average(), 0);
        assert!(!window.is_full());
    }

    #[test]
    fn integer_mean_truncates() {
        let mut window = SampleWindow::new();
        for _ in 0..N_SAMPLES - 1 {
            window.push(10);
        }
        // (9 * 10 + 19) / 10 = 10.9
        assert_eq!(window.push(19), 10);
    }

    #[test]
    fn full_scale_readings_do_not_overflow() {
        let mut window = SampleWindow::new();
        for _ in 0..N_SAMPLES {
            window.push(u16::MAX);
        }
        assert_eq!(window.average(), u16::MAX);
    }
}
