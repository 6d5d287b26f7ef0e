/// Classic CAN data frame with a standard identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanFrame {
    id: u16,
    data: [u8; 8],
    len: usize,
}

impl CanFrame {
    /// Payload past eight bytes is dropped.
    pub fn new(id: u16, data: &[u8]) -> Self {
        let mut frame_data = [0u8; 8];
        let len = data.len().min(8);

        frame_data[..len].copy_from_slice(&data[..len]);

        CanFrame {
            id,
            data: frame_data,
            len,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn byte(&self, index: usize) -> u8 {
        self.data[index]
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
