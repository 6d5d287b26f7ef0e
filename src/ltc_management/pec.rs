//! Packet error code used on every LTC6804 command and data block.

const CRC15_POLY: u16 = 0x4599;
const PEC_SEED: u16 = 16;

const fn crc15_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut remainder = (i as u16) << 7;
        let mut bit = 0;
        while bit < 8 {
            if remainder & 0x4000 != 0 {
                remainder = (remainder << 1) ^ CRC15_POLY;
            } else {
                remainder <<= 1;
            }
            bit += 1;
        }
        table[i] = remainder;
        i += 1;
    }
    table
}

static CRC15_TABLE: [u16; 256] = crc15_table();

/// PEC of `data`, most significant byte first.
pub fn calculate_pec(data: &[u8]) -> [u8; 2] {
    let mut remainder: u16 = PEC_SEED;

    for byte in data {
        let address = (((remainder >> 7) ^ (*byte as u16)) & 0xff) as usize;
        remainder = (remainder << 8) ^ CRC15_TABLE[address];
    }

    // The CRC15 has a 0 in the LSB
    remainder <<= 1;

    [(remainder >> 8) as u8, remainder as u8]
}

/// True when the trailing two bytes of `block` are the PEC of the rest.
pub fn check_pec(block: &[u8]) -> bool {
    match block.len().checked_sub(2) {
        Some(split) => calculate_pec(&block[..split]) == [block[split], block[split + 1]],
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_matches_polynomial() {
        assert_eq!(CRC15_TABLE[0], 0x0000);
        assert_eq!(CRC15_TABLE[1], 0xc599);
        assert_eq!(CRC15_TABLE[2], 0xceab);
        assert_eq!(CRC15_TABLE[255], 0x8095);
    }

    #[test]
    fn datasheet_command_pecs() {
        // WRCFG and RDCVA as listed in the LTC6804 datasheet.
        assert_eq!(calculate_pec(&[0x00, 0x01]), [0x3D, 0x6E]);
        assert_eq!(calculate_pec(&[0x00, 0x04]), [0x07, 0xC2]);
    }

    #[test]
    fn check_rejects_corruption() {
        let mut block = [0x10, 0x90, 0x20, 0x90, 0x30, 0x90, 0, 0];
        let pec = calculate_pec(&block[..6]);
        block[6..].copy_from_slice(&pec);
        assert!(check_pec(&block));

        block[2] ^= 0x01;
        assert!(!check_pec(&block));
        assert!(!check_pec(&[0x01]));
    }
}
