//! Minimal decoder for the fields of an EDID block we publish

use std::fmt;

/// Offset past the last byte we read (vertical size at 0x16)
const EDID_MIN_LEN: usize = 23;

/// Display identification decoded from an EDID base block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdidSummary {
    pub product_id: String,
    pub manufacturer_id: String,
    pub serial_number: String,
    /// Maximum horizontal image size in centimetres
    pub width_cm: u8,
    /// Maximum vertical image size in centimetres
    pub height_cm: u8,
}

impl EdidSummary {
    /// Decode the header fields, `None` if the block is too short
    pub fn parse(edid: &[u8]) -> Option<Self> {
        if edid.len() < EDID_MIN_LEN {
            return None;
        }

        // Three 5-bit letters packed big-endian, 1 = 'A'
        let packed = u16::from_be_bytes([edid[8], edid[9]]);
        let manufacturer_id: String = [10u16, 5, 0]
            .iter()
            .map(|shift| pnp_letter(((packed >> shift) & 0x1f) as u8))
            .collect();

        let product = u16::from_le_bytes([edid[10], edid[11]]);
        let serial = u32::from_le_bytes([edid[12], edid[13], edid[14], edid[15]]);

        Some(Self {
            product_id: format!("{:x}", product),
            manufacturer_id,
            serial_number: format!("{:x}", serial),
            width_cm: edid[21],
            height_cm: edid[22],
        })
    }
}

/// Letter for one 5-bit PNP code, `?` outside 1..=26
fn pnp_letter(code: u8) -> char {
    match code {
        1..=26 => (b'A' + code - 1) as char,
        _ => '?',
    }
}

impl fmt::Display for EdidSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "product {}, manufacturer {}, SN: {}, width: {}, height: {}",
            self.product_id, self.manufacturer_id, self.serial_number, self.width_cm, self.height_cm
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_edid() -> Vec<u8> {
        let mut edid = vec![0u8; 128];
        edid[..8].copy_from_slice(&[0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00]);
        // "DEL"
        edid[8] = 0x10;
        edid[9] = 0xac;
        edid[10] = 0xc3;
        edid[11] = 0xa0;
        edid[12..16].copy_from_slice(&[0x41, 0x30, 0x53, 0x4c]);
        edid[21] = 53;
        edid[22] = 30;
        edid
    }

    #[test]
    fn test_parse_edid_header() {
        let summary = EdidSummary::parse(&sample_edid()).unwrap();

        assert_eq!(summary.manufacturer_id, "DEL");
        assert_eq!(summary.product_id, "a0c3");
        assert_eq!(summary.serial_number, "4c533041");
        assert_eq!(summary.width_cm, 53);
        assert_eq!(summary.height_cm, 30);
        assert_eq!(
            summary.to_string(),
            "product a0c3, manufacturer DEL, SN: 4c533041, width: 53, height: 30"
        );
    }

    #[test]
    fn test_invalid_manufacturer_letters() {
        let mut edid = sample_edid();
        // 00000 00001 11111: zero, 'A', out of range
        edid[8] = 0x00;
        edid[9] = 0x3f;
        let summary = EdidSummary::parse(&edid).unwrap();
        assert_eq!(summary.manufacturer_id, "?A?");
    }

    #[test]
    fn test_short_edid_is_rejected() {
        assert_eq!(EdidSummary::parse(&[0u8; 16]), None);
    }
}
