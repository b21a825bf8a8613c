//! Packed little-endian datagram layout.
//!
//! Every publication is one fixed-size datagram: a message-type byte, the
//! payload packed field by field, zero padding to the end. Fields that
//! would overflow the packet are silently truncated at a field boundary;
//! a partial field must never reach the wire.

/// Fixed datagram size, padding included.
pub const PACKET_SIZE: usize = 320;

pub const MESSAGE_ORDERS: u8 = 1;
pub const MESSAGE_BOOK: u8 = 2;
pub const MESSAGE_BALANCES: u8 = 3;

pub struct PackedWriter {
    buffer: [u8; PACKET_SIZE],
    cursor: usize,
}

impl PackedWriter {
    pub fn new(message_type: u8) -> Self {
        let mut buffer = [0u8; PACKET_SIZE];
        buffer[0] = message_type;
        Self { buffer, cursor: 1 }
    }

    fn put_bytes(&mut self, bytes: &[u8]) {
        if self.cursor + bytes.len() > PACKET_SIZE {
            return;
        }
        self.buffer[self.cursor..self.cursor + bytes.len()].copy_from_slice(bytes);
        self.cursor += bytes.len();
    }

    pub fn put_u32(&mut self, value: u32) {
        self.put_bytes(&value.to_le_bytes());
    }

    pub fn put_u64(&mut self, value: u64) {
        self.put_bytes(&value.to_le_bytes());
    }

    pub fn put_i64(&mut self, value: i64) {
        self.put_bytes(&value.to_le_bytes());
    }

    pub fn put_f64(&mut self, value: f64) {
        self.put_bytes(&value.to_le_bytes());
    }

    /// Length-prefixed string: u32 byte count, then the bytes.
    pub fn put_str(&mut self, value: &str) {
        self.put_u32(value.len() as u32);
        self.put_bytes(value.as_bytes());
    }

    pub fn finish(self) -> [u8; PACKET_SIZE] {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_leads_the_packet() {
        let writer = PackedWriter::new(MESSAGE_BOOK);
        let packet = writer.finish();
        assert_eq!(packet[0], 2);
        assert_eq!(packet.len(), PACKET_SIZE);
    }

    #[test]
    fn fields_pack_little_endian_in_order() {
        let mut writer = PackedWriter::new(MESSAGE_ORDERS);
        writer.put_u64(0x0102_0304_0506_0708);
        writer.put_u32(2);
        writer.put_i64(-1);
        let packet = writer.finish();

        assert_eq!(&packet[1..9], &[0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&packet[9..13], &[2, 0, 0, 0]);
        assert_eq!(&packet[13..21], &[0xFF; 8]);
        // padding stays zeroed
        assert!(packet[21..].iter().all(|b| *b == 0));
    }

    #[test]
    fn strings_are_length_prefixed() {
        let mut writer = PackedWriter::new(MESSAGE_BALANCES);
        writer.put_str("CORE");
        let packet = writer.finish();
        assert_eq!(&packet[1..5], &[4, 0, 0, 0]);
        assert_eq!(&packet[5..9], b"CORE");
    }

    #[test]
    fn overflowing_field_is_dropped_whole() {
        let mut writer = PackedWriter::new(MESSAGE_ORDERS);
        for _ in 0..100 {
            writer.put_u64(u64::MAX);
        }
        let packet = writer.finish();
        // 39 whole u64 fields fit after the type byte; the 40th is dropped
        assert!(packet[1..313].iter().all(|b| *b == 0xFF));
        assert!(packet[313..].iter().all(|b| *b == 0));
    }
}
