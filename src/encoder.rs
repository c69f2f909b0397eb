//! Raster command framing for one print job.

use std::convert::TryFrom;

use bitflags::bitflags;
use log::info;

use crate::{convert::PreparedImage, error::Error, label::LabelSpec};

/// Media type byte for continuous length tape.
const CONTINUOUS_TAPE: u8 = 0x0A;

bitflags! {
    /// Validity flags of the `ESC i z` print information command.
    struct PrintInfoFlags: u8 {
        const MEDIA_TYPE = 0b0000_0010;
        const MEDIA_WIDTH = 0b0000_0100;
        const MEDIA_LENGTH = 0b0000_1000;
        const HIGH_QUALITY = 0b0100_0000;
        const RECOVER = 0b1000_0000;
    }
}

/// Bytes of one complete print job, in the order the printer consumes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    data: Vec<u8>,
}

impl CommandFrame {
    /// Serialize `image` for `label`.
    ///
    /// Pure: the same inputs always produce the same bytes. Fails without
    /// output if a row is longer than a raster statement can announce.
    pub fn encode(image: &PreparedImage, label: &LabelSpec) -> Result<Self, Error> {
        let row_len = u8::try_from(image.row_bytes())
            .map_err(|_| Error::RowTooWide(image.row_bytes()))?;
        let mut frame = CommandFrame { data: Vec::new() };

        frame.add_invalidate();
        frame.add_initialize();
        frame.add_status_request();
        frame.add_media_info(label.width_mm(), image.height_px());
        frame.add_margin(label.margin_px());
        frame.add_payload(image, row_len);
        frame.add_finalize();

        Ok(frame)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn add_invalidate(&mut self) {
        info!("adding invalidation statement");
        self.data.extend_from_slice(&[0x00; 200]);
    }

    fn add_initialize(&mut self) {
        info!("adding initialization statement");
        self.data.extend_from_slice(&[0x1B, 0x40]); // ESC @
    }

    fn add_status_request(&mut self) {
        info!("adding status info request statement");
        self.data.extend_from_slice(&[0x1B, 0x69, 0x53]); // ESC i S
    }

    fn add_media_info(&mut self, width_mm: u8, height: u32) {
        info!("adding media info statement ({}|{})", width_mm, height);
        self.data.extend_from_slice(&[0x1B, 0x69, 0x7A]); // ESC i z

        let flags = PrintInfoFlags::RECOVER
            | PrintInfoFlags::MEDIA_TYPE
            | PrintInfoFlags::MEDIA_WIDTH
            | PrintInfoFlags::MEDIA_LENGTH;

        // continuous tape has no label length
        self.data
            .extend_from_slice(&[flags.bits(), CONTINUOUS_TAPE, width_mm, 0x00]);
        self.data.extend_from_slice(&height.to_le_bytes());
        self.data.extend_from_slice(&[0x00, 0x00]);
    }

    fn add_margin(&mut self, margin: u16) {
        info!("adding margin statement ({})", margin);
        self.data.extend_from_slice(&[0x1B, 0x69, 0x64]); // ESC i d
        self.data.extend_from_slice(&margin.to_le_bytes());
    }

    fn add_payload(&mut self, image: &PreparedImage, row_len: u8) {
        info!("adding payload statements (~{})", image.bits().len());

        for row in image.rows() {
            self.data.extend_from_slice(&[0x67, 0x00, row_len]);
            self.data.extend_from_slice(row);
        }
    }

    fn add_finalize(&mut self) {
        info!("adding finalization statement");
        self.data.push(0x1A); // Control-Z : Print then Eject
    }
}

impl AsRef<[u8]> for CommandFrame {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const HEADER: usize = 200 + 2 + 3 + 13 + 5;

    fn label() -> LabelSpec {
        *LabelSpec::lookup("29").unwrap()
    }

    #[test]
    fn header_layout() {
        let image = PreparedImage::new(16, 2, vec![0xAA, 0x55, 0x0F, 0xF0]);
        let frame = CommandFrame::encode(&image, &label()).unwrap();
        let bytes = frame.as_bytes();

        assert!(bytes[..200].iter().all(|b| *b == 0));
        assert_eq!(&bytes[200..202], &[0x1B, 0x40]);
        assert_eq!(&bytes[202..205], &[0x1B, 0x69, 0x53]);
        assert_eq!(
            &bytes[205..218],
            &[0x1B, 0x69, 0x7A, 0x8E, 0x0A, 29, 0x00, 2, 0, 0, 0, 0x00, 0x00]
        );
        assert_eq!(&bytes[218..223], &[0x1B, 0x69, 0x64, 35, 0]);

        let flags = PrintInfoFlags::from_bits_truncate(bytes[208]);
        assert!(!flags.contains(PrintInfoFlags::HIGH_QUALITY));
    }

    #[test]
    fn payload_rows() {
        let image = PreparedImage::new(16, 2, vec![0xAA, 0x55, 0x0F, 0xF0]);
        let frame = CommandFrame::encode(&image, &label()).unwrap();

        assert_eq!(
            &frame.as_bytes()[HEADER..],
            &[0x67, 0x00, 2, 0xAA, 0x55, 0x67, 0x00, 2, 0x0F, 0xF0, 0x1A][..]
        );
        assert_eq!(frame.len(), HEADER + 2 * (3 + 2) + 1);
    }

    #[test]
    fn partial_row_is_dropped() {
        let image = PreparedImage::new(16, 2, vec![0x01, 0x02, 0x03]);
        let frame = CommandFrame::encode(&image, &label()).unwrap();

        assert_eq!(
            &frame.as_bytes()[HEADER..],
            &[0x67, 0x00, 2, 0x01, 0x02, 0x1A][..]
        );
    }

    #[test]
    fn height_is_little_endian() {
        let image = PreparedImage::new(8, 0x0001_0203, Vec::new());
        let frame = CommandFrame::encode(&image, &label()).unwrap();
        let height = &frame.as_bytes()[212..216];
        assert_eq!(height, &[0x03, 0x02, 0x01, 0x00]);
        assert_eq!(
            u32::from_le_bytes([height[0], height[1], height[2], height[3]]),
            0x0001_0203
        );
    }

    #[test]
    fn encoding_is_deterministic() {
        let image = PreparedImage::new(24, 3, (0..9).collect());
        let first = CommandFrame::encode(&image, &label()).unwrap();
        let second = CommandFrame::encode(&image, &label()).unwrap();
        assert_eq!(first, second);
        assert_eq!(image.bits(), &[0, 1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn row_statement_length_fits_a_byte() {
        let widest = PreparedImage::new(255 * 8, 1, vec![0x81; 255]);
        let frame = CommandFrame::encode(&widest, &label()).unwrap();
        assert_eq!(&frame.as_bytes()[HEADER..HEADER + 3], &[0x67, 0x00, 0xFF]);

        let too_wide = PreparedImage::new(256 * 8, 1, vec![0x81; 256]);
        assert!(matches!(
            CommandFrame::encode(&too_wide, &label()),
            Err(Error::RowTooWide(256))
        ));
    }

    #[test]
    fn empty_image_still_frames_job() {
        let image = PreparedImage::new(720, 0, Vec::new());
        let frame = CommandFrame::encode(&image, &label()).unwrap();
        assert_eq!(frame.len(), HEADER + 1);
        assert_eq!(frame.into_bytes().last(), Some(&0x1A));
    }
}
