//! Wire codec for the multiplexed text protocol.
//!
//! A received buffer carries one or more frames separated by
//! [`MESSAGE_DELIMITER`]; each frame carries fields separated by
//! [`FIELD_DELIMITER`], the first field being the frame's type tag.
//!
//! Both delimiters are noncharacters, which business logic never places inside
//! field content, so the codec does not escape anything.

use crate::error::ProtocolError;

/// Separates fields within a frame.
pub const FIELD_DELIMITER: &str = "\u{ffff}";

/// Separates frames within a buffer.
pub const MESSAGE_DELIMITER: &str = "\u{fffe}";

/// One decoded protocol message, borrowing from the received buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame<'a> {
    raw: &'a str,
    fields: Vec<&'a str>,
}

impl<'a> Frame<'a> {
    /// Splits a single frame into its fields.
    ///
    /// There is always at least one field: an empty frame carries a single
    /// empty tag.
    pub fn parse(raw: &'a str) -> Self {
        Self {
            raw,
            fields: raw.split(FIELD_DELIMITER).collect(),
        }
    }

    /// The type tag, if the frame has any fields.
    pub fn tag(&self) -> Option<&'a str> {
        self.fields.first().copied()
    }

    /// All fields including the tag.
    pub fn fields(&self) -> &[&'a str] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The frame text as received.
    pub fn raw(&self) -> &'a str {
        self.raw
    }
}

/// Checks a whole buffer before any splitting happens.
///
/// The size bound is checked first, then the byte range (no control bytes,
/// so no NUL, tab or newline), then UTF-8 validity.
pub fn validate(data: &[u8], max_size: usize) -> Result<&str, ProtocolError> {
    if data.len() > max_size {
        return Err(ProtocolError::BadRequestSize);
    }

    if data.iter().any(|&b| b < 32) {
        return Err(ProtocolError::BadByteSequence);
    }

    std::str::from_utf8(data).map_err(|_| ProtocolError::InvalidUtf8)
}

/// Splits validated text into frames, in order.
pub fn split_frames(text: &str) -> impl Iterator<Item = Frame<'_>> {
    text.split(MESSAGE_DELIMITER).map(Frame::parse)
}

/// Validates a buffer and splits it into frames.
///
/// Either every frame of the buffer is returned or none: a buffer that fails
/// validation yields no frames.
pub fn decode(data: &[u8], max_size: usize) -> Result<Vec<Frame<'_>>, ProtocolError> {
    let text = validate(data, max_size)?;
    Ok(split_frames(text).collect())
}

/// Joins fields into a single outbound frame.
pub fn encode_frame<S: AsRef<str>>(fields: &[S]) -> String {
    let mut frame = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            frame.push_str(FIELD_DELIMITER);
        }
        frame.push_str(field.as_ref());
    }
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(frames: &[&[&str]]) -> String {
        frames
            .iter()
            .map(|fields| encode_frame(*fields))
            .collect::<Vec<_>>()
            .join(MESSAGE_DELIMITER)
    }

    #[test]
    fn splits_frames_and_fields_in_order() {
        let data = buffer(&[&["gsay", "hi"], &["ploc", "0001", "x"], &["i"]]);
        let frames = decode(data.as_bytes(), 4096).unwrap();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].fields(), &["gsay", "hi"]);
        assert_eq!(frames[1].tag(), Some("ploc"));
        assert_eq!(frames[1].fields().len(), 3);
        assert_eq!(frames[2].fields(), &["i"]);
        assert_eq!(frames[2].raw(), "i");
    }

    #[test]
    fn empty_frame_has_an_empty_tag() {
        let frame = Frame::parse("");
        assert!(!frame.is_empty());
        assert_eq!(frame.tag(), Some(""));
        assert_eq!(frame.fields(), &[""]);

        let data = format!("i{MESSAGE_DELIMITER}");
        let frames = decode(data.as_bytes(), 4096).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].tag(), Some(""));
    }

    #[test]
    fn rejects_oversized_buffer() {
        let data = "a".repeat(4097);
        assert_eq!(
            decode(data.as_bytes(), 4096),
            Err(ProtocolError::BadRequestSize)
        );

        let exact = "a".repeat(4096);
        assert!(decode(exact.as_bytes(), 4096).is_ok());
    }

    #[test]
    fn rejects_control_bytes() {
        for bad in [
            b"gsay\x00hi".as_slice(),
            b"gsay\thi".as_slice(),
            b"gsay\nhi".as_slice(),
            b"\x1f".as_slice(),
        ] {
            assert_eq!(decode(bad, 4096), Err(ProtocolError::BadByteSequence));
        }
        assert!(decode(b" ~\x7f", 4096).is_ok());
    }

    #[test]
    fn rejects_invalid_utf8() {
        assert_eq!(
            decode(&[b'g', 0xff, 0xfe, b'x'], 4096),
            Err(ProtocolError::InvalidUtf8)
        );
        // truncated multi-byte sequence
        assert_eq!(decode(&[0xe2, 0x82], 4096), Err(ProtocolError::InvalidUtf8));
    }

    #[test]
    fn size_is_checked_before_bytes() {
        let mut data = vec![0u8; 5000];
        data[0] = b'a';
        assert_eq!(decode(&data, 4096), Err(ProtocolError::BadRequestSize));
    }

    #[test]
    fn delimiters_pass_byte_validation() {
        assert!(FIELD_DELIMITER.bytes().all(|b| b >= 32));
        assert!(MESSAGE_DELIMITER.bytes().all(|b| b >= 32));
    }

    #[test]
    fn encode_joins_with_field_delimiter() {
        assert_eq!(encode_frame(&["pc", "7"]), format!("pc{FIELD_DELIMITER}7"));
        assert_eq!(encode_frame(&["s"]), "s");
        assert_eq!(encode_frame::<&str>(&[]), "");
    }
}
