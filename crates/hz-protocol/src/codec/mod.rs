//! Request encoders and response decoders
//!
//! Each submodule covers one protocol service. The helpers in this module
//! build initial frames with fixed-size fields and read variable-size fields
//! (strings, nullable values, lists) back out of frames.

pub mod client;
pub mod dynamic_config;
pub mod error;
pub mod jet;

use bytes::{Buf, BufMut, BytesMut};
use uuid::Uuid;

use crate::error::ProtocolError;
use crate::frame::{flags, ClientMessage, Frame, FrameReader, REQUEST_HEADER_SIZE};
use crate::Result;

/// Size of an encoded boolean
pub const BOOLEAN_SIZE: usize = 1;
/// Size of an encoded byte
pub const BYTE_SIZE: usize = 1;
/// Size of an encoded int
pub const INT_SIZE: usize = 4;
/// Size of an encoded long
pub const LONG_SIZE: usize = 8;
/// Size of an encoded nullable UUID (null flag + two longs)
pub const UUID_SIZE: usize = 17;

/// Partition id used for requests that are not bound to a partition
pub const NO_PARTITION: i32 = -1;

/// Builder for an initial frame with fixed-size parameters
#[derive(Debug)]
pub struct InitialFrameBuilder {
    buf: BytesMut,
}

impl InitialFrameBuilder {
    /// Start a request frame. Correlation id stays 0 until the transport
    /// assigns one, so encoding is deterministic.
    pub fn request(message_type: i32) -> Self {
        let mut buf = BytesMut::with_capacity(REQUEST_HEADER_SIZE + 32);
        buf.put_i32_le(message_type);
        buf.put_i64_le(0);
        buf.put_i32_le(NO_PARTITION);
        Self { buf }
    }

    /// Start a response frame (used by tests and in-process fakes)
    pub fn response(message_type: i32) -> Self {
        let mut buf = BytesMut::with_capacity(32);
        buf.put_i32_le(message_type);
        buf.put_i64_le(0);
        buf.put_u8(0);
        Self { buf }
    }

    /// Append a boolean
    pub fn bool(mut self, value: bool) -> Self {
        self.buf.put_u8(u8::from(value));
        self
    }

    /// Append a byte
    pub fn byte(mut self, value: u8) -> Self {
        self.buf.put_u8(value);
        self
    }

    /// Append an int
    pub fn int(mut self, value: i32) -> Self {
        self.buf.put_i32_le(value);
        self
    }

    /// Append a long
    pub fn long(mut self, value: i64) -> Self {
        self.buf.put_i64_le(value);
        self
    }

    /// Append a nullable UUID
    pub fn uuid(mut self, value: Option<Uuid>) -> Self {
        match value {
            Some(id) => {
                let (msb, lsb) = id.as_u64_pair();
                self.buf.put_u8(0);
                self.buf.put_u64_le(msb);
                self.buf.put_u64_le(lsb);
            }
            None => {
                self.buf.put_u8(1);
                self.buf.put_u64_le(0);
                self.buf.put_u64_le(0);
            }
        }
        self
    }

    /// Finish the frame
    pub fn build(self) -> Frame {
        Frame::with_flags(self.buf.freeze(), flags::UNFRAGMENTED_MESSAGE)
    }
}

/// Builder for the variable-size part of a message
#[derive(Debug)]
pub struct MessageBuilder {
    message: ClientMessage,
}

impl MessageBuilder {
    /// Start a message with its initial frame
    pub fn new(initial: Frame) -> Self {
        Self {
            message: ClientMessage::from_frames(vec![initial]),
        }
    }

    /// Append a raw frame
    pub fn frame(mut self, frame: Frame) -> Self {
        self.message.push(frame);
        self
    }

    /// Append a string frame
    pub fn string(self, value: &str) -> Self {
        let content = value.as_bytes().to_vec();
        self.frame(Frame::new(content))
    }

    /// Append a string frame or a null frame
    pub fn nullable_string(self, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.string(v),
            None => self.null(),
        }
    }

    /// Append a list of strings
    pub fn string_list(self, values: &[String]) -> Self {
        let builder = self.frame(Frame::begin());
        values
            .iter()
            .fold(builder, |b, v| b.string(v))
            .frame(Frame::end())
    }

    /// Append a null frame
    pub fn null(self) -> Self {
        self.frame(Frame::null())
    }

    /// Finish the message
    pub fn build(self) -> ClientMessage {
        self.message
    }
}

/// Reader for fixed-size fields inside a frame
#[derive(Debug)]
pub struct FixedReader<'a> {
    content: &'a [u8],
}

impl<'a> FixedReader<'a> {
    /// Position a reader at `offset` within `content`
    pub fn at(content: &'a [u8], offset: usize) -> Self {
        Self {
            content: content.get(offset..).unwrap_or_default(),
        }
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        if self.content.remaining() < needed {
            return Err(ProtocolError::truncated(needed, self.content.remaining()));
        }
        Ok(())
    }

    /// Read a boolean
    pub fn read_bool(&mut self) -> Result<bool> {
        self.ensure(BOOLEAN_SIZE)?;
        Ok(self.content.get_u8() != 0)
    }

    /// Read a byte
    pub fn read_byte(&mut self) -> Result<u8> {
        self.ensure(BYTE_SIZE)?;
        Ok(self.content.get_u8())
    }

    /// Read an int
    pub fn read_int(&mut self) -> Result<i32> {
        self.ensure(INT_SIZE)?;
        Ok(self.content.get_i32_le())
    }

    /// Read a long
    pub fn read_long(&mut self) -> Result<i64> {
        self.ensure(LONG_SIZE)?;
        Ok(self.content.get_i64_le())
    }

    /// Read a nullable UUID
    pub fn read_uuid(&mut self) -> Result<Option<Uuid>> {
        self.ensure(UUID_SIZE)?;
        let is_null = self.content.get_u8() != 0;
        let msb = self.content.get_u64_le();
        let lsb = self.content.get_u64_le();
        Ok((!is_null).then(|| Uuid::from_u64_pair(msb, lsb)))
    }
}

/// Check that `message` is a response of type `expected`
pub fn expect_message_type(message: &ClientMessage, expected: i32) -> Result<()> {
    let actual = message.message_type()?;
    if actual != expected {
        return Err(ProtocolError::UnexpectedMessageType { expected, actual });
    }
    Ok(())
}

/// Read a string frame
pub fn read_string(reader: &mut FrameReader<'_>, what: &'static str) -> Result<String> {
    let frame = reader.next_frame(what)?;
    if frame.is_null() || frame.is_begin() || frame.is_end() {
        return Err(ProtocolError::malformed(format!(
            "expected string frame for {what}"
        )));
    }
    Ok(String::from_utf8(frame.content.to_vec())?)
}

/// Read a string frame or a null frame
pub fn read_nullable_string(
    reader: &mut FrameReader<'_>,
    what: &'static str,
) -> Result<Option<String>> {
    if reader.next_is_null() {
        return Ok(None);
    }
    read_string(reader, what).map(Some)
}

/// Read a begin-delimited list of strings
pub fn read_string_list(reader: &mut FrameReader<'_>, what: &'static str) -> Result<Vec<String>> {
    expect_begin(reader, what)?;
    let mut values = Vec::new();
    while !reader.next_is_end() {
        values.push(read_string(reader, what)?);
    }
    Ok(values)
}

/// Consume a structure-opening frame
pub fn expect_begin(reader: &mut FrameReader<'_>, what: &'static str) -> Result<()> {
    let frame = reader.next_frame(what)?;
    if !frame.is_begin() {
        return Err(ProtocolError::malformed(format!(
            "expected begin frame for {what}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_header_carries_type_and_no_partition() {
        let frame = InitialFrameBuilder::request(0x1B0600).bool(true).build();
        let mut reader = FixedReader::at(&frame.content, 0);
        assert_eq!(reader.read_int().unwrap(), 0x1B0600);
        assert_eq!(reader.read_long().unwrap(), 0);
        assert_eq!(reader.read_int().unwrap(), NO_PARTITION);
        assert!(reader.read_bool().unwrap());
        assert_eq!(frame.flags, flags::UNFRAGMENTED_MESSAGE);
    }

    #[test]
    fn uuid_survives_fixed_encoding() {
        let id = Uuid::from_u128(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef);
        let frame = InitialFrameBuilder::request(1)
            .uuid(Some(id))
            .uuid(None)
            .build();
        let mut reader = FixedReader::at(&frame.content, REQUEST_HEADER_SIZE);
        assert_eq!(reader.read_uuid().unwrap(), Some(id));
        assert_eq!(reader.read_uuid().unwrap(), None);
    }

    #[test]
    fn reading_past_the_frame_is_an_error() {
        let frame = InitialFrameBuilder::request(1).build();
        let mut reader = FixedReader::at(&frame.content, REQUEST_HEADER_SIZE);
        assert!(matches!(
            reader.read_int(),
            Err(ProtocolError::Truncated { needed: 4, .. })
        ));
    }

    #[test]
    fn string_list_is_delimited() {
        let message = MessageBuilder::new(InitialFrameBuilder::request(1).build())
            .string_list(&["a".to_string(), "b".to_string()])
            .nullable_string(None)
            .build();
        let mut body = message.body();
        assert_eq!(read_string_list(&mut body, "list").unwrap(), vec!["a", "b"]);
        assert_eq!(read_nullable_string(&mut body, "opt").unwrap(), None);
    }

    #[test]
    fn null_frame_is_not_a_string() {
        let message = MessageBuilder::new(InitialFrameBuilder::request(1).build())
            .null()
            .build();
        let mut body = message.body();
        assert!(read_string(&mut body, "name").is_err());
    }
}
