//! Frames and client messages
//!
//! A client message is a sequence of frames. Each frame on the wire is
//! `length: i32 LE` (including the 6 byte header), `flags: u16 LE`, then the
//! content. The last frame of a message carries [`flags::IS_FINAL`].
//!
//! The initial frame of a request holds the message type, correlation id and
//! partition id followed by the fixed-size parameters of the operation. A
//! response's initial frame holds the message type, correlation id and the
//! backup-ack count followed by fixed-size response parameters.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, MAX_FRAME_SIZE, MAX_MESSAGE_SIZE};
use crate::Result;

/// Size of the length prefix plus flags
pub const FRAME_HEADER_SIZE: usize = 6;

/// Offset of the message type in the initial frame
pub const TYPE_FIELD_OFFSET: usize = 0;
/// Offset of the correlation id in the initial frame
pub const CORRELATION_ID_FIELD_OFFSET: usize = 4;
/// Offset of the partition id in a request's initial frame
pub const PARTITION_ID_FIELD_OFFSET: usize = 12;
/// Offset of the first fixed-size request parameter
pub const REQUEST_HEADER_SIZE: usize = 16;
/// Offset of the backup-ack count in a response's initial frame
pub const RESPONSE_BACKUP_ACKS_FIELD_OFFSET: usize = 12;
/// Offset of the first fixed-size response parameter
pub const RESPONSE_HEADER_SIZE: usize = 13;

/// Frame flag bits
pub mod flags {
    /// No flags set
    pub const DEFAULT: u16 = 0;
    /// First frame of a (possibly fragmented) message
    pub const BEGIN_FRAGMENT: u16 = 1 << 15;
    /// Last fragment of a message
    pub const END_FRAGMENT: u16 = 1 << 14;
    /// Last frame of a message
    pub const IS_FINAL: u16 = 1 << 13;
    /// Opens a nested structure or list
    pub const BEGIN_DATA_STRUCTURE: u16 = 1 << 12;
    /// Closes a nested structure or list
    pub const END_DATA_STRUCTURE: u16 = 1 << 11;
    /// Placeholder for a null value
    pub const IS_NULL: u16 = 1 << 10;
    /// Message is a server-pushed event
    pub const IS_EVENT: u16 = 1 << 9;
    /// Initial frame flags for a message sent in one piece
    pub const UNFRAGMENTED_MESSAGE: u16 = BEGIN_FRAGMENT | END_FRAGMENT;
}

/// A single protocol frame
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Flag bits (see [`flags`])
    pub flags: u16,
    /// Frame payload
    pub content: Bytes,
}

impl Frame {
    /// Create a frame with default flags
    pub fn new(content: impl Into<Bytes>) -> Self {
        Self::with_flags(content, flags::DEFAULT)
    }

    /// Create a frame with explicit flags
    pub fn with_flags(content: impl Into<Bytes>, flags: u16) -> Self {
        Self {
            flags,
            content: content.into(),
        }
    }

    /// Null placeholder frame
    pub fn null() -> Self {
        Self::with_flags(Bytes::new(), flags::IS_NULL)
    }

    /// Structure/list opening frame
    pub fn begin() -> Self {
        Self::with_flags(Bytes::new(), flags::BEGIN_DATA_STRUCTURE)
    }

    /// Structure/list closing frame
    pub fn end() -> Self {
        Self::with_flags(Bytes::new(), flags::END_DATA_STRUCTURE)
    }

    /// Whether this frame stands for a null value
    pub fn is_null(&self) -> bool {
        self.flags & flags::IS_NULL != 0
    }

    /// Whether this frame opens a structure
    pub fn is_begin(&self) -> bool {
        self.flags & flags::BEGIN_DATA_STRUCTURE != 0
    }

    /// Whether this frame closes a structure
    pub fn is_end(&self) -> bool {
        self.flags & flags::END_DATA_STRUCTURE != 0
    }

    /// Whether this is the last frame of a message
    pub fn is_final(&self) -> bool {
        self.flags & flags::IS_FINAL != 0
    }

    /// Size of this frame on the wire
    pub fn encoded_len(&self) -> usize {
        FRAME_HEADER_SIZE + self.content.len()
    }

    fn encode_into(&self, buf: &mut BytesMut, extra_flags: u16) {
        // Frame sizes are bounded by MAX_FRAME_SIZE, well inside i32.
        buf.put_i32_le(self.encoded_len() as i32);
        buf.put_u16_le(self.flags | extra_flags);
        buf.put_slice(&self.content);
    }

    /// Decode one frame from the front of `buf`.
    ///
    /// Returns `Ok(None)` when `buf` does not yet hold a complete frame; the
    /// buffer is left untouched in that case.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Frame>> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }
        let mut prefix = &buf[..4];
        let length = prefix.get_i32_le();
        if length < FRAME_HEADER_SIZE as i32 || length as usize > MAX_FRAME_SIZE {
            return Err(ProtocolError::InvalidFrameLength {
                length: i64::from(length),
            });
        }
        let length = length as usize;
        if buf.len() < length {
            return Ok(None);
        }
        let mut raw = buf.split_to(length);
        raw.advance(4);
        let flags = raw.get_u16_le();
        Ok(Some(Frame {
            flags,
            content: raw.freeze(),
        }))
    }
}

/// An ordered list of frames forming one request, response or event
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientMessage {
    frames: Vec<Frame>,
}

impl ClientMessage {
    /// Build a message from frames
    pub fn from_frames(frames: Vec<Frame>) -> Self {
        Self { frames }
    }

    /// Append a frame
    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    /// All frames in order
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Reader positioned at the first frame after the initial frame
    pub fn body(&self) -> FrameReader<'_> {
        FrameReader::new(self.frames.get(1..).unwrap_or_default())
    }

    /// The initial frame
    pub fn initial_frame(&self) -> Result<&Frame> {
        self.frames
            .first()
            .ok_or(ProtocolError::MissingFrame("initial frame"))
    }

    /// Message type from the initial frame
    pub fn message_type(&self) -> Result<i32> {
        let content = &self.initial_frame()?.content;
        crate::codec::FixedReader::at(content, TYPE_FIELD_OFFSET).read_int()
    }

    /// Correlation id from the initial frame
    pub fn correlation_id(&self) -> Result<i64> {
        let content = &self.initial_frame()?.content;
        crate::codec::FixedReader::at(content, CORRELATION_ID_FIELD_OFFSET).read_long()
    }

    /// Overwrite the correlation id in the initial frame
    pub fn set_correlation_id(&mut self, id: i64) -> Result<()> {
        let frame = self
            .frames
            .first_mut()
            .ok_or(ProtocolError::MissingFrame("initial frame"))?;
        let end = CORRELATION_ID_FIELD_OFFSET + 8;
        if frame.content.len() < end {
            return Err(ProtocolError::truncated(end, frame.content.len()));
        }
        let mut content = BytesMut::from(&frame.content[..]);
        content[CORRELATION_ID_FIELD_OFFSET..end].copy_from_slice(&id.to_le_bytes());
        frame.content = content.freeze();
        Ok(())
    }

    /// Whether the server flagged this message as an event
    pub fn is_event(&self) -> bool {
        self.frames
            .first()
            .is_some_and(|f| f.flags & flags::IS_EVENT != 0)
    }

    /// Serialize to wire bytes, marking the last frame final
    pub fn to_bytes(&self) -> Bytes {
        let total: usize = self.frames.iter().map(Frame::encoded_len).sum();
        let mut buf = BytesMut::with_capacity(total);
        let last = self.frames.len().saturating_sub(1);
        for (i, frame) in self.frames.iter().enumerate() {
            let extra = if i == last { flags::IS_FINAL } else { 0 };
            frame.encode_into(&mut buf, extra);
        }
        buf.freeze()
    }

    /// Parse a complete message from wire bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut buf = BytesMut::from(bytes);
        let mut assembler = MessageAssembler::default();
        while let Some(frame) = Frame::decode(&mut buf)? {
            if let Some(message) = assembler.push(frame)? {
                return Ok(message);
            }
        }
        Err(ProtocolError::MissingFrame("final frame"))
    }
}

/// Collects frames read off a stream until a final frame completes a message
#[derive(Debug)]
pub struct MessageAssembler {
    frames: Vec<Frame>,
    size: usize,
    limit: usize,
}

impl Default for MessageAssembler {
    fn default() -> Self {
        Self::with_limit(MAX_MESSAGE_SIZE)
    }
}

impl MessageAssembler {
    /// Assembler rejecting messages larger than `limit` bytes
    pub fn with_limit(limit: usize) -> Self {
        Self {
            frames: Vec::new(),
            size: 0,
            limit,
        }
    }

    /// Add a frame, returning the message once its final frame arrives.
    ///
    /// Crossing the size limit drops the partial message and fails; the
    /// stream it came from cannot be trusted after that.
    pub fn push(&mut self, frame: Frame) -> Result<Option<ClientMessage>> {
        self.size = self.size.saturating_add(frame.encoded_len());
        if self.size > self.limit {
            let size = self.size;
            self.frames.clear();
            self.size = 0;
            return Err(ProtocolError::MessageTooLarge {
                size,
                limit: self.limit,
            });
        }
        let is_final = frame.is_final();
        self.frames.push(frame);
        if !is_final {
            return Ok(None);
        }
        self.size = 0;
        Ok(Some(ClientMessage::from_frames(std::mem::take(&mut self.frames))))
    }
}

/// Cursor over the frames of a message body
#[derive(Clone, Debug)]
pub struct FrameReader<'a> {
    frames: &'a [Frame],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    /// Create a reader over `frames`
    pub fn new(frames: &'a [Frame]) -> Self {
        Self { frames, pos: 0 }
    }

    /// Look at the next frame without consuming it
    pub fn peek(&self) -> Option<&'a Frame> {
        self.frames.get(self.pos)
    }

    /// Consume the next frame
    pub fn next_frame(&mut self, what: &'static str) -> Result<&'a Frame> {
        let frame = self
            .frames
            .get(self.pos)
            .ok_or(ProtocolError::MissingFrame(what))?;
        self.pos += 1;
        Ok(frame)
    }

    /// If the next frame is a null placeholder, consume it and return true
    pub fn next_is_null(&mut self) -> bool {
        match self.peek() {
            Some(frame) if frame.is_null() => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    /// If the next frame closes a structure, consume it and return true
    pub fn next_is_end(&mut self) -> bool {
        match self.peek() {
            Some(frame) if frame.is_end() => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    /// Skip frames up to and including the end of the current structure,
    /// honoring nested structures. Used to ignore trailing fields that newer
    /// servers append.
    pub fn skip_to_struct_end(&mut self) -> Result<()> {
        let mut depth = 1usize;
        loop {
            let frame = self.next_frame("end of structure")?;
            if frame.is_end() {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            } else if frame.is_begin() {
                depth += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message() -> ClientMessage {
        ClientMessage::from_frames(vec![
            Frame::with_flags(vec![0u8; REQUEST_HEADER_SIZE], flags::UNFRAGMENTED_MESSAGE),
            Frame::new(&b"my-map"[..]),
            Frame::null(),
        ])
    }

    #[test]
    fn last_frame_is_marked_final_on_the_wire() {
        let bytes = sample_message().to_bytes();
        let parsed = ClientMessage::from_bytes(&bytes).unwrap();

        assert_eq!(parsed.frames().len(), 3);
        assert!(parsed.frames()[2].is_final());
        assert!(parsed.frames()[2].is_null());
        assert!(!parsed.frames()[1].is_final());
        assert_eq!(&parsed.frames()[1].content[..], b"my-map");
    }

    #[test]
    fn frame_length_includes_header() {
        let bytes = ClientMessage::from_frames(vec![Frame::new(&b"abc"[..])]).to_bytes();
        assert_eq!(bytes.len(), 9);
        assert_eq!(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]), 9);
    }

    #[test]
    fn partial_frame_is_not_consumed() {
        let bytes = sample_message().to_bytes();
        let mut buf = BytesMut::from(&bytes[..4]);
        assert!(Frame::decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn negative_length_is_rejected() {
        let mut buf = BytesMut::from(&[0xff, 0xff, 0xff, 0xff, 0, 0][..]);
        assert!(matches!(
            Frame::decode(&mut buf),
            Err(ProtocolError::InvalidFrameLength { length: -1 })
        ));
    }

    #[test]
    fn message_without_final_frame_is_an_error() {
        let bytes = sample_message().to_bytes();
        let cut = bytes.len() - FRAME_HEADER_SIZE;
        assert!(ClientMessage::from_bytes(&bytes[..cut]).is_err());
    }

    #[test]
    fn correlation_id_can_be_assigned_after_encoding() {
        let mut message = sample_message();
        message.set_correlation_id(42).unwrap();
        assert_eq!(message.correlation_id().unwrap(), 42);
        assert_eq!(message.message_type().unwrap(), 0);
    }

    #[test]
    fn assembler_waits_for_final_frame() {
        let mut assembler = MessageAssembler::default();
        assert!(assembler.push(Frame::new(&b"a"[..])).unwrap().is_none());
        let done = assembler
            .push(Frame::with_flags(&b"b"[..], flags::IS_FINAL))
            .unwrap()
            .unwrap();
        assert_eq!(done.frames().len(), 2);
    }

    #[test]
    fn assembler_rejects_messages_that_never_end() {
        // Two 10-byte frames fit, the third crosses the limit
        let mut assembler = MessageAssembler::with_limit(25);
        let chunk = || Frame::new(&b"abcd"[..]);
        assert!(assembler.push(chunk()).unwrap().is_none());
        assert!(assembler.push(chunk()).unwrap().is_none());
        assert!(matches!(
            assembler.push(chunk()),
            Err(ProtocolError::MessageTooLarge { size: 30, limit: 25 })
        ));

        // The partial message is gone; a fresh one assembles normally
        let done = assembler
            .push(Frame::with_flags(&b"ok"[..], flags::IS_FINAL))
            .unwrap()
            .unwrap();
        assert_eq!(done.frames().len(), 1);
    }

    #[test]
    fn skip_to_struct_end_handles_nesting() {
        let frames = vec![
            Frame::new(&b"x"[..]),
            Frame::begin(),
            Frame::new(&b"y"[..]),
            Frame::end(),
            Frame::end(),
            Frame::new(&b"after"[..]),
        ];
        let mut reader = FrameReader::new(&frames);
        reader.skip_to_struct_end().unwrap();
        assert_eq!(&reader.next_frame("after").unwrap().content[..], b"after");
    }
}
