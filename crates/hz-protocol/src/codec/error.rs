//! Error responses
//!
//! A failed invocation is answered with message type [`ERROR_MESSAGE_TYPE`]
//! and a list of error holders, outermost exception first.

use crate::codec::{
    expect_begin, read_nullable_string, read_string, FixedReader, InitialFrameBuilder,
    MessageBuilder,
};
use crate::frame::{ClientMessage, Frame, FrameReader};
use crate::Result;

/// Message type of an error response
pub const ERROR_MESSAGE_TYPE: i32 = 0;

/// Exception classes that mean the cluster refused the shape of the request.
/// Retrying the same request cannot succeed.
const STRUCTURAL_REJECTIONS: &[&str] = &[
    "InvalidConfigurationException",
    "UnsupportedOperationException",
    "IllegalArgumentException",
    "AccessControlException",
];

/// One frame of a server-side stack trace
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackTraceElement {
    /// Declaring class
    pub class_name: String,
    /// Method name
    pub method_name: String,
    /// Source file, when known
    pub file_name: Option<String>,
    /// Source line
    pub line_number: i32,
}

/// A server-side exception
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorHolder {
    /// Protocol error code
    pub error_code: i32,
    /// Fully qualified exception class
    pub class_name: String,
    /// Exception message
    pub message: Option<String>,
    /// Server stack trace
    pub stack_trace: Vec<StackTraceElement>,
}

impl ErrorHolder {
    /// Convenience constructor without a stack trace
    pub fn new(error_code: i32, class_name: impl Into<String>, message: Option<&str>) -> Self {
        Self {
            error_code,
            class_name: class_name.into(),
            message: message.map(str::to_string),
            stack_trace: Vec::new(),
        }
    }

    /// Simple class name (after the last '.')
    pub fn simple_class_name(&self) -> &str {
        self.class_name
            .rsplit('.')
            .next()
            .unwrap_or(&self.class_name)
    }

    /// Whether this error is a structural rejection of the request
    pub fn is_structural_rejection(&self) -> bool {
        STRUCTURAL_REJECTIONS.contains(&self.simple_class_name())
    }

    /// One-line description for status messages
    pub fn describe(&self) -> String {
        match &self.message {
            Some(message) => format!("{}: {}", self.simple_class_name(), message),
            None => self.simple_class_name().to_string(),
        }
    }
}

/// Whether `message` is an error response
pub fn is_error_response(message: &ClientMessage) -> bool {
    message.message_type().ok() == Some(ERROR_MESSAGE_TYPE)
}

/// Decode the error holders of an error response
pub fn decode_error_response(message: &ClientMessage) -> Result<Vec<ErrorHolder>> {
    crate::codec::expect_message_type(message, ERROR_MESSAGE_TYPE)?;
    let mut body = message.body();
    expect_begin(&mut body, "error holder list")?;
    let mut holders = Vec::new();
    while !body.next_is_end() {
        holders.push(decode_error_holder(&mut body)?);
    }
    Ok(holders)
}

fn decode_error_holder(reader: &mut FrameReader<'_>) -> Result<ErrorHolder> {
    expect_begin(reader, "error holder")?;
    let initial = reader.next_frame("error holder fields")?;
    let error_code = FixedReader::at(&initial.content, 0).read_int()?;
    let class_name = read_string(reader, "error class name")?;
    let message = read_nullable_string(reader, "error message")?;
    expect_begin(reader, "stack trace")?;
    let mut stack_trace = Vec::new();
    while !reader.next_is_end() {
        stack_trace.push(decode_stack_trace_element(reader)?);
    }
    reader.skip_to_struct_end()?;
    Ok(ErrorHolder {
        error_code,
        class_name,
        message,
        stack_trace,
    })
}

fn decode_stack_trace_element(reader: &mut FrameReader<'_>) -> Result<StackTraceElement> {
    expect_begin(reader, "stack trace element")?;
    let initial = reader.next_frame("stack trace element fields")?;
    let line_number = FixedReader::at(&initial.content, 0).read_int()?;
    let class_name = read_string(reader, "declaring class")?;
    let method_name = read_string(reader, "method name")?;
    let file_name = read_nullable_string(reader, "file name")?;
    reader.skip_to_struct_end()?;
    Ok(StackTraceElement {
        class_name,
        method_name,
        file_name,
        line_number,
    })
}

/// Encode an error response. Members never receive these; in-process fakes
/// use it to stand in for a failing member.
pub fn encode_error_response(holders: &[ErrorHolder]) -> ClientMessage {
    let mut builder = MessageBuilder::new(InitialFrameBuilder::response(ERROR_MESSAGE_TYPE).build())
        .frame(Frame::begin());
    for holder in holders {
        builder = builder
            .frame(Frame::begin())
            .frame(Frame::new(holder.error_code.to_le_bytes().to_vec()))
            .string(&holder.class_name)
            .nullable_string(holder.message.as_deref())
            .frame(Frame::begin());
        for element in &holder.stack_trace {
            builder = builder
                .frame(Frame::begin())
                .frame(Frame::new(element.line_number.to_le_bytes().to_vec()))
                .string(&element.class_name)
                .string(&element.method_name)
                .nullable_string(element.file_name.as_deref())
                .frame(Frame::end());
        }
        builder = builder.frame(Frame::end()).frame(Frame::end());
    }
    builder.frame(Frame::end()).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid_config() -> ErrorHolder {
        ErrorHolder {
            error_code: 83,
            class_name: "com.hazelcast.config.InvalidConfigurationException".to_string(),
            message: Some("Cannot add a new dynamic configuration".to_string()),
            stack_trace: vec![StackTraceElement {
                class_name: "com.hazelcast.internal.dynamicconfig.ClusterWideConfigurationService"
                    .to_string(),
                method_name: "checkCurrentConfigNullOrEqual".to_string(),
                file_name: None,
                line_number: 412,
            }],
        }
    }

    #[test]
    fn error_response_decodes_holders_and_stack() {
        let message = ClientMessage::from_bytes(
            &encode_error_response(&[invalid_config()]).to_bytes(),
        )
        .unwrap();
        assert!(is_error_response(&message));
        let holders = decode_error_response(&message).unwrap();
        assert_eq!(holders, vec![invalid_config()]);
    }

    #[test]
    fn structural_rejection_uses_simple_class_name() {
        assert!(invalid_config().is_structural_rejection());
        let timeout = ErrorHolder::new(
            27,
            "com.hazelcast.core.OperationTimeoutException",
            Some("timed out"),
        );
        assert!(!timeout.is_structural_rejection());
        assert_eq!(timeout.describe(), "OperationTimeoutException: timed out");
    }

    #[test]
    fn truncated_holder_is_an_error_not_a_panic() {
        let full = encode_error_response(&[invalid_config()]);
        let frames = full.frames();
        let cut = ClientMessage::from_frames(frames[..4].to_vec());
        assert!(decode_error_response(&cut).is_err());
    }

    #[test]
    fn non_error_message_is_rejected() {
        let ok = MessageBuilder::new(InitialFrameBuilder::response(0x1B0601).build()).build();
        assert!(!is_error_response(&ok));
        assert!(decode_error_response(&ok).is_err());
    }
}
