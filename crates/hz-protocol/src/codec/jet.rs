//! Jet service: job submission, observation and control

use uuid::Uuid;

use crate::codec::{
    expect_begin, expect_message_type, read_nullable_string, read_string, FixedReader,
    InitialFrameBuilder, MessageBuilder,
};
use crate::error::ProtocolError;
use crate::frame::{ClientMessage, Frame, FrameReader, REQUEST_HEADER_SIZE, RESPONSE_HEADER_SIZE};
use crate::Result;

/// Jet.TerminateJob
pub const TERMINATE_JOB_REQUEST: i32 = 0xFE0200;
/// Jet.GetJobStatus
pub const GET_JOB_STATUS_REQUEST: i32 = 0xFE0300;
/// Jet.ResumeJob
pub const RESUME_JOB_REQUEST: i32 = 0xFE0800;
/// Jet.GetJobSummaryList
pub const GET_JOB_SUMMARY_LIST_REQUEST: i32 = 0xFE0A00;
/// Jet.UploadJobMetaData
pub const UPLOAD_JOB_METADATA_REQUEST: i32 = 0xFE1000;

/// Directory on members holding job jars
pub const JAR_DIRECTORY: &str = "/opt/hazelcast/jetJobJars";

const SESSION_NAMESPACE: Uuid = Uuid::NAMESPACE_OID;

/// Status of a Jet job as reported by the cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobStatus {
    /// Submitted but not yet scheduled
    NotRunning,
    /// Being initialized on members
    Starting,
    /// Executing
    Running,
    /// Suspended, can be resumed
    Suspended,
    /// Suspended while a snapshot is being exported
    SuspendedExportingSnapshot,
    /// Finishing up
    Completing,
    /// Failed with an error
    Failed,
    /// Finished successfully or was cancelled
    Completed,
}

impl JobStatus {
    /// Map a protocol status code
    pub fn from_code(code: i32) -> Result<Self> {
        Ok(match code {
            0 => Self::NotRunning,
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Suspended,
            4 => Self::SuspendedExportingSnapshot,
            5 => Self::Completing,
            6 => Self::Failed,
            7 => Self::Completed,
            other => {
                return Err(ProtocolError::malformed(format!(
                    "unknown job status code {other}"
                )))
            }
        })
    }

    /// Protocol status code
    pub fn code(self) -> i32 {
        match self {
            Self::NotRunning => 0,
            Self::Starting => 1,
            Self::Running => 2,
            Self::Suspended => 3,
            Self::SuspendedExportingSnapshot => 4,
            Self::Completing => 5,
            Self::Failed => 6,
            Self::Completed => 7,
        }
    }

    /// Whether the job can no longer change state
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Completed)
    }
}

/// How a running job is terminated
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminateMode {
    /// Restart from the last snapshot
    RestartGraceful,
    /// Suspend after exporting a snapshot
    SuspendGraceful,
    /// Cancel after exporting a snapshot
    CancelGraceful,
}

impl TerminateMode {
    /// Protocol code
    pub fn code(self) -> i32 {
        match self {
            Self::RestartGraceful => 0,
            Self::SuspendGraceful => 2,
            Self::CancelGraceful => 4,
        }
    }
}

/// Parameters of a job submission for a jar already present on the members
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobSubmission {
    /// Job name, unique per cluster
    pub job_name: String,
    /// Jar file name inside [`JAR_DIRECTORY`]
    pub jar_name: String,
    /// Entry point, if not declared in the jar manifest
    pub main_class: Option<String>,
    /// Arguments passed to the entry point
    pub parameters: Vec<String>,
}

impl JobSubmission {
    /// Session id derived from the job identity, so resubmitting the same
    /// job produces the same request bytes
    pub fn session_id(&self) -> Uuid {
        let key = format!("{}/{}", self.job_name, self.jar_name);
        Uuid::new_v5(&SESSION_NAMESPACE, key.as_bytes())
    }

    /// Absolute path of the jar on members
    pub fn jar_path(&self) -> String {
        format!("{JAR_DIRECTORY}/{}", self.jar_name)
    }
}

/// One entry of the job summary list
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobSummary {
    /// Whether this is a light job
    pub light_job: bool,
    /// Cluster-assigned job id
    pub job_id: i64,
    /// Current execution id
    pub execution_id: i64,
    /// Job name, or the id when the job is unnamed
    pub name_or_id: String,
    /// Current status
    pub status: JobStatus,
    /// Submission time, epoch millis
    pub submission_time: i64,
    /// Completion time, epoch millis, 0 while not complete
    pub completion_time: i64,
    /// Failure reason for failed jobs
    pub failure_text: Option<String>,
}

/// Encode UploadJobMetaData with `jarOnMember` set
pub fn encode_upload_job_metadata(job: &JobSubmission) -> ClientMessage {
    let initial = InitialFrameBuilder::request(UPLOAD_JOB_METADATA_REQUEST)
        .uuid(Some(job.session_id()))
        .bool(true)
        .int(0)
        .build();
    MessageBuilder::new(initial)
        .string(&job.jar_path())
        .string("") // digest is only checked for uploaded jars
        .null() // snapshot name
        .nullable_string(Some(&job.job_name))
        .nullable_string(job.main_class.as_deref())
        .string_list(&job.parameters)
        .build()
}

/// Encode GetJobSummaryList
pub fn encode_get_job_summary_list() -> ClientMessage {
    MessageBuilder::new(InitialFrameBuilder::request(GET_JOB_SUMMARY_LIST_REQUEST).build()).build()
}

/// Encode GetJobStatus
pub fn encode_get_job_status(job_id: i64) -> ClientMessage {
    MessageBuilder::new(
        InitialFrameBuilder::request(GET_JOB_STATUS_REQUEST)
            .long(job_id)
            .build(),
    )
    .build()
}

/// Encode TerminateJob
pub fn encode_terminate_job(job_id: i64, mode: TerminateMode) -> ClientMessage {
    MessageBuilder::new(
        InitialFrameBuilder::request(TERMINATE_JOB_REQUEST)
            .long(job_id)
            .int(mode.code())
            .uuid(None)
            .build(),
    )
    .build()
}

/// Encode ResumeJob
pub fn encode_resume_job(job_id: i64) -> ClientMessage {
    MessageBuilder::new(
        InitialFrameBuilder::request(RESUME_JOB_REQUEST)
            .long(job_id)
            .build(),
    )
    .build()
}

/// Check an empty acknowledgement response for `request_type`
pub fn decode_ack(message: &ClientMessage, request_type: i32) -> Result<()> {
    expect_message_type(message, request_type + 1)
}

/// Decode the GetJobStatus response
pub fn decode_get_job_status(message: &ClientMessage) -> Result<JobStatus> {
    expect_message_type(message, GET_JOB_STATUS_REQUEST + 1)?;
    let initial = message.initial_frame()?;
    let code = FixedReader::at(&initial.content, RESPONSE_HEADER_SIZE).read_int()?;
    JobStatus::from_code(code)
}

/// Decode the GetJobSummaryList response
pub fn decode_get_job_summary_list(message: &ClientMessage) -> Result<Vec<JobSummary>> {
    expect_message_type(message, GET_JOB_SUMMARY_LIST_REQUEST + 1)?;
    let mut body = message.body();
    expect_begin(&mut body, "job summary list")?;
    let mut summaries = Vec::new();
    while !body.next_is_end() {
        summaries.push(decode_job_summary(&mut body)?);
    }
    Ok(summaries)
}

fn decode_job_summary(reader: &mut FrameReader<'_>) -> Result<JobSummary> {
    expect_begin(reader, "job summary")?;
    let initial = reader.next_frame("job summary fields")?;
    let mut fixed = FixedReader::at(&initial.content, 0);
    let light_job = fixed.read_bool()?;
    let job_id = fixed.read_long()?;
    let execution_id = fixed.read_long()?;
    let status = JobStatus::from_code(fixed.read_int()?)?;
    let submission_time = fixed.read_long()?;
    let completion_time = fixed.read_long()?;
    let name_or_id = read_string(reader, "job name")?;
    let failure_text = read_nullable_string(reader, "failure text")?;
    reader.skip_to_struct_end()?;
    Ok(JobSummary {
        light_job,
        job_id,
        execution_id,
        name_or_id,
        status,
        submission_time,
        completion_time,
        failure_text,
    })
}

/// Encode a GetJobSummaryList response. Used by in-process fakes.
pub fn encode_job_summary_list_response(summaries: &[JobSummary]) -> ClientMessage {
    let mut builder = MessageBuilder::new(
        InitialFrameBuilder::response(GET_JOB_SUMMARY_LIST_REQUEST + 1).build(),
    )
    .frame(Frame::begin());
    for summary in summaries {
        let fixed = InitialFrameBuilder::response(0)
            .bool(summary.light_job)
            .long(summary.job_id)
            .long(summary.execution_id)
            .int(summary.status.code())
            .long(summary.submission_time)
            .long(summary.completion_time)
            .build();
        builder = builder
            .frame(Frame::begin())
            .frame(Frame::new(fixed.content.slice(RESPONSE_HEADER_SIZE..)))
            .string(&summary.name_or_id)
            .nullable_string(summary.failure_text.as_deref())
            .frame(Frame::end());
    }
    builder.frame(Frame::end()).build()
}

/// Encode an empty acknowledgement for `request_type`. Used by in-process
/// fakes.
pub fn encode_ack_response(request_type: i32) -> ClientMessage {
    MessageBuilder::new(InitialFrameBuilder::response(request_type + 1).build()).build()
}

/// Encode a GetJobStatus response. Used by in-process fakes.
pub fn encode_job_status_response(status: JobStatus) -> ClientMessage {
    MessageBuilder::new(
        InitialFrameBuilder::response(GET_JOB_STATUS_REQUEST + 1)
            .int(status.code())
            .build(),
    )
    .build()
}

/// Job id carried by a TerminateJob, ResumeJob or GetJobStatus request
pub fn request_job_id(message: &ClientMessage) -> Result<i64> {
    let initial = message.initial_frame()?;
    FixedReader::at(&initial.content, REQUEST_HEADER_SIZE).read_long()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::read_string_list;

    fn submission() -> JobSubmission {
        JobSubmission {
            job_name: "word-count".to_string(),
            jar_name: "jet-pipeline.jar".to_string(),
            main_class: Some("com.example.WordCount".to_string()),
            parameters: vec!["--input".to_string(), "books".to_string()],
        }
    }

    #[test]
    fn upload_metadata_points_at_member_jar() {
        let message = encode_upload_job_metadata(&submission());
        assert_eq!(message.message_type().unwrap(), UPLOAD_JOB_METADATA_REQUEST);

        let initial = message.initial_frame().unwrap();
        let mut fixed = FixedReader::at(&initial.content, REQUEST_HEADER_SIZE);
        assert_eq!(fixed.read_uuid().unwrap(), Some(submission().session_id()));
        assert!(fixed.read_bool().unwrap());

        let mut body = message.body();
        assert_eq!(
            read_string(&mut body, "path").unwrap(),
            "/opt/hazelcast/jetJobJars/jet-pipeline.jar"
        );
        assert_eq!(read_string(&mut body, "digest").unwrap(), "");
        assert!(body.next_is_null());
        assert_eq!(
            read_nullable_string(&mut body, "job").unwrap().as_deref(),
            Some("word-count")
        );
        assert_eq!(
            read_nullable_string(&mut body, "class").unwrap().as_deref(),
            Some("com.example.WordCount")
        );
        assert_eq!(
            read_string_list(&mut body, "params").unwrap(),
            vec!["--input", "books"]
        );
    }

    #[test]
    fn session_id_is_stable_per_job() {
        assert_eq!(submission().session_id(), submission().session_id());
        let other = JobSubmission {
            job_name: "other".to_string(),
            ..submission()
        };
        assert_ne!(submission().session_id(), other.session_id());
    }

    #[test]
    fn summary_list_decodes_through_the_wire() {
        let summaries = vec![
            JobSummary {
                light_job: false,
                job_id: 7_001,
                execution_id: 9,
                name_or_id: "word-count".to_string(),
                status: JobStatus::Running,
                submission_time: 1_700_000_000_000,
                completion_time: 0,
                failure_text: None,
            },
            JobSummary {
                light_job: false,
                job_id: 7_002,
                execution_id: 3,
                name_or_id: "etl".to_string(),
                status: JobStatus::Failed,
                submission_time: 1_700_000_000_000,
                completion_time: 1_700_000_100_000,
                failure_text: Some("ClassNotFoundException".to_string()),
            },
        ];
        let wire = encode_job_summary_list_response(&summaries).to_bytes();
        let message = ClientMessage::from_bytes(&wire).unwrap();
        assert_eq!(decode_get_job_summary_list(&message).unwrap(), summaries);
    }

    #[test]
    fn unknown_status_code_is_malformed() {
        assert!(matches!(
            JobStatus::from_code(42),
            Err(ProtocolError::MalformedStructure(_))
        ));
    }

    #[test]
    fn terminate_carries_job_and_mode() {
        let message = encode_terminate_job(7_001, TerminateMode::SuspendGraceful);
        assert_eq!(request_job_id(&message).unwrap(), 7_001);
        let initial = message.initial_frame().unwrap();
        let mut fixed = FixedReader::at(&initial.content, REQUEST_HEADER_SIZE + 8);
        assert_eq!(fixed.read_int().unwrap(), 2);
        assert_eq!(fixed.read_uuid().unwrap(), None);
    }

    #[test]
    fn ack_must_match_request() {
        let ack = encode_ack_response(RESUME_JOB_REQUEST);
        assert!(decode_ack(&ack, RESUME_JOB_REQUEST).is_ok());
        assert!(decode_ack(&ack, TERMINATE_JOB_REQUEST).is_err());
    }
}
