//! BOINC GUI-RPC messages.
//!
//! Requests are XML documents rooted at `<boinc_gui_rpc_request>`, replies
//! are rooted at `<boinc_gui_rpc_reply>`. Every message on the wire is
//! followed by a single `0x03` byte.
//!
//! Authentication is a two-step exchange:
//!
//! 1. `<auth1/>` is answered with a `<nonce>`.
//! 2. `<auth2><nonce_hash>md5(nonce + password)</nonce_hash></auth2>` is
//!    answered with `<authorized/>` or `<unauthorized/>`.

use md5::{Digest, Md5};
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;

use dc_core::{
    sort_results, ActiveTask, App, AppVersion, BoincState, HostInfo, NetStats, Project,
    TimeStats, WorkResult, WorkUnit,
};

use crate::error::DecodeError;

/// Byte terminating every GUI-RPC message.
pub const BOINC_TERMINATOR: u8 = 0x03;

pub const REQUEST_ROOT: &str = "boinc_gui_rpc_request";
pub const REPLY_ROOT: &str = "boinc_gui_rpc_reply";

// ============================================================================
// Requests
// ============================================================================

/// Requests this collector sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoincRequest {
    Auth1,
    Auth2 { nonce_hash: String },
    GetState,
}

impl BoincRequest {
    /// Builds the second authentication step for a received nonce.
    pub fn auth2(nonce: &str, password: &str) -> Self {
        Self::Auth2 {
            nonce_hash: nonce_hash(nonce, password),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Auth1 => "auth1",
            Self::Auth2 { .. } => "auth2",
            Self::GetState => "get_state",
        }
    }
}

/// Renders a request document (without the terminator byte).
pub fn render_request(request: &BoincRequest) -> String {
    let body = match request {
        BoincRequest::Auth1 => "<auth1/>".to_string(),
        BoincRequest::Auth2 { nonce_hash } => format!(
            "<auth2>\n<nonce_hash>{}</nonce_hash>\n</auth2>",
            escape(nonce_hash.as_str())
        ),
        BoincRequest::GetState => "<get_state/>".to_string(),
    };
    format!("<{REQUEST_ROOT}>\n{body}\n</{REQUEST_ROOT}>\n")
}

/// Lowercase hex MD5 of `nonce` immediately followed by `password`.
pub fn nonce_hash(nonce: &str, password: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(nonce.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

// ============================================================================
// Reply Inspection
// ============================================================================

/// Decodes a frame as text. Clients may send Latin-1; invalid sequences are
/// replaced rather than rejected.
fn frame_text(frame: &[u8]) -> std::borrow::Cow<'_, str> {
    String::from_utf8_lossy(frame)
}

/// Name of the first element in the document. Stops reading there, so large
/// state replies are not scanned twice.
fn root_name(xml: &str) -> Result<String, DecodeError> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => {
                return Ok(String::from_utf8_lossy(e.name().as_ref()).into_owned());
            }
            Event::Eof => {
                return Err(DecodeError::Xml("document has no root element".to_string()));
            }
            _ => {}
        }
    }
}

/// Names of the root's direct children, in document order.
fn child_names(xml: &str) -> Result<Vec<String>, DecodeError> {
    let mut reader = Reader::from_str(xml);
    let mut children = Vec::new();
    let mut depth = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if depth == 1 {
                    children.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                }
                depth += 1;
            }
            Event::Empty(e) if depth == 1 => {
                children.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    break;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(children)
}

/// Rejects documents not rooted at `<boinc_gui_rpc_reply>`.
fn expect_reply_root(xml: &str) -> Result<(), DecodeError> {
    let root = root_name(xml)?;
    if root != REPLY_ROOT {
        return Err(DecodeError::UnexpectedRoot {
            expected: REPLY_ROOT,
            found: root,
        });
    }
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
struct NonceReply {
    #[serde(default)]
    nonce: Option<String>,
}

/// Extracts the nonce from an `auth1` reply.
pub fn decode_nonce(frame: &[u8]) -> Result<String, DecodeError> {
    let xml = frame_text(frame);
    expect_reply_root(&xml)?;
    let reply: NonceReply = quick_xml::de::from_str(&xml)?;
    reply
        .nonce
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or(DecodeError::MissingField("nonce"))
}

/// Verdict of an `auth2` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthReply {
    Authorized,
    Unauthorized,
    /// Any other well-formed reply; the content is ignored
    Other(Vec<String>),
}

impl AuthReply {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

/// Classifies an `auth2` reply.
pub fn decode_auth_reply(frame: &[u8]) -> Result<AuthReply, DecodeError> {
    let xml = frame_text(frame);
    expect_reply_root(&xml)?;
    let children = child_names(&xml)?;
    if children.iter().any(|c| c == "unauthorized") {
        Ok(AuthReply::Unauthorized)
    } else if children.iter().any(|c| c == "authorized") {
        Ok(AuthReply::Authorized)
    } else {
        Ok(AuthReply::Other(children))
    }
}

// ============================================================================
// State Reply
// ============================================================================

#[derive(Debug, Deserialize)]
struct StateReply {
    client_state: RawClientState,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawClientState {
    platform_name: String,
    core_client_major_version: u32,
    core_client_minor_version: u32,
    core_client_release: u32,
    host_info: HostInfo,
    net_stats: NetStats,
    time_stats: TimeStats,
    #[serde(rename = "project")]
    projects: Vec<Project>,
    #[serde(rename = "app")]
    apps: Vec<App>,
    #[serde(rename = "app_version")]
    app_versions: Vec<AppVersion>,
    #[serde(rename = "workunit")]
    workunits: Vec<WorkUnit>,
    #[serde(rename = "result")]
    results: Vec<RawResult>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawResult {
    name: String,
    wu_name: String,
    platform: String,
    version_num: String,
    project_url: String,
    final_cpu_time: f64,
    final_elapsed_time: f64,
    exit_status: i32,
    state: i32,
    report_deadline: f64,
    received_time: f64,
    estimated_cpu_time_remaining: f64,
    active_task: Option<ActiveTask>,
    /// Empty marker element; only its presence matters
    ready_to_report: Option<()>,
}

impl From<RawResult> for WorkResult {
    fn from(raw: RawResult) -> Self {
        let mut result = WorkResult {
            name: raw.name,
            wu_name: raw.wu_name,
            platform: raw.platform,
            version_num: raw.version_num,
            project_url: raw.project_url,
            final_cpu_time: raw.final_cpu_time,
            final_elapsed_time: raw.final_elapsed_time,
            exit_status: raw.exit_status,
            state: raw.state,
            report_deadline: raw.report_deadline,
            received_time: raw.received_time,
            estimated_remaining_secs: raw.estimated_cpu_time_remaining,
            active_task: raw.active_task,
            ready_to_report: raw.ready_to_report.is_some(),
            remaining_display: String::new(),
            finished: false,
        };
        result.refresh_derived();
        result
    }
}

impl From<RawClientState> for BoincState {
    fn from(raw: RawClientState) -> Self {
        let mut results: Vec<WorkResult> = raw.results.into_iter().map(WorkResult::from).collect();
        sort_results(&mut results);
        BoincState {
            platform_name: raw.platform_name,
            core_client_major_version: raw.core_client_major_version,
            core_client_minor_version: raw.core_client_minor_version,
            core_client_release: raw.core_client_release,
            host_info: raw.host_info,
            net_stats: raw.net_stats,
            time_stats: raw.time_stats,
            projects: raw.projects,
            apps: raw.apps,
            app_versions: raw.app_versions,
            workunits: raw.workunits,
            results,
        }
    }
}

/// Decodes a `get_state` reply into a state with derived fields filled in
/// and results sorted.
pub fn decode_state(frame: &[u8]) -> Result<BoincState, DecodeError> {
    let xml = frame_text(frame);
    expect_reply_root(&xml)?;
    let reply: StateReply = quick_xml::de::from_str(&xml)?;
    Ok(reply.client_state.into())
}
