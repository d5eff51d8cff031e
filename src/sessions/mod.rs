//! TWAMP server session report.
//!
//! The TWAMP server keeps one `control-<pid>` file per control connection.
//! The first line describes the control session, every following line one of
//! its test sessions, all tab separated.

mod report;

pub(crate) use report::{empty_message, render_all, render_client, render_summary, SessionReport};

use crate::model::{AuthMode, ControlSession, Endpoint, TestSession};
use anyhow::{bail, Context, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Where the server writes session files for the default routing instance.
pub(crate) const SESSION_FILES_DIR: &str = "/var/run/twamp";
/// Present on systems that support routing instances (VRFs).
pub(crate) const CHVRF: &str = "/usr/sbin/chvrf";
pub(crate) const DEFAULT_ROUTING_INSTANCE: &str = "default";

const CONTROL_FILE_PID_SEP: char = '-';
const CONTROL_FILE_PREFIX: &str = "control-";

/// Session directory for `routing_instance`; non-default instances live in
/// `<base>-<instance>`.
pub(crate) fn sessions_dir(base: &Path, routing_instance: &str) -> PathBuf {
    if routing_instance == DEFAULT_ROUTING_INSTANCE {
        return base.to_path_buf();
    }
    let mut dir = OsString::from(base.as_os_str());
    dir.push(format!("-{routing_instance}"));
    PathBuf::from(dir)
}

/// Reject routing instance names that would escape the session directory.
pub(crate) fn validate_routing_instance(name: &str) -> Result<()> {
    if name.contains(std::path::MAIN_SEPARATOR) || name.contains('/') {
        bail!("Invalid routing instance name");
    }
    Ok(())
}

/// `--client` accepts an IPv4 or IPv6 literal, or `localhost`.
pub(crate) fn validate_client(ip: &str) -> Result<()> {
    if ip == "localhost" || ip.parse::<std::net::IpAddr>().is_ok() {
        return Ok(());
    }
    bail!("Invalid client IP address.")
}

/// Read every control session file in `dir`, ordered by PID.
///
/// Files that cannot be read or whose control line is malformed are skipped
/// with a warning, as are malformed test session lines.
pub(crate) fn load_sessions(dir: &Path) -> Result<Vec<ControlSession>> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("read session directory {}", dir.display()))?;

    let mut sessions = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("list {}", dir.display()))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !name.starts_with(CONTROL_FILE_PREFIX) {
            continue;
        }

        let path = entry.path();
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read session file");
                continue;
            }
        };
        let Some(pid) = name.split(CONTROL_FILE_PID_SEP).nth(1) else {
            tracing::warn!(path = %path.display(), "failed to determine PID");
            continue;
        };
        if let Some(session) = parse_control_file(pid, &contents, &path) {
            sessions.push(session);
        }
    }

    sessions.sort_by(|a, b| match (a.pid.parse::<u64>(), b.pid.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.pid.cmp(&b.pid),
    });
    Ok(sessions)
}

fn parse_control_file(pid: &str, contents: &str, path: &Path) -> Option<ControlSession> {
    let mut lines = contents.lines();

    let control = lines.next().unwrap_or_default();
    let mut fields = control.split('\t');
    let (Some(origin), Some(auth)) = (fields.next(), fields.next()) else {
        tracing::warn!(path = %path.display(), "failed to parse control session data");
        return None;
    };

    let mut session = ControlSession::new(pid.to_string(), origin.to_string(), AuthMode::from_code(auth));
    for (idx, line) in lines.enumerate() {
        match parse_test_line(line) {
            Some(test) => session.test_sessions.push(test),
            // idx 0 is the file's second line.
            None => tracing::warn!(
                path = %path.display(),
                line = idx + 2,
                "failed to parse test session data"
            ),
        }
    }
    Some(session)
}

fn parse_test_line(line: &str) -> Option<TestSession> {
    let mut fields = line.split('\t');
    let sid = fields.next()?;
    let sender = fields.next()?;
    let reflector = fields.next()?;
    let status = fields.next()?;
    let dscp = fields.next()?;
    Some(TestSession {
        sid: sid.to_string(),
        sender: Endpoint::parse_or_unknown(sender),
        reflector: Endpoint::parse_or_unknown(reflector),
        status: status.to_string(),
        dscp: dscp.to_string(),
    })
}
