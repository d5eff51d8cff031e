//! Text and JSON renderings of the session report.

use crate::model::{ControlSession, TestSession};
use serde::Serialize;
use std::fmt::Write;

/// Machine readable report, emitted with `--json`.
#[derive(Debug, Serialize)]
pub(crate) struct SessionReport<'a> {
    pub routing_instance: &'a str,
    pub total_sessions: usize,
    pub active_sessions: usize,
    pub inactive_sessions: usize,
    pub control_sessions: &'a [ControlSession],
}

impl<'a> SessionReport<'a> {
    pub(crate) fn new(routing_instance: &'a str, control_sessions: &'a [ControlSession]) -> Self {
        let (active, inactive) = totals(control_sessions);
        Self {
            routing_instance,
            total_sessions: active + inactive,
            active_sessions: active,
            inactive_sessions: inactive,
            control_sessions,
        }
    }
}

fn totals(sessions: &[ControlSession]) -> (usize, usize) {
    sessions.iter().fold((0, 0), |(a, i), s| {
        (a + s.active_count(), i + s.inactive_count())
    })
}

/// Every control session with its test sessions.
pub(crate) fn render_all(sessions: &[ControlSession]) -> String {
    let (active, inactive) = totals(sessions);
    let mut out = String::new();
    let _ = writeln!(out, "Total number of sessions: {}", active + inactive);
    let _ = writeln!(out, "Total number of active sessions: {active}");
    out.push_str("\n\n");
    for s in sessions {
        push_detail(&mut out, s);
    }
    out.push('\n');
    out
}

/// Only the control sessions initiated from `ip`.
pub(crate) fn render_client(sessions: &[ControlSession], ip: &str) -> String {
    let matching: Vec<&ControlSession> = sessions.iter().filter(|s| s.initiated_by(ip)).collect();
    let active: usize = matching.iter().map(|s| s.active_count()).sum();
    let inactive: usize = matching.iter().map(|s| s.inactive_count()).sum();

    let mut out = String::new();
    let _ = writeln!(out, "Total connections:       {}", active + inactive);
    let _ = writeln!(out, "Total active test sessions:    {active}");
    let _ = writeln!(out, "Total inactive test sessions:  {inactive}");
    out.push_str("\n\n");
    for s in matching {
        push_detail(&mut out, s);
    }
    out.push('\n');
    out
}

/// One short block per connected client.
pub(crate) fn render_summary(sessions: &[ControlSession]) -> String {
    let (active, inactive) = totals(sessions);
    let mut out = String::new();
    let _ = writeln!(out, "Total connected clients:       {}", sessions.len());
    let _ = writeln!(out, "Total active test sessions:    {active}");
    let _ = writeln!(out, "Total inactive test sessions:  {inactive}");
    out.push_str("\n\n");
    for (n, s) in sessions.iter().enumerate() {
        let _ = write!(
            out,
            "Client {n}: Initiated by {} in {} mode\n\tActive sessions: {}\n\tInactive sessions: {}\n\n",
            s.origin_endpoint(),
            s.auth_mode.as_str(),
            s.active_count(),
            s.inactive_count()
        );
    }
    out.push('\n');
    out
}

/// Message shown when the directory holds no control sessions.
pub(crate) fn empty_message(routing_instance: &str, chvrf_exists: bool) -> String {
    let mut msg = String::from("No active TWAMP sessions");
    if chvrf_exists {
        if routing_instance == super::DEFAULT_ROUTING_INSTANCE {
            msg.push_str(" in the default routing instance");
        } else {
            let _ = write!(msg, " in routing instance '{routing_instance}'");
        }
    }
    msg
}

fn push_detail(out: &mut String, s: &ControlSession) {
    let sender_w = column_width(&s.test_sessions, |t| t.sender.to_string());
    let reflector_w = column_width(&s.test_sessions, |t| t.reflector.to_string());

    let _ = write!(
        out,
        "--> Control Session initiated by {} in {} mode",
        s.origin_endpoint(),
        s.auth_mode.as_str()
    );
    out.push_str("\n\n\t");
    push_row(
        out,
        ["Session ID", "Sender", "Reflector", "Status", "DSCP"],
        sender_w,
        reflector_w,
    );
    out.push_str("\n\t");
    for t in &s.test_sessions {
        let sender = t.sender.to_string();
        let reflector = t.reflector.to_string();
        push_row(
            out,
            [t.sid.as_str(), sender.as_str(), reflector.as_str(), t.status.as_str(), t.dscp.as_str()],
            sender_w,
            reflector_w,
        );
        out.push_str("\n\t");
    }
    // Drop the indent opened for a row that never came.
    out.pop();
    out.push_str("<--\n\n");
}

fn push_row(out: &mut String, cols: [&str; 5], sender_w: usize, reflector_w: usize) {
    let [sid, sender, reflector, status, dscp] = cols;
    let _ = write!(
        out,
        "{sid:<32}    {sender:<sender_w$}    {reflector:<reflector_w$}    {status:<8}    {dscp:<5}"
    );
}

/// Widest rendering of a column, never less than 1.
fn column_width(tests: &[TestSession], f: impl Fn(&TestSession) -> String) -> usize {
    tests
        .iter()
        .map(|t| f(t).chars().count())
        .max()
        .unwrap_or(0)
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AuthMode, Endpoint};

    fn session(pid: &str, origin: &str, statuses: &[&str]) -> ControlSession {
        let mut s = ControlSession::new(pid.into(), origin.into(), AuthMode::Open);
        for (i, status) in statuses.iter().enumerate() {
            s.test_sessions.push(TestSession {
                sid: format!("sid{i}"),
                sender: Endpoint::parse_or_unknown("[10.0.0.1]:6000"),
                reflector: Endpoint::parse_or_unknown("[10.0.0.22]:7000"),
                status: status.to_string(),
                dscp: "0".into(),
            });
        }
        s
    }

    #[test]
    fn all_view_layout() {
        let sessions = vec![session("1", "[10.0.0.1]:5000", &["ACTIVE"])];
        let text = render_all(&sessions);
        let expected = format!(
            "Total number of sessions: 1\n\
             Total number of active sessions: 1\n\
             \n\n\
             --> Control Session initiated by [10.0.0.1]:5000 in Open mode\n\
             \n\
             \t{:<32}    {:<15}    {:<16}    {:<8}    {:<5}\n\
             \t{:<32}    {:<15}    {:<16}    {:<8}    {:<5}\n\
             <--\n\n\n",
            "Session ID", "Sender", "Reflector", "Status", "DSCP",
            "sid0", "[10.0.0.1]:6000", "[10.0.0.22]:7000", "ACTIVE", "0",
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn empty_control_session_still_gets_header() {
        let sessions = vec![session("1", "bogus", &[])];
        let text = render_all(&sessions);
        let expected_tail = format!(
            "--> Control Session initiated by [unknown]:0 in Open mode\n\n\t\
             {:<32}    Sender    Reflector    {:<8}    {:<5}\n<--\n\n\n",
            "Session ID", "Status", "DSCP"
        );
        assert!(text.ends_with(&expected_tail), "{text:?}");
    }

    #[test]
    fn summary_counts_per_client() {
        let sessions = vec![
            session("1", "[10.0.0.1]:5000", &["ACTIVE", "INACTIVE"]),
            session("2", "[10.0.0.2]:5000", &["ACTIVE"]),
        ];
        let text = render_summary(&sessions);
        assert!(text.starts_with(
            "Total connected clients:       2\n\
             Total active test sessions:    2\n\
             Total inactive test sessions:  1\n"
        ));
        assert!(text.contains(
            "Client 0: Initiated by [10.0.0.1]:5000 in Open mode\n\
             \tActive sessions: 1\n\tInactive sessions: 1\n\n"
        ));
        assert!(text.contains("Client 1: Initiated by [10.0.0.2]:5000"));
    }

    #[test]
    fn client_view_filters_by_origin() {
        let sessions = vec![
            session("1", "[10.0.0.1]:5000", &["ACTIVE", "INACTIVE"]),
            session("2", "[10.0.0.2]:5000", &["ACTIVE"]),
        ];
        let text = render_client(&sessions, "10.0.0.2");
        assert!(text.starts_with("Total connections:       1\n"));
        assert!(text.contains("initiated by [10.0.0.2]:5000"));
        assert!(!text.contains("initiated by [10.0.0.1]:5000"));
    }

    #[test]
    fn empty_message_mentions_instance_only_with_vrf_support() {
        assert_eq!(empty_message("default", false), "No active TWAMP sessions");
        assert_eq!(
            empty_message("default", true),
            "No active TWAMP sessions in the default routing instance"
        );
        assert_eq!(
            empty_message("blue", true),
            "No active TWAMP sessions in routing instance 'blue'"
        );
    }

    #[test]
    fn json_report_totals() {
        let sessions = vec![session("7", "[10.0.0.1]:5000", &["ACTIVE", "INACTIVE"])];
        let report = SessionReport::new("default", &sessions);
        let v = serde_json::to_value(&report).unwrap();
        assert_eq!(v["total_sessions"], 2);
        assert_eq!(v["active_sessions"], 1);
        assert_eq!(v["control_sessions"][0]["pid"], "7");
        assert_eq!(v["control_sessions"][0]["auth_mode"], "Open");
    }
}
