//! SMS Adapter (M) — spec §4.4, §4.7.

use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SmsReplyEvent {
    pub from: String,
    pub to: String,
    pub body: String,
    pub message_sid: String,
}

const ACCEPT_KEYWORDS: &[&str] = &["yes", "accept", "yep", "y"];

impl SmsReplyEvent {
    /// spec §4.7: "any message matching yes/accept/yep/y ... is routed to A as an Accept
    /// intent".
    pub fn is_accept_reply(&self) -> bool {
        let normalized = self.body.trim().to_ascii_lowercase();
        ACCEPT_KEYWORDS.contains(&normalized.as_str())
    }
}

#[async_trait]
pub trait SmsAdapter: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> anyhow::Result<()>;
}

/// A no-op adapter for integration tests.
#[derive(Default)]
pub struct NullSmsAdapter;

#[async_trait]
impl SmsAdapter for NullSmsAdapter {
    async fn send(&self, _to: &str, _body: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Renders a provider-configurable SMS body against the variables named in spec §4.7
/// (`{employeeName, patientName, date, time, startTime, endTime, suburb}`). Substitution
/// only — the template author is responsible for any privacy-safe display formatting.
pub fn render_template(template: &str, variables: &[(&str, &str)]) -> String {
    let mut rendered = template.to_string();
    for (key, value) in variables {
        rendered = rendered.replace(&format!("{{{key}}}"), value);
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_keywords_are_case_insensitive() {
        let reply = SmsReplyEvent {
            from: "+61491570006".to_string(),
            to: "+61491570000".to_string(),
            body: "YES".to_string(),
            message_sid: "sid-1".to_string(),
        };
        assert!(reply.is_accept_reply());
    }

    #[test]
    fn unrelated_reply_is_not_accept() {
        let reply = SmsReplyEvent {
            from: "+61491570006".to_string(),
            to: "+61491570000".to_string(),
            body: "sorry can't".to_string(),
            message_sid: "sid-2".to_string(),
        };
        assert!(!reply.is_accept_reply());
    }

    #[test]
    fn template_substitution() {
        let rendered = render_template(
            "Shift for {patientName} on {date} at {startTime}",
            &[
                ("patientName", "Jane D."),
                ("date", "2026-08-04"),
                ("startTime", "09:00"),
            ],
        );
        assert_eq!(rendered, "Shift for Jane D. on 2026-08-04 at 09:00");
    }
}
