//! Contact extractor — reduces the rule cascades in `rules` to a `ParsedContact`.
//!
//! Extraction is total: every field ends with a default, so `parse` cannot
//! fail. Fields that fell back to a default are logged at debug level.

use tracing::debug;

use crate::pipeline::address::SenderAddress;
use crate::pipeline::rules::{self, COMPANY_RULES, LOCATION_RULES, NAME_RULES, POSITION_RULES};
use crate::pipeline::types::{ContactStatus, ParsedContact};
use crate::source::RawMessage;
use crate::source::mime::strip_html;

pub struct Extractor {
    status: ContactStatus,
}

impl Extractor {
    pub fn new(status: ContactStatus) -> Self {
        Self { status }
    }

    /// Build a contact record from a message. Never fails.
    ///
    /// Starts from the fully-defaulted record and overwrites each field the
    /// rules can fill.
    pub fn parse(&self, message: &RawMessage) -> ParsedContact {
        let sender = SenderAddress::parse(&message.sender);
        let body = body_content(message);
        let mut contact = ParsedContact::defaults(self.status, message.received_at);
        let mut defaulted = Vec::new();

        // Identity
        match non_empty(&sender.name).or_else(|| rules::first_match(NAME_RULES, &body)) {
            Some(name) => contact.recruiter_name = name,
            None => defaulted.push("recruiter_name"),
        }
        match sender.address.clone() {
            Some(address) => contact.recruiter_email = address,
            None => defaulted.push("recruiter_email"),
        }

        // Company: domain first, body may override with something more specific
        let from_domain = sender.address.as_deref().and_then(rules::company_from_address);
        let from_body = COMPANY_RULES
            .iter()
            .filter_map(|rule| rule(&body))
            .find(|candidate| {
                candidate.chars().count() > 2 && from_domain.as_deref() != Some(candidate.as_str())
            });
        match from_body.or(from_domain) {
            Some(company) => contact.company = company,
            None => defaulted.push("company"),
        }

        match rules::first_match(POSITION_RULES, &message.subject) {
            Some(position) => contact.position = position,
            None => defaulted.push("position"),
        }
        match rules::first_match(LOCATION_RULES, &body) {
            Some(location) => contact.location = location,
            None => defaulted.push("location"),
        }

        if !defaulted.is_empty() {
            debug!(
                message_id = %message.message_id,
                fields = ?defaulted,
                "Extraction fell back to defaults"
            );
        }
        contact
    }
}

/// Plain-text body, or the tag-stripped HTML body when the plain part is blank.
fn body_content(message: &RawMessage) -> String {
    if message.body_text.trim().is_empty() {
        strip_html(&message.body_html)
    } else {
        message.body_text.clone()
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::pipeline::types::{DEFAULT_COMPANY, DEFAULT_POSITION, DEFAULT_RECRUITER_NAME};

    fn message(sender: &str, subject: &str, body: &str) -> RawMessage {
        RawMessage {
            message_id: "m1@example.com".into(),
            sender: sender.into(),
            subject: subject.into(),
            body_text: body.into(),
            body_html: String::new(),
            received_at: Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap(),
            in_reply_to: String::new(),
            references: String::new(),
            thread_topic: String::new(),
        }
    }

    fn extractor() -> Extractor {
        Extractor::new(ContactStatus::Applied)
    }

    #[test]
    fn sarah_johnson_scenario() {
        let msg = message(
            "Sarah Johnson <sarah.johnson@techcorp.com>",
            "Senior Software Engineer Opportunity at TechCorp",
            "Hi! I hope this email finds you well. I am reaching out regarding an opening on our team.",
        );
        let contact = extractor().parse(&msg);
        assert_eq!(contact.recruiter_name, "Sarah Johnson");
        assert_eq!(contact.recruiter_email, "sarah.johnson@techcorp.com");
        assert_eq!(contact.company, "Techcorp");
        assert!(contact.position.contains("Senior Software Engineer"));
        assert_eq!(contact.location, "Remote");
        assert_eq!(contact.status, ContactStatus::Applied);
        assert_eq!(contact.date_received, msg.received_at);
    }

    #[test]
    fn body_hints_fill_location_and_company() {
        let msg = message(
            "recruiting@startup.io",
            "Full Stack Developer - Remote Position",
            "Hello,\n\nWe have an exciting Full Stack Developer opportunity.\nOur company, Startup Inc, is looking for talented developers.\nThe role is based in Austin, TX.\n\nBest,\nMike Chen\n",
        );
        let contact = extractor().parse(&msg);
        assert_eq!(contact.recruiter_name, "Mike Chen");
        assert_eq!(contact.company, "Startup Inc");
        assert_eq!(contact.location, "Austin, TX");
        assert!(contact.position.contains("Developer"));
    }

    #[test]
    fn body_override_must_differ_from_domain() {
        let msg = message(
            "jane@acme.com",
            "Engineer",
            "Greetings from Acme Company",
        );
        assert_eq!(extractor().parse(&msg).company, "Acme Company");
    }

    #[test]
    fn personal_domain_without_body_hint_defaults_company() {
        let msg = message("Recruiter Person <someone@gmail.com>", "Hello", "Nice to meet you.");
        let contact = extractor().parse(&msg);
        assert_eq!(contact.company, DEFAULT_COMPANY);
        assert_eq!(contact.position, DEFAULT_POSITION);
    }

    #[test]
    fn name_mined_from_body_when_display_name_missing() {
        let msg = message(
            "samantha.chen@bigtech.com",
            "Principal Architect role",
            "Would love to connect.\n\nThanks,\nSamantha Chen\nTalent Acquisition | BigTech Corp",
        );
        let contact = extractor().parse(&msg);
        assert_eq!(contact.recruiter_name, "Samantha Chen");
        assert_eq!(contact.company, "BigTech Corp");
    }

    #[test]
    fn html_body_used_when_plain_is_blank() {
        let mut msg = message("hr@globex.com", "Data Engineer", "   ");
        msg.body_html = "<p>Role is in <b>Denver, CO</b></p><p>Regards,<br>Lena Ortiz</p>".into();
        let contact = extractor().parse(&msg);
        assert_eq!(contact.location, "Denver, CO");
        assert_eq!(contact.recruiter_name, "Lena Ortiz");
    }

    #[test]
    fn empty_input_is_fully_defaulted() {
        let msg = message("", "", "");
        let contact = extractor().parse(&msg);
        assert_eq!(contact, ParsedContact::defaults(ContactStatus::Applied, msg.received_at));
        assert_eq!(contact.recruiter_name, DEFAULT_RECRUITER_NAME);
    }

    #[test]
    fn every_field_non_empty_for_odd_inputs() {
        let inputs = [
            ("<>", "Re:", "\n\n\n"),
            ("\"\" <@>", "!!!", "@@@ http://x"),
            ("x@y", "ai", "Best,\n123"),
            ("Ünïcødé Nåme <u@ü.de>", "Ingeniero de software", "Saludos,\nJosé"),
        ];
        for (sender, subject, body) in inputs {
            let c = extractor().parse(&message(sender, subject, body));
            for field in [&c.recruiter_name, &c.recruiter_email, &c.company, &c.position, &c.location] {
                assert!(!field.trim().is_empty(), "empty field for {sender:?}/{subject:?}");
            }
        }
    }

    #[test]
    fn deployment_status_is_copied_onto_contact() {
        let extractor = Extractor::new(ContactStatus::RecruiterScreen);
        let contact = extractor.parse(&message("a@b.com", "", ""));
        assert_eq!(contact.status, ContactStatus::RecruiterScreen);
    }
}
