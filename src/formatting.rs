// src/formatting.rs

use crate::core::{Alert, PendingUser, Record, Report};

/// Title used for every push notification.
pub const NOTIFICATION_TITLE: &str = "New PhishDetect Event";

/// A trait for turning a record into a single human-readable message.
pub trait TextFormatter: Send + Sync {
    fn format_record(&self, record: &Record) -> String;
}

/// Plain-text formatter for push notifications.
///
/// Matched indicators are defanged so the message can't be clicked through
/// from a phone's lock screen.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotificationFormatter;

impl NotificationFormatter {
    fn format_alert(&self, alert: &Alert) -> String {
        format!(
            "{} triggered a {} alert for {}",
            user_label(&alert.user_contact),
            alert.alert_type,
            defang(&alert.matched)
        )
    }

    fn format_report(&self, report: &Report) -> String {
        format!(
            "{} shared a report of type \"{}\" with UUID {}",
            user_label(&report.user_contact),
            report.report_type,
            report.uuid
        )
    }

    fn format_user_request(&self, user: &PendingUser) -> String {
        format!(
            "Received a users request for \"{}\" with email {}",
            user.name, user.email
        )
    }
}

impl TextFormatter for NotificationFormatter {
    fn format_record(&self, record: &Record) -> String {
        match record {
            Record::Alert(alert) => self.format_alert(alert),
            Record::Report(report) => self.format_report(report),
            Record::UserRequest(user) => self.format_user_request(user),
        }
    }
}

/// Describes who a record came from.
fn user_label(contact: &str) -> String {
    if contact.trim().is_empty() {
        "Unknown user".to_string()
    } else {
        format!("User \"{}\"", contact)
    }
}

/// Makes a URL, domain or email address non-clickable.
pub fn defang(value: &str) -> String {
    value
        .replace("http", "hxxp")
        .replace('.', "[.]")
        .replace('@', "[@]")
}
