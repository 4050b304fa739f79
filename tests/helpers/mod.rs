#![allow(dead_code)]
pub mod fake_node;

use pdtools::core::{Alert, PendingUser, Record, Report};

pub fn alert(id: &str) -> Record {
    Record::Alert(Alert {
        uuid: id.to_string(),
        alert_type: "domain".to_string(),
        matched: "http://evil.example.com".to_string(),
        user_contact: "alice@example.org".to_string(),
        datetime: None,
    })
}

pub fn report(id: &str, report_type: &str) -> Record {
    Record::Report(Report {
        uuid: id.to_string(),
        report_type: report_type.to_string(),
        content: "From: scam@example.com\r\nSubject: verify your account\r\n\r\nclick".to_string(),
        user_contact: "bob@example.org".to_string(),
        datetime: None,
    })
}

pub fn user_request(key: &str) -> Record {
    Record::UserRequest(PendingUser {
        key: key.to_string(),
        name: "Carol".to_string(),
        email: "carol@example.org".to_string(),
    })
}
