//! Microsoft Graph wire types

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use se_core::{RemoteEvent, RemoteUser};

/// Display name used when the directory has none
pub const UNNAMED_USER: &str = "Unnamed";

/// Subject used when an event has none
pub const NO_SUBJECT: &str = "(no subject)";

/// `OData` error response from Microsoft Graph.
#[derive(Debug, Deserialize)]
pub struct ODataError {
    pub error: ODataErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ODataErrorBody {
    pub code: String,
    pub message: String,
}

/// One page of a collection response
#[derive(Debug, Deserialize)]
pub struct ODataPage<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphUser {
    #[serde(default)]
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub mail: Option<String>,
    pub user_principal_name: Option<String>,
    pub job_title: Option<String>,
    pub department: Option<String>,
}

impl GraphUser {
    pub fn into_remote(self) -> RemoteUser {
        let email = non_blank(self.mail)
            .or_else(|| non_blank(self.user_principal_name))
            .unwrap_or_default();
        let display_name = non_blank(self.display_name).unwrap_or_else(|| UNNAMED_USER.to_string());

        RemoteUser {
            remote_id: self.id.unwrap_or_default(),
            display_name,
            email,
            job_title: non_blank(self.job_title),
            department: non_blank(self.department),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDateTime {
    pub date_time: String,
    #[serde(default)]
    pub time_zone: Option<String>,
}

impl GraphDateTime {
    /// Graph returns local wall-clock text without an offset; with the
    /// `outlook.timezone="UTC"` preference that wall clock is UTC.
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(&self.date_time) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Some(tz) = self.time_zone.as_deref() {
            if !tz.eq_ignore_ascii_case("UTC") {
                debug!("Event time zone {} treated as UTC", tz);
            }
        }
        NaiveDateTime::parse_from_str(&self.date_time, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphLocation {
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEvent {
    #[serde(default)]
    pub id: Option<String>,
    pub subject: Option<String>,
    pub start: Option<GraphDateTime>,
    pub end: Option<GraphDateTime>,
    pub location: Option<GraphLocation>,
    /// Graph sends `null` for some series occurrences
    #[serde(default)]
    pub is_all_day: Option<bool>,
}

impl GraphEvent {
    /// `None` when start or end is missing or unparseable
    pub fn into_remote(self, owner_remote_id: &str) -> Option<RemoteEvent> {
        let remote_id = self.id.unwrap_or_default();
        let start = self.start.as_ref().and_then(GraphDateTime::to_utc);
        let end = self.end.as_ref().and_then(GraphDateTime::to_utc);
        let (Some(start), Some(end)) = (start, end) else {
            debug!(event_id = %remote_id, "Dropping event without start or end");
            return None;
        };

        Some(RemoteEvent {
            remote_id,
            owner_remote_id: owner_remote_id.to_string(),
            subject: non_blank(self.subject).unwrap_or_else(|| NO_SUBJECT.to_string()),
            start,
            end,
            location: self.location.and_then(|l| non_blank(l.display_name)),
            all_day: self.is_all_day.unwrap_or(false),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_user_defaults() {
        let user: GraphUser = serde_json::from_value(json!({
            "id": "u1",
            "displayName": null,
            "mail": null,
            "userPrincipalName": "alice@school.onmicrosoft.com"
        }))
        .unwrap();

        let remote = user.into_remote();
        assert_eq!(remote.remote_id, "u1");
        assert_eq!(remote.display_name, UNNAMED_USER);
        assert_eq!(remote.email, "alice@school.onmicrosoft.com");
        assert!(remote.job_title.is_none());
    }

    #[test]
    fn test_user_prefers_mail() {
        let user: GraphUser = serde_json::from_value(json!({
            "id": "u1",
            "displayName": "Alice",
            "mail": "alice@school.example",
            "userPrincipalName": "alice@school.onmicrosoft.com",
            "department": "Science"
        }))
        .unwrap();

        let remote = user.into_remote();
        assert_eq!(remote.email, "alice@school.example");
        assert_eq!(remote.department.as_deref(), Some("Science"));
    }

    #[test]
    fn test_missing_id_becomes_blank() {
        let user: GraphUser = serde_json::from_value(json!({"displayName": "Ghost"})).unwrap();
        assert!(!user.into_remote().has_remote_id());
    }

    #[test]
    fn test_event_parses_graph_wall_clock_as_utc() {
        let event: GraphEvent = serde_json::from_value(json!({
            "id": "e1",
            "subject": "Math",
            "start": {"dateTime": "2025-03-10T09:00:00.0000000", "timeZone": "UTC"},
            "end": {"dateTime": "2025-03-10T10:30:00.0000000", "timeZone": "UTC"},
            "location": {"displayName": "Room 4"},
            "isAllDay": false
        }))
        .unwrap();

        let remote = event.into_remote("u1").unwrap();
        assert_eq!(remote.start, Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap());
        assert_eq!(remote.end, Utc.with_ymd_and_hms(2025, 3, 10, 10, 30, 0).unwrap());
        assert_eq!(remote.owner_remote_id, "u1");
        assert_eq!(remote.location.as_deref(), Some("Room 4"));
    }

    #[test]
    fn test_event_with_offset() {
        let dt = GraphDateTime {
            date_time: "2025-03-10T09:00:00+02:00".to_string(),
            time_zone: None,
        };
        assert_eq!(dt.to_utc(), Some(Utc.with_ymd_and_hms(2025, 3, 10, 7, 0, 0).unwrap()));
    }

    #[test]
    fn test_event_without_end_is_dropped() {
        let event: GraphEvent = serde_json::from_value(json!({
            "id": "e1",
            "subject": "Open ended",
            "start": {"dateTime": "2025-03-10T09:00:00.0000000", "timeZone": "UTC"}
        }))
        .unwrap();
        assert!(event.into_remote("u1").is_none());
    }

    #[test]
    fn test_event_subject_default_and_empty_location() {
        let event: GraphEvent = serde_json::from_value(json!({
            "id": "e1",
            "subject": "",
            "start": {"dateTime": "2025-03-10T00:00:00", "timeZone": "UTC"},
            "end": {"dateTime": "2025-03-11T00:00:00", "timeZone": "UTC"},
            "location": {"displayName": ""},
            "isAllDay": true
        }))
        .unwrap();

        let remote = event.into_remote("u1").unwrap();
        assert_eq!(remote.subject, NO_SUBJECT);
        assert!(remote.location.is_none());
        assert!(remote.all_day);
    }

    #[test]
    fn test_null_all_day_is_not_all_day() {
        let page: ODataPage<GraphEvent> = serde_json::from_value(json!({
            "value": [
                {
                    "id": "e1",
                    "subject": "Assembly",
                    "start": {"dateTime": "2025-03-10T09:00:00", "timeZone": "UTC"},
                    "end": {"dateTime": "2025-03-10T10:00:00", "timeZone": "UTC"},
                    "isAllDay": null
                },
                {
                    "id": "e2",
                    "subject": "Sports day",
                    "start": {"dateTime": "2025-03-11T00:00:00", "timeZone": "UTC"},
                    "end": {"dateTime": "2025-03-12T00:00:00", "timeZone": "UTC"}
                }
            ]
        }))
        .unwrap();

        let events: Vec<_> = page.value.into_iter().filter_map(|e| e.into_remote("u1")).collect();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| !e.all_day));
    }

    #[test]
    fn test_page_without_next_link() {
        let page: ODataPage<GraphUser> = serde_json::from_value(json!({"value": []})).unwrap();
        assert!(page.value.is_empty());
        assert!(page.next_link.is_none());
    }
}
