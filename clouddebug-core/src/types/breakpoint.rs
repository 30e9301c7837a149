//! Cloud Debugger breakpoint (snapshot / logpoint) model
//!
//! Mirrors the JSON representation used by the Cloud Debugger v2 REST API.
//! Every field is optional on the wire; absent collections deserialize empty.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A breakpoint as stored by the cloud debugger service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerBreakpoint {
    /// Server-assigned id, unique within a debuggee. Empty on create requests.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<BreakpointAction>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Watch expressions, order preserved.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expressions: Vec<String>,

    /// True once the snapshot was captured or the breakpoint otherwise terminated.
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_final_state: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<Timestamp>,

    /// Set only for final breakpoints. Absence means the breakpoint is still armed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_time: Option<Timestamp>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusMessage>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stack_frames: Vec<StackFrame>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evaluated_expressions: Vec<Variable>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variable_table: Vec<Variable>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl ServerBreakpoint {
    /// Create an unregistered breakpoint request at a server path and one-based line.
    pub fn at(path: impl Into<String>, line: i32) -> Self {
        Self {
            location: Some(SourceLocation::new(path, line)),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn is_final(&self) -> bool {
        self.is_final_state
    }

    /// Pending breakpoints have no final time yet.
    pub fn is_pending(&self) -> bool {
        self.final_time.is_none()
    }

    /// Server path of the location, if present and non-empty.
    pub fn path(&self) -> Option<&str> {
        self.location
            .as_ref()
            .and_then(|l| l.path.as_deref())
            .filter(|p| !p.is_empty())
    }

    pub fn line(&self) -> Option<i32> {
        self.location.as_ref().and_then(|l| l.line)
    }

    pub fn has_error_status(&self) -> bool {
        self.status.as_ref().map(|s| s.is_error).unwrap_or(false)
    }

    /// True if both breakpoints sit on the same valid `(path, line)`.
    pub fn same_location(&self, other: &ServerBreakpoint) -> bool {
        match (self.path(), self.line(), other.path(), other.line()) {
            (Some(a_path), Some(a_line), Some(b_path), Some(b_line)) => {
                a_path == b_path && a_line == b_line
            }
            _ => false,
        }
    }
}

/// What the agent does when the breakpoint is hit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakpointAction {
    #[default]
    Capture,
    Log,
}

impl BreakpointAction {
    pub fn as_str(self) -> &'static str {
        match self {
            BreakpointAction::Capture => "CAPTURE",
            BreakpointAction::Log => "LOG",
        }
    }
}

/// Source position in the server's path convention (`com/example/Foo.java`, one-based line).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<i32>,
}

impl SourceLocation {
    pub fn new(path: impl Into<String>, line: i32) -> Self {
        Self {
            path: Some(path.into()),
            line: Some(line),
        }
    }

    /// A location is usable when it has a non-empty path and a line.
    pub fn is_valid(&self) -> bool {
        self.path.as_deref().map(|p| !p.is_empty()).unwrap_or(false) && self.line.is_some()
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.path, self.line) {
            (Some(path), Some(line)) => write!(f, "{}:{}", path, line),
            (Some(path), None) => write!(f, "{}", path),
            _ => write!(f, "<unknown>"),
        }
    }
}

/// Server-reported diagnostic attached to a breakpoint or variable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessage {
    #[serde(default)]
    pub is_error: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refers_to: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<FormatMessage>,
}

impl StatusMessage {
    pub fn error(format: impl Into<String>, parameters: Vec<String>) -> Self {
        Self {
            is_error: true,
            refers_to: None,
            description: Some(FormatMessage {
                format: Some(format.into()),
                parameters,
            }),
        }
    }
}

/// A `$0`, `$1`, ... positional template plus its parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
}

/// One frame of a captured snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<Variable>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locals: Vec<Variable>,
}

/// A captured variable. `var_table_index` points into the breakpoint's shared variable table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub var_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub var_table_index: Option<i32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<Variable>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusMessage>,
}

/// Protobuf-style timestamp. Ordered by `seconds`, then `nanos`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: i32,
}

impl Timestamp {
    pub fn new(seconds: i64, nanos: i32) -> Self {
        Self { seconds, nanos }
    }

    /// Parse the RFC 3339 form used by the REST API (`2014-10-02T15:01:23.045123456Z`).
    pub fn parse_rfc3339(text: &str) -> Result<Self, chrono::ParseError> {
        let parsed = DateTime::parse_from_rfc3339(text)?;
        Ok(Self {
            seconds: parsed.timestamp(),
            nanos: parsed.timestamp_subsec_nanos() as i32,
        })
    }

    pub fn to_rfc3339(&self) -> Option<String> {
        DateTime::from_timestamp(self.seconds, self.nanos.max(0) as u32)
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_rfc3339() {
            Some(text) => f.write_str(&text),
            None => write!(f, "{}.{:09}", self.seconds, self.nanos),
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.to_rfc3339() {
            Some(text) => serializer.serialize_str(&text),
            None => Err(serde::ser::Error::custom(format!(
                "timestamp out of range: {}s {}ns",
                self.seconds, self.nanos
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Parts {
                #[serde(default)]
                seconds: i64,
                #[serde(default)]
                nanos: i32,
            },
        }

        match Repr::deserialize(deserializer)? {
            Repr::Text(text) => Timestamp::parse_rfc3339(&text).map_err(serde::de::Error::custom),
            Repr::Parts { seconds, nanos } => Ok(Timestamp { seconds, nanos }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_rest_breakpoint() {
        let json = r#"{
            "id": "bp-1",
            "action": "CAPTURE",
            "location": { "path": "com/example/Foo.java", "line": 42 },
            "condition": "x > 1",
            "expressions": ["a", "b.c"],
            "isFinalState": true,
            "createTime": "2017-03-01T10:00:00Z",
            "finalTime": "2017-03-01T10:00:05.250Z",
            "status": {
                "isError": true,
                "refersTo": "BREAKPOINT_SOURCE_LOCATION",
                "description": { "format": "No code found at line $0", "parameters": ["42"] }
            }
        }"#;

        let bp: ServerBreakpoint = serde_json::from_str(json).unwrap();
        assert_eq!(bp.id, "bp-1");
        assert_eq!(bp.action, Some(BreakpointAction::Capture));
        assert_eq!(bp.path(), Some("com/example/Foo.java"));
        assert_eq!(bp.line(), Some(42));
        assert_eq!(bp.expressions, vec!["a".to_string(), "b.c".to_string()]);
        assert!(bp.is_final());
        assert!(!bp.is_pending());
        assert_eq!(bp.final_time.unwrap().nanos, 250_000_000);
        assert!(bp.has_error_status());
    }

    #[test]
    fn test_missing_fields_default() {
        let bp: ServerBreakpoint = serde_json::from_str(r#"{"id": "x"}"#).unwrap();
        assert!(!bp.is_final());
        assert!(bp.is_pending());
        assert!(bp.expressions.is_empty());
        assert_eq!(bp.path(), None);
        assert!(!bp.has_error_status());
    }

    #[test]
    fn test_timestamp_accepts_object_form() {
        let ts: Timestamp = serde_json::from_str(r#"{"seconds": 100, "nanos": 500}"#).unwrap();
        assert_eq!(ts, Timestamp::new(100, 500));

        let ts: Timestamp = serde_json::from_str(r#"{"seconds": 7}"#).unwrap();
        assert_eq!(ts, Timestamp::new(7, 0));
    }

    #[test]
    fn test_create_request_omits_server_fields() {
        let request = ServerBreakpoint::at("com/example/Foo.java", 10);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "location": { "path": "com/example/Foo.java", "line": 10 } })
        );
    }

    #[test]
    fn test_same_location_requires_valid_locations() {
        let a = ServerBreakpoint::at("A.java", 3);
        let b = ServerBreakpoint::at("A.java", 3).with_id("other");
        let c = ServerBreakpoint::at("", 3);
        assert!(a.same_location(&b));
        assert!(!a.same_location(&c));
        assert!(!c.same_location(&c));
    }

    #[test]
    fn test_timestamp_ordering() {
        assert!(Timestamp::new(100, 500) > Timestamp::new(100, 0));
        assert!(Timestamp::new(101, 0) > Timestamp::new(100, 999));
    }
}
