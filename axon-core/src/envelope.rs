//! The JSON status envelope returned to the caller.

use serde::{Deserialize, Serialize};

/// Envelope status derived from the HTTP status class: 2xx reports
/// `success`, 4xx `fail` (caller input), anything else `error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Fail,
    Error,
}

impl Status {
    pub fn for_http(status: u16) -> Self {
        match status {
            200..=299 => Status::Success,
            400..=499 => Status::Fail,
            _ => Status::Error,
        }
    }
}

/// The pipeline stage reached when the response was written. Helps the
/// caller locate a failure without parsing the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    #[serde(rename = "load-configuration")]
    LoadConfiguration,
    #[serde(rename = "load-secret")]
    LoadSecret,
    #[serde(rename = "check-content-length")]
    CheckContentLength,
    #[serde(rename = "check-content-type")]
    CheckContentType,
    #[serde(rename = "parse-pre-condition")]
    ParsePreCondition,
    #[serde(rename = "parse-post-condition")]
    ParsePostCondition,
    #[serde(rename = "parse-payload")]
    ParsePayload,
    #[serde(rename = "match-pre-condition")]
    MatchPreCondition,
    #[serde(rename = "build-action")]
    BuildAction,
    #[serde(rename = "do-action")]
    DoAction,
    #[serde(rename = "match-post-condition")]
    MatchPostCondition,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::LoadConfiguration => "load-configuration",
            Stage::LoadSecret => "load-secret",
            Stage::CheckContentLength => "check-content-length",
            Stage::CheckContentType => "check-content-type",
            Stage::ParsePreCondition => "parse-pre-condition",
            Stage::ParsePostCondition => "parse-post-condition",
            Stage::ParsePayload => "parse-payload",
            Stage::MatchPreCondition => "match-pre-condition",
            Stage::BuildAction => "build-action",
            Stage::DoAction => "do-action",
            Stage::MatchPostCondition => "match-post-condition",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeData {
    pub stage: Stage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub status: Status,
    pub message: String,
    pub data: EnvelopeData,
}

impl Envelope {
    pub fn new(http_status: u16, message: impl Into<String>, stage: Stage) -> Self {
        Self {
            status: Status::for_http(http_status),
            message: message.into(),
            data: EnvelopeData { stage },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classes_map_to_envelope_status() {
        assert_eq!(Status::for_http(200), Status::Success);
        assert_eq!(Status::for_http(204), Status::Success);
        assert_eq!(Status::for_http(415), Status::Fail);
        assert_eq!(Status::for_http(503), Status::Error);
        assert_eq!(Status::for_http(502), Status::Error);
    }

    #[test]
    fn envelope_serializes_to_the_wire_shape() {
        let e = Envelope::new(200, "HTTP call succeeded", Stage::MatchPostCondition);
        assert_eq!(
            serde_json::to_string(&e).unwrap(),
            r#"{"status":"success","message":"HTTP call succeeded","data":{"stage":"match-post-condition"}}"#
        );
    }

    #[test]
    fn stage_names_round_trip() {
        let s: Stage = serde_json::from_str("\"do-action\"").unwrap();
        assert_eq!(s, Stage::DoAction);
        assert_eq!(s.as_str(), "do-action");
    }
}
