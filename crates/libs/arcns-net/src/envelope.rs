use serde::{Deserialize, Serialize};

/// Wire-level reply wrapper shared by every endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "errCode", alias = "errorCode")]
    pub error_code: Option<String>,
    pub data: Option<T>,
    /// Server-reported clock lag in seconds.
    #[serde(default)]
    pub lag: Option<i64>,
}

impl<T> ResponseEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, message: None, error_code: None, data: Some(data), lag: None }
    }

    pub fn failed(message: impl Into<String>, error_code: Option<&str>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            error_code: error_code.map(str::to_owned),
            data: None,
            lag: None,
        }
    }

    pub fn with_lag(mut self, lag: i64) -> Self {
        self.lag = Some(lag);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_legacy_error_key() {
        let envelope: ResponseEnvelope<serde_json::Value> = serde_json::from_value(json!({
            "success": false,
            "message": "expired",
            "errCode": "401",
        }))
        .expect("decode");
        assert!(!envelope.success);
        assert_eq!(envelope.error_code.as_deref(), Some("401"));
        assert_eq!(envelope.data, None);
    }

    #[test]
    fn accepts_error_code_alias_and_defaults() {
        let envelope: ResponseEnvelope<Vec<u32>> =
            serde_json::from_str(r#"{"errorCode":"E1"}"#).expect("decode");
        assert!(!envelope.success);
        assert_eq!(envelope.error_code.as_deref(), Some("E1"));
        assert_eq!(envelope.lag, None);
    }

    #[test]
    fn decodes_payload_and_lag() {
        let envelope: ResponseEnvelope<Vec<u32>> =
            serde_json::from_str(r#"{"success":true,"data":[1,2],"lag":-3}"#).expect("decode");
        assert_eq!(envelope, ResponseEnvelope::ok(vec![1, 2]).with_lag(-3));
    }

    #[test]
    fn serializes_with_wire_names() {
        let value = serde_json::to_value(ResponseEnvelope::<()>::failed("nope", Some("E9")))
            .expect("encode");
        assert_eq!(value["errCode"], json!("E9"));
        assert_eq!(value["success"], json!(false));
    }
}
