use super::*;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Clone)]
#[serde(untagged)]
pub enum Id {
    Null,
    Number(u64),
    String(String),
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Message {
    Request {
        id: Id,
        method: String,
        params: Value,
    },
    Response {
        id: Id,
        result: Option<Value>,
        error: Option<JsonRpcError>,
    },
    Notification {
        method: String,
        params: Value,
    },
}

/// Stratum does id: null, which is technically wrong according to the JSON-RPC spec, which
/// states that no id field should be present. This is a work around to allow both cases. If
/// a server sends a notification with an id field other than null it will be classified as
/// a request and should just be ignored by any client.
impl<'de> Deserialize<'de> for Message {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;

        let is_request = value.get("method").is_some() && value.get("id").is_some();

        let is_notification_optional_null_id = value.get("method").is_some()
            && (value.get("id") == Some(&Value::Null) || value.get("id").is_none());

        let is_response = value.get("result").is_some() || value.get("error").is_some();

        if is_response {
            #[derive(Deserialize)]
            struct Resp {
                id: Id,
                result: Option<Value>,
                error: Option<JsonRpcError>,
            }

            let r: Resp = serde_json::from_value(value).map_err(de::Error::custom)?;

            Ok(Message::Response {
                id: r.id,
                result: r.result,
                error: r.error,
            })
        } else if is_notification_optional_null_id {
            let method = value
                .get("method")
                .and_then(Value::as_str)
                .ok_or_else(|| de::Error::missing_field("method"))?
                .to_string();

            let params = value
                .get("params")
                .cloned()
                .ok_or_else(|| de::Error::missing_field("params"))?;

            Ok(Message::Notification { method, params })
        } else if is_request {
            #[derive(Deserialize)]
            struct Req {
                id: Id,
                method: String,
                params: Value,
            }

            let r: Req = serde_json::from_value(value).map_err(de::Error::custom)?;

            Ok(Message::Request {
                id: r.id,
                method: r.method,
                params: r.params,
            })
        } else {
            Err(de::Error::custom("unknown message format"))
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, pretty_assertions::assert_eq, serde_json::json};

    #[track_caller]
    fn case(s: &str, expected: Message) {
        let actual = serde_json::from_str::<Message>(s).unwrap();
        assert_eq!(actual, expected, "deserialize Message from str");

        let serialized = serde_json::to_string(&actual).unwrap();
        let lhs: Value = serde_json::from_str(s).unwrap();
        let rhs: Value = serde_json::from_str(&serialized).unwrap();
        assert_eq!(lhs, rhs, "JSON semantic equality");

        let round_trip = serde_json::from_str::<Message>(&serialized).unwrap();
        assert_eq!(round_trip, expected, "roundtrip");
    }

    #[test]
    fn request() {
        case(
            r#"{"id":1,"method":"mining.subscribe","params":[]}"#,
            Message::Request {
                id: Id::Number(1),
                method: "mining.subscribe".into(),
                params: json!([]),
            },
        );
    }

    #[test]
    fn notification() {
        case(
            r#"{"method":"mining.notify","params":[]}"#,
            Message::Notification {
                method: "mining.notify".into(),
                params: json!([]),
            },
        );

        let with_id_null = r#"{"method":"mining.notify","params":[],"id":null}"#;

        assert_eq!(
            serde_json::from_str::<Message>(with_id_null).unwrap(),
            Message::Notification {
                method: "mining.notify".into(),
                params: json!([]),
            }
        );
    }

    #[test]
    fn subscribe_response() {
        case(
            r#"{"id":1,"result":["deadbeefcafebabe00000001","68000000"],"error":null}"#,
            Message::Response {
                id: Id::Number(1),
                result: Some(json!(["deadbeefcafebabe00000001", "68000000"])),
                error: None,
            },
        );
    }

    #[test]
    fn error_response() {
        case(
            r#"{"id":10,"result":null,"error":null}"#,
            Message::Response {
                id: Id::Number(10),
                result: None,
                error: None,
            },
        );

        case(
            r#"{"id":10,"result":null,"error":[21,"job not found",null]}"#,
            Message::Response {
                id: Id::Number(10),
                result: None,
                error: Some(StratumError::job_not_found().to_wire()),
            },
        );
    }

    #[test]
    fn submit() {
        case(
            r#"{"id":4,"method":"mining.submit","params":["t1ePool.worker1","cccd","00105e5f","00000001","fd4005aa"]}"#,
            Message::Request {
                id: Id::Number(4),
                method: "mining.submit".into(),
                params: serde_json::to_value(Submit {
                    worker_name: "t1ePool.worker1".into(),
                    job_id: "cccd".into(),
                    ntime: "00105e5f".into(),
                    extranonce2: "00000001".into(),
                    solution: "fd4005aa".into(),
                })
                .unwrap(),
            },
        );

        case(
            r#"{"id":4,"result":true,"error":null}"#,
            Message::Response {
                id: Id::Number(4),
                result: Some(json!(true)),
                error: None,
            },
        );
    }

    #[test]
    fn set_target() {
        let set_target = r#"{"id":null,"method":"mining.set_target","params":["0007ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff"]}"#;

        assert_eq!(
            serde_json::from_str::<Message>(set_target).unwrap(),
            Message::Notification {
                method: "mining.set_target".into(),
                params: serde_json::to_value(SetTarget::from_difficulty(1.0)).unwrap(),
            },
        );
    }

    #[test]
    fn authorize() {
        case(
            r#"{"id":2,"method":"mining.authorize","params":["t1ePool.worker1","x"]}"#,
            Message::Request {
                id: Id::Number(2),
                method: "mining.authorize".into(),
                params: serde_json::to_value(Authorize {
                    username: "t1ePool.worker1".into(),
                    password: Some("x".into()),
                })
                .unwrap(),
            },
        );
    }

    #[test]
    fn unknown_shape_errors() {
        assert!(serde_json::from_str::<Message>(r#"{"jsonrpc":"2.0"}"#).is_err());
        assert!(serde_json::from_str::<Message>(r#"[1,2,3]"#).is_err());
    }
}
