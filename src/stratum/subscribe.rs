use super::*;

/// mining.subscribe params. Equihash miners send anything from an empty array
/// to [userAgent, sessionId], with nulls sprinkled in, so parsing is lenient.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Subscribe {
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
}

impl Serialize for Subscribe {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match (&self.user_agent, &self.session_id) {
            (user_agent, Some(session_id)) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(user_agent)?;
                seq.serialize_element(session_id)?;
                seq.end()
            }
            (Some(user_agent), None) => {
                let mut seq = serializer.serialize_seq(Some(1))?;
                seq.serialize_element(user_agent)?;
                seq.end()
            }
            (None, None) => serializer.serialize_seq(Some(0))?.end(),
        }
    }
}

impl<'de> Deserialize<'de> for Subscribe {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let params = Vec::<Value>::deserialize(deserializer)?;

        Ok(Subscribe {
            user_agent: params.first().and_then(Value::as_str).map(str::to_string),
            session_id: params.get(1).and_then(Value::as_str).map(str::to_string),
        })
    }
}

/// mining.subscribe result: [sessionId, extranonce1].
#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeResult {
    pub session_id: Option<String>,
    pub extranonce1: Extranonce,
}

impl Serialize for SubscribeResult {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(2))?;
        seq.serialize_element(&self.session_id)?;
        seq.serialize_element(&self.extranonce1)?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for SubscribeResult {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (session_id, extranonce1) = <(Option<String>, Extranonce)>::deserialize(deserializer)?;

        Ok(SubscribeResult {
            session_id,
            extranonce1,
        })
    }
}
