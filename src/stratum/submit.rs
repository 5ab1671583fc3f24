use super::*;

/// mining.submit params: [workerName, jobId, ntime, extranonce2, solution].
///
/// Everything stays a raw string here. Shape validation happens during share
/// processing so each defect maps to its own error code instead of a parse
/// failure that tears down the session.
#[derive(Debug, Clone, PartialEq)]
pub struct Submit {
    pub worker_name: String,
    pub job_id: String,
    pub ntime: String,
    pub extranonce2: String,
    pub solution: String,
}

impl Serialize for Submit {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(5))?;
        seq.serialize_element(&self.worker_name)?;
        seq.serialize_element(&self.job_id)?;
        seq.serialize_element(&self.ntime)?;
        seq.serialize_element(&self.extranonce2)?;
        seq.serialize_element(&self.solution)?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Submit {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (worker_name, job_id, ntime, extranonce2, solution) =
            <(String, String, String, String, String)>::deserialize(deserializer)?;

        Ok(Submit {
            worker_name,
            job_id,
            ntime,
            extranonce2,
            solution,
        })
    }
}
