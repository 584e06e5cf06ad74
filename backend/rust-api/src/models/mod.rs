use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod attempt;
pub mod question;

/// Assessment model stored in the MongoDB "assessments" collection.
///
/// Reference data from the engine's perspective: consulted when starting and
/// grading attempts, never mutated here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assessment {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub assessment_type: AssessmentType,
    /// 0-100; an attempt passes when its score reaches this value.
    pub passing_score: u8,
    /// Only meaningful for SIMULADO assessments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit_in_minutes: Option<u32>,
    #[serde(default)]
    pub randomize_questions: bool,
    #[serde(default)]
    pub randomize_options: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lesson_id: Option<String>,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt", with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssessmentType {
    Quiz,
    Simulado,
    ProvaAberta,
}

impl Assessment {
    /// Time limits apply only to timed SIMULADO assessments.
    pub fn time_limit(&self) -> Option<chrono::Duration> {
        if self.assessment_type != AssessmentType::Simulado {
            return None;
        }
        self.time_limit_in_minutes
            .map(|minutes| chrono::Duration::minutes(i64::from(minutes)))
    }
}

// Serde converters for chrono::DateTime <-> mongodb::bson::DateTime
pub(crate) mod bson_datetime_as_chrono {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let bson_dt = bson::DateTime::from_millis(date.timestamp_millis());
        bson_dt.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bson_dt = bson::DateTime::deserialize(deserializer)?;
        Ok(DateTime::from_timestamp_millis(bson_dt.timestamp_millis()).unwrap())
    }
}

pub(crate) mod bson_datetime_as_chrono_option {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(date) => {
                let bson_dt = bson::DateTime::from_millis(date.timestamp_millis());
                bson_dt.serialize(serializer)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bson_dt = Option::<bson::DateTime>::deserialize(deserializer)?;
        Ok(bson_dt.map(|dt| DateTime::from_timestamp_millis(dt.timestamp_millis()).unwrap()))
    }
}
