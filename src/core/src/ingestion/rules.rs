use std::collections::BTreeMap;

use serde::Deserialize;

use crate::storage::types::{Data, Message};

/// Maps bus topics under `prefix` onto samples of `module`.
///
/// With a non-empty `topics` table the part of the bus topic after `prefix`
/// is looked up there and unknown suffixes are skipped. Without it, the
/// suffix (one path segment) prefixed with `topic_prefix` becomes the topic.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct IngestRule {
    pub prefix: String,
    pub module: String,
    #[serde(default)]
    pub topics: BTreeMap<String, String>,
    #[serde(default)]
    pub topic_prefix: String,
    /// Inclusive bounds; payloads must parse as `f64` and fall inside.
    #[serde(default)]
    pub numeric_range: Option<[f64; 2]>,
}

/// What a rule decided for one message.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// The rule does not cover this bus topic.
    NoMatch,
    /// Covered, but nothing should be stored.
    Skip,
    /// Covered, but the payload is not acceptable.
    Reject(String),
    Store(Data),
}

impl IngestRule {
    pub fn decide(&self, msg: &Message) -> Decision {
        let Some(suffix) = msg.topic.strip_prefix(&self.prefix) else {
            return Decision::NoMatch;
        };

        let topic = if self.topics.is_empty() {
            if suffix.is_empty() || suffix.contains('/') {
                return Decision::Skip;
            }
            format!("{}{}", self.topic_prefix, suffix)
        } else {
            match self.topics.get(suffix) {
                Some(mapped) => mapped.clone(),
                None => return Decision::Skip,
            }
        };

        if let Some([low, high]) = self.numeric_range {
            match msg.message.trim().parse::<f64>() {
                Ok(v) if v >= low && v <= high => {}
                Ok(v) => {
                    return Decision::Reject(format!("{} outside [{}, {}]", v, low, high));
                }
                Err(e) => return Decision::Reject(format!("{:?} is not a number: {}", msg.message, e)),
            }
        }

        Decision::Store(Data::new(
            self.module.clone(),
            msg.date_time.clone(),
            topic,
            msg.message.clone(),
        ))
    }
}
