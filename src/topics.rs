//! Topic / payload codec.
//!
//! Maps a logical topic name to a wire payload given named substitution
//! values, and distinguishes publish-direction topics from
//! subscribe-direction topics.
//!
//! Template rules: a value of the form `{name}` is a placeholder filled from
//! the caller's arguments; any other string is a literal. A single-entry
//! template renders to the bare substituted string; a multi-entry template
//! renders to a JSON object. A template key whose placeholder the caller did
//! not supply fails fast with [`PayloadError::MissingKey`] — a partial or
//! garbled payload is never produced.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::config::TopicsConfig;
use crate::error::PayloadError;

// ---------------------------------------------------------------------------
// Topic model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Publish,
    Subscribe,
}

/// One configured topic: a name, a direction, and a payload template.
#[derive(Debug, Clone)]
pub struct Topic {
    pub name: String,
    pub direction: Direction,
    template: BTreeMap<String, String>,
}

/// A rendered wire payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Single scalar state, sent as-is.
    Text(String),
    /// Multi-field payload, sent as a JSON object.
    Json(Value),
}

impl Payload {
    /// Bytes as they go on the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Text(s) => s.clone().into_bytes(),
            Self::Json(v) => v.to_string().into_bytes(),
        }
    }
}

fn placeholder(value: &str) -> Option<&str> {
    value
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .filter(|name| !name.is_empty())
}

impl Topic {
    /// Render the template by substituting every placeholder with the
    /// matching named argument. Extra unused arguments are ignored.
    pub fn payload(&self, args: &[(&str, &str)]) -> Result<Payload, PayloadError> {
        let lookup = |key: &str| args.iter().find(|(k, _)| *k == key).map(|(_, v)| *v);

        let mut rendered: Vec<(&str, String)> = Vec::with_capacity(self.template.len());
        for (field, value) in &self.template {
            let out = match placeholder(value) {
                Some(name) => lookup(name)
                    .ok_or_else(|| PayloadError::MissingKey(name.to_string()))?
                    .to_string(),
                None => value.clone(),
            };
            rendered.push((field, out));
        }

        if rendered.len() == 1 {
            let (_, value) = rendered.pop().unwrap_or_default();
            return Ok(Payload::Text(value));
        }
        let mut obj = Map::new();
        for (field, value) in rendered {
            obj.insert(field.to_string(), Value::String(value));
        }
        Ok(Payload::Json(Value::Object(obj)))
    }

    /// Validate an incoming payload against the expected shape: every
    /// literal field must match exactly and every placeholder field must be
    /// present. Used on the subscribe side to reject malformed control
    /// messages before acting on them.
    pub fn matches_incoming(&self, raw: &[u8]) -> bool {
        if self.template.len() == 1 {
            let Ok(text) = std::str::from_utf8(raw) else {
                return false;
            };
            let value = self.template.values().next().map(String::as_str).unwrap_or("");
            return match placeholder(value) {
                Some(_) => !text.is_empty(),
                None => text == value,
            };
        }

        let Ok(Value::Object(obj)) = serde_json::from_slice::<Value>(raw) else {
            return false;
        };
        self.template.iter().all(|(field, value)| {
            let Some(Value::String(got)) = obj.get(field) else {
                return false;
            };
            match placeholder(value) {
                Some(_) => true,
                None => got == value,
            }
        })
    }

    /// Extract the value of one placeholder field from a validated incoming
    /// payload.
    pub fn extract_incoming(&self, raw: &[u8], field: &str) -> Option<String> {
        if self.template.len() == 1 {
            return std::str::from_utf8(raw).ok().map(str::to_string);
        }
        let Ok(Value::Object(obj)) = serde_json::from_slice::<Value>(raw) else {
            return None;
        };
        obj.get(field)
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

// ---------------------------------------------------------------------------
// Topic registry
// ---------------------------------------------------------------------------

/// All configured topics, indexed by name.
#[derive(Debug, Clone, Default)]
pub struct TopicSet {
    topics: BTreeMap<String, Topic>,
}

impl TopicSet {
    pub fn from_config(config: &TopicsConfig) -> Self {
        let mut topics = BTreeMap::new();
        for (name, template) in &config.publish {
            topics.insert(
                name.clone(),
                Topic {
                    name: name.clone(),
                    direction: Direction::Publish,
                    template: template.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                },
            );
        }
        for (name, template) in &config.subscribe {
            topics.insert(
                name.clone(),
                Topic {
                    name: name.clone(),
                    direction: Direction::Subscribe,
                    template: template.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                },
            );
        }
        Self { topics }
    }

    pub fn get(&self, name: &str) -> Option<&Topic> {
        self.topics.get(name)
    }

    /// Render a publish-direction topic's payload.
    pub fn payload(&self, name: &str, args: &[(&str, &str)]) -> Result<Payload, PayloadError> {
        let topic = self
            .topics
            .get(name)
            .ok_or_else(|| PayloadError::UnknownTopic(name.to_string()))?;
        if topic.direction != Direction::Publish {
            return Err(PayloadError::WrongDirection(name.to_string()));
        }
        topic.payload(args)
    }

    pub fn publish_topics(&self) -> impl Iterator<Item = &Topic> {
        self.topics
            .values()
            .filter(|t| t.direction == Direction::Publish)
    }

    pub fn subscribe_topics(&self) -> impl Iterator<Item = &Topic> {
        self.topics
            .values()
            .filter(|t| t.direction == Direction::Subscribe)
    }
}
