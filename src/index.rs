//! Inverted capability indexes.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use crate::record::{AgentRecord, Protocol};

/// Skill, tag and protocol indexes over agent IDs.
///
/// [`insert`](Self::insert) and [`remove`](Self::remove) are a matched
/// pair: removing a record with the same skills, tags and protocol it was
/// inserted with leaves no trace. Empty buckets are deleted.
#[derive(Debug, Clone, Default)]
pub struct CapabilityIndex {
    skills: HashMap<String, HashSet<String>>,
    tags: HashMap<String, HashSet<String>>,
    protocols: HashMap<Protocol, HashSet<String>>,
}

impl CapabilityIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes a record under its skills, tags and protocol.
    pub fn insert(&mut self, record: &AgentRecord) {
        for skill in &record.skills {
            add(&mut self.skills, skill.name.clone(), &record.id);
        }
        for tag in &record.tags {
            add(&mut self.tags, tag.clone(), &record.id);
        }
        add(&mut self.protocols, record.protocol, &record.id);
    }

    /// Removes a record using the skills, tags and protocol it carries.
    pub fn remove(&mut self, record: &AgentRecord) {
        for skill in &record.skills {
            discard(&mut self.skills, skill.name.as_str(), &record.id);
        }
        for tag in &record.tags {
            discard(&mut self.tags, tag.as_str(), &record.id);
        }
        discard(&mut self.protocols, &record.protocol, &record.id);
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.skills.clear();
        self.tags.clear();
        self.protocols.clear();
    }

    /// Returns the IDs matching every given filter, or `None` if no filter
    /// was given.
    #[must_use]
    pub fn candidates(
        &self,
        skill: Option<&str>,
        protocol: Option<Protocol>,
        tags: &[String],
    ) -> Option<HashSet<String>> {
        let mut result: Option<HashSet<String>> = None;
        let mut narrow = |ids: Option<&HashSet<String>>| {
            let ids = ids.cloned().unwrap_or_default();
            result = Some(match result.take() {
                None => ids,
                Some(current) => current.intersection(&ids).cloned().collect(),
            });
        };

        if let Some(skill) = skill {
            narrow(self.skills.get(skill));
        }
        if let Some(protocol) = protocol {
            narrow(self.protocols.get(&protocol));
        }
        for tag in tags {
            narrow(self.tags.get(tag.as_str()));
        }
        result
    }

    /// IDs indexed under a skill.
    #[must_use]
    pub fn by_skill(&self, skill: &str) -> Option<&HashSet<String>> {
        self.skills.get(skill)
    }

    /// IDs indexed under a tag.
    #[must_use]
    pub fn by_tag(&self, tag: &str) -> Option<&HashSet<String>> {
        self.tags.get(tag)
    }

    /// IDs indexed under a protocol.
    #[must_use]
    pub fn by_protocol(&self, protocol: Protocol) -> Option<&HashSet<String>> {
        self.protocols.get(&protocol)
    }

    /// Number of distinct skills indexed.
    #[must_use]
    pub fn skill_count(&self) -> usize {
        self.skills.len()
    }

    /// Number of distinct tags indexed.
    #[must_use]
    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    /// Number of distinct protocols indexed.
    #[must_use]
    pub fn protocol_count(&self) -> usize {
        self.protocols.len()
    }

    /// Returns true if nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.skills.is_empty() && self.tags.is_empty() && self.protocols.is_empty()
    }

    /// Returns true if the index holds exactly the entries implied by
    /// `records`.
    #[must_use]
    pub fn is_consistent_with<'a>(&self, records: impl IntoIterator<Item = &'a AgentRecord>) -> bool {
        let mut expected = Self::new();
        for record in records {
            expected.insert(record);
        }
        expected.skills == self.skills
            && expected.tags == self.tags
            && expected.protocols == self.protocols
    }
}

fn add<K: Eq + Hash>(index: &mut HashMap<K, HashSet<String>>, key: K, id: &str) {
    index.entry(key).or_default().insert(id.to_string());
}

fn discard<K, Q>(index: &mut HashMap<K, HashSet<String>>, key: &Q, id: &str)
where
    K: Eq + Hash + std::borrow::Borrow<Q>,
    Q: Eq + Hash + ?Sized,
{
    if let Some(ids) = index.get_mut(key) {
        ids.remove(id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}
