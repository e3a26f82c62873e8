//! Dataset row types
//!
//! Every table row is keyed by its WorkUnit (repository + file path) plus an
//! item discriminator inside that unit. The `(unit, item)` pair is the primary
//! key a table never holds twice.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Separator used when an ActorSet is flattened into one column
pub const ACTOR_SEPARATOR: &str = ", ";

/// Category label written when no classifier is available
pub const NOT_CLASSIFIED: &str = "not_classified";

/// Category label written when the revision detail could not be fetched
pub const FETCH_ERROR: &str = "fetch_error";

/// Category label written when the classifier failed on a revision
pub const CLASSIFICATION_ERROR: &str = "classification_error";

/// Agent column value for human-authored rows
pub const HUMAN_AGENT: &str = "human";

/// Ordered, deduplicated identities associated with one revision
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ActorSet(Vec<String>);

impl ActorSet {
    /// Build from any sequence of names, trimming blanks and dropping repeats
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut actors: Vec<String> = Vec::new();
        for name in names {
            let name = name.as_ref().trim();
            if !name.is_empty() && !actors.iter().any(|a| a == name) {
                actors.push(name.to_string());
            }
        }
        Self(actors)
    }

    /// Author first, then the committer when it differs
    pub fn from_commit(author: &str, committer: Option<&str>) -> Self {
        Self::new(std::iter::once(author).chain(committer))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The flattened single-column form
    pub fn joined(&self) -> String {
        self.0.join(ACTOR_SEPARATOR)
    }

    /// Inverse of [`ActorSet::joined`]
    pub fn parse(joined: &str) -> Self {
        Self::new(joined.split(ACTOR_SEPARATOR))
    }
}

impl fmt::Display for ActorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined())
    }
}

impl Serialize for ActorSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.joined())
    }
}

impl<'de> Deserialize<'de> for ActorSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let joined = String::deserialize(deserializer)?;
        Ok(Self::parse(&joined))
    }
}

/// Two-valued authorship classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Authorship {
    Automated,
    Human,
}

impl fmt::Display for Authorship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Authorship::Automated => f.write_str("Automated"),
            Authorship::Human => f.write_str("Human"),
        }
    }
}

/// Authorship plus the automated tool name when there is one
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AuthorshipTag {
    Automated { agent: String },
    Human,
}

impl AuthorshipTag {
    pub fn automated(agent: impl Into<String>) -> Self {
        Self::Automated {
            agent: agent.into(),
        }
    }

    pub fn authorship(&self) -> Authorship {
        match self {
            AuthorshipTag::Automated { .. } => Authorship::Automated,
            AuthorshipTag::Human => Authorship::Human,
        }
    }

    pub fn is_automated(&self) -> bool {
        matches!(self, AuthorshipTag::Automated { .. })
    }

    /// Tool name, or `"human"` for human-authored revisions
    pub fn agent_label(&self) -> &str {
        match self {
            AuthorshipTag::Automated { agent } => agent,
            AuthorshipTag::Human => HUMAN_AGENT,
        }
    }

    /// Rebuild from the two persisted columns
    pub fn from_columns(authorship: Authorship, agent: &str) -> Self {
        match authorship {
            Authorship::Automated => Self::automated(agent),
            Authorship::Human => Self::Human,
        }
    }
}

impl fmt::Display for AuthorshipTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthorshipTag::Automated { agent } => write!(f, "Automated/{}", agent),
            AuthorshipTag::Human => f.write_str("Human"),
        }
    }
}

/// Resumption granule: one repository + file pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitKey {
    pub repository: String,
    pub file_path: String,
}

impl UnitKey {
    pub fn new(repository: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            file_path: file_path.into(),
        }
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.file_path)
    }
}

/// Primary key of one row
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub unit: UnitKey,
    pub item: String,
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.unit, self.item)
    }
}

/// A row type persisted in one table
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Table name, also the file stem
    const TABLE: &'static str;

    /// Header, in serialization order
    const COLUMNS: &'static [&'static str];

    fn unit(&self) -> UnitKey;

    /// Discriminator of the row inside its unit
    fn item(&self) -> String;

    fn key(&self) -> RecordKey {
        RecordKey {
            unit: self.unit(),
            item: self.item(),
        }
    }
}

/// Provenance of one newly added file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileProvenanceRecord {
    pub repository: String,
    pub file_path: String,
    pub creator_actors: ActorSet,
    pub creator_authorship: Authorship,
    pub creator_agent: String,
    pub creation_date: String,
    pub creation_revision: String,
    pub line_count: u64,
    /// Revisions touching the file in the history window, before any cap
    pub revision_count: u64,
    /// Revision rows written for the unit; completion is judged against this
    pub revisions_mined: u64,
}

impl Record for FileProvenanceRecord {
    const TABLE: &'static str = "files";
    const COLUMNS: &'static [&'static str] = &[
        "repository",
        "file_path",
        "creator_actors",
        "creator_authorship",
        "creator_agent",
        "creation_date",
        "creation_revision",
        "line_count",
        "revision_count",
        "revisions_mined",
    ];

    fn unit(&self) -> UnitKey {
        UnitKey::new(&self.repository, &self.file_path)
    }

    fn item(&self) -> String {
        "file".to_string()
    }
}

/// One (file, revision) pair of a mined history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionRecord {
    pub repository: String,
    pub file_path: String,
    pub revision_id: String,
    pub revision_date: String,
    pub actors: ActorSet,
    pub authorship: Authorship,
    pub agent: String,
    pub origin_authorship: Authorship,
    pub message: String,
    pub category: String,
    pub changed_lines: u64,
}

impl RevisionRecord {
    pub fn tag(&self) -> AuthorshipTag {
        AuthorshipTag::from_columns(self.authorship, &self.agent)
    }
}

impl Record for RevisionRecord {
    const TABLE: &'static str = "revisions";
    const COLUMNS: &'static [&'static str] = &[
        "repository",
        "file_path",
        "revision_id",
        "revision_date",
        "actors",
        "authorship",
        "agent",
        "origin_authorship",
        "message",
        "category",
        "changed_lines",
    ];

    fn unit(&self) -> UnitKey {
        UnitKey::new(&self.repository, &self.file_path)
    }

    fn item(&self) -> String {
        self.revision_id.clone()
    }
}

/// One parsed blame line of a file at a revision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlameRow {
    pub repository: String,
    pub file_path: String,
    pub revision_id: String,
    pub line_number: u64,
    pub actor: String,
    pub date: String,
    pub time: String,
    pub code: String,
}

impl Record for BlameRow {
    const TABLE: &'static str = "blame";
    const COLUMNS: &'static [&'static str] = &[
        "repository",
        "file_path",
        "revision_id",
        "line_number",
        "actor",
        "date",
        "time",
        "code",
    ];

    fn unit(&self) -> UnitKey {
        UnitKey::new(&self.repository, &self.file_path)
    }

    fn item(&self) -> String {
        format!("{}:{}", self.revision_id, self.line_number)
    }
}
