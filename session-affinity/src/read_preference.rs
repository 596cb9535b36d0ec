//! Read preferences describe which class of cluster node may serve a read.
//!
//! A [`ReadPreference`] is an immutable value. Sessions compare preferences by
//! equality to decide whether a pinned read connection can be reused, so two
//! independently constructed preferences with the same mode, tag sets and
//! staleness bound are interchangeable.
//!
//! ```
//! # use session_affinity::read_preference::{ReadPreference, TagSet};
//! let preference = ReadPreference::nearest()
//!     .with_tag_set(TagSet::from_iter([("dc", "east")]));
//!
//! assert!(preference.validate().is_ok());
//! assert_eq!(
//!     preference,
//!     ReadPreference::nearest().with_tag_set(TagSet::from_iter([("dc", "east")]))
//! );
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::errors::BadReadPreference;

/// The lowest accepted max staleness bound.
pub const MIN_MAX_STALENESS: Duration = Duration::from_secs(90);

/// Which class of nodes a read may be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum ReadPreferenceMode {
    /// Only the primary may serve the read.
    #[default]
    Primary,
    /// The primary if available, any eligible secondary otherwise.
    PrimaryPreferred,
    /// Only secondaries may serve the read.
    Secondary,
    /// An eligible secondary if available, the primary otherwise.
    SecondaryPreferred,
    /// Any eligible node, chosen by latency.
    Nearest,
}

impl ReadPreferenceMode {
    /// Name of the mode, as used in diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadPreferenceMode::Primary => "primary",
            ReadPreferenceMode::PrimaryPreferred => "primaryPreferred",
            ReadPreferenceMode::Secondary => "secondary",
            ReadPreferenceMode::SecondaryPreferred => "secondaryPreferred",
            ReadPreferenceMode::Nearest => "nearest",
        }
    }
}

impl fmt::Display for ReadPreferenceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of node tags. A node matches a tag set if it carries every tag in it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TagSet(BTreeMap<String, String>);

impl TagSet {
    /// Creates an empty tag set, which matches every node.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tag to the set.
    pub fn with_tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Returns the value of the tag with the given name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Iterates over the tags, ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Checks whether every tag of this set is present, with the same value,
    /// in the given node tags.
    pub fn matches<'a>(&self, node_tags: impl IntoIterator<Item = (&'a str, &'a str)>) -> bool {
        let node_tags: BTreeMap<&str, &str> = node_tags.into_iter().collect();
        self.iter()
            .all(|(name, value)| node_tags.get(name) == Some(&value))
    }

    /// Number of tags in the set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set has no tags.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TagSet {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        TagSet(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        f.write_str("}")
    }
}

/// Describes which nodes may serve a read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ReadPreference {
    mode: ReadPreferenceMode,
    tag_sets: Vec<TagSet>,
    max_staleness: Option<Duration>,
}

impl ReadPreference {
    /// Creates a read preference with the given mode, no tag sets and no staleness bound.
    pub fn new(mode: ReadPreferenceMode) -> Self {
        Self {
            mode,
            tag_sets: Vec::new(),
            max_staleness: None,
        }
    }

    /// Reads are served by the primary only.
    pub fn primary() -> Self {
        Self::new(ReadPreferenceMode::Primary)
    }

    /// Reads prefer the primary.
    pub fn primary_preferred() -> Self {
        Self::new(ReadPreferenceMode::PrimaryPreferred)
    }

    /// Reads are served by secondaries only.
    pub fn secondary() -> Self {
        Self::new(ReadPreferenceMode::Secondary)
    }

    /// Reads prefer secondaries.
    pub fn secondary_preferred() -> Self {
        Self::new(ReadPreferenceMode::SecondaryPreferred)
    }

    /// Reads are served by the nearest eligible node.
    pub fn nearest() -> Self {
        Self::new(ReadPreferenceMode::Nearest)
    }

    /// Appends a tag set. The order of tag sets is part of the preference's
    /// identity, but how it affects node selection is left to the
    /// [`ConnectionManager`](crate::network::ConnectionManager).
    pub fn with_tag_set(mut self, tag_set: TagSet) -> Self {
        self.tag_sets.push(tag_set);
        self
    }

    /// Bounds how far behind the primary an eligible secondary may be.
    pub fn with_max_staleness(mut self, max_staleness: Duration) -> Self {
        self.max_staleness = Some(max_staleness);
        self
    }

    /// The mode of this preference.
    pub fn mode(&self) -> ReadPreferenceMode {
        self.mode
    }

    /// Tag sets, in the order they were added.
    pub fn tag_sets(&self) -> &[TagSet] {
        &self.tag_sets
    }

    /// The staleness bound, if any.
    pub fn max_staleness(&self) -> Option<Duration> {
        self.max_staleness
    }

    /// Whether a node other than the primary may serve reads under this preference.
    pub fn is_secondary_ok(&self) -> bool {
        self.mode != ReadPreferenceMode::Primary
    }

    /// Checks that this preference can be used to route reads.
    pub fn validate(&self) -> Result<(), BadReadPreference> {
        if self.mode == ReadPreferenceMode::Primary {
            if !self.tag_sets.is_empty() {
                return Err(BadReadPreference::TagSetsWithPrimary);
            }
            if self.max_staleness.is_some() {
                return Err(BadReadPreference::MaxStalenessWithPrimary);
            }
        }

        match self.max_staleness {
            Some(max_staleness) if max_staleness < MIN_MAX_STALENESS => {
                Err(BadReadPreference::MaxStalenessTooSmall {
                    max_staleness,
                    minimum: MIN_MAX_STALENESS,
                })
            }
            _ => Ok(()),
        }
    }
}

impl From<ReadPreferenceMode> for ReadPreference {
    fn from(mode: ReadPreferenceMode) -> Self {
        Self::new(mode)
    }
}

impl fmt::Display for ReadPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mode)?;
        if !self.tag_sets.is_empty() {
            f.write_str(" tags=[")?;
            for (i, tag_set) in self.tag_sets.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{tag_set}")?;
            }
            f.write_str("]")?;
        }
        if let Some(max_staleness) = self.max_staleness {
            write!(f, " max_staleness={}s", max_staleness.as_secs())?;
        }
        Ok(())
    }
}
