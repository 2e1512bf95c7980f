//! Locus addressing: dot-separated paths into the interaction tree.
//!
//! `"0"` is the root. A child path is its parent plus one trailing segment,
//! so `"0.1.2"` is the second child of the first child of the root.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error for locus paths that do not parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocusError {
    #[error("empty locus path")]
    Empty,

    #[error("locus path {path:?}: segment {segment:?} is not a non-negative integer")]
    BadSegment { path: String, segment: String },

    #[error("locus path {path:?} does not start at the root \"0\"")]
    NotRooted { path: String },
}

/// Address of a node in the interaction tree.
///
/// Ordering is segment-wise numeric, so `0.2 < 0.10`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LocusPath(Vec<u32>);

impl LocusPath {
    /// The root locus `"0"`.
    pub fn root() -> Self {
        Self(vec![0])
    }

    pub fn is_root(&self) -> bool {
        self.0.len() == 1
    }

    /// Number of segments below the root (root has depth 0).
    pub fn depth(&self) -> usize {
        self.0.len() - 1
    }

    pub fn segments(&self) -> &[u32] {
        &self.0
    }

    /// The last segment, i.e. this node's suffix under its parent.
    pub fn suffix(&self) -> u32 {
        self.0[self.0.len() - 1]
    }

    /// Parent path, `None` for the root.
    pub fn parent(&self) -> Option<LocusPath> {
        if self.is_root() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// Child path with one more segment.
    pub fn child(&self, suffix: u32) -> LocusPath {
        let mut segments = self.0.clone();
        segments.push(suffix);
        Self(segments)
    }

    /// Whether `self` equals `other` or lies beneath it.
    pub fn is_within(&self, other: &LocusPath) -> bool {
        self.0.len() >= other.0.len() && self.0[..other.0.len()] == other.0[..]
    }

    /// Whether `self` lies strictly beneath `other`.
    pub fn is_strictly_within(&self, other: &LocusPath) -> bool {
        self.0.len() > other.0.len() && self.is_within(other)
    }

    /// Every ancestor from the root down to (excluding) `self`.
    pub fn ancestors(&self) -> impl Iterator<Item = LocusPath> + '_ {
        (1..self.0.len()).map(move |len| Self(self.0[..len].to_vec()))
    }
}

impl Default for LocusPath {
    fn default() -> Self {
        Self::root()
    }
}

impl FromStr for LocusPath {
    type Err = LocusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(LocusError::Empty);
        }

        let segments = trimmed
            .split('.')
            .map(|seg| {
                seg.parse::<u32>().map_err(|_| LocusError::BadSegment {
                    path: s.to_string(),
                    segment: seg.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if segments[0] != 0 {
            return Err(LocusError::NotRooted {
                path: s.to_string(),
            });
        }

        Ok(Self(segments))
    }
}

impl TryFrom<String> for LocusPath {
    type Error = LocusError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LocusPath> for String {
    fn from(path: LocusPath) -> Self {
        path.to_string()
    }
}

impl fmt::Display for LocusPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", seg)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> LocusPath {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(p("0").to_string(), "0");
        assert_eq!(p("0.1.2").to_string(), "0.1.2");
        assert_eq!(p(" 0.3 ").to_string(), "0.3");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!("".parse::<LocusPath>().unwrap_err(), LocusError::Empty);
        assert!(matches!(
            "0.a".parse::<LocusPath>().unwrap_err(),
            LocusError::BadSegment { .. }
        ));
        assert!(matches!(
            "0..1".parse::<LocusPath>().unwrap_err(),
            LocusError::BadSegment { .. }
        ));
        assert!(matches!(
            "0.-1".parse::<LocusPath>().unwrap_err(),
            LocusError::BadSegment { .. }
        ));
        assert!(matches!(
            "1.2".parse::<LocusPath>().unwrap_err(),
            LocusError::NotRooted { .. }
        ));
    }

    #[test]
    fn test_parent_child() {
        assert_eq!(p("0.1.2").parent(), Some(p("0.1")));
        assert_eq!(LocusPath::root().parent(), None);
        assert_eq!(p("0.1").child(4), p("0.1.4"));
        assert_eq!(p("0.1.4").suffix(), 4);
        assert_eq!(p("0.1.4").depth(), 2);
    }

    #[test]
    fn test_within() {
        assert!(p("0.1.2").is_within(&p("0.1")));
        assert!(p("0.1").is_within(&p("0.1")));
        assert!(!p("0.1").is_strictly_within(&p("0.1")));
        assert!(!p("0.2").is_within(&p("0.1")));
        assert!(!p("0.12").is_within(&p("0.1")));
        assert!(p("0.7").is_within(&LocusPath::root()));
    }

    #[test]
    fn test_ancestors() {
        let ancestors: Vec<String> = p("0.1.2").ancestors().map(|a| a.to_string()).collect();
        assert_eq!(ancestors, vec!["0", "0.1"]);
        assert_eq!(LocusPath::root().ancestors().count(), 0);
    }

    #[test]
    fn test_numeric_ordering() {
        assert!(p("0.2") < p("0.10"));
        assert!(p("0.1") < p("0.1.1"));
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&p("0.1.2")).unwrap();
        assert_eq!(json, "\"0.1.2\"");
        let back: LocusPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p("0.1.2"));
        assert!(serde_json::from_str::<LocusPath>("\"x\"").is_err());
    }
}
