use std::{
    fmt,
    path::{Path, PathBuf},
};

use serde::Deserialize;

/// Opaque reference to a playable clip: an absolute path, or one relative to the sound root.
///
/// Nothing checks that the file exists until the clip reaches the head of a queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(transparent)]
pub struct ClipRef(String);

impl ClipRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn resolve(&self, sound_root: &Path) -> PathBuf {
        let p = Path::new(&self.0);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            sound_root.join(p)
        }
    }
}

impl fmt::Display for ClipRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<PathBuf> for ClipRef {
    fn from(p: PathBuf) -> Self {
        Self(p.to_string_lossy().into_owned())
    }
}

pub const DEFAULT_WEIGHT: u32 = 100;

fn default_weight() -> u32 {
    DEFAULT_WEIGHT
}

/// One entry of a weighted clip set. Order inside the set is significant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WeightedClip {
    pub source: ClipRef,
    #[serde(default = "default_weight", rename = "freq")]
    pub weight: u32,
}

impl WeightedClip {
    pub fn new(source: impl Into<String>, weight: u32) -> Self {
        Self {
            source: ClipRef::new(source),
            weight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_refs_resolve_under_root() {
        let root = Path::new("/srv/sounds");
        assert_eq!(
            ClipRef::new("bell.wav").resolve(root),
            PathBuf::from("/srv/sounds/bell.wav")
        );
        assert_eq!(
            ClipRef::new("/tmp/abs.mp3").resolve(root),
            PathBuf::from("/tmp/abs.mp3")
        );
    }

    #[test]
    fn weight_defaults_when_absent() {
        let set: Vec<WeightedClip> =
            serde_json::from_str(r#"[{"source":"a.wav"},{"source":"b.wav","freq":20}]"#).unwrap();
        assert_eq!(set[0].weight, DEFAULT_WEIGHT);
        assert_eq!(set[1].weight, 20);
    }
}
