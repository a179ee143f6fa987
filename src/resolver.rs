//! Trigger resolution: a trigger key becomes zero or one clip (or a celebratory sequence).
//!
//! Lookup order is fixed: reserved celebratory keys, the guild's dynamic bindings,
//! the static Unicode table, then the static custom-emoji table.

use std::{path::PathBuf, sync::Arc};

use rand::{Rng, SeedableRng, rngs::StdRng};
use serenity::all::GuildId;
use thiserror::Error;

use crate::{
    clip::{ClipRef, WeightedClip},
    config::{CelebrationConfig, ClipConfig},
    database::StoreError,
    trigger::Trigger,
};

/// Source of uniform integers in `1..=sides`.
pub trait Dice: Send {
    fn roll(&mut self, sides: u64) -> u64;
}

pub struct RngDice<R>(pub R);

impl RngDice<StdRng> {
    pub fn from_entropy() -> Self {
        Self(StdRng::from_os_rng())
    }
}

impl<R: Rng + Send> Dice for RngDice<R> {
    fn roll(&mut self, sides: u64) -> u64 {
        self.0.random_range(1..=sides.max(1))
    }
}

/// Per-guild trigger bindings registered at runtime; they override the static tables.
pub trait BindingStore: Send + Sync {
    fn reaction_binding(&self, guild: GuildId, key: &str) -> Result<Option<String>, StoreError>;
    fn upload_path(&self, guild: GuildId, name: &str) -> Result<Option<PathBuf>, StoreError>;
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("trigger `{key}` is bound to upload `{upload}`, which is not registered")]
    UnknownUpload { key: String, upload: String },
    #[error("trigger `{key}` is bound to upload `{upload}`, but {} is gone", path.display())]
    MissingUpload {
        key: String,
        upload: String,
        path: PathBuf,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Single(ClipRef),
    Sequence(Vec<ClipRef>),
}

/// Which table claims a trigger key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Celebration,
    Binding,
    Unicode,
    Custom,
}

pub struct Resolver {
    clips: Arc<ClipConfig>,
    bindings: Arc<dyn BindingStore>,
}

impl Resolver {
    pub fn new(clips: Arc<ClipConfig>, bindings: Arc<dyn BindingStore>) -> Self {
        Self { clips, bindings }
    }

    pub fn celebration(&self) -> &CelebrationConfig {
        &self.clips.celebration
    }

    pub fn resolve(
        &self,
        trigger: &Trigger,
        guild: GuildId,
        dice: &mut dyn Dice,
    ) -> Result<Option<Resolution>, ResolveError> {
        self.resolve_key(&trigger.key(), guild, trigger.is_text(), dice)
    }

    pub fn resolve_key(
        &self,
        key: &str,
        guild: GuildId,
        is_text: bool,
        dice: &mut dyn Dice,
    ) -> Result<Option<Resolution>, ResolveError> {
        if self.is_celebration(key, is_text) {
            return Ok(Some(Resolution::Sequence(celebration_sequence(
                &self.clips.celebration,
                dice,
            ))));
        }

        if let Some(upload) = self.binding(guild, key)? {
            let path = self.bindings.upload_path(guild, &upload)?.ok_or_else(|| {
                ResolveError::UnknownUpload {
                    key: key.to_string(),
                    upload: upload.clone(),
                }
            })?;
            if !path.exists() {
                return Err(ResolveError::MissingUpload {
                    key: key.to_string(),
                    upload,
                    path,
                });
            }
            return Ok(Some(Resolution::Single(ClipRef::from(path))));
        }

        let set = table_lookup(&self.clips.unicode, key, is_text)
            .or_else(|| table_lookup(&self.clips.custom, key, is_text));
        Ok(set
            .and_then(|set| pick_weighted(set, dice))
            .cloned()
            .map(Resolution::Single))
    }

    /// Same precedence as [`Resolver::resolve_key`], without drawing anything.
    pub fn classify(
        &self,
        key: &str,
        guild: GuildId,
        is_text: bool,
    ) -> Result<Option<TriggerSource>, StoreError> {
        if self.is_celebration(key, is_text) {
            return Ok(Some(TriggerSource::Celebration));
        }
        if self.binding(guild, key)?.is_some() {
            return Ok(Some(TriggerSource::Binding));
        }
        if table_lookup(&self.clips.unicode, key, is_text).is_some() {
            return Ok(Some(TriggerSource::Unicode));
        }
        if table_lookup(&self.clips.custom, key, is_text).is_some() {
            return Ok(Some(TriggerSource::Custom));
        }
        Ok(None)
    }

    /// Exact key first, then its lowercase form, which is how `/bind` stores a
    /// guild emoji typed by bare name when the cache did not know it.
    fn binding(&self, guild: GuildId, key: &str) -> Result<Option<String>, StoreError> {
        if let Some(upload) = self.bindings.reaction_binding(guild, key)? {
            return Ok(Some(upload));
        }
        let folded = key.to_lowercase();
        if folded == key {
            return Ok(None);
        }
        self.bindings.reaction_binding(guild, &folded)
    }

    fn is_celebration(&self, key: &str, is_text: bool) -> bool {
        self.clips
            .celebration
            .triggers
            .iter()
            .any(|t| t == key || (is_text && t.to_lowercase() == key))
    }
}

fn table_lookup<'a>(
    table: &'a std::collections::HashMap<String, Vec<WeightedClip>>,
    key: &str,
    is_text: bool,
) -> Option<&'a [WeightedClip]> {
    if let Some(set) = table.get(key) {
        return Some(set);
    }
    if is_text {
        return table
            .iter()
            .find(|(k, _)| k.to_lowercase() == key)
            .map(|(_, set)| set.as_slice());
    }
    None
}

/// Draws `1..=total` and walks the set subtracting weights; the first entry that
/// brings the remainder to zero or below wins. Single-entry sets never roll.
pub fn pick_weighted<'a>(set: &'a [WeightedClip], dice: &mut dyn Dice) -> Option<&'a ClipRef> {
    match set {
        [] => None,
        [only] => Some(&only.source),
        _ => {
            let total: u64 = set.iter().map(|c| u64::from(c.weight)).sum();
            let mut remainder = dice.roll(total);
            for clip in set {
                let weight = u64::from(clip.weight);
                if remainder <= weight {
                    return Some(&clip.source);
                }
                remainder -= weight;
            }
            set.last().map(|c| &c.source)
        }
    }
}

/// A short performance of one to three clips. The draws happen in a fixed order:
/// long variant (20%), special override (5%), then the wrap/trailer roll.
pub fn celebration_sequence(cfg: &CelebrationConfig, dice: &mut dyn Dice) -> Vec<ClipRef> {
    let mut base = cfg.standard.clone();
    if dice.roll(100) <= 20 {
        base = cfg.long.clone();
    }
    if dice.roll(100) <= 5 {
        return vec![cfg.special.clone()];
    }
    match dice.roll(100) {
        r if r <= 10 => vec![cfg.intro.clone(), base, cfg.outro.clone()],
        r if r <= 20 => vec![cfg.alt_intro.clone(), base, cfg.alt_outro.clone()],
        r if r <= 60 => vec![base, cfg.trailing.clone()],
        _ => vec![base, cfg.alt_trailing.clone()],
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        collections::{HashMap, VecDeque},
        sync::Mutex,
    };

    use super::*;
    use crate::trigger::key_from_input;

    /// Replays fixed rolls; panics if more are drawn than scripted.
    pub(crate) struct Scripted(pub VecDeque<u64>);

    impl Scripted {
        pub(crate) fn new(rolls: &[u64]) -> Self {
            Self(rolls.iter().copied().collect())
        }
    }

    impl Dice for Scripted {
        fn roll(&mut self, _sides: u64) -> u64 {
            self.0.pop_front().expect("unscripted roll")
        }
    }

    #[derive(Default)]
    pub(crate) struct MemoryBindings {
        pub bindings: Mutex<HashMap<(GuildId, String), String>>,
        pub uploads: Mutex<HashMap<(GuildId, String), PathBuf>>,
    }

    impl MemoryBindings {
        pub(crate) fn bind(&self, guild: GuildId, key: &str, upload: &str, path: PathBuf) {
            self.bindings
                .lock()
                .unwrap()
                .insert((guild, key.to_string()), upload.to_string());
            self.uploads
                .lock()
                .unwrap()
                .insert((guild, upload.to_string()), path);
        }
    }

    impl BindingStore for MemoryBindings {
        fn reaction_binding(&self, guild: GuildId, key: &str) -> Result<Option<String>, StoreError> {
            Ok(self
                .bindings
                .lock()
                .unwrap()
                .get(&(guild, key.to_string()))
                .cloned())
        }

        fn upload_path(&self, guild: GuildId, name: &str) -> Result<Option<PathBuf>, StoreError> {
            Ok(self
                .uploads
                .lock()
                .unwrap()
                .get(&(guild, name.to_string()))
                .cloned())
        }
    }

    pub(crate) fn sample_clips() -> ClipConfig {
        let mut cfg = ClipConfig::default();
        cfg.unicode
            .insert("beer_mug".into(), vec![WeightedClip::new("deutshche.mp3", 100)]);
        cfg.custom.insert(
            "windowsxp".into(),
            vec![
                WeightedClip::new("xp-shutdown.wav", 2),
                WeightedClip::new("xp-startup.wav", 8),
                WeightedClip::new("xp-critical.wav", 40),
                WeightedClip::new("xp-ding.wav", 30),
                WeightedClip::new("xp-error.wav", 20),
            ],
        );
        cfg.custom
            .insert("Nyanchu".into(), vec![WeightedClip::new("nc141260.mp3", 100)]);
        cfg
    }

    fn resolver_with(bindings: Arc<MemoryBindings>) -> Resolver {
        Resolver::new(Arc::new(sample_clips()), bindings)
    }

    const GUILD: GuildId = GuildId::new(747509186228650015);

    #[test]
    fn single_entry_set_never_rolls() {
        let r = resolver_with(Arc::default());
        // An empty script would panic on any roll.
        let mut dice = Scripted::new(&[]);
        let got = r
            .resolve(&Trigger::Unicode("🍺".into()), GUILD, &mut dice)
            .unwrap();
        assert_eq!(got, Some(Resolution::Single(ClipRef::new("deutshche.mp3"))));
    }

    #[test]
    fn weighted_walk_is_order_sensitive() {
        let set = &sample_clips().custom["windowsxp"];
        let pick = |roll| pick_weighted(set, &mut Scripted::new(&[roll])).unwrap().as_str();
        assert_eq!(pick(1), "xp-shutdown.wav");
        assert_eq!(pick(2), "xp-shutdown.wav");
        assert_eq!(pick(3), "xp-startup.wav");
        assert_eq!(pick(10), "xp-startup.wav");
        assert_eq!(pick(11), "xp-critical.wav");
        assert_eq!(pick(80), "xp-ding.wav");
        assert_eq!(pick(100), "xp-error.wav");
    }

    #[test]
    fn weighted_frequencies_converge() {
        let set = &sample_clips().custom["windowsxp"];
        let mut dice = RngDice(StdRng::seed_from_u64(0x5eed));
        let draws = 50_000;
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for _ in 0..draws {
            *counts
                .entry(pick_weighted(set, &mut dice).unwrap().as_str())
                .or_default() += 1;
        }
        for clip in set {
            let observed = counts.get(clip.source.as_str()).copied().unwrap_or(0) as f64
                / draws as f64;
            let expected = f64::from(clip.weight) / 100.0;
            assert!(
                (observed - expected).abs() < 0.01,
                "{}: observed {observed:.4}, expected {expected:.4}",
                clip.source
            );
        }
    }

    #[test]
    fn dynamic_binding_beats_static_table() {
        let dir = tempfile::tempdir().unwrap();
        let upload = dir.path().join("mine.mp3");
        std::fs::write(&upload, b"id3").unwrap();
        let bindings = Arc::new(MemoryBindings::default());
        bindings.bind(GUILD, "beer_mug", "mine", upload.clone());
        let r = resolver_with(bindings);

        let got = r
            .resolve(&Trigger::Unicode("🍺".into()), GUILD, &mut Scripted::new(&[]))
            .unwrap();
        assert_eq!(got, Some(Resolution::Single(ClipRef::from(upload))));

        // Other guilds still see the static table.
        let other = GuildId::new(1);
        let got = r
            .resolve(&Trigger::Unicode("🍺".into()), other, &mut Scripted::new(&[]))
            .unwrap();
        assert_eq!(got, Some(Resolution::Single(ClipRef::new("deutshche.mp3"))));
    }

    #[test]
    fn totals_past_u32_reach_the_last_entry() {
        let set = vec![
            WeightedClip::new("a.wav", u32::MAX),
            WeightedClip::new("b.wav", u32::MAX),
            WeightedClip::new("c.wav", 1),
        ];
        let max = u64::from(u32::MAX);
        let pick = |roll| pick_weighted(&set, &mut Scripted::new(&[roll])).unwrap().as_str();
        assert_eq!(pick(max), "a.wav");
        assert_eq!(pick(max + 1), "b.wav");
        assert_eq!(pick(2 * max), "b.wav");
        assert_eq!(pick(2 * max + 1), "c.wav");
    }

    #[test]
    fn emoji_bound_by_bare_name_fires_for_the_reaction() {
        let dir = tempfile::tempdir().unwrap();
        let upload = dir.path().join("mine.mp3");
        std::fs::write(&upload, b"id3").unwrap();
        let bindings = Arc::new(MemoryBindings::default());
        // Typed without the marker and unknown to the cache, so stored folded.
        let key = key_from_input("Nyanchu", []);
        bindings.bind(GUILD, &key, "mine", upload.clone());
        let r = resolver_with(bindings);

        let got = r
            .resolve(&Trigger::Custom("Nyanchu".into()), GUILD, &mut Scripted::new(&[]))
            .unwrap();
        assert_eq!(got, Some(Resolution::Single(ClipRef::from(upload))));
        assert_eq!(
            r.classify("Nyanchu", GUILD, false).unwrap(),
            Some(TriggerSource::Binding)
        );
    }

    #[test]
    fn missing_bound_file_is_reported() {
        let bindings = Arc::new(MemoryBindings::default());
        bindings.bind(GUILD, "ok", "gone", PathBuf::from("/nonexistent/gone.wav"));
        let r = resolver_with(bindings);
        let err = r
            .resolve(&Trigger::Text("ok".into()), GUILD, &mut Scripted::new(&[]))
            .unwrap_err();
        assert!(matches!(err, ResolveError::MissingUpload { .. }));
    }

    #[test]
    fn no_match_is_none() {
        let r = resolver_with(Arc::default());
        let got = r
            .resolve(&Trigger::Custom("unknown".into()), GUILD, &mut Scripted::new(&[]))
            .unwrap();
        assert_eq!(got, None);
        assert_eq!(r.classify("unknown", GUILD, false).unwrap(), None);
    }

    #[test]
    fn text_tokens_match_case_insensitively() {
        let r = resolver_with(Arc::default());
        assert_eq!(
            r.classify("nyanchu", GUILD, true).unwrap(),
            Some(TriggerSource::Custom)
        );
        assert_eq!(r.classify("nyanchu", GUILD, false).unwrap(), None);
    }

    #[test]
    fn celebratory_key_yields_short_sequence() {
        let r = resolver_with(Arc::default());
        let mut dice = RngDice(StdRng::seed_from_u64(3));
        for _ in 0..200 {
            let got = r
                .resolve(&Trigger::Unicode("\u{2668}\u{fe0f}".into()), GUILD, &mut dice)
                .unwrap();
            let Some(Resolution::Sequence(clips)) = got else {
                panic!("expected a sequence");
            };
            assert!((1..=3).contains(&clips.len()));
        }
    }

    #[test]
    fn special_override_wins_over_everything() {
        let cfg = CelebrationConfig::default();
        // long-variant roll misses, override roll hits.
        let clips = celebration_sequence(&cfg, &mut Scripted::new(&[50, 3]));
        assert_eq!(clips, vec![cfg.special.clone()]);
    }

    #[test]
    fn celebration_branches_follow_the_third_roll() {
        let cfg = CelebrationConfig::default();
        let run = |rolls: &[u64]| celebration_sequence(&cfg, &mut Scripted::new(rolls));
        assert_eq!(
            run(&[50, 50, 10]),
            vec![cfg.intro.clone(), cfg.standard.clone(), cfg.outro.clone()]
        );
        assert_eq!(
            run(&[20, 50, 15]),
            vec![cfg.alt_intro.clone(), cfg.long.clone(), cfg.alt_outro.clone()]
        );
        assert_eq!(
            run(&[21, 6, 60]),
            vec![cfg.standard.clone(), cfg.trailing.clone()]
        );
        assert_eq!(
            run(&[1, 100, 61]),
            vec![cfg.long.clone(), cfg.alt_trailing.clone()]
        );
    }
}
