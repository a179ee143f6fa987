use std::{ops::RangeInclusive, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{Result, anyhow};

pub fn read_discord_token() -> Result<String> {
    const CANDIDATES: &[&str] = &["DISCORD_TOKEN", "DISCORD_BOT_TOKEN", "BOT_TOKEN"];
    for key in CANDIDATES {
        if let Ok(val) = std::env::var(key)
            && !val.is_empty()
        {
            return Ok(val);
        }
    }
    Err(anyhow!(
        "Set one of DISCORD_TOKEN, DISCORD_BOT_TOKEN, or BOT_TOKEN in environment"
    ))
}

/// Reads `key`, keeping it only when it parses and falls inside `range`.
pub fn tunable<T>(key: &str, range: RangeInclusive<T>, default: T) -> T
where
    T: FromStr + PartialOrd,
{
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<T>().ok())
        .filter(|v| range.contains(v))
        .unwrap_or(default)
}

pub fn tunable_millis(key: &str, max_ms: u64, default_ms: u64) -> Duration {
    Duration::from_millis(tunable(key, 0..=max_ms, default_ms))
}

pub fn path_var(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tunable_falls_back_outside_range() {
        // Unset keys and garbage both resolve to the default.
        assert_eq!(tunable("HOTSPRING_TEST_UNSET_KEY", 1..=10u32, 3), 3);
        unsafe { std::env::set_var("HOTSPRING_TEST_OUT_OF_RANGE", "99") };
        assert_eq!(tunable("HOTSPRING_TEST_OUT_OF_RANGE", 1..=10u32, 3), 3);
        unsafe { std::env::set_var("HOTSPRING_TEST_IN_RANGE", " 7 ") };
        assert_eq!(tunable("HOTSPRING_TEST_IN_RANGE", 1..=10u32, 3), 7);
    }
}
