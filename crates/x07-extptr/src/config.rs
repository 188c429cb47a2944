use anyhow::Context;
use serde::{Deserialize, Serialize};

pub const ENV_ENTRIES_PER_SEGMENT: &str = "X07_EXTPTR_ENTRIES_PER_SEGMENT";
pub const ENV_MAX_ENTRIES: &str = "X07_EXTPTR_MAX_ENTRIES";

pub const DEFAULT_ENTRIES_PER_SEGMENT: u32 = 1 << 12;
pub const DEFAULT_MAX_ENTRIES: u32 = 1 << 24;

/// Geometry of an external pointer table.
///
/// The table grows one segment at a time and never moves a segment once it
/// is allocated, so `max_entries` bounds the segment directory up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TableConfig {
    pub entries_per_segment: u32,
    pub max_entries: u32,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            entries_per_segment: DEFAULT_ENTRIES_PER_SEGMENT,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl TableConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let seg = self.entries_per_segment;
        if seg < 2 || !seg.is_power_of_two() {
            anyhow::bail!("entries_per_segment must be a power of two >= 2 (got {seg})");
        }
        if self.max_entries < seg {
            anyhow::bail!(
                "max_entries must hold at least one segment (got {} < {seg})",
                self.max_entries
            );
        }
        if self.max_entries % seg != 0 {
            anyhow::bail!(
                "max_entries must be a multiple of entries_per_segment (got {} % {seg} != 0)",
                self.max_entries
            );
        }
        Ok(())
    }

    pub fn segment_shift(&self) -> u32 {
        self.entries_per_segment.trailing_zeros()
    }

    pub fn max_segments(&self) -> usize {
        (self.max_entries / self.entries_per_segment) as usize
    }

    pub fn from_json(bytes: &[u8]) -> anyhow::Result<Self> {
        let cfg: TableConfig =
            serde_json::from_slice(bytes).context("parse external pointer table config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults overridden by `X07_EXTPTR_*` variables. Fails closed on
    /// values that do not parse.
    pub fn from_env() -> anyhow::Result<Self> {
        let cfg = Self::from_env_values(
            std::env::var(ENV_ENTRIES_PER_SEGMENT).ok().as_deref(),
            std::env::var(ENV_MAX_ENTRIES).ok().as_deref(),
        )?;
        tracing::debug!(
            entries_per_segment = cfg.entries_per_segment,
            max_entries = cfg.max_entries,
            "external pointer table config"
        );
        Ok(cfg)
    }

    fn from_env_values(
        entries_per_segment: Option<&str>,
        max_entries: Option<&str>,
    ) -> anyhow::Result<Self> {
        let mut cfg = Self::default();
        if let Some(raw) = entries_per_segment {
            cfg.entries_per_segment = parse_u32_env(ENV_ENTRIES_PER_SEGMENT, raw)?;
        }
        if let Some(raw) = max_entries {
            cfg.max_entries = parse_u32_env(ENV_MAX_ENTRIES, raw)?;
        }
        cfg.validate()
            .with_context(|| format!("invalid {ENV_ENTRIES_PER_SEGMENT}/{ENV_MAX_ENTRIES}"))?;
        Ok(cfg)
    }
}

fn parse_u32_env(name: &str, raw: &str) -> anyhow::Result<u32> {
    raw.trim()
        .parse::<u32>()
        .with_context(|| format!("invalid environment variable {name}={raw:?}"))
}
