//! CLI/env configuration, with `clap`-derive env-var fallbacks for every
//! flag.

use std::time::Duration;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "kube-archivist", about = "Dynamic watch-fanout backup controller")]
pub struct Cli {
    /// Base directory for the content-addressed backup store.
    #[arg(long, env = "BACKUP_ROOT", default_value = "/backups")]
    pub backup_root: String,

    /// Bounded retry count before a worker drops an event.
    #[arg(long, env = "MAX_RETRIES", default_value_t = 3)]
    pub max_retries: u32,

    /// Tombstone retention window before GC reclaims a directory, e.g.
    /// "5m", "30s", "1h".
    #[arg(long, env = "GC_RETAIN", default_value = "5m")]
    pub gc_retain: String,

    /// Worker pool fan-out.
    #[arg(long, default_value_t = 5)]
    pub workers: usize,

    /// Worker queue capacity (backpressure threshold).
    #[arg(long, default_value_t = 100)]
    pub queue_capacity: usize,
}

impl Cli {
    pub fn gc_retain_duration(&self) -> anyhow::Result<Duration> {
        parse_duration(&self.gc_retain)
    }
}

/// A minimal `<number><unit>` duration grammar (`s`, `m`, `h`).
pub fn parse_duration(input: &str) -> anyhow::Result<Duration> {
    let input = input.trim();
    let (digits, unit) = input.split_at(
        input
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| anyhow::anyhow!("duration '{input}' is missing a unit (s/m/h)"))?,
    );
    let amount: u64 = digits
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid duration '{input}'"))?;
    let seconds = match unit {
        "s" => amount,
        "m" => amount * 60,
        "h" => amount * 3600,
        other => anyhow::bail!("unknown duration unit '{other}' in '{input}'"),
    };
    Ok(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minutes() {
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
    }

    #[test]
    fn parses_seconds_and_hours() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
    }

    #[test]
    fn rejects_missing_unit() {
        assert!(parse_duration("5").is_err());
    }

    #[test]
    fn rejects_unknown_unit() {
        assert!(parse_duration("5d").is_err());
    }
}
