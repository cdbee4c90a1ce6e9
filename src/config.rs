use std::ops::Range;

use clap::Parser;

use crate::comm::Key;
use crate::error::{Result, SortError};

/// Parallel bucket sort of N random integers over P workers.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "bucket-sort", version)]
pub struct Config {
    /// Total number of elements to sort, must be a multiple of the worker count
    #[arg(short = 'n', long, default_value_t = 120)]
    pub count: u64,

    /// Number of workers (ignored when running under MPI, where the world size is used)
    #[arg(short = 'p', long, default_value_t = 4)]
    pub workers: usize,

    /// Seed of the random input
    #[arg(short, long, default_value_t = 0)]
    pub seed: u64,

    /// Smallest value generated (inclusive)
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub min: Key,

    /// Largest value generated (exclusive)
    #[arg(long, default_value_t = 500, allow_negative_numbers = true)]
    pub max: Key,

    /// Rank that collects and prints the sorted sequence
    #[arg(long, default_value_t = 0)]
    pub collector: usize,

    /// Do not collect and print the sorted sequence
    #[arg(long)]
    pub no_print: bool,

    /// Check ordering and element count of the result across all workers
    #[arg(long)]
    pub verify: bool,

    /// Log level (trace, debug, info, warn, error), overridden by RUST_LOG
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            count: 120,
            workers: 4,
            seed: 0,
            min: 0,
            max: 500,
            collector: 0,
            no_print: false,
            verify: false,
            log_level: "warn".to_string(),
        }
    }
}

impl Config {
    pub fn new(count: u64, workers: usize, seed: u64) -> Self {
        Config {
            count,
            workers,
            seed,
            ..Config::default()
        }
    }

    /// Check that a group of `group_size` workers can run this configuration.
    pub fn validate(&self, group_size: usize) -> Result<()> {
        check_preconditions(self.count, group_size)?;
        if self.min >= self.max {
            return Err(SortError::Configuration(format!(
                "value range [{}, {}) is empty",
                self.min, self.max
            )));
        }
        if self.collector >= group_size {
            return Err(SortError::Configuration(format!(
                "collector rank {} is outside a group of {}",
                self.collector, group_size
            )));
        }
        Ok(())
    }

    /// Elements generated per worker.
    pub fn shard_len(&self, group_size: usize) -> usize {
        (self.count / group_size as u64) as usize
    }

    pub fn value_range(&self) -> Range<Key> {
        self.min..self.max
    }
}

/// The group must not be empty and must divide the element count evenly.
pub fn check_preconditions(count: u64, group_size: usize) -> Result<()> {
    if group_size == 0 {
        return Err(SortError::Configuration(
            "worker count must be positive".to_string(),
        ));
    }
    if count % group_size as u64 != 0 {
        return Err(SortError::Configuration(format!(
            "{} workers cannot split {} elements evenly",
            group_size, count
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_parser() {
        let parsed = Config::parse_from(["bucket-sort"]);
        assert_eq!(Config::default(), parsed);
    }

    #[test]
    fn test_parse_arguments() {
        let config = Config::parse_from([
            "bucket-sort",
            "-n",
            "12",
            "-p",
            "3",
            "--seed",
            "9",
            "--min",
            "-50",
            "--max",
            "50",
            "--verify",
        ]);
        assert_eq!(12, config.count);
        assert_eq!(3, config.workers);
        assert_eq!(9, config.seed);
        assert_eq!(-50..50, config.value_range());
        assert!(config.verify);
        assert_eq!(4, config.shard_len(3));
    }

    #[test]
    fn test_group_must_divide_count() {
        assert!(Config::new(12, 3, 0).validate(3).is_ok());
        assert!(matches!(
            Config::new(10, 3, 0).validate(3),
            Err(SortError::Configuration(_))
        ));
        assert!(matches!(
            Config::new(10, 0, 0).validate(0),
            Err(SortError::Configuration(_))
        ));
    }

    #[test]
    fn test_empty_value_range_is_rejected() {
        let config = Config {
            min: 5,
            max: 5,
            ..Config::new(4, 2, 0)
        };
        assert!(config.validate(2).is_err());
    }

    #[test]
    fn test_collector_must_be_a_member() {
        let config = Config {
            collector: 2,
            ..Config::new(4, 2, 0)
        };
        assert!(config.validate(2).is_err());
    }
}
