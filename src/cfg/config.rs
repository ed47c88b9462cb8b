// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::cfg::enums::{Side, VersionFloor};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Session identity: which side of the conversation, which protocol
    /// versions are acceptable.
    #[serde(default)]
    pub session: SessionConfig,
    /// Wall-clock budgets applied to message I/O.
    #[serde(default)]
    pub timeouts: Timeouts,
    /// Framing and write-callback buffer sizes.
    #[serde(default)]
    pub buffers: Buffers,
    /// Multi-session poller knobs.
    #[serde(default)]
    pub poll: PollConfig,
}

/// Session identity settings.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SessionConfig {
    #[serde(rename = "Side")]
    /// Whether new sessions act as NETCONF client or server.
    pub side: Side,

    #[serde(default, rename = "VersionFloor")]
    /// Lowest protocol version the hello exchange may settle on.
    pub version_floor: VersionFloor,
}

/// Timeout knobs, expressed in seconds (microseconds for the step).
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Timeouts {
    #[serde(rename = "ReadTimeout", with = "serde_secs")]
    /// Per-message read budget. One budget spans every partial read that
    /// assembles a single message.
    pub read_timeout: Duration,

    #[serde(rename = "TimeoutStep", with = "serde_micros")]
    /// Sleep between two empty reads while waiting out the budget.
    pub timeout_step: Duration,

    #[serde(rename = "HelloTimeout", with = "serde_secs")]
    /// Read budget for the hello message that opens a session.
    pub hello_timeout: Duration,

    #[serde(rename = "IdleTimeout", with = "serde_secs")]
    /// Server-side idle cutoff; zero disables it.
    pub idle_timeout: Duration,
}

/// Buffer sizing. The write buffer must hold at least two framing buffers
/// so one flush never splits an escape expansion.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Buffers {
    #[serde(rename = "FramingBuffer")]
    /// Initial capacity of the inbound frame accumulator.
    pub framing_buffer: usize,

    #[serde(rename = "WriteBuffer")]
    /// Capacity of the outbound write-callback buffer.
    pub write_buffer: usize,
}

/// Poll-set knobs.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PollConfig {
    #[serde(rename = "QueueDepth")]
    /// Bounded fair-queue capacity: how many workers may hold or await the
    /// poll turn at once.
    pub queue_depth: usize,

    #[serde(rename = "LockTimeout", with = "serde_millis")]
    /// Per-attempt budget when the poller tries a session's transport lock.
    pub lock_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            side: Side::Client,
            version_floor: VersionFloor::V1_0,
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(30),
            timeout_step: Duration::from_micros(100),
            hello_timeout: Duration::from_secs(600),
            idle_timeout: Duration::ZERO,
        }
    }
}

impl Default for Buffers {
    fn default() -> Self {
        Self {
            framing_buffer: 512,
            write_buffer: 1024,
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            queue_depth: 6,
            lock_timeout: Duration::from_millis(10),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            timeouts: Timeouts::default(),
            buffers: Buffers::default(),
            poll: PollConfig::default(),
        }
    }
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: Config =
            serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants and normalizes derived fields.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(
            self.timeouts.read_timeout >= Duration::from_millis(1),
            "ReadTimeout must be at least 1ms"
        );
        ensure!(
            !self.timeouts.timeout_step.is_zero(),
            "TimeoutStep must not be zero"
        );
        ensure!(
            self.timeouts.timeout_step < self.timeouts.read_timeout,
            "TimeoutStep must be shorter than ReadTimeout"
        );
        ensure!(
            self.timeouts.hello_timeout >= Duration::from_secs(1),
            "HelloTimeout must be at least 1s"
        );

        ensure!(
            self.buffers.framing_buffer >= 16,
            "FramingBuffer must be at least 16 bytes"
        );
        // The write buffer is sized relative to the framing buffer.
        if self.buffers.write_buffer < self.buffers.framing_buffer * 2 {
            self.buffers.write_buffer = self.buffers.framing_buffer * 2;
        }

        ensure!(self.poll.queue_depth >= 1, "QueueDepth must be >= 1");
        ensure!(
            !self.poll.lock_timeout.is_zero(),
            "LockTimeout must not be zero"
        );

        Ok(())
    }
}

/// Serde helpers for representing `Duration` as a number of seconds.
mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Same, for microsecond-grained knobs.
mod serde_micros {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_micros() as u64)
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let micros = u64::deserialize(d)?;
        Ok(Duration::from_micros(micros))
    }
}

/// Same, for millisecond-grained knobs.
mod serde_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}
