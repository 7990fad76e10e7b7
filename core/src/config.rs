//! Configuration options.
//!
//! A [`FlowTableConfig`] governs the cadence and policy of a single [`crate::FlowTable`]: how
//! often the garbage collector sweeps, how long a freshly-inserted entry lives before it is
//! eligible for expiry, and the timeouts the GC stamps onto the underlying tracked connection
//! while it is offloaded (§4.D). Like the rest of this crate's control-plane surface, a
//! configuration can be loaded from a TOML file or constructed with documented defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Loads a [`FlowTableConfig`] from a TOML file at `path`.
///
/// # Panics
///
/// Panics if the file cannot be read or does not parse as a valid configuration. Flow tables are
/// created at control-plane setup time, where a malformed configuration file is an operator
/// error that should fail loudly rather than be silently patched over.
pub fn load_config<P: AsRef<Path>>(path: P) -> FlowTableConfig {
    let config_str = fs::read_to_string(path).expect("ERROR: file read failed");
    toml::from_str(&config_str).expect("invalid flow table config file")
}

/// Runtime-tunable options for a [`crate::FlowTable`].
#[derive(Deserialize, Serialize, Debug, Clone, Copy)]
pub struct FlowTableConfig {
    /// Period between garbage collector sweeps. Defaults to 1 second (§4.D).
    #[serde(with = "duration_millis", default = "default_gc_tick_interval")]
    pub gc_tick_interval: Duration,

    /// Default inactivity window stamped into `entry.timeout_deadline` on `add` (§4.C). The
    /// data-plane hook is expected to refresh this on every forwarded packet; an idle flow is
    /// reaped after this much time without traffic.
    #[serde(with = "duration_millis", default = "default_timeout")]
    pub default_timeout: Duration,

    /// Minimum remaining lifetime on the underlying tracked connection before the GC extends it
    /// (§4.D: "if its remaining lifetime is less than half a day"). Defaults to 12 hours.
    #[serde(with = "duration_millis", default = "default_ct_offload_min_timeout")]
    pub ct_offload_min_timeout: Duration,

    /// The timeout the GC extends the underlying tracked connection to when it is running low
    /// (§4.D: "extend it to one day"). Defaults to 24 hours.
    #[serde(
        with = "duration_millis",
        default = "default_ct_offload_refresh_timeout"
    )]
    pub ct_offload_refresh_timeout: Duration,

    /// Soft cap on the number of entries a table is expected to hold. Construction-time
    /// information only; this crate does not enforce admission control.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Whether the table is created with the HW flag (§4.F, §4.H).
    #[serde(default)]
    pub hw: bool,
}

impl Default for FlowTableConfig {
    fn default() -> Self {
        FlowTableConfig {
            gc_tick_interval: default_gc_tick_interval(),
            default_timeout: default_timeout(),
            ct_offload_min_timeout: default_ct_offload_min_timeout(),
            ct_offload_refresh_timeout: default_ct_offload_refresh_timeout(),
            max_entries: default_max_entries(),
            hw: false,
        }
    }
}

fn default_gc_tick_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_ct_offload_min_timeout() -> Duration {
    Duration::from_secs(12 * 60 * 60)
}

fn default_ct_offload_refresh_timeout() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_max_entries() -> usize {
    100_000
}

/// (De)serializes a [`Duration`] as whole milliseconds, so config files can write `gc_tick_interval
/// = 1000` rather than a nested struct.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}
