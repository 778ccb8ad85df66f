//! Tunable knob schema
//!
//! The schema is a fixed, immutable table shared by every `Config`
//! instance. Values live in each `TunableParameters` separately, so the local
//! and remote-mirror configurations never alias each other's knobs.

use crate::error::{PipeTuneError, Result};
use serde::{Deserialize, Serialize};

/// Prefix marking a configuration key as an integer-valued knob
pub const KNOB_PREFIX: char = 'k';

/// Knob names in schema order (also the write-back order)
pub const KNOB_SCHEMA: [&str; 8] = [
    "kAppCoreNum",
    "kDispQueueNum",
    "kAppTxMsgBatchSize",
    "kAppRxMsgBatchSize",
    "kDispTxBatchSize",
    "kDispRxBatchSize",
    "kNICTxPostSize",
    "kNICRxPostSize",
];

/// Index of a knob in `KNOB_SCHEMA`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Knob {
    /// Total application cores across all workloads
    AppCoreNum = 0,
    /// Total dispatcher queues across all workloads
    DispQueueNum = 1,
    /// Application TX message batch
    AppTxMsgBatchSize = 2,
    /// Application RX message batch
    AppRxMsgBatchSize = 3,
    /// Dispatcher TX batch
    DispTxBatchSize = 4,
    /// Dispatcher RX batch
    DispRxBatchSize = 5,
    /// NIC TX post size
    NicTxPostSize = 6,
    /// NIC RX post size
    NicRxPostSize = 7,
}

impl Knob {
    /// All knobs in schema order
    pub const ALL: [Knob; 8] = [
        Knob::AppCoreNum,
        Knob::DispQueueNum,
        Knob::AppTxMsgBatchSize,
        Knob::AppRxMsgBatchSize,
        Knob::DispTxBatchSize,
        Knob::DispRxBatchSize,
        Knob::NicTxPostSize,
        Knob::NicRxPostSize,
    ];

    /// Name as it appears in the configuration file
    pub fn name(self) -> &'static str {
        KNOB_SCHEMA[self as usize]
    }

    /// Look up a knob by its configuration file name
    pub fn from_name(name: &str) -> Option<Self> {
        KNOB_SCHEMA
            .iter()
            .position(|k| *k == name)
            .map(|idx| Self::ALL[idx])
    }
}

/// Values for every knob in the schema
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunableParameters {
    values: [u64; 8],
}

impl TunableParameters {
    /// Get the value of a knob
    pub fn get(&self, knob: Knob) -> u64 {
        self.values[knob as usize]
    }

    /// Set the value of a knob
    pub fn set(&mut self, knob: Knob, value: u64) {
        self.values[knob as usize] = value;
    }

    /// Parse and store a knob given its file name and raw value
    pub fn set_by_name(&mut self, name: &str, raw: &str) -> Result<()> {
        let knob = Knob::from_name(name)
            .ok_or_else(|| PipeTuneError::config(format!("unknown tunable parameter '{}'", name)))?;
        let value = raw.parse::<u64>().map_err(|_| {
            PipeTuneError::config(format!(
                "tunable parameter '{}' must be a non-negative integer, got '{}'",
                name, raw
            ))
        })?;
        self.set(knob, value);
        Ok(())
    }

    /// Iterate `(name, value)` pairs in schema order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        Knob::ALL.iter().map(move |k| (k.name(), self.get(*k)))
    }

    /// Application core count knob
    pub fn app_core_num(&self) -> u64 {
        self.get(Knob::AppCoreNum)
    }

    /// Dispatcher queue count knob
    pub fn disp_queue_num(&self) -> u64 {
        self.get(Knob::DispQueueNum)
    }
}
