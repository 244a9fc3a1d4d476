//! Colony-template auto-selection (spec.md §4.9 supplement, ported from
//! the original's swarming protocol): picks a [`ColonyTemplate`] from a
//! task's complexity/risk/urgency and feeds its worker-pool defaults.

use crate::workerpool::WorkerPoolConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateName {
    Speed,
    Balanced,
    Quality,
    Recovery,
}

impl TemplateName {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateName::Speed => "speed",
            TemplateName::Balanced => "balanced",
            TemplateName::Quality => "quality",
            TemplateName::Recovery => "recovery",
        }
    }
}

/// A Colony's input features for template selection, each on a 1-5 scale.
#[derive(Debug, Clone, Copy)]
pub struct SwarmingFeatures {
    pub complexity: u8,
    pub risk: u8,
    pub urgency: u8,
}

impl Default for SwarmingFeatures {
    fn default() -> Self {
        SwarmingFeatures { complexity: 3, risk: 3, urgency: 3 }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ColonyTemplate {
    pub name: TemplateName,
    pub min_workers: u32,
    pub max_workers: u32,
    pub guard_bee_enabled: bool,
    pub reviewer_enabled: bool,
    pub sentinel_integration: bool,
    pub retry_limit: u32,
}

impl ColonyTemplate {
    pub const SPEED: ColonyTemplate = ColonyTemplate {
        name: TemplateName::Speed,
        min_workers: 1,
        max_workers: 1,
        guard_bee_enabled: false,
        reviewer_enabled: false,
        sentinel_integration: false,
        retry_limit: 1,
    };
    pub const BALANCED: ColonyTemplate = ColonyTemplate {
        name: TemplateName::Balanced,
        min_workers: 2,
        max_workers: 3,
        guard_bee_enabled: true,
        reviewer_enabled: false,
        sentinel_integration: false,
        retry_limit: 3,
    };
    pub const QUALITY: ColonyTemplate = ColonyTemplate {
        name: TemplateName::Quality,
        min_workers: 3,
        max_workers: 5,
        guard_bee_enabled: true,
        reviewer_enabled: true,
        sentinel_integration: true,
        retry_limit: 5,
    };
    pub const RECOVERY: ColonyTemplate = ColonyTemplate {
        name: TemplateName::Recovery,
        min_workers: 1,
        max_workers: 2,
        guard_bee_enabled: true,
        reviewer_enabled: false,
        sentinel_integration: true,
        retry_limit: 5,
    };

    /// Maps this template's `retry_limit` onto a `WorkerSupervisor`'s
    /// per-worker restart budget, leaving pool sizing to the caller.
    pub fn worker_pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig { max_restarts_per_worker: self.retry_limit, ..WorkerPoolConfig::default() }
    }
}

/// Rule-based Colony-template selector, ported from the original's
/// `SwarmingEngine`.
pub struct SwarmingEngine;

impl SwarmingEngine {
    /// Selection rules: Speed for low complexity/risk and high urgency,
    /// Quality for high complexity or risk, Balanced otherwise. Recovery
    /// is never chosen by this rule set — it's reached only through
    /// [`select_template_for_recovery`].
    pub fn select_template(features: SwarmingFeatures) -> ColonyTemplate {
        let SwarmingFeatures { complexity: c, risk: r, urgency: u } = features;
        if c <= 2 && r <= 2 && u >= 4 {
            ColonyTemplate::SPEED
        } else if c >= 4 || r >= 4 {
            ColonyTemplate::QUALITY
        } else {
            ColonyTemplate::BALANCED
        }
    }

    pub fn select_template_for_recovery() -> ColonyTemplate {
        ColonyTemplate::RECOVERY
    }
}
