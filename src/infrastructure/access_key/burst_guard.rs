//! Randomized burst guard
//!
//! Once a key has been used `threshold` times inside the sliding window, each
//! further admission is rejected with probability `rejection_probability`. A
//! rejection opens a cooldown of random length during which the same message
//! is replayed without drawing again.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use crate::domain::access_key::{AccessKey, BurstCooldown, Decision, Denial, Evaluation};

fn default_messages() -> Vec<String> {
    [
        "The system is busy. Please try again later.",
        "Too many requests in a short time. Try again after a while.",
        "Something went wrong while creating the panel. Please try again later.",
        "Your request cannot be processed right now. Please wait and try again.",
        "Excessive usage detected. Please use your access key fairly.",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Burst guard tuning
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BurstPolicy {
    pub enabled: bool,
    pub window_secs: u64,
    pub threshold: usize,
    pub rejection_probability: f64,
    pub cooldown_min_secs: u64,
    pub cooldown_max_secs: u64,
    pub messages: Vec<String>,
}

impl Default for BurstPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            window_secs: 600,
            threshold: 3,
            rejection_probability: 0.7,
            cooldown_min_secs: 300,
            cooldown_max_secs: 900,
            messages: default_messages(),
        }
    }
}

impl BurstPolicy {
    /// Default policy with the guard switched on
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    pub fn with_rejection_probability(mut self, probability: f64) -> Self {
        self.rejection_probability = probability;
        self
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }
}

/// Applies a [`BurstPolicy`] to key documents
#[derive(Debug)]
pub struct BurstGuard {
    policy: BurstPolicy,
    rng: Mutex<StdRng>,
}

impl BurstGuard {
    pub fn new(policy: BurstPolicy) -> Self {
        Self {
            policy,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic guard for tests and replays
    pub fn with_seed(policy: BurstPolicy, seed: u64) -> Self {
        Self {
            policy,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn disabled() -> Self {
        Self::new(BurstPolicy::default())
    }

    pub fn policy(&self) -> &BurstPolicy {
        &self.policy
    }

    pub fn is_enabled(&self) -> bool {
        self.policy.enabled
    }

    /// Decide whether `key` is admitted at `now`
    ///
    /// Only the cooldown fields are touched; usage counters are left to the
    /// validator.
    pub fn check(&self, key: &mut AccessKey, now: DateTime<Utc>) -> Evaluation {
        if !self.policy.enabled {
            return Evaluation::allowed(key, false);
        }

        if let Some(cooldown) = key.burst_cooldown().filter(|c| c.is_active(now)) {
            return Evaluation {
                decision: Decision::Denied(Denial::RateLimited {
                    message: cooldown.message.clone(),
                    retry_after_secs: cooldown.remaining_secs(now),
                }),
                changed: false,
            };
        }

        let window = Duration::seconds(self.policy.window_secs as i64);
        let recent = key.recent_usage_count(now, window);

        if recent >= self.policy.threshold {
            if let Some(cooldown) = self.draw_rejection(now) {
                let denial = Denial::RateLimited {
                    message: cooldown.message.clone(),
                    retry_after_secs: cooldown.duration_secs,
                };
                key.start_burst_cooldown(cooldown, now);

                return Evaluation {
                    decision: Decision::Denied(denial),
                    changed: true,
                };
            }
        }

        let changed = key.clear_burst_cooldown(now);
        Evaluation::allowed(key, changed)
    }

    fn draw_rejection(&self, now: DateTime<Utc>) -> Option<BurstCooldown> {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());

        if rng.gen_range(0.0..1.0) >= self.policy.rejection_probability {
            return None;
        }

        let message = if self.policy.messages.is_empty() {
            "Too many requests. Please try again later.".to_string()
        } else {
            let index = rng.gen_range(0..self.policy.messages.len());
            self.policy.messages[index].clone()
        };

        let min = self.policy.cooldown_min_secs;
        let max = self.policy.cooldown_max_secs.max(min + 1);
        let duration_secs = rng.gen_range(min..max).max(1);

        Some(BurstCooldown {
            message,
            started_at: now,
            duration_secs,
        })
    }
}
