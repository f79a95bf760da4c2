//! Generator failover: automatic fallback when the primary provider fails.
//!
//! Lightweight chain: try primary → fallback₁ → fallback₂, skipping
//! providers that keep failing until their cool-down expires.

use async_trait::async_trait;
use helpdesk_core::error::{HelpdeskError, Result};
use helpdesk_core::traits::generator::{GenerateParams, Generator};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

const MAX_FAILURES: u32 = 3;
const COOLDOWN_SECS: u64 = 60;

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Per-provider health tracking.
struct GeneratorSlot {
    generator: Box<dyn Generator>,
    /// Consecutive failure count.
    failures: AtomicU32,
    /// Timestamp of last failure (unix secs, 0 = never failed).
    last_failure: AtomicU64,
}

impl GeneratorSlot {
    fn new(generator: Box<dyn Generator>) -> Self {
        Self {
            generator,
            failures: AtomicU32::new(0),
            last_failure: AtomicU64::new(0),
        }
    }

    /// Below the failure threshold, or cool-down expired.
    fn is_healthy_at(&self, now: u64) -> bool {
        if self.failures.load(Ordering::Relaxed) < MAX_FAILURES {
            return true;
        }
        let last = self.last_failure.load(Ordering::Relaxed);
        now.saturating_sub(last) > COOLDOWN_SECS
    }

    fn is_healthy(&self) -> bool {
        self.is_healthy_at(now_secs())
    }

    fn record_success(&self) {
        self.failures.store(0, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.last_failure.store(now_secs(), Ordering::Relaxed);
    }
}

/// Tries generators in order, skipping unhealthy ones.
pub struct FailoverGenerator {
    slots: Vec<GeneratorSlot>,
}

impl FailoverGenerator {
    /// First generator is primary, rest are fallbacks.
    pub fn new(generators: Vec<Box<dyn Generator>>) -> Result<Self> {
        if generators.is_empty() {
            return Err(HelpdeskError::Config(
                "failover chain needs at least one generator".into(),
            ));
        }
        Ok(Self {
            slots: generators.into_iter().map(GeneratorSlot::new).collect(),
        })
    }

    /// Number of generators in the chain.
    pub fn chain_len(&self) -> usize {
        self.slots.len()
    }

    /// (name, healthy, consecutive failures) per slot.
    pub fn health_status(&self) -> Vec<(&str, bool, u32)> {
        self.slots
            .iter()
            .map(|s| {
                (
                    s.generator.name(),
                    s.is_healthy(),
                    s.failures.load(Ordering::Relaxed),
                )
            })
            .collect()
    }
}

#[async_trait]
impl Generator for FailoverGenerator {
    fn name(&self) -> &str {
        self.slots
            .first()
            .map(|s| s.generator.name())
            .unwrap_or("failover")
    }

    async fn generate(&self, prompt: &str, params: &GenerateParams) -> Result<String> {
        let mut last_error = None;

        for (idx, slot) in self.slots.iter().enumerate() {
            if !slot.is_healthy() {
                tracing::debug!(
                    "⏭️ Skipping unhealthy generator: {} ({} failures)",
                    slot.generator.name(),
                    slot.failures.load(Ordering::Relaxed)
                );
                continue;
            }

            match slot.generator.generate(prompt, params).await {
                Ok(text) => {
                    if idx > 0 {
                        tracing::info!(
                            "🔄 Failover: {} → {} (success)",
                            self.name(),
                            slot.generator.name()
                        );
                    }
                    slot.record_success();
                    return Ok(text);
                }
                Err(e) => {
                    slot.record_failure();
                    tracing::warn!(
                        "⚠️ Generator {} failed (attempt {}): {}",
                        slot.generator.name(),
                        slot.failures.load(Ordering::Relaxed),
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| HelpdeskError::Generation("all generators unhealthy".into())))
    }

    async fn health_check(&self) -> Result<bool> {
        for slot in &self.slots {
            if !slot.is_healthy() {
                continue;
            }
            if let Ok(true) = slot.generator.health_check().await {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
