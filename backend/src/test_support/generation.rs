//! Shared test doubles for orchestration, settlement, and pipeline tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeDelta, TimeZone, Utc};
use mockable::Clock;
use tokio::sync::{Notify, mpsc};

use crate::domain::ports::{GenerationProvider, ProviderError};
use crate::domain::{BackoffJitter, GeneratedImage, QualityTier, ReferenceImage, RetrySleeper};

pub const GENERATED_BYTES: &[u8] = &[0x89, 0x50, 0x4e, 0x47];

pub fn fixed_now() -> DateTime<Utc> {
    match Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).single() {
        Some(now) => now,
        None => panic!("valid fixture timestamp"),
    }
}

pub fn reference_images(count: usize) -> Vec<ReferenceImage> {
    (0..count)
        .map(|index| ReferenceImage::new(vec![0xff, 0xd8, u8::try_from(index % 256).unwrap_or(0)], None))
        .collect()
}

pub fn generated_image(tier: QualityTier) -> GeneratedImage {
    GeneratedImage {
        bytes: GENERATED_BYTES.to_vec(),
        media_type: "image/png".to_owned(),
        tier,
    }
}

pub struct MutableClock(Mutex<DateTime<Utc>>);

impl MutableClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn advance(&self, delta: Duration) {
        let delta = match TimeDelta::from_std(delta) {
            Ok(delta) => delta,
            Err(error) => {
                panic!("failed to convert Duration to TimeDelta: {error}; delta={delta:?}")
            }
        };
        *self.lock_clock() += delta;
    }

    fn lock_clock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(_) => panic!("clock mutex"),
        }
    }
}

impl Clock for MutableClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.lock_clock()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateSleeper;

#[async_trait]
impl RetrySleeper for ImmediateSleeper {
    async fn sleep(&self, _duration: Duration) {}
}

#[derive(Default)]
pub struct RecordingSleeper(pub Mutex<Vec<Duration>>);

impl RecordingSleeper {
    pub fn recorded(&self) -> Vec<Duration> {
        match self.0.lock() {
            Ok(entries) => entries.clone(),
            Err(_) => panic!("sleeper mutex"),
        }
    }
}

#[async_trait]
impl RetrySleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        let mut entries = match self.0.lock() {
            Ok(entries) => entries,
            Err(_) => panic!("sleeper mutex"),
        };
        entries.push(duration);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl BackoffJitter for NoJitter {
    fn jittered_delay(&self, base: Duration, _attempt: u32) -> Duration {
        base
    }
}

/// Always adds the full 25% allowance.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxJitter;

impl BackoffJitter for MaxJitter {
    fn jittered_delay(&self, base: Duration, _attempt: u32) -> Duration {
        base + base / 4
    }
}

/// One scripted provider reply; `Ok(())` yields [`generated_image`] at the
/// requested tier.
pub type ScriptStep = Result<(), ProviderError>;

struct ProviderGate {
    entered: mpsc::UnboundedSender<usize>,
    release: Arc<Notify>,
}

/// Provider double replaying a script and recording what it was asked.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<ScriptStep>>,
    fallback: ScriptStep,
    latency: Option<Duration>,
    gate: Option<ProviderGate>,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    tiers: Mutex<Vec<QualityTier>>,
    prompts: Mutex<Vec<String>>,
    image_counts: Mutex<Vec<usize>>,
}

impl ScriptedProvider {
    /// Replay `steps`, then succeed.
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self::with_fallback(steps, Ok(()))
    }

    /// Fail every call with `error`.
    pub fn always_failing(error: ProviderError) -> Self {
        Self::with_fallback([], Err(error))
    }

    pub fn with_fallback(steps: impl IntoIterator<Item = ScriptStep>, fallback: ScriptStep) -> Self {
        Self {
            script: Mutex::new(steps.into_iter().collect()),
            fallback,
            latency: None,
            gate: None,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            tiers: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
            image_counts: Mutex::new(Vec::new()),
        }
    }

    /// Sleep inside every call so concurrent callers overlap.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Report each call index on `entered` and wait for `release` before
    /// answering.
    #[must_use]
    pub fn with_gate(mut self, entered: mpsc::UnboundedSender<usize>, release: Arc<Notify>) -> Self {
        self.gate = Some(ProviderGate { entered, release });
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn tiers(&self) -> Vec<QualityTier> {
        match self.tiers.lock() {
            Ok(tiers) => tiers.clone(),
            Err(_) => panic!("tiers mutex"),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        match self.prompts.lock() {
            Ok(prompts) => prompts.clone(),
            Err(_) => panic!("prompts mutex"),
        }
    }

    pub fn image_counts(&self) -> Vec<usize> {
        match self.image_counts.lock() {
            Ok(counts) => counts.clone(),
            Err(_) => panic!("image counts mutex"),
        }
    }

    fn next_step(&self) -> ScriptStep {
        let mut script = match self.script.lock() {
            Ok(script) => script,
            Err(_) => panic!("script mutex"),
        };
        script.pop_front().unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    async fn invoke(
        &self,
        prompt: &str,
        images: &[ReferenceImage],
        tier: QualityTier,
    ) -> Result<GeneratedImage, ProviderError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        match self.tiers.lock() {
            Ok(mut tiers) => tiers.push(tier),
            Err(_) => panic!("tiers mutex"),
        }
        match self.prompts.lock() {
            Ok(mut prompts) => prompts.push(prompt.to_owned()),
            Err(_) => panic!("prompts mutex"),
        }
        match self.image_counts.lock() {
            Ok(mut counts) => counts.push(images.len()),
            Err(_) => panic!("image counts mutex"),
        }

        if let Some(gate) = &self.gate {
            let _ = gate.entered.send(index);
            gate.release.notified().await;
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let step = self.next_step();
        self.active.fetch_sub(1, Ordering::SeqCst);
        step.map(|()| generated_image(tier))
    }
}
