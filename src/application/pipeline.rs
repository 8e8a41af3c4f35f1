//! Chunked Translation Pipeline
//!
//! Splits large input into adaptively sized work units, consults the
//! continuity policy before each unit, drives the automation surface, awaits
//! the completion detector's verdict, folds outcomes back into the policy,
//! and emits results incrementally. Strictly sequential: units are processed
//! in index order with no concurrent in-flight turns, because contextual
//! hints and streak counters depend on ordering.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::application::arbiter::OwnershipArbiter;
use crate::application::cancel::CancelFlag;
use crate::application::detector::CompletionDetector;
use crate::application::policy::ContinuityPolicy;
use crate::domain::errors::DomainError;
use crate::domain::models::{LeaseHolder, TurnOutcome, WorkUnit};
use crate::domain::ports::AutomationSurface;

/// A failed run, carrying everything completed before the failure so the
/// caller can persist it and resume later.
#[derive(Debug, Error)]
#[error("translation failed at unit {failed_index}: {error}")]
pub struct PipelineFailure {
    pub failed_index: usize,
    pub error: DomainError,
    pub completed: Vec<String>,
}

/// Incremental progress events emitted over the run.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    UnitStarted {
        index: usize,
        source_chars: usize,
    },
    SessionReset {
        index: usize,
    },
    UnitCompleted {
        index: usize,
        source_chars: usize,
        output_chars: usize,
        elapsed_ms: u64,
    },
    UnitFailed {
        index: usize,
        error: String,
    },
    Finished {
        units: usize,
    },
}

/// The top-level translation orchestrator.
pub struct TranslationPipeline {
    surface: Arc<dyn AutomationSurface>,
    arbiter: Arc<OwnershipArbiter>,
    detector: CompletionDetector,
    policy: ContinuityPolicy,
    headless: bool,
    cancel: CancelFlag,
    events: Option<mpsc::Sender<PipelineEvent>>,
}

impl TranslationPipeline {
    pub fn new(
        surface: Arc<dyn AutomationSurface>,
        arbiter: Arc<OwnershipArbiter>,
        detector: CompletionDetector,
        policy: ContinuityPolicy,
    ) -> Self {
        Self {
            surface,
            arbiter,
            detector,
            policy,
            headless: true,
            cancel: CancelFlag::new(),
            events: None,
        }
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_events(mut self, events: mpsc::Sender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Flag the caller can use to cancel a run in flight.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Read access to the continuity policy's statistics.
    pub fn policy(&self) -> &ContinuityPolicy {
        &self.policy
    }

    /// Translate `text`, resuming past any units already covered by
    /// `resume_from`.
    ///
    /// Unit boundaries are re-derived by walking the input with the policy's
    /// chunk-size decisions, so a resumed run matches an uninterrupted one
    /// whenever the chunk-size history is identical. Completed units are
    /// never reprocessed; their stored output still feeds the context-tail
    /// window.
    #[instrument(skip_all, fields(chars = text.chars().count(), resumed = resume_from.len()))]
    pub async fn translate(
        &mut self,
        text: &str,
        resume_from: Vec<String>,
    ) -> Result<Vec<String>, PipelineFailure> {
        let mut results = resume_from;
        let resumed_units = results.len();

        if self.cancel.is_cancelled() {
            return Err(fail(results, resumed_units, DomainError::Cancelled));
        }

        match self
            .arbiter
            .acquire(LeaseHolder::BatchTranslator, self.headless, false)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                let error = DomainError::OwnershipDenied {
                    requester: LeaseHolder::BatchTranslator,
                };
                return Err(fail(results, resumed_units, error));
            }
            Err(error) => return Err(fail(results, resumed_units, error)),
        }

        let mut remaining = text;
        let mut index = 0usize;

        while !remaining.is_empty() {
            let size = self.policy.optimal_chunk_size();
            let (unit_text, rest) = carve_unit(remaining, size);
            remaining = rest;

            if unit_text.trim().is_empty() {
                debug!("skipping whitespace-only segment");
                continue;
            }

            if index < results.len() {
                // Already completed in a previous run: skip, but keep its
                // output flowing into the context window.
                debug!(index, "skipping unit completed before resume");
                let prior = results[index].clone();
                self.policy.push_context_tail(&prior);
                index += 1;
                continue;
            }

            let unit = WorkUnit::new(index, unit_text);
            match self.process_unit(&unit, resumed_units).await {
                Ok((translated, elapsed)) => {
                    self.policy.push_context_tail(&translated);
                    self.emit(PipelineEvent::UnitCompleted {
                        index,
                        source_chars: unit.char_count(),
                        output_chars: translated.chars().count(),
                        elapsed_ms: elapsed.as_millis() as u64,
                    })
                    .await;
                    results.push(translated);
                }
                Err(error) => {
                    self.emit(PipelineEvent::UnitFailed {
                        index,
                        error: error.to_string(),
                    })
                    .await;
                    return Err(fail(results, index, error));
                }
            }
            index += 1;
        }

        info!(units = results.len(), "translation run finished");
        self.emit(PipelineEvent::Finished {
            units: results.len(),
        })
        .await;
        Ok(results)
    }

    /// Drive one work unit through a full conversational turn.
    async fn process_unit(
        &mut self,
        unit: &WorkUnit,
        resumed_units: usize,
    ) -> Result<(String, std::time::Duration), DomainError> {
        if self.cancel.is_cancelled() {
            return Err(DomainError::Cancelled);
        }

        self.emit(PipelineEvent::UnitStarted {
            index: unit.index,
            source_chars: unit.char_count(),
        })
        .await;

        let surface = Arc::clone(&self.surface);

        // A resumed run starts with no live conversation; bootstrap one even
        // though the policy sees a healthy (empty) history.
        let needs_bootstrap = unit.index == resumed_units
            && resumed_units > 0
            && self.policy.active_conversation().is_none();

        if self.policy.should_reset_before_unit(unit.index) || needs_bootstrap {
            if let Err(err) = surface.reset_conversation().await {
                self.policy.record_error();
                return Err(err);
            }
            let conversation = self.policy.begin_conversation();
            debug!(index = unit.index, %conversation, "conversation reset");
            self.emit(PipelineEvent::SessionReset { index: unit.index })
                .await;
        }

        let prompt = self.policy.build_prompt(&unit.source_text);

        if let Err(err) = surface.write_input(&prompt).await {
            self.policy.record_error();
            return Err(as_upload_failure(err));
        }

        match surface.click_send().await {
            Ok(true) => {}
            Ok(false) => {
                self.policy.record_error();
                return Err(DomainError::SendFailed(
                    "send control rejected the click".to_string(),
                ));
            }
            Err(err) => {
                self.policy.record_error();
                return Err(as_send_failure(err));
            }
        }

        let cancel = self.cancel.clone();
        match self.detector.await_turn(surface.as_ref(), &cancel).await {
            TurnOutcome::Success { text, elapsed } => {
                let cleaned = clean_translation(&text);
                if cleaned.is_empty() {
                    self.policy.record_error();
                    return Err(DomainError::Generation("empty response".to_string()));
                }
                self.policy.record_success(elapsed);
                Ok((cleaned, elapsed))
            }
            TurnOutcome::GenerationError { message } => {
                self.policy.record_error();
                Err(DomainError::Generation(message))
            }
            TurnOutcome::Timeout => {
                self.policy.record_error();
                Err(DomainError::TurnTimeout {
                    elapsed_secs: self.detector.response_deadline().as_secs(),
                })
            }
            // Cancellation is not evidence about session health; it
            // short-circuits without touching the streaks.
            TurnOutcome::Cancelled => Err(DomainError::Cancelled),
        }
    }

    async fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }
}

fn fail(completed: Vec<String>, failed_index: usize, error: DomainError) -> PipelineFailure {
    warn!(failed_index, error = %error, completed = completed.len(), "translation run failed");
    PipelineFailure {
        failed_index,
        error,
        completed,
    }
}

fn as_upload_failure(err: DomainError) -> DomainError {
    match err {
        already @ DomainError::UploadFailed(_) => already,
        other => DomainError::UploadFailed(other.to_string()),
    }
}

fn as_send_failure(err: DomainError) -> DomainError {
    match err {
        already @ DomainError::SendFailed(_) => already,
        other => DomainError::SendFailed(other.to_string()),
    }
}

/// Carve the next work unit off `text`, at most `max_chars` characters,
/// preferring a paragraph break, then a sentence end, then a line break,
/// falling back to a hard cut. Returns the unit and the rest.
pub fn carve_unit(text: &str, max_chars: usize) -> (String, &str) {
    let max_chars = max_chars.max(1);
    let mut char_count = 0usize;
    let mut limit_byte = text.len();
    for (byte_idx, _) in text.char_indices() {
        if char_count == max_chars {
            limit_byte = byte_idx;
            break;
        }
        char_count += 1;
    }
    if limit_byte == text.len() && char_count <= max_chars {
        return (text.to_string(), "");
    }

    let window = &text[..limit_byte];
    let cut = find_paragraph_cut(window)
        .or_else(|| find_sentence_cut(window))
        .or_else(|| find_line_cut(window))
        .unwrap_or(limit_byte);

    let (unit, rest) = text.split_at(cut);
    (unit.to_string(), rest)
}

/// Byte position just after the last paragraph break in `window`.
fn find_paragraph_cut(window: &str) -> Option<usize> {
    window.rfind("\n\n").map(|pos| pos + 2).filter(|&p| p > 2)
}

/// Byte position just after the last sentence terminator in `window`.
fn find_sentence_cut(window: &str) -> Option<usize> {
    const TERMINATORS: &[char] = &['.', '!', '?', '。', '！', '？'];
    let mut best: Option<usize> = None;
    let mut chars = window.char_indices().peekable();
    while let Some((idx, ch)) = chars.next() {
        if TERMINATORS.contains(&ch) {
            let end = idx + ch.len_utf8();
            // Latin terminators need trailing whitespace so decimals and
            // abbreviations stay whole; CJK terminators stand alone.
            let standalone = matches!(ch, '。' | '！' | '？');
            let followed_by_space =
                matches!(chars.peek(), Some((_, next)) if next.is_whitespace());
            if (standalone || followed_by_space) && end > 1 {
                best = Some(end);
            }
        }
    }
    best
}

/// Byte position just after the last line break in `window`.
fn find_line_cut(window: &str) -> Option<usize> {
    window.rfind('\n').map(|pos| pos + 1).filter(|&p| p > 1)
}

/// Normalize a raw response into the final translated text: strip code
/// fences, a leading "Translation:" label, and surrounding whitespace.
pub fn clean_translation(raw: &str) -> String {
    let mut text = raw.trim();

    if text.starts_with("```") {
        if let Some((_, body)) = text.split_once('\n') {
            text = body;
        }
        text = text.trim_end();
        if let Some(stripped) = text.strip_suffix("```") {
            text = stripped;
        }
        text = text.trim();
    }

    let text = match text.split_once('\n') {
        Some((first, rest)) if first.trim().to_lowercase() == "translation:" => rest,
        _ => text,
    };
    let text = text
        .trim()
        .strip_prefix("Translation:")
        .map_or_else(|| text.trim(), str::trim_start);

    text.replace("\r\n", "\n").trim().to_string()
}
