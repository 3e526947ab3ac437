//! Adaptive diagnostic placement.
//!
//! An interactive interview that walks the prerequisite graph: correct
//! answers step up in difficulty, incorrect answers step down, and the
//! interview stops once the question budget is spent or the pass/fail
//! boundary has stabilized. Beliefs formed here are session-scoped and
//! provisional; long-term mastery is never written by this module.
//!
//! Concept selection is fully deterministic: a fixed scripted answer
//! sequence from a fixed seed always yields the same placement.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{BktParams, DiagnosticConfig};
use crate::error::EngineError;
use crate::mastery;
use crate::store::{Clock, Curriculum};
use crate::types::{Concept, MasteryBelief};

/// Convergence confidence of the adaptive interview. Deliberately a
/// distinct type from the BKT mastery probability; the two quantities are
/// both in [0, 1] but mean different things.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Confidence(f64);

impl Confidence {
    pub(crate) fn new(value: f64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    pub(crate) fn capped_at(self, cap: f64) -> Self {
        Self(self.0.min(cap))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdministeredQuestion {
    pub concept_code: String,
    pub difficulty: f64,
    pub grade_band: f64,
    pub correct: bool,
}

/// Ephemeral interview state; converted into a [`PlacementResult`] by
/// [`DiagnosticEngine::finish`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticSession {
    pub learner_id: String,
    stated_grade: f64,
    seed_code: String,
    asked: Vec<AdministeredQuestion>,
    beliefs: BTreeMap<String, MasteryBelief>,
    gaps: BTreeSet<String>,
    visited: BTreeSet<String>,
    difficulty_pointer: f64,
    current: Option<String>,
    last_correct: Option<bool>,
    terminated: bool,
}

impl DiagnosticSession {
    pub fn administered(&self) -> &[AdministeredQuestion] {
        &self.asked
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    fn provisionally_mastered(&self, code: &str, threshold: f64) -> bool {
        self.beliefs
            .get(code)
            .is_some_and(|b| b.probability >= threshold)
    }
}

/// Immutable placement output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementResult {
    pub learner_id: String,
    pub grade_estimate: f64,
    pub confidence: Confidence,
    pub frontier_code: Option<String>,
    pub mastered_codes: Vec<String>,
    pub gap_codes: Vec<String>,
    pub recommended_start_code: String,
    pub questions_administered: usize,
}

pub struct DiagnosticEngine {
    curriculum: Arc<dyn Curriculum>,
    clock: Arc<dyn Clock>,
    bkt: BktParams,
    config: DiagnosticConfig,
}

impl DiagnosticEngine {
    pub fn new(
        curriculum: Arc<dyn Curriculum>,
        clock: Arc<dyn Clock>,
        bkt: BktParams,
        config: DiagnosticConfig,
    ) -> Self {
        Self {
            curriculum,
            clock,
            bkt,
            config,
        }
    }

    /// Opens an interview seeded near the learner's stated grade band. A
    /// band with no concepts falls back to the globally easiest concept;
    /// curriculum gaps are an expected operational condition, not an error.
    pub fn start(
        &self,
        learner_id: impl Into<String>,
        stated_grade: f64,
    ) -> Result<DiagnosticSession, EngineError> {
        let mut band = self.curriculum.concepts_by_grade(stated_grade);
        if band.is_empty() {
            tracing::warn!(
                grade = stated_grade,
                "no concepts in stated grade band, falling back to easiest concept"
            );
            band = self.curriculum.concepts();
        }
        sort_by_difficulty(&mut band);
        let seed = band
            .get(band.len() / 2)
            .cloned()
            .ok_or_else(|| EngineError::ConceptNotFound(format!("grade band {stated_grade}")))?;

        let mut visited = BTreeSet::new();
        visited.insert(seed.code.clone());

        Ok(DiagnosticSession {
            learner_id: learner_id.into(),
            stated_grade,
            seed_code: seed.code.clone(),
            asked: Vec::new(),
            beliefs: BTreeMap::new(),
            gaps: BTreeSet::new(),
            visited,
            difficulty_pointer: seed.difficulty,
            current: Some(seed.code),
            last_correct: None,
            terminated: false,
        })
    }

    /// The concept to pose next, or `None` once the interview is over.
    pub fn next_question(
        &self,
        session: &mut DiagnosticSession,
    ) -> Result<Option<Concept>, EngineError> {
        if session.terminated {
            return Ok(None);
        }
        if let Some(code) = &session.current {
            return Ok(Some(self.curriculum.concept(code)?));
        }

        match self.select_next(session) {
            Some(code) => {
                session.visited.insert(code.clone());
                session.current = Some(code.clone());
                Ok(Some(self.curriculum.concept(&code)?))
            }
            None => {
                tracing::debug!(
                    learner = %session.learner_id,
                    asked = session.asked.len(),
                    "concept graph exhausted, terminating diagnostic"
                );
                session.terminated = true;
                Ok(None)
            }
        }
    }

    /// Records the answer for the currently posed concept and updates the
    /// provisional belief. A correct answer also credits the concept's
    /// immediate prerequisites: passing a dependent is evidence the
    /// prerequisites are in place.
    pub fn record_answer(
        &self,
        session: &mut DiagnosticSession,
        concept_code: &str,
        correct: bool,
    ) -> Result<(), EngineError> {
        if session.current.as_deref() != Some(concept_code) {
            return Err(EngineError::ConceptNotFound(concept_code.to_string()));
        }
        let concept = self.curriculum.concept(concept_code)?;
        let now = self.clock.now();

        self.apply_evidence(session, concept_code, correct, now)?;
        if correct {
            for prerequisite in self.curriculum.prerequisites(concept_code)? {
                self.apply_evidence(session, &prerequisite, true, now)?;
            }
        } else {
            session.gaps.insert(concept_code.to_string());
        }

        session.asked.push(AdministeredQuestion {
            concept_code: concept_code.to_string(),
            difficulty: concept.difficulty,
            grade_band: concept.grade_band,
            correct,
        });
        session.difficulty_pointer = concept.difficulty;
        session.last_correct = Some(correct);
        session.current = None;

        if session.asked.len() >= self.config.question_budget {
            tracing::debug!(learner = %session.learner_id, "question budget spent");
            session.terminated = true;
        } else if session.asked.len() >= self.config.confidence_window {
            let confidence = self.convergence_confidence(session);
            if confidence.value() >= self.config.early_stop_confidence {
                tracing::debug!(
                    learner = %session.learner_id,
                    confidence = confidence.value(),
                    "confidence stabilized, stopping early"
                );
                session.terminated = true;
            }
        }
        Ok(())
    }

    /// Collapses the interview into an immutable placement. Always returns
    /// a usable result; a sparse interview caps the confidence instead of
    /// failing.
    pub fn finish(&self, session: DiagnosticSession) -> Result<PlacementResult, EngineError> {
        let administered = session.asked.len();
        let mut confidence = self.convergence_confidence(&session);
        if administered < self.config.min_questions {
            tracing::info!(
                learner = %session.learner_id,
                administered,
                "diagnostic too sparse for a confident placement"
            );
            confidence = confidence.capped_at(self.config.sparse_confidence_cap);
        }

        let threshold = self.config.provisional_mastery_threshold;
        let mastered_codes: Vec<String> = session
            .asked
            .iter()
            .filter(|q| q.correct && session.provisionally_mastered(&q.concept_code, threshold))
            .map(|q| q.concept_code.clone())
            .collect();

        let frontier = self.frontier(&session, threshold)?;
        let frontier_difficulty = frontier.as_ref().map(|c| c.difficulty);

        let gap_codes: Vec<String> = session
            .asked
            .iter()
            .filter(|q| !q.correct)
            .filter(|q| frontier_difficulty.is_none_or(|d| q.difficulty <= d))
            .map(|q| q.concept_code.clone())
            .collect();

        let recommended_start_code = self.recommended_start(&session, frontier.as_ref(), threshold)?;
        let grade_estimate = grade_estimate(&session);

        Ok(PlacementResult {
            learner_id: session.learner_id,
            grade_estimate,
            confidence,
            frontier_code: frontier.map(|c| c.code),
            mastered_codes,
            gap_codes,
            recommended_start_code,
            questions_administered: administered,
        })
    }

    fn apply_evidence(
        &self,
        session: &mut DiagnosticSession,
        concept_code: &str,
        correct: bool,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let prior = session
            .beliefs
            .get(concept_code)
            .cloned()
            .unwrap_or_else(|| MasteryBelief::new(self.bkt.p_init, now));
        let updated = mastery::update(&prior, correct, &self.bkt, now)?;
        session.beliefs.insert(concept_code.to_string(), updated);
        Ok(())
    }

    /// Deterministic adaptive step: harder after a pass, easier after a
    /// fail. Concepts with a confirmed-gap prerequisite are never posed.
    fn select_next(&self, session: &DiagnosticSession) -> Option<String> {
        let mut concepts = self.curriculum.concepts();
        sort_by_difficulty(&mut concepts);
        let candidates: Vec<&Concept> = concepts
            .iter()
            .filter(|c| !session.visited.contains(&c.code))
            .filter(|c| !c.prerequisites.iter().any(|p| session.gaps.contains(p)))
            .collect();

        let threshold = self.config.provisional_mastery_threshold;
        match session.last_correct {
            Some(true) | None => {
                let harder = candidates
                    .iter()
                    .filter(|c| c.difficulty > session.difficulty_pointer);
                // Prefer a concept whose prerequisites are already judged
                // mastered this session.
                harder
                    .clone()
                    .find(|c| {
                        c.prerequisites
                            .iter()
                            .all(|p| session.provisionally_mastered(p, threshold))
                    })
                    .or_else(|| {
                        candidates
                            .iter()
                            .find(|c| c.difficulty > session.difficulty_pointer)
                    })
                    .map(|c| c.code.clone())
            }
            Some(false) => candidates
                .iter()
                .rev()
                .find(|c| c.difficulty < session.difficulty_pointer)
                .map(|c| c.code.clone()),
        }
    }

    /// Boundary consistency over the recent window: how cleanly one
    /// difficulty cutoff separates passes from fails.
    fn convergence_confidence(&self, session: &DiagnosticSession) -> Confidence {
        let window = self.config.confidence_window;
        let recent: Vec<&AdministeredQuestion> =
            session.asked.iter().rev().take(window).collect();
        if recent.len() < 2 {
            return Confidence::new(0.0);
        }
        let coverage = recent.len() as f64 / window as f64;

        let correct: Vec<f64> = recent
            .iter()
            .filter(|q| q.correct)
            .map(|q| q.difficulty)
            .collect();
        let incorrect: Vec<f64> = recent
            .iter()
            .filter(|q| !q.correct)
            .map(|q| q.difficulty)
            .collect();

        if correct.is_empty() || incorrect.is_empty() {
            // Uniform outcomes: the ceiling (or floor) has not been found.
            return Confidence::new(0.25 * coverage);
        }

        let total = correct.len() * incorrect.len();
        let consistent = correct
            .iter()
            .map(|c| incorrect.iter().filter(|i| c <= i).count())
            .sum::<usize>();
        Confidence::new(consistent as f64 / total as f64 * coverage)
    }

    /// Hardest correctly answered concept whose prerequisites all measured
    /// provisionally mastered (and none is a confirmed gap).
    fn frontier(
        &self,
        session: &DiagnosticSession,
        threshold: f64,
    ) -> Result<Option<Concept>, EngineError> {
        let mut best: Option<Concept> = None;
        for asked in session.asked.iter().filter(|q| q.correct) {
            let prerequisites = self.curriculum.prerequisites(&asked.concept_code)?;
            let supported = prerequisites.iter().all(|p| {
                !session.gaps.contains(p)
                    && (!session.beliefs.contains_key(p)
                        || session.provisionally_mastered(p, threshold))
            });
            if !supported {
                continue;
            }
            let concept = self.curriculum.concept(&asked.concept_code)?;
            let better = best
                .as_ref()
                .is_none_or(|b| concept.difficulty > b.difficulty);
            if better {
                best = Some(concept);
            }
        }
        Ok(best)
    }

    /// Lowest-difficulty unmastered prerequisite of the frontier, the
    /// frontier itself if its prerequisites are covered, or the easiest gap
    /// (falling back to the seed) when no frontier was established.
    fn recommended_start(
        &self,
        session: &DiagnosticSession,
        frontier: Option<&Concept>,
        threshold: f64,
    ) -> Result<String, EngineError> {
        if let Some(frontier) = frontier {
            let mut unmastered: Vec<Concept> = Vec::new();
            for prerequisite in &frontier.prerequisites {
                if !session.provisionally_mastered(prerequisite, threshold) {
                    unmastered.push(self.curriculum.concept(prerequisite)?);
                }
            }
            sort_by_difficulty(&mut unmastered);
            return Ok(unmastered
                .first()
                .map(|c| c.code.clone())
                .unwrap_or_else(|| frontier.code.clone()));
        }

        let mut gaps: Vec<Concept> = Vec::new();
        for code in &session.gaps {
            gaps.push(self.curriculum.concept(code)?);
        }
        sort_by_difficulty(&mut gaps);
        Ok(gaps
            .first()
            .map(|c| c.code.clone())
            .unwrap_or_else(|| session.seed_code.clone()))
    }
}

fn sort_by_difficulty(concepts: &mut [Concept]) {
    concepts.sort_by(|a, b| {
        a.difficulty
            .partial_cmp(&b.difficulty)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.code.cmp(&b.code))
    });
}

/// Interpolated grade at the point where the adaptive search stabilized:
/// midway between the hardest pass and the easiest fail.
fn grade_estimate(session: &DiagnosticSession) -> f64 {
    let hardest_pass = session
        .asked
        .iter()
        .filter(|q| q.correct)
        .max_by(|a, b| a.difficulty.total_cmp(&b.difficulty));
    let easiest_fail = session
        .asked
        .iter()
        .filter(|q| !q.correct)
        .min_by(|a, b| a.difficulty.total_cmp(&b.difficulty));

    match (hardest_pass, easiest_fail) {
        (Some(pass), Some(fail)) => (pass.grade_band + fail.grade_band) / 2.0,
        (Some(pass), None) => pass.grade_band + 0.5,
        (None, Some(fail)) => (fail.grade_band - 0.5).max(0.0),
        (None, None) => session.stated_grade,
    }
}
