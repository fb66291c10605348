//! Execution planning: intent plus moderation signal to an ordered handler
//! plan. Pure and deterministic; the runtime executes the plan.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::RoutingConfig;
use crate::domain::intent::{Intent, IntentResult};
use crate::domain::response::HandlerKind;
use crate::moderation::ModerationResult;

/// Per-message routing decision. Consumed immediately, never persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Handlers to invoke, in invocation order.
    pub handlers: Vec<HandlerKind>,
    /// The handler whose response the gate prefers when nothing escalates.
    pub primary: HandlerKind,
    /// Invoked for escalation composition if the primary itself escalates.
    pub fallback: Option<HandlerKind>,
    /// Sequential plans run in order; the later handler's output is
    /// composed after the earlier one's. Non-sequential plans fan out.
    pub sequential: bool,
    pub confidence_threshold: f64,
}

impl ExecutionPlan {
    fn single(primary: HandlerKind, fallback: Option<HandlerKind>, threshold: f64) -> Self {
        Self {
            handlers: vec![primary],
            primary,
            fallback,
            sequential: false,
            confidence_threshold: threshold,
        }
    }
}

pub struct ExecutionPlanner {
    info_delivery: Regex,
    scheduling_request: Regex,
    thresholds: RoutingConfig,
}

impl ExecutionPlanner {
    pub fn new(thresholds: RoutingConfig) -> Self {
        Self {
            info_delivery: Regex::new(
                r"(?i)\b(send|email|share)\s+(me|us|over)?\s*.{0,30}\b(guide|docs?|documentation|whitepaper|pricing|information|info|one.?pager)\b",
            )
            .expect("static planner pattern compiles"),
            scheduling_request: Regex::new(
                r"(?i)\b(schedule|book|set\s*up|arrange)\b.{0,40}\b(demo|call|meeting)\b",
            )
            .expect("static planner pattern compiles"),
            thresholds,
        }
    }

    /// Rules apply in order: moderation override, multi-intent heuristic,
    /// then single-intent routing with a conservative low-confidence default.
    pub fn plan(
        &self,
        text: &str,
        intent: &IntentResult,
        moderation: &ModerationResult,
    ) -> ExecutionPlan {
        let threshold = self.thresholds.planner_confidence_threshold;

        if moderation.forces_escalation() {
            return ExecutionPlan::single(HandlerKind::Escalation, None, threshold);
        }

        // Only the guide-plus-demo combination is recognized as multi-intent.
        if self.info_delivery.is_match(text) && self.scheduling_request.is_match(text) {
            return ExecutionPlan {
                handlers: vec![HandlerKind::Knowledge, HandlerKind::Scheduler],
                primary: HandlerKind::Scheduler,
                fallback: Some(HandlerKind::Knowledge),
                sequential: true,
                confidence_threshold: threshold,
            };
        }

        match intent.intent {
            Intent::Escalation => ExecutionPlan::single(HandlerKind::Escalation, None, threshold),
            Intent::Scheduling if intent.confidence > threshold => {
                ExecutionPlan::single(HandlerKind::Scheduler, Some(HandlerKind::Knowledge), threshold)
            }
            Intent::TechnicalSupport if intent.confidence > threshold => {
                ExecutionPlan::single(HandlerKind::Technical, Some(HandlerKind::Knowledge), threshold)
            }
            Intent::Information => ExecutionPlan::single(HandlerKind::Knowledge, None, threshold),
            // Below threshold (or unknown): knowledge handler as the
            // conservative default, classified handler as secondary.
            Intent::Scheduling => {
                ExecutionPlan::single(HandlerKind::Knowledge, Some(HandlerKind::Scheduler), threshold)
            }
            Intent::TechnicalSupport => {
                ExecutionPlan::single(HandlerKind::Knowledge, Some(HandlerKind::Technical), threshold)
            }
            Intent::Unknown => ExecutionPlan::single(HandlerKind::Knowledge, None, threshold),
        }
    }
}

impl Default for ExecutionPlanner {
    fn default() -> Self {
        Self::new(RoutingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::ExecutionPlanner;
    use crate::classifier::PatternClassifier;
    use crate::domain::intent::{
        CategoryScores, ClassificationMethod, Intent, IntentMetadata, IntentResult,
    };
    use crate::domain::response::HandlerKind;
    use crate::moderation::{ModerationFilter, ModerationResult};

    fn intent(intent: Intent, confidence: f64) -> IntentResult {
        IntentResult {
            intent,
            confidence,
            scores: CategoryScores::default(),
            method: ClassificationMethod::Pattern,
            metadata: IntentMetadata::default(),
        }
    }

    #[test]
    fn hostility_overrides_any_classified_intent() {
        let planner = ExecutionPlanner::default();
        let moderation = ModerationFilter::new().analyze("you guys are trash");
        let plan = planner.plan(
            "you guys are trash",
            &intent(Intent::Scheduling, 0.95),
            &moderation,
        );
        assert_eq!(plan.handlers, vec![HandlerKind::Escalation]);
        assert!(!plan.sequential);
    }

    #[test]
    fn connection_request_overrides_scheduling() {
        let planner = ExecutionPlanner::default();
        let moderation = ModerationFilter::new().analyze("connect me to sales");
        let plan = planner.plan(
            "connect me to sales",
            &intent(Intent::Scheduling, 0.90),
            &moderation,
        );
        assert_eq!(plan.primary, HandlerKind::Escalation);
    }

    #[test]
    fn guide_plus_demo_is_a_sequential_multi_intent_plan() {
        let planner = ExecutionPlanner::default();
        let text = "Can you send me the integration guide and schedule a demo for Friday?";
        let plan = planner.plan(text, &intent(Intent::Scheduling, 0.95), &ModerationResult::default());
        assert_eq!(plan.handlers, vec![HandlerKind::Knowledge, HandlerKind::Scheduler]);
        assert!(plan.sequential);
        assert_eq!(plan.primary, HandlerKind::Scheduler);
    }

    #[test]
    fn confident_scheduling_routes_to_scheduler_with_knowledge_fallback() {
        let planner = ExecutionPlanner::default();
        let plan = planner.plan(
            "I want to schedule a demo",
            &intent(Intent::Scheduling, 0.95),
            &ModerationResult::default(),
        );
        assert_eq!(plan.handlers, vec![HandlerKind::Scheduler]);
        assert_eq!(plan.fallback, Some(HandlerKind::Knowledge));
    }

    #[test]
    fn low_confidence_routes_to_knowledge_with_classified_handler_secondary() {
        let planner = ExecutionPlanner::default();
        let plan = planner.plan(
            "maybe something about setup",
            &intent(Intent::TechnicalSupport, 0.60),
            &ModerationResult::default(),
        );
        assert_eq!(plan.primary, HandlerKind::Knowledge);
        assert_eq!(plan.fallback, Some(HandlerKind::Technical));
    }

    #[test]
    fn information_plan_has_no_fallback() {
        let planner = ExecutionPlanner::default();
        let plan = planner.plan(
            "What is your pricing?",
            &intent(Intent::Information, 0.80),
            &ModerationResult::default(),
        );
        assert_eq!(plan.handlers, vec![HandlerKind::Knowledge]);
        assert_eq!(plan.fallback, None);
    }

    #[test]
    fn plan_is_deterministic_for_identical_inputs() {
        let planner = ExecutionPlanner::default();
        let classifier = PatternClassifier::default();
        let filter = ModerationFilter::new();
        let text = "The API is returning 500 errors in production";
        let classified = classifier.classify(text);
        let moderated = filter.analyze(text);
        let first = planner.plan(text, &classified, &moderated);
        for _ in 0..5 {
            assert_eq!(planner.plan(text, &classified, &moderated), first);
        }
    }

    #[test]
    fn confident_technical_routes_to_technical_handler() {
        let planner = ExecutionPlanner::default();
        let plan = planner.plan(
            "SSO login is broken",
            &intent(Intent::TechnicalSupport, 0.85),
            &ModerationResult::default(),
        );
        assert_eq!(plan.primary, HandlerKind::Technical);
        assert_eq!(plan.fallback, Some(HandlerKind::Knowledge));
    }
}
