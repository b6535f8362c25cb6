//! Property tests for history sanitation and preflight
//! Conversations are drawn from a small vocabulary so violations are common

use hanzo_moderation::prelude::*;
use proptest::prelude::*;
use std::sync::Arc;

const VOCABULARY: &[&str] = &[
    "hi",
    "hello there",
    "what is 2+2?",
    "tell me about duckies",
    "why no ducks",
    "bunnies are great",
    "⚠️ BLOCKED: Your message mentions duckies or bunnies.",
    "he ducked",
    "thanks",
    "",
];

fn classifier() -> Arc<PatternClassifier> {
    Arc::new(PatternClassifier::new(&ModerationConfig::default().policy).unwrap())
}

fn role_strategy() -> impl Strategy<Value = Role> {
    prop_oneof![
        4 => Just(Role::User),
        4 => Just(Role::Assistant),
        1 => Just(Role::Tool),
        1 => Just(Role::Function),
    ]
}

fn turn_strategy() -> impl Strategy<Value = Turn> {
    (role_strategy(), 0..VOCABULARY.len())
        .prop_map(|(role, word)| Turn::new(role, VOCABULARY[word]))
}

fn conversation_strategy() -> impl Strategy<Value = Conversation> {
    prop::collection::vec(turn_strategy(), 0..12).prop_map(Conversation::new)
}

proptest! {
    #[test]
    fn sanitized_output_is_original_or_alternating(conversation in conversation_strategy()) {
        let sanitizer = HistorySanitizer::new(classifier());
        let sanitized = sanitizer.sanitize(&conversation);

        prop_assert!(sanitized == conversation || sanitized.is_alternating());
    }

    #[test]
    fn changed_output_never_opens_with_a_reply(conversation in conversation_strategy()) {
        let sanitized = HistorySanitizer::new(classifier()).sanitize_with_report(&conversation);

        if sanitized.report.changed() {
            let first = sanitized.conversation.turns().first().map(|turn| turn.role());
            prop_assert_eq!(first, Some(Role::User));
        }
    }

    #[test]
    fn sanitize_is_idempotent(conversation in conversation_strategy()) {
        let sanitizer = HistorySanitizer::new(classifier());
        let once = sanitizer.sanitize(&conversation);
        let twice = sanitizer.sanitize(&once);

        prop_assert_eq!(once, twice);
    }

    #[test]
    fn changed_output_contains_no_violations(conversation in conversation_strategy()) {
        let classifier = classifier();
        let sanitizer = HistorySanitizer::new(classifier.clone());
        let sanitized = sanitizer.sanitize_with_report(&conversation);

        if sanitized.report.changed() {
            let policed = sanitized
                .conversation
                .turns()
                .iter()
                .filter(|turn| matches!(turn.role(), Role::User | Role::Assistant));
            for turn in policed {
                prop_assert!(!classifier.classify(&turn.text()).unwrap());
            }
        }
    }

    #[test]
    fn flagged_latest_user_turn_always_rejected(
        mut conversation in conversation_strategy(),
        trailing_assistant in any::<bool>(),
    ) {
        let mut turns = std::mem::take(&mut conversation).into_turns();
        turns.push(Turn::user("so, about those bunnies"));
        if trailing_assistant {
            turns.push(Turn::assistant("hello there"));
        }

        let guard = PreflightGuard::new(classifier(), "blocked", AuditLogger::default());
        let request = ChatRequest::new("m", turns);
        let outcome = guard.preflight(request, &RequestContext::new()).unwrap();

        prop_assert!(outcome.is_reject());
    }
}
