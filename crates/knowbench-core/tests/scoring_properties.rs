//! Property tests for the scoring engine.

use knowbench_core::{score, AnswerOutcome, Outcome, OutputSchema, Question, QuestionKind};
use proptest::prelude::*;
use serde_json::{json, Value};

fn answered(value: Value) -> AnswerOutcome {
    match value {
        Value::Object(map) => AnswerOutcome::Answered(map),
        other => panic!("answers must be objects, got {other}"),
    }
}

fn mc(n_choices: usize, correct_index: i64) -> Question {
    Question::multiple_choice(
        "mc",
        "d",
        "p",
        (0..n_choices).map(|i| format!("choice {i}")).collect(),
        correct_index,
    )
}

fn schema() -> OutputSchema {
    OutputSchema::new(vec![("answer".into(), "string".into())])
}

proptest! {
    #[test]
    fn choice_equal_to_correct_index_is_correct(n in 1usize..10, seed in 0usize..100) {
        let correct = (seed % n) as i64;
        let v = score(&mc(n, correct), &answered(json!({"choice": correct})));
        prop_assert_eq!(v.outcome, Outcome::Correct);
    }

    #[test]
    fn any_other_integer_choice_is_incorrect(correct in 0i64..8, choice in any::<i64>()) {
        prop_assume!(choice != correct);
        let v = score(&mc(8, correct), &answered(json!({"choice": choice})));
        prop_assert_eq!(v.outcome, Outcome::Incorrect);
    }

    #[test]
    fn non_integer_choice_is_incorrect(text in "[a-z ]{0,12}") {
        let v = score(&mc(4, 1), &answered(json!({"choice": text})));
        prop_assert_eq!(v.outcome, Outcome::Incorrect);
    }

    #[test]
    fn numeric_int_and_string_forms_match(n in any::<i64>()) {
        let q = Question::numeric("num", "d", "p", schema(), json!(n));
        prop_assert_eq!(score(&q, &answered(json!({"answer": n}))).outcome, Outcome::Correct);
        prop_assert_eq!(
            score(&q, &answered(json!({"answer": n.to_string()}))).outcome,
            Outcome::Correct
        );
    }

    #[test]
    fn phrase_correct_iff_lowercased_contains(
        answer in "[A-Za-z ]{0,24}",
        phrase in "[A-Za-z]{1,6}",
    ) {
        let q = Question::phrase("ph", "d", "p", schema(), vec![phrase.clone()]);
        let expected = if answer.to_lowercase().contains(&phrase.to_lowercase()) {
            Outcome::Correct
        } else {
            Outcome::Incorrect
        };
        let v = score(&q, &answered(json!({"answer": answer})));
        prop_assert_eq!(v.outcome, expected);
    }

    #[test]
    fn unrecognized_pairs_are_scoring_errors(
        answer_type in "[a-z_]{1,16}",
        method in proptest::option::of("[a-z_]{1,16}"),
    ) {
        let known = matches!(
            (answer_type.as_str(), method.as_deref()),
            ("multiple_choice", Some("choice_equals_index"))
                | ("structured_single", Some("numeric_match"))
                | ("structured_single", Some("phrase_match"))
        );
        prop_assume!(!known);
        let q = Question {
            task_id: "x".into(),
            domain: "d".into(),
            prompt: "p".into(),
            kind: QuestionKind::Unrecognized {
                answer_type,
                method,
                choices: None,
                output_schema: None,
            },
        };
        let v = score(&q, &answered(json!({"answer": "a"})));
        prop_assert_eq!(v.outcome, Outcome::ScoringError);
    }

    #[test]
    fn answer_failures_are_never_correct(cause in ".{0,32}") {
        for failure in [
            AnswerOutcome::TransportFailure { cause: cause.clone() },
            AnswerOutcome::MalformedAnswer { raw: cause.clone(), cause: cause.clone() },
        ] {
            let v = score(&mc(4, 0), &failure);
            prop_assert_eq!(v.outcome, Outcome::Incorrect);
        }
    }
}
