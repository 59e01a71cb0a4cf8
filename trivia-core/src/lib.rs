use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_ANSWER_CHARACTERS: usize = 70;

pub const ANSWER_COUNT: usize = 4;

pub const FALLBACK_QUESTION: &str = "Error loading question";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Answer {
    pub content: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Question {
    pub trivia_question: String,
    pub trivia_answers: [Answer; ANSWER_COUNT],
}

impl Question {
    pub fn fallback() -> Self {
        let placeholder = |n: usize| Answer {
            content: format!("Error {n}"),
            is_correct: n == ANSWER_COUNT,
        };
        Self {
            trivia_question: FALLBACK_QUESTION.to_string(),
            trivia_answers: [placeholder(1), placeholder(2), placeholder(3), placeholder(4)],
        }
    }

    pub fn correct_answer(&self) -> Option<&Answer> {
        self.trivia_answers.iter().find(|a| a.is_correct)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

pub fn system_prompt() -> ChatMessage {
    let content = format!(
        "You are an expert trivia question generator with deep knowledge across all topics. \
         Generate a factually accurate trivia question with four possible answers. \
         CRITICAL: Ensure your facts are 100% correct before responding. \
         Only ONE answer should be correct, and the other three should be plausible but incorrect. \
         Respond in the following JSON format: \
         {{ \"trivia_question\": \"\", \
         \"trivia_answers\": [\
         {{ \"content\": \"\", \"is_correct\": true }},\
         {{ \"content\": \"\", \"is_correct\": false }},\
         {{ \"content\": \"\", \"is_correct\": false }},\
         {{ \"content\": \"\", \"is_correct\": false }}\
         ]}} \n\n\
         REQUIREMENTS:\n\
         - Each answer must be under {MAX_ANSWER_CHARACTERS} characters\n\
         - All answers must be unique\n\
         - The correct answer must be factually accurate\n\
         - Wrong answers should be plausible but clearly incorrect\n\
         - Double-check your facts before responding"
    );
    ChatMessage {
        role: Role::System,
        content,
    }
}

pub fn shuffle_answers<R: Rng + ?Sized>(
    answers: &[Answer; ANSWER_COUNT],
    rng: &mut R,
) -> [Answer; ANSWER_COUNT] {
    let mut shuffled = answers.clone();
    shuffled[..].shuffle(rng);
    shuffled
}

#[derive(Debug, Error)]
pub enum MalformedResponse {
    #[error("response is not a trivia question: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("expected exactly one correct answer, found {0}")]
    CorrectCount(usize),
}

/// Result of parsing a generator reply. `question` is always usable; `fallback` records why
/// the placeholder was substituted, if it was.
#[derive(Debug)]
pub struct ParsedQuestion {
    pub question: Question,
    pub fallback: Option<MalformedResponse>,
}

impl ParsedQuestion {
    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

pub fn parse_question(raw: &str) -> ParsedQuestion {
    match decode_question(raw) {
        Ok(question) => ParsedQuestion {
            question,
            fallback: None,
        },
        Err(err) => ParsedQuestion {
            question: Question::fallback(),
            fallback: Some(err),
        },
    }
}

fn decode_question(raw: &str) -> Result<Question, MalformedResponse> {
    let question: Question = serde_json::from_str(raw)?;
    let correct = question
        .trivia_answers
        .iter()
        .filter(|a| a.is_correct)
        .count();
    if correct != 1 {
        return Err(MalformedResponse::CorrectCount(correct));
    }
    Ok(question)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    NoQuestion,
    QuestionShown,
    AnswerRevealed,
}

#[derive(Debug)]
pub struct RoundAdvance {
    pub fallback: Option<MalformedResponse>,
    pub history_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundState {
    pub conversation_history: Vec<ChatMessage>,
    pub player_score: u32,
    pub is_revealed: bool,
    pub answer_correct: bool,
    pub current_question: Option<Question>,
}

impl Default for RoundState {
    fn default() -> Self {
        Self {
            conversation_history: vec![system_prompt()],
            player_score: 0,
            is_revealed: false,
            answer_correct: false,
            current_question: None,
        }
    }
}

impl RoundState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initialize(slot: &mut Option<RoundState>) -> &mut RoundState {
        slot.get_or_insert_with(RoundState::new)
    }

    pub fn phase(&self) -> RoundPhase {
        match (&self.current_question, self.is_revealed) {
            (None, _) => RoundPhase::NoQuestion,
            (Some(_), false) => RoundPhase::QuestionShown,
            (Some(_), true) => RoundPhase::AnswerRevealed,
        }
    }

    pub fn advance<R: Rng + ?Sized>(&mut self, raw_completion: &str, rng: &mut R) -> RoundAdvance {
        self.conversation_history
            .push(ChatMessage::assistant(raw_completion));

        let ParsedQuestion { question, fallback } = parse_question(raw_completion);
        let trivia_answers = shuffle_answers(&question.trivia_answers, rng);
        self.current_question = Some(Question {
            trivia_question: question.trivia_question,
            trivia_answers,
        });
        self.is_revealed = false;

        RoundAdvance {
            fallback,
            history_len: self.conversation_history.len(),
        }
    }

    /// Records the player's result. `claimed_correct` is taken on trust from the caller.
    pub fn submit(&mut self, claimed_correct: bool) {
        self.answer_correct = claimed_correct;
        if claimed_correct {
            self.player_score += 1;
        }
        self.is_revealed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashMap;

    fn answer(content: &str, is_correct: bool) -> Answer {
        Answer {
            content: content.to_string(),
            is_correct,
        }
    }

    fn sample_answers() -> [Answer; 4] {
        [
            answer("4", true),
            answer("3", false),
            answer("5", false),
            answer("22", false),
        ]
    }

    fn question_json(question: &str, correct: &str, wrong: [&str; 3]) -> String {
        serde_json::json!({
            "trivia_question": question,
            "trivia_answers": [
                { "content": correct, "is_correct": true },
                { "content": wrong[0], "is_correct": false },
                { "content": wrong[1], "is_correct": false },
                { "content": wrong[2], "is_correct": false },
            ]
        })
        .to_string()
    }

    fn assert_fallback(parsed: &ParsedQuestion) {
        assert!(parsed.is_fallback());
        let q = &parsed.question;
        assert_eq!(q.trivia_question, FALLBACK_QUESTION);
        assert_eq!(q.trivia_answers.iter().filter(|a| a.is_correct).count(), 1);
        assert!(q.trivia_answers[3].is_correct);
    }

    #[test]
    fn shuffle_is_a_permutation_with_one_correct() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let original = sample_answers();
        for _ in 0..100 {
            let shuffled = shuffle_answers(&original, &mut rng);
            assert_eq!(shuffled.iter().filter(|a| a.is_correct).count(), 1);
            for a in &original {
                assert!(shuffled.contains(a));
            }
        }
        assert_eq!(original, sample_answers());
    }

    #[test]
    fn shuffle_reaches_every_ordering_evenly() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let original = sample_answers();
        let samples = 24_000;
        let mut counts: HashMap<Vec<String>, usize> = HashMap::new();
        for _ in 0..samples {
            let key = shuffle_answers(&original, &mut rng)
                .iter()
                .map(|a| a.content.clone())
                .collect::<Vec<_>>();
            *counts.entry(key).or_insert(0) += 1;
        }

        assert_eq!(counts.len(), 24);
        let expected = samples / 24;
        for count in counts.values() {
            assert!(
                count.abs_diff(expected) < expected / 5,
                "ordering seen {count} times, expected about {expected}"
            );
        }
    }

    #[test]
    fn parse_keeps_well_formed_question_verbatim() {
        let raw = question_json("What is 2+2?", "4", ["3", "5", "22"]);
        let parsed = parse_question(&raw);

        assert!(!parsed.is_fallback());
        assert_eq!(parsed.question.trivia_question, "What is 2+2?");
        assert_eq!(parsed.question.trivia_answers, sample_answers());
    }

    #[test]
    fn parse_does_not_enforce_answer_length() {
        let long = "x".repeat(MAX_ANSWER_CHARACTERS * 2);
        let raw = question_json("Long?", &long, ["a", "b", "c"]);
        let parsed = parse_question(&raw);

        assert!(!parsed.is_fallback());
        assert_eq!(parsed.question.trivia_answers[0].content, long);
    }

    #[test]
    fn parse_falls_back_on_invalid_input() {
        let parsed = parse_question("not json");
        assert_fallback(&parsed);
        assert!(matches!(parsed.fallback, Some(MalformedResponse::Decode(_))));

        let missing = parse_question(r#"{"trivia_question": "Where are the answers?"}"#);
        assert_fallback(&missing);
    }

    #[test]
    fn parse_falls_back_on_wrong_answer_count() {
        let raw = serde_json::json!({
            "trivia_question": "Three answers?",
            "trivia_answers": [
                { "content": "a", "is_correct": true },
                { "content": "b", "is_correct": false },
                { "content": "c", "is_correct": false },
            ]
        })
        .to_string();
        assert_fallback(&parse_question(&raw));
    }

    #[test]
    fn parse_falls_back_without_exactly_one_correct() {
        let raw = serde_json::json!({
            "trivia_question": "All right?",
            "trivia_answers": [
                { "content": "a", "is_correct": true },
                { "content": "b", "is_correct": true },
                { "content": "c", "is_correct": false },
                { "content": "d", "is_correct": false },
            ]
        })
        .to_string();
        let parsed = parse_question(&raw);
        assert_fallback(&parsed);
        assert!(matches!(
            parsed.fallback,
            Some(MalformedResponse::CorrectCount(2))
        ));
    }

    #[test]
    fn fallback_answers_are_distinct() {
        let q = Question::fallback();
        for (i, a) in q.trivia_answers.iter().enumerate() {
            for b in &q.trivia_answers[i + 1..] {
                assert_ne!(a.content, b.content);
            }
        }
        assert_eq!(q.correct_answer().map(|a| a.content.as_str()), Some("Error 4"));
    }

    #[test]
    fn fresh_state_has_defaults() {
        let state = RoundState::new();
        assert_eq!(state.player_score, 0);
        assert!(!state.is_revealed);
        assert!(!state.answer_correct);
        assert_eq!(state.conversation_history, vec![system_prompt()]);
        assert!(state.current_question.is_none());
        assert_eq!(state.phase(), RoundPhase::NoQuestion);
    }

    #[test]
    fn system_prompt_mentions_answer_limit() {
        let prompt = system_prompt();
        assert_eq!(prompt.role, Role::System);
        assert!(prompt.content.contains("under 70 characters"));
        assert!(prompt.content.contains("\"trivia_answers\""));
    }

    #[test]
    fn initialize_twice_keeps_progress() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut slot = None;
        let state = RoundState::initialize(&mut slot);
        state.advance(&question_json("Q?", "a", ["b", "c", "d"]), &mut rng);
        state.submit(true);

        let again = RoundState::initialize(&mut slot);
        assert_eq!(again.player_score, 1);
        assert_eq!(again.conversation_history.len(), 2);
        assert_eq!(again.phase(), RoundPhase::AnswerRevealed);
    }

    #[test]
    fn full_round_sequence() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut slot = None;
        let state = RoundState::initialize(&mut slot);

        let outcome = state.advance(&question_json("What is 2+2?", "4", ["3", "5", "22"]), &mut rng);
        assert!(outcome.fallback.is_none());
        assert_eq!(outcome.history_len, 2);
        let question = state.current_question.as_ref().unwrap();
        assert_eq!(question.trivia_question, "What is 2+2?");
        assert_eq!(question.correct_answer().unwrap().content, "4");
        assert!(!state.is_revealed);
        assert_eq!(state.phase(), RoundPhase::QuestionShown);

        state.submit(true);
        assert_eq!(state.player_score, 1);
        assert!(state.is_revealed);
        assert!(state.answer_correct);
        assert_eq!(state.phase(), RoundPhase::AnswerRevealed);

        state.advance(
            &question_json("Capital of France?", "Paris", ["Lyon", "Nice", "Lille"]),
            &mut rng,
        );
        assert!(!state.is_revealed);
        assert_eq!(state.player_score, 1);
        assert!(state.answer_correct);
        assert_eq!(state.phase(), RoundPhase::QuestionShown);
    }

    #[test]
    fn wrong_submission_keeps_score() {
        let mut state = RoundState::new();
        state.submit(false);
        assert_eq!(state.player_score, 0);
        assert!(!state.answer_correct);
        assert!(state.is_revealed);
    }

    #[test]
    fn history_grows_by_one_per_advance() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut state = RoundState::new();
        let inputs = [
            question_json("Q1?", "a", ["b", "c", "d"]),
            "not json".to_string(),
            String::new(),
            question_json("Q2?", "e", ["f", "g", "h"]),
        ];
        for (i, raw) in inputs.iter().enumerate() {
            let before = state.conversation_history.len();
            let outcome = state.advance(raw, &mut rng);
            assert_eq!(state.conversation_history.len(), before + 1);
            assert_eq!(outcome.history_len, i + 2);
            assert_eq!(
                state.conversation_history.last(),
                Some(&ChatMessage::assistant(raw.as_str()))
            );
        }
        assert_eq!(state.conversation_history[0], system_prompt());
    }

    #[test]
    fn advance_with_garbage_shows_fallback() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut state = RoundState::new();
        let outcome = state.advance("upstream exploded", &mut rng);

        assert!(outcome.fallback.is_some());
        let question = state.current_question.as_ref().unwrap();
        assert_eq!(question.trivia_question, FALLBACK_QUESTION);
        assert_eq!(question.correct_answer().unwrap().content, "Error 4");
    }

    #[test]
    fn history_serializes_lowercase_roles() {
        let value = serde_json::to_value(RoundState::new().conversation_history).unwrap();
        assert_eq!(value[0]["role"], "system");
        let value = serde_json::to_value(ChatMessage::assistant("hi")).unwrap();
        assert_eq!(value, serde_json::json!({ "role": "assistant", "content": "hi" }));
    }
}
