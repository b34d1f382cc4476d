//! Task-specific scoring
//!
//! The runner is benchmark-agnostic; each benchmark kind plugs in an
//! `Evaluator` that turns an agent payload into evaluation sub-fields.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;
use crate::model::{Payload, TaskDescriptor};

/// Scores one completed task.
pub trait Evaluator: Send + Sync {
    /// Evaluation sub-fields stored under `payload.evaluation`.
    fn evaluate(&self, task: &TaskDescriptor, payload: &Payload) -> Map<String, Value>;
}

/// Benchmark families with their scoring and prediction conventions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkKind {
    /// Patch-producing tasks, judged later by an external harness
    #[default]
    #[serde(rename = "swebench")]
    SweBench,
    /// Free-form answers to questions about a codebase
    SweQa,
    /// Locate a function matching a description
    RepoQa,
    Generic,
}

impl BenchmarkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BenchmarkKind::SweBench => "swebench",
            BenchmarkKind::SweQa => "swe_qa",
            BenchmarkKind::RepoQa => "repo_qa",
            BenchmarkKind::Generic => "generic",
        }
    }

    /// Evaluator for this benchmark
    pub fn evaluator(&self) -> Box<dyn Evaluator> {
        match self {
            BenchmarkKind::SweBench | BenchmarkKind::Generic => Box::new(NoScoring),
            BenchmarkKind::SweQa => Box::new(WordOverlap::default()),
            BenchmarkKind::RepoQa => Box::new(FunctionMatch::default()),
        }
    }

    /// Payload field exported as the prediction excerpt
    pub fn prediction_field(&self) -> &'static str {
        match self {
            BenchmarkKind::SweBench => "git_diff",
            _ => "result_text",
        }
    }
}

impl fmt::Display for BenchmarkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BenchmarkKind {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "swebench" | "swebench_lite" | "swe_bench" => Ok(BenchmarkKind::SweBench),
            "swe_qa" | "sweqa" => Ok(BenchmarkKind::SweQa),
            "repo_qa" | "repoqa" => Ok(BenchmarkKind::RepoQa),
            "generic" => Ok(BenchmarkKind::Generic),
            _ => Err(Error::InvalidArgument(format!(
                "invalid benchmark '{s}': must be swebench, swe_qa, repo_qa, or generic"
            ))),
        }
    }
}

/// No evaluation sub-fields
#[derive(Debug, Clone, Copy, Default)]
pub struct NoScoring;

impl Evaluator for NoScoring {
    fn evaluate(&self, _task: &TaskDescriptor, _payload: &Payload) -> Map<String, Value> {
        Map::new()
    }
}

/// Share of reference words that appear in the predicted answer
#[derive(Debug, Clone)]
pub struct WordOverlap {
    pub reference_key: String,
}

impl Default for WordOverlap {
    fn default() -> Self {
        Self {
            reference_key: "answer".to_string(),
        }
    }
}

impl Evaluator for WordOverlap {
    fn evaluate(&self, task: &TaskDescriptor, payload: &Payload) -> Map<String, Value> {
        let predicted = payload.result_text.as_deref().unwrap_or("");
        let overlap = word_overlap(predicted, task.reference_str(&self.reference_key));

        let mut fields = Map::new();
        fields.insert("word_overlap".to_string(), Value::from(overlap));
        fields
    }
}

/// Lower-cased whitespace-token overlap, rounded to three decimals.
pub fn word_overlap(predicted: &str, reference: &str) -> f64 {
    let reference = reference.to_lowercase();
    let predicted = predicted.to_lowercase();
    let ref_words: HashSet<&str> = reference.split_whitespace().collect();
    let pred_words: HashSet<&str> = predicted.split_whitespace().collect();

    let shared = ref_words.intersection(&pred_words).count();
    let ratio = shared as f64 / ref_words.len().max(1) as f64;
    (ratio * 1000.0).round() / 1000.0
}

/// Whether the answer names the reference function and its file
#[derive(Debug, Clone)]
pub struct FunctionMatch {
    pub function_key: String,
    pub file_key: String,
}

impl Default for FunctionMatch {
    fn default() -> Self {
        Self {
            function_key: "function_name".to_string(),
            file_key: "file_path".to_string(),
        }
    }
}

impl Evaluator for FunctionMatch {
    fn evaluate(&self, task: &TaskDescriptor, payload: &Payload) -> Map<String, Value> {
        let predicted = payload
            .result_text
            .as_deref()
            .unwrap_or("")
            .to_lowercase();
        let func = task.reference_str(&self.function_key).to_lowercase();
        let file = task.reference_str(&self.file_key).to_lowercase();

        // An empty reference never counts as found.
        let func_match = !func.is_empty() && predicted.contains(&func);
        let file_match = !file.is_empty() && predicted.contains(&file);

        let mut fields = Map::new();
        fields.insert("exact_match".to_string(), Value::Bool(func_match && file_match));
        fields.insert("func_match".to_string(), Value::Bool(func_match));
        fields.insert("file_match".to_string(), Value::Bool(file_match));
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn answer(text: &str) -> Payload {
        Payload {
            result_text: Some(text.to_string()),
            ..Payload::default()
        }
    }

    #[test]
    fn word_overlap_counts_reference_coverage() {
        assert_eq!(word_overlap("the cache lives in Redis", "Redis cache"), 1.0);
        assert_eq!(word_overlap("nothing relevant", "redis cache"), 0.0);
        assert_eq!(word_overlap("one two", "one two three"), 0.667);
        assert_eq!(word_overlap("anything", ""), 0.0);
    }

    #[test]
    fn swe_qa_scores_against_answer() {
        let task = TaskDescriptor::new("q1", "Where?").with_reference("answer", "in utils.py");
        let fields = BenchmarkKind::SweQa
            .evaluator()
            .evaluate(&task, &answer("It is defined in utils.py"));
        assert_eq!(fields["word_overlap"], json!(1.0));
    }

    #[test]
    fn repo_qa_requires_function_and_file() {
        let task = TaskDescriptor::new("r1", "Find it")
            .with_reference("function_name", "parse_header")
            .with_reference("file_path", "src/http/headers.py");
        let evaluator = BenchmarkKind::RepoQa.evaluator();

        let both = evaluator.evaluate(
            &task,
            &answer("`parse_header` in SRC/http/headers.py"),
        );
        assert_eq!(both["exact_match"], json!(true));

        let func_only = evaluator.evaluate(&task, &answer("parse_header somewhere"));
        assert_eq!(func_only["exact_match"], json!(false));
        assert_eq!(func_only["func_match"], json!(true));
        assert_eq!(func_only["file_match"], json!(false));
    }

    #[test]
    fn swebench_has_no_scoring() {
        let task = TaskDescriptor::new("s1", "Fix");
        assert!(BenchmarkKind::SweBench
            .evaluator()
            .evaluate(&task, &Payload::default())
            .is_empty());
        assert_eq!(BenchmarkKind::SweBench.prediction_field(), "git_diff");
        assert_eq!(BenchmarkKind::SweQa.prediction_field(), "result_text");
    }

    #[test]
    fn parse_benchmark_names() {
        assert_eq!("swebench".parse::<BenchmarkKind>().unwrap(), BenchmarkKind::SweBench);
        assert_eq!("swe-qa".parse::<BenchmarkKind>().unwrap(), BenchmarkKind::SweQa);
        assert_eq!("RepoQA".parse::<BenchmarkKind>().unwrap(), BenchmarkKind::RepoQa);
        assert!("chess".parse::<BenchmarkKind>().is_err());
    }
}
