//! Query decomposition pipeline: split one complex question into independent
//! sub-questions, answer them with concurrent agent runs, and synthesize one
//! final answer. States run DECOMPOSE → FANOUT → SYNTHESIZE with no retries.


use crate::agent::Agent;
use crate::ai::{CompletionModel, Message};
use crate::error::{AgentError, Result};
use futures_util::future::join_all;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const MIN_SUB_QUESTIONS: usize = 2;
const MAX_SUB_QUESTIONS: usize = 5;

const DECOMPOSITION_PROMPT: &str = r#"You are a research assistant that breaks down complex questions into simpler sub-questions.

Given a complex research question, decompose it into 2-5 simpler sub-questions that:
1. Can be answered independently
2. Together provide enough information to answer the original question
3. Are specific and focused
4. Progress logically from foundational to more complex

Each sub-question is answered by a separate researcher who cannot see the
original question or the other sub-questions. Every sub-question must
therefore be fully self-contained: repeat the specific names, projects,
places, and dates from the original question. Never write "the project",
"it", "this company", or any other reference whose meaning depends on text
outside the sub-question itself.

Complex Question: {question}

Respond with a JSON object of this exact shape:
{"sub_questions": ["...", "..."], "reasoning": "..."}

Be strategic: sometimes you need background info first, sometimes you need to compare multiple aspects."#;

const SYNTHESIS_PROMPT: &str = r#"You are synthesizing research findings into a comprehensive answer.

Original Question: {original_question}

Sub-questions and their answers:
{sub_answers}

Task: Provide a well-structured, comprehensive answer to the original question by:
1. Integrating information from all sub-answers
2. Resolving any contradictions
3. Highlighting key insights
4. Noting any gaps or limitations

Synthesized Answer:"#;

/// Decomposition produced by the model under the structural contract
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryDecomposition {
    /// 2 to 5 independently answerable, self-contained sub-questions
    pub sub_questions: Vec<String>,
    /// Brief explanation of the decomposition strategy
    pub reasoning: String,
}

/// One sub-question paired with the text its agent run produced
#[derive(Debug, Clone, Serialize)]
pub struct SubAnswer {
    pub question: String,
    pub answer: String,
    /// True when the agent run failed; `answer` then holds the error text
    /// and synthesis treats the entry as a gap
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub failed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub original_question: String,
    pub decomposition: QueryDecomposition,
    /// Index-stable: ordered like the decomposition's sub-questions
    pub sub_answers: Vec<SubAnswer>,
    pub final_answer: String,
}

/// Builds one fresh, isolated agent per sub-question run
pub type AgentFactory = Box<dyn Fn() -> Agent + Send + Sync>;

pub struct DecompositionPipeline {
    llm: Arc<dyn CompletionModel>,
    agent_factory: AgentFactory,
}

impl DecompositionPipeline {
    pub fn new(llm: Arc<dyn CompletionModel>, agent_factory: AgentFactory) -> Self {
        DecompositionPipeline { llm, agent_factory }
    }

    pub async fn arun(&self, question: &str) -> Result<PipelineResult> {
        let decomposition = self.decompose(question).await?;
        log::info!(
            "[PIPELINE] Decomposed into {} sub-questions",
            decomposition.sub_questions.len()
        );

        let sub_answers = self.fan_out(&decomposition.sub_questions).await?;
        let final_answer = self.synthesize(question, &sub_answers).await?;

        Ok(PipelineResult {
            original_question: question.to_string(),
            decomposition,
            sub_answers,
            final_answer,
        })
    }

    async fn decompose(&self, question: &str) -> Result<QueryDecomposition> {
        let prompt = DECOMPOSITION_PROMPT.replace("{question}", question);
        let raw = self
            .llm
            .generate_text(vec![Message::user(prompt)])
            .await
            .map_err(AgentError::Completion)?;
        parse_decomposition(&raw)
    }

    /// Launch every sub-question's agent run together and join. Results come
    /// back in sub-question order regardless of completion order. Individual
    /// failures become annotated gaps; only a fully failed fan-out aborts.
    async fn fan_out(&self, sub_questions: &[String]) -> Result<Vec<SubAnswer>> {
        let runs = sub_questions.iter().map(|sub_question| {
            let agent = (self.agent_factory)();
            let question = sub_question.clone();
            async move {
                let outcome = agent.run(&question).await;
                (question, outcome)
            }
        });

        let mut sub_answers = Vec::with_capacity(sub_questions.len());
        let mut first_error: Option<AgentError> = None;
        let mut any_succeeded = false;

        for (question, outcome) in join_all(runs).await {
            match outcome {
                Ok(result) => {
                    any_succeeded = true;
                    sub_answers.push(SubAnswer {
                        question,
                        answer: result.output,
                        failed: false,
                    });
                }
                Err(e) => {
                    log::error!("[PIPELINE] Sub-question failed: {} ({})", question, e);
                    let message = e.to_string();
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                    sub_answers.push(SubAnswer {
                        question,
                        answer: message,
                        failed: true,
                    });
                }
            }
        }

        if !any_succeeded {
            return Err(first_error
                .unwrap_or_else(|| AgentError::Tool("fan-out produced no answers".to_string())));
        }
        Ok(sub_answers)
    }

    async fn synthesize(&self, question: &str, sub_answers: &[SubAnswer]) -> Result<String> {
        let formatted = sub_answers
            .iter()
            .map(|r| {
                if r.failed {
                    format!(
                        "Q: {}\nA: [This sub-question could not be answered: {}. Treat it as a gap.]",
                        r.question, r.answer
                    )
                } else {
                    format!("Q: {}\nA: {}", r.question, r.answer)
                }
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = SYNTHESIS_PROMPT
            .replace("{original_question}", question)
            .replace("{sub_answers}", &formatted);

        self.llm
            .generate_text(vec![Message::user(prompt)])
            .await
            .map_err(AgentError::Completion)
    }
}

/// Parse the model's decomposition output against the structural contract.
/// Tries a direct parse, then a fenced code block, then the first balanced
/// JSON object. Anything that misses the schema or the 2-5 length bound is a
/// structural error — not retried.
pub fn parse_decomposition(content: &str) -> Result<QueryDecomposition> {
    let decomposition = extract_json(content).ok_or_else(|| {
        AgentError::Parse(format!(
            "decomposition output is not valid JSON: {}",
            truncate(content, 200)
        ))
    })?;

    let count = decomposition.sub_questions.len();
    if !(MIN_SUB_QUESTIONS..=MAX_SUB_QUESTIONS).contains(&count) {
        return Err(AgentError::Parse(format!(
            "expected {}-{} sub-questions, got {}",
            MIN_SUB_QUESTIONS, MAX_SUB_QUESTIONS, count
        )));
    }
    if decomposition.sub_questions.iter().any(|q| q.trim().is_empty()) {
        return Err(AgentError::Parse(
            "decomposition contains an empty sub-question".to_string(),
        ));
    }

    Ok(decomposition)
}

fn extract_json(content: &str) -> Option<QueryDecomposition> {
    let content = content.trim();

    // Direct JSON parse first
    if let Ok(parsed) = serde_json::from_str::<QueryDecomposition>(content) {
        return Some(parsed);
    }

    // JSON inside a markdown code fence
    if let Ok(pattern) = Regex::new(r"```(?:json)?\s*\n?([\s\S]*?)\n?```") {
        if let Some(captures) = pattern.captures(content) {
            if let Some(json_match) = captures.get(1) {
                if let Ok(parsed) =
                    serde_json::from_str::<QueryDecomposition>(json_match.as_str().trim())
                {
                    return Some(parsed);
                }
            }
        }
    }

    // First balanced JSON object anywhere in the content
    if let Some(start) = content.find('{') {
        let mut depth = 0;
        let mut end = start;
        for (i, c) in content[start..].char_indices() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        end = start + i + 1;
                        break;
                    }
                }
                _ => {}
            }
        }
        if end > start {
            if let Ok(parsed) = serde_json::from_str::<QueryDecomposition>(&content[start..end]) {
                return Some(parsed);
            }
        }
    }

    None
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
