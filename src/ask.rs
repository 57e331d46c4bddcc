//! `gw ask`: retrieve, build the grounded prompt, generate.

use anyhow::{bail, Result};

use groundwork_core::index::VectorIndex;
use groundwork_core::models::Retrieved;
use groundwork_core::store::IndexStore;

use crate::config::Config;
use crate::generate::{Completion, GenerationParams, GenerationService, OpenAiCompatClient};
use crate::prompt::{build_messages, format_context, load_system_prompt, AnswerStyle};
use crate::retrieve::open_index;

#[derive(Debug)]
pub struct Answer {
    pub completion: Completion,
    /// The passages the prompt was grounded on.
    pub passages: Vec<Retrieved>,
}

/// Answer `question` from the top `k` passages of `collection`.
#[allow(clippy::too_many_arguments)]
pub async fn answer<S: IndexStore>(
    index: &VectorIndex<S>,
    generator: &dyn GenerationService,
    collection: &str,
    question: &str,
    k: usize,
    style: AnswerStyle,
    system_prompt: &str,
    params: &GenerationParams,
) -> Result<Answer> {
    let question = question.trim();
    if question.is_empty() {
        bail!("Please type a question first.");
    }

    let passages = index.query(collection, question, k).await?;
    if passages.is_empty() {
        tracing::info!(collection, "no grounding context retrieved");
    }

    let messages = build_messages(question, style, &passages, system_prompt);
    let completion = generator.complete(&messages, params).await?;
    Ok(Answer {
        completion,
        passages,
    })
}

pub async fn run_ask(
    config: &Config,
    question: &str,
    style: AnswerStyle,
    show_usage: bool,
    show_sources: bool,
) -> Result<()> {
    let generator = OpenAiCompatClient::from_config(&config.generation)?;
    let system_prompt = load_system_prompt(&config.generation.system_prompt_path);
    let params = GenerationParams::from(&config.generation);

    let index = open_index(config).await?;
    let result = answer(
        &index,
        &generator,
        &config.index.collection,
        question,
        config.retrieval.top_k,
        style,
        &system_prompt,
        &params,
    )
    .await;
    index.store().close().await;
    let answer = result?;

    println!("{}", answer.completion.text.trim());

    if show_sources {
        println!();
        println!("Sources:");
        if answer.passages.is_empty() {
            println!("  No context retrieved.");
        } else {
            println!("{}", format_context(&answer.passages));
        }
    }

    if show_usage {
        if let Some(usage) = answer.completion.usage {
            println!();
            println!(
                "Tokens — prompt: {}, completion: {}, total: {}",
                usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::GenerationError;
    use crate::prompt::{ChatMessage, Role};
    use async_trait::async_trait;
    use groundwork_core::embedding::HashEmbedder;
    use groundwork_core::models::Chunk;
    use groundwork_core::store::memory::InMemoryStore;
    use std::sync::{Arc, Mutex};

    /// Echoes the user message back and remembers what it was sent.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<ChatMessage>>,
    }

    #[async_trait]
    impl GenerationService for Recorder {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            _params: &GenerationParams,
        ) -> Result<Completion, GenerationError> {
            self.seen.lock().unwrap().extend_from_slice(messages);
            Ok(Completion {
                text: "The sky is blue.".to_string(),
                usage: None,
            })
        }
    }

    fn params() -> GenerationParams {
        GenerationParams {
            model: "test".to_string(),
            temperature: 0.2,
            max_tokens: 64,
        }
    }

    async fn sky_index() -> VectorIndex<InMemoryStore> {
        let index = VectorIndex::new(InMemoryStore::new(), Arc::new(HashEmbedder::default()));
        let chunks = vec![
            Chunk {
                id: "a.txt-0".to_string(),
                content: "The sky is blue".to_string(),
                source: "a.txt".to_string(),
                hash: String::new(),
            },
            Chunk {
                id: "b.txt-0".to_string(),
                content: "Bananas are yellow".to_string(),
                source: "b.txt".to_string(),
                hash: String::new(),
            },
        ];
        index.rebuild("kb", &chunks).await.unwrap();
        index
    }

    #[tokio::test]
    async fn test_answer_grounds_prompt_on_retrieved_passages() {
        let index = sky_index().await;
        let recorder = Recorder::default();
        let answer = answer(
            &index,
            &recorder,
            "kb",
            "sky color",
            1,
            AnswerStyle::Concise,
            "Be brief.",
            &params(),
        )
        .await
        .unwrap();

        assert_eq!(answer.completion.text, "The sky is blue.");
        assert_eq!(answer.passages.len(), 1);
        assert_eq!(answer.passages[0].source, "a.txt");

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen[1].role, Role::User);
        assert!(seen[1].content.contains("[Source: a.txt]\nThe sky is blue"));
        assert!(!seen[1].content.contains("Bananas"));
    }

    #[tokio::test]
    async fn test_answer_without_collection_uses_no_context() {
        let index = VectorIndex::new(InMemoryStore::new(), Arc::new(HashEmbedder::default()));
        let recorder = Recorder::default();
        let answer = answer(
            &index,
            &recorder,
            "kb",
            "anything",
            4,
            AnswerStyle::Detailed,
            "x",
            &params(),
        )
        .await
        .unwrap();

        assert!(answer.passages.is_empty());
        let seen = recorder.seen.lock().unwrap();
        assert!(seen[1].content.contains("# Context\nNo relevant context."));
    }

    #[tokio::test]
    async fn test_blank_question_rejected() {
        let index = sky_index().await;
        let recorder = Recorder::default();
        let err = answer(
            &index,
            &recorder,
            "kb",
            "   ",
            4,
            AnswerStyle::Concise,
            "x",
            &params(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Please type a question"));
        assert!(recorder.seen.lock().unwrap().is_empty());
    }
}
