//! Retrieval-augmented query engine

use std::sync::Arc;
use std::time::Duration;

use crate::config::RagConfig;
use crate::conversation::{ConversationState, Role};
use crate::error::{Error, Result};
use crate::generation::PromptBuilder;
use crate::providers::{with_timeout, LlmProvider};
use crate::retrieval::VectorIndex;

/// Answer returned when generation fails for any reason
pub const FALLBACK_ANSWER: &str = "I encountered an error processing your request.";

/// Tunables for a [`QueryEngine`]
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Chunks retrieved per question
    pub top_k: usize,
    /// Character budget for the context block
    pub max_context_chars: usize,
    /// Most recent turns included in the prompt
    pub max_history_turns: usize,
    /// Generation temperature
    pub temperature: f32,
    /// Bound on the generation call
    pub timeout: Duration,
}

impl EngineSettings {
    pub fn from_config(config: &RagConfig) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            max_context_chars: config.retrieval.max_context_chars,
            max_history_turns: config.retrieval.max_history_turns,
            temperature: config.llm.temperature,
            timeout: config.llm.timeout(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&RagConfig::default())
    }
}

/// Answers questions from indexed documents and the running conversation
///
/// Stateless between calls apart from the index and the conversation it is
/// given. Each call makes at most one embedding and one generation request.
#[derive(Clone)]
pub struct QueryEngine {
    index: VectorIndex,
    llm: Arc<dyn LlmProvider>,
    conversation: Arc<ConversationState>,
    settings: EngineSettings,
}

impl QueryEngine {
    /// Create an engine with its own default conversation
    pub fn new(index: VectorIndex, llm: Arc<dyn LlmProvider>, settings: EngineSettings) -> Self {
        Self::with_conversation(index, llm, settings, Arc::new(ConversationState::new()))
    }

    /// Create an engine whose default conversation is `conversation`
    pub fn with_conversation(
        index: VectorIndex,
        llm: Arc<dyn LlmProvider>,
        settings: EngineSettings,
        conversation: Arc<ConversationState>,
    ) -> Self {
        Self {
            index,
            llm,
            conversation,
            settings,
        }
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn llm(&self) -> &Arc<dyn LlmProvider> {
        &self.llm
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// The engine's default conversation
    pub fn conversation(&self) -> &Arc<ConversationState> {
        &self.conversation
    }

    /// Answer `question` within the default conversation
    pub async fn answer(&self, question: &str) -> Result<String> {
        self.answer_with(&self.conversation, question).await
    }

    /// Answer `question` within `conversation`
    ///
    /// Only [`Error::InvalidInput`] and non-model failures of the index are
    /// returned as errors. Model failures yield [`FALLBACK_ANSWER`] and leave
    /// the conversation untouched.
    pub async fn answer_with(&self, conversation: &ConversationState, question: &str) -> Result<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::invalid_input("question must not be empty"));
        }

        let chunks = match self.index.search(question, self.settings.top_k).await {
            Ok(chunks) => chunks,
            Err(Error::IndexEmpty) => {
                tracing::info!("Index is empty, answering without document context");
                Vec::new()
            }
            Err(e) if e.is_recoverable() => {
                tracing::warn!("Retrieval failed, returning fallback answer: {}", e);
                return Ok(FALLBACK_ANSWER.to_string());
            }
            Err(e) => return Err(e),
        };
        let context = PromptBuilder::build_context(&chunks, self.settings.max_context_chars);

        // held until both turns are appended
        let mut log = conversation.lock().await;
        let history = log.render_history(self.settings.max_history_turns);
        let prompt = PromptBuilder::build_rag_prompt(&context, &history, question);

        tracing::debug!(
            "Generating with {} ({} chunks, {} prompt chars)",
            self.llm.model(),
            chunks.len(),
            prompt.len()
        );

        let generation = with_timeout(
            self.settings.timeout,
            "Generation",
            self.llm.generate(&prompt, self.settings.temperature),
        )
        .await;

        match generation {
            Ok(generation) => {
                let response = generation.text.trim().to_string();
                log.append(Role::User, question);
                log.append(Role::Assistant, response.clone());
                Ok(response)
            }
            Err(e) => {
                tracing::warn!("Generation failed via {}: {}", self.llm.name(), e);
                Ok(FALLBACK_ANSWER.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::prompt::NO_CONTEXT_NOTICE;
    use crate::testing::{index_with, memory_index, EchoLlm, FailingEmbedder, FailingLlm, SlowLlm};
    use crate::types::Chunk;

    fn engine(llm: Arc<dyn LlmProvider>) -> QueryEngine {
        QueryEngine::new(memory_index(), llm, EngineSettings::default())
    }

    #[tokio::test]
    async fn test_rejects_empty_question() {
        let engine = engine(Arc::new(EchoLlm::default()));
        assert!(matches!(engine.answer("").await, Err(Error::InvalidInput(_))));
        assert!(matches!(engine.answer("   \n").await, Err(Error::InvalidInput(_))));
        assert_eq!(engine.conversation().len().await, 0);
    }

    #[tokio::test]
    async fn test_empty_index_still_answers() {
        let llm = Arc::new(EchoLlm::default());
        let engine = engine(llm.clone());

        let answer = engine.answer("Is anything uploaded?").await.unwrap();
        assert!(answer.contains(NO_CONTEXT_NOTICE));
        assert_eq!(llm.prompts.lock().len(), 1);
        assert_eq!(engine.conversation().len().await, 2);
    }

    #[tokio::test]
    async fn test_answer_uses_retrieved_context() {
        let engine = engine(Arc::new(EchoLlm::default()));
        engine
            .index()
            .add(vec![Chunk::new("sky.txt", "The sky is blue", 0, 0, 15)])
            .await
            .unwrap();

        let answer = engine.answer("What color is the sky?").await.unwrap();
        assert!(answer.contains("The sky is blue"));
        // echo output is trimmed
        assert_eq!(answer, answer.trim());

        let turns = engine.conversation().turns().await;
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].text, "What color is the sky?");
        assert_eq!(turns[1].role, Role::Assistant);
        assert_eq!(turns[1].text, answer);
    }

    #[tokio::test]
    async fn test_history_reaches_next_prompt() {
        let llm = Arc::new(EchoLlm::default());
        let engine = engine(llm.clone());

        engine.answer("first question").await.unwrap();
        engine.answer("second question").await.unwrap();

        let prompts = llm.prompts.lock();
        assert!(prompts[1].contains("User: first question"));
        assert!(!prompts[0].contains("User: first question"));
    }

    #[tokio::test]
    async fn test_model_failure_falls_back() {
        let engine = engine(Arc::new(FailingLlm));
        let answer = engine.answer("Will this work?").await.unwrap();
        assert_eq!(answer, FALLBACK_ANSWER);
        assert_eq!(engine.conversation().len().await, 0);
    }

    #[tokio::test]
    async fn test_model_timeout_falls_back() {
        let settings = EngineSettings {
            timeout: Duration::from_millis(50),
            ..EngineSettings::default()
        };
        let engine = QueryEngine::new(
            memory_index(),
            Arc::new(SlowLlm {
                delay: Duration::from_secs(5),
            }),
            settings,
        );

        assert_eq!(engine.answer("Slow?").await.unwrap(), FALLBACK_ANSWER);
        assert_eq!(engine.conversation().len().await, 0);
    }

    #[tokio::test]
    async fn test_embedding_failure_falls_back() {
        let index = memory_index();
        index
            .add(vec![Chunk::new("a.txt", "alpha", 0, 0, 5)])
            .await
            .unwrap();
        let broken = VectorIndex::new(
            Arc::new(FailingEmbedder),
            Arc::clone(index.store()),
            Duration::from_secs(1),
        );
        let engine = QueryEngine::new(broken, Arc::new(EchoLlm::default()), EngineSettings::default());

        assert_eq!(engine.answer("alpha?").await.unwrap(), FALLBACK_ANSWER);
    }

    #[tokio::test]
    async fn test_embedding_width_change_falls_back() {
        let index = memory_index();
        index
            .add(vec![Chunk::new("a.txt", "alpha", 0, 0, 5)])
            .await
            .unwrap();
        let narrower = VectorIndex::new(
            Arc::new(crate::testing::StubEmbedder::new(16)),
            Arc::clone(index.store()),
            Duration::from_secs(1),
        );
        let llm = Arc::new(EchoLlm::default());
        let engine = QueryEngine::new(narrower, llm.clone(), EngineSettings::default());

        assert_eq!(engine.answer("alpha?").await.unwrap(), FALLBACK_ANSWER);
        assert!(llm.prompts.lock().is_empty());
        assert_eq!(engine.conversation().len().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_answers_keep_pairs_together() {
        let engine = QueryEngine::new(
            index_with(Arc::new(crate::testing::StubEmbedder::new(16))),
            Arc::new(EchoLlm::default()),
            EngineSettings::default(),
        );

        let mut handles = Vec::new();
        for i in 0..10 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine.answer(&format!("question number {}", i)).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let turns = engine.conversation().turns().await;
        assert_eq!(turns.len(), 20);
        for (i, pair) in turns.chunks(2).enumerate() {
            assert_eq!(pair[0].turn_index, 2 * i as u64);
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Assistant);
            assert!(pair[1].text.contains(&format!("QUESTION: {}", pair[0].text)));
        }
    }

    #[tokio::test]
    async fn test_separate_conversations() {
        let engine = engine(Arc::new(EchoLlm::default()));
        let other = ConversationState::new();

        engine.answer("in default").await.unwrap();
        let answer = engine.answer_with(&other, "in other").await.unwrap();

        assert!(!answer.contains("User: in default"));
        assert_eq!(other.len().await, 2);
        assert_eq!(engine.conversation().len().await, 2);
    }
}
