use async_trait::async_trait;
use std::time::Duration;

use crate::{
    conversation::{Answers, Choice, ConversationStep},
    error::Result,
};

pub const DEFAULT_STEP_DELAY: Duration = Duration::from_millis(700);
pub const ANALYZING_MESSAGE: &str =
    "Thanks, that's everything I need. Analyzing your answers and drafting the result...";

/// What the conversation needs next from the assistant
#[derive(Debug, Clone)]
pub enum MessageRequest {
    /// Reaction to the answer just given to `step`
    FollowUp { step: ConversationStep, choice: Choice },
    /// The question for the step at `index`
    Prompt { index: usize, step: ConversationStep },
    /// Shown once after the last answer
    Analyzing,
    /// Last call before the final document is produced
    Finalizing { answers: Answers },
}

/// Produces the assistant's side of a scripted conversation.
///
/// Returning `None` means "nothing to add to the transcript". Any time an implementation
/// spends before returning is the "thinking" the user sees.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Identifier used in logs
    fn id(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn next_message(&self, request: MessageRequest) -> Result<Option<String>>;
}

/// Plays back the canned texts of the script after a fixed delay
#[derive(Debug, Clone)]
pub struct ScriptedExecutor {
    delay: Duration,
    analyzing_message: String,
}

impl ScriptedExecutor {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            analyzing_message: ANALYZING_MESSAGE.to_string(),
        }
    }

    /// No delay at all, for tests and batch use
    pub fn instant() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn with_analyzing_message(mut self, message: impl Into<String>) -> Self {
        self.analyzing_message = message.into();
        self
    }
}

impl Default for ScriptedExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_STEP_DELAY)
    }
}

#[async_trait]
impl StepExecutor for ScriptedExecutor {
    async fn next_message(&self, request: MessageRequest) -> Result<Option<String>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let message = match request {
            MessageRequest::FollowUp { step, choice } => step.follow_up(choice).map(str::to_string),
            MessageRequest::Prompt { step, .. } => Some(step.prompt),
            MessageRequest::Analyzing => Some(self.analyzing_message.clone()),
            MessageRequest::Finalizing { .. } => None,
        };
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step() -> ConversationStep {
        ConversationStep::new("Protect the web tier with AWS WAF?").on_yes("Adding AWS WAF.")
    }

    #[tokio::test]
    async fn test_scripted_messages() {
        let executor = ScriptedExecutor::instant();

        let yes = executor
            .next_message(MessageRequest::FollowUp {
                step: step(),
                choice: Choice::Yes,
            })
            .await
            .unwrap();
        assert_eq!(yes.as_deref(), Some("Adding AWS WAF."));

        let no = executor
            .next_message(MessageRequest::FollowUp {
                step: step(),
                choice: Choice::No,
            })
            .await
            .unwrap();
        assert!(no.is_none());

        let prompt = executor
            .next_message(MessageRequest::Prompt { index: 2, step: step() })
            .await
            .unwrap();
        assert_eq!(prompt.as_deref(), Some("Protect the web tier with AWS WAF?"));

        let finalizing = executor
            .next_message(MessageRequest::Finalizing {
                answers: Answers::new(),
            })
            .await
            .unwrap();
        assert!(finalizing.is_none());
    }

    #[tokio::test]
    async fn test_custom_analyzing_message() {
        let executor = ScriptedExecutor::instant().with_analyzing_message("Crunching...");
        let message = executor.next_message(MessageRequest::Analyzing).await.unwrap();
        assert_eq!(message.as_deref(), Some("Crunching..."));
        assert!(executor.id().ends_with("ScriptedExecutor"));
    }
}
