//! Deployment behaviors: greeting, idle prompts, session cap, error path

use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info, warn};

use voxflow_core::packet::Action;
use voxflow_core::{Actor, Communication, DeploymentBehavior, Packet};
use voxflow_text::render_template;

use crate::runtime::ConversationRuntime;

const DEFAULT_IDLE_PROMPT: &str = "Are you still there?";
const DEFAULT_MISTAKE: &str = "Oops! It looks like something went wrong. Let me look into that \
    for you right away. I really appreciate your patience, hang tight while I get this sorted!";

fn minutes(value: f64) -> Duration {
    Duration::from_secs_f64(value * 60.0)
}

impl ConversationRuntime {
    /// Behavior for this conversation's source, if the source is deployed
    pub(crate) fn behavior(&self) -> Option<DeploymentBehavior> {
        let comm = self.comm();
        comm.assistant()
            .behavior(comm.conversation().source)
            .cloned()
    }

    /// Run the conversation-start behaviors: greeting, idle timer, session
    /// cap
    pub(crate) async fn initialize_behavior(&self) {
        let Some(behavior) = self.behavior() else {
            debug!("deployment not configured for source, skipping behaviors");
            return;
        };

        if let Some(greeting) = &behavior.greeting {
            let text = render_template(greeting, self.comm().args());
            if !text.trim().is_empty() {
                // The greeting opens a fresh turn so its audio is attributed
                // to a live context
                let message = self.messaging().begin(Actor::User, "");
                self.dispatch(Packet::Static {
                    context_id: message.id,
                    text,
                });
            }
        }

        if behavior.idle_timeout_minutes.unwrap_or(0.0) > 0.0 {
            self.arm_idle_timer();
        }

        if let Some(max_minutes) = behavior.max_session_minutes.filter(|m| *m > 0.0) {
            let weak = self.weak();
            let token = self.cancel_token();
            let duration = minutes(max_minutes);
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(duration) => {
                        let Some(runtime) = weak.upgrade() else { return };
                        info!("max session duration reached");
                        runtime.dispatch(Packet::LlmTool {
                            context_id: runtime.context_or_conversation(),
                            action: Action::EndConversation,
                            name: None,
                            result: None,
                        });
                    }
                }
            });
        }
    }

    /// Arm (or re-arm) the idle timer; a newer arming invalidates any
    /// pending firing through the generation counter.
    pub(crate) fn arm_idle_timer(&self) {
        let Some(behavior) = self.behavior() else { return };
        let Some(timeout) = behavior.idle_timeout_minutes.filter(|t| *t > 0.0) else {
            return;
        };

        let generation = self.idle_generation().fetch_add(1, Ordering::SeqCst) + 1;
        let weak = self.weak();
        let token = self.cancel_token();
        let duration = minutes(timeout);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(duration) => {
                    let Some(runtime) = weak.upgrade() else { return };
                    if runtime.idle_generation().load(Ordering::SeqCst) != generation {
                        return;
                    }
                    runtime.on_idle_timeout().await;
                }
            }
        });
    }

    /// Any activity re-arms the idle timer; user activity also resets the
    /// prompt backoff when the behavior says so.
    pub(crate) fn touch_idle(&self, user_activity: bool) {
        let Some(behavior) = self.behavior() else { return };
        if behavior.idle_timeout_minutes.unwrap_or(0.0) <= 0.0 {
            return;
        }
        if user_activity && behavior.idle_backoff_reset {
            *self.idle_count().lock() = 0;
        }
        self.arm_idle_timer();
    }

    /// The idle window elapsed with no activity
    pub(crate) async fn on_idle_timeout(&self) {
        let Some(behavior) = self.behavior() else { return };
        if behavior.idle_timeout_minutes.unwrap_or(0.0) <= 0.0 {
            return;
        }

        let backoff = behavior.idle_backoff_count.unwrap_or(0);
        let count = *self.idle_count().lock();
        if backoff > 0 && count >= backoff {
            info!(count, "idle backoff exhausted, ending conversation");
            self.dispatch(Packet::LlmTool {
                context_id: self.context_or_conversation(),
                action: Action::EndConversation,
                name: None,
                result: None,
            });
            return;
        }

        *self.idle_count().lock() = count + 1;
        let text = match &behavior.idle_timeout_message {
            Some(template) if !template.trim().is_empty() => {
                render_template(template, self.comm().args())
            }
            _ => DEFAULT_IDLE_PROMPT.to_string(),
        };
        if text.trim().is_empty() {
            warn!("empty idle timeout message");
            return;
        }
        self.dispatch(Packet::Static {
            context_id: self.context_or_conversation(),
            text,
        });
        self.arm_idle_timer();
    }

    /// The error path: speak the configured mistake template (or the default
    /// apology) as a completed assistant message. The state machine is left
    /// alone.
    pub(crate) async fn on_error(&self, message_id: &str) {
        let text = match self.behavior().and_then(|b| b.mistake) {
            Some(template) => render_template(&template, self.comm().args()),
            None => DEFAULT_MISTAKE.to_string(),
        };
        self.comm()
            .record_event("assistant_error", json!({ "message_id": message_id }))
            .await;
        self.dispatch(Packet::Static {
            context_id: message_id.to_string(),
            text,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minutes_supports_fractions() {
        assert_eq!(minutes(0.05), Duration::from_secs(3));
        assert_eq!(minutes(2.0), Duration::from_secs(120));
    }

    #[test]
    fn test_default_texts() {
        assert_eq!(DEFAULT_IDLE_PROMPT, "Are you still there?");
        assert!(DEFAULT_MISTAKE.starts_with("Oops!"));
    }
}
