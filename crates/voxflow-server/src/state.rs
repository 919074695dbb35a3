//! Shared application state

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use voxflow_config::Settings;
use voxflow_core::Assistant;

/// Assistant configuration lookup. The core only reads assistants; where
/// they live is a deployment concern.
pub trait AssistantStore: Send + Sync {
    fn get(&self, id: u64) -> Option<Assistant>;
}

/// Process-local assistant store, seeded at boot
#[derive(Default)]
pub struct InMemoryAssistantStore {
    assistants: RwLock<HashMap<u64, Assistant>>,
}

impl InMemoryAssistantStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, assistant: Assistant) {
        self.assistants.write().insert(assistant.id, assistant);
    }

    pub fn load_all(&self, assistants: Vec<Assistant>) {
        let mut map = self.assistants.write();
        for assistant in assistants {
            map.insert(assistant.id, assistant);
        }
    }

    pub fn len(&self) -> usize {
        self.assistants.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.assistants.read().is_empty()
    }
}

impl AssistantStore for InMemoryAssistantStore {
    fn get(&self, id: u64) -> Option<Assistant> {
        self.assistants.read().get(&id).cloned()
    }
}

/// State shared by every route handler
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub assistants: Arc<dyn AssistantStore>,
    conversation_seq: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(settings: Arc<Settings>, assistants: Arc<dyn AssistantStore>) -> Self {
        Self {
            settings,
            assistants,
            conversation_seq: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Allocate the next conversation id
    pub fn next_conversation_id(&self) -> u64 {
        self.conversation_seq.fetch_add(1, Ordering::SeqCst)
    }
}
