use crate::core::error::Result;
use crate::core::gateway::{Content, Part, Role};
use crate::core::storage::Storage;
use crate::core::tools::history::{HISTORY_MESSAGE_LIMIT, format_history};

/// Per-request view of one conversation: a write-through cache over the
/// store. Every append is durable before it lands in the in-memory
/// transcript, so a crash mid-turn never loses acknowledged messages.
pub struct Memory {
    storage: Storage,
    user_id: String,
    convo_id: String,
    conversation: Vec<(Role, Part)>,
}

impl Memory {
    pub async fn load(storage: Storage, user_id: String, convo_id: String) -> Result<Self> {
        let conversation = storage
            .conversation(&user_id, &convo_id)
            .await?
            .into_iter()
            .map(|m| (m.role, m.part))
            .collect();
        Ok(Self {
            storage,
            user_id,
            convo_id,
            conversation,
        })
    }

    pub fn convo_id(&self) -> &str {
        &self.convo_id
    }

    pub async fn record(&mut self, role: Role, part: Part) -> Result<()> {
        self.storage
            .add_message(&self.user_id, &self.convo_id, role, &part)
            .await?;
        self.conversation.push((role, part));
        Ok(())
    }

    /// The full transcript as model contents, one content per message.
    pub fn contents(&self) -> Vec<Content> {
        self.conversation
            .iter()
            .map(|(role, part)| Content::new(*role, vec![part.clone()]))
            .collect()
    }

    /// Transcript with routing bookkeeping stripped, so earlier
    /// classifications cannot bias a new one.
    pub fn contents_excluding_router(&self) -> Vec<Content> {
        self.conversation
            .iter()
            .filter(|(_, part)| !is_router_part(part))
            .map(|(role, part)| Content::new(*role, vec![part.clone()]))
            .collect()
    }

    /// Digest of the user's recent conversations for the recall tool.
    pub async fn history(&self, last: usize) -> Result<String> {
        let conversations = self
            .storage
            .history(&self.user_id, last, HISTORY_MESSAGE_LIMIT)
            .await?;
        Ok(format_history(&conversations))
    }
}

fn is_router_part(part: &Part) -> bool {
    match part {
        Part::FunctionCall { function_call } => function_call.name == "router",
        Part::FunctionResponse { function_response } => function_response.name == "router",
        _ => false,
    }
}
