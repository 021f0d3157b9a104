use chrono::{DateTime, Utc};

use crate::{
    domain::conversation::ConversationKey,
    messaging::{error::ChatResult, store::HistoryPage},
};

use super::conversation::ConversationService;

const MAX_HISTORY_PAGE_SIZE: usize = 200;

/// History request. A zero limit means the configured page size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    pub limit: usize,
    pub before: Option<DateTime<Utc>>,
}

impl HistoryQuery {
    pub fn latest(limit: usize) -> Self {
        Self {
            limit,
            before: None,
        }
    }

    pub fn before(mut self, before: DateTime<Utc>) -> Self {
        self.before = Some(before);
        self
    }

    fn normalized_limit(&self, default: usize) -> usize {
        match self.limit {
            0 => default.min(MAX_HISTORY_PAGE_SIZE),
            value if value > MAX_HISTORY_PAGE_SIZE => MAX_HISTORY_PAGE_SIZE,
            value => value,
        }
    }
}

impl ConversationService {
    pub fn load_history(
        &self,
        key: &ConversationKey,
        query: HistoryQuery,
    ) -> ChatResult<HistoryPage> {
        self.authorize(key)?;

        let limit = query.normalized_limit(self.page_size);
        let page = self.store.history(key, limit, query.before)?;
        tracing::debug!(conversation = %key, limit, returned = page.len(), "history loaded");
        Ok(page)
    }
}
