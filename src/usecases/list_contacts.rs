use crate::{domain::identity::Identity, messaging::error::ChatResult};

use super::conversation::ConversationService;

const DEFAULT_CONTACT_PAGE_SIZE: usize = 30;
const MAX_CONTACT_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListContactsQuery {
    pub limit: usize,
}

impl Default for ListContactsQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_CONTACT_PAGE_SIZE,
        }
    }
}

impl ListContactsQuery {
    fn normalized_limit(&self) -> usize {
        match self.limit {
            0 => DEFAULT_CONTACT_PAGE_SIZE,
            value if value > MAX_CONTACT_PAGE_SIZE => MAX_CONTACT_PAGE_SIZE,
            value => value,
        }
    }
}

impl ConversationService {
    /// Directory page without the current identity.
    pub fn list_contacts(&self, query: ListContactsQuery) -> ChatResult<Vec<Identity>> {
        let me = self.session.require_current()?;
        let limit = query.normalized_limit();

        let contacts: Vec<Identity> = self
            .session
            .directory()
            .list_users(limit + 1)?
            .into_iter()
            .filter(|identity| identity.id != me.id)
            .take(limit)
            .collect();

        tracing::debug!(limit, returned = contacts.len(), "contacts listed");
        Ok(contacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        messaging::{error::ChatError, transport::DeliveryReceipt},
        usecases::conversation::tests::{logged_in_service, service_with, RecordingTransport},
    };

    fn ids(contacts: &[Identity]) -> Vec<&str> {
        contacts.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn hides_the_current_identity() {
        let service =
            logged_in_service(RecordingTransport::answering(Ok(DeliveryReceipt::Accepted)));

        let contacts = service
            .list_contacts(ListContactsQuery::default())
            .expect("contacts");

        assert_eq!(ids(&contacts), ["bob", "carol"]);
    }

    #[test]
    fn limit_counts_contacts_not_directory_rows() {
        let service =
            logged_in_service(RecordingTransport::answering(Ok(DeliveryReceipt::Accepted)));

        let contacts = service
            .list_contacts(ListContactsQuery { limit: 1 })
            .expect("contacts");

        assert_eq!(ids(&contacts), ["bob"]);
    }

    #[test]
    fn normalizes_limits() {
        assert_eq!(ListContactsQuery { limit: 0 }.normalized_limit(), 30);
        assert_eq!(ListContactsQuery { limit: 7 }.normalized_limit(), 7);
        assert_eq!(ListContactsQuery { limit: 1_000 }.normalized_limit(), 100);
    }

    #[test]
    fn requires_login() {
        let service = service_with(RecordingTransport::answering(Ok(DeliveryReceipt::Accepted)));

        let err = service
            .list_contacts(ListContactsQuery::default())
            .expect_err("must require login");

        assert!(matches!(err, ChatError::Unauthorized { .. }));
    }
}
