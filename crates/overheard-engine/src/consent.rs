use std::sync::Arc;

use overheard_crypto::policy::Policy;
use overheard_db::Database;
use overheard_types::models::UserId;

use crate::{WorkflowError, blocking};

/// Per-user acceptance of the policy currently in force.
pub struct ConsentStore {
    db: Arc<Database>,
    policy: Policy,
}

impl ConsentStore {
    pub fn new(db: Arc<Database>, policy: Policy) -> Self {
        Self { db, policy }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// True iff the latest decision is an accept of the current policy hash.
    pub async fn is_allowed(&self, user_id: UserId) -> Result<bool, WorkflowError> {
        let record = blocking(&self.db, move |db| db.get_consent(user_id)).await?;
        Ok(record.is_some_and(|r| r.allows(&self.policy.hash)))
    }

    /// Upsert; history is not retained.
    pub async fn record_decision(
        &self,
        user_id: UserId,
        accepted: bool,
        policy_hash: &str,
    ) -> Result<(), WorkflowError> {
        let policy_hash = policy_hash.to_string();
        blocking(&self.db, move |db| {
            db.upsert_consent(user_id, accepted, &policy_hash)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(text: &str, db: Arc<Database>) -> ConsentStore {
        ConsentStore::new(db, Policy::from_text(text))
    }

    #[tokio::test]
    async fn allowed_only_after_matching_accept() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let consent = store("v1", db);
        let hash = consent.policy().hash.clone();

        assert!(!consent.is_allowed(1).await.unwrap());
        consent.record_decision(1, false, &hash).await.unwrap();
        assert!(!consent.is_allowed(1).await.unwrap());
        consent.record_decision(1, true, &hash).await.unwrap();
        assert!(consent.is_allowed(1).await.unwrap());
        assert!(!consent.is_allowed(2).await.unwrap());
    }

    #[tokio::test]
    async fn policy_edit_regates_everyone() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let before = store("v1", db.clone());
        let hash = before.policy().hash.clone();
        before.record_decision(1, true, &hash).await.unwrap();
        assert!(before.is_allowed(1).await.unwrap());

        let after = store("v1, amended", db);
        assert!(!after.is_allowed(1).await.unwrap());
    }
}
