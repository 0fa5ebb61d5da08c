//! Label lookup, lazy creation and application
use crate::client::GmailClient;
use crate::error::{LabelerError, Result};
use crate::models::{LabelType, Message};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Gmail's reserved label id for the inbox view
pub const INBOX_LABEL_ID: &str = "INBOX";

const SYSTEM_LABEL_IDS: &[&str] = &[
    "INBOX",
    "SPAM",
    "TRASH",
    "UNREAD",
    "STARRED",
    "IMPORTANT",
    "SENT",
    "DRAFT",
    "CHAT",
];

/// Whether `id` is one of Gmail's reserved label ids
pub fn is_system_label_id(id: &str) -> bool {
    SYSTEM_LABEL_IDS.contains(&id) || id.starts_with("CATEGORY_")
}

/// Run-scoped view of the mailbox label store
///
/// The snapshot is read once by [`load_existing_labels`](Self::load_existing_labels)
/// and only extended locally when a label is created. Two runs against the
/// same mailbox can still race to create the same label.
pub struct LabelManager {
    client: Box<dyn GmailClient>,
    label_cache: HashMap<String, String>, // lowercase name -> id
    user_label_ids: HashSet<String>,
    known_label_ids: HashSet<String>,
    created_labels: Vec<String>,
}

impl LabelManager {
    pub fn new(client: Box<dyn GmailClient>) -> Self {
        Self {
            client,
            label_cache: HashMap::new(),
            user_label_ids: HashSet::new(),
            known_label_ids: HashSet::new(),
            created_labels: Vec::new(),
        }
    }

    /// Loads all existing labels from Gmail into the cache
    pub async fn load_existing_labels(&mut self) -> Result<usize> {
        let labels = self.client.list_labels().await?;
        let count = labels.len();

        for label in labels {
            if label.label_type == LabelType::User {
                self.user_label_ids.insert(label.id.clone());
            }
            self.known_label_ids.insert(label.id.clone());
            self.label_cache.insert(label.name.to_lowercase(), label.id);
        }

        info!(
            "Loaded {} existing labels ({} user labels)",
            count,
            self.user_label_ids.len()
        );
        Ok(count)
    }

    /// Case-insensitive lookup without touching the mailbox
    pub fn label_id(&self, name: &str) -> Option<&str> {
        self.label_cache.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Id of the label named `category`, creating it on first use
    pub async fn ensure_label(&mut self, category: &str) -> Result<String> {
        if let Some(id) = self.label_id(category) {
            debug!("Label '{}' already exists in cache", category);
            return Ok(id.to_string());
        }

        info!("Creating label: {}", category);
        let label_id = match self.client.create_label(category).await {
            Ok(id) => id,
            Err(LabelerError::Conflict(_)) => return self.adopt_existing_label(category).await,
            Err(e) => {
                return Err(LabelerError::LabelError(format!(
                    "Failed to create label '{}': {}",
                    category, e
                )))
            }
        };

        self.label_cache
            .insert(category.to_lowercase(), label_id.clone());
        self.user_label_ids.insert(label_id.clone());
        self.known_label_ids.insert(label_id.clone());
        self.created_labels.push(label_id.clone());

        info!("Created label '{}' with ID: {}", category, label_id);
        Ok(label_id)
    }

    /// Gmail already has a label with this name (created by an earlier timed-out
    /// call or another run): refresh the snapshot and use its id
    async fn adopt_existing_label(&mut self, category: &str) -> Result<String> {
        warn!(
            "Label '{}' already exists in Gmail, reloading labels",
            category
        );
        self.load_existing_labels().await?;

        self.label_id(category).map(str::to_string).ok_or_else(|| {
            LabelerError::LabelError(format!(
                "Label '{}' reported as existing but not found in label list",
                category
            ))
        })
    }

    /// Attach `label_id` and move the message out of the inbox in one update
    pub async fn apply(&self, message_id: &str, label_id: &str) -> Result<()> {
        self.client
            .modify_message(
                message_id,
                &[label_id.to_string()],
                &[INBOX_LABEL_ID.to_string()],
            )
            .await?;
        debug!("Applied label {} to message {}", label_id, message_id);
        Ok(())
    }

    /// True if the message carries any label outside Gmail's reserved set
    ///
    /// Ids missing from the snapshot count as user labels unless they look
    /// like system ids.
    pub fn has_user_label(&self, message: &Message) -> bool {
        message.label_ids.iter().any(|id| {
            self.user_label_ids.contains(id)
                || (!self.known_label_ids.contains(id) && !is_system_label_id(id))
        })
    }

    /// Ids of labels created during this run
    pub fn created_labels(&self) -> &[String] {
        &self.created_labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LabelInfo;
    use async_trait::async_trait;
    use mockall::predicate::*;

    mockall::mock! {
        pub TestGmailClient {}

        #[async_trait]
        impl crate::client::GmailClient for TestGmailClient {
            async fn list_message_ids(&self, query: &str, limit: usize) -> Result<Vec<String>>;
            async fn get_message(&self, id: &str) -> Result<Message>;
            async fn list_labels(&self) -> Result<Vec<LabelInfo>>;
            async fn create_label(&self, name: &str) -> Result<String>;
            async fn modify_message(&self, id: &str, add: &[String], remove: &[String]) -> Result<()>;
        }
    }

    fn label(id: &str, name: &str, label_type: LabelType) -> LabelInfo {
        LabelInfo {
            id: id.to_string(),
            name: name.to_string(),
            label_type,
        }
    }

    fn snapshot() -> Vec<LabelInfo> {
        vec![
            label("INBOX", "INBOX", LabelType::System),
            label("UNREAD", "UNREAD", LabelType::System),
            label("CATEGORY_PROMOTIONS", "CATEGORY_PROMOTIONS", LabelType::System),
            label("Label_1", "Work", LabelType::User),
            label("Label_2", "Receipts/2024", LabelType::User),
        ]
    }

    fn message_with(labels: &[&str]) -> Message {
        Message::new("m1", None, "", None).with_labels(labels.iter().map(|l| l.to_string()).collect())
    }

    #[test]
    fn test_system_label_ids() {
        assert!(is_system_label_id("INBOX"));
        assert!(is_system_label_id("UNREAD"));
        assert!(is_system_label_id("CATEGORY_UPDATES"));
        assert!(!is_system_label_id("Label_42"));
    }

    #[tokio::test]
    async fn test_load_existing_labels_case_insensitive() {
        let mut mock_client = MockTestGmailClient::new();
        mock_client
            .expect_list_labels()
            .times(1)
            .returning(|| Ok(snapshot()));

        let mut manager = LabelManager::new(Box::new(mock_client));
        assert_eq!(manager.load_existing_labels().await.unwrap(), 5);
        assert_eq!(manager.label_id("work"), Some("Label_1"));
        assert_eq!(manager.label_id("WORK"), Some("Label_1"));
        assert_eq!(manager.label_id("Finance"), None);
    }

    #[tokio::test]
    async fn test_ensure_label_reuses_existing() {
        let mut mock_client = MockTestGmailClient::new();
        mock_client.expect_list_labels().returning(|| Ok(snapshot()));
        mock_client.expect_create_label().times(0);

        let mut manager = LabelManager::new(Box::new(mock_client));
        manager.load_existing_labels().await.unwrap();

        assert_eq!(manager.ensure_label("Work").await.unwrap(), "Label_1");
        assert!(manager.created_labels().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_label_creates_once() {
        let mut mock_client = MockTestGmailClient::new();
        mock_client.expect_list_labels().returning(|| Ok(snapshot()));
        mock_client
            .expect_create_label()
            .with(eq("Finance"))
            .times(1)
            .returning(|_| Ok("Label_99".to_string()));

        let mut manager = LabelManager::new(Box::new(mock_client));
        manager.load_existing_labels().await.unwrap();

        let first = manager.ensure_label("Finance").await.unwrap();
        let second = manager.ensure_label("Finance").await.unwrap();
        assert_eq!(first, "Label_99");
        assert_eq!(first, second);
        assert_eq!(manager.created_labels(), &["Label_99".to_string()]);
    }

    #[tokio::test]
    async fn test_ensure_label_create_failure() {
        let mut mock_client = MockTestGmailClient::new();
        mock_client
            .expect_create_label()
            .returning(|_| Err(LabelerError::Forbidden("HTTP 403".to_string())));

        let mut manager = LabelManager::new(Box::new(mock_client));
        let err = manager.ensure_label("Finance").await.unwrap_err();
        assert!(matches!(err, LabelerError::LabelError(_)));
        assert!(err.is_mailbox_error());
        assert_eq!(manager.label_id("Finance"), None);
    }

    #[tokio::test]
    async fn test_ensure_label_conflict_adopts_existing_label() {
        let mut mock_client = MockTestGmailClient::new();
        let mut listings = 0;
        mock_client.expect_list_labels().times(2).returning(move || {
            listings += 1;
            let mut labels = snapshot();
            if listings > 1 {
                // created by a call whose response never arrived
                labels.push(label("Label_42", "Finance", LabelType::User));
            }
            Ok(labels)
        });
        mock_client
            .expect_create_label()
            .with(eq("Finance"))
            .times(1)
            .returning(|_| Err(LabelerError::Conflict("HTTP 409: Conflict".to_string())));

        let mut manager = LabelManager::new(Box::new(mock_client));
        manager.load_existing_labels().await.unwrap();

        assert_eq!(manager.ensure_label("Finance").await.unwrap(), "Label_42");
        // served from the refreshed cache, no second create
        assert_eq!(manager.ensure_label("finance").await.unwrap(), "Label_42");
        assert!(manager.created_labels().is_empty());
        assert!(manager.has_user_label(&message_with(&["Label_42"])));
    }

    #[tokio::test]
    async fn test_ensure_label_conflict_without_listed_label() {
        let mut mock_client = MockTestGmailClient::new();
        mock_client.expect_list_labels().returning(|| Ok(snapshot()));
        mock_client
            .expect_create_label()
            .returning(|_| Err(LabelerError::Conflict("HTTP 409: Conflict".to_string())));

        let mut manager = LabelManager::new(Box::new(mock_client));
        manager.load_existing_labels().await.unwrap();

        let err = manager.ensure_label("Finance").await.unwrap_err();
        assert!(matches!(err, LabelerError::LabelError(_)));
        assert_eq!(manager.label_id("Finance"), None);
    }

    #[tokio::test]
    async fn test_apply_adds_label_and_removes_inbox() {
        let mut mock_client = MockTestGmailClient::new();
        mock_client
            .expect_modify_message()
            .withf(|id, add, remove| {
                id == "m1"
                    && add.len() == 1
                    && add[0] == "Label_1"
                    && remove.len() == 1
                    && remove[0] == INBOX_LABEL_ID
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let manager = LabelManager::new(Box::new(mock_client));
        manager.apply("m1", "Label_1").await.unwrap();
    }

    #[tokio::test]
    async fn test_has_user_label() {
        let mut mock_client = MockTestGmailClient::new();
        mock_client.expect_list_labels().returning(|| Ok(snapshot()));

        let mut manager = LabelManager::new(Box::new(mock_client));
        manager.load_existing_labels().await.unwrap();

        assert!(!manager.has_user_label(&message_with(&[])));
        assert!(!manager.has_user_label(&message_with(&["INBOX", "UNREAD", "CATEGORY_PROMOTIONS"])));
        assert!(manager.has_user_label(&message_with(&["INBOX", "Label_2"])));
        // unknown to the snapshot, so created elsewhere after it was taken
        assert!(manager.has_user_label(&message_with(&["Label_77"])));
        assert!(!manager.has_user_label(&message_with(&["CATEGORY_FORUMS"])));
    }

    #[tokio::test]
    async fn test_created_label_counts_as_user_label() {
        let mut mock_client = MockTestGmailClient::new();
        mock_client.expect_list_labels().returning(|| Ok(Vec::new()));
        mock_client
            .expect_create_label()
            .returning(|_| Ok("Label_5".to_string()));

        let mut manager = LabelManager::new(Box::new(mock_client));
        manager.load_existing_labels().await.unwrap();
        manager.ensure_label("Travel").await.unwrap();

        assert!(manager.has_user_label(&message_with(&["Label_5"])));
    }
}
