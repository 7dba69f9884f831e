//! MongoDB implementation of the inbox store

use async_trait::async_trait;
use bson::{doc, Document};
use futures_util::StreamExt;
use mongodb::options::IndexOptions;
use mongodb::{Client, ClientSession, Collection, Database, IndexModel};
use tracing::{debug, error, info};

use super::schemas::{
    IdentityRecord, InboxSummaryDoc, KeyBookRecord, PendingActionDoc, UserRecord, ADIS_COLLECTION,
    COMPUTED_STATE_COLLECTION, PENDING_ACTIONS_COLLECTION,
};
use super::InboxStore;
use crate::types::{Result, WatchtowerError};

/// MongoDB-backed store adapter.
#[derive(Clone)]
pub struct MongoInboxStore {
    client: Client,
    db: Database,
    users_collection: String,
}

impl MongoInboxStore {
    /// Connect, ping, and ensure indexes.
    pub async fn connect(uri: &str, db_name: &str, users_collection: &str) -> Result<Self> {
        info!("Connecting to MongoDB at {}", uri);

        // Use serverSelectionTimeoutMS to avoid hanging on unreachable MongoDB
        let timeout_uri = if uri.contains('?') {
            format!("{uri}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000")
        } else {
            format!("{uri}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000")
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| WatchtowerError::Database(format!("Failed to connect to MongoDB: {e}")))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| WatchtowerError::Database(format!("MongoDB ping failed: {e}")))?;

        info!("Connected to MongoDB database '{}'", db_name);

        let store = Self {
            db: client.database(db_name),
            client,
            users_collection: users_collection.to_string(),
        };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> Result<()> {
        let indexes: Vec<(&str, Document, bool)> = vec![
            (ADIS_COLLECTION, doc! { "uid": 1 }, false),
            (ADIS_COLLECTION, doc! { "uid": 1, "identityUrl": 1 }, true),
            (PENDING_ACTIONS_COLLECTION, doc! { "uid": 1, "txHash": 1 }, true),
            (COMPUTED_STATE_COLLECTION, doc! { "uid": 1 }, true),
        ];

        for (collection, keys, unique) in indexes {
            let model = IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().unique(unique).build())
                .build();
            self.db
                .collection::<Document>(collection)
                .create_index(model)
                .await
                .map_err(|e| {
                    WatchtowerError::Database(format!("Failed to create index on {collection}: {e}"))
                })?;
        }
        Ok(())
    }

    fn users(&self) -> Collection<UserRecord> {
        self.db.collection(&self.users_collection)
    }

    fn adis(&self) -> Collection<IdentityRecord> {
        self.db.collection(ADIS_COLLECTION)
    }

    fn pending_actions(&self) -> Collection<PendingActionDoc> {
        self.db.collection(PENDING_ACTIONS_COLLECTION)
    }

    fn computed_state(&self) -> Collection<InboxSummaryDoc> {
        self.db.collection(COMPUTED_STATE_COLLECTION)
    }

    async fn drain<T>(&self, cursor: mongodb::Cursor<T>) -> Vec<T>
    where
        T: serde::de::DeserializeOwned + Unpin + Send + Sync,
    {
        cursor
            .filter_map(|item| async {
                match item {
                    Ok(value) => Some(value),
                    Err(e) => {
                        error!("Error reading document: {}", e);
                        None
                    }
                }
            })
            .collect()
            .await
    }

    /// Run the inbox diff inside one transaction; abort on any failure.
    async fn apply_diff_in_session(
        &self,
        session: &mut ClientSession,
        uid: &str,
        upserts: &[PendingActionDoc],
        remove_hashes: &[String],
        summary: &InboxSummaryDoc,
    ) -> Result<()> {
        let actions = self.pending_actions();

        for hash in remove_hashes {
            actions
                .delete_one(doc! { "uid": uid, "txHash": hash })
                .session(&mut *session)
                .await?;
        }

        for doc_value in upserts {
            let update = bson::to_document(doc_value)
                .map_err(|e| WatchtowerError::Database(format!("serialize action doc: {e}")))?;
            actions
                .update_one(
                    doc! { "uid": uid, "txHash": &doc_value.tx_hash },
                    doc! { "$set": update },
                )
                .upsert(true)
                .session(&mut *session)
                .await?;
        }

        let summary_update = bson::to_document(summary)
            .map_err(|e| WatchtowerError::Database(format!("serialize summary: {e}")))?;
        self.computed_state()
            .update_one(doc! { "uid": uid }, doc! { "$set": summary_update })
            .upsert(true)
            .session(&mut *session)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl InboxStore for MongoInboxStore {
    async fn list_users_with_identities(&self) -> Result<Vec<UserRecord>> {
        let filter = doc! { "onboardingComplete": true, "keyVaultSetup": true };
        let cursor = self.users().find(filter).await?;
        let mut users: Vec<UserRecord> = self.drain(cursor).await;

        if users.is_empty() {
            return Ok(users);
        }

        let uids: Vec<String> = users.iter().map(|u| u.uid.clone()).collect();
        let cursor = self.adis().find(doc! { "uid": { "$in": uids } }).await?;
        let identities: Vec<IdentityRecord> = self.drain(cursor).await;

        let mut by_uid: std::collections::HashMap<String, Vec<IdentityRecord>> =
            std::collections::HashMap::new();
        for identity in identities {
            by_uid.entry(identity.uid.clone()).or_default().push(identity);
        }
        for user in &mut users {
            user.identities = by_uid.remove(&user.uid).unwrap_or_default();
        }

        debug!(count = users.len(), "loaded gated users");
        Ok(users)
    }

    async fn get_inbox(&self, uid: &str) -> Result<Vec<PendingActionDoc>> {
        let cursor = self.pending_actions().find(doc! { "uid": uid }).await?;
        Ok(self.drain(cursor).await)
    }

    async fn get_summary(&self, uid: &str) -> Result<Option<InboxSummaryDoc>> {
        Ok(self.computed_state().find_one(doc! { "uid": uid }).await?)
    }

    async fn apply_inbox_diff(
        &self,
        uid: &str,
        upserts: Vec<PendingActionDoc>,
        remove_hashes: Vec<String>,
        summary: InboxSummaryDoc,
    ) -> Result<()> {
        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;

        match self
            .apply_diff_in_session(&mut session, uid, &upserts, &remove_hashes, &summary)
            .await
        {
            Ok(()) => {
                session.commit_transaction().await?;
                debug!(
                    uid,
                    upserts = upserts.len(),
                    removed = remove_hashes.len(),
                    "inbox diff committed"
                );
                Ok(())
            }
            Err(e) => {
                if let Err(abort_err) = session.abort_transaction().await {
                    error!(uid, error = %abort_err, "failed to abort inbox transaction");
                }
                Err(e)
            }
        }
    }

    async fn save_identity_snapshot(
        &self,
        uid: &str,
        identity_url: &str,
        books: Vec<KeyBookRecord>,
    ) -> Result<()> {
        let books_bson = bson::to_bson(&books)
            .map_err(|e| WatchtowerError::Database(format!("serialize key books: {e}")))?;

        self.adis()
            .update_one(
                doc! { "uid": uid, "identityUrl": identity_url },
                doc! { "$set": { "keyBooks": books_bson, "updatedAt": bson::DateTime::now() } },
            )
            .await?;

        debug!(uid, identity = identity_url, "identity key-book snapshot refreshed");
        Ok(())
    }
}
