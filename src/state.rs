use std::sync::Arc;
use std::time::Duration;

use mongodb::{
    options::{ClientOptions, IndexOptions},
    Client, Collection, IndexModel,
};

use crate::{
    auth::jwt::TokenSigner,
    config::Config,
    directory::MongoDirectory,
    errors::AppError,
    models::{refresh_record::RefreshRecordDoc, user::UserDoc},
    services::session_service::SessionService,
    store::{MongoRefreshStore, RefreshStore},
};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub signer: Arc<TokenSigner>,
    pub directory: Arc<MongoDirectory>,
    pub store: Arc<dyn RefreshStore>,
    pub sessions: SessionService,
}

impl AppState {
    pub async fn new(cfg: Config) -> Result<Self, AppError> {
        let signer = Arc::new(TokenSigner::from_config(&cfg)?);

        let mut opts = ClientOptions::parse(&cfg.mongodb_uri).await?;
        opts.app_name = Some("sessiond".to_string());
        opts.server_selection_timeout = Some(Duration::from_millis(cfg.store_timeout_ms));
        let client = Client::with_options(opts)?;
        let db = client.database(&cfg.db_name);

        let users: Collection<UserDoc> = db.collection("users");
        let refresh_records: Collection<RefreshRecordDoc> = db.collection("refresh_records");

        let email_index = IndexModel::builder()
            .keys(mongodb::bson::doc! { "email": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        let _ = users.create_index(email_index).await?;

        let hash_index = IndexModel::builder()
            .keys(mongodb::bson::doc! { "token_hash": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        let _ = refresh_records.create_index(hash_index).await?;

        let owner_index = IndexModel::builder()
            .keys(mongodb::bson::doc! { "owner_id": 1, "revoked_at": 1 })
            .build();
        let _ = refresh_records.create_index(owner_index).await?;

        // Purge sweep scans by expiry.
        let expiry_index = IndexModel::builder()
            .keys(mongodb::bson::doc! { "expires_at": 1 })
            .build();
        let _ = refresh_records.create_index(expiry_index).await?;

        let store: Arc<dyn RefreshStore> = Arc::new(MongoRefreshStore::new(
            refresh_records,
            Duration::from_millis(cfg.store_timeout_ms),
        ));
        let directory = Arc::new(MongoDirectory::new(users));

        let sessions = SessionService::new(
            signer.clone(),
            store.clone(),
            directory.clone(),
            cfg.reuse_revokes_all,
        );

        Ok(Self {
            cfg: Arc::new(cfg),
            signer,
            directory,
            store,
            sessions,
        })
    }
}
