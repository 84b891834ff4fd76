use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::{
    auth::jwt::JwtService,
    cache::RecordCache,
    config::AppConfig,
    credentials::CredentialStore,
    kintone::RecordStore,
    mailer::Mailer,
    services::Services,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub credentials: Arc<dyn CredentialStore>,
    pub mailer: Arc<dyn Mailer>,
    pub jwt: JwtService,
    pub cache: Arc<RecordCache>,
    pub services: Arc<Services>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn RecordStore>,
        credentials: Arc<dyn CredentialStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self> {
        let jwt = JwtService::from_config(&config)?;
        let cache = Arc::new(RecordCache::new(Duration::from_secs(
            config.cache_ttl_seconds,
        )));
        let services = Arc::new(Services::new(store, cache.clone()));

        Ok(Self {
            config: Arc::new(config),
            credentials,
            mailer,
            jwt,
            cache,
            services,
        })
    }
}
