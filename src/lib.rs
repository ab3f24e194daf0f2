pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod notifications;
pub mod storage;

pub use db::DbPool;

use config::Config;

use crate::api::ws::ChatHub;
use crate::notifications::Mailer;
use crate::storage::Storage;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub mailer: Mailer,
    pub storage: Storage,
    pub hub: ChatHub,
}

impl AppState {
    pub fn new(config: Config, db: DbPool, storage: Storage) -> Self {
        let mailer = Mailer::new(config.email.clone());
        Self {
            config,
            db,
            mailer,
            storage,
            hub: ChatHub::new(),
        }
    }
}
