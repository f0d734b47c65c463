use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::services::conversation::ConversationEngine;
use crate::services::dispatcher::UserLocks;
use crate::services::transport::Transport;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub engine: ConversationEngine,
    pub transport: Box<dyn Transport>,
    pub link_transport: Box<dyn Transport>,
    pub user_locks: UserLocks,
}
