// Process-wide shared state: the user/game registries. Grounded on
// `original_source/src/server/users.h`'s `User`/`Game` structs, minus the raw
// socket fd (socket ownership moves between tasks over channels instead of living
// in the registry, see SPEC_FULL.md section 4.2/4.3).

use crate::interface_adapters::registry::Registry;
use crate::use_cases::types::Admission;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Default)]
pub struct UserRecord {
    pub username: Option<String>,
    pub game_id: u32,
}

pub struct GameRecord {
    pub name: String,
    pub owner_id: u32,
    pub admission_tx: mpsc::Sender<Admission>,
    pub started: bool,
}

pub struct AppState {
    pub users: Arc<Registry<UserRecord>>,
    pub games: Arc<Registry<GameRecord>>,
}

impl AppState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            users: Arc::new(Registry::new()),
            games: Arc::new(Registry::new()),
        })
    }
}
