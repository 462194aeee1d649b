use std::sync::{Arc, Once};

use crate::core::shared::state::AppState;

static INIT: Once = Once::new();

pub fn setup() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

pub fn create_test_state() -> Arc<AppState> {
    setup();
    Arc::new(AppState::in_memory().expect("embedded templates compile"))
}
