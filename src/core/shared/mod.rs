pub mod state;
#[cfg(test)]
pub mod test_utils;

pub use state::AppState;
