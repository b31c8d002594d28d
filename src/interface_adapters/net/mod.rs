// Network adapter: the connection listener. Per-connection protocol handling lives
// in `use_cases::lobby`/`use_cases::game`, which own the sockets once admitted.

pub mod listener;

pub use listener::{run_listener, ListenerError};
