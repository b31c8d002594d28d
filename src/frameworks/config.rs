// Runtime/server constants and the process's command-line contract.

use std::time::Duration;

use clap::Parser;

/// Battleship TCP server.
#[derive(Debug, Parser)]
#[command(name = "battleship_server", version, about)]
pub struct Cli {
    /// Port to listen on.
    #[arg(short = 'p', long = "port", env = "BATTLESHIP_PORT")]
    pub port: u16,
}

impl Cli {
    /// Parses the process's arguments, honoring the wire spec's documented `-port
    /// <N>` contract. clap has no notion of a single-dash multi-letter flag, so a
    /// leading bare `-port`/`-port=N` token is rewritten to `--port`/`--port=N`
    /// before the real parse; `--port` and the short `-p` keep working unchanged.
    pub fn parse_spec_compliant() -> Self {
        Self::parse_from(normalize_args(std::env::args()))
    }
}

fn normalize_args(args: impl Iterator<Item = String>) -> Vec<String> {
    args.map(|arg| match arg.strip_prefix("-port") {
        Some(rest) if rest.is_empty() || rest.starts_with('=') => format!("-{arg}"),
        _ => arg,
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_bare_single_dash_port() {
        let args = normalize_args(["battleship_server".to_string(), "-port".to_string(), "4000".to_string()].into_iter());
        assert_eq!(args, vec!["battleship_server", "--port", "4000"]);
    }

    #[test]
    fn normalizes_single_dash_port_with_equals() {
        let args = normalize_args(["battleship_server".to_string(), "-port=4000".to_string()].into_iter());
        assert_eq!(args, vec!["battleship_server", "--port=4000"]);
    }

    #[test]
    fn leaves_double_dash_and_short_forms_untouched() {
        let args = normalize_args(
            ["battleship_server".to_string(), "--port".to_string(), "4000".to_string()].into_iter(),
        );
        assert_eq!(args, vec!["battleship_server", "--port", "4000"]);

        let args = normalize_args(["battleship_server".to_string(), "-p".to_string(), "4000".to_string()].into_iter());
        assert_eq!(args, vec!["battleship_server", "-p", "4000"]);
    }
}

/// How long a game waits in `WAITING_FLEET_SETUP` for every seated player to submit
/// a fleet before evicting the stragglers.
pub const FLEET_SETUP_TIMEOUT: Duration = Duration::from_secs(120);

/// How long the player to act has before their turn is skipped.
pub const TURN_TIMEOUT: Duration = Duration::from_secs(60);

/// Capacity of the channel a game worker is admitted players through.
pub const ADMISSION_CHANNEL_CAPACITY: usize = 16;

/// Capacity of the channel the listener hands freshly accepted sockets to the lobby
/// through.
pub const LISTENER_CHANNEL_CAPACITY: usize = 128;
