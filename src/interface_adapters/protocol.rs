// Message type codes for both directions of the wire protocol.
//
// Grounded on `original_source/src/common/protocol.h`'s message type enum, expanded to
// the full client/server message set SPEC_FULL.md section 6 requires. The two
// directions are numbered independently starting at 0 (see GLOSSARY); which table
// applies is determined by who is reading, never by the number alone.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ClientMsg {
    Login = 0,
    CreateGame = 1,
    JoinGame = 2,
    LeaveGame = 3,
    ReadyToPlay = 4,
    StartGame = 5,
    Attack = 6,
    SetupFleet = 7,
}

impl ClientMsg {
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            0 => Self::Login,
            1 => Self::CreateGame,
            2 => Self::JoinGame,
            3 => Self::LeaveGame,
            4 => Self::ReadyToPlay,
            5 => Self::StartGame,
            6 => Self::Attack,
            7 => Self::SetupFleet,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ServerMsg {
    Welcome = 0,
    GameCreated = 1,
    GameJoined = 2,
    ErrorCreateGame = 3,
    ErrorJoinGame = 4,
    ErrorNotAuthenticated = 5,
    GameStateUpdate = 6,
    PlayerJoined = 7,
    PlayerLeft = 8,
    GameStarted = 9,
    TurnOrderUpdate = 10,
    YourTurn = 11,
    AttackUpdate = 12,
    GameFinished = 13,
    ErrorStartGame = 14,
    ErrorPlayerAction = 15,
    ErrorNotYourTurn = 16,
    ErrorUnexpectedMessage = 17,
    ErrorMalformedMessage = 18,
}

impl ServerMsg {
    pub fn code(self) -> u16 {
        self as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_msg_code_round_trips() {
        for code in 0..=7u16 {
            let msg = ClientMsg::from_code(code).expect("known code");
            assert_eq!(msg.code(), code);
        }
        assert!(ClientMsg::from_code(8).is_none());
    }
}
