//! Boundary validation for decoded client messages.
//!
//! Decoding already guarantees that required fields are present and that
//! room codes are well formed. [`Validate`] adds the checks serde cannot
//! express: blank strings, length limits, option counts and timer bounds.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{ClientMessage, ProtocolError, RoomMode};

/// Bounds applied to client input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub min_options: usize,
    pub max_options: usize,
    pub max_question_len: usize,
    pub max_option_len: usize,
    pub max_display_name_len: usize,
    pub min_round_seconds: u64,
    pub max_round_seconds: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            min_options: 2,
            max_options: 6,
            max_question_len: 280,
            max_option_len: 100,
            max_display_name_len: 40,
            min_round_seconds: 1,
            max_round_seconds: 3600,
        }
    }
}

/// A message that can be checked against [`Limits`] before dispatch.
pub trait Validate {
    fn validate(&self, limits: &Limits) -> Result<(), ProtocolError>;
}

impl Validate for ClientMessage {
    fn validate(&self, limits: &Limits) -> Result<(), ProtocolError> {
        match self {
            Self::JoinRoom { display_name, .. } => validate_display_name(display_name, limits),
            Self::SubmitVote { chosen_option, .. } | Self::SubmitPrediction { chosen_option, .. } => {
                require_text("chosenOption", chosen_option, limits.max_option_len)
            }
            Self::EndPrediction { correct_option, .. } => {
                require_text("correctOption", correct_option, limits.max_option_len)
            }
            Self::CreateRoom {
                mode,
                question,
                options,
                timer_seconds,
                host_name,
                ..
            } => {
                if *mode == RoomMode::Open {
                    return Err(ProtocolError::InvalidMessage(
                        "open mode is not supported".into(),
                    ));
                }
                validate_question(question, limits)?;
                validate_options(options, limits)?;
                validate_display_name(host_name, limits)?;
                if let Some(seconds) = timer_seconds {
                    validate_round_seconds(*seconds, limits)?;
                }
                Ok(())
            }
            Self::ListActiveRooms { user_ref } | Self::ListFinishedRooms { user_ref } => {
                require_text("userRef", user_ref.as_str(), usize::MAX)
            }
            Self::LeaveRoom { .. }
            | Self::StartRound { .. }
            | Self::EndRound { .. }
            | Self::GetRoom { .. }
            | Self::Heartbeat { .. } => Ok(()),
        }
    }
}

pub fn validate_question(question: &str, limits: &Limits) -> Result<(), ProtocolError> {
    require_text("question", question, limits.max_question_len)
}

/// Options must be non-blank, within length, distinct, and between
/// `min_options` and `max_options` in number.
pub fn validate_options(options: &[String], limits: &Limits) -> Result<(), ProtocolError> {
    if options.len() < limits.min_options || options.len() > limits.max_options {
        return Err(ProtocolError::field(
            "options",
            format!(
                "expected {}..={} options, got {}",
                limits.min_options,
                limits.max_options,
                options.len()
            ),
        ));
    }
    let mut seen = HashSet::with_capacity(options.len());
    for option in options {
        require_text("options", option, limits.max_option_len)?;
        if !seen.insert(option.as_str()) {
            return Err(ProtocolError::field(
                "options",
                format!("duplicate option {option:?}"),
            ));
        }
    }
    Ok(())
}

pub fn validate_display_name(name: &str, limits: &Limits) -> Result<(), ProtocolError> {
    require_text("displayName", name, limits.max_display_name_len)
}

pub fn validate_round_seconds(seconds: u64, limits: &Limits) -> Result<(), ProtocolError> {
    if seconds < limits.min_round_seconds || seconds > limits.max_round_seconds {
        return Err(ProtocolError::field(
            "timerSeconds",
            format!(
                "must be between {} and {} seconds",
                limits.min_round_seconds, limits.max_round_seconds
            ),
        ));
    }
    Ok(())
}

fn require_text(field: &'static str, value: &str, max_len: usize) -> Result<(), ProtocolError> {
    if value.trim().is_empty() {
        return Err(ProtocolError::field(field, "must not be blank"));
    }
    if value.chars().count() > max_len {
        return Err(ProtocolError::field(
            field,
            format!("must be at most {max_len} characters"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RoomCode;

    fn create(mode: RoomMode, options: &[&str], timer: Option<u64>) -> ClientMessage {
        ClientMessage::CreateRoom {
            mode,
            question: "Best editor?".into(),
            options: options.iter().map(|s| s.to_string()).collect(),
            timer_seconds: timer,
            host_name: "hosty".into(),
            persistent_user_ref: None,
            start_immediately: None,
        }
    }

    #[test]
    fn test_validate_create_room_accepts_well_formed() {
        let msg = create(RoomMode::Classic, &["vim", "emacs"], Some(30));
        assert!(msg.validate(&Limits::default()).is_ok());
    }

    #[test]
    fn test_validate_create_room_rejects_single_option() {
        let msg = create(RoomMode::Classic, &["vim"], None);
        assert!(matches!(
            msg.validate(&Limits::default()),
            Err(ProtocolError::InvalidField { field: "options", .. })
        ));
    }

    #[test]
    fn test_validate_create_room_rejects_too_many_options() {
        let msg = create(RoomMode::Prediction, &["a", "b", "c", "d", "e", "f", "g"], None);
        assert!(msg.validate(&Limits::default()).is_err());
    }

    #[test]
    fn test_validate_create_room_rejects_duplicate_options() {
        let msg = create(RoomMode::Classic, &["vim", "vim"], None);
        assert!(msg.validate(&Limits::default()).is_err());
    }

    #[test]
    fn test_validate_create_room_rejects_blank_question() {
        let msg = ClientMessage::CreateRoom {
            mode: RoomMode::Classic,
            question: "   ".into(),
            options: vec!["a".into(), "b".into()],
            timer_seconds: None,
            host_name: "hosty".into(),
            persistent_user_ref: None,
            start_immediately: None,
        };
        assert!(matches!(
            msg.validate(&Limits::default()),
            Err(ProtocolError::InvalidField { field: "question", .. })
        ));
    }

    #[test]
    fn test_validate_create_room_rejects_timer_out_of_bounds() {
        assert!(create(RoomMode::Classic, &["a", "b"], Some(0))
            .validate(&Limits::default())
            .is_err());
        assert!(create(RoomMode::Classic, &["a", "b"], Some(3601))
            .validate(&Limits::default())
            .is_err());
    }

    #[test]
    fn test_validate_create_room_rejects_open_mode() {
        let msg = create(RoomMode::Open, &["a", "b"], None);
        assert!(matches!(
            msg.validate(&Limits::default()),
            Err(ProtocolError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_validate_join_room_rejects_long_display_name() {
        let msg = ClientMessage::JoinRoom {
            room_code: RoomCode::parse("AB12CD").unwrap(),
            display_name: "x".repeat(41),
            persistent_user_ref: None,
        };
        assert!(msg.validate(&Limits::default()).is_err());
    }

    #[test]
    fn test_validate_submit_vote_rejects_blank_option() {
        let msg = ClientMessage::SubmitVote {
            room_code: RoomCode::parse("AB12CD").unwrap(),
            connection_id: None,
            chosen_option: "".into(),
        };
        assert!(msg.validate(&Limits::default()).is_err());
    }
}
