//! Localizable messages handed to the platform.
//!
//! The core never builds user-facing text itself; it names a localization key plus
//! replacements. Adapters without a localizer fall back to the English templates below.

use serde::{Deserialize, Serialize};

use super::ids::UserId;
use super::invite::AcceptControl;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub key: String,
    pub args: Vec<(String, String)>,
}

impl Notice {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            args: Vec::new(),
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.args.push((name.to_string(), value.into()));
        self
    }

    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn invite_title(jam_topic: &str) -> Self {
        Notice::new("command.team.invite.message.invited").with("JAM", jam_topic)
    }

    pub fn invite_body(inviter: UserId, team_name: &str) -> Self {
        Notice::new("command.team.invite.message.invitation")
            .with("USER", mention(inviter))
            .with("TEAM", team_name)
    }

    pub fn accept_label() -> Self {
        Notice::new("command.team.invite.message.accept")
    }

    pub fn joined_broadcast(user: UserId) -> Self {
        Notice::new("command.team.invite.joinedBroadcast").with("USER", mention(user))
    }

    /// English rendering used when no localizer is wired in
    pub fn render_default(&self) -> String {
        let template = match self.key.as_str() {
            "command.team.invite.message.invited" => "You have been invited to a team in %JAM%",
            "command.team.invite.message.invitation" => "%USER% invited you to join **%TEAM%**.",
            "command.team.invite.message.accept" => "Accept",
            "command.team.invite.joinedBroadcast" => "%USER% joined the team!",
            other => return self.render_raw(other),
        };
        self.args
            .iter()
            .fold(template.to_string(), |text, (name, value)| {
                text.replace(&format!("%{}%", name), value)
            })
    }

    fn render_raw(&self, key: &str) -> String {
        if self.args.is_empty() {
            return key.to_string();
        }
        let args: Vec<String> = self
            .args
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        format!("{} ({})", key, args.join(", "))
    }
}

pub fn mention(user: UserId) -> String {
    format!("<@{}>", user)
}

/// A DM, optionally carrying the acceptance control for an invite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectMessage {
    pub recipient: UserId,
    pub title: Notice,
    pub body: Notice,
    pub control: Option<AcceptControl>,
}
