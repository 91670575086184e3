use std::str::FromStr;

use crate::{config::SettingKey, error::CommandError};

/// Text commands accepted on the room command topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCommand {
    Halt,
    Set { key: SettingKey, value: i64 },
}

impl FromStr for RemoteCommand {
    type Err = CommandError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CommandError::Empty);
        }
        if text == "halt" {
            return Ok(Self::Halt);
        }

        let Some((key, value)) = text.split_once(':') else {
            return Err(CommandError::Malformed(text.to_string()));
        };
        let key: SettingKey = key.trim().parse()?;
        let value = value
            .trim()
            .parse::<i64>()
            .map_err(|_| CommandError::NotAnInteger {
                key: key.as_str(),
                value: value.to_string(),
            })?;

        Ok(Self::Set { key, value })
    }
}

impl RemoteCommand {
    pub fn parse_payload(payload: &[u8]) -> Result<Self, CommandError> {
        let text = std::str::from_utf8(payload)
            .map_err(|_| CommandError::Malformed(String::from_utf8_lossy(payload).into_owned()))?;
        text.parse()
    }
}
