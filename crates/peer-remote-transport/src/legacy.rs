//! Legacy colon-delimited text commands.
//!
//! `NAME:param[:param...]`, case-sensitive. Kept for hosts that predate the
//! structured protocol and for commands it does not carry (navigation, URL,
//! text entry, gestures, experiment broadcasts).

use std::{fmt, str::FromStr};

use peer_remote_core::ExperimentField;
use thiserror::Error;

/// Browser navigation actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavAction {
    Back,
    Forward,
    Reload,
    Home,
    Search,
}

impl NavAction {
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Back => "BACK",
            Self::Forward => "FORWARD",
            Self::Reload => "RELOAD",
            Self::Home => "HOME",
            Self::Search => "SEARCH",
        }
    }
}

impl FromStr for NavAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BACK" => Ok(Self::Back),
            "FORWARD" => Ok(Self::Forward),
            "RELOAD" => Ok(Self::Reload),
            "HOME" => Ok(Self::Home),
            "SEARCH" => Ok(Self::Search),
            _ => Err(()),
        }
    }
}

/// Keys that can be sent with `WEB_KEY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
}

/// One parsed legacy command.
#[derive(Debug, Clone, PartialEq)]
pub enum LegacyCommand {
    /// `TAP:<id>`
    Tap { id: String },
    /// `SELECT:<xRatio>,<yRatio>`
    Select { x_ratio: f64, y_ratio: f64 },
    /// `GESTURE:<name>`
    Gesture { name: String },
    /// `WEB_NAV:<action>`
    WebNav(NavAction),
    /// `WEB_URL:<url>`
    WebUrl(String),
    /// `WEB_SCROLL:<dx>,<dy>`
    WebScroll { dx: i64, dy: i64 },
    /// `WEB_TAP:<nx>,<ny>`, or bare `WEB_TAP` to tap at gaze.
    WebTap { target: Option<(f64, f64)> },
    /// `WEB_TYPE:<text>`
    WebType(String),
    /// `WEB_KEY:ENTER`
    WebKey(Key),
    /// `EXP_MODE:ON:<mode>`
    ExpModeOn { mode: String },
    /// `EXP_MODE:OFF`
    ExpModeOff,
    /// `EXP_STATE:<field>:<value>`
    ExpState { field: ExperimentField, value: String },
    /// `SCROLL_SELECT:<n>`
    ScrollSelect(i64),
}

/// Legacy parse error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LegacyParseError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("Malformed {command}: {reason}")]
    Malformed {
        command: &'static str,
        reason: String,
    },
    /// `EXP_STATE` with a field this side does not track.
    #[error("Unknown EXP_STATE field: {0}")]
    UnknownField(String),
}

impl LegacyParseError {
    /// A recognised prefix with damaged parameters.
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }
}

fn malformed(command: &'static str, reason: impl Into<String>) -> LegacyParseError {
    LegacyParseError::Malformed {
        command,
        reason: reason.into(),
    }
}

fn required<'a>(command: &'static str, rest: Option<&'a str>) -> Result<&'a str, LegacyParseError> {
    rest.ok_or_else(|| malformed(command, "missing parameter"))
}

fn non_empty<'a>(command: &'static str, rest: Option<&'a str>) -> Result<&'a str, LegacyParseError> {
    match required(command, rest)? {
        "" => Err(malformed(command, "empty parameter")),
        value => Ok(value),
    }
}

fn pair<T: FromStr>(command: &'static str, rest: Option<&str>) -> Result<(T, T), LegacyParseError> {
    let raw = required(command, rest)?;
    let (a, b) = raw
        .split_once(',')
        .ok_or_else(|| malformed(command, format!("expected two values, got {raw:?}")))?;
    let parse = |s: &str| {
        s.trim()
            .parse::<T>()
            .map_err(|_| malformed(command, format!("invalid number {s:?}")))
    };
    Ok((parse(a)?, parse(b)?))
}

fn finite_pair(command: &'static str, rest: Option<&str>) -> Result<(f64, f64), LegacyParseError> {
    let (a, b) = pair::<f64>(command, rest)?;
    if a.is_finite() && b.is_finite() {
        Ok((a, b))
    } else {
        Err(malformed(command, "non-finite value"))
    }
}

impl LegacyCommand {
    /// Parse one text payload.
    ///
    /// # Errors
    /// Returns error if the prefix is unknown, the parameters are malformed,
    /// or an `EXP_STATE` field is not recognised.
    pub fn parse(text: &str) -> Result<Self, LegacyParseError> {
        let (name, rest) = match text.split_once(':') {
            Some((name, rest)) => (name, Some(rest)),
            None => (text, None),
        };

        match name {
            "TAP" => Ok(Self::Tap {
                id: non_empty("TAP", rest)?.to_string(),
            }),
            "SELECT" => {
                let (x_ratio, y_ratio) = finite_pair("SELECT", rest)?;
                Ok(Self::Select { x_ratio, y_ratio })
            }
            "GESTURE" => Ok(Self::Gesture {
                name: non_empty("GESTURE", rest)?.to_string(),
            }),
            "WEB_NAV" => {
                let raw = required("WEB_NAV", rest)?;
                raw.parse::<NavAction>()
                    .map(Self::WebNav)
                    .map_err(|()| malformed("WEB_NAV", format!("unknown action {raw:?}")))
            }
            "WEB_URL" => Ok(Self::WebUrl(non_empty("WEB_URL", rest)?.to_string())),
            "WEB_SCROLL" => {
                let (dx, dy) = pair::<i64>("WEB_SCROLL", rest)?;
                Ok(Self::WebScroll { dx, dy })
            }
            "WEB_TAP" => match rest {
                None => Ok(Self::WebTap { target: None }),
                Some(_) => Ok(Self::WebTap {
                    target: Some(finite_pair("WEB_TAP", rest)?),
                }),
            },
            "WEB_TYPE" => Ok(Self::WebType(required("WEB_TYPE", rest)?.to_string())),
            "WEB_KEY" => match required("WEB_KEY", rest)? {
                "ENTER" => Ok(Self::WebKey(Key::Enter)),
                other => Err(malformed("WEB_KEY", format!("unknown key {other:?}"))),
            },
            "EXP_MODE" => match required("EXP_MODE", rest)? {
                "OFF" => Ok(Self::ExpModeOff),
                other => match other.strip_prefix("ON:") {
                    Some(mode) if !mode.is_empty() => Ok(Self::ExpModeOn {
                        mode: mode.to_string(),
                    }),
                    _ => Err(malformed("EXP_MODE", format!("expected ON:<mode> or OFF, got {other:?}"))),
                },
            },
            "EXP_STATE" => {
                let raw = required("EXP_STATE", rest)?;
                let (keyword, value) = raw.split_once(':').unwrap_or((raw, ""));
                let field = ExperimentField::from_keyword(keyword)
                    .ok_or_else(|| LegacyParseError::UnknownField(keyword.to_string()))?;
                if !raw.contains(':') {
                    return Err(malformed("EXP_STATE", "missing value"));
                }
                Ok(Self::ExpState {
                    field,
                    value: value.to_string(),
                })
            }
            "SCROLL_SELECT" => {
                let raw = required("SCROLL_SELECT", rest)?;
                raw.trim()
                    .parse::<i64>()
                    .map(Self::ScrollSelect)
                    .map_err(|_| malformed("SCROLL_SELECT", format!("invalid number {raw:?}")))
            }
            other => Err(LegacyParseError::UnknownCommand(other.to_string())),
        }
    }

    /// Command name as it appears on the wire.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Tap { .. } => "TAP",
            Self::Select { .. } => "SELECT",
            Self::Gesture { .. } => "GESTURE",
            Self::WebNav(_) => "WEB_NAV",
            Self::WebUrl(_) => "WEB_URL",
            Self::WebScroll { .. } => "WEB_SCROLL",
            Self::WebTap { .. } => "WEB_TAP",
            Self::WebType(_) => "WEB_TYPE",
            Self::WebKey(_) => "WEB_KEY",
            Self::ExpModeOn { .. } | Self::ExpModeOff => "EXP_MODE",
            Self::ExpState { .. } => "EXP_STATE",
            Self::ScrollSelect(_) => "SCROLL_SELECT",
        }
    }
}

impl FromStr for LegacyCommand {
    type Err = LegacyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for LegacyCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name();
        match self {
            Self::Tap { id } => write!(f, "{name}:{id}"),
            Self::Select { x_ratio, y_ratio } => write!(f, "{name}:{x_ratio},{y_ratio}"),
            Self::Gesture { name: gesture } => write!(f, "{name}:{gesture}"),
            Self::WebNav(action) => write!(f, "{name}:{}", action.keyword()),
            Self::WebUrl(text) | Self::WebType(text) => write!(f, "{name}:{text}"),
            Self::WebScroll { dx, dy } => write!(f, "{name}:{dx},{dy}"),
            Self::WebTap { target: None } => f.write_str(name),
            Self::WebTap {
                target: Some((nx, ny)),
            } => write!(f, "{name}:{nx},{ny}"),
            Self::WebKey(Key::Enter) => write!(f, "{name}:ENTER"),
            Self::ExpModeOn { mode } => write!(f, "{name}:ON:{mode}"),
            Self::ExpModeOff => write!(f, "{name}:OFF"),
            Self::ExpState { field, value } => write!(f, "{name}:{}:{value}", field.keyword()),
            Self::ScrollSelect(n) => write!(f, "{name}:{n}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_web_scroll() {
        assert_eq!(
            LegacyCommand::parse("WEB_SCROLL:12,-7").unwrap(),
            LegacyCommand::WebScroll { dx: 12, dy: -7 }
        );
    }

    #[test]
    fn test_exp_state_score() {
        assert_eq!(
            LegacyCommand::parse("EXP_STATE:SCORE:3/10").unwrap(),
            LegacyCommand::ExpState {
                field: ExperimentField::Score,
                value: "3/10".to_string()
            }
        );
    }

    #[test]
    fn test_exp_state_value_keeps_colons() {
        assert_eq!(
            LegacyCommand::parse("EXP_STATE:PHASE:trial:2").unwrap(),
            LegacyCommand::ExpState {
                field: ExperimentField::Phase,
                value: "trial:2".to_string()
            }
        );
    }

    #[test]
    fn test_exp_state_unknown_field() {
        assert_eq!(
            LegacyCommand::parse("EXP_STATE:MOOD:happy").unwrap_err(),
            LegacyParseError::UnknownField("MOOD".to_string())
        );
    }

    #[test]
    fn test_scroll_select() {
        assert_eq!(
            LegacyCommand::parse("SCROLL_SELECT:24").unwrap(),
            LegacyCommand::ScrollSelect(24)
        );
        assert_eq!(
            LegacyCommand::parse("SCROLL_SELECT: 7 ").unwrap(),
            LegacyCommand::ScrollSelect(7)
        );
    }

    #[test]
    fn test_malformed_scroll() {
        let err = LegacyCommand::parse("WEB_SCROLL:abc").unwrap_err();
        assert!(err.is_malformed());
        assert!(LegacyCommand::parse("WEB_SCROLL:1.5,2").unwrap_err().is_malformed());
        assert!(LegacyCommand::parse("WEB_SCROLL").unwrap_err().is_malformed());
    }

    #[test]
    fn test_url_keeps_colons() {
        assert_eq!(
            LegacyCommand::parse("WEB_URL:https://example.com:8443/a?b=c").unwrap(),
            LegacyCommand::WebUrl("https://example.com:8443/a?b=c".to_string())
        );
    }

    #[test]
    fn test_exp_mode() {
        assert_eq!(
            LegacyCommand::parse("EXP_MODE:ON:gazePinch").unwrap(),
            LegacyCommand::ExpModeOn {
                mode: "gazePinch".to_string()
            }
        );
        assert_eq!(LegacyCommand::parse("EXP_MODE:OFF").unwrap(), LegacyCommand::ExpModeOff);
        assert!(LegacyCommand::parse("EXP_MODE:ON").unwrap_err().is_malformed());
    }

    #[test]
    fn test_web_tap_forms() {
        assert_eq!(
            LegacyCommand::parse("WEB_TAP").unwrap(),
            LegacyCommand::WebTap { target: None }
        );
        assert_eq!(
            LegacyCommand::parse("WEB_TAP:0.5,0.25").unwrap(),
            LegacyCommand::WebTap {
                target: Some((0.5, 0.25))
            }
        );
    }

    #[test]
    fn test_nav_and_key() {
        assert_eq!(
            LegacyCommand::parse("WEB_NAV:FORWARD").unwrap(),
            LegacyCommand::WebNav(NavAction::Forward)
        );
        assert!(LegacyCommand::parse("WEB_NAV:back").unwrap_err().is_malformed());
        assert_eq!(
            LegacyCommand::parse("WEB_KEY:ENTER").unwrap(),
            LegacyCommand::WebKey(Key::Enter)
        );
    }

    #[test]
    fn test_unknown_and_case_sensitive() {
        assert_eq!(
            LegacyCommand::parse("hello there").unwrap_err(),
            LegacyParseError::UnknownCommand("hello there".to_string())
        );
        assert!(matches!(
            LegacyCommand::parse("web_scroll:1,2").unwrap_err(),
            LegacyParseError::UnknownCommand(_)
        ));
    }

    #[test]
    fn test_render() {
        let cases = [
            (LegacyCommand::WebNav(NavAction::Back), "WEB_NAV:BACK"),
            (LegacyCommand::WebScroll { dx: -3, dy: 9 }, "WEB_SCROLL:-3,9"),
            (LegacyCommand::ScrollSelect(24), "SCROLL_SELECT:24"),
            (LegacyCommand::WebTap { target: None }, "WEB_TAP"),
            (
                LegacyCommand::ExpModeOn {
                    mode: "touch".to_string(),
                },
                "EXP_MODE:ON:touch",
            ),
            (
                LegacyCommand::Select {
                    x_ratio: 0.5,
                    y_ratio: 0.125,
                },
                "SELECT:0.5,0.125",
            ),
        ];
        for (cmd, text) in cases {
            assert_eq!(cmd.to_string(), text);
            assert_eq!(LegacyCommand::parse(text).unwrap(), cmd);
        }
    }
}
