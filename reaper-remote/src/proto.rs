use std::fmt;

use anyhow::anyhow;
use nom::{
    bytes::complete::take_till,
    character::complete::{char, line_ending},
    combinator::map,
    multi::{separated_list0, separated_list1},
    IResult,
};
use percent_encoding::{utf8_percent_encode, AsciiSet, PercentEncode, NON_ALPHANUMERIC};
use serde::Serialize;
use strum::{AsRefStr, Display, EnumString};

use crate::{RemoteError, Result};

pub const NAMESPACE: &str = "CustomWebInterfaceWithTempo";

/// Written at attach time. A display still showing 999 never got an update.
pub const TEMPO_SENTINEL: &str = "999_999_999_999";

const NONE_SENTINEL: &str = "x";
const EXTSTATE: &str = "EXTSTATE";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
pub enum ExtStateKey {
    #[strum(serialize = "HZ_REFRESH")]
    HzRefresh,
    #[strum(serialize = "CLIENTDELTA")]
    ClientDelta,
    #[strum(serialize = "TEMPOSSTRING")]
    TempoString,
}

/// A single wwr command. Several are batched into one HTTP request.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    SetExtState {
        namespace: String,
        key: ExtStateKey,
        value: String,
    },
    GetExtState {
        namespace: String,
        key: ExtStateKey,
    },
    /// Command or script id, run once by the host.
    Action(String),
}

impl Command {
    pub fn set(namespace: &str, key: ExtStateKey, value: impl ToString) -> Command {
        Command::SetExtState {
            namespace: namespace.to_string(),
            key,
            value: value.to_string(),
        }
    }

    pub fn get(namespace: &str, key: ExtStateKey) -> Command {
        Command::GetExtState {
            namespace: namespace.to_string(),
            key,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SetExtState {
                namespace,
                key,
                value,
            } => write!(
                f,
                "SET/EXTSTATE/{}/{}/{}",
                encode(namespace),
                key,
                encode(value)
            ),
            Command::GetExtState { namespace, key } => {
                write!(f, "GET/EXTSTATE/{}/{}", encode(namespace), key)
            }
            // Action ids are commonly copied with their trailing separator.
            Command::Action(id) => write!(f, "{}", id.trim_end_matches(';')),
        }
    }
}

/// Everything but RFC 3986 unreserved characters.
const WWR_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn encode(value: &str) -> PercentEncode<'_> {
    utf8_percent_encode(value, WWR_VALUE)
}

#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub seq: u64,
    pub commands: Vec<Command>,
}

impl Request {
    pub fn new(seq: u64, commands: Vec<Command>) -> Request {
        Request { seq, commands }
    }

    /// Path below the web interface root, e.g. `_/GET/EXTSTATE/ns/KEY;`.
    pub fn path(&self) -> String {
        let mut path = String::from("_/");
        for command in &self.commands {
            path.push_str(&command.to_string());
            path.push(';');
        }
        path
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    pub seq: u64,
    pub tokens: Vec<StatusToken>,
}

/// The tab separated fields of one response line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusToken {
    fields: Vec<String>,
}

impl StatusToken {
    pub fn new<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> StatusToken {
        StatusToken {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// The key for `EXTSTATE` lines, the line kind for everything else.
    pub fn category(&self) -> &str {
        match self.fields.as_slice() {
            [kind, _namespace, key, ..] if kind == EXTSTATE => key.as_str(),
            [kind, ..] => kind.as_str(),
            [] => "",
        }
    }

    pub fn payload(&self) -> &str {
        match self.fields.as_slice() {
            [kind, _namespace, _key, value, ..] if kind == EXTSTATE => value.as_str(),
            [kind, ..] if kind == EXTSTATE => "",
            [_kind, value, ..] => value.as_str(),
            _ => "",
        }
    }

    fn is_blank(&self) -> bool {
        self.fields.iter().all(|f| f.is_empty())
    }
}

fn field(i: &str) -> IResult<&str, &str> {
    take_till(|c| c == '\t' || c == '\r' || c == '\n')(i)
}

fn status_line(i: &str) -> IResult<&str, StatusToken> {
    map(separated_list1(char('\t'), field), |fields| {
        StatusToken::new(fields)
    })(i)
}

pub fn parse_response(body: &str) -> Result<Vec<StatusToken>> {
    let (i, tokens) = separated_list0(line_ending, status_line)(body)
        .map_err(|e| anyhow!("error parsing response: {}", e))?;
    if !i.is_empty() {
        return Err(anyhow!("response has trailing data {:?}", i).into());
    }

    Ok(tokens.into_iter().filter(|t| !t.is_blank()).collect())
}

/// Decoded `TEMPOSSTRING` payload: `<project>_<edit cursor>_<playhead>_<rate>`.
///
/// Field text is kept as sent so the display shows exactly what the host
/// formatted. `None` stands for the wire sentinel `x`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TempoSnapshot {
    pub project_bpm: String,
    pub edit_cursor_tempo: Option<String>,
    pub playhead_tempo: Option<String>,
    pub playback_rate: String,
}

fn tempo_field(i: &str) -> IResult<&str, &str> {
    take_till(|c| c == '_')(i)
}

fn numeric(field: &str) -> Option<String> {
    match field.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Some(field.to_string()),
        _ => None,
    }
}

fn optional_numeric(field: &str) -> Option<Option<String>> {
    if field == NONE_SENTINEL {
        Some(None)
    } else {
        numeric(field).map(Some)
    }
}

impl TempoSnapshot {
    /// Returns `None` for tokens that carry some other key.
    pub fn decode(token: &StatusToken) -> Option<Result<TempoSnapshot>> {
        if token.category() != ExtStateKey::TempoString.as_ref() {
            return None;
        }
        Some(Self::parse(token.payload()))
    }

    pub fn parse(payload: &str) -> Result<TempoSnapshot> {
        let malformed = |reason: &str| RemoteError::MalformedPayload {
            payload: payload.to_string(),
            reason: reason.to_string(),
        };

        let (_, fields) = separated_list1(char('_'), tempo_field)(payload)
            .map_err(|_: nom::Err<nom::error::Error<&str>>| malformed("not underscore delimited"))?;
        let (project_bpm, edit_cursor, playhead, rate) = match fields.as_slice() {
            &[a, b, c, d] => (a, b, c, d),
            _ => {
                return Err(malformed(&format!(
                    "expected 4 fields, got {}",
                    fields.len()
                )))
            }
        };

        Ok(TempoSnapshot {
            project_bpm: numeric(project_bpm)
                .ok_or_else(|| malformed("project tempo is not a number"))?,
            edit_cursor_tempo: optional_numeric(edit_cursor)
                .ok_or_else(|| malformed("edit cursor tempo is not a number"))?,
            playhead_tempo: optional_numeric(playhead)
                .ok_or_else(|| malformed("playhead tempo is not a number"))?,
            playback_rate: numeric(rate).ok_or_else(|| malformed("playrate is not a number"))?,
        })
    }

    /// Compared numerically, so `1.0` and `1` are both normal speed.
    pub fn rate_is_unity(&self) -> bool {
        self.playback_rate
            .trim()
            .parse::<f64>()
            .map(|rate| rate == 1.0)
            .unwrap_or(false)
    }
}
