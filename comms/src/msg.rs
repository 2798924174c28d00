use std::{borrow::Cow, fmt, io};

use crate::{Deserialize, Serialize};

type Header = u32;
const HEADER_SIZE: usize = 2 * size_of::<Header>();

const ERR_KIND: Header = 0;
const CONTROL_KIND: Header = 1;
const COUNT_KIND: Header = 2;
const VALUES_KIND: Header = 3;

/// Matching key of a data message.
///
/// A receive only completes with a message sent by the expected peer under the
/// same tag. Messages sharing a tag between the same pair of endpoints are
/// delivered in send order.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(u32);

impl Tag {
    pub const fn new(tag: u32) -> Self {
        Self(tag)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The payload data for the `Data` variant of the `Msg` enum.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload<'a> {
    Count(u64),
    Values(Cow<'a, [f64]>),
}

impl Payload<'_> {
    /// Detaches the payload from the frame buffer it was decoded from.
    pub fn into_owned(self) -> Payload<'static> {
        match self {
            Payload::Count(n) => Payload::Count(n),
            Payload::Values(values) => Payload::Values(Cow::Owned(values.into_owned())),
        }
    }

    pub fn into_count(self) -> io::Result<u64> {
        match self {
            Payload::Count(n) => Ok(n),
            Payload::Values(values) => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("expected a count, got {} values", values.len()),
            )),
        }
    }

    pub fn into_values(self) -> io::Result<Vec<f64>> {
        match self {
            Payload::Values(values) => Ok(values.into_owned()),
            Payload::Count(n) => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("expected values, got the count {n}"),
            )),
        }
    }
}

/// The command for the `Control` variant of the `Msg` enum.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Hello { rank: usize, size: usize },
    Abort { rank: usize, reason: String },
    Disconnect,
}

/// The application layer message exchanged between endpoints.
#[derive(Debug, Clone, PartialEq)]
pub enum Msg<'a> {
    Control(Command),
    Data { tag: Tag, payload: Payload<'a> },
    Err(Cow<'a, str>),
}

impl Msg<'_> {
    /// A short name of the message kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Msg::Control(Command::Hello { .. }) => "control/hello",
            Msg::Control(Command::Abort { .. }) => "control/abort",
            Msg::Control(Command::Disconnect) => "control/disconnect",
            Msg::Data {
                payload: Payload::Count(_),
                ..
            } => "data/count",
            Msg::Data {
                payload: Payload::Values(_),
                ..
            } => "data/values",
            Msg::Err(_) => "err",
        }
    }

    fn invalid<T>(detail: String) -> io::Result<T> {
        Err(io::Error::new(io::ErrorKind::InvalidData, detail))
    }
}

fn write_header(buf: &mut Vec<u8>, kind: Header, tag: Tag) {
    buf.extend_from_slice(&kind.to_be_bytes());
    buf.extend_from_slice(&tag.get().to_be_bytes());
}

fn read_header(word: &[u8]) -> Header {
    Header::from_be_bytes([word[0], word[1], word[2], word[3]])
}

impl<'a> Serialize<'a> for Msg<'_> {
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]> {
        match self {
            Msg::Err(e) => {
                write_header(buf, ERR_KIND, Tag::default());
                Some(e.as_bytes())
            }
            Msg::Control(cmd) => {
                write_header(buf, CONTROL_KIND, Tag::default());

                // `Command` derives its serde impl and only holds strings and
                // integers, writing it into a vector cannot fail.
                serde_json::to_writer(&mut *buf, cmd).expect("control command is always encodable");
                None
            }
            Msg::Data {
                tag,
                payload: Payload::Count(n),
            } => {
                write_header(buf, COUNT_KIND, *tag);
                buf.extend_from_slice(&n.to_be_bytes());
                None
            }
            Msg::Data {
                tag,
                payload: Payload::Values(values),
            } => {
                write_header(buf, VALUES_KIND, *tag);
                Some(bytemuck::cast_slice(values.as_ref()))
            }
        }
    }
}

impl<'a> Deserialize<'a> for Msg<'a> {
    fn deserialize(buf: &'a [u8]) -> io::Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Self::invalid(format!(
                "the given buffer is too small {}, must at least be {HEADER_SIZE} bytes",
                buf.len()
            ));
        }

        let (header, body) = buf.split_at(HEADER_SIZE);
        let kind = read_header(&header[..4]);
        let tag = Tag::new(read_header(&header[4..]));

        match kind {
            ERR_KIND => {
                let detail = str::from_utf8(body)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

                Ok(Self::Err(Cow::Borrowed(detail)))
            }
            CONTROL_KIND => {
                let cmd = serde_json::from_slice(body)?;
                Ok(Self::Control(cmd))
            }
            COUNT_KIND => {
                let Ok(word) = <[u8; 8]>::try_from(body) else {
                    return Self::invalid(format!("count body of {} bytes", body.len()));
                };

                Ok(Self::Data {
                    tag,
                    payload: Payload::Count(u64::from_be_bytes(word)),
                })
            }
            VALUES_KIND => {
                let values = bytemuck::try_cast_slice(body).map_err(|e| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("values body of {} bytes: {e:?}", body.len()),
                    )
                })?;

                Ok(Self::Data {
                    tag,
                    payload: Payload::Values(Cow::Borrowed(values)),
                })
            }
            byte => Self::invalid(format!("received an invalid kind {byte}")),
        }
    }
}
