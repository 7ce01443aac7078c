use crate::TempoSnapshot;

#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Tempo(TempoSnapshot),
    /// A `TEMPOSSTRING` value that could not be decoded. The display keeps
    /// showing the previous snapshot.
    MalformedTempo(String),
    HostUnreachable(String),
    HostReachable,
}
