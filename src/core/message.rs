//! # Line-Message Codec
//!
//! Pipe-delimited, carriage-return-separated text messages: the grammar
//! both the handshake and the payload transfer ride on over the socket
//! transport.
//!
//! Segments are typed, fixed-shape builders. Each kind exposes named
//! setters for exactly the fields this protocol uses, so an out-of-range
//! field index is unrepresentable rather than a runtime failure at
//! serialization time.
//!
//! ## Grammar
//! ```text
//! message  = header-segment *( CR segment )
//! segment  = tag *( "|" field )
//! ```
//! Decoding tolerates line feeds as segment separators; encoding always
//! emits carriage returns.

use crate::error::{constants, ProtocolError, Result};
use crate::utils::time;

/// Field separator within a segment.
pub const FIELD_SEPARATOR: char = '|';

/// Segment separator on encode.
pub const SEGMENT_SEPARATOR: char = '\r';

/// Encoding-characters field carried in every header segment.
pub const ENCODING_CHARACTERS: &str = "^~\\&";

/// Grammar version advertised in the header.
pub const VERSION: &str = "2.5";

/// Processing id advertised in the header.
pub const PROCESSING_ID: &str = "P";

/// Observation-identifier tags used by this protocol.
pub mod tags {
    /// Base64-encoded KEM public key (handshake response)
    pub const PUBLIC_KEY: &str = "KYBER_PK";
    /// AEAD nonce
    pub const NONCE: &str = "NONCE";
    /// KEM ciphertext (encapsulated key)
    pub const KEM_CIPHERTEXT: &str = "KYBER_CT";
    /// Whole AEAD ciphertext in a single field
    pub const CIPHERTEXT: &str = "ECG_CIPHERTEXT_B64";
    /// One slice of a chunked AEAD ciphertext; full form `ECG_CHUNK^<n>`
    pub const CHUNK: &str = "ECG_CHUNK";
    /// Plaintext serialization advertisement (`JSON` | `XML`)
    pub const FORMAT: &str = "ECG_FORMAT";
    /// Human-readable report line accompanying a transfer
    pub const REPORT: &str = "ECGRESULT";
    /// Record identifier accompanying a transfer
    pub const RECORD_ID: &str = "ECG_ID";
}

/// Message type carried in the header segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Public-key query
    Query,
    /// Public-key query response
    QueryResponse,
    /// Observation result carrying a sealed payload
    ObservationResult,
    /// Receipt acknowledgement
    Acknowledgement,
}

impl MessageKind {
    /// Wire tag for the header type field
    pub fn tag(self) -> &'static str {
        match self {
            MessageKind::Query => "QBP^Q11",
            MessageKind::QueryResponse => "RSP^K11",
            MessageKind::ObservationResult => "ORU^R01",
            MessageKind::Acknowledgement => "ACK^R01",
        }
    }

    /// Parse a wire tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "QBP^Q11" => Some(MessageKind::Query),
            "RSP^K11" => Some(MessageKind::QueryResponse),
            "ORU^R01" => Some(MessageKind::ObservationResult),
            "ACK^R01" => Some(MessageKind::Acknowledgement),
            _ => None,
        }
    }
}

/// Observation value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// Text value
    Text,
    /// Reference pointer (a URL to out-of-band content)
    ReferencePointer,
}

impl ValueType {
    fn tag(self) -> &'static str {
        match self {
            ValueType::Text => "TX",
            ValueType::ReferencePointer => "RP",
        }
    }
}

/// Header segment (`MSH`): mandatory, always first.
#[derive(Debug, Clone)]
pub struct HeaderSegment {
    sending_app: String,
    sending_facility: String,
    receiving_app: String,
    receiving_facility: String,
    timestamp: String,
    kind: MessageKind,
    control_id: String,
}

impl HeaderSegment {
    /// Build a header with the current wall-clock timestamp.
    ///
    /// # Errors
    /// Fails only if the system clock reads before the Unix epoch.
    pub fn new(kind: MessageKind, control_id: impl Into<String>) -> Result<Self> {
        Ok(Self {
            sending_app: String::from("ClientApp"),
            sending_facility: String::from("ClientFac"),
            receiving_app: String::from("ServerApp"),
            receiving_facility: String::from("ServerFac"),
            timestamp: time::compact_timestamp()?,
            kind,
            control_id: control_id.into(),
        })
    }

    /// Override the sending application and facility.
    pub fn sender(mut self, app: impl Into<String>, facility: impl Into<String>) -> Self {
        self.sending_app = app.into();
        self.sending_facility = facility.into();
        self
    }

    /// Override the receiving application and facility.
    pub fn receiver(mut self, app: impl Into<String>, facility: impl Into<String>) -> Self {
        self.receiving_app = app.into();
        self.receiving_facility = facility.into();
        self
    }

    /// The message type this header announces.
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// The control id echoed by acknowledgements.
    pub fn control_id(&self) -> &str {
        &self.control_id
    }

    fn encode(&self) -> String {
        // Field 8 (security) is never set by this protocol and encodes empty.
        format!(
            "MSH|{}|{}|{}|{}|{}|{}||{}|{}|{}|{}",
            ENCODING_CHARACTERS,
            self.sending_app,
            self.sending_facility,
            self.receiving_app,
            self.receiving_facility,
            self.timestamp,
            self.kind.tag(),
            self.control_id,
            PROCESSING_ID,
            VERSION,
        )
    }
}

/// Patient-identifier segment (`PID`).
#[derive(Debug, Clone)]
pub struct PatientSegment {
    id: String,
    name: String,
    birth_date: String,
    sex: String,
}

impl PatientSegment {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            birth_date: String::new(),
            sex: String::new(),
        }
    }

    pub fn birth_date(mut self, date: impl Into<String>) -> Self {
        self.birth_date = date.into();
        self
    }

    pub fn sex(mut self, sex: impl Into<String>) -> Self {
        self.sex = sex.into();
        self
    }

    fn encode(&self) -> String {
        format!(
            "PID|||{}||{}||{}|{}",
            self.id, self.name, self.birth_date, self.sex
        )
    }
}

/// Order segment (`OBR`).
#[derive(Debug, Clone)]
pub struct OrderSegment {
    set_id: u32,
    order_number: String,
    service: String,
    timestamp: String,
}

impl OrderSegment {
    /// Build an order segment with the current wall-clock timestamp.
    pub fn new(set_id: u32, order_number: impl Into<String>) -> Result<Self> {
        Ok(Self {
            set_id,
            order_number: order_number.into(),
            service: String::from("ECG^Electrocardiogram"),
            timestamp: time::compact_timestamp()?,
        })
    }

    fn encode(&self) -> String {
        format!(
            "OBR|{}|{}||{}|||{}",
            self.set_id, self.order_number, self.service, self.timestamp
        )
    }
}

/// Observation segment (`OBX`).
#[derive(Debug, Clone)]
pub struct ObservationSegment {
    set_id: u32,
    value_type: ValueType,
    identifier: String,
    value: String,
}

impl ObservationSegment {
    /// A text observation: `identifier` is the lookup tag, optionally
    /// `TAG^Description`.
    pub fn text(set_id: u32, identifier: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            set_id,
            value_type: ValueType::Text,
            identifier: identifier.into(),
            value: value.into(),
        }
    }

    /// A reference-pointer observation (a retrievable URL).
    pub fn reference(set_id: u32, identifier: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            set_id,
            value_type: ValueType::ReferencePointer,
            identifier: identifier.into(),
            value: url.into(),
        }
    }

    fn encode(&self) -> String {
        format!(
            "OBX|{}|{}|{}||{}||||||F",
            self.set_id,
            self.value_type.tag(),
            self.identifier,
            self.value
        )
    }
}

/// Query-parameter segment (`QPD`).
#[derive(Debug, Clone)]
pub struct QuerySegment {
    definition: String,
    parameters: Vec<String>,
}

impl QuerySegment {
    pub fn new(definition: impl Into<String>) -> Self {
        Self {
            definition: definition.into(),
            parameters: Vec::new(),
        }
    }

    pub fn parameter(mut self, value: impl Into<String>) -> Self {
        self.parameters.push(value.into());
        self
    }

    fn encode(&self) -> String {
        let mut line = format!("QPD|{}", self.definition);
        for parameter in &self.parameters {
            line.push(FIELD_SEPARATOR);
            line.push_str(parameter);
        }
        line
    }
}

/// Acknowledgement code carried in an `MSA` segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckCode {
    /// Application accept
    Accept,
    /// Application error
    Error,
}

impl AckCode {
    fn tag(self) -> &'static str {
        match self {
            AckCode::Accept => "AA",
            AckCode::Error => "AE",
        }
    }
}

/// Acknowledgement segment (`MSA`).
#[derive(Debug, Clone)]
pub struct AckSegment {
    code: AckCode,
    control_id: String,
}

impl AckSegment {
    pub fn new(code: AckCode, control_id: impl Into<String>) -> Self {
        Self {
            code,
            control_id: control_id.into(),
        }
    }

    fn encode(&self) -> String {
        format!("MSA|{}|{}", self.code.tag(), self.control_id)
    }
}

/// Any non-header segment.
#[derive(Debug, Clone)]
pub enum Segment {
    Patient(PatientSegment),
    Order(OrderSegment),
    Observation(ObservationSegment),
    Query(QuerySegment),
    Ack(AckSegment),
}

impl Segment {
    fn encode(&self) -> String {
        match self {
            Segment::Patient(s) => s.encode(),
            Segment::Order(s) => s.encode(),
            Segment::Observation(s) => s.encode(),
            Segment::Query(s) => s.encode(),
            Segment::Ack(s) => s.encode(),
        }
    }
}

/// An outbound message: one header plus ordered segments.
#[derive(Debug, Clone)]
pub struct LineMessage {
    header: HeaderSegment,
    segments: Vec<Segment>,
}

impl LineMessage {
    pub fn new(header: HeaderSegment) -> Self {
        Self {
            header,
            segments: Vec::new(),
        }
    }

    /// Append a segment, preserving emission order.
    pub fn push(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    /// Builder-style [`push`](Self::push).
    pub fn with(mut self, segment: Segment) -> Self {
        self.push(segment);
        self
    }

    pub fn header(&self) -> &HeaderSegment {
        &self.header
    }

    /// Serialize to the wire text form.
    pub fn encode(&self) -> String {
        let mut out = self.header.encode();
        for segment in &self.segments {
            out.push(SEGMENT_SEPARATOR);
            out.push_str(&segment.encode());
        }
        out
    }
}

/// A decoded inbound message: positional field arrays per segment.
#[derive(Debug, Clone)]
pub struct DecodedMessage {
    segments: Vec<Vec<String>>,
}

impl DecodedMessage {
    /// Split on segment separators (tolerating line feeds), then on field
    /// separators. Empty lines are dropped.
    pub fn decode(text: &str) -> Result<Self> {
        let segments: Vec<Vec<String>> = text
            .split(['\r', '\n'])
            .filter(|line| !line.is_empty())
            .map(|line| {
                line.split(FIELD_SEPARATOR)
                    .map(str::to_owned)
                    .collect::<Vec<_>>()
            })
            .collect();

        if segments.is_empty() {
            return Err(ProtocolError::MalformedMessage(
                constants::ERR_EMPTY_MESSAGE.into(),
            ));
        }
        Ok(Self { segments })
    }

    /// The message type tag from the header segment, if present.
    pub fn message_kind(&self) -> Option<MessageKind> {
        self.header_field(8).and_then(MessageKind::from_tag)
    }

    /// The control id from the header segment, if present.
    pub fn control_id(&self) -> Option<&str> {
        self.header_field(9)
    }

    fn header_field(&self, index: usize) -> Option<&str> {
        self.segments
            .iter()
            .find(|fields| fields.first().map(String::as_str) == Some("MSH"))
            .and_then(|fields| fields.get(index))
            .map(String::as_str)
    }

    /// Value field of the first observation segment whose identifier
    /// starts with `tag`.
    ///
    /// Scans every `OBX` line regardless of grouping or nesting; lines too
    /// short to carry a value field are skipped.
    pub fn observation_value(&self, tag: &str) -> Result<&str> {
        self.observations()
            .find(|(identifier, _)| identifier.starts_with(tag))
            .map(|(_, value)| value)
            .ok_or_else(|| ProtocolError::FieldNotFound(tag.to_owned()))
    }

    /// All `(identifier, value)` observation pairs in message order.
    pub fn observations(&self) -> impl Iterator<Item = (&str, &str)> {
        self.segments
            .iter()
            .filter(|fields| fields.first().map(String::as_str) == Some("OBX"))
            .filter(|fields| fields.len() >= 6)
            .map(|fields| (fields[3].as_str(), fields[5].as_str()))
    }

    /// Whether an acknowledgement segment with the accept code is present.
    pub fn is_accepted(&self) -> bool {
        self.segments.iter().any(|fields| {
            fields.first().map(String::as_str) == Some("MSA")
                && fields.get(1).map(String::as_str) == Some("AA")
        })
    }
}
