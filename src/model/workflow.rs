//! Protocol configuration and abstract message traces handed to the
//! executor. Both are plain owned data: `clone()` yields an independent
//! deep copy with no sharing between original and copy.

use serde::{Deserialize, Serialize};

use std::collections::BTreeSet;

use crate::{
    AlertDescription, CertificateKeyPair, CipherSuite, ExtensionType, KeyExchangeAlgorithm,
    NamedGroup, ProtocolVersion, SigHash,
};

/// Role of the system under test. The tester plays the opposite side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestEndpoint {
    /// The target initiates the handshake; the tester acts as server.
    Client,
    /// The target responds; the tester acts as client.
    Server,
}

impl TestEndpoint {
    pub fn tester(self) -> Peer {
        match self {
            Self::Client => Peer::Server,
            Self::Server => Peer::Client,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Peer {
    Client,
    Server,
}

/// Values one peer advertises.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerOffer {
    pub cipher_suites: Vec<CipherSuite>,
    pub named_groups: Vec<NamedGroup>,
    pub signature_algorithms: Vec<SigHash>,
    pub extensions: BTreeSet<ExtensionType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptionTarget {
    Mac,
    Ciphertext,
    AuthTag,
    Padding,
    PrfOutput,
    Signature,
}

/// Flip one bit of one byte in the targeted field before sending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Corruption {
    pub target: CorruptionTarget,
    pub byte: u16,
    pub bit: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    pub client: PeerOffer,
    pub server: PeerOffer,
    pub selected_cipher_suite: Option<CipherSuite>,
    pub selected_named_group: Option<NamedGroup>,
    pub selected_signature: Option<SigHash>,
    pub highest_version: ProtocolVersion,
    /// Version written into record headers, if it differs from the negotiated one.
    pub record_version: Option<ProtocolVersion>,
    pub max_record_length: Option<u16>,
    pub tcp_fragmentation: bool,
    pub app_message_length: Option<u16>,
    pub additional_padding: Option<u16>,
    pub compression_method: Option<u8>,
    pub max_fragment_length: Option<u8>,
    pub alert: Option<AlertDescription>,
    pub hello_retry_cookie: bool,
    pub certificate: Option<CertificateKeyPair>,
    pub corruptions: Vec<Corruption>,
}

impl TlsConfig {
    pub fn new(version: ProtocolVersion) -> Self {
        Self {
            client: PeerOffer::default(),
            server: PeerOffer::default(),
            selected_cipher_suite: None,
            selected_named_group: None,
            selected_signature: None,
            highest_version: version,
            record_version: None,
            max_record_length: None,
            tcp_fragmentation: false,
            app_message_length: None,
            additional_padding: None,
            compression_method: None,
            max_fragment_length: None,
            alert: None,
            hello_retry_cookie: false,
            certificate: None,
            corruptions: Vec::new(),
        }
    }

    pub fn offer(&self, peer: Peer) -> &PeerOffer {
        match peer {
            Peer::Client => &self.client,
            Peer::Server => &self.server,
        }
    }

    pub fn offer_mut(&mut self, peer: Peer) -> &mut PeerOffer {
        match peer {
            Peer::Client => &mut self.client,
            Peer::Server => &mut self.server,
        }
    }

    pub fn set_extension(&mut self, peer: Peer, ext: ExtensionType, enabled: bool) {
        let exts = &mut self.offer_mut(peer).extensions;
        if enabled {
            exts.insert(ext);
        } else {
            exts.remove(&ext);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    ClientHello,
    ServerHello,
    HelloRetryRequest,
    EncryptedExtensions,
    Certificate,
    CertificateVerify,
    ServerKeyExchange { kx: KeyExchangeAlgorithm },
    ServerHelloDone,
    ClientKeyExchange { kx: KeyExchangeAlgorithm },
    ChangeCipherSpec,
    Finished,
    Alert {
        fatal: bool,
        #[serde(default)]
        description: Option<AlertDescription>,
    },
    ApplicationData { len: u16 },
    Heartbeat,
}

impl Message {
    pub fn carries_key_exchange(&self) -> bool {
        matches!(
            self,
            Self::ServerKeyExchange { .. } | Self::ClientKeyExchange { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::ClientHello => "CLIENT_HELLO",
            Self::ServerHello => "SERVER_HELLO",
            Self::HelloRetryRequest => "HELLO_RETRY_REQUEST",
            Self::EncryptedExtensions => "ENCRYPTED_EXTENSIONS",
            Self::Certificate => "CERTIFICATE",
            Self::CertificateVerify => "CERTIFICATE_VERIFY",
            Self::ServerKeyExchange { .. } => "SERVER_KEY_EXCHANGE",
            Self::ServerHelloDone => "SERVER_HELLO_DONE",
            Self::ClientKeyExchange { .. } => "CLIENT_KEY_EXCHANGE",
            Self::ChangeCipherSpec => "CHANGE_CIPHER_SPEC",
            Self::Finished => "FINISHED",
            Self::Alert { .. } => "ALERT",
            Self::ApplicationData { .. } => "APPLICATION_DATA",
            Self::Heartbeat => "HEARTBEAT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Send,
    Receive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceAction {
    pub direction: Direction,
    pub messages: Vec<Message>,
    /// The executor tolerates this action failing.
    #[serde(default)]
    pub may_fail: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowTrace {
    pub actions: Vec<TraceAction>,
}

impl WorkflowTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(mut self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.push(Direction::Send, messages, false);
        self
    }

    pub fn send_may_fail(mut self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.push(Direction::Send, messages, true);
        self
    }

    pub fn receive(mut self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.push(Direction::Receive, messages, false);
        self
    }

    pub fn push(
        &mut self,
        direction: Direction,
        messages: impl IntoIterator<Item = Message>,
        may_fail: bool,
    ) {
        self.actions.push(TraceAction {
            direction,
            messages: messages.into_iter().collect(),
            may_fail,
        });
    }

    pub fn messages(&self) -> impl Iterator<Item = (Direction, &Message)> + '_ {
        self.actions
            .iter()
            .flat_map(|a| a.messages.iter().map(move |m| (a.direction, m)))
    }

    /// Tester-side view of a complete handshake against `endpoint`.
    pub fn handshake(endpoint: TestEndpoint, kx: KeyExchangeAlgorithm) -> Self {
        let (out, inc) = match endpoint {
            TestEndpoint::Server => (Direction::Send, Direction::Receive),
            TestEndpoint::Client => (Direction::Receive, Direction::Send),
        };
        let mut trace = Self::new();
        if kx == KeyExchangeAlgorithm::Tls13 {
            trace.push(out, [Message::ClientHello], false);
            trace.push(
                inc,
                [
                    Message::ServerHello,
                    Message::EncryptedExtensions,
                    Message::Certificate,
                    Message::CertificateVerify,
                    Message::Finished,
                ],
                false,
            );
            trace.push(out, [Message::Finished], false);
            return trace;
        }

        let mut server_flight = vec![Message::ServerHello, Message::Certificate];
        if kx.uses_server_key_exchange() {
            server_flight.push(Message::ServerKeyExchange { kx });
        }
        server_flight.push(Message::ServerHelloDone);

        trace.push(out, [Message::ClientHello], false);
        trace.push(inc, server_flight, false);
        trace.push(
            out,
            [
                Message::ClientKeyExchange { kx },
                Message::ChangeCipherSpec,
                Message::Finished,
            ],
            false,
        );
        trace.push(inc, [Message::ChangeCipherSpec, Message::Finished], false);
        trace
    }

    /// Drop everything from the first tester-sent action containing a
    /// message matching `pred`.
    pub fn truncate_before_sending(
        &mut self,
        tester_out: Direction,
        pred: impl Fn(&Message) -> bool,
    ) {
        if let Some(idx) = self
            .actions
            .iter()
            .position(|a| a.direction == tester_out && a.messages.iter().any(&pred))
        {
            self.actions.truncate(idx);
        }
    }

    /// Rebuild every key-exchange message for `to`. A ServerKeyExchange is
    /// dropped when `to` does not use one and inserted before
    /// ServerHelloDone when `to` needs one the trace lacks. Returns the
    /// number of messages rebuilt, dropped or inserted.
    pub fn regenerate_key_exchange(&mut self, to: KeyExchangeAlgorithm) -> usize {
        let mut touched = 0usize;
        let mut has_server_kx = false;
        for action in &mut self.actions {
            let before = std::mem::take(&mut action.messages);
            for msg in before {
                match msg {
                    Message::ServerKeyExchange { .. } => {
                        touched += 1;
                        if to.uses_server_key_exchange() {
                            has_server_kx = true;
                            action.messages.push(Message::ServerKeyExchange { kx: to });
                        }
                    }
                    Message::ClientKeyExchange { .. } => {
                        touched += 1;
                        action.messages.push(Message::ClientKeyExchange { kx: to });
                    }
                    other => action.messages.push(other),
                }
            }
        }
        if to.uses_server_key_exchange() && !has_server_kx {
            for action in &mut self.actions {
                if let Some(pos) = action
                    .messages
                    .iter()
                    .position(|m| *m == Message::ServerHelloDone)
                {
                    action.messages.insert(pos, Message::ServerKeyExchange { kx: to });
                    touched += 1;
                    break;
                }
            }
        }
        self.actions.retain(|a| !a.messages.is_empty());
        touched
    }
}
