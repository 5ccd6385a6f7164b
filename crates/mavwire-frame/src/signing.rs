use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::BufMut;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{KeyError, SignatureFailure};
use crate::header::{Header, SIGNATURE_LEN};

pub const SECRET_KEY_LEN: usize = 32;

pub const TAG_LEN: usize = 6;

/// Signing epoch, 2015-01-01T00:00:00Z, in Unix seconds.
pub const SIGNING_EPOCH_UNIX_SECS: u64 = 1_420_070_400;

/// Timestamps are 48-bit counts of 10 microsecond ticks.
pub const MAX_TIMESTAMP: u64 = (1 << 48) - 1;

/// One minute in timestamp ticks.
pub const DEFAULT_NEW_STREAM_WINDOW: u64 = 6_000_000;

/// 32-byte shared secret. `Debug` never prints the key.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey([u8; SECRET_KEY_LEN]);

impl SecretKey {
    pub fn new(bytes: [u8; SECRET_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        let key: [u8; SECRET_KEY_LEN] = bytes
            .try_into()
            .map_err(|_| KeyError::InvalidLength(bytes.len()))?;
        Ok(Self(key))
    }

    /// Parse a 64 character hex string.
    pub fn from_hex(text: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(text.trim())?;
        Self::from_slice(&bytes)
    }

    /// Key derived as the SHA-256 of a passphrase, the convention ground
    /// stations use for typed-in keys.
    pub fn from_passphrase(passphrase: &str) -> Self {
        Self(Sha256::digest(passphrase.as_bytes()).into())
    }

    pub fn as_bytes(&self) -> &[u8; SECRET_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey(<redacted:{} bytes>)", self.0.len())
    }
}

/// Signing clock value in 10 microsecond ticks since the signing epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SigningTimestamp(u64);

impl SigningTimestamp {
    pub const fn new(ticks: u64) -> Self {
        Self(ticks & MAX_TIMESTAMP)
    }

    /// Current wall clock. Clocks set before the epoch read as zero.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_micros())
            .unwrap_or(0);
        Self::from_unix_micros(u64::try_from(micros).unwrap_or(u64::MAX))
    }

    pub fn from_unix_micros(micros: u64) -> Self {
        let since_epoch = micros.saturating_sub(SIGNING_EPOCH_UNIX_SECS * 1_000_000);
        Self::new(since_epoch / 10)
    }

    pub const fn ticks(self) -> u64 {
        self.0
    }
}

/// The 13-byte signature block trailing a signed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub link_id: u8,
    pub timestamp: u64,
    pub tag: [u8; TAG_LEN],
}

impl Signature {
    /// Parse a signature block. `bytes` must be exactly 13 bytes long.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != SIGNATURE_LEN {
            return None;
        }
        let mut timestamp = [0u8; 8];
        timestamp[..6].copy_from_slice(&bytes[1..7]);
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&bytes[7..13]);
        Some(Self {
            link_id: bytes[0],
            timestamp: u64::from_le_bytes(timestamp),
            tag,
        })
    }

    pub fn write(&self, dst: &mut impl BufMut) {
        dst.put_u8(self.link_id);
        dst.put_slice(&self.timestamp.to_le_bytes()[..6]);
        dst.put_slice(&self.tag);
    }
}

/// First six bytes of SHA-256 over key, frame, link id and timestamp.
///
/// `frame` runs from the start marker through the checksum.
pub fn compute_tag(key: &SecretKey, frame: &[u8], link_id: u8, timestamp: u64) -> [u8; TAG_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update(frame);
    hasher.update([link_id]);
    hasher.update(&timestamp.to_le_bytes()[..6]);
    let digest = hasher.finalize();

    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&digest[..TAG_LEN]);
    tag
}

/// Decides whether an unsigned frame is accepted while a key is configured.
pub type AllowUnsigned = Arc<dyn Fn(&Header) -> bool + Send + Sync>;

/// Signing configuration for one connection.
#[derive(Debug, Clone)]
pub struct SigningConfig {
    /// Without a key, signing and verification are disabled.
    pub secret_key: Option<SecretKey>,
    /// Link id stamped into outgoing signatures.
    pub link_id: u8,
    /// Sign outgoing extended frames when a key is configured.
    pub sign_outgoing: bool,
    /// How far behind the local clock the first timestamp of an unseen
    /// stream may be, in ticks.
    pub new_stream_window: u64,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            link_id: 0,
            sign_outgoing: true,
            new_stream_window: DEFAULT_NEW_STREAM_WINDOW,
        }
    }
}

impl SigningConfig {
    pub fn with_key(secret_key: SecretKey) -> Self {
        Self {
            secret_key: Some(secret_key),
            ..Self::default()
        }
    }
}

/// Outcome counters of a signing context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SigningCounters {
    /// Outgoing frames signed.
    pub sig_count: u64,
    pub goodsig_count: u64,
    pub badsig_count: u64,
    pub unsigned_count: u64,
    /// Signed frames refused for their timestamp.
    pub reject_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct StreamKey {
    link_id: u8,
    system_id: u8,
    component_id: u8,
}

/// Per-connection signing state.
///
/// Tracks the outgoing timestamp and the last accepted timestamp for every
/// `(link id, system id, component id)` stream seen.
#[derive(Clone)]
pub struct SigningContext {
    config: SigningConfig,
    allow_unsigned: Option<AllowUnsigned>,
    timestamp: u64,
    streams: HashMap<StreamKey, u64>,
    counters: SigningCounters,
}

impl SigningContext {
    pub fn new(config: SigningConfig) -> Self {
        Self {
            config,
            allow_unsigned: None,
            timestamp: 0,
            streams: HashMap::new(),
            counters: SigningCounters::default(),
        }
    }

    /// Install the policy consulted for unsigned frames.
    pub fn set_allow_unsigned(&mut self, policy: Option<AllowUnsigned>) {
        self.allow_unsigned = policy;
    }

    pub fn with_allow_unsigned<F>(mut self, policy: F) -> Self
    where
        F: Fn(&Header) -> bool + Send + Sync + 'static,
    {
        self.allow_unsigned = Some(Arc::new(policy));
        self
    }

    pub fn config(&self) -> &SigningConfig {
        &self.config
    }

    /// True when a secret key is configured.
    pub fn is_enabled(&self) -> bool {
        self.config.secret_key.is_some()
    }

    pub fn signs_outgoing(&self) -> bool {
        self.is_enabled() && self.config.sign_outgoing
    }

    pub fn link_id(&self) -> u8 {
        self.config.link_id
    }

    pub fn counters(&self) -> SigningCounters {
        self.counters
    }

    /// Last timestamp used for an outgoing signature, or caught up from an
    /// accepted one.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Last accepted timestamp for a stream.
    pub fn stream_timestamp(&self, link_id: u8, system_id: u8, component_id: u8) -> Option<u64> {
        self.streams
            .get(&StreamKey {
                link_id,
                system_id,
                component_id,
            })
            .copied()
    }

    /// Reserve the next outgoing timestamp: `now`, or one past the last
    /// value when the clock has not moved forward.
    pub fn next_timestamp(&mut self, now: SigningTimestamp) -> u64 {
        let next = if now.ticks() > self.timestamp {
            now.ticks()
        } else {
            self.timestamp.saturating_add(1).min(MAX_TIMESTAMP)
        };
        self.timestamp = next;
        next
    }

    /// Sign `frame` (start marker through checksum) with the wall clock.
    ///
    /// Returns `None` when no key is configured.
    pub fn sign(&mut self, frame: &[u8]) -> Option<Signature> {
        self.sign_at(frame, SigningTimestamp::now())
    }

    pub fn sign_at(&mut self, frame: &[u8], now: SigningTimestamp) -> Option<Signature> {
        if !self.is_enabled() {
            return None;
        }
        let timestamp = self.next_timestamp(now);
        let key = self.config.secret_key.as_ref()?;
        let tag = compute_tag(key, frame, self.config.link_id, timestamp);
        self.counters.sig_count += 1;
        Some(Signature {
            link_id: self.config.link_id,
            timestamp,
            tag,
        })
    }

    /// Verify a complete signed frame against the wall clock.
    pub fn verify(&mut self, frame: &[u8], header: &Header) -> Result<(), SignatureFailure> {
        self.verify_at(frame, header, SigningTimestamp::now())
    }

    /// Verify a complete signed frame, signature block included.
    ///
    /// Succeeds without checking anything when no key is configured.
    pub fn verify_at(
        &mut self,
        frame: &[u8],
        header: &Header,
        now: SigningTimestamp,
    ) -> Result<(), SignatureFailure> {
        let Some(key) = &self.config.secret_key else {
            return Ok(());
        };

        let split = frame.len().saturating_sub(SIGNATURE_LEN);
        let Some(signature) = Signature::from_bytes(&frame[split..]) else {
            self.counters.badsig_count += 1;
            return Err(SignatureFailure::BadTag);
        };

        let stream = StreamKey {
            link_id: signature.link_id,
            system_id: header.system_id,
            component_id: header.component_id,
        };
        match self.streams.get(&stream) {
            Some(&last) if signature.timestamp <= last => {
                self.counters.reject_count += 1;
                tracing::warn!(
                    link_id = signature.link_id,
                    system_id = header.system_id,
                    component_id = header.component_id,
                    timestamp = signature.timestamp,
                    last,
                    "rejecting replayed signature"
                );
                return Err(SignatureFailure::Replay {
                    timestamp: signature.timestamp,
                    last,
                });
            }
            Some(_) => {}
            None => {
                let reference = self.timestamp.max(now.ticks());
                if signature
                    .timestamp
                    .saturating_add(self.config.new_stream_window)
                    < reference
                {
                    self.counters.reject_count += 1;
                    tracing::warn!(
                        link_id = signature.link_id,
                        timestamp = signature.timestamp,
                        "rejecting stale timestamp on new stream"
                    );
                    return Err(SignatureFailure::StaleStream {
                        timestamp: signature.timestamp,
                    });
                }
            }
        }

        let expected = compute_tag(
            key,
            &frame[..split],
            signature.link_id,
            signature.timestamp,
        );
        if !bool::from(expected.ct_eq(&signature.tag)) {
            self.counters.badsig_count += 1;
            tracing::warn!(
                message_id = header.message_id,
                system_id = header.system_id,
                "signature tag mismatch"
            );
            return Err(SignatureFailure::BadTag);
        }

        self.streams.insert(stream, signature.timestamp);
        self.timestamp = self.timestamp.max(signature.timestamp);
        self.counters.goodsig_count += 1;
        Ok(())
    }

    /// Apply the allow-unsigned policy to an unsigned frame.
    ///
    /// Succeeds when no key is configured.
    pub fn check_unsigned(&mut self, header: &Header) -> Result<(), SignatureFailure> {
        if !self.is_enabled() {
            return Ok(());
        }
        if let Some(policy) = &self.allow_unsigned {
            if policy(header) {
                return Ok(());
            }
        }
        self.counters.unsigned_count += 1;
        tracing::debug!(
            message_id = header.message_id,
            system_id = header.system_id,
            "refusing unsigned frame"
        );
        Err(SignatureFailure::Unsigned)
    }
}

impl fmt::Debug for SigningContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningContext")
            .field("config", &self.config)
            .field("allow_unsigned", &self.allow_unsigned.is_some())
            .field("timestamp", &self.timestamp)
            .field("streams", &self.streams.len())
            .field("counters", &self.counters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{ProtocolVersion, IFLAG_SIGNED};

    const KEY: [u8; 32] = [0x42; 32];

    fn header() -> Header {
        Header {
            version: ProtocolVersion::V2,
            payload_len: 1,
            incompat_flags: IFLAG_SIGNED,
            compat_flags: 0,
            sequence: 0,
            system_id: 1,
            component_id: 1,
            message_id: 0,
        }
    }

    fn context() -> SigningContext {
        SigningContext::new(SigningConfig {
            link_id: 3,
            ..SigningConfig::with_key(SecretKey::new(KEY))
        })
    }

    fn signed_frame(ctx: &mut SigningContext, now: u64) -> Vec<u8> {
        let mut frame = vec![0xFD, 1, IFLAG_SIGNED, 0, 0, 1, 1, 0, 0, 0, 0x2A, 0x11, 0x22];
        let signature = ctx.sign_at(&frame, SigningTimestamp::new(now)).unwrap();
        signature.write(&mut frame);
        frame
    }

    #[test]
    fn key_parsing() {
        let hex_key = "42".repeat(32);
        assert_eq!(SecretKey::from_hex(&hex_key).unwrap(), SecretKey::new(KEY));
        assert_eq!(
            SecretKey::from_slice(&[0; 31]),
            Err(KeyError::InvalidLength(31))
        );
        assert!(matches!(
            SecretKey::from_hex("zz"),
            Err(KeyError::InvalidHex(_))
        ));
        assert!(!format!("{:?}", SecretKey::new(KEY)).contains("42"));
    }

    #[test]
    fn timestamp_epoch() {
        let at_epoch = SigningTimestamp::from_unix_micros(SIGNING_EPOCH_UNIX_SECS * 1_000_000);
        assert_eq!(at_epoch.ticks(), 0);
        let one_second =
            SigningTimestamp::from_unix_micros((SIGNING_EPOCH_UNIX_SECS + 1) * 1_000_000);
        assert_eq!(one_second.ticks(), 100_000);
        assert_eq!(SigningTimestamp::from_unix_micros(0).ticks(), 0);
    }

    #[test]
    fn outgoing_timestamps_never_go_backwards() {
        let mut ctx = context();
        assert_eq!(ctx.next_timestamp(SigningTimestamp::new(100)), 100);
        assert_eq!(ctx.next_timestamp(SigningTimestamp::new(50)), 101);
        assert_eq!(ctx.next_timestamp(SigningTimestamp::new(101)), 102);
        assert_eq!(ctx.next_timestamp(SigningTimestamp::new(500)), 500);
    }

    #[test]
    fn signature_block_layout() {
        let sig = Signature {
            link_id: 3,
            timestamp: 0x0000_0605_0403_0201,
            tag: [9, 8, 7, 6, 5, 4],
        };
        let mut buf = Vec::new();
        sig.write(&mut buf);
        assert_eq!(buf, [3, 1, 2, 3, 4, 5, 6, 9, 8, 7, 6, 5, 4]);
        assert_eq!(Signature::from_bytes(&buf), Some(sig));
        assert_eq!(Signature::from_bytes(&buf[..12]), None);
    }

    #[test]
    fn no_key_means_no_signature() {
        let mut ctx = SigningContext::new(SigningConfig::default());
        assert!(ctx.sign_at(&[0xFD], SigningTimestamp::new(1)).is_none());
        assert!(!ctx.signs_outgoing());
        assert_eq!(ctx.check_unsigned(&header()), Ok(()));
    }

    #[test]
    fn verify_accepts_then_rejects_replay() {
        let mut sender = context();
        let frame = signed_frame(&mut sender, 1_000);

        let mut receiver = context();
        let now = SigningTimestamp::new(1_000);
        assert_eq!(receiver.verify_at(&frame, &header(), now), Ok(()));
        assert_eq!(receiver.stream_timestamp(3, 1, 1), Some(1_000));
        assert_eq!(
            receiver.verify_at(&frame, &header(), now),
            Err(SignatureFailure::Replay {
                timestamp: 1_000,
                last: 1_000
            })
        );

        let counters = receiver.counters();
        assert_eq!(counters.goodsig_count, 1);
        assert_eq!(counters.reject_count, 1);
    }

    #[test]
    fn accepted_timestamp_advances_outgoing_clock() {
        let mut sender = context();
        let frame = signed_frame(&mut sender, 9_000);

        let mut receiver = context();
        receiver
            .verify_at(&frame, &header(), SigningTimestamp::new(8_000))
            .unwrap();
        assert_eq!(receiver.timestamp(), 9_000);
        assert_eq!(receiver.next_timestamp(SigningTimestamp::new(8_500)), 9_001);
    }

    #[test]
    fn tampered_frame_fails_tag() {
        let mut sender = context();
        let mut frame = signed_frame(&mut sender, 1_000);
        frame[10] ^= 0xFF;

        let mut receiver = context();
        assert_eq!(
            receiver.verify_at(&frame, &header(), SigningTimestamp::new(1_000)),
            Err(SignatureFailure::BadTag)
        );
        assert_eq!(receiver.counters().badsig_count, 1);
        assert_eq!(receiver.stream_timestamp(3, 1, 1), None);
    }

    #[test]
    fn wrong_key_fails_tag() {
        let mut sender = context();
        let frame = signed_frame(&mut sender, 1_000);

        let mut receiver = SigningContext::new(SigningConfig::with_key(SecretKey::new([7; 32])));
        assert_eq!(
            receiver.verify_at(&frame, &header(), SigningTimestamp::new(1_000)),
            Err(SignatureFailure::BadTag)
        );
    }

    #[test]
    fn stale_new_stream_is_rejected() {
        let mut sender = context();
        let frame = signed_frame(&mut sender, 1_000);

        let mut receiver = context();
        let now = SigningTimestamp::new(1_000 + DEFAULT_NEW_STREAM_WINDOW + 1);
        assert_eq!(
            receiver.verify_at(&frame, &header(), now),
            Err(SignatureFailure::StaleStream { timestamp: 1_000 })
        );
        assert_eq!(receiver.counters().reject_count, 1);
    }

    #[test]
    fn unsigned_policy() {
        let mut strict = context();
        assert_eq!(
            strict.check_unsigned(&header()),
            Err(SignatureFailure::Unsigned)
        );
        assert_eq!(strict.counters().unsigned_count, 1);

        let mut lenient = context().with_allow_unsigned(|header| header.message_id == 0);
        assert_eq!(lenient.check_unsigned(&header()), Ok(()));
        let other = Header {
            message_id: 30,
            ..header()
        };
        assert_eq!(
            lenient.check_unsigned(&other),
            Err(SignatureFailure::Unsigned)
        );
    }

    #[test]
    fn passphrase_key_is_sha256() {
        let key = SecretKey::from_passphrase("");
        assert_eq!(
            hex::encode(key.as_bytes()),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
