// Configuration Storage Module
// Persisted device identity and connection parameters, stored as one fixed
// record at the start of the storage region. The 4-byte signature is the only
// test for "was this region ever written by us".

use heapless::String as FixedString;
use log::{debug, error, info, warn};

use crate::storage::{Storage, StorageError};

pub const CONFIG_SIGNATURE: [u8; 4] = *b"RLBR";
pub const CONFIG_VERSION: u16 = 1;
pub const CONFIG_OFFSET: usize = 0;

// Text field capacities in data bytes (each slot stores one extra NUL)
pub const NETWORK_NAME_CAPACITY: usize = 32;
pub const NETWORK_CREDENTIAL_CAPACITY: usize = 64;
pub const BROKER_HOST_CAPACITY: usize = 48;
pub const BROKER_USER_CAPACITY: usize = 32;
pub const BROKER_CREDENTIAL_CAPACITY: usize = 48;
pub const TOPIC_CAPACITY: usize = 48;

const HEADER_LEN: usize = 4 + 2 + 1 + 1;

pub type NetworkName = FixedString<NETWORK_NAME_CAPACITY>;
pub type NetworkCredential = FixedString<NETWORK_CREDENTIAL_CAPACITY>;
pub type BrokerHost = FixedString<BROKER_HOST_CAPACITY>;
pub type BrokerUser = FixedString<BROKER_USER_CAPACITY>;
pub type BrokerCredential = FixedString<BROKER_CREDENTIAL_CAPACITY>;
pub type Topic = FixedString<TOPIC_CAPACITY>;

/// A value that does not fit its fixed-capacity field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextTooLong {
    pub len: usize,
    pub capacity: usize,
}

impl std::fmt::Display for TextTooLong {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "value of {} bytes exceeds capacity of {} bytes",
            self.len, self.capacity
        )
    }
}

impl std::error::Error for TextTooLong {}

/// Copy `value` into a fixed-capacity field, rejecting it whole if it does not fit
pub fn fit_text<const N: usize>(value: &str) -> Result<FixedString<N>, TextTooLong> {
    let mut text = FixedString::new();
    text.push_str(value).map_err(|_| TextTooLong {
        len: value.len(),
        capacity: N,
    })?;
    Ok(text)
}

/// Device configuration as persisted in storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub signature: [u8; 4],
    pub version: u16,
    pub configured: bool,
    pub force_pairing: bool,
    pub network_name: NetworkName,
    pub network_credential: NetworkCredential,
    pub broker_host: BrokerHost,
    pub broker_user: BrokerUser,
    pub broker_credential: BrokerCredential,
    /// Topic the device subscribes to (the client's publish topic)
    pub inbound_topic: Topic,
    /// Topic the device publishes to (the client's subscribe topic)
    pub outbound_topic: Topic,
}

impl Configuration {
    /// Size of the persisted record
    pub const ENCODED_LEN: usize = HEADER_LEN
        + (NETWORK_NAME_CAPACITY + 1)
        + (NETWORK_CREDENTIAL_CAPACITY + 1)
        + (BROKER_HOST_CAPACITY + 1)
        + (BROKER_USER_CAPACITY + 1)
        + (BROKER_CREDENTIAL_CAPACITY + 1)
        + (TOPIC_CAPACITY + 1) * 2;

    /// All-zero record, which is what an erased region decodes to
    pub fn zeroed() -> Self {
        Self {
            signature: [0; 4],
            version: 0,
            configured: false,
            force_pairing: false,
            network_name: FixedString::new(),
            network_credential: FixedString::new(),
            broker_host: FixedString::new(),
            broker_user: FixedString::new(),
            broker_credential: FixedString::new(),
            inbound_topic: FixedString::new(),
            outbound_topic: FixedString::new(),
        }
    }

    /// Zero-filled, signed, version 1, not configured
    pub fn initialize() -> Self {
        Self {
            signature: CONFIG_SIGNATURE,
            version: CONFIG_VERSION,
            ..Self::zeroed()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.signature == CONFIG_SIGNATURE
    }

    /// True when the device has to boot into pairing mode
    pub fn requires_pairing(&self) -> bool {
        !self.is_valid() || !self.configured || self.force_pairing
    }

    /// Signature check on a raw record, before decoding anything else
    pub fn is_valid_raw(raw: &[u8]) -> bool {
        raw.len() >= CONFIG_SIGNATURE.len() && raw[..CONFIG_SIGNATURE.len()] == CONFIG_SIGNATURE
    }

    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut raw = [0u8; Self::ENCODED_LEN];
        raw[0..4].copy_from_slice(&self.signature);
        raw[4..6].copy_from_slice(&self.version.to_le_bytes());
        raw[6] = self.configured as u8;
        raw[7] = self.force_pairing as u8;

        let mut offset = HEADER_LEN;
        for text in self.text_fields() {
            let slot_len = text.capacity + 1;
            raw[offset..offset + text.value.len()].copy_from_slice(text.value.as_bytes());
            // Remaining slot bytes are already zero, so the value stays NUL-terminated
            offset += slot_len;
        }
        raw
    }

    /// Decode a raw record. Never fails: unreadable text fields decode empty
    /// and clear `configured`, so a damaged record is never used as configured.
    pub fn decode(raw: &[u8]) -> Self {
        if raw.len() < Self::ENCODED_LEN {
            warn!(
                "⚠️ Configuration record truncated ({} of {} bytes)",
                raw.len(),
                Self::ENCODED_LEN
            );
            return Self::zeroed();
        }

        let mut config = Self::zeroed();
        config.signature.copy_from_slice(&raw[0..4]);
        config.version = u16::from_le_bytes([raw[4], raw[5]]);
        config.configured = raw[6] != 0;
        config.force_pairing = raw[7] != 0;

        let mut reader = SlotReader {
            raw,
            offset: HEADER_LEN,
            damaged: Vec::new(),
        };
        config.network_name = reader.next("network name");
        config.network_credential = reader.next("network credential");
        config.broker_host = reader.next("broker host");
        config.broker_user = reader.next("broker user");
        config.broker_credential = reader.next("broker credential");
        config.inbound_topic = reader.next("inbound topic");
        config.outbound_topic = reader.next("outbound topic");

        if !reader.damaged.is_empty() && config.configured {
            warn!(
                "⚠️ Damaged configuration fields {:?} - treating device as unconfigured",
                reader.damaged
            );
            config.configured = false;
        }

        config
    }

    /// Log-safe one-line summary; credentials are reduced to their length
    pub fn summary(&self) -> String {
        format!(
            "network='{}' password=[{} chars] broker='{}' user='{}' broker_password=[{} chars] inbound='{}' outbound='{}'",
            self.network_name,
            self.network_credential.len(),
            self.broker_host,
            self.broker_user,
            self.broker_credential.len(),
            self.inbound_topic,
            self.outbound_topic
        )
    }

    fn text_fields(&self) -> [TextSlot<'_>; 7] {
        [
            TextSlot::new(&self.network_name, NETWORK_NAME_CAPACITY),
            TextSlot::new(&self.network_credential, NETWORK_CREDENTIAL_CAPACITY),
            TextSlot::new(&self.broker_host, BROKER_HOST_CAPACITY),
            TextSlot::new(&self.broker_user, BROKER_USER_CAPACITY),
            TextSlot::new(&self.broker_credential, BROKER_CREDENTIAL_CAPACITY),
            TextSlot::new(&self.inbound_topic, TOPIC_CAPACITY),
            TextSlot::new(&self.outbound_topic, TOPIC_CAPACITY),
        ]
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::initialize()
    }
}

struct TextSlot<'a> {
    value: &'a str,
    capacity: usize,
}

impl<'a> TextSlot<'a> {
    fn new(value: &'a str, capacity: usize) -> Self {
        Self { value, capacity }
    }
}

struct SlotReader<'a> {
    raw: &'a [u8],
    offset: usize,
    damaged: Vec<&'static str>,
}

impl SlotReader<'_> {
    fn next<const N: usize>(&mut self, name: &'static str) -> FixedString<N> {
        let slot = &self.raw[self.offset..self.offset + N + 1];
        self.offset += N + 1;

        let decoded = slot
            .iter()
            .position(|&b| b == 0)
            .and_then(|end| std::str::from_utf8(&slot[..end]).ok())
            .and_then(|text| fit_text::<N>(text).ok());

        match decoded {
            Some(text) => text,
            None => {
                self.damaged.push(name);
                FixedString::new()
            }
        }
    }
}

/// Configuration store over a persistent storage region.
///
/// Nothing is written implicitly: callers decide when `commit` or `erase`
/// happens, which keeps flash wear bounded and the write window visible.
pub struct ConfigStorage<S: Storage> {
    storage: S,
}

impl<S: Storage> ConfigStorage<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Load the stored record. An unsigned region yields a fresh,
    /// unconfigured configuration.
    pub fn load(&mut self) -> Result<Configuration, StorageError> {
        let mut raw = [0u8; Configuration::ENCODED_LEN];
        self.storage.read(CONFIG_OFFSET, &mut raw)?;

        if !Configuration::is_valid_raw(&raw) {
            info!("📭 No valid configuration signature in storage - starting unconfigured");
            return Ok(Configuration::initialize());
        }

        let config = Configuration::decode(&raw);
        if config.version != CONFIG_VERSION {
            warn!(
                "⚠️ Stored configuration version {} differs from {}",
                config.version, CONFIG_VERSION
            );
        }
        debug!(
            "📂 Loaded configuration (configured={}, force_pairing={})",
            config.configured, config.force_pairing
        );
        Ok(config)
    }

    /// Write the full record and flush it
    pub fn commit(&mut self, config: &Configuration) -> Result<(), StorageError> {
        info!("💾 Committing configuration to storage");
        self.storage.write(CONFIG_OFFSET, &config.encode())?;
        self.storage.commit().map_err(|e| {
            error!("❌ Configuration commit failed: {}", e);
            e
        })
    }

    /// Zero the entire region and flush it
    pub fn erase(&mut self) -> Result<(), StorageError> {
        info!("🔥 Erasing configuration storage ({} bytes)", self.storage.capacity());
        let zeros = vec![0u8; self.storage.capacity()];
        self.storage.write(0, &zeros)?;
        self.storage.commit()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn configured() -> Configuration {
        Configuration {
            configured: true,
            network_name: fit_text("lab").unwrap(),
            network_credential: fit_text("secret-pass").unwrap(),
            broker_host: fit_text("broker.local").unwrap(),
            broker_user: fit_text("dev").unwrap(),
            broker_credential: fit_text("pw").unwrap(),
            inbound_topic: fit_text("dev/in").unwrap(),
            outbound_topic: fit_text("dev/out").unwrap(),
            ..Configuration::initialize()
        }
    }

    #[test]
    fn initialize_is_signed_and_unconfigured() {
        let config = Configuration::initialize();
        assert!(config.is_valid());
        assert_eq!(config.version, 1);
        assert!(!config.configured);
        assert!(!config.force_pairing);
        assert!(config.network_name.is_empty());
        assert!(config.requires_pairing());
    }

    #[test]
    fn record_layout_is_fixed() {
        assert_eq!(Configuration::ENCODED_LEN, 335);
        let raw = configured().encode();
        assert_eq!(&raw[0..4], b"RLBR");
        assert_eq!(&raw[4..6], &[1, 0]);
        assert_eq!(raw[6], 1);
        assert_eq!(raw[7], 0);
        assert_eq!(&raw[8..11], b"lab");
        assert_eq!(raw[11], 0);
    }

    #[test]
    fn full_capacity_value_keeps_terminator() {
        let mut config = configured();
        config.network_name = fit_text(&"n".repeat(NETWORK_NAME_CAPACITY)).unwrap();
        let decoded = Configuration::decode(&config.encode());
        assert_eq!(decoded.network_name.len(), NETWORK_NAME_CAPACITY);
        assert!(decoded.configured);
    }

    #[test]
    fn fit_text_rejects_instead_of_truncating() {
        let err = fit_text::<4>("abcde").unwrap_err();
        assert_eq!(err, TextTooLong { len: 5, capacity: 4 });
        assert_eq!(fit_text::<4>("abcd").unwrap().as_str(), "abcd");
    }

    #[test]
    fn damaged_text_slot_clears_configured() {
        let mut raw = configured().encode();
        // Fill the network name slot without a terminator
        for byte in &mut raw[8..8 + NETWORK_NAME_CAPACITY + 1] {
            *byte = b'x';
        }
        let decoded = Configuration::decode(&raw);
        assert!(decoded.is_valid());
        assert!(!decoded.configured);
        assert!(decoded.network_name.is_empty());
        assert_eq!(decoded.broker_host.as_str(), "broker.local");
    }

    #[test]
    fn blank_region_loads_unconfigured() {
        let mut store = ConfigStorage::new(MemoryStorage::new(512));
        let config = store.load().unwrap();
        assert_eq!(config, Configuration::initialize());
        assert_eq!(store.storage().commit_count(), 0);
    }

    #[test]
    fn commit_then_load() {
        let mut store = ConfigStorage::new(MemoryStorage::new(512));
        store.commit(&configured()).unwrap();
        assert_eq!(store.storage().commit_count(), 1);
        assert_eq!(
            &store.storage().committed()[..Configuration::ENCODED_LEN],
            &configured().encode()[..]
        );
        assert_eq!(store.load().unwrap(), configured());
    }

    #[test]
    fn erase_zeroes_whole_region() {
        let mut store = ConfigStorage::new(MemoryStorage::new(512));
        store.commit(&configured()).unwrap();
        store.erase().unwrap();
        assert!(store.storage().committed().iter().all(|&b| b == 0));

        // Zeroed signature reads back as uninitialized storage
        let config = store.load().unwrap();
        assert!(config.requires_pairing());
        assert!(!config.configured);
    }

    #[test]
    fn failed_commit_reports_error() {
        let mut storage = MemoryStorage::new(512);
        storage.set_fail_commits(true);
        let mut store = ConfigStorage::new(storage);
        assert!(matches!(
            store.commit(&configured()),
            Err(StorageError::CommitFailed(_))
        ));
        assert!(store.storage().committed().iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn raw_signature_check() {
        assert!(Configuration::is_valid_raw(b"RLBRxxxx"));
        assert!(!Configuration::is_valid_raw(&[0u8; 8]));
        assert!(!Configuration::is_valid_raw(b"RLB"));
    }
}
