use crate::{CoreError, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Trait for payload encoding
pub trait PayloadCodec {
    /// Encode a value to bytes
    fn encode<T>(&self, value: &T) -> Result<Vec<u8>>
    where
        T: Serialize + ?Sized;

    /// Decode bytes to a value
    fn decode<T>(&self, bytes: &[u8]) -> Result<T>
    where
        T: DeserializeOwned;

    /// Media type announced in `Content-Type`/`Accept` headers
    fn media_type(&self) -> &'static str;
}

/// Readable representation
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    fn encode<T>(&self, value: &T) -> Result<Vec<u8>>
    where
        T: Serialize + ?Sized,
    {
        serde_json::to_vec(value)
            .map_err(|e| CoreError::encode(format!("JSON encoding failed: {}", e)))
    }

    fn decode<T>(&self, bytes: &[u8]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(bytes)
            .map_err(|e| CoreError::decode(format!("JSON decoding failed: {}", e)))
    }

    fn media_type(&self) -> &'static str {
        "application/json"
    }
}

/// Compact binary representation using bincode
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BinaryCodec;

impl PayloadCodec for BinaryCodec {
    fn encode<T>(&self, value: &T) -> Result<Vec<u8>>
    where
        T: Serialize + ?Sized,
    {
        bincode::serialize(value)
            .map_err(|e| CoreError::encode(format!("Binary encoding failed: {}", e)))
    }

    fn decode<T>(&self, bytes: &[u8]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        bincode::deserialize(bytes)
            .map_err(|e| CoreError::decode(format!("Binary decoding failed: {}", e)))
    }

    fn media_type(&self) -> &'static str {
        "application/octet-stream"
    }
}

/// Enum-based codec so callers can pick a representation at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Json(JsonCodec),
    Binary(BinaryCodec),
}

impl Default for Codec {
    fn default() -> Self {
        Self::Json(JsonCodec)
    }
}

impl Codec {
    pub fn json() -> Self {
        Self::Json(JsonCodec)
    }

    pub fn binary() -> Self {
        Self::Binary(BinaryCodec)
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary(_))
    }
}

impl PayloadCodec for Codec {
    fn encode<T>(&self, value: &T) -> Result<Vec<u8>>
    where
        T: Serialize + ?Sized,
    {
        match self {
            Self::Json(c) => c.encode(value),
            Self::Binary(c) => c.encode(value),
        }
    }

    fn decode<T>(&self, bytes: &[u8]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        match self {
            Self::Json(c) => c.decode(bytes),
            Self::Binary(c) => c.decode(bytes),
        }
    }

    fn media_type(&self) -> &'static str {
        match self {
            Self::Json(c) => c.media_type(),
            Self::Binary(c) => c.media_type(),
        }
    }
}

/// Configuration for payload encoding
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Use the compact representation instead of JSON
    pub use_binary: bool,
}

impl CodecConfig {
    pub fn codec(&self) -> Codec {
        if self.use_binary {
            Codec::binary()
        } else {
            Codec::json()
        }
    }
}

/// Capability to encode a payload carried by the RPC client.
///
/// Implemented for every `Serialize` type, so call bodies need no
/// hand-written marshaling.
pub trait Marshal {
    fn marshal(&self, codec: &Codec) -> Result<Vec<u8>>;
}

impl<T> Marshal for T
where
    T: Serialize + ?Sized,
{
    fn marshal(&self, codec: &Codec) -> Result<Vec<u8>> {
        codec.encode(self)
    }
}

/// Capability to decode a payload received from the coordination service or
/// the transport.
pub trait Unmarshal: Sized {
    fn unmarshal(codec: &Codec, bytes: &[u8]) -> Result<Self>;
}

impl<T> Unmarshal for T
where
    T: for<'de> Deserialize<'de>,
{
    fn unmarshal(codec: &Codec, bytes: &[u8]) -> Result<Self> {
        codec.decode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LeaderInfo;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Subscribe {
        framework_id: Option<String>,
        roles: Vec<String>,
        labels: BTreeMap<String, String>,
        failover_timeout: f64,
    }

    fn sample_call() -> Subscribe {
        let mut labels = BTreeMap::new();
        labels.insert("team".to_string(), "batch".to_string());
        Subscribe {
            framework_id: Some("fw-0001".to_string()),
            roles: vec!["*".to_string(), "analytics".to_string()],
            labels,
            failover_timeout: 604800.0,
        }
    }

    #[test]
    fn test_round_trip_both_representations() {
        let call = sample_call();
        for codec in [Codec::json(), Codec::binary()] {
            let bytes = call.marshal(&codec).unwrap();
            let decoded = Subscribe::unmarshal(&codec, &bytes).unwrap();
            assert_eq!(decoded, call, "round trip failed for {:?}", codec);
        }
    }

    #[test]
    fn test_leader_info_round_trip() {
        let info = LeaderInfo::new("master@10.0.0.1:5050", "10.0.0.1", 5050)
            .with_pid("master@10.0.0.1:5050")
            .with_version("1.11.0");

        for codec in [Codec::json(), Codec::binary()] {
            let bytes = codec.encode(&info).unwrap();
            let decoded: LeaderInfo = codec.decode(&bytes).unwrap();
            assert_eq!(decoded, info);
        }
    }

    #[test]
    fn test_json_tolerates_missing_optional_fields() {
        let decoded: LeaderInfo = Codec::json()
            .decode(br#"{"id":"m1","hostname":"h","port":5050}"#)
            .unwrap();
        assert_eq!(decoded.pid, None);
        assert_eq!(decoded.version, None);
    }

    #[test]
    fn test_binary_is_smaller_than_json() {
        let call = sample_call();
        let json = Codec::json().encode(&call).unwrap();
        let binary = Codec::binary().encode(&call).unwrap();
        assert!(binary.len() < json.len());
    }

    #[test]
    fn test_decode_failure_is_reported() {
        let err = Codec::json().decode::<LeaderInfo>(b"{not json").unwrap_err();
        assert!(matches!(err, CoreError::Decode { .. }));

        let err = Codec::binary().decode::<LeaderInfo>(&[0xff]).unwrap_err();
        assert!(err.is_codec());
    }

    fn leader_info() -> impl Strategy<Value = LeaderInfo> {
        (
            "\\PC{0,24}",
            "[a-z0-9.-]{0,32}",
            any::<u16>(),
            proptest::option::of("\\PC{0,40}"),
            proptest::option::of("[0-9]{1,2}\\.[0-9]{1,2}\\.[0-9]{1,2}"),
        )
            .prop_map(|(id, hostname, port, pid, version)| LeaderInfo {
                id,
                hostname,
                port,
                pid,
                version,
            })
    }

    fn subscribe_call() -> impl Strategy<Value = Subscribe> {
        (
            proptest::option::of("[a-z0-9-]{1,36}"),
            proptest::collection::vec("\\PC{0,16}", 0..6),
            proptest::collection::btree_map("[a-z_]{1,12}", "\\PC{0,24}", 0..6),
            // Whole seconds keep the float exact under every representation
            (0u32..10_000_000).prop_map(f64::from),
        )
            .prop_map(|(framework_id, roles, labels, failover_timeout)| Subscribe {
                framework_id,
                roles,
                labels,
                failover_timeout,
            })
    }

    proptest! {
        #[test]
        fn prop_leader_info_round_trips(info in leader_info()) {
            for codec in [Codec::json(), Codec::binary()] {
                let bytes = info.marshal(&codec).unwrap();
                prop_assert_eq!(&LeaderInfo::unmarshal(&codec, &bytes).unwrap(), &info);
            }
        }

        #[test]
        fn prop_calls_round_trip(call in subscribe_call()) {
            for codec in [Codec::json(), Codec::binary()] {
                let bytes = call.marshal(&codec).unwrap();
                prop_assert_eq!(&Subscribe::unmarshal(&codec, &bytes).unwrap(), &call);
            }
        }
    }

    #[test]
    fn test_codec_config() {
        assert_eq!(CodecConfig::default().codec(), Codec::json());
        assert!(CodecConfig { use_binary: true }.codec().is_binary());
        assert_eq!(Codec::json().media_type(), "application/json");
    }
}
