// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Lens Hub / Periphery event ABI and the raw log decoder

use super::events::{ChainEvent, EventKey, EventKind, LensEvent, PublicationCreated};
use super::types::{SyncError, SyncResult};
use ethers::abi::{parse_abi, Event, LogParam, RawLog, Token};
use ethers::types::{Address, Log, H256, U256};
use ethers::utils::to_checksum;
use lens_schema::ids::hex_id_from_be_bytes;
use std::collections::HashMap;

const LENS_EVENTS: &[&str] = &[
    "event ProfileCreated(uint256 indexed profileId, address indexed creator, address indexed to, string handle, string imageURI, address followModule, bytes followModuleReturnData, string followNFTURI, uint256 timestamp)",
    "event DefaultProfileSet(address indexed wallet, uint256 indexed profileId, uint256 timestamp)",
    "event DispatcherSet(uint256 indexed profileId, address indexed dispatcher, uint256 timestamp)",
    "event ProfileImageURISet(uint256 indexed profileId, string imageURI, uint256 timestamp)",
    "event FollowNFTURISet(uint256 indexed profileId, string followNFTURI, uint256 timestamp)",
    "event FollowModuleSet(uint256 indexed profileId, address followModule, bytes followModuleReturnData, uint256 timestamp)",
    "event ProfileMetadataSet(uint256 indexed profileId, string metadata, uint256 timestamp)",
    "event PostCreated(uint256 indexed profileId, uint256 indexed pubId, string contentURI, address collectModule, bytes collectModuleReturnData, address referenceModule, bytes referenceModuleReturnData, uint256 timestamp)",
    "event CommentCreated(uint256 indexed profileId, uint256 indexed pubId, string contentURI, uint256 profileIdPointed, uint256 pubIdPointed, bytes referenceModuleData, address collectModule, bytes collectModuleReturnData, address referenceModule, bytes referenceModuleReturnData, uint256 timestamp)",
    "event MirrorCreated(uint256 indexed profileId, uint256 indexed pubId, uint256 profileIdPointed, uint256 pubIdPointed, bytes referenceModuleData, address referenceModule, bytes referenceModuleReturnData, uint256 timestamp)",
    "event Collected(address indexed collector, uint256 indexed profileId, uint256 indexed pubId, uint256 rootProfileId, uint256 rootPubId, bytes collectModuleData, uint256 timestamp)",
    "event Followed(address indexed follower, uint256[] profileIds, bytes[] followModuleDatas, uint256 timestamp)",
    "event FollowNFTTransferred(uint256 indexed profileId, uint256 indexed followNFTId, address from, address to, uint256 timestamp)",
    "event FollowNFTDeployed(uint256 indexed profileId, address indexed followNFT, uint256 timestamp)",
    "event CollectNFTDeployed(uint256 indexed profileId, uint256 indexed pubId, address indexed collectNFT, uint256 timestamp)",
];

/// Decodes raw logs of the Lens contracts into [`ChainEvent`]s.
pub struct LensEventDecoder {
    events: HashMap<H256, (EventKind, Event)>,
}

impl LensEventDecoder {
    pub fn new() -> SyncResult<Self> {
        let abi = parse_abi(LENS_EVENTS)
            .map_err(|e| SyncError::Other(format!("Invalid Lens event ABI: {}", e)))?;
        let mut events = HashMap::new();
        for event in abi.events() {
            let kind = EventKind::from_name(&event.name).ok_or_else(|| {
                SyncError::Other(format!("ABI event {} has no kind", event.name))
            })?;
            events.insert(event.signature(), (kind, event.clone()));
        }
        Ok(Self { events })
    }

    /// First-topic filter covering every known event.
    pub fn topics(&self) -> Vec<H256> {
        let mut topics: Vec<H256> = self.events.keys().copied().collect();
        topics.sort();
        topics
    }

    pub fn event_signature(&self, kind: EventKind) -> Option<H256> {
        self.events
            .iter()
            .find(|(_, (k, _))| *k == kind)
            .map(|(topic, _)| *topic)
    }

    /// `Ok(None)` for logs whose first topic is not a Lens event. A known
    /// event whose payload does not decode is an error.
    pub fn decode(&self, log: &Log) -> SyncResult<Option<ChainEvent>> {
        let Some(topic0) = log.topics.first() else {
            return Ok(None);
        };
        let Some((kind, event)) = self.events.get(topic0) else {
            return Ok(None);
        };
        let tx_hash = log
            .transaction_hash
            .ok_or_else(|| SyncError::Decode(format!("{} log without tx hash", kind)))?;
        let log_index = log
            .log_index
            .ok_or_else(|| SyncError::Decode(format!("{} log without log index", kind)))?;
        let block_number = log
            .block_number
            .ok_or_else(|| SyncError::Decode(format!("{} log without block number", kind)))?;
        let key = EventKey {
            tx_hash: format!("{:?}", tx_hash),
            log_index: log_index.low_u64(),
        };

        let parsed = event
            .parse_log(RawLog {
                topics: log.topics.clone(),
                data: log.data.to_vec(),
            })
            .map_err(|e| SyncError::Decode(format!("{} at {}: {}", kind, key, e)))?;
        let args = Args {
            kind: *kind,
            params: parsed.params,
        };

        Ok(Some(ChainEvent {
            key,
            block_number: block_number.as_u64(),
            event: args.into_event()?,
        }))
    }
}

struct Args {
    kind: EventKind,
    params: Vec<LogParam>,
}

impl Args {
    fn token(&self, name: &str) -> SyncResult<&Token> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
            .ok_or_else(|| SyncError::Decode(format!("{} is missing {}", self.kind, name)))
    }

    fn mismatch(&self, name: &str, token: &Token) -> SyncError {
        SyncError::Decode(format!(
            "{}.{} has unexpected type: {:?}",
            self.kind, name, token
        ))
    }

    fn id(&self, name: &str) -> SyncResult<String> {
        match self.token(name)? {
            Token::Uint(v) => Ok(uint_to_id(v)),
            other => Err(self.mismatch(name, other)),
        }
    }

    fn ids(&self, name: &str) -> SyncResult<Vec<String>> {
        match self.token(name)? {
            Token::Array(items) => items
                .iter()
                .map(|t| match t {
                    Token::Uint(v) => Ok(uint_to_id(v)),
                    other => Err(self.mismatch(name, other)),
                })
                .collect(),
            other => Err(self.mismatch(name, other)),
        }
    }

    fn timestamp(&self) -> SyncResult<i64> {
        match self.token("timestamp")? {
            Token::Uint(v) if *v <= U256::from(i64::MAX as u64) => Ok(v.low_u64() as i64),
            other => Err(self.mismatch("timestamp", other)),
        }
    }

    fn raw_address(&self, name: &str) -> SyncResult<Address> {
        match self.token(name)? {
            Token::Address(a) => Ok(*a),
            other => Err(self.mismatch(name, other)),
        }
    }

    fn address(&self, name: &str) -> SyncResult<String> {
        Ok(to_checksum(&self.raw_address(name)?, None))
    }

    /// The zero address decodes to `None`.
    fn optional_address(&self, name: &str) -> SyncResult<Option<String>> {
        let address = self.raw_address(name)?;
        Ok((!address.is_zero()).then(|| to_checksum(&address, None)))
    }

    fn string(&self, name: &str) -> SyncResult<String> {
        match self.token(name)? {
            Token::String(s) => Ok(s.clone()),
            other => Err(self.mismatch(name, other)),
        }
    }

    fn publication(&self) -> SyncResult<PublicationCreated> {
        let content_uri = match self.kind {
            EventKind::MirrorCreated => None,
            _ => Some(self.string("contentURI")?),
        };
        let collect_module = match self.kind {
            EventKind::MirrorCreated => None,
            _ => self.optional_address("collectModule")?,
        };
        let pointed = match self.kind {
            EventKind::PostCreated => None,
            _ => Some((self.id("profileIdPointed")?, self.id("pubIdPointed")?)),
        };
        Ok(PublicationCreated {
            profile_id: self.id("profileId")?,
            pub_id: self.id("pubId")?,
            content_uri,
            collect_module,
            reference_module: self.optional_address("referenceModule")?,
            pointed,
            timestamp: self.timestamp()?,
        })
    }

    fn into_event(self) -> SyncResult<LensEvent> {
        let event = match self.kind {
            EventKind::ProfileCreated => LensEvent::ProfileCreated {
                profile_id: self.id("profileId")?,
                creator: self.address("creator")?,
                to: self.address("to")?,
                handle: self.string("handle")?,
                image_uri: self.string("imageURI")?,
                follow_module: self.optional_address("followModule")?,
                follow_nft_uri: self.string("followNFTURI")?,
                timestamp: self.timestamp()?,
            },
            EventKind::DefaultProfileSet => LensEvent::DefaultProfileSet {
                wallet: self.address("wallet")?,
                profile_id: self.id("profileId")?,
                timestamp: self.timestamp()?,
            },
            EventKind::DispatcherSet => LensEvent::DispatcherSet {
                profile_id: self.id("profileId")?,
                dispatcher: self.optional_address("dispatcher")?,
                timestamp: self.timestamp()?,
            },
            EventKind::ProfileImageURISet => LensEvent::ProfileImageUriSet {
                profile_id: self.id("profileId")?,
                image_uri: self.string("imageURI")?,
                timestamp: self.timestamp()?,
            },
            EventKind::FollowNFTURISet => LensEvent::FollowNftUriSet {
                profile_id: self.id("profileId")?,
                follow_nft_uri: self.string("followNFTURI")?,
                timestamp: self.timestamp()?,
            },
            EventKind::FollowModuleSet => LensEvent::FollowModuleSet {
                profile_id: self.id("profileId")?,
                follow_module: self.optional_address("followModule")?,
                timestamp: self.timestamp()?,
            },
            EventKind::ProfileMetadataSet => LensEvent::ProfileMetadataSet {
                profile_id: self.id("profileId")?,
                metadata: self.string("metadata")?,
                timestamp: self.timestamp()?,
            },
            EventKind::PostCreated => LensEvent::PostCreated(self.publication()?),
            EventKind::CommentCreated => LensEvent::CommentCreated(self.publication()?),
            EventKind::MirrorCreated => LensEvent::MirrorCreated(self.publication()?),
            EventKind::Collected => LensEvent::Collected {
                collector: self.address("collector")?,
                profile_id: self.id("profileId")?,
                pub_id: self.id("pubId")?,
                root_profile_id: self.id("rootProfileId")?,
                root_pub_id: self.id("rootPubId")?,
                timestamp: self.timestamp()?,
            },
            EventKind::Followed => LensEvent::Followed {
                follower: self.address("follower")?,
                profile_ids: self.ids("profileIds")?,
                timestamp: self.timestamp()?,
            },
            EventKind::FollowNFTTransferred => LensEvent::FollowNftTransferred {
                profile_id: self.id("profileId")?,
                follow_nft_id: self.id("followNFTId")?,
                from: self.optional_address("from")?,
                to: self.optional_address("to")?,
                timestamp: self.timestamp()?,
            },
            EventKind::FollowNFTDeployed | EventKind::CollectNFTDeployed => {
                LensEvent::Unhandled { kind: self.kind }
            }
        };
        Ok(event)
    }
}

fn uint_to_id(value: &U256) -> String {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    hex_id_from_be_bytes(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{address, LogBuilder};
    use ethers::abi::Token;

    #[test]
    fn test_every_kind_has_a_topic() {
        let decoder = LensEventDecoder::new().unwrap();
        assert_eq!(decoder.topics().len(), EventKind::ALL.len());
        for kind in EventKind::ALL {
            assert!(decoder.event_signature(kind).is_some(), "{}", kind);
        }
    }

    #[test]
    fn test_decode_profile_created() {
        let decoder = LensEventDecoder::new().unwrap();
        let log = LogBuilder::new(&decoder, EventKind::ProfileCreated)
            .uint_topic(0xa1)
            .address_topic(address(1))
            .address_topic(address(2))
            .data(vec![
                Token::String("alice.lens".into()),
                Token::String("ipfs://QmImage".into()),
                Token::Address(Address::zero()),
                Token::Bytes(vec![]),
                Token::String("ipfs://QmFollow".into()),
                Token::Uint(U256::from(1_669_852_800u64)),
            ])
            .at(1000, 3)
            .build();

        let decoded = decoder.decode(&log).unwrap().unwrap();
        assert_eq!(decoded.block_number, 1000);
        assert_eq!(decoded.key.log_index, 3);
        assert_eq!(
            decoded.event,
            LensEvent::ProfileCreated {
                profile_id: "0xa1".to_string(),
                creator: to_checksum(&address(1), None),
                to: to_checksum(&address(2), None),
                handle: "alice.lens".to_string(),
                image_uri: "ipfs://QmImage".to_string(),
                follow_module: None,
                follow_nft_uri: "ipfs://QmFollow".to_string(),
                timestamp: 1_669_852_800,
            }
        );
    }

    #[test]
    fn test_decode_followed_ids() {
        let decoder = LensEventDecoder::new().unwrap();
        let log = LogBuilder::new(&decoder, EventKind::Followed)
            .address_topic(address(7))
            .data(vec![
                Token::Array(vec![
                    Token::Uint(U256::from(1u64)),
                    Token::Uint(U256::from(0x100u64)),
                ]),
                Token::Array(vec![Token::Bytes(vec![]), Token::Bytes(vec![])]),
                Token::Uint(U256::from(5u64)),
            ])
            .build();

        match decoder.decode(&log).unwrap().unwrap().event {
            LensEvent::Followed {
                profile_ids,
                timestamp,
                ..
            } => {
                assert_eq!(profile_ids, vec!["0x01".to_string(), "0x0100".to_string()]);
                assert_eq!(timestamp, 5);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_unknown_topic_is_skipped() {
        let decoder = LensEventDecoder::new().unwrap();
        let mut log = LogBuilder::new(&decoder, EventKind::Followed).build();
        log.topics = vec![H256::repeat_byte(0x11)];
        assert_eq!(decoder.decode(&log).unwrap(), None);
        log.topics.clear();
        assert_eq!(decoder.decode(&log).unwrap(), None);
    }

    #[test]
    fn test_truncated_payload_is_a_decode_error() {
        let decoder = LensEventDecoder::new().unwrap();
        let log = LogBuilder::new(&decoder, EventKind::ProfileMetadataSet)
            .uint_topic(1)
            .build();
        assert!(matches!(decoder.decode(&log), Err(SyncError::Decode(_))));
    }

    #[test]
    fn test_uint_ids_are_even_length_hex() {
        assert_eq!(uint_to_id(&U256::from(1u64)), "0x01");
        assert_eq!(uint_to_id(&U256::from(0xa1u64)), "0xa1");
        assert_eq!(uint_to_id(&U256::zero()), "0x00");
    }
}
