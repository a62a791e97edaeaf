use std::fmt;

use serde::{
    de::{self, SeqAccess, Visitor},
    Deserialize, Deserializer, Serialize, Serializer,
};

use keyquorum_core::{anyhow, lz4_flex, rmp_serde, serde};

use crate::{Cipher, EnvelopeError};

const ARCHIVE_MAGIC: &[u8; 6] = b"KQENV\x01";
const MAX_ARCHIVE_LEN: usize = 256 * 1024 * 1024;

const ENTRY_KEY_ID: &str = "key_id";
const ENTRY_WRAPPED_KEY: &str = "wrapped_key";
const ENTRY_CIPHER: &str = "cipher";
const ENTRY_CIPHERTEXT: &str = "ciphertext";
const ENTRY_AUX_HEADER: &str = "aux_header";

/// The distributable result of sealing a payload
#[derive(Clone, PartialEq, Eq)]
pub struct EnvelopeContainer {
    /// Name of the root key that wrapped the data key
    pub key_id: String,
    pub wrapped_key: Vec<u8>,
    pub cipher: Cipher,
    /// Length prefixed frame produced by [`crate::EnvelopeCodec::encrypt`]
    pub ciphertext: Vec<u8>,
    pub aux_header: Option<Vec<u8>>,
}

impl fmt::Debug for EnvelopeContainer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "EnvelopeContainer(key_id = {}, cipher = {}, wrapped_key = {} bytes, ciphertext = {} bytes, aux_header = {:?})",
            self.key_id,
            self.cipher,
            self.wrapped_key.len(),
            self.ciphertext.len(),
            self.aux_header.as_ref().map(|h| h.len()),
        )
    }
}

/// Byte payload that serializes as a msgpack `bin` rather than an array of integers
#[derive(Clone, Debug, PartialEq, Eq)]
struct Blob(Vec<u8>);

impl Serialize for Blob {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Blob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Blob, D::Error> {
        struct BlobVisitor;

        impl<'de> Visitor<'de> for BlobVisitor {
            type Value = Blob;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "a byte array")
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Blob, E> {
                Ok(Blob(v.to_vec()))
            }

            fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Blob, E> {
                Ok(Blob(v))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Blob, A::Error> {
                let mut buf = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(4096));
                while let Some(b) = seq.next_element::<u8>()? {
                    buf.push(b);
                }
                Ok(Blob(buf))
            }
        }

        deserializer.deserialize_bytes(BlobVisitor)
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(crate = "keyquorum_core::serde")]
struct ArchiveEntry {
    name: String,
    data: Blob,
}

impl EnvelopeContainer {
    /// Pack into a compressed archive of named entries
    pub fn to_archive(&self) -> anyhow::Result<Vec<u8>> {
        let mut entries = vec![
            ArchiveEntry {
                name: ENTRY_KEY_ID.to_string(),
                data: Blob(self.key_id.as_bytes().to_vec()),
            },
            ArchiveEntry {
                name: ENTRY_WRAPPED_KEY.to_string(),
                data: Blob(self.wrapped_key.clone()),
            },
            ArchiveEntry {
                name: ENTRY_CIPHER.to_string(),
                data: Blob(self.cipher.as_str().as_bytes().to_vec()),
            },
            ArchiveEntry {
                name: ENTRY_CIPHERTEXT.to_string(),
                data: Blob(self.ciphertext.clone()),
            },
        ];
        if let Some(aux_header) = &self.aux_header {
            entries.push(ArchiveEntry {
                name: ENTRY_AUX_HEADER.to_string(),
                data: Blob(aux_header.clone()),
            });
        }

        let packed = rmp_serde::to_vec_named(&entries)?;
        let mut archive = ARCHIVE_MAGIC.to_vec();
        archive.extend_from_slice(&lz4_flex::compress_prepend_size(&packed));
        Ok(archive)
    }

    pub fn from_archive(archive: &[u8]) -> Result<Self, EnvelopeError> {
        let malformed = |reason: &str| EnvelopeError::MalformedContainer(reason.to_string());

        let body = archive
            .strip_prefix(&ARCHIVE_MAGIC[..])
            .ok_or_else(|| malformed("bad magic"))?;
        if body.len() < 4 {
            return Err(malformed("truncated"));
        }
        let declared = u32::from_le_bytes([body[0], body[1], body[2], body[3]]) as usize;
        if declared > MAX_ARCHIVE_LEN {
            return Err(malformed("archive too large"));
        }
        let packed = lz4_flex::decompress_size_prepended(body)
            .map_err(|err| EnvelopeError::MalformedContainer(err.to_string()))?;
        let entries: Vec<ArchiveEntry> = rmp_serde::from_slice(&packed)
            .map_err(|err| EnvelopeError::MalformedContainer(err.to_string()))?;

        let mut key_id = None;
        let mut wrapped_key = None;
        let mut cipher = None;
        let mut ciphertext = None;
        let mut aux_header = None;
        for entry in entries {
            let slot = match entry.name.as_str() {
                ENTRY_KEY_ID => &mut key_id,
                ENTRY_WRAPPED_KEY => &mut wrapped_key,
                ENTRY_CIPHER => &mut cipher,
                ENTRY_CIPHERTEXT => &mut ciphertext,
                ENTRY_AUX_HEADER => &mut aux_header,
                other => {
                    return Err(EnvelopeError::MalformedContainer(format!(
                        "unexpected entry {}",
                        other
                    )))
                }
            };
            if slot.replace(entry.data.0).is_some() {
                return Err(EnvelopeError::MalformedContainer(format!(
                    "duplicate entry {}",
                    entry.name
                )));
            }
        }

        let key_id = String::from_utf8(key_id.ok_or_else(|| malformed("missing key_id"))?)
            .map_err(|_| malformed("key_id is not utf-8"))?;
        let cipher = String::from_utf8(cipher.ok_or_else(|| malformed("missing cipher"))?)
            .map_err(|_| malformed("cipher is not utf-8"))?
            .parse()?;

        Ok(EnvelopeContainer {
            key_id,
            wrapped_key: wrapped_key.ok_or_else(|| malformed("missing wrapped_key"))?,
            cipher,
            ciphertext: ciphertext.ok_or_else(|| malformed("missing ciphertext"))?,
            aux_header,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EnvelopeCodec;

    fn container(aux_header: Option<Vec<u8>>) -> EnvelopeContainer {
        let codec = EnvelopeCodec::new(&[5u8; 32], Cipher::Aes256GcmSiv).expect("Invalid EnvelopeCodec");
        EnvelopeContainer {
            key_id: "my-sym-key".to_string(),
            wrapped_key: b"vault:v1:c2VjcmV0".to_vec(),
            cipher: codec.cipher(),
            ciphertext: codec.encrypt(&[0x42; 2048]).expect("Failed to encrypt"),
            aux_header,
        }
    }

    #[test]
    fn test_archive_round_trip() {
        for aux_header in [None, Some(vec![0xAA; 64])] {
            let c = container(aux_header);
            let archive = c.to_archive().expect("Failed to pack");
            assert!(archive.starts_with(ARCHIVE_MAGIC));
            assert_eq!(EnvelopeContainer::from_archive(&archive), Ok(c));
        }
    }

    #[test]
    fn test_archive_open_after_unpack() {
        let codec = EnvelopeCodec::new(&[5u8; 32], Cipher::Aes256GcmSiv).expect("Invalid EnvelopeCodec");
        let archive = container(None).to_archive().expect("Failed to pack");
        let c = EnvelopeContainer::from_archive(&archive).expect("Failed to unpack");
        assert_eq!(codec.decrypt(&c.ciphertext), Ok(vec![0x42; 2048]));
    }

    #[test]
    fn test_archive_rejects_garbage() {
        assert!(matches!(
            EnvelopeContainer::from_archive(b"PK\x03\x04not ours"),
            Err(EnvelopeError::MalformedContainer(_))
        ));
        let mut archive = container(None).to_archive().expect("Failed to pack");
        archive.truncate(archive.len() / 2);
        assert!(matches!(
            EnvelopeContainer::from_archive(&archive),
            Err(EnvelopeError::MalformedContainer(_))
        ));
    }

    #[test]
    fn test_archive_rejects_unexpected_entries() {
        let entries = vec![
            ArchiveEntry {
                name: ENTRY_KEY_ID.to_string(),
                data: Blob(b"k".to_vec()),
            },
            ArchiveEntry {
                name: ENTRY_KEY_ID.to_string(),
                data: Blob(b"k".to_vec()),
            },
        ];
        let mut archive = ARCHIVE_MAGIC.to_vec();
        archive.extend_from_slice(&lz4_flex::compress_prepend_size(
            &rmp_serde::to_vec_named(&entries).expect("Failed to pack"),
        ));
        assert_eq!(
            EnvelopeContainer::from_archive(&archive),
            Err(EnvelopeError::MalformedContainer(
                "duplicate entry key_id".to_string()
            ))
        );

        let entries = vec![ArchiveEntry {
            name: "luks_header.bin".to_string(),
            data: Blob(vec![]),
        }];
        let mut archive = ARCHIVE_MAGIC.to_vec();
        archive.extend_from_slice(&lz4_flex::compress_prepend_size(
            &rmp_serde::to_vec_named(&entries).expect("Failed to pack"),
        ));
        assert_eq!(
            EnvelopeContainer::from_archive(&archive),
            Err(EnvelopeError::MalformedContainer(
                "unexpected entry luks_header.bin".to_string()
            ))
        );
    }
}
