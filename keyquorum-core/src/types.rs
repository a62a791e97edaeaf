use std::{convert::TryFrom, fmt, hash::Hash as StdHash, ops::Deref};

use serde::{Deserialize, Serialize};
#[cfg(feature = "crypto")]
use sha3::{Digest, Sha3_256};

/// Used to represent a 'hash' of data, useful because of its fmt and sea_orm impls
#[derive(Clone, PartialEq, Eq, StdHash, Deserialize, Serialize)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// Create a new empty hash
    pub fn new() -> Self {
        Hash([0; 32])
    }

    /// Sha3-256 digest of `data`
    #[cfg(feature = "crypto")]
    pub fn digest(data: &[u8]) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(data);
        Hash(hasher.finalize().into())
    }
}

impl Default for Hash {
    fn default() -> Self {
        Hash::new()
    }
}

impl Deref for Hash {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        let Hash(inner) = self;
        &inner[..]
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Hash({})", bs58::encode(self).into_string())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", bs58::encode(self).into_string())
    }
}

impl From<[u8; 32]> for Hash {
    fn from(val: [u8; 32]) -> Hash {
        Hash(val)
    }
}

impl TryFrom<Vec<u8>> for Hash {
    type Error = anyhow::Error;
    fn try_from(val: Vec<u8>) -> anyhow::Result<Hash> {
        let buf: [u8; 32] = val
            .try_into()
            .map_err(|v: Vec<u8>| anyhow::anyhow!("Hash must be 32 bytes, got {}", v.len()))?;
        Ok(Hash(buf))
    }
}

impl<'a> TryFrom<&'a str> for Hash {
    type Error = anyhow::Error;
    fn try_from(val: &str) -> anyhow::Result<Hash> {
        let mut buf = [0u8; 32];
        let len = bs58::decode(val).into(&mut buf)?;
        if len != 32 {
            return Err(anyhow::anyhow!("Hash must be 32 bytes, got {}", len));
        }
        Ok(Hash(buf))
    }
}

#[cfg(feature = "sql")]
impl sea_orm::TryFromU64 for Hash {
    fn try_from_u64(_n: u64) -> Result<Self, sea_orm::DbErr> {
        Err(sea_orm::DbErr::Exec(
            "Hash cannot be converted from u64".to_string(),
        ))
    }
}

#[cfg(feature = "sql")]
impl sea_orm::TryGetable for Hash {
    fn try_get(
        res: &sea_orm::QueryResult,
        pre: &str,
        col: &str,
    ) -> Result<Self, sea_orm::TryGetError> {
        let opt: Option<String> = res.try_get(pre, col).map_err(sea_orm::TryGetError::DbErr)?;
        match opt {
            Some(val) => Ok(Hash::try_from(val.as_ref())
                .map_err(|_| sea_orm::DbErr::Exec("Invalid Hash".to_string()))
                .map_err(sea_orm::TryGetError::DbErr)?),
            None => Err(sea_orm::TryGetError::Null),
        }
    }
}

#[cfg(feature = "sql")]
impl sea_orm::sea_query::Nullable for Hash {
    fn null() -> sea_orm::Value {
        sea_orm::Value::String(None)
    }
}

#[cfg(feature = "sql")]
impl sea_orm::sea_query::ValueType for Hash {
    fn try_from(v: sea_orm::Value) -> Result<Self, sea_orm::sea_query::ValueTypeErr> {
        match v {
            sea_orm::Value::String(Some(x)) => {
                Ok(TryFrom::try_from((*x).as_ref())
                    .map_err(|_| sea_orm::sea_query::ValueTypeErr)?)
            }
            _ => Err(sea_orm::sea_query::ValueTypeErr),
        }
    }

    fn type_name() -> String {
        "Hash".to_string()
    }

    fn column_type() -> sea_orm::sea_query::ColumnType {
        sea_orm::sea_query::ColumnType::Text
    }
}

#[cfg(feature = "sql")]
impl From<Hash> for sea_orm::Value {
    fn from(h: Hash) -> sea_orm::Value {
        sea_orm::Value::from(h.to_string())
    }
}

/// Identity of an approver endpoint, usually its base url
#[derive(Clone, Debug, StdHash, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ApproverId(pub String);

impl ApproverId {
    /// Base url with any trailing slash removed, so `http://a:1/` and `http://a:1` compare equal
    pub fn normalized(&self) -> ApproverId {
        ApproverId(self.0.trim_end_matches('/').to_string())
    }

    /// Join a path onto the approver endpoint
    pub fn join(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.0.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl fmt::Display for ApproverId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'a> From<&'a str> for ApproverId {
    fn from(val: &str) -> ApproverId {
        ApproverId(val.to_string())
    }
}

impl From<String> for ApproverId {
    fn from(val: String) -> ApproverId {
        ApproverId(val)
    }
}
