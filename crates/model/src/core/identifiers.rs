use rand::{Rng, distributions::Alphanumeric};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

const IMPORTER_ID_LEN: usize = 16;
const ACK_SUFFIX_LEN: usize = 10;
const ACK_SEPARATOR: char = '-';

fn random_alphanumeric(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

/// Identity of one importer instance, unique for the lifetime of the process.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImporterId(Arc<str>);

impl ImporterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(Arc::from(id.into()))
    }

    /// A fresh random id. Never contains the ack token separator.
    pub fn generate() -> Self {
        Self::new(random_alphanumeric(IMPORTER_ID_LEN))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ImporterId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for ImporterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque correlation id for one delivered batch: `{importer_id}-{random}`.
///
/// Only the issuing importer can resolve a token; everyone else just passes it
/// back verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AckToken(Arc<str>);

impl AckToken {
    pub fn generate(importer_id: &ImporterId) -> Self {
        Self(Arc::from(format!(
            "{importer_id}{ACK_SEPARATOR}{}",
            random_alphanumeric(ACK_SUFFIX_LEN)
        )))
    }

    pub fn parse(raw: impl Into<String>) -> Self {
        Self(Arc::from(raw.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The id of the importer that issued this token, if the token is well formed.
    pub fn importer_id(&self) -> Option<ImporterId> {
        self.0
            .rsplit_once(ACK_SEPARATOR)
            .filter(|(id, suffix)| !id.is_empty() && !suffix.is_empty())
            .map(|(id, _)| ImporterId::new(id))
    }
}

impl From<&str> for AckToken {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl fmt::Display for AckToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
